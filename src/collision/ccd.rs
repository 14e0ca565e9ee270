//! Time of impact by conservative advancement.
//!
//! Two sweeps are advanced until their separation drops to a small target
//! distance. Each iteration builds a separating axis from the GJK simplex and
//! root-finds the time at which the deepest points along that axis reach the
//! target. The result is a time at which the shapes are close but not
//! overlapping, which keeps the position solver happy.

use glam::Vec2;
use log::debug;

use crate::{
    collision::distance::{distance, DistanceInput, DistanceProxy, SimplexCache},
    config::{LINEAR_SLOP, MAX_POLYGON_VERTICES},
    core::{
        shape::ShapeExtent,
        types::{Sweep, Transform},
    },
    utils::math::cross_vs,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToiState {
    #[default]
    Unknown,
    /// The iteration limit was reached without converging.
    Failed,
    Overlapped,
    Touching,
    Separated,
}

#[derive(Debug, Clone, Copy)]
pub struct ToiInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub sweep_a: Sweep,
    pub sweep_b: Sweep,
    /// Upper bound of the sweep interval, usually `1`.
    pub t_max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ToiOutput {
    pub state: ToiState,
    pub t: f32,
}

/// Iteration limits for the TOI solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToiLimits {
    pub max_iterations: u32,
    pub max_root_iterations: u32,
}

impl Default for ToiLimits {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_root_iterations: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeparationKind {
    Points,
    FaceA,
    FaceB,
}

struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationKind,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> Self {
        debug_assert!(0 < cache.count && cache.count < 3);

        let xf_a = sweep_a.transform_at(t1);
        let xf_b = sweep_b.transform_at(t1);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationKind::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            f.axis = (point_b - point_a).normalize_or_zero();
        } else if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A.
            f.kind = SeparationKind::FaceB;
            let b1 = proxy_b.vertex(cache.index_b[0]);
            let b2 = proxy_b.vertex(cache.index_b[1]);
            f.axis = cross_vs(b2 - b1, 1.0).normalize_or_zero();
            let normal = xf_b.q.apply(f.axis);
            f.local_point = 0.5 * (b1 + b2);
            let point_b = xf_b.apply(f.local_point);
            let point_a = xf_a.apply(proxy_a.vertex(cache.index_a[0]));
            if (point_a - point_b).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        } else {
            // Two points on A and one or two on B.
            f.kind = SeparationKind::FaceA;
            let a1 = proxy_a.vertex(cache.index_a[0]);
            let a2 = proxy_a.vertex(cache.index_a[1]);
            f.axis = cross_vs(a2 - a1, 1.0).normalize_or_zero();
            let normal = xf_a.q.apply(f.axis);
            f.local_point = 0.5 * (a1 + a2);
            let point_a = xf_a.apply(f.local_point);
            let point_b = xf_b.apply(proxy_b.vertex(cache.index_b[0]));
            if (point_b - point_a).dot(normal) < 0.0 {
                f.axis = -f.axis;
            }
        }
        f
    }

    fn transforms(&self, t: f32) -> (Transform, Transform) {
        (self.sweep_a.transform_at(t), self.sweep_b.transform_at(t))
    }

    /// Deepest pair of points along the axis at time `t`.
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let index_a = self.proxy_a.support(xf_a.q.apply_inv(self.axis));
                let index_b = self.proxy_b.support(xf_b.q.apply_inv(-self.axis));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let index_b = self.proxy_b.support(xf_b.q.apply_inv(-normal));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(normal), 0, index_b)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let index_a = self.proxy_a.support(xf_a.q.apply_inv(-normal));
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(normal), index_a, 0)
            }
        }
    }

    /// Separation of the given support points at time `t`.
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let (xf_a, xf_b) = self.transforms(t);
        match self.kind {
            SeparationKind::Points => {
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationKind::FaceA => {
                let normal = xf_a.q.apply(self.axis);
                let point_a = xf_a.apply(self.local_point);
                let point_b = xf_b.apply(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationKind::FaceB => {
                let normal = xf_b.q.apply(self.axis);
                let point_b = xf_b.apply(self.local_point);
                let point_a = xf_a.apply(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

/// Computes the upper bound on time before two shapes penetrate.
///
/// Time is expressed as a fraction in `[0, t_max]`. Non-convergence is
/// reported as [`ToiState::Failed`] with `t` at the last safe time.
pub fn time_of_impact(input: &ToiInput, limits: ToiLimits) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;
    // Large rotations make the root finder hard.
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;
    debug_assert!(target > tolerance);

    let mut t1 = 0.0_f32;
    let mut iterations = 0;

    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a: *proxy_a,
        proxy_b: *proxy_b,
        transform_a: Transform::IDENTITY,
        transform_b: Transform::IDENTITY,
        use_radii: false,
    };

    // Outer loop: advance t1 until the shapes are within the target distance.
    loop {
        distance_input.transform_a = sweep_a.transform_at(t1);
        distance_input.transform_b = sweep_b.transform_at(t1);

        let distance_output = distance(&distance_input, &mut cache);

        if distance_output.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let function = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point; vertices can only be pushed back so
        // many times before the axis is exhausted.
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iterations = 0;
        loop {
            let (mut s2, index_a, index_b) = function.find_min_separation(t2);

            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = function.evaluate(index_a, index_b, t1);

            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // Mix bisection and secant steps.
            let mut root_iterations = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                let t = if root_iterations & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iterations += 1;

                let s = function.evaluate(index_a, index_b, t);

                if (s - target).abs() < tolerance {
                    t2 = t;
                    break;
                }

                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iterations == limits.max_root_iterations {
                    break;
                }
            }

            push_back_iterations += 1;
            if push_back_iterations == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iterations += 1;
        if done {
            break;
        }

        if iterations == limits.max_iterations {
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    if output.state == ToiState::Failed {
        debug!(
            "time of impact did not converge after {} iterations (t = {:.4})",
            iterations, output.t
        );
    }
    output
}

/// Whether a sweep moves far enough relative to the shape to risk tunneling.
///
/// Displacement is the center travel plus the arc swept by the furthest
/// point. A non-positive `motion_threshold` marks every body as fast.
pub fn is_fast_mover(sweep: &Sweep, extent: ShapeExtent, motion_threshold: f32) -> bool {
    if motion_threshold <= 0.0 {
        return true;
    }
    let linear = (sweep.c - sweep.c0).length();
    let angular = (sweep.a - sweep.a0).abs() * extent.max_extent;
    linear + angular > motion_threshold * extent.min_extent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::Shape;
    use approx::assert_relative_eq;

    fn sweep(from: Vec2, to: Vec2) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0: from,
            c: to,
            a0: 0.0,
            a: 0.0,
            alpha0: 0.0,
        }
    }

    fn proxy(shape: &Shape) -> DistanceProxy {
        DistanceProxy::new(shape, 0)
    }

    #[test]
    fn fast_circle_hits_thin_wall() {
        let wall = Shape::rect(0.05, 5.0, 1.0).unwrap();
        let ball = Shape::circle(Vec2::ZERO, 0.25, 1.0).unwrap();
        let input = ToiInput {
            proxy_a: proxy(&wall),
            proxy_b: proxy(&ball),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO),
            sweep_b: sweep(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input, ToiLimits::default());
        assert_eq!(output.state, ToiState::Touching);
        // Contact when the ball surface reaches x = -0.05.
        let x = -10.0 + 20.0 * output.t;
        assert_relative_eq!(x, -0.3, epsilon = 0.02);
    }

    #[test]
    fn separated_sweeps_report_t_max() {
        let a = Shape::rect(0.5, 0.5, 1.0).unwrap();
        let b = Shape::rect(0.5, 0.5, 1.0).unwrap();
        let input = ToiInput {
            proxy_a: proxy(&a),
            proxy_b: proxy(&b),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO),
            sweep_b: sweep(Vec2::new(0.0, 5.0), Vec2::new(3.0, 5.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input, ToiLimits::default());
        assert_eq!(output.state, ToiState::Separated);
        assert_eq!(output.t, 1.0);
    }

    #[test]
    fn overlapping_start_reports_zero() {
        let a = Shape::rect(0.5, 0.5, 1.0).unwrap();
        let input = ToiInput {
            proxy_a: proxy(&a),
            proxy_b: proxy(&a),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO),
            sweep_b: sweep(Vec2::new(0.2, 0.0), Vec2::new(1.0, 0.0)),
            t_max: 1.0,
        };
        let output = time_of_impact(&input, ToiLimits::default());
        assert_eq!(output.state, ToiState::Overlapped);
        assert_eq!(output.t, 0.0);
    }

    #[test]
    fn fast_mover_threshold() {
        let extent = ShapeExtent {
            min_extent: 0.5,
            max_extent: 0.7,
        };
        let slow = sweep(Vec2::ZERO, Vec2::new(0.1, 0.0));
        let fast = sweep(Vec2::ZERO, Vec2::new(2.0, 0.0));
        assert!(is_fast_mover(&slow, extent, 0.0));
        assert!(!is_fast_mover(&slow, extent, 1.0));
        assert!(is_fast_mover(&fast, extent, 1.0));
    }
}
