//! GJK closest-point queries between convex proxies.

use glam::Vec2;

use crate::{
    config::MAX_POLYGON_VERTICES,
    core::{shape::Shape, types::Transform},
    utils::math::{cross, cross_sv, cross_vs},
};

const GJK_MAX_ITERATIONS: usize = 20;

/// Convex point cloud with a skin radius, as seen by GJK.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    pub radius: f32,
}

impl DistanceProxy {
    /// Proxy for one child of `shape`. Chains use their child edge.
    pub fn new(shape: &Shape, child_index: usize) -> Self {
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        match shape {
            Shape::Circle(circle) => {
                vertices[0] = circle.position;
                Self {
                    vertices,
                    count: 1,
                    radius: circle.radius,
                }
            }
            Shape::Polygon(poly) => {
                vertices[..poly.count()].copy_from_slice(poly.vertices());
                Self {
                    vertices,
                    count: poly.count(),
                    radius: poly.radius,
                }
            }
            Shape::Edge(edge) => {
                vertices[0] = edge.v1;
                vertices[1] = edge.v2;
                Self {
                    vertices,
                    count: 2,
                    radius: edge.radius,
                }
            }
            Shape::Chain(chain) => {
                let n = chain.vertices().len();
                let i1 = child_index.min(n - 2);
                vertices[0] = chain.vertices()[i1];
                vertices[1] = chain.vertices()[i1 + 1];
                Self {
                    vertices,
                    count: 2,
                    radius: chain.radius,
                }
            }
        }
    }

    /// Proxy over raw points; used by tests and custom queries.
    pub fn from_points(points: &[Vec2], radius: f32) -> Self {
        let count = points.len().min(MAX_POLYGON_VERTICES);
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(&points[..count]);
        Self {
            vertices,
            count,
            radius,
        }
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    /// Index of the vertex furthest along `d`.
    pub fn support(&self, d: Vec2) -> usize {
        let mut best = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best = i;
                best_value = value;
            }
        }
        best
    }
}

/// Simplex from the previous query, used to warm start GJK.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimplexCache {
    /// Length or area of the cached simplex.
    pub metric: f32,
    pub count: usize,
    pub index_a: [usize; 3],
    pub index_b: [usize; 3],
}

#[derive(Debug, Clone, Copy)]
pub struct DistanceInput {
    pub proxy_a: DistanceProxy,
    pub proxy_b: DistanceProxy,
    pub transform_a: Transform,
    pub transform_b: Transform,
    pub use_radii: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceOutput {
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub distance: f32,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimplexVertex {
    /// Support point in proxy A.
    w_a: Vec2,
    /// Support point in proxy B.
    w_b: Vec2,
    /// `w_b - w_a`.
    w: Vec2,
    /// Barycentric coordinate of the closest point.
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let mut simplex = Simplex {
            count: cache.count,
            ..Default::default()
        };
        for i in 0..simplex.count {
            let v = &mut simplex.v[i];
            v.index_a = cache.index_a[i];
            v.index_b = cache.index_b[i];
            v.w_a = xf_a.apply(proxy_a.vertex(v.index_a));
            v.w_b = xf_b.apply(proxy_b.vertex(v.index_b));
            v.w = v.w_b - v.w_a;
            v.a = 0.0;
        }

        // Flush the cache if the metric changed a lot.
        if simplex.count > 1 {
            let metric1 = cache.metric;
            let metric2 = simplex.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < f32::EPSILON {
                simplex.count = 0;
            }
        }

        if simplex.count == 0 {
            let v = &mut simplex.v[0];
            v.index_a = 0;
            v.index_b = 0;
            v.w_a = xf_a.apply(proxy_a.vertex(0));
            v.w_b = xf_b.apply(proxy_b.vertex(0));
            v.w = v.w_b - v.w_a;
            v.a = 1.0;
            simplex.count = 1;
        }
        simplex
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a;
            cache.index_b[i] = self.v[i].index_b;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = cross(e12, -self.v[0].w);
                if sgn > 0.0 {
                    cross_sv(1.0, e12)
                } else {
                    cross_vs(e12, 1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn closest_point(&self) -> Vec2 {
        match self.count {
            1 => self.v[0].w,
            2 => self.v[0].a * self.v[0].w + self.v[1].a * self.v[1].w,
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        match self.count {
            1 => (self.v[0].w_a, self.v[0].w_b),
            2 => (
                self.v[0].a * self.v[0].w_a + self.v[1].a * self.v[1].w_a,
                self.v[0].a * self.v[0].w_b + self.v[1].a * self.v[1].w_b,
            ),
            3 => {
                let p = self.v[0].a * self.v[0].w_a
                    + self.v[1].a * self.v[1].w_a
                    + self.v[2].a * self.v[2].w_a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => cross(self.v[1].w - self.v[0].w, self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest point on a segment to the origin, via barycentric coordinates.
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest feature of a triangle to the origin.
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        let n123 = cross(e12, e13);
        let d123_1 = n123 * cross(w2, w3);
        let d123_2 = n123 * cross(w3, w1);
        let d123_3 = n123 * cross(w1, w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Origin inside the triangle.
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

/// Closest points between two proxies. `cache` is read for warm starting and
/// updated with the final simplex.
pub fn distance(input: &DistanceInput, cache: &mut SimplexCache) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let xf_a = &input.transform_a;
    let xf_b = &input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iterations = 0;
    while iterations < GJK_MAX_ITERATIONS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // Origin enclosed: overlap.
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();
        if d.length_squared() < f32::EPSILON * f32::EPSILON {
            // Origin is (numerically) on the simplex.
            break;
        }

        let index = simplex.count;
        let vertex = &mut simplex.v[index];
        vertex.index_a = proxy_a.support(xf_a.q.apply_inv(-d));
        vertex.w_a = xf_a.apply(proxy_a.vertex(vertex.index_a));
        vertex.index_b = proxy_b.support(xf_b.q.apply_inv(d));
        vertex.w_b = xf_b.apply(proxy_b.vertex(vertex.index_b));
        vertex.w = vertex.w_b - vertex.w_a;

        iterations += 1;

        // A repeated support point means no further progress.
        let (new_a, new_b) = (vertex.index_a, vertex.index_b);
        let duplicate = (0..save_count).any(|i| new_a == save_a[i] && new_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        if dist < f32::EPSILON {
            // Shapes overlap: report the midpoint.
            let p = 0.5 * (point_a + point_b);
            point_a = p;
            point_b = p;
            dist = 0.0;
        } else {
            let r_a = proxy_a.radius;
            let r_b = proxy_b.radius;
            dist = (dist - r_a - r_b).max(0.0);
            let normal = (point_b - point_a).normalize();
            point_a += r_a * normal;
            point_b -= r_b * normal;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations,
    }
}

/// Overlap test between two shape children including their skin radii.
pub fn test_overlap(
    shape_a: &Shape,
    child_a: usize,
    shape_b: &Shape,
    child_b: usize,
    xf_a: &Transform,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, child_a),
        proxy_b: DistanceProxy::new(shape_b, child_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&input, &mut cache);
    output.distance < 10.0 * f32::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn distance_between_separated_boxes() {
        let a = Shape::rect(1.0, 1.0, 1.0).unwrap();
        let b = Shape::rect(1.0, 1.0, 1.0).unwrap();
        let input = DistanceInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::from_position(Vec2::new(5.0, 0.5)),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let output = distance(&input, &mut cache);
        assert_relative_eq!(output.distance, 3.0, epsilon = 1e-4);
        assert_relative_eq!(output.point_a.x, 1.0, epsilon = 1e-4);
        assert_relative_eq!(output.point_b.x, 4.0, epsilon = 1e-4);
        assert!(cache.count >= 1);
    }

    #[test]
    fn radii_shrink_reported_distance() {
        let a = Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap();
        let b = Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap();
        let input = DistanceInput {
            proxy_a: DistanceProxy::new(&a, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            transform_a: Transform::IDENTITY,
            transform_b: Transform::from_position(Vec2::new(3.0, 0.0)),
            use_radii: true,
        };
        let output = distance(&input, &mut SimplexCache::default());
        assert_relative_eq!(output.distance, 2.0, epsilon = 1e-5);
        assert_relative_eq!(output.point_a.x, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn overlap_test_detects_intersection() {
        let a = Shape::rect(1.0, 1.0, 1.0).unwrap();
        let b = Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap();
        let near = Transform::from_position(Vec2::new(1.2, 0.0));
        let far = Transform::from_position(Vec2::new(2.0, 0.0));
        assert!(test_overlap(&a, 0, &b, 0, &Transform::IDENTITY, &near));
        assert!(!test_overlap(&a, 0, &b, 0, &Transform::IDENTITY, &far));
    }

    #[test]
    fn cache_warm_start_gives_same_answer() {
        let a = DistanceProxy::from_points(
            &[Vec2::new(-1.0, -1.0), Vec2::new(1.0, -1.0), Vec2::new(0.0, 1.0)],
            0.0,
        );
        let b = DistanceProxy::from_points(&[Vec2::new(-0.5, 0.0), Vec2::new(0.5, 0.0)], 0.0);
        let input = DistanceInput {
            proxy_a: a,
            proxy_b: b,
            transform_a: Transform::IDENTITY,
            transform_b: Transform::from_position(Vec2::new(0.0, 3.0)),
            use_radii: false,
        };
        let mut cache = SimplexCache::default();
        let first = distance(&input, &mut cache);
        let second = distance(&input, &mut cache);
        assert_relative_eq!(first.distance, second.distance, epsilon = 1e-6);
        assert_relative_eq!(first.distance, 2.0, epsilon = 1e-5);
    }
}
