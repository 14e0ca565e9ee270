use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub lower: Vec2,
    pub upper: Vec2,
}

/// Ray segment from `p1` towards `p2`, clipped at `max_fraction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

impl RayCastInput {
    pub fn new(p1: Vec2, p2: Vec2) -> Self {
        Self {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }

    pub fn point_at(&self, fraction: f32) -> Vec2 {
        self.p1 + (self.p2 - self.p1) * fraction
    }
}

/// Hit reported by a ray cast: `p1 + fraction * (p2 - p1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

impl Aabb {
    pub fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            lower: center - half_extents,
            upper: center + half_extents,
        }
    }

    /// Finite and not inverted.
    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && self.lower.is_finite() && self.upper.is_finite()
    }

    pub fn center(&self) -> Vec2 {
        0.5 * (self.lower + self.upper)
    }

    pub fn extents(&self) -> Vec2 {
        0.5 * (self.upper - self.lower)
    }

    pub fn perimeter(&self) -> f32 {
        let d = self.upper - self.lower;
        2.0 * (d.x + d.y)
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    pub fn fattened(&self, margin: f32) -> Aabb {
        let r = Vec2::splat(margin);
        Aabb {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        let d1 = other.lower - self.upper;
        let d2 = self.lower - other.upper;
        !(d1.x > 0.0 || d1.y > 0.0 || d2.x > 0.0 || d2.y > 0.0)
    }

    pub fn contains_point(&self, point: Vec2) -> bool {
        point.cmpge(self.lower).all() && point.cmple(self.upper).all()
    }

    /// Slab test. Rays starting inside the box report no hit.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = f32::MIN;
        let mut tmax = f32::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = Vec2::ZERO;

        for i in 0..2 {
            if abs_d[i] < f32::EPSILON {
                if p[i] < self.lower[i] || self.upper[i] < p[i] {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d[i];
                let mut t1 = (self.lower[i] - p[i]) * inv_d;
                let mut t2 = (self.upper[i] - p[i]) * inv_d;
                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                if t1 > tmin {
                    normal = Vec2::ZERO;
                    normal[i] = s;
                    tmin = t1;
                }
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_and_containment() {
        let a = Aabb::new(Vec2::ZERO, Vec2::splat(2.0));
        let b = Aabb::new(Vec2::splat(1.0), Vec2::splat(3.0));
        let c = Aabb::new(Vec2::splat(2.5), Vec2::splat(3.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.union(&c).contains(&b));
        assert!((a.perimeter() - 8.0).abs() < 1e-6);
    }

    #[test]
    fn ray_hits_near_face() {
        let aabb = Aabb::new(Vec2::new(1.0, -1.0), Vec2::new(3.0, 1.0));
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(4.0, 0.0));
        let hit = aabb.ray_cast(&input).expect("ray should hit the box");
        assert!((hit.fraction - 0.25).abs() < 1e-6);
        assert_eq!(hit.normal, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn inverted_box_is_invalid() {
        let aabb = Aabb::new(Vec2::ONE, Vec2::ZERO);
        assert!(!aabb.is_valid());
        assert!(!Aabb::new(Vec2::NAN, Vec2::ONE).is_valid());
    }
}
