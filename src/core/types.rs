use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::utils::math::cross_sv;

/// Rotation stored as sine/cosine so repeated use does not re-evaluate trigonometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Rot {
    pub const IDENTITY: Rot = Rot { s: 0.0, c: 1.0 };

    pub fn new(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotates `v` by this rotation.
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Rotates `v` by the inverse of this rotation.
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * other`.
    pub fn mul(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// `self^T * other`.
    pub fn mul_t(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

/// Position and orientation of a rigid frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Transform {
    pub p: Vec2,
    pub q: Rot,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        p: Vec2::ZERO,
        q: Rot::IDENTITY,
    };

    pub fn new(p: Vec2, angle: f32) -> Self {
        Self { p, q: Rot::new(angle) }
    }

    pub fn from_position(p: Vec2) -> Self {
        Self { p, q: Rot::IDENTITY }
    }

    /// Maps a local point into the parent frame.
    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        self.q.apply(v) + self.p
    }

    /// Maps a parent-frame point into the local frame.
    #[inline]
    pub fn apply_inv(&self, v: Vec2) -> Vec2 {
        self.q.apply_inv(v - self.p)
    }

    /// Relative transform `self^-1 * other`.
    pub fn mul_t(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul_t(other.q),
            p: self.q.apply_inv(other.p - self.p),
        }
    }

    /// Applies another transform on top of this one, returning the composition.
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            q: self.q.mul(other.q),
            p: self.q.apply(other.p) + self.p,
        }
    }
}

/// Motion of a body's center of mass over one step, used for continuous collision.
///
/// Center and angle are interpolated linearly between `alpha0` and `1`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sweep {
    pub local_center: Vec2,
    pub c0: Vec2,
    pub c: Vec2,
    pub a0: f32,
    pub a: f32,
    pub alpha0: f32,
}

impl Sweep {
    /// Interpolated transform at `beta` in `[0, 1]`.
    pub fn transform_at(&self, beta: f32) -> Transform {
        let c = self.c0 * (1.0 - beta) + self.c * beta;
        let angle = (1.0 - beta) * self.a0 + beta * self.a;
        let q = Rot::new(angle);
        Transform {
            p: c - q.apply(self.local_center),
            q,
        }
    }

    /// Moves the sweep start forward to `alpha`.
    pub fn advance(&mut self, alpha: f32) {
        debug_assert!(self.alpha0 < 1.0);
        let beta = (alpha - self.alpha0) / (1.0 - self.alpha0);
        self.c0 += (self.c - self.c0) * beta;
        self.a0 += beta * (self.a - self.a0);
        self.alpha0 = alpha;
    }

    /// Keeps the angles in a bounded range without changing the motion.
    pub fn normalize(&mut self) {
        let d = TAU * (self.a0 / TAU).floor();
        self.a0 -= d;
        self.a -= d;
    }
}

/// Linear and angular velocity of a rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: Vec2,
    pub angular: f32,
}

impl Velocity {
    pub fn new(linear: Vec2, angular: f32) -> Self {
        Self { linear, angular }
    }

    /// Velocity of a point offset by `r` from the center of mass.
    #[inline]
    pub fn at(&self, r: Vec2) -> Vec2 {
        self.linear + cross_sv(self.angular, r)
    }
}

/// Center-of-mass position and angle used inside the solver.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Mass, center of mass and rotational inertia about the shape origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    pub inertia: f32,
}

/// How a contact mixes the coefficients of its two fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixingMode {
    Average,
    Min,
    Max,
    #[default]
    GeometricMean,
}

impl MixingMode {
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a * b).max(0.0).sqrt(),
        }
    }
}

/// Surface coefficients carried by a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.2,
            restitution: 0.0,
        }
    }
}

impl Material {
    pub fn rubber() -> Self {
        Self {
            friction: 1.0,
            restitution: 0.8,
        }
    }

    pub fn steel() -> Self {
        Self {
            friction: 0.5,
            restitution: 0.4,
        }
    }

    pub fn ice() -> Self {
        Self {
            friction: 0.03,
            restitution: 0.05,
        }
    }

    /// Friction mixing: geometric mean, so zero on either side means frictionless.
    pub fn mix_friction(a: f32, b: f32) -> f32 {
        MixingMode::GeometricMean.combine(a, b)
    }

    /// Restitution mixing: the bouncier surface wins.
    pub fn mix_restitution(a: f32, b: f32) -> f32 {
        MixingMode::Max.combine(a, b)
    }
}
