use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    soft_constraint, validate_finite, Anchor, JointConstraint, JointFrame, JointSlots,
    SolverBodyRef,
};
use crate::{
    config::{LINEAR_SLOP, MAX_LINEAR_CORRECTION},
    core::types::Rot,
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::BodyHandle,
        math::{cross, cross_sv},
    },
};

/// Keeps two anchor points at a fixed distance, optionally as a spring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    /// Rest length; `None` keeps the distance at creation.
    pub length: Option<f32>,
    /// Spring frequency. Zero makes the joint rigid.
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl DistanceJointDef {
    /// Anchors are world points.
    pub fn new(body_a: Option<BodyHandle>, body_b: BodyHandle, anchor_a: Vec2, anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a: Anchor::World(anchor_a),
            anchor_b: Anchor::World(anchor_b),
            length: None,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    pub fn length(mut self, length: f32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f32,
    frequency_hz: f32,
    damping_ratio: f32,

    impulse: f32,
    gamma: f32,
    bias: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        let local_anchor_a = def.anchor_a.to_local(frame_a);
        let local_anchor_b = def.anchor_b.to_local(frame_b);
        let length = match def.length {
            Some(length) => length,
            None => frame_a
                .xf
                .apply(local_anchor_a)
                .distance(frame_b.xf.apply(local_anchor_b)),
        };
        validate_finite(
            &[length, def.frequency_hz, def.damping_ratio],
            "distance joint parameters must be finite",
        )?;
        if length < LINEAR_SLOP {
            return Err(PhysicsError::InvalidJoint {
                reason: "distance joint length must exceed the linear slop",
            });
        }
        if def.frequency_hz < 0.0 || def.damping_ratio < 0.0 {
            return Err(PhysicsError::InvalidJoint {
                reason: "distance joint spring parameters must be non-negative",
            });
        }
        Ok(Self {
            local_anchor_a,
            local_anchor_b,
            length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        })
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length.max(LINEAR_SLOP);
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_spring(&mut self, frequency_hz: f32, damping_ratio: f32) {
        self.frequency_hz = frequency_hz.max(0.0);
        self.damping_ratio = damping_ratio.max(0.0);
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }
}

impl JointConstraint for DistanceJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);

        let pos_a = self.a.position(data);
        let pos_b = self.b.position(data);
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);

        let q_a = Rot::new(pos_a.a);
        let q_b = Rot::new(pos_b.a);
        self.r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        self.u = pos_b.c + self.r_b - pos_a.c - self.r_a;

        let current_length = self.u.length();
        if current_length > LINEAR_SLOP {
            self.u /= current_length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_au = cross(self.r_a, self.u);
        let cr_bu = cross(self.r_b, self.u);
        let mut inv_mass = self.a.inv_mass
            + self.a.inv_i * cr_au * cr_au
            + self.b.inv_mass
            + self.b.inv_i * cr_bu * cr_bu;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = current_length - self.length;
            let (gamma, bias) =
                soft_constraint(self.mass, self.frequency_hz, self.damping_ratio, c, data.step.dt);
            self.gamma = gamma;
            self.bias = bias;
            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p = self.impulse * self.u;
            vel_a.linear -= self.a.inv_mass * p;
            vel_a.angular -= self.a.inv_i * cross(self.r_a, p);
            vel_b.linear += self.b.inv_mass * p;
            vel_b.angular += self.b.inv_i * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);

        let vp_a = vel_a.linear + cross_sv(vel_a.angular, self.r_a);
        let vp_b = vel_b.linear + cross_sv(vel_b.angular, self.r_b);
        let c_dot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (c_dot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = impulse * self.u;
        vel_a.linear -= self.a.inv_mass * p;
        vel_a.angular -= self.a.inv_i * cross(self.r_a, p);
        vel_b.linear += self.b.inv_mass * p;
        vel_b.angular += self.b.inv_i * cross(self.r_b, p);

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        if self.frequency_hz > 0.0 {
            // Soft joints have no position correction.
            return true;
        }

        let mut pos_a = self.a.position(data);
        let mut pos_b = self.b.position(data);
        let r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        let r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);
        let d = pos_b.c + r_b - pos_a.c - r_a;

        let length = d.length();
        let u = d.normalize_or_zero();
        let c = (length - self.length).clamp(-MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = impulse * u;
        pos_a.c -= self.a.inv_mass * p;
        pos_a.a -= self.a.inv_i * cross(r_a, p);
        pos_b.c += self.b.inv_mass * p;
        pos_b.a += self.b.inv_i * cross(r_b, p);

        data.positions[self.a.index] = pos_a;
        data.positions[self.b.index] = pos_b;

        c.abs() < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse * self.u
    }

    fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }

    fn shift_origin(&mut self, new_origin: Vec2, world_anchored: bool) {
        if world_anchored {
            self.local_anchor_a -= new_origin;
        }
    }
}
