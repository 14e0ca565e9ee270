use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{validate_finite, JointConstraint, JointSlots};
use crate::{
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::allocator::BodyHandle,
};

/// Holds the relative angle of two bodies at a target, with a clamped impulse.
///
/// No warm starting and no position pass: the angular error is fed back
/// through a velocity bias each step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    /// Desired `angle_b - angle_a`.
    pub target_angle: f32,
    /// Fraction of the correction that is dropped, in `[0, 1)`.
    pub softness: f32,
    pub bias_factor: f32,
    pub max_impulse: f32,
}

impl AngleJointDef {
    pub fn new(body_a: Option<BodyHandle>, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            target_angle: 0.0,
            softness: 0.0,
            bias_factor: 0.2,
            max_impulse: f32::MAX,
        }
    }

    pub fn target(mut self, angle: f32) -> Self {
        self.target_angle = angle;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AngleJoint {
    target_angle: f32,
    softness: f32,
    bias_factor: f32,
    max_impulse: f32,

    index_a: usize,
    index_b: usize,
    inv_i_a: f32,
    inv_i_b: f32,
    bias: f32,
    mass_factor: f32,
    impulse: f32,
}

impl AngleJoint {
    pub(crate) fn new(def: &AngleJointDef) -> PhysicsResult<Self> {
        validate_finite(
            &[def.target_angle, def.softness, def.bias_factor],
            "angle joint parameters must be finite",
        )?;
        if !(0.0..1.0).contains(&def.softness) {
            return Err(PhysicsError::InvalidJoint {
                reason: "angle joint softness must lie in [0, 1)",
            });
        }
        if def.max_impulse.is_nan() || def.max_impulse < 0.0 {
            return Err(PhysicsError::InvalidJoint {
                reason: "angle joint max impulse must be non-negative",
            });
        }
        Ok(Self {
            target_angle: def.target_angle,
            softness: def.softness,
            bias_factor: def.bias_factor,
            max_impulse: def.max_impulse,
            index_a: 0,
            index_b: 0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            bias: 0.0,
            mass_factor: 0.0,
            impulse: 0.0,
        })
    }

    pub fn target_angle(&self) -> f32 {
        self.target_angle
    }

    pub fn set_target_angle(&mut self, angle: f32) {
        self.target_angle = angle;
    }

    pub fn set_max_impulse(&mut self, max_impulse: f32) {
        self.max_impulse = max_impulse.max(0.0);
    }
}

impl JointConstraint for AngleJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.index_a = slots.a;
        self.index_b = slots.b;
        self.inv_i_a = data.bodies[slots.a].inv_inertia;
        self.inv_i_b = data.bodies[slots.b].inv_inertia;

        let angle_a = data.positions[slots.a].a;
        let angle_b = data.positions[slots.b].a;
        let joint_error = angle_b - angle_a - self.target_angle;
        self.bias = -self.bias_factor * data.step.inv_dt * joint_error;

        let inv_i = self.inv_i_a + self.inv_i_b;
        self.mass_factor = if inv_i > 0.0 {
            (1.0 - self.softness) / inv_i
        } else {
            0.0
        };
        self.impulse = 0.0;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let w_a = data.velocities[self.index_a].angular;
        let w_b = data.velocities[self.index_b].angular;

        let p = (self.bias - w_b + w_a) * self.mass_factor;
        let applied = p.signum() * p.abs().min(self.max_impulse);
        self.impulse += applied;

        data.velocities[self.index_a].angular -= self.inv_i_a * applied;
        data.velocities[self.index_b].angular += self.inv_i_b * applied;
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        true
    }

    fn reaction_force(&self, _inv_dt: f32) -> Vec2 {
        Vec2::ZERO
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softness_of_one_is_rejected() {
        let mut def = AngleJointDef::new(None, BodyHandle::new(1, 0));
        def.softness = 1.0;
        assert!(AngleJoint::new(&def).is_err());
        def.softness = 0.5;
        assert!(AngleJoint::new(&def).is_ok());
    }
}
