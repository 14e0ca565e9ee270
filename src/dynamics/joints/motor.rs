use glam::{Mat2, Vec2};
use serde::{Deserialize, Serialize};

use super::{validate_finite, JointConstraint, JointFrame, JointSlots, SolverBodyRef};
use crate::{
    core::types::Rot,
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::BodyHandle,
        math::{cross, cross_sv, inverse22},
    },
};

/// Drives B towards a target offset in A's frame with bounded force and torque.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotorJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    /// Position of B's origin in A's frame; `None` uses the offset at creation.
    pub linear_offset: Option<Vec2>,
    /// Angle of B minus angle of A; `None` uses the offset at creation.
    pub angular_offset: Option<f32>,
    pub max_force: f32,
    pub max_torque: f32,
    /// Fraction of the position error corrected per step, in `[0, 1]`.
    pub correction_factor: f32,
}

impl MotorJointDef {
    pub fn new(body_a: Option<BodyHandle>, body_b: BodyHandle) -> Self {
        Self {
            body_a,
            body_b,
            linear_offset: None,
            angular_offset: None,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
        }
    }

    pub fn max_force(mut self, force: f32) -> Self {
        self.max_force = force;
        self
    }

    pub fn max_torque(mut self, torque: f32) -> Self {
        self.max_torque = torque;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MotorJoint {
    linear_offset: Vec2,
    angular_offset: f32,
    max_force: f32,
    max_torque: f32,
    correction_factor: f32,

    linear_impulse: Vec2,
    angular_impulse: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    r_a: Vec2,
    r_b: Vec2,
    linear_error: Vec2,
    angular_error: f32,
    linear_mass: Mat2,
    angular_mass: f32,
}

impl MotorJoint {
    pub(crate) fn new(def: &MotorJointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        let linear_offset = def
            .linear_offset
            .unwrap_or_else(|| frame_a.xf.apply_inv(frame_b.xf.p));
        let angular_offset = def.angular_offset.unwrap_or(frame_b.angle - frame_a.angle);
        validate_finite(
            &[
                linear_offset.x,
                linear_offset.y,
                angular_offset,
                def.max_force,
                def.max_torque,
                def.correction_factor,
            ],
            "motor joint parameters must be finite",
        )?;
        if def.max_force < 0.0 || def.max_torque < 0.0 {
            return Err(PhysicsError::InvalidJoint {
                reason: "motor joint force and torque limits must be non-negative",
            });
        }
        if !(0.0..=1.0).contains(&def.correction_factor) {
            return Err(PhysicsError::InvalidJoint {
                reason: "motor joint correction factor must lie in [0, 1]",
            });
        }
        Ok(Self {
            linear_offset,
            angular_offset,
            max_force: def.max_force,
            max_torque: def.max_torque,
            correction_factor: def.correction_factor,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_error: Vec2::ZERO,
            angular_error: 0.0,
            linear_mass: Mat2::ZERO,
            angular_mass: 0.0,
        })
    }

    pub fn linear_offset(&self) -> Vec2 {
        self.linear_offset
    }

    pub fn set_linear_offset(&mut self, offset: Vec2) {
        self.linear_offset = offset;
    }

    pub fn angular_offset(&self) -> f32 {
        self.angular_offset
    }

    pub fn set_angular_offset(&mut self, offset: f32) {
        self.angular_offset = offset;
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force.max(0.0);
    }

    pub fn set_max_torque(&mut self, torque: f32) {
        self.max_torque = torque.max(0.0);
    }

    pub fn set_correction_factor(&mut self, factor: f32) {
        self.correction_factor = factor.clamp(0.0, 1.0);
    }
}

impl JointConstraint for MotorJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);

        let pos_a = self.a.position(data);
        let pos_b = self.b.position(data);
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let q_a = Rot::new(pos_a.a);
        self.r_a = q_a.apply(-self.a.local_center);
        self.r_b = Rot::new(pos_b.a).apply(-self.b.local_center);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let k = Mat2::from_cols(
            Vec2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );
        self.linear_mass = inverse22(k);
        self.angular_mass = if i_a + i_b > 0.0 { 1.0 / (i_a + i_b) } else { 0.0 };

        self.linear_error = pos_b.c + r_b - pos_a.c - r_a - q_a.apply(self.linear_offset);
        self.angular_error = pos_b.a - pos_a.a - self.angular_offset;

        if data.step.warm_starting {
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;
            let p = self.linear_impulse;
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * (cross(r_a, p) + self.angular_impulse);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * (cross(r_b, p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);
        let h = data.step.dt;
        let inv_h = data.step.inv_dt;

        {
            let c_dot = vel_b.angular - vel_a.angular
                + inv_h * self.correction_factor * self.angular_error;
            let impulse = -self.angular_mass * c_dot;
            let old = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old;

            vel_a.angular -= i_a * impulse;
            vel_b.angular += i_b * impulse;
        }

        {
            let c_dot = vel_b.linear + cross_sv(vel_b.angular, self.r_b)
                - vel_a.linear
                - cross_sv(vel_a.angular, self.r_a)
                + inv_h * self.correction_factor * self.linear_error;
            let impulse = -(self.linear_mass * c_dot);
            let old = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = h * self.max_force;
            if self.linear_impulse.length_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize_or_zero() * max_impulse;
            }
            let impulse = self.linear_impulse - old;

            vel_a.linear -= m_a * impulse;
            vel_a.angular -= i_a * cross(self.r_a, impulse);
            vel_b.linear += m_b * impulse;
            vel_b.angular += i_b * cross(self.r_b, impulse);
        }

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, _data: &mut SolverData<'_>) -> bool {
        true
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.linear_impulse
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.angular_impulse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transform;

    #[test]
    fn offsets_default_to_current_pose() {
        let frame_a = JointFrame {
            xf: Transform::new(Vec2::new(1.0, 0.0), std::f32::consts::FRAC_PI_2),
            angle: std::f32::consts::FRAC_PI_2,
        };
        let frame_b = JointFrame {
            xf: Transform::new(Vec2::new(1.0, 2.0), 0.0),
            angle: 0.0,
        };
        let def = MotorJointDef::new(Some(BodyHandle::new(0, 0)), BodyHandle::new(1, 0));
        let motor = MotorJoint::new(&def, &frame_a, &frame_b).unwrap();
        assert!((motor.linear_offset() - Vec2::new(2.0, 0.0)).length() < 1e-5);
        assert!((motor.angular_offset() + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn correction_factor_outside_unit_range_is_rejected() {
        let mut def = MotorJointDef::new(None, BodyHandle::new(1, 0));
        def.correction_factor = 1.5;
        assert!(MotorJoint::new(&def, &JointFrame::WORLD, &JointFrame::WORLD).is_err());
    }
}
