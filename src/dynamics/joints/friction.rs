use glam::{Mat2, Vec2};
use serde::{Deserialize, Serialize};

use super::{validate_finite, Anchor, JointConstraint, JointFrame, JointSlots, SolverBodyRef};
use crate::{
    core::types::Rot,
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::BodyHandle,
        math::{cross, cross_sv, inverse22},
    },
};

/// Top-down friction: resists relative motion up to a maximum force and torque.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrictionJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    pub max_force: f32,
    pub max_torque: f32,
}

impl FrictionJointDef {
    pub fn new(body_a: Option<BodyHandle>, body_b: BodyHandle, anchor: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a: Anchor::World(anchor),
            anchor_b: Anchor::World(anchor),
            max_force: 0.0,
            max_torque: 0.0,
        }
    }

    pub fn limits(mut self, max_force: f32, max_torque: f32) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FrictionJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    max_force: f32,
    max_torque: f32,

    linear_impulse: Vec2,
    angular_impulse: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    r_a: Vec2,
    r_b: Vec2,
    linear_mass: Mat2,
    angular_mass: f32,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        validate_finite(
            &[def.max_force, def.max_torque],
            "friction joint limits must be finite",
        )?;
        if def.max_force < 0.0 || def.max_torque < 0.0 {
            return Err(PhysicsError::InvalidJoint {
                reason: "friction joint limits must be non-negative",
            });
        }
        Ok(Self {
            local_anchor_a: def.anchor_a.to_local(frame_a),
            local_anchor_b: def.anchor_b.to_local(frame_b),
            max_force: def.max_force,
            max_torque: def.max_torque,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            linear_mass: Mat2::ZERO,
            angular_mass: 0.0,
        })
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force.max(0.0);
    }

    pub fn max_torque(&self) -> f32 {
        self.max_torque
    }

    pub fn set_max_torque(&mut self, torque: f32) {
        self.max_torque = torque.max(0.0);
    }
}

impl JointConstraint for FrictionJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);

        let pos_a = self.a.position(data);
        let pos_b = self.b.position(data);
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        self.r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        self.r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let off_diagonal = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k = Mat2::from_cols(
            Vec2::new(m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y, off_diagonal),
            Vec2::new(off_diagonal, m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x),
        );
        self.linear_mass = inverse22(k);
        self.angular_mass = if i_a + i_b > 0.0 { 1.0 / (i_a + i_b) } else { 0.0 };

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

        // Angular friction.
        {
            let c_dot = vel_b.angular - vel_a.angular;
            let impulse = -self.angular_mass * c_dot;
            let old = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.angular_impulse - old;

            vel_a.angular -= i_a * impulse;
            vel_b.angular += i_b * impulse;
        }

        // Linear friction.
        {
            let c_dot = vel_b.linear + cross_sv(vel_b.angular, self.r_b)
                - vel_a.linear
                - cross_sv(vel_a.angular, self.r_a);
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

    fn shift_origin(&mut self, new_origin: Vec2, world_anchored: bool) {
        if world_anchored {
            self.local_anchor_a -= new_origin;
        }
    }
}
