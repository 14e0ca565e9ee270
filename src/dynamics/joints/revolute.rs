use glam::{Mat2, Vec2};
use serde::{Deserialize, Serialize};

use super::{validate_finite, Anchor, JointConstraint, JointFrame, JointSlots, SolverBodyRef};
use crate::{
    config::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION},
    core::types::Rot,
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::BodyHandle,
        math::{cross, cross_sv, solve22},
    },
};

/// Pins two bodies together at a shared point, leaving rotation free.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevoluteJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    /// Angle of B relative to A at rest; `None` uses the angle at creation.
    pub reference_angle: Option<f32>,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_torque: f32,
}

impl RevoluteJointDef {
    /// Both bodies share the world point `anchor`.
    pub fn new(body_a: Option<BodyHandle>, body_b: BodyHandle, anchor: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a: Anchor::World(anchor),
            anchor_b: Anchor::World(anchor),
            reference_angle: None,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    pub fn limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    pub fn motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_torque: f32,

    impulse: Vec2,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    r_a: Vec2,
    r_b: Vec2,
    k: Mat2,
    angle: f32,
    axial_mass: f32,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        let reference_angle = def
            .reference_angle
            .unwrap_or(frame_b.angle - frame_a.angle);
        validate_finite(
            &[
                reference_angle,
                def.lower_angle,
                def.upper_angle,
                def.motor_speed,
                def.max_motor_torque,
            ],
            "revolute joint parameters must be finite",
        )?;
        if def.lower_angle > def.upper_angle {
            return Err(PhysicsError::InvalidJoint {
                reason: "revolute joint lower angle exceeds upper angle",
            });
        }
        Ok(Self {
            local_anchor_a: def.anchor_a.to_local(frame_a),
            local_anchor_b: def.anchor_b.to_local(frame_b),
            reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque.max(0.0),
            impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            k: Mat2::ZERO,
            angle: 0.0,
            axial_mass: 0.0,
        })
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
    }

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, enable: bool) {
        if enable != self.enable_limit {
            self.enable_limit = enable;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    pub fn limits(&self) -> (f32, f32) {
        (self.lower_angle, self.upper_angle)
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        debug_assert!(lower <= upper);
        if lower != self.lower_angle || upper != self.upper_angle {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
        }
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, enable: bool) {
        self.enable_motor = enable;
    }

    pub fn motor_speed(&self) -> f32 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) {
        self.max_motor_torque = torque.max(0.0);
    }

    /// Motor torque applied during the last step.
    pub fn motor_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
    }
}

impl JointConstraint for RevoluteJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let pos_a = self.a.position(data);
        let pos_b = self.b.position(data);
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);

        self.r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        self.r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);
        let (r_a, r_b) = (self.r_a, self.r_b);

        let k11 = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
        let k12 = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
        let k22 = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
        self.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));

        self.axial_mass = i_a + i_b;
        let fixed_rotation = self.axial_mass == 0.0;
        if self.axial_mass > 0.0 {
            self.axial_mass = 1.0 / self.axial_mass;
        }

        self.angle = pos_b.a - pos_a.a - self.reference_angle;
        if !self.enable_limit || fixed_rotation {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.motor_impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse;
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * (cross(r_a, p) + axial_impulse);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * (cross(r_b, p) + axial_impulse);
        } else {
            self.impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);
        let fixed_rotation = i_a + i_b == 0.0;
        let (h, inv_h) = (data.step.dt, data.step.inv_dt);

        if self.enable_motor && !fixed_rotation {
            let c_dot = vel_b.angular - vel_a.angular - self.motor_speed;
            let impulse = -self.axial_mass * c_dot;
            let old_impulse = self.motor_impulse;
            let max_impulse = h * self.max_motor_torque;
            self.motor_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;
            vel_a.angular -= i_a * impulse;
            vel_b.angular += i_b * impulse;
        }

        if self.enable_limit && !fixed_rotation {
            // Lower limit.
            {
                let c = self.angle - self.lower_angle;
                let c_dot = vel_b.angular - vel_a.angular;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * inv_h);
                let old_impulse = self.lower_impulse;
                self.lower_impulse = (old_impulse + impulse).max(0.0);
                let impulse = self.lower_impulse - old_impulse;
                vel_a.angular -= i_a * impulse;
                vel_b.angular += i_b * impulse;
            }
            // Upper limit; signs flipped.
            {
                let c = self.upper_angle - self.angle;
                let c_dot = vel_a.angular - vel_b.angular;
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * inv_h);
                let old_impulse = self.upper_impulse;
                self.upper_impulse = (old_impulse + impulse).max(0.0);
                let impulse = self.upper_impulse - old_impulse;
                vel_a.angular += i_a * impulse;
                vel_b.angular -= i_b * impulse;
            }
        }

        // Point-to-point.
        let c_dot = vel_b.linear + cross_sv(vel_b.angular, self.r_b)
            - vel_a.linear
            - cross_sv(vel_a.angular, self.r_a);
        let impulse = solve22(self.k, -c_dot);
        self.impulse += impulse;

        vel_a.linear -= m_a * impulse;
        vel_a.angular -= i_a * cross(self.r_a, impulse);
        vel_b.linear += m_b * impulse;
        vel_b.angular += i_b * cross(self.r_b, impulse);

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);
        let mut pos_a = self.a.position(data);
        let mut pos_b = self.b.position(data);

        let mut angular_error = 0.0;
        let fixed_rotation = i_a + i_b == 0.0;

        if self.enable_limit && !fixed_rotation {
            let angle = pos_b.a - pos_a.a - self.reference_angle;
            let c = if (self.upper_angle - self.lower_angle).abs() < 2.0 * ANGULAR_SLOP {
                (angle - self.lower_angle).clamp(-MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION)
            } else if angle <= self.lower_angle {
                (angle - self.lower_angle + ANGULAR_SLOP).clamp(-MAX_ANGULAR_CORRECTION, 0.0)
            } else if angle >= self.upper_angle {
                (angle - self.upper_angle - ANGULAR_SLOP).clamp(0.0, MAX_ANGULAR_CORRECTION)
            } else {
                0.0
            };

            let limit_impulse = -self.axial_mass * c;
            pos_a.a -= i_a * limit_impulse;
            pos_b.a += i_b * limit_impulse;
            angular_error = c.abs();
        }

        let r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        let r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);
        let c = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c.length();

        let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
        let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
        let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
        let impulse = -solve22(k, c);

        pos_a.c -= m_a * impulse;
        pos_a.a -= i_a * cross(r_a, impulse);
        pos_b.c += m_b * impulse;
        pos_b.a += i_b * cross(r_b, impulse);

        data.positions[self.a.index] = pos_a;
        data.positions[self.b.index] = pos_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * (self.motor_impulse + self.lower_impulse - self.upper_impulse)
    }

    fn shift_origin(&mut self, new_origin: Vec2, world_anchored: bool) {
        if world_anchored {
            self.local_anchor_a -= new_origin;
        }
    }
}
