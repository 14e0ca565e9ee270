use glam::{Mat2, Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{validate_finite, Anchor, JointConstraint, JointFrame, JointSlots, SolverBodyRef};
use crate::{
    config::{ANGULAR_SLOP, LINEAR_SLOP},
    core::types::Rot,
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::BodyHandle,
        math::{cross, solve22, solve33},
    },
};

/// Lets B slide along an axis fixed in A, with rotation locked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrismaticJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    /// Slide axis in world space at creation.
    pub axis: Vec2,
    pub reference_angle: Option<f32>,
    pub enable_limit: bool,
    pub lower_translation: f32,
    pub upper_translation: f32,
    pub enable_motor: bool,
    pub motor_speed: f32,
    pub max_motor_force: f32,
}

impl PrismaticJointDef {
    pub fn new(body_a: Option<BodyHandle>, body_b: BodyHandle, anchor: Vec2, axis: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a: Anchor::World(anchor),
            anchor_b: Anchor::World(anchor),
            axis,
            reference_angle: None,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_force: 0.0,
        }
    }

    pub fn limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    pub fn motor(mut self, speed: f32, max_force: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_x_axis_a: Vec2,
    local_y_axis_a: Vec2,
    pub(crate) reference_angle: f32,
    enable_limit: bool,
    lower_translation: f32,
    upper_translation: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_force: f32,

    impulse: Vec2,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    axis: Vec2,
    perp: Vec2,
    s1: f32,
    s2: f32,
    a1: f32,
    a2: f32,
    k: Mat2,
    translation: f32,
    axial_mass: f32,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        let axis = def.axis.try_normalize().ok_or(PhysicsError::InvalidJoint {
            reason: "prismatic joint axis must be non-zero",
        })?;
        let reference_angle = def
            .reference_angle
            .unwrap_or(frame_b.angle - frame_a.angle);
        validate_finite(
            &[
                reference_angle,
                def.lower_translation,
                def.upper_translation,
                def.motor_speed,
                def.max_motor_force,
            ],
            "prismatic joint parameters must be finite",
        )?;
        if def.lower_translation > def.upper_translation {
            return Err(PhysicsError::InvalidJoint {
                reason: "prismatic joint lower translation exceeds upper translation",
            });
        }
        let local_x_axis_a = frame_a.xf.q.apply_inv(axis);
        Ok(Self {
            local_anchor_a: def.anchor_a.to_local(frame_a),
            local_anchor_b: def.anchor_b.to_local(frame_b),
            local_x_axis_a,
            local_y_axis_a: local_x_axis_a.perp(),
            reference_angle,
            enable_limit: def.enable_limit,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_force: def.max_motor_force.max(0.0),
            impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            axis: Vec2::ZERO,
            perp: Vec2::ZERO,
            s1: 0.0,
            s2: 0.0,
            a1: 0.0,
            a2: 0.0,
            k: Mat2::ZERO,
            translation: 0.0,
            axial_mass: 0.0,
        })
    }

    pub fn local_axis_a(&self) -> Vec2 {
        self.local_x_axis_a
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
        (self.lower_translation, self.upper_translation)
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        debug_assert!(lower <= upper);
        if lower != self.lower_translation || upper != self.upper_translation {
            self.lower_translation = lower;
            self.upper_translation = upper;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
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

    pub fn set_max_motor_force(&mut self, force: f32) {
        self.max_motor_force = force.max(0.0);
    }

    pub fn motor_force(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
    }

    fn apply(&self, data: &mut SolverData<'_>, p: Vec2, l_a: f32, l_b: f32) {
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);
        vel_a.linear -= self.a.inv_mass * p;
        vel_a.angular -= self.a.inv_i * l_a;
        vel_b.linear += self.b.inv_mass * p;
        vel_b.angular += self.b.inv_i * l_b;
        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }
}

impl JointConstraint for PrismaticJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let pos_a = self.a.position(data);
        let pos_b = self.b.position(data);
        let q_a = Rot::new(pos_a.a);
        let q_b = Rot::new(pos_b.a);

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let d = (pos_b.c - pos_a.c) + r_b - r_a;

        self.axis = q_a.apply(self.local_x_axis_a);
        self.a1 = cross(d + r_a, self.axis);
        self.a2 = cross(r_b, self.axis);
        self.axial_mass = m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2;
        if self.axial_mass > 0.0 {
            self.axial_mass = 1.0 / self.axial_mass;
        }

        self.perp = q_a.apply(self.local_y_axis_a);
        self.s1 = cross(d + r_a, self.perp);
        self.s2 = cross(r_b, self.perp);

        let k11 = m_a + m_b + i_a * self.s1 * self.s1 + i_b * self.s2 * self.s2;
        let k12 = i_a * self.s1 + i_b * self.s2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // Both bodies have fixed rotation.
            k22 = 1.0;
        }
        self.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));

        if self.enable_limit {
            self.translation = self.axis.dot(d);
        } else {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.motor_impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse.x * self.perp + axial_impulse * self.axis;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial_impulse * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial_impulse * self.a2;
            self.apply(data, p, l_a, l_b);
        } else {
            self.impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (h, inv_h) = (data.step.dt, data.step.inv_dt);
        let axial_speed = |data: &SolverData<'_>, joint: &Self| {
            let vel_a = joint.a.velocity(data);
            let vel_b = joint.b.velocity(data);
            joint.axis.dot(vel_b.linear - vel_a.linear) + joint.a2 * vel_b.angular
                - joint.a1 * vel_a.angular
        };

        if self.enable_motor {
            let c_dot = axial_speed(data, self);
            let impulse = self.axial_mass * (self.motor_speed - c_dot);
            let old_impulse = self.motor_impulse;
            let max_impulse = h * self.max_motor_force;
            self.motor_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;
            self.apply(data, impulse * self.axis, impulse * self.a1, impulse * self.a2);
        }

        if self.enable_limit {
            // Lower limit.
            {
                let c = self.translation - self.lower_translation;
                let c_dot = axial_speed(data, self);
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * inv_h);
                let old_impulse = self.lower_impulse;
                self.lower_impulse = (old_impulse + impulse).max(0.0);
                let impulse = self.lower_impulse - old_impulse;
                self.apply(data, impulse * self.axis, impulse * self.a1, impulse * self.a2);
            }
            // Upper limit; signs flipped.
            {
                let c = self.upper_translation - self.translation;
                let c_dot = -axial_speed(data, self);
                let impulse = -self.axial_mass * (c_dot + c.max(0.0) * inv_h);
                let old_impulse = self.upper_impulse;
                self.upper_impulse = (old_impulse + impulse).max(0.0);
                let impulse = self.upper_impulse - old_impulse;
                self.apply(
                    data,
                    -impulse * self.axis,
                    -impulse * self.a1,
                    -impulse * self.a2,
                );
            }
        }

        // Perpendicular and angular lock.
        let vel_a = self.a.velocity(data);
        let vel_b = self.b.velocity(data);
        let c_dot = Vec2::new(
            self.perp.dot(vel_b.linear - vel_a.linear) + self.s2 * vel_b.angular
                - self.s1 * vel_a.angular,
            vel_b.angular - vel_a.angular,
        );
        let df = solve22(self.k, -c_dot);
        self.impulse += df;

        let p = df.x * self.perp;
        let l_a = df.x * self.s1 + df.y;
        let l_b = df.x * self.s2 + df.y;
        self.apply(data, p, l_a, l_b);
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);
        let mut pos_a = self.a.position(data);
        let mut pos_b = self.b.position(data);
        let q_a = Rot::new(pos_a.a);
        let q_b = Rot::new(pos_b.a);

        let r_a = q_a.apply(self.local_anchor_a - self.a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - self.b.local_center);
        let d = pos_b.c + r_b - pos_a.c - r_a;

        let axis = q_a.apply(self.local_x_axis_a);
        let a1 = cross(d + r_a, axis);
        let a2 = cross(r_b, axis);
        let perp = q_a.apply(self.local_y_axis_a);
        let s1 = cross(d + r_a, perp);
        let s2 = cross(r_b, perp);

        let c1 = Vec2::new(perp.dot(d), pos_b.a - pos_a.a - self.reference_angle);
        let mut linear_error = c1.x.abs();
        let angular_error = c1.y.abs();

        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = axis.dot(d);
            if (self.upper_translation - self.lower_translation).abs() < 2.0 * LINEAR_SLOP {
                c2 = translation - self.lower_translation;
                linear_error = linear_error.max(c2.abs());
                active = true;
            } else if translation <= self.lower_translation {
                c2 = (translation - self.lower_translation).min(0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = (translation - self.upper_translation).max(0.0);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
        let k12 = i_a * s1 + i_b * s2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            k22 = 1.0;
        }

        let impulse = if active {
            let k13 = i_a * s1 * a1 + i_b * s2 * a2;
            let k23 = i_a * a1 + i_b * a2;
            let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
            let k = Mat3::from_cols(
                Vec3::new(k11, k12, k13),
                Vec3::new(k12, k22, k23),
                Vec3::new(k13, k23, k33),
            );
            solve33(&k, -Vec3::new(c1.x, c1.y, c2))
        } else {
            let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
            solve22(k, -c1).extend(0.0)
        };

        let p = impulse.x * perp + impulse.z * axis;
        let l_a = impulse.x * s1 + impulse.y + impulse.z * a1;
        let l_b = impulse.x * s2 + impulse.y + impulse.z * a2;

        pos_a.c -= m_a * p;
        pos_a.a -= i_a * l_a;
        pos_b.c += m_b * p;
        pos_b.a += i_b * l_b;

        data.positions[self.a.index] = pos_a;
        data.positions[self.b.index] = pos_b;

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
        inv_dt * (self.impulse.x * self.perp + axial * self.axis)
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse.y
    }

    fn shift_origin(&mut self, new_origin: Vec2, world_anchored: bool) {
        if world_anchored {
            self.local_anchor_a -= new_origin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_is_stored_in_body_a_frame() {
        let frame_a = JointFrame {
            xf: crate::core::types::Transform::new(Vec2::ZERO, std::f32::consts::FRAC_PI_2),
            angle: std::f32::consts::FRAC_PI_2,
        };
        let def = PrismaticJointDef::new(None, BodyHandle::new(0, 0), Vec2::ZERO, Vec2::new(0.0, 2.0));
        let joint = PrismaticJoint::new(&def, &frame_a, &JointFrame::WORLD).unwrap();
        assert!((joint.local_axis_a() - Vec2::X).length() < 1e-5);
    }

    #[test]
    fn zero_axis_is_rejected() {
        let def = PrismaticJointDef::new(None, BodyHandle::new(0, 0), Vec2::ZERO, Vec2::ZERO);
        assert!(PrismaticJoint::new(&def, &JointFrame::WORLD, &JointFrame::WORLD).is_err());
    }
}
