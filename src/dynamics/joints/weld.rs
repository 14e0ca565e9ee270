use glam::{Mat3, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use super::{
    soft_constraint, validate_finite, Anchor, JointConstraint, JointFrame, JointSlots,
    SolverBodyRef,
};
use crate::{
    config::{ANGULAR_SLOP, LINEAR_SLOP},
    core::types::Rot,
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::BodyHandle,
        math::{cross, cross_sv, inverse22_of33, mul22, solve33, solve33_block22, sym_inverse33},
    },
};

/// Glues two bodies together. A positive frequency softens the angular part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeldJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    /// Angle of B relative to A at rest; `None` uses the angle at creation.
    pub reference_angle: Option<f32>,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WeldJointDef {
    pub fn new(body_a: Option<BodyHandle>, body_b: BodyHandle, anchor: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            anchor_a: Anchor::World(anchor),
            anchor_b: Anchor::World(anchor),
            reference_angle: None,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    pub fn spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

#[derive(Debug, Clone)]
pub struct WeldJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f32,
    frequency_hz: f32,
    damping_ratio: f32,

    impulse: Vec3,
    gamma: f32,
    bias: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat3,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        let reference_angle = def
            .reference_angle
            .unwrap_or(frame_b.angle - frame_a.angle);
        validate_finite(
            &[reference_angle, def.frequency_hz, def.damping_ratio],
            "weld joint parameters must be finite",
        )?;
        if def.frequency_hz < 0.0 || def.damping_ratio < 0.0 {
            return Err(PhysicsError::InvalidJoint {
                reason: "weld joint spring parameters must be non-negative",
            });
        }
        Ok(Self {
            local_anchor_a: def.anchor_a.to_local(frame_a),
            local_anchor_b: def.anchor_b.to_local(frame_b),
            reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: Vec3::ZERO,
            gamma: 0.0,
            bias: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
        })
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_spring(&mut self, frequency_hz: f32, damping_ratio: f32) {
        self.frequency_hz = frequency_hz.max(0.0);
        self.damping_ratio = damping_ratio.max(0.0);
    }

    /// Point-and-angle effective mass matrix before inversion.
    fn stiffness(&self, r_a: Vec2, r_b: Vec2) -> Mat3 {
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let ex = Vec3::new(
            m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
            -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
            -r_a.y * i_a - r_b.y * i_b,
        );
        let ey = Vec3::new(
            ex.y,
            m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b,
            r_a.x * i_a + r_b.x * i_b,
        );
        let ez = Vec3::new(ex.z, ey.z, i_a + i_b);
        Mat3::from_cols(ex, ey, ez)
    }
}

impl JointConstraint for WeldJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);

        let pos_a = self.a.position(data);
        let pos_b = self.b.position(data);
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);

        self.r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        self.r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);

        let k = self.stiffness(self.r_a, self.r_b);
        if self.frequency_hz > 0.0 {
            self.mass = inverse22_of33(&k);

            let mut inv_m = self.a.inv_i + self.b.inv_i;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };
            let c = pos_b.a - pos_a.a - self.reference_angle;
            let (gamma, bias) =
                soft_constraint(m, self.frequency_hz, self.damping_ratio, c, data.step.dt);
            self.gamma = gamma;
            self.bias = bias;

            inv_m += self.gamma;
            self.mass.z_axis.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else if k.z_axis.z == 0.0 {
            self.mass = inverse22_of33(&k);
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = sym_inverse33(&k);
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p = self.impulse.truncate();
            vel_a.linear -= self.a.inv_mass * p;
            vel_a.angular -= self.a.inv_i * (cross(self.r_a, p) + self.impulse.z);
            vel_b.linear += self.b.inv_mass * p;
            vel_b.angular += self.b.inv_i * (cross(self.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        if self.frequency_hz > 0.0 {
            let c_dot2 = vel_b.angular - vel_a.angular;
            let impulse2 = -self.mass.z_axis.z * (c_dot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;
            vel_a.angular -= i_a * impulse2;
            vel_b.angular += i_b * impulse2;

            let c_dot1 = vel_b.linear + cross_sv(vel_b.angular, self.r_b)
                - vel_a.linear
                - cross_sv(vel_a.angular, self.r_a);
            let impulse1 = -mul22(&self.mass, c_dot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            vel_a.linear -= m_a * impulse1;
            vel_a.angular -= i_a * cross(self.r_a, impulse1);
            vel_b.linear += m_b * impulse1;
            vel_b.angular += i_b * cross(self.r_b, impulse1);
        } else {
            let c_dot1 = vel_b.linear + cross_sv(vel_b.angular, self.r_b)
                - vel_a.linear
                - cross_sv(vel_a.angular, self.r_a);
            let c_dot2 = vel_b.angular - vel_a.angular;
            let impulse = -(self.mass * c_dot1.extend(c_dot2));
            self.impulse += impulse;

            let p = impulse.truncate();
            vel_a.linear -= m_a * p;
            vel_a.angular -= i_a * (cross(self.r_a, p) + impulse.z);
            vel_b.linear += m_b * p;
            vel_b.angular += i_b * (cross(self.r_b, p) + impulse.z);
        }

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let mut pos_a = self.a.position(data);
        let mut pos_b = self.b.position(data);
        let (m_a, m_b) = (self.a.inv_mass, self.b.inv_mass);
        let (i_a, i_b) = (self.a.inv_i, self.b.inv_i);

        let r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        let r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);
        let k = self.stiffness(r_a, r_b);

        let c1 = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c1.length();
        let angular_error;

        if self.frequency_hz > 0.0 {
            angular_error = 0.0;
            let p = -solve33_block22(&k, c1);
            pos_a.c -= m_a * p;
            pos_a.a -= i_a * cross(r_a, p);
            pos_b.c += m_b * p;
            pos_b.a += i_b * cross(r_b, p);
        } else {
            let c2 = pos_b.a - pos_a.a - self.reference_angle;
            angular_error = c2.abs();

            let impulse = if k.z_axis.z > 0.0 {
                -solve33(&k, c1.extend(c2))
            } else {
                (-solve33_block22(&k, c1)).extend(0.0)
            };
            let p = impulse.truncate();
            pos_a.c -= m_a * p;
            pos_a.a -= i_a * (cross(r_a, p) + impulse.z);
            pos_b.c += m_b * p;
            pos_b.a += i_b * (cross(r_b, p) + impulse.z);
        }

        data.positions[self.a.index] = pos_a;
        data.positions[self.b.index] = pos_b;

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse.truncate()
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse.z
    }

    fn shift_origin(&mut self, new_origin: Vec2, world_anchored: bool) {
        if world_anchored {
            self.local_anchor_a -= new_origin;
        }
    }
}
