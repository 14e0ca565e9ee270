use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{validate_finite, Anchor, JointConstraint, JointFrame, JointSlots, SolverBodyRef};
use crate::{
    config::LINEAR_SLOP,
    core::types::Rot,
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::BodyHandle,
        math::{cross, cross_sv},
    },
};

/// Ropes over two fixed ground pulleys: `length_a + ratio * length_b` stays constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulleyJointDef {
    pub body_a: Option<BodyHandle>,
    pub body_b: BodyHandle,
    /// World point of the pulley above A.
    pub ground_anchor_a: Vec2,
    /// World point of the pulley above B.
    pub ground_anchor_b: Vec2,
    pub anchor_a: Anchor,
    pub anchor_b: Anchor,
    /// Rope lengths at rest; `None` measures them at creation.
    pub length_a: Option<f32>,
    pub length_b: Option<f32>,
    pub ratio: f32,
}

impl PulleyJointDef {
    pub fn new(
        body_a: Option<BodyHandle>,
        body_b: BodyHandle,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            ground_anchor_a,
            ground_anchor_b,
            anchor_a: Anchor::World(anchor_a),
            anchor_b: Anchor::World(anchor_b),
            length_a: None,
            length_b: None,
            ratio,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PulleyJoint {
    ground_anchor_a: Vec2,
    ground_anchor_b: Vec2,
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length_a: f32,
    length_b: f32,
    ratio: f32,
    constant: f32,

    impulse: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        let local_anchor_a = def.anchor_a.to_local(frame_a);
        let local_anchor_b = def.anchor_b.to_local(frame_b);
        let length_a = def
            .length_a
            .unwrap_or_else(|| frame_a.xf.apply(local_anchor_a).distance(def.ground_anchor_a));
        let length_b = def
            .length_b
            .unwrap_or_else(|| frame_b.xf.apply(local_anchor_b).distance(def.ground_anchor_b));
        validate_finite(
            &[
                def.ground_anchor_a.x,
                def.ground_anchor_a.y,
                def.ground_anchor_b.x,
                def.ground_anchor_b.y,
                length_a,
                length_b,
                def.ratio,
            ],
            "pulley joint parameters must be finite",
        )?;
        if def.ratio <= f32::EPSILON {
            return Err(PhysicsError::InvalidJoint {
                reason: "pulley joint ratio must be positive",
            });
        }
        Ok(Self {
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            local_anchor_a,
            local_anchor_b,
            length_a,
            length_b,
            ratio: def.ratio,
            constant: length_a + def.ratio * length_b,
            impulse: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            u_a: Vec2::ZERO,
            u_b: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        })
    }

    pub fn ground_anchors(&self) -> (Vec2, Vec2) {
        (self.ground_anchor_a, self.ground_anchor_b)
    }

    /// Rest lengths at creation.
    pub fn lengths(&self) -> (f32, f32) {
        (self.length_a, self.length_b)
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Unit rope directions and their lengths, from the ground anchors to the bodies.
    fn ropes(&self, c_a: Vec2, r_a: Vec2, c_b: Vec2, r_b: Vec2) -> (Vec2, f32, Vec2, f32) {
        let rope = |v: Vec2| {
            let length = v.length();
            if length > 10.0 * LINEAR_SLOP {
                (v / length, length)
            } else {
                (Vec2::ZERO, length)
            }
        };
        let (u_a, length_a) = rope(c_a + r_a - self.ground_anchor_a);
        let (u_b, length_b) = rope(c_b + r_b - self.ground_anchor_b);
        (u_a, length_a, u_b, length_b)
    }

    fn effective_mass(&self, r_a: Vec2, u_a: Vec2, r_b: Vec2, u_b: Vec2) -> f32 {
        let ru_a = cross(r_a, u_a);
        let ru_b = cross(r_b, u_b);
        let m_a = self.a.inv_mass + self.a.inv_i * ru_a * ru_a;
        let m_b = self.b.inv_mass + self.b.inv_i * ru_b * ru_b;
        let mass = m_a + self.ratio * self.ratio * m_b;
        if mass > 0.0 {
            1.0 / mass
        } else {
            0.0
        }
    }
}

impl JointConstraint for PulleyJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);

        let pos_a = self.a.position(data);
        let pos_b = self.b.position(data);
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);

        self.r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        self.r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);
        let (u_a, _, u_b, _) = self.ropes(pos_a.c, self.r_a, pos_b.c, self.r_b);
        self.u_a = u_a;
        self.u_b = u_b;
        self.mass = self.effective_mass(self.r_a, u_a, self.r_b, u_b);

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            let p_a = -self.impulse * self.u_a;
            let p_b = -self.ratio * self.impulse * self.u_b;
            vel_a.linear += self.a.inv_mass * p_a;
            vel_a.angular += self.a.inv_i * cross(self.r_a, p_a);
            vel_b.linear += self.b.inv_mass * p_b;
            vel_b.angular += self.b.inv_i * cross(self.r_b, p_b);
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
        let c_dot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
        let impulse = -self.mass * c_dot;
        self.impulse += impulse;

        let p_a = -impulse * self.u_a;
        let p_b = -self.ratio * impulse * self.u_b;
        vel_a.linear += self.a.inv_mass * p_a;
        vel_a.angular += self.a.inv_i * cross(self.r_a, p_a);
        vel_b.linear += self.b.inv_mass * p_b;
        vel_b.angular += self.b.inv_i * cross(self.r_b, p_b);

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let mut pos_a = self.a.position(data);
        let mut pos_b = self.b.position(data);

        let r_a = Rot::new(pos_a.a).apply(self.local_anchor_a - self.a.local_center);
        let r_b = Rot::new(pos_b.a).apply(self.local_anchor_b - self.b.local_center);
        let (u_a, length_a, u_b, length_b) = self.ropes(pos_a.c, r_a, pos_b.c, r_b);
        let mass = self.effective_mass(r_a, u_a, r_b, u_b);

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = c.abs();
        let impulse = -mass * c;

        let p_a = -impulse * u_a;
        let p_b = -self.ratio * impulse * u_b;
        pos_a.c += self.a.inv_mass * p_a;
        pos_a.a += self.a.inv_i * cross(r_a, p_a);
        pos_b.c += self.b.inv_mass * p_b;
        pos_b.a += self.b.inv_i * cross(r_b, p_b);

        data.positions[self.a.index] = pos_a;
        data.positions[self.b.index] = pos_b;

        linear_error < LINEAR_SLOP
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse * self.u_b
    }

    fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }

    fn shift_origin(&mut self, new_origin: Vec2, world_anchored: bool) {
        self.ground_anchor_a -= new_origin;
        self.ground_anchor_b -= new_origin;
        if world_anchored {
            self.local_anchor_a -= new_origin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_sums_both_ropes() {
        let frame_a = JointFrame {
            xf: crate::core::types::Transform::from_position(Vec2::new(-2.0, 0.0)),
            angle: 0.0,
        };
        let frame_b = JointFrame {
            xf: crate::core::types::Transform::from_position(Vec2::new(2.0, 1.0)),
            angle: 0.0,
        };
        let def = PulleyJointDef::new(
            Some(BodyHandle::new(0, 0)),
            BodyHandle::new(1, 0),
            Vec2::new(-2.0, 5.0),
            Vec2::new(2.0, 5.0),
            Vec2::new(-2.0, 0.0),
            Vec2::new(2.0, 1.0),
            2.0,
        );
        let joint = PulleyJoint::new(&def, &frame_a, &frame_b).unwrap();
        assert_eq!(joint.lengths(), (5.0, 4.0));
        assert!((joint.constant - 13.0).abs() < 1e-5);
    }

    #[test]
    fn zero_ratio_is_rejected() {
        let mut def = PulleyJointDef::new(
            None,
            BodyHandle::new(1, 0),
            Vec2::ZERO,
            Vec2::X,
            Vec2::new(0.0, -1.0),
            Vec2::new(1.0, -1.0),
            1.0,
        );
        def.ratio = 0.0;
        assert!(PulleyJoint::new(&def, &JointFrame::WORLD, &JointFrame::WORLD).is_err());
    }
}
