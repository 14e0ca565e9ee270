use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{Joint, JointConstraint, JointFrame, JointKind, JointSlots, SolverBodyRef};
use crate::{
    core::types::{Position, Rot},
    dynamics::solver::SolverData,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::{BodyHandle, JointHandle},
        math::cross,
    },
};

/// Couples the coordinates of two revolute or prismatic joints:
/// `coordinate1 + ratio * coordinate2` stays constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GearJointDef {
    pub joint1: JointHandle,
    pub joint2: JointHandle,
    pub ratio: f32,
}

impl GearJointDef {
    pub fn new(joint1: JointHandle, joint2: JointHandle, ratio: f32) -> Self {
        Self { joint1, joint2, ratio }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Coupled {
    Revolute,
    Prismatic,
}

/// One side of the gear: the coupled joint's moving body and its ground body.
#[derive(Debug, Clone, Copy)]
struct GearSide {
    coupled: Coupled,
    local_anchor: Vec2,
    local_anchor_ground: Vec2,
    local_axis_ground: Vec2,
    reference_angle: f32,
}

impl GearSide {
    fn from_joint(joint: &Joint) -> PhysicsResult<Self> {
        match &joint.kind {
            JointKind::Revolute(rev) => Ok(Self {
                coupled: Coupled::Revolute,
                local_anchor: rev.local_anchor_b,
                local_anchor_ground: rev.local_anchor_a,
                local_axis_ground: Vec2::ZERO,
                reference_angle: rev.reference_angle,
            }),
            JointKind::Prismatic(pri) => Ok(Self {
                coupled: Coupled::Prismatic,
                local_anchor: pri.local_anchor_b,
                local_anchor_ground: pri.local_anchor_a,
                local_axis_ground: pri.local_x_axis_a,
                reference_angle: pri.reference_angle,
            }),
            _ => Err(PhysicsError::InvalidJoint {
                reason: "gear joints couple revolute or prismatic joints only",
            }),
        }
    }

    /// Joint coordinate of the moving body relative to its ground body.
    fn coordinate(&self, frame: &JointFrame, ground: &JointFrame) -> f32 {
        match self.coupled {
            Coupled::Revolute => frame.angle - ground.angle - self.reference_angle,
            Coupled::Prismatic => {
                let p_ground = self.local_anchor_ground;
                let p = ground
                    .xf
                    .q
                    .apply_inv(frame.xf.q.apply(self.local_anchor) + (frame.xf.p - ground.xf.p));
                (p - p_ground).dot(self.local_axis_ground)
            }
        }
    }

    /// Same as [`coordinate`](Self::coordinate), from island center-of-mass positions.
    fn solver_coordinate(
        &self,
        moving: &SolverBodyRef,
        pos: Position,
        ground: &SolverBodyRef,
        pos_ground: Position,
    ) -> f32 {
        match self.coupled {
            Coupled::Revolute => pos.a - pos_ground.a - self.reference_angle,
            Coupled::Prismatic => {
                let p_ground = self.local_anchor_ground - ground.local_center;
                let r = Rot::new(pos.a).apply(self.local_anchor - moving.local_center);
                let p = Rot::new(pos_ground.a).apply_inv(r + (pos.c - pos_ground.c));
                (p - p_ground).dot(self.local_axis_ground)
            }
        }
    }

    /// Jacobian `(linear, angular moving, angular ground)` and the mass contribution.
    fn jacobian(
        &self,
        moving: &SolverBodyRef,
        q: Rot,
        ground: &SolverBodyRef,
        q_ground: Rot,
    ) -> (Vec2, f32, f32, f32) {
        match self.coupled {
            Coupled::Revolute => (Vec2::ZERO, 1.0, 1.0, moving.inv_i + ground.inv_i),
            Coupled::Prismatic => {
                let u = q_ground.apply(self.local_axis_ground);
                let r_ground = q_ground.apply(self.local_anchor_ground - ground.local_center);
                let r = q.apply(self.local_anchor - moving.local_center);
                let jw_ground = cross(r_ground, u);
                let jw = cross(r, u);
                let mass = ground.inv_mass
                    + moving.inv_mass
                    + ground.inv_i * jw_ground * jw_ground
                    + moving.inv_i * jw * jw;
                (u, jw, jw_ground, mass)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GearJoint {
    pub(crate) joint1: JointHandle,
    pub(crate) joint2: JointHandle,
    /// Ground body of `joint1`; `None` for the world.
    pub(crate) body_c: Option<BodyHandle>,
    /// Ground body of `joint2`; `None` for the world.
    pub(crate) body_d: Option<BodyHandle>,

    side_a: GearSide,
    side_b: GearSide,
    ratio: f32,
    constant: f32,

    impulse: f32,

    a: SolverBodyRef,
    b: SolverBodyRef,
    c: SolverBodyRef,
    d: SolverBodyRef,
    jv_ac: Vec2,
    jv_bd: Vec2,
    jw_a: f32,
    jw_b: f32,
    jw_c: f32,
    jw_d: f32,
    mass: f32,
}

impl GearJoint {
    /// `frames` holds the poses of bodies A, B, C and D: the moving and ground
    /// bodies of `joint1` and `joint2`.
    pub(crate) fn new(
        def: &GearJointDef,
        joint1: &Joint,
        joint2: &Joint,
        frames: [JointFrame; 4],
    ) -> PhysicsResult<Self> {
        if !def.ratio.is_finite() {
            return Err(PhysicsError::InvalidJoint {
                reason: "gear joint ratio must be finite",
            });
        }
        if def.joint1 == def.joint2 {
            return Err(PhysicsError::InvalidJoint {
                reason: "a gear joint cannot couple a joint with itself",
            });
        }
        let side_a = GearSide::from_joint(joint1)?;
        let side_b = GearSide::from_joint(joint2)?;
        let [frame_a, frame_b, frame_c, frame_d] = frames;
        let coordinate_a = side_a.coordinate(&frame_a, &frame_c);
        let coordinate_b = side_b.coordinate(&frame_b, &frame_d);

        Ok(Self {
            joint1: def.joint1,
            joint2: def.joint2,
            body_c: joint1.body_a,
            body_d: joint2.body_a,
            side_a,
            side_b,
            ratio: def.ratio,
            constant: coordinate_a + def.ratio * coordinate_b,
            impulse: 0.0,
            a: SolverBodyRef::default(),
            b: SolverBodyRef::default(),
            c: SolverBodyRef::default(),
            d: SolverBodyRef::default(),
            jv_ac: Vec2::ZERO,
            jv_bd: Vec2::ZERO,
            jw_a: 0.0,
            jw_b: 0.0,
            jw_c: 0.0,
            jw_d: 0.0,
            mass: 0.0,
        })
    }

    pub fn joints(&self) -> (JointHandle, JointHandle) {
        (self.joint1, self.joint2)
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        if ratio.is_finite() {
            self.ratio = ratio;
        }
    }

    fn apply_velocity(&self, data: &mut SolverData<'_>, impulse: f32) {
        let mut vel_a = self.a.velocity(data);
        let mut vel_b = self.b.velocity(data);
        let mut vel_c = self.c.velocity(data);
        let mut vel_d = self.d.velocity(data);

        vel_a.linear += (self.a.inv_mass * impulse) * self.jv_ac;
        vel_a.angular += self.a.inv_i * impulse * self.jw_a;
        vel_b.linear += (self.b.inv_mass * impulse) * self.jv_bd;
        vel_b.angular += self.b.inv_i * impulse * self.jw_b;
        vel_c.linear -= (self.c.inv_mass * impulse) * self.jv_ac;
        vel_c.angular -= self.c.inv_i * impulse * self.jw_c;
        vel_d.linear -= (self.d.inv_mass * impulse) * self.jv_bd;
        vel_d.angular -= self.d.inv_i * impulse * self.jw_d;

        data.velocities[self.a.index] = vel_a;
        data.velocities[self.b.index] = vel_b;
        data.velocities[self.c.index] = vel_c;
        data.velocities[self.d.index] = vel_d;
    }
}

impl JointConstraint for GearJoint {
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.a = SolverBodyRef::load(slots.a, data.bodies);
        self.b = SolverBodyRef::load(slots.b, data.bodies);
        self.c = SolverBodyRef::load(slots.c, data.bodies);
        self.d = SolverBodyRef::load(slots.d, data.bodies);

        let q_a = Rot::new(self.a.position(data).a);
        let q_b = Rot::new(self.b.position(data).a);
        let q_c = Rot::new(self.c.position(data).a);
        let q_d = Rot::new(self.d.position(data).a);

        let (jv_ac, jw_a, jw_c, mass_ac) = self.side_a.jacobian(&self.a, q_a, &self.c, q_c);
        let (u_bd, jw_b, jw_d, mass_bd) = self.side_b.jacobian(&self.b, q_b, &self.d, q_d);

        self.jv_ac = jv_ac;
        self.jw_a = jw_a;
        self.jw_c = jw_c;
        self.jv_bd = self.ratio * u_bd;
        self.jw_b = self.ratio * jw_b;
        self.jw_d = self.ratio * jw_d;

        let mass = mass_ac + self.ratio * self.ratio * mass_bd;
        self.mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.apply_velocity(data, self.impulse);
        } else {
            self.impulse = 0.0;
        }
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let vel_a = self.a.velocity(data);
        let vel_b = self.b.velocity(data);
        let vel_c = self.c.velocity(data);
        let vel_d = self.d.velocity(data);

        let c_dot = self.jv_ac.dot(vel_a.linear - vel_c.linear)
            + self.jv_bd.dot(vel_b.linear - vel_d.linear)
            + (self.jw_a * vel_a.angular - self.jw_c * vel_c.angular)
            + (self.jw_b * vel_b.angular - self.jw_d * vel_d.angular);

        let impulse = -self.mass * c_dot;
        self.impulse += impulse;
        self.apply_velocity(data, impulse);
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let mut pos_a = self.a.position(data);
        let mut pos_b = self.b.position(data);
        let mut pos_c = self.c.position(data);
        let mut pos_d = self.d.position(data);

        let (q_a, q_b, q_c, q_d) = (
            Rot::new(pos_a.a),
            Rot::new(pos_b.a),
            Rot::new(pos_c.a),
            Rot::new(pos_d.a),
        );

        let (jv_ac, jw_a, jw_c, mass_ac) = self.side_a.jacobian(&self.a, q_a, &self.c, q_c);
        let (u_bd, jw_b, jw_d, mass_bd) = self.side_b.jacobian(&self.b, q_b, &self.d, q_d);
        let (jv_bd, jw_b, jw_d) = (self.ratio * u_bd, self.ratio * jw_b, self.ratio * jw_d);
        let mass = mass_ac + self.ratio * self.ratio * mass_bd;

        let coordinate_a = self.side_a.solver_coordinate(&self.a, pos_a, &self.c, pos_c);
        let coordinate_b = self.side_b.solver_coordinate(&self.b, pos_b, &self.d, pos_d);

        let c = coordinate_a + self.ratio * coordinate_b - self.constant;
        let impulse = if mass > 0.0 { -c / mass } else { 0.0 };

        pos_a.c += self.a.inv_mass * impulse * jv_ac;
        pos_a.a += self.a.inv_i * impulse * jw_a;
        pos_b.c += self.b.inv_mass * impulse * jv_bd;
        pos_b.a += self.b.inv_i * impulse * jw_b;
        pos_c.c -= self.c.inv_mass * impulse * jv_ac;
        pos_c.a -= self.c.inv_i * impulse * jw_c;
        pos_d.c -= self.d.inv_mass * impulse * jv_bd;
        pos_d.a -= self.d.inv_i * impulse * jw_d;

        data.positions[self.a.index] = pos_a;
        data.positions[self.b.index] = pos_b;
        data.positions[self.c.index] = pos_c;
        data.positions[self.d.index] = pos_d;

        // The gear error is not tracked; the coupled joints decide convergence.
        true
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse * self.jv_ac
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse * self.jw_a
    }

    fn shift_origin(&mut self, new_origin: Vec2, _world_anchored: bool) {
        if self.body_c.is_none() {
            self.side_a.local_anchor_ground -= new_origin;
        }
        if self.body_d.is_none() {
            self.side_b.local_anchor_ground -= new_origin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::joints::{DistanceJointDef, JointDef, RevoluteJointDef};
    use crate::core::types::Transform;

    fn frame(x: f32, y: f32, angle: f32) -> JointFrame {
        JointFrame {
            xf: Transform::new(Vec2::new(x, y), angle),
            angle,
        }
    }

    #[test]
    fn constant_combines_both_coordinates() {
        let a = BodyHandle::new(1, 0);
        let b = BodyHandle::new(2, 0);
        let rev1: JointDef = RevoluteJointDef::new(None, a, Vec2::ZERO).into();
        let rev2: JointDef = RevoluteJointDef::new(None, b, Vec2::new(3.0, 0.0)).into();
        let joint1 = Joint::new(&rev1, &JointFrame::WORLD, &frame(0.0, 0.0, 0.0)).unwrap();
        let joint2 = Joint::new(&rev2, &JointFrame::WORLD, &frame(3.0, 0.0, 0.0)).unwrap();

        let def = GearJointDef::new(JointHandle::new(0, 0), JointHandle::new(1, 0), 2.0);
        let gear = GearJoint::new(
            &def,
            &joint1,
            &joint2,
            [frame(0.0, 0.0, 0.5), frame(3.0, 0.0, 0.25), JointFrame::WORLD, JointFrame::WORLD],
        )
        .unwrap();
        assert!((gear.constant - 1.0).abs() < 1e-6);
        assert_eq!(gear.body_c, None);
        assert_eq!(gear.joints(), (JointHandle::new(0, 0), JointHandle::new(1, 0)));
    }

    #[test]
    fn rejects_other_joint_kinds() {
        let a = BodyHandle::new(1, 0);
        let dist: JointDef = DistanceJointDef::new(None, a, Vec2::ZERO, Vec2::X).into();
        let distance = Joint::new(&dist, &JointFrame::WORLD, &frame(0.0, 0.0, 0.0)).unwrap();
        let def = GearJointDef::new(JointHandle::new(0, 0), JointHandle::new(1, 0), 1.0);
        let frames = [JointFrame::WORLD; 4];
        assert!(GearJoint::new(&def, &distance, &distance, frames).is_err());
    }
}
