//! Joint framework: a shared header plus one constraint module per joint kind.
//!
//! Joints are solved inside islands on island-local body slots. A joint
//! whose `body_a` is `None` is anchored to the world; its A-side anchors are
//! then expressed in world coordinates.

mod angle;
mod distance;
mod friction;
mod gear;
mod motor;
mod prismatic;
mod pulley;
mod revolute;
mod weld;

use glam::Vec2;
use serde::{Deserialize, Serialize};

pub use angle::{AngleJoint, AngleJointDef};
pub use distance::{DistanceJoint, DistanceJointDef};
pub use friction::{FrictionJoint, FrictionJointDef};
pub use gear::{GearJoint, GearJointDef};
pub use motor::{MotorJoint, MotorJointDef};
pub use prismatic::{PrismaticJoint, PrismaticJointDef};
pub use pulley::{PulleyJoint, PulleyJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use weld::{WeldJoint, WeldJointDef};

use crate::{
    core::{
        body::Body,
        types::{Position, Transform, Velocity},
    },
    dynamics::solver::{SolverBody, SolverData},
    error::{PhysicsError, PhysicsResult},
    utils::allocator::{BodyHandle, JointHandle},
};

/// Joint anchor given either in world space or in the owning body's frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Anchor {
    World(Vec2),
    Local(Vec2),
}

impl Anchor {
    pub(crate) fn to_local(self, frame: &JointFrame) -> Vec2 {
        match self {
            Anchor::World(point) => frame.xf.apply_inv(point),
            Anchor::Local(point) => point,
        }
    }
}

/// Pose of one joint body at creation time. The world frame for `None` bodies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct JointFrame {
    pub xf: Transform,
    pub angle: f32,
}

impl JointFrame {
    pub const WORLD: JointFrame = JointFrame {
        xf: Transform::IDENTITY,
        angle: 0.0,
    };

    pub fn of(body: Option<&Body>) -> Self {
        body.map_or(Self::WORLD, |body| JointFrame {
            xf: body.transform(),
            angle: body.angle(),
        })
    }
}

/// Island slots of the bodies a joint acts on. `c` and `d` are only used by gears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct JointSlots {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
}

/// Mass properties of one joint body cached at velocity initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct SolverBodyRef {
    pub index: usize,
    pub local_center: Vec2,
    pub inv_mass: f32,
    pub inv_i: f32,
}

impl SolverBodyRef {
    pub fn load(index: usize, bodies: &[SolverBody]) -> Self {
        let body = &bodies[index];
        Self {
            index,
            local_center: body.local_center(),
            inv_mass: body.inv_mass,
            inv_i: body.inv_inertia,
        }
    }

    pub fn position(&self, data: &SolverData<'_>) -> Position {
        data.positions[self.index]
    }

    pub fn velocity(&self, data: &SolverData<'_>) -> Velocity {
        data.velocities[self.index]
    }
}

/// Per-kind constraint behavior driven by the island solver.
pub(crate) trait JointConstraint {
    /// Caches masses and anchors and applies the warm-start impulse.
    fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>);

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>);

    /// Returns `true` when the position error is within tolerance.
    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool;

    fn reaction_force(&self, inv_dt: f32) -> Vec2;

    fn reaction_torque(&self, inv_dt: f32) -> f32;

    /// Moves anchors stored in world coordinates.
    fn shift_origin(&mut self, _new_origin: Vec2, _world_anchored: bool) {}
}

/// Closed set of joint kinds.
#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Pulley(PulleyJoint),
    Gear(GearJoint),
    Weld(WeldJoint),
    Motor(MotorJoint),
    Angle(AngleJoint),
    Friction(FrictionJoint),
}

/// Discriminant of [`JointKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    Distance,
    Revolute,
    Prismatic,
    Pulley,
    Gear,
    Weld,
    Motor,
    Angle,
    Friction,
}

impl JointKind {
    pub fn joint_type(&self) -> JointType {
        match self {
            JointKind::Distance(_) => JointType::Distance,
            JointKind::Revolute(_) => JointType::Revolute,
            JointKind::Prismatic(_) => JointType::Prismatic,
            JointKind::Pulley(_) => JointType::Pulley,
            JointKind::Gear(_) => JointType::Gear,
            JointKind::Weld(_) => JointType::Weld,
            JointKind::Motor(_) => JointType::Motor,
            JointKind::Angle(_) => JointType::Angle,
            JointKind::Friction(_) => JointType::Friction,
        }
    }

    fn constraint(&self) -> &dyn JointConstraint {
        match self {
            JointKind::Distance(j) => j,
            JointKind::Revolute(j) => j,
            JointKind::Prismatic(j) => j,
            JointKind::Pulley(j) => j,
            JointKind::Gear(j) => j,
            JointKind::Weld(j) => j,
            JointKind::Motor(j) => j,
            JointKind::Angle(j) => j,
            JointKind::Friction(j) => j,
        }
    }

    fn constraint_mut(&mut self) -> &mut dyn JointConstraint {
        match self {
            JointKind::Distance(j) => j,
            JointKind::Revolute(j) => j,
            JointKind::Prismatic(j) => j,
            JointKind::Pulley(j) => j,
            JointKind::Gear(j) => j,
            JointKind::Weld(j) => j,
            JointKind::Motor(j) => j,
            JointKind::Angle(j) => j,
            JointKind::Friction(j) => j,
        }
    }
}

/// Kind-specific part of a [`JointDef`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointKindDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Pulley(PulleyJointDef),
    Gear(GearJointDef),
    Weld(WeldJointDef),
    Motor(MotorJointDef),
    Angle(AngleJointDef),
    Friction(FrictionJointDef),
}

/// Construction parameters for a joint.
///
/// Build one from a kind definition with `.into()` and tune the shared
/// options with the builder methods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    pub kind: JointKindDef,
    /// Whether the connected bodies still collide with each other.
    pub collide_connected: bool,
    /// Reaction impulse above which the joint breaks.
    pub breakpoint: f32,
    pub user_data: u64,
}

impl JointDef {
    pub fn new(kind: JointKindDef) -> Self {
        Self {
            kind,
            collide_connected: false,
            breakpoint: f32::MAX,
            user_data: 0,
        }
    }

    pub fn collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    pub fn breakpoint(mut self, breakpoint: f32) -> Self {
        self.breakpoint = breakpoint;
        self
    }

    pub fn user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    /// Bodies named by the definition. Gears name joints instead and return `None`.
    pub fn bodies(&self) -> Option<(Option<BodyHandle>, BodyHandle)> {
        match &self.kind {
            JointKindDef::Distance(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Revolute(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Prismatic(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Pulley(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Weld(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Motor(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Angle(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Friction(d) => Some((d.body_a, d.body_b)),
            JointKindDef::Gear(_) => None,
        }
    }
}

macro_rules! impl_into_joint_def {
    ($($def:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$def> for JointDef {
                fn from(def: $def) -> Self {
                    JointDef::new(JointKindDef::$variant(def))
                }
            }
        )*
    };
}

impl_into_joint_def!(
    DistanceJointDef => Distance,
    RevoluteJointDef => Revolute,
    PrismaticJointDef => Prismatic,
    PulleyJointDef => Pulley,
    GearJointDef => Gear,
    WeldJointDef => Weld,
    MotorJointDef => Motor,
    AngleJointDef => Angle,
    FrictionJointDef => Friction,
);

/// Constraint between two bodies, or between a body and the world.
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) body_a: Option<BodyHandle>,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) breakpoint: f32,
    pub(crate) enabled: bool,
    pub(crate) island_flag: bool,
    pub(crate) broken: bool,
    pub(crate) kind: JointKind,
    pub user_data: u64,
}

impl Joint {
    /// Builds every kind except gears, which need the joints they couple.
    pub(crate) fn new(def: &JointDef, frame_a: &JointFrame, frame_b: &JointFrame) -> PhysicsResult<Self> {
        let gear_error = PhysicsError::InvalidJoint {
            reason: "gear joints are built from their coupled joints",
        };
        let (body_a, body_b) = def.bodies().ok_or(gear_error.clone())?;
        let kind = match &def.kind {
            JointKindDef::Distance(d) => JointKind::Distance(DistanceJoint::new(d, frame_a, frame_b)?),
            JointKindDef::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d, frame_a, frame_b)?),
            JointKindDef::Prismatic(d) => {
                JointKind::Prismatic(PrismaticJoint::new(d, frame_a, frame_b)?)
            }
            JointKindDef::Pulley(d) => JointKind::Pulley(PulleyJoint::new(d, frame_a, frame_b)?),
            JointKindDef::Weld(d) => JointKind::Weld(WeldJoint::new(d, frame_a, frame_b)?),
            JointKindDef::Motor(d) => JointKind::Motor(MotorJoint::new(d, frame_a, frame_b)?),
            JointKindDef::Angle(d) => JointKind::Angle(AngleJoint::new(d)?),
            JointKindDef::Friction(d) => JointKind::Friction(FrictionJoint::new(d, frame_a, frame_b)?),
            JointKindDef::Gear(_) => return Err(gear_error),
        };
        Ok(Self::with_kind(def, body_a, body_b, kind))
    }

    pub(crate) fn with_kind(
        def: &JointDef,
        body_a: Option<BodyHandle>,
        body_b: BodyHandle,
        kind: JointKind,
    ) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: def.collide_connected,
            breakpoint: def.breakpoint,
            enabled: true,
            island_flag: false,
            broken: false,
            kind,
            user_data: def.user_data,
        }
    }

    pub fn joint_type(&self) -> JointType {
        self.kind.joint_type()
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// `None` when the joint is anchored to the world.
    pub fn body_a(&self) -> Option<BodyHandle> {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    /// Every body the constraint acts on, including a gear's ground bodies.
    pub fn bodies(&self) -> [Option<BodyHandle>; 4] {
        match &self.kind {
            JointKind::Gear(gear) => [self.body_a, Some(self.body_b), gear.body_c, gear.body_d],
            _ => [self.body_a, Some(self.body_b), None, None],
        }
    }

    /// Whether the joint links `a` and `b` in either order.
    pub fn connects(&self, a: BodyHandle, b: BodyHandle) -> bool {
        (self.body_a == Some(a) && self.body_b == b) || (self.body_a == Some(b) && self.body_b == a)
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn breakpoint(&self) -> f32 {
        self.breakpoint
    }

    pub fn set_breakpoint(&mut self, breakpoint: f32) {
        self.breakpoint = breakpoint;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Reaction force on body B at the anchor.
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.kind.constraint().reaction_force(inv_dt)
    }

    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        self.kind.constraint().reaction_torque(inv_dt)
    }

    /// Size of the last step's reaction impulse, compared against the breakpoint.
    pub fn reaction_impulse(&self) -> f32 {
        self.reaction_force(1.0)
            .length()
            .max(self.reaction_torque(1.0).abs())
    }

    pub(crate) fn init_velocity_constraints(&mut self, slots: JointSlots, data: &mut SolverData<'_>) {
        self.kind.constraint_mut().init_velocity_constraints(slots, data);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        self.kind.constraint_mut().solve_velocity_constraints(data);
    }

    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        self.kind.constraint_mut().solve_position_constraints(data)
    }

    /// Flags the joint when the reaction impulse exceeds the breakpoint.
    pub(crate) fn check_breakpoint(&mut self) -> bool {
        if !self.broken && self.breakpoint < f32::MAX && self.reaction_impulse() > self.breakpoint {
            self.broken = true;
        }
        self.broken
    }

    pub(crate) fn shift_origin(&mut self, new_origin: Vec2) {
        let world_anchored = self.body_a.is_none();
        self.kind
            .constraint_mut()
            .shift_origin(new_origin, world_anchored);
    }

    /// Gear joints also reference the joints they couple.
    pub(crate) fn coupled_joints(&self) -> Option<(JointHandle, JointHandle)> {
        match &self.kind {
            JointKind::Gear(gear) => Some((gear.joint1, gear.joint2)),
            _ => None,
        }
    }
}

/// Stiffness and damping for a soft constraint with effective mass `mass`.
///
/// Returns `(gamma, bias)` for error `c`; both are zero for a rigid constraint.
pub(crate) fn soft_constraint(
    mass: f32,
    frequency_hz: f32,
    damping_ratio: f32,
    c: f32,
    dt: f32,
) -> (f32, f32) {
    let omega = 2.0 * std::f32::consts::PI * frequency_hz;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;
    let gamma = dt * (d + dt * k);
    let gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    let bias = c * dt * k * gamma;
    (gamma, bias)
}

pub(crate) fn validate_bodies(body_a: Option<BodyHandle>, body_b: BodyHandle) -> PhysicsResult<()> {
    if body_a == Some(body_b) {
        return Err(PhysicsError::InvalidJoint {
            reason: "a body cannot be jointed to itself",
        });
    }
    Ok(())
}

pub(crate) fn validate_finite(values: &[f32], reason: &'static str) -> PhysicsResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(PhysicsError::InvalidJoint { reason })
    }
}
