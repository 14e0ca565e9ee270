use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    fixture::Fixture,
    types::{MassData, Rot, Sweep, Transform},
};
use crate::utils::{
    allocator::{ContactHandle, FixtureHandle, JointHandle},
    math::{cross, cross_sv},
};

/// How a body participates in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Zero mass, never moves.
    #[default]
    Static,
    /// Zero mass, moved by its velocity only.
    Kinematic,
    /// Positive mass, moved by forces and contacts.
    Dynamic,
}

/// Construction parameters for a body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDef {
    pub body_type: BodyType,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub allow_sleep: bool,
    pub awake: bool,
    pub fixed_rotation: bool,
    pub bullet: bool,
    pub enabled: bool,
    pub gravity_scale: f32,
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            enabled: true,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    pub fn dynamic() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            ..Self::default()
        }
    }

    pub fn kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Self::default()
        }
    }

    pub fn fixed() -> Self {
        Self::default()
    }

    pub fn position(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    pub fn angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn linear_velocity(mut self, velocity: Vec2) -> Self {
        self.linear_velocity = velocity;
        self
    }

    pub fn angular_velocity(mut self, velocity: f32) -> Self {
        self.angular_velocity = velocity;
        self
    }

    pub fn damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn bullet(mut self, bullet: bool) -> Self {
        self.bullet = bullet;
        self
    }

    pub fn fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn allow_sleep(mut self, allow: bool) -> Self {
        self.allow_sleep = allow;
        self
    }

    pub fn awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.angle.is_finite()
            && self.linear_velocity.is_finite()
            && self.angular_velocity.is_finite()
            && self.linear_damping >= 0.0
            && self.angular_damping >= 0.0
            && self.gravity_scale.is_finite()
    }
}

/// Rigid body. Owned by the world and addressed through a `BodyHandle`.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass.
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,

    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,
    pub(crate) sleep_time: f32,

    pub(crate) awake: bool,
    pub(crate) allow_sleep: bool,
    pub(crate) bullet: bool,
    pub(crate) fixed_rotation: bool,
    pub(crate) enabled: bool,
    pub(crate) island_flag: bool,
    pub(crate) toi_flag: bool,
    pub(crate) island_index: usize,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) contact_edges: Vec<ContactHandle>,
    pub(crate) joint_edges: Vec<JointHandle>,

    pub user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };
        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };
        let moving = def.body_type != BodyType::Static;

        Self {
            body_type: def.body_type,
            xf,
            sweep,
            linear_velocity: if moving { def.linear_velocity } else { Vec2::ZERO },
            angular_velocity: if moving { def.angular_velocity } else { 0.0 },
            force: Vec2::ZERO,
            torque: 0.0,
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            awake: def.awake && moving,
            allow_sleep: def.allow_sleep,
            bullet: def.bullet,
            fixed_rotation: def.fixed_rotation,
            enabled: def.enabled,
            island_flag: false,
            toi_flag: false,
            island_index: 0,
            fixtures: Vec::new(),
            contact_edges: Vec::new(),
            joint_edges: Vec::new(),
            user_data: def.user_data,
        }
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Dynamic
    }

    pub fn is_static(&self) -> bool {
        self.body_type == BodyType::Static
    }

    pub fn transform(&self) -> Transform {
        self.xf
    }

    /// World position of the body origin.
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    /// Ignored for static bodies. Wakes the body for non-zero velocities.
    pub fn set_linear_velocity(&mut self, velocity: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if velocity.length_squared() > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = velocity;
    }

    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, omega: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if omega * omega > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = omega;
    }

    /// Applies a force at a world point. Sleeping bodies ignore the force
    /// unless `wake` is set.
    pub fn apply_force(&mut self, force: Vec2, point: Vec2, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.force += force;
        self.torque += cross(point - self.sweep.c, force);
    }

    pub fn apply_force_to_center(&mut self, force: Vec2, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.force += force;
    }

    pub fn apply_torque(&mut self, torque: f32, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.torque += torque;
    }

    /// Immediately changes velocity by `impulse` applied at a world point.
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.linear_velocity += self.inv_mass * impulse;
        self.angular_velocity +=
            self.inv_inertia * cross(point - self.sweep.c, impulse);
    }

    pub fn apply_linear_impulse_to_center(&mut self, impulse: Vec2, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.linear_velocity += self.inv_mass * impulse;
    }

    pub fn apply_angular_impulse(&mut self, impulse: f32, wake: bool) {
        if !self.accepts_input(wake) {
            return;
        }
        self.angular_velocity += self.inv_inertia * impulse;
    }

    fn accepts_input(&mut self, wake: bool) -> bool {
        if self.body_type != BodyType::Dynamic {
            return false;
        }
        if wake && !self.awake {
            self.set_awake(true);
        }
        self.awake
    }

    pub fn force(&self) -> Vec2 {
        self.force
    }

    pub fn torque(&self) -> f32 {
        self.torque
    }

    pub fn clear_forces(&mut self) {
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Rotational inertia about the body origin.
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.length_squared()
    }

    pub fn inv_inertia(&self) -> f32 {
        self.inv_inertia
    }

    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.sweep.local_center,
            inertia: self.inertia(),
        }
    }

    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.apply(local_point)
    }

    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.q.apply(local_vector)
    }

    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.apply_inv(world_point)
    }

    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.q.apply_inv(world_vector)
    }

    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, world_point - self.sweep.c)
    }

    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping.max(0.0);
    }

    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping.max(0.0);
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    pub fn is_bullet(&self) -> bool {
        self.bullet
    }

    pub fn set_bullet(&mut self, bullet: bool) {
        self.bullet = bullet;
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    /// Waking resets the sleep timer; sleeping clears velocities and forces.
    /// Static bodies never wake.
    pub fn set_awake(&mut self, awake: bool) {
        if self.body_type == BodyType::Static {
            return;
        }
        if awake {
            self.awake = true;
            self.sleep_time = 0.0;
        } else {
            self.awake = false;
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    pub fn is_sleeping_allowed(&self) -> bool {
        self.allow_sleep
    }

    pub fn set_sleeping_allowed(&mut self, allow: bool) {
        self.allow_sleep = allow;
        if !allow {
            self.set_awake(true);
        }
    }

    pub fn is_fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    pub fn contact_handles(&self) -> &[ContactHandle] {
        &self.contact_edges
    }

    pub fn joint_handles(&self) -> &[JointHandle] {
        &self.joint_edges
    }

    /// Recomputes mass, center of mass and inertia from the given fixtures.
    ///
    /// Dynamic bodies without mass-bearing fixtures get unit mass so the
    /// integrator never divides by zero.
    pub(crate) fn reset_mass_data<'a>(&mut self, fixtures: impl Iterator<Item = &'a Fixture>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.sweep.local_center = Vec2::ZERO;

        if self.body_type != BodyType::Dynamic {
            self.sweep.c0 = self.xf.p;
            self.sweep.c = self.xf.p;
            self.sweep.a0 = self.sweep.a;
            return;
        }

        let mut local_center = Vec2::ZERO;
        for fixture in fixtures {
            if fixture.density() == 0.0 {
                continue;
            }
            let mass_data = fixture.mass_data();
            self.mass += mass_data.mass;
            local_center += mass_data.mass * mass_data.center;
            self.inertia += mass_data.inertia;
        }

        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            local_center *= self.inv_mass;
        } else {
            self.mass = 1.0;
            self.inv_mass = 1.0;
        }

        if self.inertia > 0.0 && !self.fixed_rotation {
            // Shift inertia to the center of mass.
            self.inertia -= self.mass * local_center.length_squared();
            debug_assert!(self.inertia > 0.0);
            self.inv_inertia = 1.0 / self.inertia;
        } else {
            self.inertia = 0.0;
            self.inv_inertia = 0.0;
        }

        self.move_center(local_center);
    }

    /// Overrides the mass computed from fixtures. Ignored for non-dynamic bodies.
    pub(crate) fn set_mass_data(&mut self, data: &MassData) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;

        self.mass = if data.mass > 0.0 { data.mass } else { 1.0 };
        self.inv_mass = 1.0 / self.mass;

        if data.inertia > 0.0 && !self.fixed_rotation {
            self.inertia = data.inertia - self.mass * data.center.length_squared();
            if self.inertia > 0.0 {
                self.inv_inertia = 1.0 / self.inertia;
            } else {
                self.inertia = 0.0;
            }
        }

        self.move_center(data.center);
    }

    fn move_center(&mut self, local_center: Vec2) {
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.apply(local_center);
        self.sweep.c0 = self.sweep.c;
        // Keep the velocity of the origin unchanged.
        self.linear_velocity += cross_sv(self.angular_velocity, self.sweep.c - old_center);
    }

    pub(crate) fn set_transform_raw(&mut self, position: Vec2, angle: f32) {
        self.xf = Transform::new(position, angle);
        self.sweep.c = self.xf.apply(self.sweep.local_center);
        self.sweep.a = angle;
        self.sweep.c0 = self.sweep.c;
        self.sweep.a0 = angle;
    }

    /// Rebuilds the transform from the end of the sweep.
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::new(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.apply(self.sweep.local_center);
    }

    /// Transform at the start of the sweep.
    pub(crate) fn start_transform(&self) -> Transform {
        let q = Rot::new(self.sweep.a0);
        Transform {
            p: self.sweep.c0 - q.apply(self.sweep.local_center),
            q,
        }
    }

    /// Rewinds the body to `alpha` of the current step.
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }

    pub(crate) fn is_state_valid(&self) -> bool {
        self.xf.p.is_finite()
            && self.sweep.a.is_finite()
            && self.linear_velocity.is_finite()
            && self.angular_velocity.is_finite()
    }
}
