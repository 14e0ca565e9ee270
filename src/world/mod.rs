//! The world: owns every body, fixture, joint and contact and advances them.
//!
//! Objects are addressed through generation-checked handles. Callbacks run
//! while a step is in progress and cannot borrow the world; they queue
//! [`DeferredCommands`] that are applied once the step has finished.

mod breakable;
mod events;
mod shared;
mod step;

use glam::Vec2;
use log::debug;

pub use events::{
    BodyBrokenCallback, Command, ContactCallback, ContactFilter, DeferredCommands,
    JointBrokenCallback, PostSolveCallback, PreSolveCallback,
};
pub use shared::SharedWorld;

pub(crate) use breakable::BreakableBodies;
pub(crate) use events::{Callbacks, EventSink};

use crate::{
    collision::{
        aabb::Aabb,
        broadphase::BroadPhase,
        manifold::Manifold,
        queries::{RaycastControl, RaycastHit, WorldQuery},
    },
    config::{WorldSettings, DEFAULT_GRAVITY},
    core::{
        body::{Body, BodyDef, BodyType},
        fixture::{Filter, Fixture, FixtureDef, ProxyRef},
        types::MassData,
    },
    dynamics::{
        contact::{Contact, ContactImpulse, ContactView},
        contact_manager::ContactManager,
        joints::{validate_bodies, GearJoint, GearJointDef, Joint, JointDef, JointFrame, JointKind, JointKindDef},
    },
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::{Arena, BodyHandle, ContactHandle, FixtureHandle, JointHandle},
        profiling::StepProfile,
    },
};

/// Builds the contact listener from the world's callback, command and
/// breakable fields without borrowing the rest of the world.
macro_rules! event_sink {
    ($world:expr) => {
        $crate::world::EventSink {
            callbacks: &mut $world.callbacks,
            commands: &mut $world.commands,
            breakable: &mut $world.breakable,
        }
    };
}
pub(crate) use event_sink;

const STALE_BODY: PhysicsError = PhysicsError::StaleHandle { kind: "body" };
const STALE_FIXTURE: PhysicsError = PhysicsError::StaleHandle { kind: "fixture" };
const STALE_JOINT: PhysicsError = PhysicsError::StaleHandle { kind: "joint" };

/// Central simulation container.
pub struct World {
    pub(crate) bodies: Arena<BodyHandle, Body>,
    pub(crate) fixtures: Arena<FixtureHandle, Fixture>,
    pub(crate) joints: Arena<JointHandle, Joint>,
    pub(crate) contact_manager: ContactManager,
    pub(crate) gravity: Vec2,
    pub(crate) settings: WorldSettings,
    pub(crate) callbacks: Callbacks,
    pub(crate) commands: DeferredCommands,
    pub(crate) breakable: BreakableBodies,
    pub(crate) profile: StepProfile,
    /// Inverse of the previous step's `dt`, for warm-start scaling.
    pub(crate) inv_dt0: f32,
    /// Set when fixtures were added or moved outside a step.
    pub(crate) new_contacts: bool,
    parallel_enabled: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new(Vec2::from_array(DEFAULT_GRAVITY))
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("gravity", &self.gravity)
            .field("bodies", &self.bodies.len())
            .field("fixtures", &self.fixtures.len())
            .field("joints", &self.joints.len())
            .field("contacts", &self.contact_manager.contact_count())
            .field("settings", &self.settings)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl World {
    pub fn new(gravity: Vec2) -> Self {
        Self {
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::new(),
            gravity,
            settings: WorldSettings::default(),
            callbacks: Callbacks::default(),
            commands: DeferredCommands::default(),
            breakable: BreakableBodies::default(),
            profile: StepProfile::default(),
            inv_dt0: 0.0,
            new_contacts: false,
            parallel_enabled: cfg!(feature = "parallel"),
        }
    }

    pub fn with_settings(gravity: Vec2, settings: WorldSettings) -> PhysicsResult<Self> {
        settings.validate()?;
        let mut world = Self::new(gravity);
        world.settings = settings;
        Ok(world)
    }

    pub fn gravity(&self) -> Vec2 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.gravity = gravity;
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: WorldSettings) -> PhysicsResult<()> {
        settings.validate()?;
        if !settings.allow_sleep {
            for (_, body) in self.bodies.iter_mut() {
                body.set_awake(true);
            }
        }
        self.settings = settings;
        Ok(())
    }

    /// Solves islands on the rayon pool. Has no effect without the
    /// `parallel` feature.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled && cfg!(feature = "parallel");
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    /// Timings and counters of the last step.
    pub fn profile(&self) -> &StepProfile {
        &self.profile
    }

    // Bodies

    pub fn create_body(&mut self, def: &BodyDef) -> PhysicsResult<BodyHandle> {
        if !def.is_valid() {
            return Err(PhysicsError::InvalidBody {
                reason: "body definition has non-finite state or negative damping",
            });
        }
        Ok(self.bodies.insert(Body::new(def)))
    }

    /// Destroys a body together with its joints, contacts and fixtures.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        let body = self.bodies.get(handle).ok_or(STALE_BODY)?;
        let joint_edges = body.joint_edges.clone();
        let contact_edges = body.contact_edges.clone();
        let fixtures = body.fixtures.clone();

        for joint in joint_edges {
            self.remove_joint(joint);
        }
        for contact in contact_edges {
            let mut sink = event_sink!(self);
            self.contact_manager
                .destroy(contact, &mut self.bodies, &self.fixtures, &mut sink);
        }
        for fixture in fixtures {
            if let Some(mut fixture) = self.fixtures.remove(fixture) {
                fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }
        self.bodies.remove(handle);
        self.breakable.forget(handle);
        Ok(())
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle)
    }

    /// Mutable access for velocities, forces, damping and sleep state.
    /// Structural changes go through the world methods.
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle)
    }

    pub fn bodies(&self) -> impl Iterator<Item = (BodyHandle, &Body)> + '_ {
        self.bodies.iter()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleports a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f32) -> PhysicsResult<()> {
        if !(position.is_finite() && angle.is_finite()) {
            return Err(PhysicsError::InvalidBody {
                reason: "transform must be finite",
            });
        }
        let body = self.bodies.get_mut(handle).ok_or(STALE_BODY)?;
        body.set_transform_raw(position, angle);
        synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        self.new_contacts = true;
        Ok(())
    }

    /// Changes the body type, recomputing mass and dropping its contacts.
    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(STALE_BODY)?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        self.reset_mass_data(handle)?;

        let body = self.bodies.get_mut(handle).ok_or(STALE_BODY)?;
        if body_type == BodyType::Static {
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            body.awake = false;
            body.sleep_time = 0.0;
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
        }
        let body = self.bodies.get_mut(handle).ok_or(STALE_BODY)?;
        body.set_awake(true);
        body.clear_forces();

        self.destroy_body_contacts(handle);
        if let Some(body) = self.bodies.get(handle) {
            for fixture in body.fixtures.iter().filter_map(|&f| self.fixtures.get(f)) {
                fixture.touch_proxies(&mut self.contact_manager.broad_phase);
            }
        }
        Ok(())
    }

    /// Disabled bodies keep their fixtures but leave the broad-phase, lose
    /// their contacts and are skipped by the solver.
    pub fn set_body_enabled(&mut self, handle: BodyHandle, enabled: bool) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(STALE_BODY)?;
        if body.enabled == enabled {
            return Ok(());
        }
        body.enabled = enabled;
        let fixtures = body.fixtures.clone();
        let xf = body.xf;
        let joint_edges = body.joint_edges.clone();

        if enabled {
            for fixture_handle in fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.create_proxies(&mut self.contact_manager.broad_phase, &xf, fixture_handle);
                }
            }
            self.new_contacts = true;
        } else {
            for fixture_handle in fixtures {
                if let Some(fixture) = self.fixtures.get_mut(fixture_handle) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            self.destroy_body_contacts(handle);
        }

        for joint_handle in joint_edges {
            let Some(joint) = self.joints.get_mut(joint_handle) else {
                continue;
            };
            joint.enabled = joint
                .bodies()
                .iter()
                .take(2)
                .flatten()
                .all(|&body| self.bodies.get(body).is_some_and(|b| b.enabled));
        }
        Ok(())
    }

    pub fn set_fixed_rotation(&mut self, handle: BodyHandle, fixed: bool) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(STALE_BODY)?;
        if body.fixed_rotation == fixed {
            return Ok(());
        }
        body.fixed_rotation = fixed;
        body.angular_velocity = 0.0;
        self.reset_mass_data(handle)
    }

    pub fn set_bullet(&mut self, handle: BodyHandle, bullet: bool) -> PhysicsResult<()> {
        self.bodies.get_mut(handle).ok_or(STALE_BODY)?.set_bullet(bullet);
        Ok(())
    }

    pub fn set_awake(&mut self, handle: BodyHandle, awake: bool) -> PhysicsResult<()> {
        self.bodies.get_mut(handle).ok_or(STALE_BODY)?.set_awake(awake);
        Ok(())
    }

    /// Overrides the mass computed from the fixtures of a dynamic body.
    pub fn set_mass_data(&mut self, handle: BodyHandle, data: &MassData) -> PhysicsResult<()> {
        if !(data.mass.is_finite() && data.inertia.is_finite() && data.center.is_finite()) {
            return Err(PhysicsError::InvalidBody {
                reason: "mass data must be finite",
            });
        }
        self.bodies.get_mut(handle).ok_or(STALE_BODY)?.set_mass_data(data);
        Ok(())
    }

    /// Recomputes mass, center and inertia from the body's fixtures.
    pub fn reset_mass_data(&mut self, handle: BodyHandle) -> PhysicsResult<()> {
        let body = self.bodies.get_mut(handle).ok_or(STALE_BODY)?;
        let fixtures = body.fixtures.clone();
        body.reset_mass_data(fixtures.iter().filter_map(|&f| self.fixtures.get(f)));
        Ok(())
    }

    fn destroy_body_contacts(&mut self, handle: BodyHandle) {
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        for contact in body.contact_edges.clone() {
            let mut sink = event_sink!(self);
            self.contact_manager
                .destroy(contact, &mut self.bodies, &self.fixtures, &mut sink);
        }
    }

    // Fixtures

    /// Attaches a shape to a body. Bodies with density-bearing fixtures get
    /// their mass recomputed.
    pub fn create_fixture(&mut self, body_handle: BodyHandle, def: &FixtureDef) -> PhysicsResult<FixtureHandle> {
        let friction = def.material.friction;
        let restitution = def.material.restitution;
        if !(friction.is_finite() && friction >= 0.0 && restitution.is_finite() && restitution >= 0.0) {
            return Err(PhysicsError::InvalidShape {
                reason: "friction and restitution must be finite and non-negative",
            });
        }
        let body = self.bodies.get_mut(body_handle).ok_or(STALE_BODY)?;
        let handle = self.fixtures.insert(Fixture::new(body_handle, def.clone()));
        if body.enabled {
            if let Some(fixture) = self.fixtures.get_mut(handle) {
                fixture.create_proxies(&mut self.contact_manager.broad_phase, &body.xf, handle);
            }
        }
        body.fixtures.push(handle);
        if def.shape.density() > 0.0 {
            self.reset_mass_data(body_handle)?;
        }
        self.new_contacts = true;
        Ok(handle)
    }

    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> PhysicsResult<()> {
        let body_handle = self.fixtures.get(handle).ok_or(STALE_FIXTURE)?.body;
        if let Some(body) = self.bodies.get(body_handle) {
            let doomed: Vec<ContactHandle> = body
                .contact_edges
                .iter()
                .copied()
                .filter(|&c| {
                    self.contact_manager
                        .contacts
                        .get(c)
                        .is_some_and(|contact| contact.fixture_a == handle || contact.fixture_b == handle)
                })
                .collect();
            for contact in doomed {
                let mut sink = event_sink!(self);
                self.contact_manager
                    .destroy(contact, &mut self.bodies, &self.fixtures, &mut sink);
            }
        }

        if let Some(mut fixture) = self.fixtures.remove(handle) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }
        if let Some(body) = self.bodies.get_mut(body_handle) {
            body.fixtures.retain(|&f| f != handle);
        }
        self.reset_mass_data(body_handle)
    }

    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle)
    }

    /// Mutable access for friction, restitution and user data.
    pub fn fixture_mut(&mut self, handle: FixtureHandle) -> Option<&mut Fixture> {
        self.fixtures.get_mut(handle)
    }

    pub fn fixtures(&self) -> impl Iterator<Item = (FixtureHandle, &Fixture)> + '_ {
        self.fixtures.iter()
    }

    /// Replaces the collision filter and re-filters existing contacts.
    pub fn set_fixture_filter(&mut self, handle: FixtureHandle, filter: Filter) -> PhysicsResult<()> {
        let fixture = self.fixtures.get_mut(handle).ok_or(STALE_FIXTURE)?;
        fixture.filter = filter;
        let body_handle = fixture.body;
        if let Some(body) = self.bodies.get(body_handle) {
            self.contact_manager.flag_fixture(handle, body);
        }
        if let Some(fixture) = self.fixtures.get(handle) {
            fixture.touch_proxies(&mut self.contact_manager.broad_phase);
        }
        self.new_contacts = true;
        Ok(())
    }

    pub fn set_fixture_sensor(&mut self, handle: FixtureHandle, sensor: bool) -> PhysicsResult<()> {
        let fixture = self.fixtures.get_mut(handle).ok_or(STALE_FIXTURE)?;
        if fixture.is_sensor != sensor {
            fixture.is_sensor = sensor;
            let body = fixture.body;
            if let Some(body) = self.bodies.get_mut(body) {
                body.set_awake(true);
            }
        }
        Ok(())
    }

    // Joints

    /// Validates and attaches a joint.
    ///
    /// Rejects missing bodies, self-joints, world-anchored joints on
    /// non-dynamic bodies and gears over anything but revolute and
    /// prismatic joints.
    pub fn create_joint(&mut self, def: &JointDef) -> PhysicsResult<JointHandle> {
        let joint = match &def.kind {
            JointKindDef::Gear(gear) => self.build_gear(def, gear)?,
            _ => {
                let (body_a, body_b) = def.bodies().ok_or(PhysicsError::InvalidJoint {
                    reason: "joint definition names no bodies",
                })?;
                validate_bodies(body_a, body_b)?;
                let b = self.bodies.get(body_b).ok_or(STALE_BODY)?;
                let a = match body_a {
                    Some(handle) => Some(self.bodies.get(handle).ok_or(STALE_BODY)?),
                    None => None,
                };
                if a.is_none() && !b.is_dynamic() {
                    return Err(PhysicsError::InvalidJoint {
                        reason: "a world-anchored joint needs a dynamic body",
                    });
                }
                Joint::new(def, &JointFrame::of(a), &JointFrame::of(Some(b)))?
            }
        };
        Ok(self.attach_joint(joint))
    }

    fn build_gear(&self, def: &JointDef, gear: &GearJointDef) -> PhysicsResult<Joint> {
        let joint1 = self.joints.get(gear.joint1).ok_or(STALE_JOINT)?;
        let joint2 = self.joints.get(gear.joint2).ok_or(STALE_JOINT)?;
        let body_a = joint1.body_b;
        let body_b = joint2.body_b;
        validate_bodies(Some(body_a), body_b)?;

        let frame = |handle: Option<BodyHandle>| JointFrame::of(handle.and_then(|h| self.bodies.get(h)));
        let frames = [
            frame(Some(body_a)),
            frame(Some(body_b)),
            frame(joint1.body_a),
            frame(joint2.body_a),
        ];
        let kind = JointKind::Gear(GearJoint::new(gear, joint1, joint2, frames)?);
        Ok(Joint::with_kind(def, Some(body_a), body_b, kind))
    }

    fn attach_joint(&mut self, joint: Joint) -> JointHandle {
        let body_a = joint.body_a;
        let body_b = joint.body_b;
        let collide_connected = joint.collide_connected;
        let handle = self.joints.insert(joint);

        for body in [body_a, Some(body_b)].into_iter().flatten() {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joint_edges.push(handle);
            }
        }
        if !collide_connected {
            self.flag_contacts_between(body_a, body_b);
        }
        handle
    }

    /// Destroys a joint and any gear joint coupling it. Wakes the bodies.
    pub fn destroy_joint(&mut self, handle: JointHandle) -> PhysicsResult<()> {
        self.remove_joint(handle).map(|_| ()).ok_or(STALE_JOINT)
    }

    pub(crate) fn remove_joint(&mut self, handle: JointHandle) -> Option<Joint> {
        let joint = self.joints.remove(handle)?;
        for body in [joint.body_a, Some(joint.body_b)].into_iter().flatten() {
            if let Some(body) = self.bodies.get_mut(body) {
                body.joint_edges.retain(|&j| j != handle);
                body.set_awake(true);
            }
        }
        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
        }

        let gears: Vec<JointHandle> = self
            .joints
            .iter()
            .filter(|(_, j)| j.coupled_joints().is_some_and(|(j1, j2)| j1 == handle || j2 == handle))
            .map(|(h, _)| h)
            .collect();
        for gear in gears {
            debug!("destroying gear {gear:?} coupled to removed joint {handle:?}");
            self.remove_joint(gear);
        }
        Some(joint)
    }

    fn flag_contacts_between(&mut self, body_a: Option<BodyHandle>, body_b: BodyHandle) {
        let Some(body_a) = body_a else {
            return;
        };
        let Some(body) = self.bodies.get(body_b) else {
            return;
        };
        for &edge in &body.contact_edges {
            if let Some(contact) = self.contact_manager.contacts.get_mut(edge) {
                if contact.body_a == body_a || contact.body_b == body_a {
                    contact.flag_for_filtering();
                }
            }
        }
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle)
    }

    /// Mutable access for motor, limit and spring settings. Wakes the
    /// joint's bodies so the change takes effect.
    pub fn joint_mut(&mut self, handle: JointHandle) -> Option<&mut Joint> {
        let joint = self.joints.get(handle)?;
        for body in joint.bodies().into_iter().take(2).flatten() {
            if let Some(body) = self.bodies.get_mut(body) {
                body.set_awake(true);
            }
        }
        self.joints.get_mut(handle)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointHandle, &Joint)> + '_ {
        self.joints.iter()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    // Contacts

    pub fn contacts(&self) -> impl Iterator<Item = (ContactHandle, &Contact)> + '_ {
        self.contact_manager.contacts.iter()
    }

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contact_manager.contacts.get(handle)
    }

    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn broad_phase(&self) -> &BroadPhase<ProxyRef> {
        &self.contact_manager.broad_phase
    }

    // Queries

    pub fn query(&self) -> WorldQuery<'_> {
        WorldQuery {
            broad_phase: &self.contact_manager.broad_phase,
            fixtures: &self.fixtures,
            bodies: &self.bodies,
        }
    }

    /// Calls `callback` for every fixture whose fat AABB overlaps `aabb`
    /// until it returns `false`.
    pub fn query_aabb<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(FixtureHandle) -> bool,
    {
        self.query().query_aabb(aabb, callback);
    }

    pub fn test_point(&self, point: Vec2) -> Vec<FixtureHandle> {
        self.query().test_point(point)
    }

    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, callback: F)
    where
        F: FnMut(&RaycastHit) -> RaycastControl,
    {
        self.query().ray_cast(p1, p2, callback);
    }

    pub fn ray_cast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RaycastHit> {
        self.query().ray_cast_closest(p1, p2)
    }

    pub fn ray_cast_all(&self, p1: Vec2, p2: Vec2) -> Vec<RaycastHit> {
        self.query().ray_cast_all(p1, p2)
    }

    // Callbacks

    /// Called when two fixtures start touching. Disabling the contact
    /// through the view vetoes it for this step.
    pub fn on_begin_contact<F>(&mut self, callback: F)
    where
        F: FnMut(&mut ContactView<'_>, &mut DeferredCommands) + Send + Sync + 'static,
    {
        self.callbacks.begin_contact = Some(Box::new(callback));
    }

    pub fn on_end_contact<F>(&mut self, callback: F)
    where
        F: FnMut(&mut ContactView<'_>, &mut DeferredCommands) + Send + Sync + 'static,
    {
        self.callbacks.end_contact = Some(Box::new(callback));
    }

    /// Called for touching solid contacts before they are solved, with the
    /// manifold of the previous step.
    pub fn on_pre_solve<F>(&mut self, callback: F)
    where
        F: FnMut(&mut ContactView<'_>, &Manifold, &mut DeferredCommands) + Send + Sync + 'static,
    {
        self.callbacks.pre_solve = Some(Box::new(callback));
    }

    pub fn on_post_solve<F>(&mut self, callback: F)
    where
        F: FnMut(&mut ContactView<'_>, &ContactImpulse, &mut DeferredCommands) + Send + Sync + 'static,
    {
        self.callbacks.post_solve = Some(Box::new(callback));
    }

    pub fn on_joint_broken<F>(&mut self, callback: F)
    where
        F: FnMut(JointHandle, &Joint, &mut DeferredCommands) + Send + Sync + 'static,
    {
        self.callbacks.joint_broken = Some(Box::new(callback));
    }

    pub fn on_body_broken<F>(&mut self, callback: F)
    where
        F: FnMut(BodyHandle, &[BodyHandle], &mut DeferredCommands) + Send + Sync + 'static,
    {
        self.callbacks.body_broken = Some(Box::new(callback));
    }

    /// Extra filter consulted for new pairs and re-filtered contacts.
    pub fn set_contact_filter<F>(&mut self, filter: F)
    where
        F: Fn(&Fixture, &Fixture) -> bool + Send + Sync + 'static,
    {
        self.callbacks.contact_filter = Some(Box::new(filter));
    }

    pub fn clear_contact_filter(&mut self) {
        self.callbacks.contact_filter = None;
    }

    /// Commands queued by callbacks and not yet applied.
    pub fn pending_commands(&self) -> &DeferredCommands {
        &self.commands
    }

    // Misc

    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.clear_forces();
        }
    }

    /// Moves the world origin, for large worlds. Everything keeps its
    /// position relative to everything else.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for (_, body) in self.bodies.iter_mut() {
            body.xf.p -= new_origin;
            body.sweep.c0 -= new_origin;
            body.sweep.c -= new_origin;
        }
        for (_, joint) in self.joints.iter_mut() {
            joint.shift_origin(new_origin);
        }
        self.contact_manager.shift_origin(new_origin);
    }

    /// Applies commands queued by callbacks, in order. Commands queued while
    /// these run are kept for the next step.
    pub(crate) fn apply_commands(&mut self) {
        for command in self.commands.take() {
            let result = match command {
                Command::DestroyBody(body) => self.destroy_body(body),
                Command::DestroyFixture(fixture) => self.destroy_fixture(fixture),
                Command::DestroyJoint(joint) => self.destroy_joint(joint),
                Command::SetAwake(body, awake) => self.set_awake(body, awake),
                Command::SetEnabled(body, enabled) => self.set_body_enabled(body, enabled),
                Command::SetLinearVelocity(body, velocity) => self
                    .bodies
                    .get_mut(body)
                    .map(|b| b.set_linear_velocity(velocity))
                    .ok_or(STALE_BODY),
                Command::SetAngularVelocity(body, omega) => self
                    .bodies
                    .get_mut(body)
                    .map(|b| b.set_angular_velocity(omega))
                    .ok_or(STALE_BODY),
                Command::SetTransform {
                    body,
                    position,
                    angle,
                } => self.set_transform(body, position, angle),
                Command::ApplyLinearImpulse {
                    body,
                    impulse,
                    point,
                } => self
                    .bodies
                    .get_mut(body)
                    .map(|b| b.apply_linear_impulse(impulse, point, true))
                    .ok_or(STALE_BODY),
                Command::ApplyAngularImpulse { body, impulse } => self
                    .bodies
                    .get_mut(body)
                    .map(|b| b.apply_angular_impulse(impulse, true))
                    .ok_or(STALE_BODY),
            };
            if let Err(err) = result {
                debug!("skipping deferred {command:?}: {err}");
            }
        }
    }
}

/// Moves a body's proxies to cover its motion over the last step.
pub(crate) fn synchronize_fixtures(
    body: &Body,
    fixtures: &mut Arena<FixtureHandle, Fixture>,
    broad_phase: &mut BroadPhase<ProxyRef>,
) {
    let xf1 = body.start_transform();
    let xf2 = body.xf;
    for &handle in &body.fixtures {
        if let Some(fixture) = fixtures.get_mut(handle) {
            fixture.synchronize(broad_phase, &xf1, &xf2);
        }
    }
}
