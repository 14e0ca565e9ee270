//! Islands: connected groups of awake bodies solved independently.
//!
//! Each island is a self-contained snapshot (solver bodies, contact inputs
//! and joint copies) so islands can be solved in parallel and written back
//! serially afterwards.

use std::collections::HashMap;

use log::trace;

use crate::{
    collision::manifold::Manifold,
    config::WorldSettings,
    core::{
        body::{Body, BodyType},
        fixture::Fixture,
        types::{Position, Velocity},
    },
    dynamics::{
        contact::{Contact, ContactImpulse},
        integrator::Integrator,
        joints::{Joint, JointSlots},
        solver::{ContactSolver, ContactSolverInput, SolverBody, SolverData, TimeStep},
    },
    utils::allocator::{Arena, BodyHandle, ContactHandle, FixtureHandle, JointHandle},
};

#[derive(Debug, Clone)]
struct IslandJoint {
    handle: JointHandle,
    joint: Joint,
    slots: JointSlots,
}

/// Snapshot of one island, solved without touching the world.
#[derive(Debug, Clone, Default)]
pub(crate) struct Island {
    bodies: Vec<SolverBody>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    /// Slots `0..members` belong to the island; later slots are fixed stand-ins.
    members: usize,
    slots: HashMap<BodyHandle, usize>,
    ground: Option<usize>,

    contact_handles: Vec<ContactHandle>,
    contact_inputs: Vec<ContactSolverInput>,
    joints: Vec<IslandJoint>,

    impulses: Vec<ContactImpulse>,
    manifolds: Vec<Manifold>,
    asleep: bool,
}

/// What the world has to do after an island was written back.
#[derive(Debug, Default)]
pub(crate) struct IslandReport {
    /// Dynamic members whose fixtures need synchronizing.
    pub moved: Vec<BodyHandle>,
    pub post_solve: Vec<(ContactHandle, ContactImpulse)>,
    pub broken_joints: Vec<JointHandle>,
    pub asleep: bool,
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_count(&self) -> usize {
        self.members
    }

    pub fn contact_count(&self) -> usize {
        self.contact_handles.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn slot(&self, handle: BodyHandle) -> Option<usize> {
        self.slots.get(&handle).copied().filter(|&slot| slot < self.members)
    }

    pub fn contact_handles(&self) -> &[ContactHandle] {
        &self.contact_handles
    }

    /// Adds a member body and returns its slot. Members must be added before
    /// any joint.
    pub fn add_body(&mut self, handle: BodyHandle, body: &Body) -> usize {
        if let Some(slot) = self.slot(handle) {
            return slot;
        }
        debug_assert_eq!(self.members, self.bodies.len());
        let slot = self.bodies.len();
        self.bodies.push(SolverBody::from_body(handle, body));
        self.positions.push(Position {
            c: body.sweep.c,
            a: body.sweep.a,
        });
        self.velocities
            .push(Velocity::new(body.linear_velocity, body.angular_velocity));
        self.slots.insert(handle, slot);
        self.members += 1;
        slot
    }

    /// Adds a contact between two member bodies. Returns `false` if either
    /// body is not a member.
    pub fn add_contact(
        &mut self,
        handle: ContactHandle,
        contact: &Contact,
        fixtures: &Arena<FixtureHandle, Fixture>,
    ) -> bool {
        let (Some(index_a), Some(index_b)) = (self.slot(contact.body_a), self.slot(contact.body_b))
        else {
            return false;
        };
        let radius = |fixture| fixtures.get(fixture).map_or(0.0, |f: &Fixture| f.shape.radius());
        self.contact_inputs.push(ContactSolverInput {
            manifold: contact.manifold,
            index_a,
            index_b,
            friction: contact.friction,
            restitution: contact.restitution,
            tangent_speed: contact.tangent_speed,
            radius_a: radius(contact.fixture_a),
            radius_b: radius(contact.fixture_b),
        });
        self.contact_handles.push(handle);
        true
    }

    /// Adds a copy of a joint. Bodies outside the island are frozen in place;
    /// a missing body maps to the world origin.
    pub fn add_joint(&mut self, handle: JointHandle, joint: &Joint, bodies: &Arena<BodyHandle, Body>) {
        let [a, b, c, d] = joint.bodies();
        let slots = JointSlots {
            a: self.joint_slot(a, bodies),
            b: self.joint_slot(b, bodies),
            c: self.joint_slot(c, bodies),
            d: self.joint_slot(d, bodies),
        };
        self.joints.push(IslandJoint {
            handle,
            joint: joint.clone(),
            slots,
        });
    }

    fn joint_slot(&mut self, handle: Option<BodyHandle>, bodies: &Arena<BodyHandle, Body>) -> usize {
        let Some(handle) = handle else {
            return self.ground_slot();
        };
        if let Some(&slot) = self.slots.get(&handle) {
            return slot;
        }
        let Some(body) = bodies.get(handle) else {
            return self.ground_slot();
        };
        let slot = self.push_fixed(SolverBody::fixed(handle, body));
        self.slots.insert(handle, slot);
        slot
    }

    fn ground_slot(&mut self) -> usize {
        if let Some(slot) = self.ground {
            return slot;
        }
        let slot = self.push_fixed(SolverBody::ground());
        self.ground = Some(slot);
        slot
    }

    fn push_fixed(&mut self, body: SolverBody) -> usize {
        let slot = self.bodies.len();
        self.positions.push(Position {
            c: body.sweep.c,
            a: body.sweep.a,
        });
        self.velocities.push(Velocity::default());
        self.bodies.push(body);
        slot
    }

    /// Full step: integrate velocities, solve velocity constraints, integrate
    /// positions, solve position constraints and update sleep timers.
    pub fn solve(&mut self, step: &TimeStep, integrator: &Integrator, settings: &WorldSettings) {
        for body in &mut self.bodies {
            body.sweep.c0 = body.sweep.c;
            body.sweep.a0 = body.sweep.a;
        }
        for (body, velocity) in self.bodies.iter().zip(self.velocities.iter_mut()) {
            integrator.integrate_velocity(body, velocity);
        }

        let inputs = std::mem::take(&mut self.contact_inputs);
        let mut contact_solver =
            ContactSolver::new(*step, inputs, &self.bodies, settings.velocity_threshold);
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        let mut data = SolverData {
            step: *step,
            bodies: &self.bodies,
            positions: &mut self.positions,
            velocities: &mut self.velocities,
        };
        for entry in &mut self.joints {
            entry.joint.init_velocity_constraints(entry.slots, &mut data);
        }

        for _ in 0..step.velocity_iterations {
            for entry in &mut self.joints {
                entry.joint.solve_velocity_constraints(&mut data);
            }
            contact_solver.solve_velocity_constraints(data.velocities);
        }
        contact_solver.store_impulses();
        for entry in &mut self.joints {
            entry.joint.check_breakpoint();
        }

        for (position, velocity) in data.positions.iter_mut().zip(data.velocities.iter_mut()) {
            integrator.integrate_position(position, velocity);
        }

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_ok = contact_solver.solve_position_constraints(data.positions);
            let mut joints_ok = true;
            for entry in &mut self.joints {
                let ok = entry.joint.solve_position_constraints(&mut data);
                joints_ok = joints_ok && ok;
            }
            if contacts_ok && joints_ok {
                position_solved = true;
                break;
            }
        }

        self.store_positions();
        self.impulses = contact_solver.impulses();
        self.manifolds = contact_solver.manifolds().copied().collect();

        self.asleep = false;
        if settings.allow_sleep {
            let mut min_sleep_time = f32::MAX;
            for (body, velocity) in self.bodies.iter_mut().zip(&self.velocities) {
                if body.body_type == BodyType::Static {
                    continue;
                }
                let sleep_time =
                    integrator.accumulate_sleep(&mut body.sleep_time, body.allow_sleep, velocity);
                min_sleep_time = min_sleep_time.min(sleep_time);
            }
            self.asleep = min_sleep_time >= settings.time_to_sleep && position_solved;
        }
    }

    /// Sub-step of a TOI event: push the two TOI bodies out of overlap, then
    /// solve velocities and integrate the rest of the step. Impulses are not
    /// kept for warm starting.
    pub fn solve_toi(
        &mut self,
        sub_step: &TimeStep,
        integrator: &Integrator,
        settings: &WorldSettings,
        toi_index_a: usize,
        toi_index_b: usize,
    ) {
        let inputs = std::mem::take(&mut self.contact_inputs);
        let mut contact_solver =
            ContactSolver::new(*sub_step, inputs, &self.bodies, settings.velocity_threshold);

        for _ in 0..sub_step.position_iterations {
            if contact_solver.solve_toi_position_constraints(
                &mut self.positions,
                toi_index_a,
                toi_index_b,
            ) {
                break;
            }
        }

        // The corrected poses become the new start of the sweep.
        for index in [toi_index_a, toi_index_b] {
            let body = &mut self.bodies[index];
            body.sweep.c0 = self.positions[index].c;
            body.sweep.a0 = self.positions[index].a;
        }

        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        for _ in 0..sub_step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            integrator.integrate_position(position, velocity);
        }
        self.store_positions();
        self.impulses = contact_solver.impulses();
        self.manifolds.clear();
        self.asleep = false;
    }

    fn store_positions(&mut self) {
        for (body, position) in self.bodies.iter_mut().zip(&self.positions) {
            body.sweep.c = position.c;
            body.sweep.a = position.a;
        }
    }

    /// Copies the solved state of dynamic members, contact impulses and joint
    /// state back into the world.
    pub fn write_back(
        self,
        bodies: &mut Arena<BodyHandle, Body>,
        contacts: &mut Arena<ContactHandle, Contact>,
        joints: &mut Arena<JointHandle, Joint>,
    ) -> IslandReport {
        let mut report = IslandReport {
            asleep: self.asleep,
            ..IslandReport::default()
        };

        for slot in 0..self.members {
            let solved = &self.bodies[slot];
            if solved.body_type != BodyType::Dynamic {
                continue;
            }
            let Some(handle) = solved.handle else {
                continue;
            };
            let Some(body) = bodies.get_mut(handle) else {
                continue;
            };
            body.sweep = solved.sweep;
            body.linear_velocity = self.velocities[slot].linear;
            body.angular_velocity = self.velocities[slot].angular;
            body.sleep_time = solved.sleep_time;
            body.synchronize_transform();
            if self.asleep {
                body.set_awake(false);
            }
            report.moved.push(handle);
        }

        for (&handle, manifold) in self.contact_handles.iter().zip(&self.manifolds) {
            if let Some(contact) = contacts.get_mut(handle) {
                contact.manifold = *manifold;
            }
        }
        report.post_solve = self
            .contact_handles
            .iter()
            .copied()
            .zip(self.impulses)
            .collect();

        for entry in self.joints {
            if entry.joint.is_broken() {
                report.broken_joints.push(entry.handle);
            }
            if let Some(joint) = joints.get_mut(entry.handle) {
                *joint = entry.joint;
            }
        }

        report
    }
}

/// Groups awake dynamic bodies with everything they touch or are jointed to.
///
/// Islands grow along touching, enabled, non-sensor contacts and along
/// joints. Static and kinematic bodies join an island but do not connect it
/// to others, so they may appear in several islands. Every visited body is
/// marked awake.
pub(crate) fn build_islands(
    bodies: &mut Arena<BodyHandle, Body>,
    contacts: &mut Arena<ContactHandle, Contact>,
    fixtures: &Arena<FixtureHandle, Fixture>,
    joints: &mut Arena<JointHandle, Joint>,
) -> Vec<Island> {
    for (_, body) in bodies.iter_mut() {
        body.island_flag = false;
    }
    for (_, contact) in contacts.iter_mut() {
        contact.island_flag = false;
    }
    for (_, joint) in joints.iter_mut() {
        joint.island_flag = false;
    }

    let is_sensor = |fixture| fixtures.get(fixture).is_some_and(|f: &Fixture| f.is_sensor);
    let seeds: Vec<BodyHandle> = bodies.handles().collect();
    let mut islands = Vec::new();
    let mut stack = Vec::new();

    for seed in seeds {
        let Some(body) = bodies.get_mut(seed) else {
            continue;
        };
        if body.island_flag || !body.awake || !body.enabled || body.body_type != BodyType::Dynamic {
            continue;
        }
        body.island_flag = true;
        stack.push(seed);

        let mut members = Vec::new();
        let mut island_contacts = Vec::new();
        let mut island_joints = Vec::new();

        while let Some(handle) = stack.pop() {
            let Some(body) = bodies.get_mut(handle) else {
                continue;
            };
            body.awake = true;
            members.push(handle);
            if body.body_type != BodyType::Dynamic {
                continue;
            }
            let contact_edges = body.contact_edges.clone();
            let joint_edges = body.joint_edges.clone();

            for contact_handle in contact_edges {
                let Some(contact) = contacts.get_mut(contact_handle) else {
                    continue;
                };
                if contact.island_flag || !contact.enabled || !contact.touching {
                    continue;
                }
                if is_sensor(contact.fixture_a) || is_sensor(contact.fixture_b) {
                    continue;
                }
                contact.island_flag = true;
                island_contacts.push(contact_handle);

                let other = if contact.body_a == handle {
                    contact.body_b
                } else {
                    contact.body_a
                };
                if let Some(other_body) = bodies.get_mut(other) {
                    if !other_body.island_flag {
                        other_body.island_flag = true;
                        stack.push(other);
                    }
                }
            }

            for joint_handle in joint_edges {
                let Some(joint) = joints.get_mut(joint_handle) else {
                    continue;
                };
                if joint.island_flag || !joint.enabled {
                    continue;
                }
                let other = if joint.body_a == Some(handle) {
                    Some(joint.body_b)
                } else {
                    joint.body_a
                };
                if let Some(other) = other {
                    if !bodies.get(other).is_some_and(|b| b.enabled) {
                        continue;
                    }
                }
                joint.island_flag = true;
                island_joints.push(joint_handle);

                if let Some(other) = other {
                    if let Some(other_body) = bodies.get_mut(other) {
                        if !other_body.island_flag {
                            other_body.island_flag = true;
                            stack.push(other);
                        }
                    }
                }
            }
        }

        let mut island = Island::new();
        for &member in &members {
            if let Some(body) = bodies.get(member) {
                island.add_body(member, body);
            }
        }
        for handle in island_contacts {
            if let Some(contact) = contacts.get(handle) {
                island.add_contact(handle, contact, fixtures);
            }
        }
        for handle in island_joints {
            if let Some(joint) = joints.get(handle) {
                island.add_joint(handle, joint, bodies);
            }
        }

        // Let static and kinematic bodies join other islands too.
        for &member in &members {
            if let Some(body) = bodies.get_mut(member) {
                if body.body_type != BodyType::Dynamic {
                    body.island_flag = false;
                }
            }
        }

        trace!(
            "island: {} bodies, {} contacts, {} joints",
            island.body_count(),
            island.contact_count(),
            island.joint_count()
        );
        islands.push(island);
    }

    islands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{body::BodyDef, fixture::FixtureDef, shape::Shape, types::Transform},
        dynamics::joints::{JointDef, JointFrame, RevoluteJointDef},
        utils::allocator::ArenaHandle,
    };
    use approx::assert_relative_eq;
    use glam::Vec2;

    #[derive(Default)]
    struct Scene {
        bodies: Arena<BodyHandle, Body>,
        fixtures: Arena<FixtureHandle, Fixture>,
        contacts: Arena<ContactHandle, Contact>,
        joints: Arena<JointHandle, Joint>,
    }

    impl Scene {
        fn body(&mut self, def: BodyDef) -> BodyHandle {
            let handle = self.bodies.insert(Body::new(&def));
            let fixture = Fixture::new(
                handle,
                FixtureDef::new(Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap()),
            );
            let fixture_handle = self.fixtures.insert(fixture);
            let body = self.bodies.get_mut(handle).unwrap();
            body.fixtures.push(fixture_handle);
            body.reset_mass_data(self.fixtures.get(fixture_handle).into_iter());
            handle
        }

        fn touch(&mut self, a: BodyHandle, b: BodyHandle) -> ContactHandle {
            let fixture_a = self.bodies.get(a).unwrap().fixtures[0];
            let fixture_b = self.bodies.get(b).unwrap().fixtures[0];
            let mut contact = Contact::new(
                crate::collision::narrowphase::ContactKind::CircleCircle,
                fixture_a,
                0,
                a,
                fixture_b,
                0,
                b,
                (a.index(), b.index()),
                0.5,
                0.0,
            );
            let shape = Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap();
            let xf_a = self.bodies.get(a).unwrap().transform();
            let xf_b = self.bodies.get(b).unwrap().transform();
            contact.evaluate(&shape, &xf_a, &shape, &xf_b, false);
            assert!(contact.touching);
            let handle = self.contacts.insert(contact);
            self.bodies.get_mut(a).unwrap().contact_edges.push(handle);
            self.bodies.get_mut(b).unwrap().contact_edges.push(handle);
            handle
        }

        fn build(&mut self) -> Vec<Island> {
            build_islands(
                &mut self.bodies,
                &mut self.contacts,
                &self.fixtures,
                &mut self.joints,
            )
        }
    }

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    #[test]
    fn static_bodies_do_not_merge_islands() {
        let mut scene = Scene::default();
        let ground = scene.body(BodyDef::fixed());
        let left = scene.body(BodyDef::dynamic().position(Vec2::new(-0.4, 0.5)));
        let right = scene.body(BodyDef::dynamic().position(Vec2::new(0.4, -0.5)));
        scene.touch(ground, left);
        scene.touch(ground, right);

        let islands = scene.build();
        assert_eq!(islands.len(), 2);
        for island in &islands {
            assert_eq!(island.body_count(), 2);
            assert_eq!(island.contact_count(), 1);
            assert!(island.slot(ground).is_some());
        }
    }

    #[test]
    fn touching_dynamic_bodies_share_an_island_and_wake() {
        let mut scene = Scene::default();
        let a = scene.body(BodyDef::dynamic());
        let b = scene.body(BodyDef::dynamic().position(Vec2::new(0.9, 0.0)).awake(false));
        scene.touch(a, b);

        let islands = scene.build();
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].body_count(), 2);
        assert!(scene.bodies.get(b).unwrap().is_awake());
    }

    #[test]
    fn sleeping_bodies_without_awake_neighbours_are_skipped() {
        let mut scene = Scene::default();
        scene.body(BodyDef::dynamic().awake(false));
        assert!(scene.build().is_empty());
    }

    #[test]
    fn world_anchored_joint_gets_a_ground_slot() {
        let mut scene = Scene::default();
        let body = scene.body(BodyDef::dynamic().position(Vec2::new(1.0, 0.0)));
        let frame_b = JointFrame::of(scene.bodies.get(body));
        let def: JointDef = RevoluteJointDef::new(None, body, Vec2::ZERO).into();
        let joint = Joint::new(&def, &JointFrame::WORLD, &frame_b).unwrap();
        let handle = scene.joints.insert(joint);
        scene.bodies.get_mut(body).unwrap().joint_edges.push(handle);

        let mut islands = scene.build();
        assert_eq!(islands.len(), 1);
        let island = &mut islands[0];
        assert_eq!(island.joint_count(), 1);
        assert_eq!(island.bodies.len(), 2);

        let settings = WorldSettings::default();
        let integrator = Integrator::new(Vec2::new(0.0, -10.0), 1.0 / 60.0, &settings);
        for _ in 0..30 {
            island.solve(&step(), &integrator, &settings);
        }
        // The pendulum stays one unit from the pivot.
        assert_relative_eq!(island.bodies[0].sweep.c.length(), 1.0, epsilon = 1e-2);
    }

    #[test]
    fn resting_island_falls_asleep_and_writes_back() {
        let mut scene = Scene::default();
        let body = scene.body(BodyDef::dynamic().gravity_scale(0.0));
        let settings = WorldSettings::default();
        let integrator = Integrator::new(Vec2::ZERO, 0.25, &settings);
        let step = TimeStep {
            dt: 0.25,
            inv_dt: 4.0,
            ..step()
        };

        let mut asleep = false;
        for _ in 0..4 {
            let mut islands = scene.build();
            assert_eq!(islands.len(), 1);
            let mut island = islands.remove(0);
            island.solve(&step, &integrator, &settings);
            let report = island.write_back(&mut scene.bodies, &mut scene.contacts, &mut scene.joints);
            assert_eq!(report.moved, vec![body]);
            asleep = report.asleep;
            if asleep {
                break;
            }
        }
        assert!(asleep);
        assert!(!scene.bodies.get(body).unwrap().is_awake());
    }

    #[test]
    fn contact_impulses_are_reported_after_solve() {
        let mut scene = Scene::default();
        let ground = scene.body(BodyDef::fixed());
        let ball = scene.body(BodyDef::dynamic().position(Vec2::new(0.0, 0.95)));
        let contact = scene.touch(ground, ball);

        let settings = WorldSettings::default();
        let integrator = Integrator::new(Vec2::new(0.0, -10.0), 1.0 / 60.0, &settings);
        let mut islands = scene.build();
        let mut island = islands.remove(0);
        island.solve(&step(), &integrator, &settings);
        let report = island.write_back(&mut scene.bodies, &mut scene.contacts, &mut scene.joints);

        assert_eq!(report.post_solve.len(), 1);
        assert_eq!(report.post_solve[0].0, contact);
        assert!(report.post_solve[0].1.max_normal_impulse() > 0.0);
        let stored = scene.contacts.get(contact).unwrap().manifold.points[0].normal_impulse;
        assert!(stored > 0.0);
        // Ground is never written back.
        assert_eq!(scene.bodies.get(ground).unwrap().transform(), Transform::IDENTITY);
    }
}
