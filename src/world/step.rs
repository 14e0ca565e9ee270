//! The time step: collide, solve islands, then resolve time of impact.

use std::time::Instant;

use log::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::{
        ccd::{is_fast_mover, time_of_impact, ToiInput, ToiLimits, ToiState},
        distance::DistanceProxy,
    },
    config::WorldSettings,
    core::{
        body::{Body, BodyType},
        fixture::Fixture,
    },
    dynamics::{
        contact::ContactImpulse,
        integrator::Integrator,
        island::{build_islands, Island},
        solver::TimeStep,
    },
    utils::{
        allocator::{BodyHandle, ContactHandle, JointHandle},
        logging::{warn_if_slower_than_real_time, StageTimer, StepStage},
        profiling::ProfileTimer,
    },
    world::{event_sink, synchronize_fixtures, World},
};

/// Position iterations of a TOI sub-step.
const TOI_POSITION_ITERATIONS: u32 = 20;

impl World {
    /// Advances the world by `dt` seconds.
    ///
    /// Runs the narrow-phase, solves every awake island, resolves tunneling
    /// with continuous collision and finally applies the commands queued by
    /// callbacks. A non-finite or negative `dt` is treated as zero: contacts
    /// are updated but nothing moves.
    pub fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) {
        let timer = StageTimer::new(StepStage::Step);
        let started = Instant::now();
        self.profile.reset();

        let dt = if dt.is_finite() && dt >= 0.0 {
            dt
        } else {
            warn!("ignoring invalid time step {dt}");
            0.0
        };

        self.break_pending_bodies();

        if self.new_contacts {
            self.find_new_contacts();
            self.new_contacts = false;
        }

        let step = TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting: self.settings.warm_starting,
        };

        {
            let _stage = StageTimer::new(StepStage::Collide);
            let _collide = ProfileTimer::new(&mut self.profile.collide_time);
            let mut sink = event_sink!(self);
            self.contact_manager
                .collide(&mut self.bodies, &self.fixtures, &self.joints, &mut sink);
        }

        if step.dt > 0.0 {
            self.solve(&step);
            if self.settings.continuous_physics {
                self.solve_toi(&step);
            }
            self.inv_dt0 = step.inv_dt;
        }

        if self.settings.auto_clear_forces {
            self.clear_forces();
        }

        self.apply_commands();
        self.breakable.cache_velocities(&self.bodies);

        self.profile.body_count = self.bodies.len();
        self.profile.contact_count = self.contact_manager.contact_count();
        self.profile.joint_count = self.joints.len();
        self.profile.total_step_time = started.elapsed();
        warn_if_slower_than_real_time(timer.elapsed(), dt);
        self.profile.report();
    }

    pub(crate) fn find_new_contacts(&mut self) {
        let _timer = StageTimer::new(StepStage::FindNewContacts);
        let started = Instant::now();
        let mut sink = event_sink!(self);
        self.contact_manager
            .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints, &mut sink);
        self.profile.broad_phase_time += started.elapsed();
    }

    fn solve(&mut self, step: &TimeStep) {
        let _timer = StageTimer::new(StepStage::Solve);
        let started = Instant::now();
        let integrator = Integrator::new(self.gravity, step.dt, &self.settings);

        let mut islands = build_islands(
            &mut self.bodies,
            &mut self.contact_manager.contacts,
            &self.fixtures,
            &mut self.joints,
        );
        self.profile.island_count = islands.len();

        let mut moved = self.integrate_kinematic_bodies(&integrator);

        solve_islands(&mut islands, step, &integrator, &self.settings, self.parallel_enabled());

        let mut post_solve = Vec::new();
        let mut broken_joints = Vec::new();
        for island in islands {
            let report = island.write_back(
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
            );
            moved.extend(report.moved);
            post_solve.extend(report.post_solve);
            broken_joints.extend(report.broken_joints);
        }

        self.report_post_solve(post_solve);

        for handle in moved {
            if let Some(body) = self.bodies.get(handle) {
                debug_assert!(body.is_state_valid(), "body {handle:?} diverged");
                synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
            }
        }
        self.profile.solve_time += started.elapsed();

        self.destroy_broken_joints(broken_joints);
        self.find_new_contacts();
    }

    /// Kinematic bodies follow their velocity regardless of islands.
    fn integrate_kinematic_bodies(&mut self, integrator: &Integrator) -> Vec<BodyHandle> {
        let mut moved = Vec::new();
        for (handle, body) in self.bodies.iter_mut() {
            if body.body_type != BodyType::Kinematic || !body.awake || !body.enabled {
                continue;
            }
            let sleep_time = integrator.integrate_kinematic(body);
            if self.settings.allow_sleep && sleep_time >= self.settings.time_to_sleep {
                body.set_awake(false);
            }
            moved.push(handle);
        }
        moved
    }

    fn report_post_solve(&mut self, impulses: Vec<(ContactHandle, ContactImpulse)>) {
        let mut sink = event_sink!(self);
        for (handle, impulse) in impulses {
            self.contact_manager
                .post_solve(handle, &impulse, &self.bodies, &self.fixtures, &mut sink);
        }
    }

    fn destroy_broken_joints(&mut self, broken: Vec<JointHandle>) {
        for handle in broken {
            let Some(joint) = self.remove_joint(handle) else {
                continue;
            };
            debug!(
                "joint {handle:?} broke: reaction impulse {:.3} exceeded {:.3}",
                joint.reaction_impulse(),
                joint.breakpoint()
            );
            if let Some(callback) = self.callbacks.joint_broken.as_mut() {
                callback(handle, &joint, &mut self.commands);
            }
        }
    }

    /// Finds the earliest time of impact among fast contacts, rewinds the two
    /// bodies to it, solves a mini-island for the rest of the step and
    /// repeats until no contact impacts before the end of the step.
    fn solve_toi(&mut self, step: &TimeStep) {
        let _timer = StageTimer::new(StepStage::SolveToi);
        let started = Instant::now();
        let ccd = self.settings.ccd;
        let limits = ToiLimits {
            max_iterations: ccd.toi_max_iterations,
            max_root_iterations: ccd.toi_max_root_iterations,
        };

        for (_, body) in self.bodies.iter_mut() {
            body.island_flag = false;
            body.sweep.alpha0 = 0.0;
        }
        for (_, contact) in self.contact_manager.contacts.iter_mut() {
            contact.toi_flag = false;
            contact.island_flag = false;
            contact.toi_count = 0;
            contact.toi = 1.0;
        }

        loop {
            let Some((min_contact, min_alpha)) = self.find_min_toi(limits) else {
                break;
            };
            if min_alpha > 1.0 - 10.0 * f32::EPSILON {
                break;
            }
            self.profile.toi_event_count += 1;
            self.resolve_toi_event(step, min_contact, min_alpha);
        }

        self.profile.solve_toi_time += started.elapsed();
    }

    /// Earliest impact over every eligible contact, computing TOIs that are
    /// not cached yet.
    fn find_min_toi(&mut self, limits: ToiLimits) -> Option<(ContactHandle, f32)> {
        let ccd = self.settings.ccd;
        let mut min_contact = None;
        let mut min_alpha = 1.0;

        let handles: Vec<ContactHandle> = self.contact_manager.contacts.handles().collect();
        for handle in handles {
            let Some(contact) = self.contact_manager.contacts.get_mut(handle) else {
                continue;
            };
            if !contact.enabled || contact.toi_count > ccd.max_sub_steps {
                continue;
            }

            let alpha = if contact.toi_flag {
                contact.toi
            } else {
                let (Some(fixture_a), Some(fixture_b)) = (
                    self.fixtures.get(contact.fixture_a),
                    self.fixtures.get(contact.fixture_b),
                ) else {
                    continue;
                };
                if fixture_a.is_sensor || fixture_b.is_sensor {
                    continue;
                }
                let (Some(body_a), Some(body_b)) =
                    (self.bodies.get(contact.body_a), self.bodies.get(contact.body_b))
                else {
                    continue;
                };

                let active_a = body_a.awake && body_a.body_type != BodyType::Static;
                let active_b = body_b.awake && body_b.body_type != BodyType::Static;
                if !active_a && !active_b {
                    continue;
                }
                // Dynamic pairs are only swept when one of them is a bullet.
                let collide_a = body_a.bullet || body_a.body_type != BodyType::Dynamic;
                let collide_b = body_b.bullet || body_b.body_type != BodyType::Dynamic;
                if !collide_a && !collide_b {
                    continue;
                }
                if ccd.motion_threshold > 0.0
                    && !is_fast_body(body_a, fixture_a, ccd.motion_threshold)
                    && !is_fast_body(body_b, fixture_b, ccd.motion_threshold)
                {
                    continue;
                }

                // Bring both sweeps to the same start time.
                let alpha0 = body_a.sweep.alpha0.max(body_b.sweep.alpha0);
                debug_assert!(alpha0 < 1.0);
                for body in [contact.body_a, contact.body_b] {
                    if let Some(body) = self.bodies.get_mut(body) {
                        if body.sweep.alpha0 < alpha0 {
                            body.sweep.advance(alpha0);
                        }
                    }
                }
                let (Some(body_a), Some(body_b)) =
                    (self.bodies.get(contact.body_a), self.bodies.get(contact.body_b))
                else {
                    continue;
                };

                let input = ToiInput {
                    proxy_a: DistanceProxy::new(&fixture_a.shape, contact.child_a),
                    proxy_b: DistanceProxy::new(&fixture_b.shape, contact.child_b),
                    sweep_a: body_a.sweep,
                    sweep_b: body_b.sweep,
                    t_max: 1.0,
                };
                let output = time_of_impact(&input, limits);

                let alpha = if output.state == ToiState::Touching {
                    (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
                } else {
                    1.0
                };
                contact.toi = alpha;
                contact.toi_flag = true;
                alpha
            };

            if alpha < min_alpha {
                min_contact = Some(handle);
                min_alpha = alpha;
            }
        }

        min_contact.map(|handle| (handle, min_alpha))
    }

    fn resolve_toi_event(&mut self, step: &TimeStep, min_contact: ContactHandle, min_alpha: f32) {
        let Some(contact) = self.contact_manager.contacts.get(min_contact) else {
            return;
        };
        let (handle_a, handle_b) = (contact.body_a, contact.body_b);
        let (Some(backup_a), Some(backup_b)) = (
            self.bodies.get(handle_a).map(|b| b.sweep),
            self.bodies.get(handle_b).map(|b| b.sweep),
        ) else {
            return;
        };

        for handle in [handle_a, handle_b] {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.advance(min_alpha);
            }
        }

        // The contact may have changed at the new poses.
        {
            let mut sink = event_sink!(self);
            self.contact_manager
                .update_contact(min_contact, &mut self.bodies, &self.fixtures, &mut sink);
        }
        let Some(contact) = self.contact_manager.contacts.get_mut(min_contact) else {
            return;
        };
        contact.toi_flag = false;
        contact.toi_count += 1;

        if !contact.enabled || !contact.touching {
            // Rewind and ignore this contact for the rest of the step.
            contact.enabled = false;
            for (handle, backup) in [(handle_a, backup_a), (handle_b, backup_b)] {
                if let Some(body) = self.bodies.get_mut(handle) {
                    body.sweep = backup;
                    body.synchronize_transform();
                }
            }
            return;
        }
        contact.island_flag = true;

        let mut island = Island::new();
        let mut members = Vec::new();
        for handle in [handle_a, handle_b] {
            if let Some(body) = self.bodies.get_mut(handle) {
                body.set_awake(true);
                body.island_flag = true;
                island.add_body(handle, body);
                members.push(handle);
            }
        }
        let mut island_contacts = vec![min_contact];

        for handle in [handle_a, handle_b] {
            self.gather_toi_contacts(handle, min_alpha, &mut island, &mut members, &mut island_contacts);
        }

        for &handle in &island_contacts {
            if let Some(contact) = self.contact_manager.contacts.get(handle) {
                island.add_contact(handle, contact, &self.fixtures);
            }
        }

        let sub_dt = (1.0 - min_alpha) * step.dt;
        let sub_step = TimeStep {
            dt: sub_dt,
            inv_dt: 1.0 / sub_dt,
            dt_ratio: 1.0,
            velocity_iterations: step.velocity_iterations,
            position_iterations: TOI_POSITION_ITERATIONS,
            warm_starting: false,
        };
        let integrator = Integrator::new(self.gravity, sub_dt, &self.settings);
        island.solve_toi(&sub_step, &integrator, &self.settings, 0, 1);

        let report = island.write_back(
            &mut self.bodies,
            &mut self.contact_manager.contacts,
            &mut self.joints,
        );

        // Displaced bodies invalidate the cached TOI of all their contacts.
        for handle in members {
            let Some(body) = self.bodies.get_mut(handle) else {
                continue;
            };
            body.island_flag = false;
            if body.body_type != BodyType::Dynamic {
                continue;
            }
            synchronize_fixtures(body, &mut self.fixtures, &mut self.contact_manager.broad_phase);
            for &edge in &body.contact_edges {
                if let Some(contact) = self.contact_manager.contacts.get_mut(edge) {
                    contact.toi_flag = false;
                    contact.island_flag = false;
                }
            }
        }

        self.report_post_solve(report.post_solve);

        // New pairs may appear at the corrected poses.
        self.find_new_contacts();
    }

    /// Adds the touching contacts of a TOI body to the mini-island, advancing
    /// the bodies on the other side to the same time.
    fn gather_toi_contacts(
        &mut self,
        handle: BodyHandle,
        min_alpha: f32,
        island: &mut Island,
        members: &mut Vec<BodyHandle>,
        island_contacts: &mut Vec<ContactHandle>,
    ) {
        let max_contacts = self.settings.ccd.max_toi_contacts;
        let Some(body) = self.bodies.get(handle) else {
            return;
        };
        if body.body_type != BodyType::Dynamic {
            return;
        }
        let bullet = body.bullet;

        for edge in body.contact_edges.clone() {
            if island_contacts.len() >= max_contacts {
                break;
            }
            let Some(contact) = self.contact_manager.contacts.get(edge) else {
                continue;
            };
            if contact.island_flag {
                continue;
            }
            let other = if contact.body_a == handle {
                contact.body_b
            } else {
                contact.body_a
            };
            let Some(other_body) = self.bodies.get(other) else {
                continue;
            };
            // Dynamic neighbors only join for bullets.
            if other_body.body_type == BodyType::Dynamic && !bullet && !other_body.bullet {
                continue;
            }
            let sensor = [contact.fixture_a, contact.fixture_b]
                .iter()
                .any(|&f| self.fixtures.get(f).is_some_and(|f| f.is_sensor));
            if sensor {
                continue;
            }

            let backup = other_body.sweep;
            let other_in_island = other_body.island_flag;
            if !other_in_island {
                if let Some(other_body) = self.bodies.get_mut(other) {
                    other_body.advance(min_alpha);
                }
            }

            {
                let mut sink = event_sink!(self);
                self.contact_manager
                    .update_contact(edge, &mut self.bodies, &self.fixtures, &mut sink);
            }
            let Some(contact) = self.contact_manager.contacts.get_mut(edge) else {
                continue;
            };
            if !contact.enabled || !contact.touching {
                if let Some(other_body) = self.bodies.get_mut(other) {
                    other_body.sweep = backup;
                    other_body.synchronize_transform();
                }
                continue;
            }
            contact.island_flag = true;
            island_contacts.push(edge);

            if other_in_island {
                continue;
            }
            if let Some(other_body) = self.bodies.get_mut(other) {
                other_body.island_flag = true;
                if other_body.body_type != BodyType::Static {
                    other_body.set_awake(true);
                }
                island.add_body(other, other_body);
                members.push(other);
            }
        }
    }
}

fn is_fast_body(body: &Body, fixture: &Fixture, motion_threshold: f32) -> bool {
    if body.body_type == BodyType::Static {
        return false;
    }
    let extent = fixture.shape.compute_extent(body.sweep.local_center);
    is_fast_mover(&body.sweep, extent, motion_threshold)
}

/// Solves independent islands, on the rayon pool when enabled.
fn solve_islands(
    islands: &mut [Island],
    step: &TimeStep,
    integrator: &Integrator,
    settings: &WorldSettings,
    parallel: bool,
) {
    #[cfg(feature = "parallel")]
    if parallel && islands.len() > 1 {
        islands
            .par_iter_mut()
            .for_each(|island| island.solve(step, integrator, settings));
        return;
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;

    for island in islands.iter_mut() {
        island.solve(step, integrator, settings);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use crate::{
        config::WorldSettings,
        core::{body::BodyDef, shape::Shape},
        world::World,
    };

    #[test]
    fn invalid_dt_does_not_move_bodies() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let body = world.create_body(&BodyDef::dynamic()).unwrap();
        world
            .create_fixture(body, &Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap().into())
            .unwrap();
        world.step(f32::NAN, 8, 3);
        world.step(-1.0, 8, 3);
        assert_eq!(world.body(body).unwrap().position(), Vec2::ZERO);
    }

    #[test]
    fn free_fall_matches_semi_implicit_euler() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let body = world.create_body(&BodyDef::dynamic()).unwrap();
        world
            .create_fixture(body, &Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap().into())
            .unwrap();
        let dt = 1.0 / 60.0;
        for _ in 0..60 {
            world.step(dt, 8, 3);
        }
        let body = world.body(body).unwrap();
        assert!((body.linear_velocity().y + 10.0).abs() < 1e-3);
        // Sum of k * g * dt^2 for k = 1..=60.
        let expected = -10.0 * dt * dt * (60.0 * 61.0 / 2.0);
        assert!((body.position().y - expected).abs() < 1e-3);
    }

    #[test]
    fn kinematic_bodies_move_without_islands() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let body = world
            .create_body(&BodyDef::kinematic().linear_velocity(Vec2::new(1.0, 0.0)))
            .unwrap();
        world.step(0.5, 8, 3);
        let body = world.body(body).unwrap();
        assert!((body.position() - Vec2::new(0.5, 0.0)).length() < 1e-5);
        assert_eq!(world.profile().island_count, 0);
    }

    #[test]
    fn serial_and_parallel_solves_agree() {
        let build = |parallel: bool| {
            let mut world = World::with_settings(Vec2::new(0.0, -10.0), WorldSettings::default()).unwrap();
            world.set_parallel_enabled(parallel);
            let ground = world.create_body(&BodyDef::fixed()).unwrap();
            world
                .create_fixture(ground, &Shape::rect(20.0, 0.5, 1.0).unwrap().into())
                .unwrap();
            let mut handles = Vec::new();
            for i in 0..4 {
                let x = -9.0 + 6.0 * i as f32;
                let body = world
                    .create_body(&BodyDef::dynamic().position(Vec2::new(x, 2.0)))
                    .unwrap();
                world
                    .create_fixture(body, &Shape::rect(0.5, 0.5, 1.0).unwrap().into())
                    .unwrap();
                handles.push(body);
            }
            for _ in 0..120 {
                world.step(1.0 / 60.0, 8, 3);
            }
            handles
                .iter()
                .map(|&h| world.body(h).unwrap().position())
                .collect::<Vec<_>>()
        };
        let serial = build(false);
        let parallel = build(true);
        for (a, b) in serial.iter().zip(&parallel) {
            assert!((*a - *b).length() < 1e-6);
        }
    }
}
