//! Bodies that shatter into one body per fixture under a hard impact.

use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    core::{
        body::{Body, BodyDef},
        fixture::{Fixture, FixtureDef},
        types::{Material, Velocity},
    },
    dynamics::contact::ContactImpulse,
    error::{PhysicsError, PhysicsResult},
    utils::{
        allocator::{Arena, BodyHandle},
        math::cross_sv,
    },
    world::World,
};

#[derive(Debug, Clone, Copy)]
struct Breakable {
    strength: f32,
    /// Velocity at the end of the previous step, before the impact.
    velocity: Velocity,
    broken: bool,
}

/// Tracks which bodies may break and which were hit hard enough to do so.
#[derive(Debug, Default)]
pub(crate) struct BreakableBodies {
    entries: HashMap<BodyHandle, Breakable>,
}

impl BreakableBodies {
    /// `velocity` seeds the cache so a body hit on its first step still
    /// breaks with the motion it had.
    pub fn set_strength(&mut self, body: BodyHandle, strength: Option<f32>, velocity: Velocity) {
        match strength {
            Some(strength) => {
                let entry = self.entries.entry(body).or_insert(Breakable {
                    strength,
                    velocity,
                    broken: false,
                });
                entry.strength = strength;
            }
            None => {
                self.entries.remove(&body);
            }
        }
    }

    pub fn strength(&self, body: BodyHandle) -> Option<f32> {
        self.entries.get(&body).map(|entry| entry.strength)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks either body broken when the contact's largest normal impulse
    /// exceeds its strength.
    pub fn record_impulse(&mut self, body_a: BodyHandle, body_b: BodyHandle, impulse: &ContactImpulse) {
        if self.entries.is_empty() {
            return;
        }
        let max_impulse = impulse.max_normal_impulse();
        for body in [body_a, body_b] {
            if let Some(entry) = self.entries.get_mut(&body) {
                if max_impulse > entry.strength {
                    entry.broken = true;
                }
            }
        }
    }

    /// Broken entries keep the velocity from before the impact step.
    pub fn cache_velocities(&mut self, bodies: &Arena<BodyHandle, Body>) {
        for (handle, entry) in self.entries.iter_mut().filter(|(_, entry)| !entry.broken) {
            if let Some(body) = bodies.get(*handle) {
                entry.velocity = Velocity::new(body.linear_velocity, body.angular_velocity);
            }
        }
    }

    /// Removes and returns the broken bodies with their pre-impact velocity,
    /// in handle order.
    pub fn take_broken(&mut self) -> Vec<(BodyHandle, Velocity)> {
        let mut broken: Vec<(BodyHandle, Velocity)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.broken)
            .map(|(&handle, entry)| (handle, entry.velocity))
            .collect();
        broken.sort_by_key(|(handle, _)| *handle);
        for (handle, _) in &broken {
            self.entries.remove(handle);
        }
        broken
    }

    pub fn forget(&mut self, body: BodyHandle) {
        self.entries.remove(&body);
    }
}

fn fixture_def(fixture: &Fixture) -> FixtureDef {
    FixtureDef {
        shape: fixture.shape.clone(),
        material: Material {
            friction: fixture.friction,
            restitution: fixture.restitution,
        },
        is_sensor: fixture.is_sensor,
        filter: fixture.filter,
        user_data: fixture.user_data,
    }
}

impl World {
    /// Makes a body breakable: a contact impulse above `strength` splits it
    /// into one body per fixture at the start of the next step. `None`
    /// makes it unbreakable again.
    pub fn set_body_strength(&mut self, body: BodyHandle, strength: Option<f32>) -> PhysicsResult<()> {
        let velocity = match self.bodies.get(body) {
            Some(body) => Velocity::new(body.linear_velocity, body.angular_velocity),
            None => return Err(PhysicsError::StaleHandle { kind: "body" }),
        };
        if let Some(strength) = strength {
            if !(strength.is_finite() && strength > 0.0) {
                return Err(PhysicsError::InvalidBody {
                    reason: "break strength must be finite and positive",
                });
            }
        }
        self.breakable.set_strength(body, strength, velocity);
        Ok(())
    }

    pub fn body_strength(&self, body: BodyHandle) -> Option<f32> {
        self.breakable.strength(body)
    }

    /// Splits every body marked broken during the previous step.
    ///
    /// Each part keeps the velocity its fixture had before the impact, so
    /// the pieces fly apart the way the whole body was moving.
    pub(crate) fn break_pending_bodies(&mut self) {
        if self.breakable.is_empty() {
            return;
        }
        for (handle, velocity) in self.breakable.take_broken() {
            let Some(body) = self.bodies.get(handle) else {
                continue;
            };
            if body.fixtures.len() < 2 {
                debug!("breakable body {handle:?} has a single fixture, nothing to split");
                continue;
            }

            let center = body.world_center();
            let def = BodyDef {
                body_type: body.body_type,
                position: body.position(),
                angle: body.angle(),
                linear_damping: body.linear_damping,
                angular_damping: body.angular_damping,
                gravity_scale: body.gravity_scale,
                allow_sleep: body.allow_sleep,
                bullet: body.bullet,
                fixed_rotation: body.fixed_rotation,
                user_data: body.user_data,
                ..BodyDef::default()
            };
            let fixture_defs: Vec<FixtureDef> = body
                .fixtures
                .iter()
                .filter_map(|&f| self.fixtures.get(f))
                .map(fixture_def)
                .collect();

            if let Err(err) = self.destroy_body(handle) {
                warn!("failed to remove broken body {handle:?}: {err}");
                continue;
            }

            let mut parts = Vec::with_capacity(fixture_defs.len());
            for fixture_def in &fixture_defs {
                let part = match self
                    .create_body(&def)
                    .and_then(|part| self.create_fixture(part, fixture_def).map(|_| part))
                {
                    Ok(part) => part,
                    Err(err) => {
                        warn!("failed to create fragment of {handle:?}: {err}");
                        continue;
                    }
                };
                if let Some(body) = self.bodies.get_mut(part) {
                    let offset = body.world_center() - center;
                    body.set_linear_velocity(velocity.linear + cross_sv(velocity.angular, offset));
                    body.set_angular_velocity(velocity.angular);
                }
                parts.push(part);
            }
            debug!("body {handle:?} broke into {} parts", parts.len());

            if let Some(callback) = self.callbacks.body_broken.as_mut() {
                callback(handle, &parts, &mut self.commands);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn impulse(normal: f32) -> ContactImpulse {
        ContactImpulse {
            normal_impulses: [normal, 0.0],
            count: 1,
            ..ContactImpulse::default()
        }
    }

    #[test]
    fn only_impulses_above_strength_break() {
        let mut tracker = BreakableBodies::default();
        let weak = BodyHandle::new(0, 0);
        let strong = BodyHandle::new(1, 0);
        tracker.set_strength(weak, Some(1.0), Velocity::default());
        tracker.set_strength(strong, Some(10.0), Velocity::default());

        tracker.record_impulse(weak, strong, &impulse(5.0));
        let broken = tracker.take_broken();
        assert_eq!(broken.len(), 1);
        assert_eq!(broken[0].0, weak);
        assert_eq!(tracker.strength(weak), None);
        assert_eq!(tracker.strength(strong), Some(10.0));
    }

    #[test]
    fn unregistered_bodies_are_ignored() {
        let mut tracker = BreakableBodies::default();
        tracker.record_impulse(BodyHandle::new(0, 0), BodyHandle::new(1, 0), &impulse(1e6));
        assert!(tracker.take_broken().is_empty());
    }

    #[test]
    fn fragments_inherit_rigid_motion() {
        use crate::core::shape::Shape;

        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::dynamic()).unwrap();
        for x in [-1.0, 1.0] {
            let shape = Shape::oriented_box(0.5, 0.5, Vec2::new(x, 0.0), 0.0, 1.0).unwrap();
            world.create_fixture(body, &shape.into()).unwrap();
        }
        world.set_body_strength(body, Some(1.0)).unwrap();
        world.breakable.entries.get_mut(&body).unwrap().broken = true;
        world.breakable.entries.get_mut(&body).unwrap().velocity = Velocity::new(Vec2::new(2.0, 0.0), 1.0);

        world.break_pending_bodies();
        assert!(world.body(body).is_none());
        assert_eq!(world.body_count(), 2);
        for (_, part) in world.bodies() {
            let offset_x = part.world_center().x;
            assert!((part.angular_velocity() - 1.0).abs() < 1e-6);
            // v + w x r with r = (x, 0) gives (2, x).
            assert!((part.linear_velocity() - Vec2::new(2.0, offset_x)).length() < 1e-4);
        }
    }

    #[test]
    fn fragments_keep_velocity_from_before_the_impact() {
        use crate::core::shape::Shape;

        let mut world = World::new(Vec2::new(0.0, -10.0));
        let ground = world.create_body(&BodyDef::fixed()).unwrap();
        let ground_shape = Shape::rect(20.0, 0.5, 1.0).unwrap();
        world.create_fixture(ground, &ground_shape.into()).unwrap();

        let body = world
            .create_body(
                &BodyDef::dynamic()
                    .position(Vec2::new(0.0, 3.0))
                    .linear_velocity(Vec2::new(0.0, -20.0)),
            )
            .unwrap();
        for x in [-0.5, 0.5] {
            let shape = Shape::oriented_box(0.5, 0.25, Vec2::new(x, 0.0), 0.0, 1.0).unwrap();
            world.create_fixture(body, &shape.into()).unwrap();
        }
        world.set_body_strength(body, Some(1.0)).unwrap();

        let dt = 1.0 / 60.0;
        let mut before_impact = None;
        for _ in 0..60 {
            let velocity = world.body(body).unwrap().linear_velocity();
            world.step(dt, 8, 3);
            if world.breakable.entries.get(&body).is_some_and(|entry| entry.broken) {
                before_impact = Some(velocity);
                break;
            }
        }
        let before_impact = before_impact.expect("body should be hit hard enough to break");
        assert!(before_impact.y < -19.0, "falling speed {:?}", before_impact);
        assert!(
            world.body(body).unwrap().linear_velocity().y > before_impact.y * 0.5,
            "contact should have stopped the body"
        );

        let cached = world.breakable.entries[&body].velocity.linear;
        assert!(
            (cached - before_impact).length() < 1e-3,
            "cached {:?}, expected {:?}",
            cached,
            before_impact
        );

        world.step(dt, 8, 3);
        assert!(world.body(body).is_none());
    }

    #[test]
    fn first_step_impact_uses_initial_velocity() {
        let mut world = World::new(Vec2::ZERO);
        let body = world
            .create_body(&BodyDef::dynamic().linear_velocity(Vec2::new(0.0, -7.0)))
            .unwrap();
        world.set_body_strength(body, Some(1.0)).unwrap();
        assert_eq!(world.breakable.entries[&body].velocity.linear, Vec2::new(0.0, -7.0));
    }

    #[test]
    fn strength_must_be_positive() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::dynamic()).unwrap();
        assert!(world.set_body_strength(body, Some(0.0)).is_err());
        assert!(world.set_body_strength(body, Some(f32::NAN)).is_err());
        world.set_body_strength(body, Some(3.0)).unwrap();
        assert_eq!(world.body_strength(body), Some(3.0));
        world.set_body_strength(body, None).unwrap();
        assert_eq!(world.body_strength(body), None);
    }
}
