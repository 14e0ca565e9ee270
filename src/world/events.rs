//! User callbacks and the commands they queue while the world is locked.

use glam::Vec2;
use log::debug;

use crate::{
    collision::manifold::Manifold,
    core::fixture::Fixture,
    dynamics::{
        contact::{ContactImpulse, ContactView},
        contact_manager::ContactListener,
        joints::Joint,
    },
    utils::allocator::{BodyHandle, FixtureHandle, JointHandle},
    world::breakable::BreakableBodies,
};

pub type ContactCallback = Box<dyn FnMut(&mut ContactView<'_>, &mut DeferredCommands) + Send + Sync>;
pub type PreSolveCallback =
    Box<dyn FnMut(&mut ContactView<'_>, &Manifold, &mut DeferredCommands) + Send + Sync>;
pub type PostSolveCallback =
    Box<dyn FnMut(&mut ContactView<'_>, &ContactImpulse, &mut DeferredCommands) + Send + Sync>;
pub type JointBrokenCallback = Box<dyn FnMut(JointHandle, &Joint, &mut DeferredCommands) + Send + Sync>;
/// Receives the broken body (now destroyed) and the bodies it was split into.
pub type BodyBrokenCallback =
    Box<dyn FnMut(BodyHandle, &[BodyHandle], &mut DeferredCommands) + Send + Sync>;
/// Extra pair filter run after the fixture filters accept a pair.
pub type ContactFilter = Box<dyn Fn(&Fixture, &Fixture) -> bool + Send + Sync>;

/// World mutation requested from inside a callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    DestroyBody(BodyHandle),
    DestroyFixture(FixtureHandle),
    DestroyJoint(JointHandle),
    SetAwake(BodyHandle, bool),
    SetEnabled(BodyHandle, bool),
    SetLinearVelocity(BodyHandle, Vec2),
    SetAngularVelocity(BodyHandle, f32),
    SetTransform {
        body: BodyHandle,
        position: Vec2,
        angle: f32,
    },
    ApplyLinearImpulse {
        body: BodyHandle,
        impulse: Vec2,
        point: Vec2,
    },
    ApplyAngularImpulse {
        body: BodyHandle,
        impulse: f32,
    },
}

/// Queue of mutations applied in order once the current step finishes.
#[derive(Debug, Default)]
pub struct DeferredCommands {
    commands: Vec<Command>,
}

impl DeferredCommands {
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn destroy_body(&mut self, body: BodyHandle) {
        self.push(Command::DestroyBody(body));
    }

    pub fn destroy_fixture(&mut self, fixture: FixtureHandle) {
        self.push(Command::DestroyFixture(fixture));
    }

    pub fn destroy_joint(&mut self, joint: JointHandle) {
        self.push(Command::DestroyJoint(joint));
    }

    pub fn set_awake(&mut self, body: BodyHandle, awake: bool) {
        self.push(Command::SetAwake(body, awake));
    }

    pub fn set_enabled(&mut self, body: BodyHandle, enabled: bool) {
        self.push(Command::SetEnabled(body, enabled));
    }

    pub fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec2) {
        self.push(Command::SetLinearVelocity(body, velocity));
    }

    pub fn set_angular_velocity(&mut self, body: BodyHandle, omega: f32) {
        self.push(Command::SetAngularVelocity(body, omega));
    }

    pub fn set_transform(&mut self, body: BodyHandle, position: Vec2, angle: f32) {
        self.push(Command::SetTransform {
            body,
            position,
            angle,
        });
    }

    pub fn apply_linear_impulse(&mut self, body: BodyHandle, impulse: Vec2, point: Vec2) {
        self.push(Command::ApplyLinearImpulse {
            body,
            impulse,
            point,
        });
    }

    pub fn apply_angular_impulse(&mut self, body: BodyHandle, impulse: f32) {
        self.push(Command::ApplyAngularImpulse { body, impulse });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> + '_ {
        self.commands.iter()
    }

    pub(crate) fn take(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }
}

/// Registered callbacks. Every slot is optional.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub begin_contact: Option<ContactCallback>,
    pub end_contact: Option<ContactCallback>,
    pub pre_solve: Option<PreSolveCallback>,
    pub post_solve: Option<PostSolveCallback>,
    pub joint_broken: Option<JointBrokenCallback>,
    pub body_broken: Option<BodyBrokenCallback>,
    pub contact_filter: Option<ContactFilter>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("begin_contact", &self.begin_contact.is_some())
            .field("end_contact", &self.end_contact.is_some())
            .field("pre_solve", &self.pre_solve.is_some())
            .field("post_solve", &self.post_solve.is_some())
            .field("joint_broken", &self.joint_broken.is_some())
            .field("body_broken", &self.body_broken.is_some())
            .field("contact_filter", &self.contact_filter.is_some())
            .finish()
    }
}

/// Routes contact manager events to the user callbacks and the breakable
/// body tracker.
pub(crate) struct EventSink<'a> {
    pub callbacks: &'a mut Callbacks,
    pub commands: &'a mut DeferredCommands,
    pub breakable: &'a mut BreakableBodies,
}

impl ContactListener for EventSink<'_> {
    fn should_collide(
        &mut self,
        _fixture_a: FixtureHandle,
        a: &Fixture,
        _fixture_b: FixtureHandle,
        b: &Fixture,
    ) -> bool {
        self.callbacks
            .contact_filter
            .as_ref()
            .map_or(true, |filter| filter(a, b))
    }

    fn begin_contact(&mut self, contact: &mut ContactView<'_>) -> bool {
        if let Some(callback) = self.callbacks.begin_contact.as_mut() {
            callback(contact, &mut *self.commands);
            if !contact.is_enabled() {
                debug!("begin contact vetoed for {:?}", contact.handle());
                return false;
            }
        }
        true
    }

    fn end_contact(&mut self, contact: &mut ContactView<'_>) {
        if let Some(callback) = self.callbacks.end_contact.as_mut() {
            callback(contact, &mut *self.commands);
        }
    }

    fn pre_solve(&mut self, contact: &mut ContactView<'_>, old_manifold: &Manifold) {
        if let Some(callback) = self.callbacks.pre_solve.as_mut() {
            callback(contact, old_manifold, &mut *self.commands);
        }
    }

    fn post_solve(&mut self, contact: &mut ContactView<'_>, impulse: &ContactImpulse) {
        self.breakable
            .record_impulse(contact.body_a(), contact.body_b(), impulse);
        if let Some(callback) = self.callbacks.post_solve.as_mut() {
            callback(contact, impulse, &mut *self.commands);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_keep_their_order() {
        let mut commands = DeferredCommands::default();
        let body = BodyHandle::new(2, 0);
        commands.set_awake(body, false);
        commands.destroy_body(body);
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands.iter().copied().collect::<Vec<_>>(),
            vec![Command::SetAwake(body, false), Command::DestroyBody(body)]
        );
        let drained = commands.take();
        assert_eq!(drained.len(), 2);
        assert!(commands.is_empty());
    }

    #[test]
    fn missing_filter_accepts_every_pair() {
        let mut callbacks = Callbacks::default();
        let mut commands = DeferredCommands::default();
        let mut breakable = BreakableBodies::default();
        let fixture = Fixture::new(
            BodyHandle::new(0, 0),
            crate::core::fixture::FixtureDef::new(
                crate::core::shape::Shape::circle(Vec2::ZERO, 1.0, 1.0).unwrap(),
            ),
        );
        let handle = FixtureHandle::new(0, 0);
        {
            let mut sink = EventSink {
                callbacks: &mut callbacks,
                commands: &mut commands,
                breakable: &mut breakable,
            };
            assert!(sink.should_collide(handle, &fixture, handle, &fixture));
        }

        callbacks.contact_filter = Some(Box::new(|a, b| a.user_data != b.user_data));
        let mut sink = EventSink {
            callbacks: &mut callbacks,
            commands: &mut commands,
            breakable: &mut breakable,
        };
        assert!(!sink.should_collide(handle, &fixture, handle, &fixture));
    }
}
