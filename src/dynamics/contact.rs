use glam::Vec2;

use crate::{
    collision::{
        distance::test_overlap,
        manifold::{Manifold, WorldManifold},
        narrowphase::{collide, ContactKind},
    },
    config::MAX_MANIFOLD_POINTS,
    core::{
        shape::Shape,
        types::{Material, Transform},
    },
    utils::allocator::{BodyHandle, ContactHandle, FixtureHandle},
};

/// Touching state before and after a [`Contact::evaluate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TouchChange {
    pub was_touching: bool,
    pub touching: bool,
}

impl TouchChange {
    pub fn began(&self) -> bool {
        !self.was_touching && self.touching
    }

    pub fn ended(&self) -> bool {
        self.was_touching && !self.touching
    }
}

/// Potential contact between one child of each of two fixtures.
///
/// Exists while the fat AABBs overlap; `is_touching` reports whether the
/// shapes themselves are in contact.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) child_a: usize,
    pub(crate) child_b: usize,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    /// Ordered broad-phase proxy ids keying the pair map.
    pub(crate) proxy_key: (usize, usize),
    pub(crate) kind: ContactKind,
    pub(crate) manifold: Manifold,

    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,

    pub(crate) touching: bool,
    pub(crate) enabled: bool,
    pub(crate) filter_flag: bool,
    pub(crate) island_flag: bool,
    pub(crate) toi_flag: bool,
    pub(crate) toi_count: u32,
    pub(crate) toi: f32,
}

impl Contact {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kind: ContactKind,
        fixture_a: FixtureHandle,
        child_a: usize,
        body_a: BodyHandle,
        fixture_b: FixtureHandle,
        child_b: usize,
        body_b: BodyHandle,
        proxy_key: (usize, usize),
        friction: f32,
        restitution: f32,
    ) -> Self {
        Self {
            fixture_a,
            fixture_b,
            child_a,
            child_b,
            body_a,
            body_b,
            proxy_key,
            kind,
            manifold: Manifold::default(),
            friction,
            restitution,
            tangent_speed: 0.0,
            touching: false,
            enabled: true,
            filter_flag: false,
            island_flag: false,
            toi_flag: false,
            toi_count: 0,
            toi: 1.0,
        }
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    pub fn child_index_a(&self) -> usize {
        self.child_a
    }

    pub fn child_index_b(&self) -> usize {
        self.child_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn kind(&self) -> ContactKind {
        self.kind
    }

    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    pub fn is_touching(&self) -> bool {
        self.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    /// Re-mixes friction from the fixtures' current values.
    pub(crate) fn reset_friction(&mut self, friction_a: f32, friction_b: f32) {
        self.friction = Material::mix_friction(friction_a, friction_b);
    }

    pub(crate) fn reset_restitution(&mut self, restitution_a: f32, restitution_b: f32) {
        self.restitution = Material::mix_restitution(restitution_a, restitution_b);
    }

    /// Recomputes the manifold for the current transforms.
    ///
    /// Sensors only test for overlap and keep an empty manifold. Solid
    /// contacts carry accumulated impulses over from matching points.
    pub(crate) fn evaluate(
        &mut self,
        shape_a: &Shape,
        xf_a: &Transform,
        shape_b: &Shape,
        xf_b: &Transform,
        sensor: bool,
    ) -> TouchChange {
        // Re-enable each step; pre-solve may disable again.
        self.enabled = true;
        let was_touching = self.touching;

        let touching = if sensor {
            self.manifold.clear();
            test_overlap(shape_a, self.child_a, shape_b, self.child_b, xf_a, xf_b)
        } else {
            let old = self.manifold;
            self.manifold = collide(shape_a, self.child_a, xf_a, shape_b, self.child_b, xf_b);
            self.manifold.carry_impulses_from(&old);
            !self.manifold.is_empty()
        };

        self.touching = touching;
        TouchChange {
            was_touching,
            touching,
        }
    }

    pub(crate) fn flag_for_filtering(&mut self) {
        self.filter_flag = true;
    }
}

/// Impulses applied by the solver to one contact during a step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContactImpulse {
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    pub count: usize,
}

impl ContactImpulse {
    pub fn from_manifold(manifold: &Manifold) -> Self {
        let mut impulse = ContactImpulse {
            count: manifold.point_count,
            ..Default::default()
        };
        for (i, point) in manifold.points().iter().enumerate() {
            impulse.normal_impulses[i] = point.normal_impulse;
            impulse.tangent_impulses[i] = point.tangent_impulse;
        }
        impulse
    }

    /// Largest normal impulse over the active points.
    pub fn max_normal_impulse(&self) -> f32 {
        self.normal_impulses[..self.count]
            .iter()
            .fold(0.0_f32, |acc, &value| acc.max(value))
    }
}

/// Callback-facing handle to a contact during collision or solving.
///
/// Carries the body transforms and shape radii needed to build a
/// [`WorldManifold`] without borrowing the world.
pub struct ContactView<'a> {
    pub(crate) handle: ContactHandle,
    pub(crate) contact: &'a mut Contact,
    pub(crate) xf_a: Transform,
    pub(crate) xf_b: Transform,
    pub(crate) radius_a: f32,
    pub(crate) radius_b: f32,
}

impl<'a> ContactView<'a> {
    pub fn handle(&self) -> ContactHandle {
        self.handle
    }

    pub fn contact(&self) -> &Contact {
        self.contact
    }

    pub fn fixture_a(&self) -> FixtureHandle {
        self.contact.fixture_a
    }

    pub fn fixture_b(&self) -> FixtureHandle {
        self.contact.fixture_b
    }

    pub fn body_a(&self) -> BodyHandle {
        self.contact.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.contact.body_b
    }

    pub fn manifold(&self) -> &Manifold {
        &self.contact.manifold
    }

    pub fn world_manifold(&self) -> WorldManifold {
        WorldManifold::new(
            &self.contact.manifold,
            &self.xf_a,
            self.radius_a,
            &self.xf_b,
            self.radius_b,
        )
    }

    /// World normal pointing from A to B; zero when the contact has no points.
    pub fn normal(&self) -> Vec2 {
        if self.contact.manifold.is_empty() {
            Vec2::ZERO
        } else {
            self.world_manifold().normal
        }
    }

    pub fn is_touching(&self) -> bool {
        self.contact.touching
    }

    pub fn is_enabled(&self) -> bool {
        self.contact.enabled
    }

    /// Disables the contact for the current step only.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.contact.enabled = enabled;
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.contact.friction = friction;
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.contact.restitution = restitution;
    }

    /// Surface speed along the tangent, for conveyor belts.
    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.contact.tangent_speed = speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::manifold::{ContactId, ManifoldPoint};

    fn contact(kind: ContactKind) -> Contact {
        Contact::new(
            kind,
            FixtureHandle::new(0, 0),
            0,
            BodyHandle::new(0, 0),
            FixtureHandle::new(1, 0),
            0,
            BodyHandle::new(1, 0),
            (0, 1),
            0.5,
            0.0,
        )
    }

    #[test]
    fn touching_circles_begin_then_end() {
        let shape = Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap();
        let mut c = contact(ContactKind::CircleCircle);

        let xf_b = Transform::from_position(Vec2::new(0.9, 0.0));
        let change = c.evaluate(&shape, &Transform::IDENTITY, &shape, &xf_b, false);
        assert!(change.began());
        assert_eq!(c.manifold().point_count, 1);

        let far = Transform::from_position(Vec2::new(3.0, 0.0));
        let change = c.evaluate(&shape, &Transform::IDENTITY, &shape, &far, false);
        assert!(change.ended());
        assert!(c.manifold().is_empty());
    }

    #[test]
    fn sensors_keep_an_empty_manifold() {
        let shape = Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap();
        let mut c = contact(ContactKind::CircleCircle);
        let xf_b = Transform::from_position(Vec2::new(0.5, 0.0));
        let change = c.evaluate(&shape, &Transform::IDENTITY, &shape, &xf_b, true);
        assert!(change.touching);
        assert!(c.manifold().is_empty());
    }

    #[test]
    fn impulse_report_uses_active_points() {
        let mut manifold = Manifold::default();
        manifold.points[0] = ManifoldPoint {
            local_point: Vec2::ZERO,
            normal_impulse: 2.0,
            tangent_impulse: 0.5,
            id: ContactId::ZERO,
        };
        manifold.points[1].normal_impulse = 9.0;
        manifold.point_count = 1;
        let impulse = ContactImpulse::from_manifold(&manifold);
        assert_eq!(impulse.count, 1);
        assert_eq!(impulse.max_normal_impulse(), 2.0);
    }
}
