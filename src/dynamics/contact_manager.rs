use std::collections::HashMap;

use glam::Vec2;

use crate::{
    collision::{
        broadphase::{BroadPhase, ProxyPair},
        manifold::Manifold,
        narrowphase::ContactKind,
    },
    core::{
        body::{Body, BodyType},
        fixture::{Fixture, ProxyRef},
        types::Material,
    },
    dynamics::{
        contact::{Contact, ContactImpulse, ContactView},
        joints::Joint,
    },
    utils::allocator::{Arena, BodyHandle, ContactHandle, FixtureHandle, JointHandle},
};

/// Receives contact events while the manager updates contacts.
///
/// Every method has a no-op default so listeners only implement what they need.
pub(crate) trait ContactListener {
    /// Extra pair filter applied after the fixture filters pass.
    fn should_collide(
        &mut self,
        _fixture_a: FixtureHandle,
        _a: &Fixture,
        _fixture_b: FixtureHandle,
        _b: &Fixture,
    ) -> bool {
        true
    }

    /// Called when two fixtures start touching. Returning `false` vetoes the
    /// contact: it is disabled and reported as not touching.
    fn begin_contact(&mut self, _contact: &mut ContactView<'_>) -> bool {
        true
    }

    fn end_contact(&mut self, _contact: &mut ContactView<'_>) {}

    /// Called for touching, non-sensor contacts before they are solved.
    fn pre_solve(&mut self, _contact: &mut ContactView<'_>, _old_manifold: &Manifold) {}

    fn post_solve(&mut self, _contact: &mut ContactView<'_>, _impulse: &ContactImpulse) {}
}

impl ContactListener for () {}

/// Owns the broad-phase and every contact; creates contacts for new proxy
/// pairs and destroys them once their fat AABBs separate.
#[derive(Default)]
pub(crate) struct ContactManager {
    pub broad_phase: BroadPhase<ProxyRef>,
    pub contacts: Arena<ContactHandle, Contact>,
    pair_map: HashMap<(usize, usize), ContactHandle>,
}

/// Body-level filter: at least one body must be dynamic and no joint between
/// them may forbid collision.
pub(crate) fn bodies_should_collide(
    handle_a: BodyHandle,
    body_a: &Body,
    handle_b: BodyHandle,
    body_b: &Body,
    joints: &Arena<JointHandle, Joint>,
) -> bool {
    if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
        return false;
    }
    let edges = if body_a.joint_edges.len() <= body_b.joint_edges.len() {
        &body_a.joint_edges
    } else {
        &body_b.joint_edges
    };
    !edges.iter().filter_map(|&j| joints.get(j)).any(|joint| {
        joint.connects(handle_a, handle_b) && !joint.collide_connected
    })
}

/// Builds the callback view of a contact from the current body transforms.
pub(crate) fn contact_view<'c>(
    handle: ContactHandle,
    contact: &'c mut Contact,
    bodies: &Arena<BodyHandle, Body>,
    fixtures: &Arena<FixtureHandle, Fixture>,
) -> ContactView<'c> {
    let xf = |body| bodies.get(body).map(|b| b.xf).unwrap_or_default();
    let radius = |fixture| fixtures.get(fixture).map_or(0.0, |f| f.shape.radius());
    ContactView {
        handle,
        xf_a: xf(contact.body_a),
        xf_b: xf(contact.body_b),
        radius_a: radius(contact.fixture_a),
        radius_b: radius(contact.fixture_b),
        contact,
    }
}

impl ContactManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Turns buffered broad-phase pairs into new contacts.
    pub fn find_new_contacts(
        &mut self,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        joints: &Arena<JointHandle, Joint>,
        listener: &mut dyn ContactListener,
    ) {
        let mut pairs = Vec::new();
        self.broad_phase.update_pairs(|pair| pairs.push(pair));
        for pair in pairs {
            self.add_pair(pair, bodies, fixtures, joints, listener);
        }
    }

    fn add_pair(
        &mut self,
        pair: ProxyPair<ProxyRef>,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        joints: &Arena<JointHandle, Joint>,
        listener: &mut dyn ContactListener,
    ) {
        let key = (pair.proxy_a.min(pair.proxy_b), pair.proxy_a.max(pair.proxy_b));
        if self.pair_map.contains_key(&key) {
            return;
        }

        let (mut ref_a, mut ref_b) = (pair.data_a, pair.data_b);
        let (Some(mut fixture_a), Some(mut fixture_b)) =
            (fixtures.get(ref_a.fixture), fixtures.get(ref_b.fixture))
        else {
            return;
        };
        if fixture_a.body == fixture_b.body {
            return;
        }
        let (Some(body_a), Some(body_b)) = (bodies.get(fixture_a.body), bodies.get(fixture_b.body))
        else {
            return;
        };
        if !bodies_should_collide(fixture_a.body, body_a, fixture_b.body, body_b, joints) {
            return;
        }
        if !fixture_a.filter.should_collide(&fixture_b.filter) {
            return;
        }
        if !listener.should_collide(ref_a.fixture, fixture_a, ref_b.fixture, fixture_b) {
            return;
        }

        let Some((kind, swap)) =
            ContactKind::for_pair(fixture_a.shape.shape_type(), fixture_b.shape.shape_type())
        else {
            return;
        };
        if swap {
            std::mem::swap(&mut ref_a, &mut ref_b);
            std::mem::swap(&mut fixture_a, &mut fixture_b);
        }

        let contact = Contact::new(
            kind,
            ref_a.fixture,
            ref_a.child_index,
            fixture_a.body,
            ref_b.fixture,
            ref_b.child_index,
            fixture_b.body,
            key,
            Material::mix_friction(fixture_a.friction, fixture_b.friction),
            Material::mix_restitution(fixture_a.restitution, fixture_b.restitution),
        );
        let (body_a, body_b) = (fixture_a.body, fixture_b.body);
        let handle = self.contacts.insert(contact);
        self.pair_map.insert(key, handle);

        for body in [body_a, body_b] {
            if let Some(body) = bodies.get_mut(body) {
                body.contact_edges.push(handle);
            }
        }
    }

    /// Removes a contact, reporting `end_contact` if it was touching.
    pub fn destroy(
        &mut self,
        handle: ContactHandle,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        listener: &mut dyn ContactListener,
    ) {
        let Some(mut contact) = self.contacts.remove(handle) else {
            return;
        };
        self.pair_map.remove(&contact.proxy_key);

        if contact.touching {
            let mut view = contact_view(handle, &mut contact, bodies, fixtures);
            listener.end_contact(&mut view);
        }

        for body in [contact.body_a, contact.body_b] {
            if let Some(body) = bodies.get_mut(body) {
                body.contact_edges.retain(|&edge| edge != handle);
            }
        }
    }

    /// Narrow-phase pass over every contact.
    ///
    /// Re-filters flagged contacts, skips pairs where neither body is awake,
    /// destroys contacts whose fat AABBs no longer overlap and updates the rest.
    pub fn collide(
        &mut self,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        joints: &Arena<JointHandle, Joint>,
        listener: &mut dyn ContactListener,
    ) {
        let handles: Vec<ContactHandle> = self.contacts.handles().collect();
        for handle in handles {
            let Some(contact) = self.contacts.get_mut(handle) else {
                continue;
            };
            let (Some(fixture_a), Some(fixture_b)) =
                (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
            else {
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(contact.body_a), bodies.get(contact.body_b))
            else {
                continue;
            };

            if contact.filter_flag {
                let keep = bodies_should_collide(contact.body_a, body_a, contact.body_b, body_b, joints)
                    && fixture_a.filter.should_collide(&fixture_b.filter)
                    && listener.should_collide(contact.fixture_a, fixture_a, contact.fixture_b, fixture_b);
                if !keep {
                    self.destroy(handle, bodies, fixtures, listener);
                    continue;
                }
                contact.filter_flag = false;
            }

            let active_a = body_a.awake && body_a.body_type != BodyType::Static;
            let active_b = body_b.awake && body_b.body_type != BodyType::Static;
            if !active_a && !active_b {
                continue;
            }

            let (proxy_a, proxy_b) = contact.proxy_key;
            if !self.broad_phase.test_overlap(proxy_a, proxy_b) {
                self.destroy(handle, bodies, fixtures, listener);
                continue;
            }

            self.update_contact(handle, bodies, fixtures, listener);
        }
    }

    /// Re-evaluates one contact and fires begin, end and pre-solve events.
    pub fn update_contact(
        &mut self,
        handle: ContactHandle,
        bodies: &mut Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        listener: &mut dyn ContactListener,
    ) {
        let Some(contact) = self.contacts.get_mut(handle) else {
            return;
        };
        let (Some(fixture_a), Some(fixture_b)) =
            (fixtures.get(contact.fixture_a), fixtures.get(contact.fixture_b))
        else {
            return;
        };
        let (Some(xf_a), Some(xf_b)) = (
            bodies.get(contact.body_a).map(|b| b.xf),
            bodies.get(contact.body_b).map(|b| b.xf),
        ) else {
            return;
        };

        let sensor = fixture_a.is_sensor || fixture_b.is_sensor;
        let old_manifold = contact.manifold;
        let change = contact.evaluate(&fixture_a.shape, &xf_a, &fixture_b.shape, &xf_b, sensor);

        if !sensor && change.touching != change.was_touching {
            for body in [contact.body_a, contact.body_b] {
                if let Some(body) = bodies.get_mut(body) {
                    body.set_awake(true);
                }
            }
        }

        let mut view = contact_view(handle, contact, bodies, fixtures);
        if change.began() && !listener.begin_contact(&mut view) {
            view.contact.enabled = false;
            view.contact.touching = false;
        }
        if change.ended() {
            listener.end_contact(&mut view);
        }
        if !sensor && view.contact.touching {
            listener.pre_solve(&mut view, &old_manifold);
        }
    }

    /// Reports the impulses the solver applied to a contact.
    pub fn post_solve(
        &mut self,
        handle: ContactHandle,
        impulse: &ContactImpulse,
        bodies: &Arena<BodyHandle, Body>,
        fixtures: &Arena<FixtureHandle, Fixture>,
        listener: &mut dyn ContactListener,
    ) {
        if let Some(contact) = self.contacts.get_mut(handle) {
            let mut view = contact_view(handle, contact, bodies, fixtures);
            listener.post_solve(&mut view, impulse);
        }
    }

    /// Marks every contact of `fixture` for re-filtering on the next collide pass.
    pub fn flag_fixture(&mut self, fixture: FixtureHandle, body: &Body) {
        for &edge in &body.contact_edges {
            if let Some(contact) = self.contacts.get_mut(edge) {
                if contact.fixture_a == fixture || contact.fixture_b == fixture {
                    contact.flag_for_filtering();
                }
            }
        }
    }

    /// Moves the broad-phase origin to `new_origin`.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.broad_phase.shift_origin(new_origin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        body::BodyDef,
        fixture::{Filter, FixtureDef},
        shape::Shape,
    };

    struct Scene {
        manager: ContactManager,
        bodies: Arena<BodyHandle, Body>,
        fixtures: Arena<FixtureHandle, Fixture>,
        joints: Arena<JointHandle, Joint>,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                manager: ContactManager::new(),
                bodies: Arena::new(),
                fixtures: Arena::new(),
                joints: Arena::new(),
            }
        }

        fn add(&mut self, def: BodyDef, fixture: FixtureDef) -> (BodyHandle, FixtureHandle) {
            let body = self.bodies.insert(Body::new(&def));
            let xf = self.bodies.get(body).map(|b| b.xf).unwrap_or_default();
            let handle = self.fixtures.insert(Fixture::new(body, fixture));
            if let Some(f) = self.fixtures.get_mut(handle) {
                f.create_proxies(&mut self.manager.broad_phase, &xf, handle);
            }
            if let Some(b) = self.bodies.get_mut(body) {
                b.fixtures.push(handle);
            }
            (body, handle)
        }

        fn step(&mut self, listener: &mut dyn ContactListener) {
            self.manager
                .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints, listener);
            self.manager
                .collide(&mut self.bodies, &self.fixtures, &self.joints, listener);
        }
    }

    #[derive(Default)]
    struct Recorder {
        begins: usize,
        ends: usize,
        veto: bool,
    }

    impl ContactListener for Recorder {
        fn begin_contact(&mut self, _contact: &mut ContactView<'_>) -> bool {
            self.begins += 1;
            !self.veto
        }

        fn end_contact(&mut self, _contact: &mut ContactView<'_>) {
            self.ends += 1;
        }
    }

    fn circle() -> FixtureDef {
        FixtureDef::new(Shape::circle(Vec2::ZERO, 0.5, 1.0).unwrap())
    }

    #[test]
    fn overlapping_fixtures_create_one_touching_contact() {
        let mut scene = Scene::new();
        scene.add(BodyDef::fixed(), circle());
        scene.add(BodyDef::dynamic().position(Vec2::new(0.8, 0.0)), circle());

        let mut recorder = Recorder::default();
        scene.step(&mut recorder);
        scene.step(&mut recorder);

        assert_eq!(scene.manager.contact_count(), 1);
        assert_eq!(recorder.begins, 1);
        let contact = scene.manager.contacts.values().next().unwrap();
        assert!(contact.is_touching());
    }

    #[test]
    fn static_pairs_and_filtered_pairs_are_skipped() {
        let mut scene = Scene::new();
        scene.add(BodyDef::fixed(), circle());
        scene.add(BodyDef::fixed().position(Vec2::new(0.5, 0.0)), circle());
        let lonely = Filter {
            mask_bits: 0,
            ..Filter::default()
        };
        scene.add(BodyDef::dynamic().position(Vec2::new(0.2, 0.0)), circle().filter(lonely));

        scene.step(&mut ());
        assert_eq!(scene.manager.contact_count(), 0);
    }

    #[test]
    fn vetoed_contacts_stay_disabled_and_not_touching() {
        let mut scene = Scene::new();
        scene.add(BodyDef::fixed(), circle());
        scene.add(BodyDef::dynamic().position(Vec2::new(0.8, 0.0)), circle());

        let mut recorder = Recorder {
            veto: true,
            ..Recorder::default()
        };
        scene.step(&mut recorder);
        let contact = scene.manager.contacts.values().next().unwrap();
        assert!(!contact.is_touching());
        assert!(!contact.is_enabled());

        scene.step(&mut recorder);
        assert_eq!(recorder.begins, 2);
        assert_eq!(recorder.ends, 0);
    }

    #[test]
    fn destroying_a_touching_contact_reports_end() {
        let mut scene = Scene::new();
        let (ground, _) = scene.add(BodyDef::fixed(), circle());
        let (ball, _) = scene.add(BodyDef::dynamic().position(Vec2::new(0.8, 0.0)), circle());

        let mut recorder = Recorder::default();
        scene.step(&mut recorder);
        let handle = scene.manager.contacts.handles().next().unwrap();
        scene
            .manager
            .destroy(handle, &mut scene.bodies, &scene.fixtures, &mut recorder);

        assert_eq!(recorder.ends, 1);
        assert_eq!(scene.manager.contact_count(), 0);
        assert!(scene.bodies.get(ground).unwrap().contact_handles().is_empty());
        assert!(scene.bodies.get(ball).unwrap().contact_handles().is_empty());
    }
}
