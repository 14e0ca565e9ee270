use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::{
    shape::Shape,
    types::{MassData, Material, Transform},
};
use crate::{
    collision::{
        aabb::{Aabb, RayCastInput, RayCastOutput},
        broadphase::BroadPhase,
    },
    utils::allocator::{BodyHandle, FixtureHandle},
};

/// Category/mask/group collision filtering.
///
/// Fixtures sharing a non-zero group always collide (positive) or never
/// collide (negative); otherwise the category and mask bits must match both
/// ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub category_bits: u16,
    pub mask_bits: u16,
    pub group_index: i16,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            category_bits: 0x0001,
            mask_bits: 0xFFFF,
            group_index: 0,
        }
    }
}

impl Filter {
    pub fn should_collide(&self, other: &Filter) -> bool {
        if self.group_index == other.group_index && self.group_index != 0 {
            return self.group_index > 0;
        }
        (self.mask_bits & other.category_bits) != 0 && (self.category_bits & other.mask_bits) != 0
    }
}

/// Broad-phase payload: which fixture child a proxy belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyRef {
    pub fixture: FixtureHandle,
    pub child_index: usize,
}

/// One broad-phase proxy per shape child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixtureProxy {
    /// Tight AABB at the end of the last synchronization.
    pub aabb: Aabb,
    pub child_index: usize,
    pub proxy_id: usize,
}

/// Construction parameters for a fixture.
#[derive(Debug, Clone)]
pub struct FixtureDef {
    pub shape: Shape,
    pub material: Material,
    pub is_sensor: bool,
    pub filter: Filter,
    pub user_data: u64,
}

impl FixtureDef {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            material: Material::default(),
            is_sensor: false,
            filter: Filter::default(),
            user_data: 0,
        }
    }

    pub fn friction(mut self, friction: f32) -> Self {
        self.material.friction = friction;
        self
    }

    pub fn restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

impl From<Shape> for FixtureDef {
    fn from(shape: Shape) -> Self {
        FixtureDef::new(shape)
    }
}

/// Shape attached to a body, with surface properties and filtering.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyHandle, def: FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape,
            friction: def.material.friction,
            restitution: def.material.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
            user_data: def.user_data,
        }
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn density(&self) -> f32 {
        self.shape.density()
    }

    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Existing contacts keep their mixed value until they are recreated.
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass()
    }

    pub fn proxies(&self) -> &[FixtureProxy] {
        &self.proxies
    }

    /// Swept tight AABB of a child from the last synchronization.
    pub fn aabb(&self, child_index: usize) -> Option<Aabb> {
        self.proxies.get(child_index).map(|p| p.aabb)
    }

    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        self.shape.test_point(xf, point)
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        self.shape.ray_cast(input, xf, child_index)
    }

    pub(crate) fn create_proxies(
        &mut self,
        broad_phase: &mut BroadPhase<ProxyRef>,
        xf: &Transform,
        handle: FixtureHandle,
    ) {
        debug_assert!(self.proxies.is_empty());
        for child_index in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child_index);
            let proxy_id = broad_phase.create_proxy(
                &aabb,
                ProxyRef {
                    fixture: handle,
                    child_index,
                },
            );
            self.proxies.push(FixtureProxy {
                aabb,
                child_index,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, broad_phase: &mut BroadPhase<ProxyRef>) {
        for proxy in self.proxies.drain(..) {
            broad_phase.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Moves the proxies to cover the motion from `xf1` to `xf2`.
    pub(crate) fn synchronize(
        &mut self,
        broad_phase: &mut BroadPhase<ProxyRef>,
        xf1: &Transform,
        xf2: &Transform,
    ) {
        for proxy in &mut self.proxies {
            let aabb1 = self.shape.compute_aabb(xf1, proxy.child_index);
            let aabb2 = self.shape.compute_aabb(xf2, proxy.child_index);
            proxy.aabb = aabb1.union(&aabb2);
            let displacement = aabb2.center() - aabb1.center();
            broad_phase.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }

    pub(crate) fn touch_proxies(&self, broad_phase: &mut BroadPhase<ProxyRef>) {
        for proxy in &self.proxies {
            broad_phase.touch_proxy(proxy.proxy_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_index_overrides_bits() {
        let a = Filter {
            group_index: -1,
            ..Filter::default()
        };
        assert!(!a.should_collide(&a));
        let b = Filter {
            group_index: 2,
            mask_bits: 0,
            ..Filter::default()
        };
        assert!(b.should_collide(&b));
    }

    #[test]
    fn category_and_mask_must_match_both_ways() {
        let player = Filter {
            category_bits: 0x0002,
            mask_bits: 0x0001,
            group_index: 0,
        };
        let wall = Filter::default();
        let other_player = player;
        assert!(player.should_collide(&wall));
        assert!(!player.should_collide(&other_player));
    }

    #[test]
    fn proxies_follow_the_shape_children() {
        let mut broad_phase = BroadPhase::new();
        let shape = Shape::chain(&[Vec2::ZERO, Vec2::X, Vec2::new(2.0, 1.0)]).unwrap();
        let body = BodyHandle::new(0, 0);
        let handle = FixtureHandle::new(0, 0);
        let mut fixture = Fixture::new(body, FixtureDef::new(shape));
        fixture.create_proxies(&mut broad_phase, &Transform::IDENTITY, handle);
        assert_eq!(fixture.proxies().len(), 2);
        assert_eq!(broad_phase.proxy_count(), 2);

        let moved = Transform::from_position(Vec2::new(10.0, 0.0));
        fixture.synchronize(&mut broad_phase, &Transform::IDENTITY, &moved);
        assert!(fixture.aabb(0).unwrap().upper.x >= 11.0);

        fixture.destroy_proxies(&mut broad_phase);
        assert_eq!(broad_phase.proxy_count(), 0);
    }
}
