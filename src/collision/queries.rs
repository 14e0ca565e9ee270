use glam::Vec2;

use crate::{
    collision::{
        aabb::{Aabb, RayCastInput},
        broadphase::BroadPhase,
    },
    core::{
        body::Body,
        fixture::{Fixture, ProxyRef},
    },
    utils::allocator::{Arena, BodyHandle, FixtureHandle},
};

/// Fixture hit by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub body: BodyHandle,
    pub fixture: FixtureHandle,
    pub child_index: usize,
    pub point: Vec2,
    pub normal: Vec2,
    /// Position along the ray, `0` at the start and `1` at the end point.
    pub fraction: f32,
}

/// What a ray-cast callback wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RaycastControl {
    /// Ignore this hit and keep the current ray length.
    Ignore,
    /// Stop the query.
    Terminate,
    /// Clip the ray to this fraction (usually the hit's own).
    Clip(f32),
    /// Keep the full ray; used to collect every hit.
    Continue,
}

/// Read-only spatial queries over a world's broad-phase.
pub struct WorldQuery<'a> {
    pub(crate) broad_phase: &'a BroadPhase<ProxyRef>,
    pub(crate) fixtures: &'a Arena<FixtureHandle, Fixture>,
    pub(crate) bodies: &'a Arena<BodyHandle, Body>,
}

impl<'a> WorldQuery<'a> {
    /// Calls `callback` for every fixture whose fat AABB overlaps `aabb`.
    /// Returning `false` stops the query.
    pub fn query_aabb<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(FixtureHandle) -> bool,
    {
        self.broad_phase.query(aabb, |proxy_id| {
            match self.broad_phase.user_data(proxy_id) {
                Some(proxy) => callback(proxy.fixture),
                None => true,
            }
        });
    }

    /// Fixtures containing `point`.
    pub fn test_point(&self, point: Vec2) -> Vec<FixtureHandle> {
        let probe = Aabb::from_center(point, Vec2::splat(f32::EPSILON));
        let mut found = Vec::new();
        self.query_aabb(&probe, |handle| {
            let hit = self.fixtures.get(handle).and_then(|fixture| {
                let body = self.bodies.get(fixture.body)?;
                Some(fixture.test_point(&body.transform(), point))
            });
            if hit == Some(true) && !found.contains(&handle) {
                found.push(handle);
            }
            true
        });
        found
    }

    /// Casts a ray from `p1` to `p2`, reporting hits in no particular order.
    pub fn ray_cast<F>(&self, p1: Vec2, p2: Vec2, mut callback: F)
    where
        F: FnMut(&RaycastHit) -> RaycastControl,
    {
        let input = RayCastInput::new(p1, p2);
        self.broad_phase.ray_cast(&input, |sub_input, proxy_id| {
            let Some(proxy) = self.broad_phase.user_data(proxy_id) else {
                return sub_input.max_fraction;
            };
            let Some(fixture) = self.fixtures.get(proxy.fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };
            let Some(output) = fixture.ray_cast(sub_input, &body.transform(), proxy.child_index)
            else {
                return sub_input.max_fraction;
            };

            let hit = RaycastHit {
                body: fixture.body,
                fixture: proxy.fixture,
                child_index: proxy.child_index,
                point: sub_input.point_at(output.fraction),
                normal: output.normal,
                fraction: output.fraction,
            };
            match callback(&hit) {
                RaycastControl::Ignore => -1.0,
                RaycastControl::Terminate => 0.0,
                RaycastControl::Clip(fraction) => fraction,
                RaycastControl::Continue => sub_input.max_fraction,
            }
        });
    }

    /// Closest hit along the ray, if any.
    pub fn ray_cast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RaycastHit> {
        let mut closest: Option<RaycastHit> = None;
        self.ray_cast(p1, p2, |hit| {
            if closest.map_or(true, |c| hit.fraction < c.fraction) {
                closest = Some(*hit);
            }
            RaycastControl::Clip(hit.fraction)
        });
        closest
    }

    /// Every hit along the ray, sorted by distance from `p1`.
    pub fn ray_cast_all(&self, p1: Vec2, p2: Vec2) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        self.ray_cast(p1, p2, |hit| {
            hits.push(*hit);
            RaycastControl::Continue
        });
        hits.sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
        hits
    }
}
