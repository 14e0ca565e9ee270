use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{config::MAX_MANIFOLD_POINTS, core::types::Transform};

/// Whether a contact feature is a vertex or a face of its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Features of both shapes that produced a contact point.
///
/// Two manifold points with equal ids describe the same physical contact
/// across frames, which is what lets impulses be carried forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContactId {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactId {
    pub const ZERO: ContactId = ContactId {
        index_a: 0,
        index_b: 0,
        type_a: FeatureType::Vertex,
        type_b: FeatureType::Vertex,
    };

    pub fn new(index_a: u8, type_a: FeatureType, index_b: u8, type_b: FeatureType) -> Self {
        Self {
            index_a,
            index_b,
            type_a,
            type_b,
        }
    }

    /// Same feature seen from the other shape.
    pub fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// How the manifold's local point and normal should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ManifoldType {
    /// `local_point` is the center of circle A, points hold circle B's center.
    #[default]
    Circles,
    /// Normal and `local_point` belong to a face of shape A.
    FaceA,
    /// Normal and `local_point` belong to a face of shape B.
    FaceB,
}

/// Contact point with accumulated impulses used for warm starting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ManifoldPoint {
    /// Meaning depends on the manifold type.
    pub local_point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub id: ContactId,
}

/// Up to two contact points between two convex shapes, stored in local space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub manifold_type: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    pub fn clear(&mut self) {
        self.point_count = 0;
    }

    /// Copies accumulated impulses from `old` into points with matching ids.
    pub fn carry_impulses_from(&mut self, old: &Manifold) {
        for point in self.points_mut() {
            point.normal_impulse = 0.0;
            point.tangent_impulse = 0.0;
            if let Some(previous) = old.points().iter().find(|p| p.id == point.id) {
                point.normal_impulse = previous.normal_impulse;
                point.tangent_impulse = previous.tangent_impulse;
            }
        }
    }
}

/// Manifold expressed in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// Points from shape A to shape B.
    pub normal: Vec2,
    /// Midpoints between the two surfaces.
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative values indicate overlap.
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut out = WorldManifold::default();
        if manifold.point_count == 0 {
            return out;
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                out.normal = Vec2::X;
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    out.normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + radius_a * out.normal;
                let c_b = point_b - radius_b * out.normal;
                out.points[0] = 0.5 * (c_a + c_b);
                out.separations[0] = (c_b - c_a).dot(out.normal);
            }
            ManifoldType::FaceA => {
                out.normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_b.apply(manifold.points[i].local_point);
                    let c_a = clip_point
                        + (radius_a - (clip_point - plane_point).dot(out.normal)) * out.normal;
                    let c_b = clip_point - radius_b * out.normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_b - c_a).dot(out.normal);
                }
            }
            ManifoldType::FaceB => {
                out.normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_a.apply(manifold.points[i].local_point);
                    let c_b = clip_point
                        + (radius_b - (clip_point - plane_point).dot(out.normal)) * out.normal;
                    let c_a = clip_point - radius_a * out.normal;
                    out.points[i] = 0.5 * (c_a + c_b);
                    out.separations[i] = (c_a - c_b).dot(out.normal);
                }
                // Keep the A -> B convention.
                out.normal = -out.normal;
            }
        }
        out
    }
}

/// State of a manifold point between two consecutive updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointState {
    #[default]
    Null,
    Add,
    Persist,
    Remove,
}

/// Classifies points of `manifold1` (old) and `manifold2` (new) by id.
pub fn point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> ([PointState; MAX_MANIFOLD_POINTS], [PointState; MAX_MANIFOLD_POINTS]) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, point) in manifold1.points().iter().enumerate() {
        state1[i] = if manifold2.points().iter().any(|p| p.id == point.id) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }
    for (i, point) in manifold2.points().iter().enumerate() {
        state2[i] = if manifold1.points().iter().any(|p| p.id == point.id) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }
    (state1, state2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: u8, normal_impulse: f32) -> ManifoldPoint {
        ManifoldPoint {
            local_point: Vec2::ZERO,
            normal_impulse,
            tangent_impulse: normal_impulse * 0.5,
            id: ContactId::new(id, FeatureType::Vertex, 0, FeatureType::Face),
        }
    }

    #[test]
    fn impulses_follow_matching_ids() {
        let mut old = Manifold::default();
        old.points[0] = point(1, 4.0);
        old.points[1] = point(2, 6.0);
        old.point_count = 2;

        let mut new = Manifold::default();
        new.points[0] = point(2, 0.0);
        new.points[1] = point(3, 9.0);
        new.point_count = 2;

        new.carry_impulses_from(&old);
        assert_eq!(new.points[0].normal_impulse, 6.0);
        assert_eq!(new.points[0].tangent_impulse, 3.0);
        assert_eq!(new.points[1].normal_impulse, 0.0);

        let (s1, s2) = point_states(&old, &new);
        assert_eq!(s1, [PointState::Remove, PointState::Persist]);
        assert_eq!(s2, [PointState::Persist, PointState::Add]);
    }

    #[test]
    fn circles_world_manifold_points_between_surfaces() {
        let mut manifold = Manifold::default();
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_point = Vec2::ZERO;
        manifold.points[0].local_point = Vec2::ZERO;
        manifold.point_count = 1;

        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::from_position(Vec2::new(1.5, 0.0));
        let wm = WorldManifold::new(&manifold, &xf_a, 1.0, &xf_b, 1.0);
        assert!((wm.normal - Vec2::X).length() < 1e-6);
        assert!((wm.separations[0] + 0.5).abs() < 1e-6);
        assert!((wm.points[0].x - 0.75).abs() < 1e-6);
    }
}
