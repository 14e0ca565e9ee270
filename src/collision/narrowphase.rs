//! Contact manifold generation for each supported shape pair.
//!
//! Every routine works in the local frames of its shapes and fills a
//! [`Manifold`] whose normal points from shape A to shape B. An empty manifold
//! means the shapes are separated by more than their combined skin radius.

use glam::Vec2;

use crate::{
    collision::{
        clipping::{clip_segment_to_line, ClipVertex},
        manifold::{ContactId, FeatureType, Manifold, ManifoldType},
    },
    config::{LINEAR_SLOP, MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES},
    core::{
        shape::{CircleShape, EdgeShape, PolygonShape, Shape, ShapeType},
        types::Transform,
    },
    utils::math::{cross, cross_vs},
};

/// Narrow-phase routine selected for a pair of shape types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContactKind {
    CircleCircle,
    PolygonCircle,
    PolygonPolygon,
    EdgeCircle,
    EdgePolygon,
    ChainCircle,
    ChainPolygon,
}

impl ContactKind {
    /// Looks up the routine for `(a, b)`. The flag is `true` when the fixtures
    /// must be swapped so that A matches the routine's first shape.
    pub fn for_pair(a: ShapeType, b: ShapeType) -> Option<(ContactKind, bool)> {
        use ShapeType::*;
        let kind = |a, b| match (a, b) {
            (Circle, Circle) => Some(ContactKind::CircleCircle),
            (Polygon, Circle) => Some(ContactKind::PolygonCircle),
            (Polygon, Polygon) => Some(ContactKind::PolygonPolygon),
            (Edge, Circle) => Some(ContactKind::EdgeCircle),
            (Edge, Polygon) => Some(ContactKind::EdgePolygon),
            (Chain, Circle) => Some(ContactKind::ChainCircle),
            (Chain, Polygon) => Some(ContactKind::ChainPolygon),
            _ => None,
        };
        kind(a, b)
            .map(|k| (k, false))
            .or_else(|| kind(b, a).map(|k| (k, true)))
    }
}

/// Evaluates the manifold for two shape children given in routine order.
/// Only shape A can be a chain, so B's child index is unused. Unsupported
/// combinations yield an empty manifold.
pub fn collide(
    shape_a: &Shape,
    child_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    _child_b: usize,
    xf_b: &Transform,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
        (Shape::Chain(chain), Shape::Circle(b)) => match chain.child_edge(child_a) {
            Some(edge) => collide_edge_and_circle(&edge, xf_a, b, xf_b),
            None => Manifold::default(),
        },
        (Shape::Chain(chain), Shape::Polygon(b)) => match chain.child_edge(child_a) {
            Some(edge) => collide_edge_and_polygon(&edge, xf_a, b, xf_b),
            None => Manifold::default(),
        },
        _ => Manifold::default(),
    }
}

pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.apply(circle_a.position);
    let p_b = xf_b.apply(circle_b.position);
    let radius = circle_a.radius + circle_b.radius;
    if p_a.distance_squared(p_b) > radius * radius {
        return manifold;
    }

    manifold.manifold_type = ManifoldType::Circles;
    manifold.local_point = circle_a.position;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactId::ZERO;
    manifold
}

pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon frame.
    let c = xf_b.apply(circle_b.position);
    let c_local = xf_a.apply_inv(c);

    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let count = vertices.len();

    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[if normal_index + 1 < count {
        normal_index + 1
    } else {
        0
    }];

    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.points[0].local_point = circle_b.position;
    manifold.points[0].id = ContactId::ZERO;

    // Center inside the polygon.
    if separation < f32::EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        return manifold;
    }

    // Voronoi regions of the closest face.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            manifold.point_count = 0;
            return manifold;
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            manifold.point_count = 0;
            return manifold;
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = 0.5 * (v1 + v2);
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            manifold.point_count = 0;
            return manifold;
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold
}

/// Largest separation of `poly2` from the face normals of `poly1`.
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, f32) {
    let xf = xf2.mul_t(xf1);
    let mut best_index = 0;
    let mut max_separation = f32::MIN;

    for (i, (n1, v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        // Face of poly1 in the frame of poly2.
        let n = xf.q.apply(*n1);
        let v = xf.apply(*v1);
        let si = poly2
            .vertices()
            .iter()
            .map(|v2| n.dot(*v2 - v))
            .fold(f32::MAX, f32::min);
        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in the frame of poly2.
    let normal1 = xf2.q.apply_inv(xf1.q.apply(poly1.normals()[edge1]));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n2) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let count2 = poly2.count();
    let i1 = index;
    let i2 = if i1 + 1 < count2 { i1 + 1 } else { 0 };
    let vertices2 = poly2.vertices();
    [
        ClipVertex {
            v: xf2.apply(vertices2[i1]),
            id: ContactId::new(edge1 as u8, FeatureType::Face, i1 as u8, FeatureType::Vertex),
        },
        ClipVertex {
            v: xf2.apply(vertices2[i2]),
            id: ContactId::new(edge1 as u8, FeatureType::Face, i2 as u8, FeatureType::Vertex),
        },
    ]
}

/// Separating axis test over both polygons' face normals, then clipping of
/// the incident edge against the reference face.
pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }
    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    // Prefer A as the reference unless B is clearly better.
    let tolerance = 0.1 * LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + tolerance {
        manifold.manifold_type = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.manifold_type = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.count();
    let vertices1 = poly1.vertices();
    let iv1 = edge1;
    let iv2 = if edge1 + 1 < count1 { edge1 + 1 } else { 0 };

    let mut v11 = vertices1[iv1];
    let mut v12 = vertices1[iv2];

    let local_tangent = (v12 - v11).normalize();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q.apply(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];

    if clip_segment_to_line(&mut clip_points1, &incident_edge, -tangent, side_offset1, iv1) < 2 {
        return manifold;
    }
    if clip_segment_to_line(&mut clip_points2, &clip_points1, tangent, side_offset2, iv2) < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for clip in clip_points2.iter().take(MAX_MANIFOLD_POINTS) {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= total_radius {
            let point = &mut manifold.points[point_count];
            point.local_point = xf2.apply_inv(clip.v);
            point.id = if flip { clip.id.swapped() } else { clip.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

/// Edge versus circle with Voronoi regions; one-sided edges consult their
/// ghost vertices so a circle rolling across a chain joint sees no bump.
pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the edge frame.
    let q = xf_a.apply_inv(xf_b.apply(circle_b.position));

    let a = edge_a.v1;
    let b = edge_a.v2;
    let e = b - a;

    // Normal on the right of the edge direction.
    let mut n = Vec2::new(e.y, -e.x);
    let offset = n.dot(q - a);

    let one_sided = edge_a.one_sided;
    if one_sided && offset < 0.0 {
        return manifold;
    }

    let u = e.dot(b - q);
    let v = e.dot(q - a);
    let radius = edge_a.radius + circle_b.radius;

    // Vertex A region.
    if v <= 0.0 {
        let d = q - a;
        if d.length_squared() > radius * radius {
            return manifold;
        }
        if one_sided {
            // Leave it to the previous edge if it owns this region.
            let e1 = a - edge_a.v0;
            if e1.dot(a - q) > 0.0 {
                return manifold;
            }
        }
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = a;
        manifold.points[0].id = ContactId::new(0, FeatureType::Vertex, 0, FeatureType::Vertex);
        manifold.points[0].local_point = circle_b.position;
        return manifold;
    }

    // Vertex B region.
    if u <= 0.0 {
        let d = q - b;
        if d.length_squared() > radius * radius {
            return manifold;
        }
        if one_sided {
            let e2 = edge_a.v3 - b;
            if e2.dot(q - b) > 0.0 {
                return manifold;
            }
        }
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = b;
        manifold.points[0].id = ContactId::new(1, FeatureType::Vertex, 0, FeatureType::Vertex);
        manifold.points[0].local_point = circle_b.position;
        return manifold;
    }

    // Face region.
    let den = e.length_squared();
    debug_assert!(den > 0.0);
    let p = (u * a + v * b) / den;
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }
    if offset < 0.0 {
        n = -n;
    }
    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.local_normal = n.normalize();
    manifold.local_point = a;
    manifold.points[0].id = ContactId::new(0, FeatureType::Face, 0, FeatureType::Vertex);
    manifold.points[0].local_point = circle_b.position;
    manifold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisKind {
    Unknown,
    EdgeA,
    EdgeB,
}

#[derive(Debug, Clone, Copy)]
struct SeparatingAxis {
    normal: Vec2,
    kind: AxisKind,
    index: usize,
    separation: f32,
}

/// Polygon B expressed in the edge's frame.
struct LocalPolygon {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
}

fn edge_separation(polygon: &LocalPolygon, v1: Vec2, normal1: Vec2) -> SeparatingAxis {
    let mut axis = SeparatingAxis {
        normal: Vec2::ZERO,
        kind: AxisKind::EdgeA,
        index: 0,
        separation: f32::MIN,
    };
    for (j, candidate) in [normal1, -normal1].into_iter().enumerate() {
        let deepest = polygon.vertices[..polygon.count]
            .iter()
            .map(|v| candidate.dot(*v - v1))
            .fold(f32::MAX, f32::min);
        if deepest > axis.separation {
            axis.index = j;
            axis.separation = deepest;
            axis.normal = candidate;
        }
    }
    axis
}

fn polygon_separation(polygon: &LocalPolygon, v1: Vec2, v2: Vec2) -> SeparatingAxis {
    let mut axis = SeparatingAxis {
        normal: Vec2::ZERO,
        kind: AxisKind::Unknown,
        index: 0,
        separation: f32::MIN,
    };
    for i in 0..polygon.count {
        let n = -polygon.normals[i];
        let s1 = n.dot(polygon.vertices[i] - v1);
        let s2 = n.dot(polygon.vertices[i] - v2);
        let s = s1.min(s2);
        if s > axis.separation {
            axis.kind = AxisKind::EdgeB;
            axis.index = i;
            axis.separation = s;
            axis.normal = n;
        }
    }
    axis
}

/// Edge versus polygon. One-sided edges use their ghost vertices to reject
/// or snap axes that would otherwise catch on internal chain vertices.
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    polygon_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.mul_t(xf_b);
    let centroid_b = xf.apply(polygon_b.centroid());

    let v1 = edge_a.v1;
    let v2 = edge_a.v2;
    let edge1 = (v2 - v1).normalize();
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    if edge_a.one_sided && offset1 < 0.0 {
        return manifold;
    }

    let mut local = LocalPolygon {
        vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        count: polygon_b.count(),
    };
    for (i, (v, n)) in polygon_b
        .vertices()
        .iter()
        .zip(polygon_b.normals())
        .enumerate()
    {
        local.vertices[i] = xf.apply(*v);
        local.normals[i] = xf.q.apply(*n);
    }

    let radius = polygon_b.radius + edge_a.radius;

    let edge_axis = edge_separation(&local, v1, normal1);
    if edge_axis.separation > radius {
        return manifold;
    }
    let polygon_axis = polygon_separation(&local, v1, v2);
    if polygon_axis.separation > radius {
        return manifold;
    }

    // Hysteresis against axis flip-flopping.
    const RELATIVE_TOL: f32 = 0.98;
    const ABSOLUTE_TOL: f32 = 0.001;
    let mut primary = if polygon_axis.separation - radius
        > RELATIVE_TOL * (edge_axis.separation - radius) + ABSOLUTE_TOL
    {
        polygon_axis
    } else {
        edge_axis
    };

    if edge_a.one_sided {
        let edge0 = (v1 - edge_a.v0).normalize();
        let normal0 = Vec2::new(edge0.y, -edge0.x);
        let convex1 = cross(edge0, edge1) >= 0.0;

        let edge2 = (edge_a.v3 - v2).normalize();
        let normal2 = Vec2::new(edge2.y, -edge2.x);
        let convex2 = cross(edge1, edge2) >= 0.0;

        const SIN_TOL: f32 = 0.1;
        let side1 = primary.normal.dot(edge1) <= 0.0;

        // Gauss map of the neighbouring edges.
        if side1 {
            if convex1 {
                if cross(primary.normal, normal0) > SIN_TOL {
                    return manifold;
                }
            } else {
                primary = edge_axis;
            }
        } else if convex2 {
            if cross(normal2, primary.normal) > SIN_TOL {
                return manifold;
            }
        } else {
            primary = edge_axis;
        }
    }

    let clip_points: [ClipVertex; 2];
    let (ref_i1, ref_i2, ref_v1, ref_v2, ref_normal, side_normal1, side_normal2);

    if primary.kind == AxisKind::EdgeA {
        manifold.manifold_type = ManifoldType::FaceA;

        // Polygon face most anti-parallel to the edge normal.
        let mut best_index = 0;
        let mut best_value = primary.normal.dot(local.normals[0]);
        for i in 1..local.count {
            let value = primary.normal.dot(local.normals[i]);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }
        let i1 = best_index;
        let i2 = if i1 + 1 < local.count { i1 + 1 } else { 0 };

        clip_points = [
            ClipVertex {
                v: local.vertices[i1],
                id: ContactId::new(0, FeatureType::Face, i1 as u8, FeatureType::Vertex),
            },
            ClipVertex {
                v: local.vertices[i2],
                id: ContactId::new(0, FeatureType::Face, i2 as u8, FeatureType::Vertex),
            },
        ];

        ref_i1 = 0;
        ref_i2 = 1;
        ref_v1 = v1;
        ref_v2 = v2;
        ref_normal = primary.normal;
        side_normal1 = -edge1;
        side_normal2 = edge1;
    } else {
        manifold.manifold_type = ManifoldType::FaceB;

        clip_points = [
            ClipVertex {
                v: v2,
                id: ContactId::new(1, FeatureType::Vertex, primary.index as u8, FeatureType::Face),
            },
            ClipVertex {
                v: v1,
                id: ContactId::new(0, FeatureType::Vertex, primary.index as u8, FeatureType::Face),
            },
        ];

        ref_i1 = primary.index;
        ref_i2 = if ref_i1 + 1 < local.count { ref_i1 + 1 } else { 0 };
        ref_v1 = local.vertices[ref_i1];
        ref_v2 = local.vertices[ref_i2];
        ref_normal = local.normals[ref_i1];
        side_normal1 = Vec2::new(ref_normal.y, -ref_normal.x);
        side_normal2 = -side_normal1;
    }

    let side_offset1 = side_normal1.dot(ref_v1);
    let side_offset2 = side_normal2.dot(ref_v2);

    let mut clip_points1 = [ClipVertex::default(); 2];
    let mut clip_points2 = [ClipVertex::default(); 2];
    if clip_segment_to_line(&mut clip_points1, &clip_points, side_normal1, side_offset1, ref_i1)
        < MAX_MANIFOLD_POINTS
    {
        return manifold;
    }
    if clip_segment_to_line(&mut clip_points2, &clip_points1, side_normal2, side_offset2, ref_i2)
        < MAX_MANIFOLD_POINTS
    {
        return manifold;
    }

    if primary.kind == AxisKind::EdgeA {
        manifold.local_normal = ref_normal;
        manifold.local_point = ref_v1;
    } else {
        manifold.local_normal = polygon_b.normals()[ref_i1];
        manifold.local_point = polygon_b.vertices()[ref_i1];
    }

    let mut point_count = 0;
    for clip in &clip_points2 {
        let separation = ref_normal.dot(clip.v - ref_v1);
        if separation <= radius {
            let point = &mut manifold.points[point_count];
            if primary.kind == AxisKind::EdgeA {
                point.local_point = xf.apply_inv(clip.v);
                point.id = clip.id;
            } else {
                point.local_point = clip.v;
                point.id = clip.id.swapped();
            }
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}
