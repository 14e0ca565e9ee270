//! Collision geometry attached to fixtures.
//!
//! Shapes are immutable once built. Constructors validate their input and
//! return [`PhysicsError::InvalidShape`] instead of repairing bad geometry;
//! the only normalization performed is re-winding clockwise polygons.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{
    collision::aabb::{Aabb, RayCastInput, RayCastOutput},
    config::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS},
    core::types::{MassData, Transform},
    error::{PhysicsError, PhysicsResult},
    utils::math::cross,
};

/// Type tag used by the narrow-phase dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Circle,
    Edge,
    Polygon,
    Chain,
}

/// Smallest and largest distance from the body center to the shape surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShapeExtent {
    pub min_extent: f32,
    pub max_extent: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleShape {
    pub position: Vec2,
    pub radius: f32,
    pub density: f32,
}

/// Convex polygon with counter-clockwise vertices and outward normals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonShape {
    pub(crate) vertices: [Vec2; MAX_POLYGON_VERTICES],
    pub(crate) normals: [Vec2; MAX_POLYGON_VERTICES],
    pub(crate) count: usize,
    pub(crate) centroid: Vec2,
    pub radius: f32,
    pub density: f32,
}

/// Line segment `v1 -> v2`. One-sided edges collide only on the right of the
/// segment and use the ghost vertices `v0`/`v3` to smooth transitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeShape {
    pub v0: Vec2,
    pub v1: Vec2,
    pub v2: Vec2,
    pub v3: Vec2,
    pub one_sided: bool,
    pub radius: f32,
}

/// Polyline made of one-sided edges. Collision normals point to the right of
/// the direction of travel, so counter-clockwise loops enclose solid material
/// and ground running right-to-left is solid underneath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainShape {
    pub(crate) vertices: Vec<Vec2>,
    pub(crate) prev_vertex: Vec2,
    pub(crate) next_vertex: Vec2,
    pub(crate) is_loop: bool,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle(CircleShape),
    Polygon(PolygonShape),
    Edge(EdgeShape),
    Chain(ChainShape),
}

fn check_density(density: f32) -> PhysicsResult<()> {
    if density.is_finite() && density > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidShape {
            reason: "density must be finite and positive",
        })
    }
}

fn check_points(points: &[Vec2]) -> PhysicsResult<()> {
    if points.iter().all(|p| p.is_finite()) {
        Ok(())
    } else {
        Err(PhysicsError::InvalidShape {
            reason: "vertices must be finite",
        })
    }
}

impl Shape {
    /// Circle centered at `position` in body space.
    pub fn circle(position: Vec2, radius: f32, density: f32) -> PhysicsResult<Shape> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(PhysicsError::InvalidShape {
                reason: "circle radius must be finite and positive",
            });
        }
        check_points(&[position])?;
        check_density(density)?;
        Ok(Shape::Circle(CircleShape {
            position,
            radius,
            density,
        }))
    }

    /// Convex polygon from vertices given in order (either winding).
    pub fn polygon(vertices: &[Vec2], density: f32) -> PhysicsResult<Shape> {
        PolygonShape::new(vertices, density).map(Shape::Polygon)
    }

    /// Convex hull of an unordered point cloud.
    pub fn convex_hull(points: &[Vec2], density: f32) -> PhysicsResult<Shape> {
        let hull = compute_hull(points)?;
        PolygonShape::new(&hull, density).map(Shape::Polygon)
    }

    /// Axis-aligned box centered on the body origin.
    pub fn rect(half_width: f32, half_height: f32, density: f32) -> PhysicsResult<Shape> {
        Self::oriented_box(half_width, half_height, Vec2::ZERO, 0.0, density)
    }

    /// Box with the given half extents, center and angle in body space.
    pub fn oriented_box(
        half_width: f32,
        half_height: f32,
        center: Vec2,
        angle: f32,
        density: f32,
    ) -> PhysicsResult<Shape> {
        if !(half_width > 0.0 && half_height > 0.0) {
            return Err(PhysicsError::InvalidShape {
                reason: "box half extents must be positive",
            });
        }
        let xf = Transform::new(center, angle);
        let corners = [
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ]
        .map(|v| xf.apply(v));
        Self::polygon(&corners, density)
    }

    /// Two-sided segment.
    pub fn edge(v1: Vec2, v2: Vec2) -> PhysicsResult<Shape> {
        check_points(&[v1, v2])?;
        if v1.distance_squared(v2) <= LINEAR_SLOP * LINEAR_SLOP {
            return Err(PhysicsError::InvalidShape {
                reason: "edge is shorter than the linear slop",
            });
        }
        Ok(Shape::Edge(EdgeShape {
            v0: v1,
            v1,
            v2,
            v3: v2,
            one_sided: false,
            radius: POLYGON_RADIUS,
        }))
    }

    /// One-sided segment `v1 -> v2` with ghost neighbours `v0` and `v3`.
    pub fn one_sided_edge(v0: Vec2, v1: Vec2, v2: Vec2, v3: Vec2) -> PhysicsResult<Shape> {
        check_points(&[v0, v1, v2, v3])?;
        if v1.distance_squared(v2) <= LINEAR_SLOP * LINEAR_SLOP {
            return Err(PhysicsError::InvalidShape {
                reason: "edge is shorter than the linear slop",
            });
        }
        Ok(Shape::Edge(EdgeShape {
            v0,
            v1,
            v2,
            v3,
            one_sided: true,
            radius: POLYGON_RADIUS,
        }))
    }

    /// Open chain. Ghost vertices extend the end segments in a straight line.
    pub fn chain(vertices: &[Vec2]) -> PhysicsResult<Shape> {
        if vertices.len() < 2 {
            return Err(PhysicsError::InvalidShape {
                reason: "chain needs at least two vertices",
            });
        }
        let n = vertices.len();
        let prev = 2.0 * vertices[0] - vertices[1];
        let next = 2.0 * vertices[n - 1] - vertices[n - 2];
        Self::chain_with_ghosts(vertices, prev, next)
    }

    /// Open chain with explicit ghost vertices before the first and after the last vertex.
    pub fn chain_with_ghosts(vertices: &[Vec2], prev: Vec2, next: Vec2) -> PhysicsResult<Shape> {
        if vertices.len() < 2 {
            return Err(PhysicsError::InvalidShape {
                reason: "chain needs at least two vertices",
            });
        }
        check_points(vertices)?;
        check_points(&[prev, next])?;
        check_chain_spacing(vertices)?;
        Ok(Shape::Chain(ChainShape {
            vertices: vertices.to_vec(),
            prev_vertex: prev,
            next_vertex: next,
            is_loop: false,
            radius: POLYGON_RADIUS,
        }))
    }

    /// Closed chain; the last vertex is connected back to the first.
    pub fn chain_loop(vertices: &[Vec2]) -> PhysicsResult<Shape> {
        if vertices.len() < 3 {
            return Err(PhysicsError::InvalidShape {
                reason: "chain loop needs at least three vertices",
            });
        }
        check_points(vertices)?;
        let mut closed = vertices.to_vec();
        closed.push(vertices[0]);
        check_chain_spacing(&closed)?;
        let n = closed.len();
        Ok(Shape::Chain(ChainShape {
            prev_vertex: closed[n - 2],
            next_vertex: closed[1],
            vertices: closed,
            is_loop: true,
            radius: POLYGON_RADIUS,
        }))
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Shape::Circle(_) => ShapeType::Circle,
            Shape::Polygon(_) => ShapeType::Polygon,
            Shape::Edge(_) => ShapeType::Edge,
            Shape::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin or circle radius.
    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle(c) => c.radius,
            Shape::Polygon(p) => p.radius,
            Shape::Edge(e) => e.radius,
            Shape::Chain(c) => c.radius,
        }
    }

    pub fn density(&self) -> f32 {
        match self {
            Shape::Circle(c) => c.density,
            Shape::Polygon(p) => p.density,
            Shape::Edge(_) | Shape::Chain(_) => 0.0,
        }
    }

    /// Number of broad-phase proxies this shape needs.
    pub fn child_count(&self) -> usize {
        match self {
            Shape::Chain(c) => c.vertices.len() - 1,
            _ => 1,
        }
    }

    /// Chain edge `index`, with its ghost vertices.
    pub fn child_edge(&self, index: usize) -> Option<EdgeShape> {
        match self {
            Shape::Chain(chain) => chain.child_edge(index),
            Shape::Edge(edge) if index == 0 => Some(*edge),
            _ => None,
        }
    }

    pub fn test_point(&self, xf: &Transform, point: Vec2) -> bool {
        match self {
            Shape::Circle(c) => {
                let center = xf.apply(c.position);
                (point - center).length_squared() <= c.radius * c.radius
            }
            Shape::Polygon(poly) => {
                let local = xf.apply_inv(point);
                (0..poly.count).all(|i| poly.normals[i].dot(local - poly.vertices[i]) <= 0.0)
            }
            Shape::Edge(_) | Shape::Chain(_) => false,
        }
    }

    pub fn compute_aabb(&self, xf: &Transform, child_index: usize) -> Aabb {
        match self {
            Shape::Circle(c) => {
                let p = xf.apply(c.position);
                Aabb::from_center(p, Vec2::splat(c.radius))
            }
            Shape::Polygon(poly) => {
                let mut lower = xf.apply(poly.vertices[0]);
                let mut upper = lower;
                for v in &poly.vertices[1..poly.count] {
                    let w = xf.apply(*v);
                    lower = lower.min(w);
                    upper = upper.max(w);
                }
                Aabb::new(lower, upper).fattened(poly.radius)
            }
            Shape::Edge(e) => segment_aabb(xf, e.v1, e.v2, e.radius),
            Shape::Chain(chain) => {
                let i1 = child_index;
                let i2 = if child_index + 1 < chain.vertices.len() {
                    child_index + 1
                } else {
                    0
                };
                segment_aabb(xf, chain.vertices[i1], chain.vertices[i2], chain.radius)
            }
        }
    }

    pub fn ray_cast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child_index: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Shape::Circle(c) => ray_cast_circle(c, input, xf),
            Shape::Polygon(poly) => ray_cast_polygon(poly, input, xf),
            Shape::Edge(e) => ray_cast_edge(e, input, xf),
            Shape::Chain(chain) => {
                let edge = chain.child_edge(child_index)?;
                ray_cast_edge(&edge, input, xf)
            }
        }
    }

    /// Mass properties in body space for the shape's density.
    pub fn compute_mass(&self) -> MassData {
        match self {
            Shape::Circle(c) => {
                let mass = c.density * std::f32::consts::PI * c.radius * c.radius;
                MassData {
                    mass,
                    center: c.position,
                    inertia: mass * (0.5 * c.radius * c.radius + c.position.length_squared()),
                }
            }
            Shape::Polygon(poly) => poly.compute_mass(),
            Shape::Edge(e) => MassData {
                mass: 0.0,
                center: 0.5 * (e.v1 + e.v2),
                inertia: 0.0,
            },
            Shape::Chain(_) => MassData::default(),
        }
    }

    /// Extent of the shape measured from `local_center`.
    pub fn compute_extent(&self, local_center: Vec2) -> ShapeExtent {
        match self {
            Shape::Circle(c) => ShapeExtent {
                min_extent: c.radius,
                max_extent: (c.position - local_center).length() + c.radius,
            },
            Shape::Polygon(poly) => {
                let mut min_extent = f32::MAX;
                let mut max_sq = 0.0_f32;
                for i in 0..poly.count {
                    let v = poly.vertices[i];
                    let plane_offset = poly.normals[i].dot(v - poly.centroid);
                    min_extent = min_extent.min(plane_offset);
                    max_sq = max_sq.max((v - local_center).length_squared());
                }
                ShapeExtent {
                    min_extent: min_extent + poly.radius,
                    max_extent: max_sq.sqrt() + poly.radius,
                }
            }
            Shape::Edge(e) => ShapeExtent {
                min_extent: e.radius,
                max_extent: (e.v1 - local_center)
                    .length()
                    .max((e.v2 - local_center).length())
                    + e.radius,
            },
            Shape::Chain(chain) => ShapeExtent {
                min_extent: chain.radius,
                max_extent: chain
                    .vertices
                    .iter()
                    .map(|v| (*v - local_center).length())
                    .fold(0.0, f32::max)
                    + chain.radius,
            },
        }
    }
}

impl PolygonShape {
    pub fn new(points: &[Vec2], density: f32) -> PhysicsResult<Self> {
        let count = points.len();
        if !(3..=MAX_POLYGON_VERTICES).contains(&count) {
            return Err(PhysicsError::InvalidShape {
                reason: "polygon needs between 3 and 8 vertices",
            });
        }
        check_points(points)?;
        check_density(density)?;

        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(points);

        let signed_area: f32 = (0..count)
            .map(|i| cross(vertices[i], vertices[(i + 1) % count]))
            .sum::<f32>()
            * 0.5;
        if signed_area.abs() <= f32::EPSILON {
            return Err(PhysicsError::InvalidShape {
                reason: "polygon has no area",
            });
        }
        if signed_area < 0.0 {
            vertices[..count].reverse();
        }

        let weld_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            if edge.length_squared() <= weld_sq {
                return Err(PhysicsError::InvalidShape {
                    reason: "polygon has coincident vertices",
                });
            }
            normals[i] = Vec2::new(edge.y, -edge.x).normalize();
        }

        for i in 0..count {
            let e1 = vertices[(i + 1) % count] - vertices[i];
            let e2 = vertices[(i + 2) % count] - vertices[(i + 1) % count];
            let turn = cross(e1.normalize(), e2.normalize());
            if turn <= 1.0e-4 {
                return Err(PhysicsError::InvalidShape {
                    reason: "polygon is not strictly convex",
                });
            }
        }

        let centroid = compute_centroid(&vertices[..count]);

        Ok(Self {
            vertices,
            normals,
            count,
            centroid,
            radius: POLYGON_RADIUS,
            density,
        })
    }

    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn compute_mass(&self) -> MassData {
        const INV3: f32 = 1.0 / 3.0;
        let s = self.vertices[0];
        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        for i in 0..self.count {
            let e1 = self.vertices[i] - s;
            let e2 = self.vertices[(i + 1) % self.count] - s;
            let d = cross(e1, e2);
            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * INV3);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (int_x2 + int_y2);
        }

        let mass = self.density * area;
        center /= area;
        let world_center = center + s;
        let inertia_about_s = self.density * inertia;

        MassData {
            mass,
            center: world_center,
            inertia: inertia_about_s
                + mass * (world_center.length_squared() - center.length_squared()),
        }
    }
}

impl ChainShape {
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices
    }

    pub fn is_loop(&self) -> bool {
        self.is_loop
    }

    pub fn child_edge(&self, index: usize) -> Option<EdgeShape> {
        let n = self.vertices.len();
        if index + 1 >= n {
            return None;
        }
        let v0 = if index > 0 {
            self.vertices[index - 1]
        } else {
            self.prev_vertex
        };
        let v3 = if index + 2 < n {
            self.vertices[index + 2]
        } else {
            self.next_vertex
        };
        Some(EdgeShape {
            v0,
            v1: self.vertices[index],
            v2: self.vertices[index + 1],
            v3,
            one_sided: true,
            radius: self.radius,
        })
    }
}

fn check_chain_spacing(vertices: &[Vec2]) -> PhysicsResult<()> {
    let min_sq = LINEAR_SLOP * LINEAR_SLOP;
    if vertices
        .windows(2)
        .any(|w| w[0].distance_squared(w[1]) <= min_sq)
    {
        return Err(PhysicsError::InvalidShape {
            reason: "chain vertices are too close together",
        });
    }
    Ok(())
}

fn segment_aabb(xf: &Transform, v1: Vec2, v2: Vec2, radius: f32) -> Aabb {
    let a = xf.apply(v1);
    let b = xf.apply(v2);
    Aabb::new(a.min(b), a.max(b)).fattened(radius)
}

fn compute_centroid(vertices: &[Vec2]) -> Vec2 {
    const INV3: f32 = 1.0 / 3.0;
    let origin = vertices[0];
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    for i in 1..vertices.len() - 1 {
        let e1 = vertices[i] - origin;
        let e2 = vertices[i + 1] - origin;
        let a = 0.5 * cross(e1, e2);
        c += (e1 + e2) * (a * INV3);
        area += a;
    }
    c / area + origin
}

/// Gift-wrapping hull with welding of near-duplicate points.
fn compute_hull(points: &[Vec2]) -> PhysicsResult<Vec<Vec2>> {
    check_points(points)?;
    let weld_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
    let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
    for p in points {
        if unique.iter().all(|u| u.distance_squared(*p) > weld_sq) {
            unique.push(*p);
        }
    }
    if unique.len() < 3 {
        return Err(PhysicsError::InvalidShape {
            reason: "hull needs at least three distinct points",
        });
    }

    let mut start = 0;
    for (i, p) in unique.iter().enumerate().skip(1) {
        let best = unique[start];
        if p.x > best.x || (p.x == best.x && p.y < best.y) {
            start = i;
        }
    }

    let mut hull = Vec::new();
    let mut current = start;
    loop {
        if hull.len() >= MAX_POLYGON_VERTICES {
            return Err(PhysicsError::InvalidShape {
                reason: "hull has more than 8 vertices",
            });
        }
        hull.push(current);

        let mut next = 0;
        for j in 1..unique.len() {
            if next == current {
                next = j;
                continue;
            }
            let r = unique[next] - unique[current];
            let v = unique[j] - unique[current];
            let c = cross(r, v);
            if c < 0.0 || (c == 0.0 && v.length_squared() > r.length_squared()) {
                next = j;
            }
        }

        current = next;
        if current == start {
            break;
        }
    }

    Ok(hull.into_iter().map(|i| unique[i]).collect())
}

fn ray_cast_circle(
    circle: &CircleShape,
    input: &RayCastInput,
    xf: &Transform,
) -> Option<RayCastOutput> {
    let position = xf.apply(circle.position);
    let s = input.p1 - position;
    let b = s.length_squared() - circle.radius * circle.radius;

    let r = input.p2 - input.p1;
    let c = s.dot(r);
    let rr = r.length_squared();
    let sigma = c * c - rr * b;

    if sigma < 0.0 || rr < f32::EPSILON {
        return None;
    }

    let a = -(c + sigma.sqrt());
    if 0.0 <= a && a <= input.max_fraction * rr {
        let fraction = a / rr;
        return Some(RayCastOutput {
            fraction,
            normal: (s + r * fraction).normalize(),
        });
    }
    None
}

fn ray_cast_polygon(
    poly: &PolygonShape,
    input: &RayCastInput,
    xf: &Transform,
) -> Option<RayCastOutput> {
    let p1 = xf.q.apply_inv(input.p1 - xf.p);
    let p2 = xf.q.apply_inv(input.p2 - xf.p);
    let d = p2 - p1;

    let mut lower = 0.0_f32;
    let mut upper = input.max_fraction;
    let mut index: Option<usize> = None;

    for i in 0..poly.count {
        let numerator = poly.normals[i].dot(poly.vertices[i] - p1);
        let denominator = poly.normals[i].dot(d);

        if denominator == 0.0 {
            if numerator < 0.0 {
                return None;
            }
        } else if denominator < 0.0 && numerator < lower * denominator {
            lower = numerator / denominator;
            index = Some(i);
        } else if denominator > 0.0 && numerator < upper * denominator {
            upper = numerator / denominator;
        }

        if upper < lower {
            return None;
        }
    }

    index.map(|i| RayCastOutput {
        fraction: lower,
        normal: xf.q.apply(poly.normals[i]),
    })
}

fn ray_cast_edge(edge: &EdgeShape, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
    let p1 = xf.q.apply_inv(input.p1 - xf.p);
    let p2 = xf.q.apply_inv(input.p2 - xf.p);
    let d = p2 - p1;

    let e = edge.v2 - edge.v1;
    let normal = Vec2::new(e.y, -e.x).normalize();

    let numerator = normal.dot(edge.v1 - p1);
    if edge.one_sided && numerator > 0.0 {
        return None;
    }

    let denominator = normal.dot(d);
    if denominator == 0.0 {
        return None;
    }

    let t = numerator / denominator;
    if t < 0.0 || input.max_fraction < t {
        return None;
    }

    let q = p1 + d * t;
    let rr = e.length_squared();
    if rr == 0.0 {
        return None;
    }
    let s = (q - edge.v1).dot(e) / rr;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }

    let local_normal = if numerator > 0.0 { -normal } else { normal };
    Some(RayCastOutput {
        fraction: t,
        normal: xf.q.apply(local_normal),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_square() -> Vec<Vec2> {
        vec![
            Vec2::new(-0.5, -0.5),
            Vec2::new(0.5, -0.5),
            Vec2::new(0.5, 0.5),
            Vec2::new(-0.5, 0.5),
        ]
    }

    #[test]
    fn clockwise_polygon_is_rewound() {
        let mut points = unit_square();
        points.reverse();
        let Shape::Polygon(poly) = Shape::polygon(&points, 1.0).unwrap() else {
            panic!("expected polygon");
        };
        let area: f32 = (0..poly.count)
            .map(|i| cross(poly.vertices[i], poly.vertices[(i + 1) % poly.count]))
            .sum();
        assert!(area > 0.0);
    }

    #[test]
    fn non_convex_polygon_is_rejected() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.3),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        assert!(matches!(
            Shape::polygon(&points, 1.0),
            Err(PhysicsError::InvalidShape { .. })
        ));
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let collinear = [Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)];
        assert!(Shape::polygon(&collinear, 1.0).is_err());
        assert!(Shape::circle(Vec2::ZERO, 0.0, 1.0).is_err());
        assert!(Shape::circle(Vec2::ZERO, 1.0, -1.0).is_err());
        assert!(Shape::rect(1.0, 1.0, 0.0).is_err());
        assert!(Shape::edge(Vec2::ZERO, Vec2::ZERO).is_err());
        assert!(Shape::chain(&[Vec2::ZERO]).is_err());
        assert!(Shape::polygon(&[Vec2::ZERO; 9], 1.0).is_err());
    }

    #[test]
    fn box_mass_matches_closed_form() {
        let shape = Shape::rect(1.0, 0.5, 2.0).unwrap();
        let mass = shape.compute_mass();
        // 2 x 1 box, density 2.
        assert_relative_eq!(mass.mass, 4.0, epsilon = 1e-4);
        assert_relative_eq!(mass.center.length(), 0.0, epsilon = 1e-5);
        let expected = mass.mass * (4.0 + 1.0) / 12.0;
        assert_relative_eq!(mass.inertia, expected, epsilon = 1e-4);
    }

    #[test]
    fn offset_circle_uses_parallel_axis() {
        let shape = Shape::circle(Vec2::new(2.0, 0.0), 1.0, 1.0).unwrap();
        let mass = shape.compute_mass();
        let pi = std::f32::consts::PI;
        assert_relative_eq!(mass.mass, pi, epsilon = 1e-5);
        assert_relative_eq!(mass.inertia, pi * (0.5 + 4.0), epsilon = 1e-4);
    }

    #[test]
    fn hull_discards_interior_points() {
        let points = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.5, 0.5),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let Shape::Polygon(poly) = Shape::convex_hull(&points, 1.0).unwrap() else {
            panic!("expected polygon");
        };
        assert_eq!(poly.count(), 4);
        assert_relative_eq!(poly.centroid().x, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn ray_hits_polygon_face() {
        let shape = Shape::rect(1.0, 1.0, 1.0).unwrap();
        let xf = Transform::from_position(Vec2::new(5.0, 0.0));
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0));
        let hit = shape.ray_cast(&input, &xf, 0).expect("ray should hit");
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-5);
        assert_relative_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn one_sided_edge_ignores_back_face_rays() {
        // Collision side is to the right of v1 -> v2, i.e. above for a right-to-left edge.
        let shape = Shape::one_sided_edge(
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(-2.0, 0.0),
        )
        .unwrap();
        let down = RayCastInput::new(Vec2::new(0.0, 1.0), Vec2::new(0.0, -1.0));
        let up = RayCastInput::new(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0));
        assert!(shape.ray_cast(&down, &Transform::IDENTITY, 0).is_some());
        assert!(shape.ray_cast(&up, &Transform::IDENTITY, 0).is_none());
    }

    #[test]
    fn chain_children_carry_ghost_vertices() {
        let shape = Shape::chain(&[Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)]).unwrap();
        assert_eq!(shape.child_count(), 2);
        let edge = shape.child_edge(1).unwrap();
        assert_eq!(edge.v0, Vec2::ZERO);
        assert_eq!(edge.v3, Vec2::new(3.0, 0.0));
        assert!(edge.one_sided);

        let looped = Shape::chain_loop(&[Vec2::ZERO, Vec2::X, Vec2::ONE]).unwrap();
        assert_eq!(looped.child_count(), 3);
    }

    #[test]
    fn polygon_extent_is_inscribed_distance() {
        let shape = Shape::rect(1.0, 0.5, 1.0).unwrap();
        let extent = shape.compute_extent(Vec2::ZERO);
        assert_relative_eq!(extent.min_extent, 0.5 + POLYGON_RADIUS, epsilon = 1e-5);
        assert_relative_eq!(
            extent.max_extent,
            1.25_f32.sqrt() + POLYGON_RADIUS,
            epsilon = 1e-5
        );
    }
}
