use glam::Vec2;

use crate::collision::manifold::{ContactId, FeatureType};

/// Vertex produced while clipping an incident edge, tagged with its features.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipVertex {
    pub v: Vec2,
    pub id: ContactId,
}

/// Clips a segment against the half-plane `normal . x <= offset`
/// (Sutherland-Hodgman restricted to one edge).
///
/// Returns the number of output vertices; fewer than two means the segment
/// lies outside the plane. `vertex_index_a` tags any new intersection point
/// with the reference-face vertex that created it.
pub fn clip_segment_to_line(
    out: &mut [ClipVertex; 2],
    input: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> usize {
    let mut count = 0;

    let distance0 = normal.dot(input[0].v) - offset;
    let distance1 = normal.dot(input[1].v) - offset;

    if distance0 <= 0.0 {
        out[count] = input[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        out[count] = input[1];
        count += 1;
    }

    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        out[count] = ClipVertex {
            v: input[0].v + interp * (input[1].v - input[0].v),
            id: ContactId {
                index_a: vertex_index_a as u8,
                index_b: input[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        };
        count += 1;
        debug_assert!(count == 2);
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_vertex(x: f32, index_b: u8) -> ClipVertex {
        ClipVertex {
            v: Vec2::new(x, 0.0),
            id: ContactId::new(0, FeatureType::Face, index_b, FeatureType::Vertex),
        }
    }

    #[test]
    fn segment_inside_is_untouched() {
        let input = [clip_vertex(-1.0, 0), clip_vertex(1.0, 1)];
        let mut out = [ClipVertex::default(); 2];
        let count = clip_segment_to_line(&mut out, &input, Vec2::X, 2.0, 5);
        assert_eq!(count, 2);
        assert_eq!(out, input);
    }

    #[test]
    fn crossing_segment_gets_intersection_vertex() {
        let input = [clip_vertex(-1.0, 0), clip_vertex(3.0, 1)];
        let mut out = [ClipVertex::default(); 2];
        let count = clip_segment_to_line(&mut out, &input, Vec2::X, 1.0, 5);
        assert_eq!(count, 2);
        assert!((out[1].v.x - 1.0).abs() < 1e-6);
        assert_eq!(out[1].id.index_a, 5);
        assert_eq!(out[1].id.type_a, FeatureType::Vertex);
    }

    #[test]
    fn segment_outside_is_dropped() {
        let input = [clip_vertex(2.0, 0), clip_vertex(3.0, 1)];
        let mut out = [ClipVertex::default(); 2];
        assert_eq!(clip_segment_to_line(&mut out, &input, Vec2::X, 1.0, 0), 0);
    }
}
