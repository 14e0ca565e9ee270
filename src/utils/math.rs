//! Additional math helpers layered on top of `glam`.

use glam::{Mat2, Mat3, Vec2, Vec3};

/// Cross product of a vector and a scalar: `v x s`.
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector: `s x v`.
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Two-dimensional cross product, the z component of `a x b`.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

/// Solves `k * x = b` for a 2x2 matrix, returning zero for singular systems.
pub fn solve22(k: Mat2, b: Vec2) -> Vec2 {
    let (a11, a12) = (k.x_axis.x, k.y_axis.x);
    let (a21, a22) = (k.x_axis.y, k.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Inverse of a 2x2 matrix, or the zero matrix when singular.
pub fn inverse22(k: Mat2) -> Mat2 {
    let det = k.determinant();
    if det == 0.0 {
        Mat2::ZERO
    } else {
        k.inverse()
    }
}

/// Solves `k * x = b` for a 3x3 matrix, returning zero for singular systems.
pub fn solve33(k: &Mat3, b: Vec3) -> Vec3 {
    let (ex, ey, ez) = (k.x_axis, k.y_axis, k.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(ey.cross(ez)),
        det * ex.dot(b.cross(ez)),
        det * ex.dot(ey.cross(b)),
    )
}

/// Solves the upper-left 2x2 block of `k` against `b`.
pub fn solve33_block22(k: &Mat3, b: Vec2) -> Vec2 {
    let block = Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate());
    solve22(block, b)
}

/// Inverse of the upper-left 2x2 block, embedded in a 3x3 matrix with a zero third row/column.
pub fn inverse22_of33(k: &Mat3) -> Mat3 {
    let block = inverse22(Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate()));
    Mat3::from_cols(
        block.x_axis.extend(0.0),
        block.y_axis.extend(0.0),
        Vec3::ZERO,
    )
}

/// Inverse of a symmetric 3x3 matrix, or zero when singular.
pub fn sym_inverse33(k: &Mat3) -> Mat3 {
    let (ex, ey, ez) = (k.x_axis, k.y_axis, k.z_axis);
    let mut det = ex.dot(ey.cross(ez));
    if det != 0.0 {
        det = 1.0 / det;
    }

    let (a11, a12, a13) = (ex.x, ey.x, ez.x);
    let (a22, a23) = (ey.y, ez.y);
    let a33 = ez.z;

    let m00 = det * (a22 * a33 - a23 * a23);
    let m10 = det * (a13 * a23 - a12 * a33);
    let m20 = det * (a12 * a23 - a13 * a22);
    let m11 = det * (a11 * a33 - a13 * a13);
    let m21 = det * (a13 * a12 - a11 * a23);
    let m22 = det * (a11 * a22 - a12 * a12);

    Mat3::from_cols(
        Vec3::new(m00, m10, m20),
        Vec3::new(m10, m11, m21),
        Vec3::new(m20, m21, m22),
    )
}

/// Multiplies the upper-left 2x2 block of `k` by `v`.
#[inline]
pub fn mul22(k: &Mat3, v: Vec2) -> Vec2 {
    Vec2::new(
        k.x_axis.x * v.x + k.y_axis.x * v.y,
        k.x_axis.y * v.x + k.y_axis.y * v.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve22_inverts_diagonal() {
        let k = Mat2::from_cols(Vec2::new(2.0, 0.0), Vec2::new(0.0, 4.0));
        let x = solve22(k, Vec2::new(2.0, 2.0));
        assert!((x - Vec2::new(1.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn singular_systems_yield_zero() {
        assert_eq!(solve22(Mat2::ZERO, Vec2::ONE), Vec2::ZERO);
        assert_eq!(solve33(&Mat3::ZERO, Vec3::ONE), Vec3::ZERO);
        assert_eq!(inverse22(Mat2::ZERO), Mat2::ZERO);
    }

    #[test]
    fn solve33_matches_inverse() {
        let k = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.5),
            Vec3::new(1.0, 3.0, 0.2),
            Vec3::new(0.5, 0.2, 2.0),
        );
        let b = Vec3::new(1.0, -2.0, 0.5);
        let x = solve33(&k, b);
        assert!((k * x - b).length() < 1e-5);

        let inv = sym_inverse33(&k);
        assert!((inv * b - x).length() < 1e-5);
    }

    #[test]
    fn cross_helpers_are_consistent() {
        let v = Vec2::new(1.0, 2.0);
        assert_eq!(cross_sv(1.0, v), -cross_vs(v, 1.0));
        assert!((cross(Vec2::X, Vec2::Y) - 1.0).abs() < f32::EPSILON);
    }
}
