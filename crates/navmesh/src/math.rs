//! Small geometry helpers shared across the build pipeline.
//!
//! All 2D reasoning happens on the xz-plane, seen from above (+y). With that
//! view, a positive [`tri_area_xz`] means the third point lies to the right
//! of the directed line through the first two.

use glam::{Vec2, Vec3, Vec3A};

/// An axis-aligned bounding box in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb3d {
    /// The minimum corner of the box.
    pub min: Vec3,
    /// The maximum corner of the box.
    pub max: Vec3,
}

impl Aabb3d {
    /// Computes the AABB enclosing `verts`.
    /// Returns `None` if `verts` is empty.
    pub fn from_verts(verts: &[Vec3A]) -> Option<Self> {
        let first = Vec3::from(*verts.first()?);
        let mut aabb = Self {
            min: first,
            max: first,
        };
        for vert in &verts[1..] {
            aabb.min = aabb.min.min(Vec3::from(*vert));
            aabb.max = aabb.max.max(Vec3::from(*vert));
        }
        Some(aabb)
    }

    /// The size of the box along each axis.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// x-offsets of the four cardinal grid directions, in the order west, north, east, south.
pub(crate) const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
/// z-offsets of the four cardinal grid directions, matching [`DIR_OFFSET_X`].
pub(crate) const DIR_OFFSET_Z: [i32; 4] = [0, 1, 0, -1];

/// 2D cross product of `a` and `b` projected onto the xz-plane.
#[inline]
pub(crate) fn cross_xz(a: Vec3, b: Vec3) -> f32 {
    a.x * b.z - a.z * b.x
}

/// Twice the signed area of the triangle `abc` projected onto the xz-plane.
///
/// Positive when `c` lies to the right of the directed line `a -> b`, seen
/// from above.
#[inline]
pub(crate) fn tri_area_xz(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    cross_xz(b - a, c - a)
}

/// Squared distance from `p` to the segment `ab`.
pub(crate) fn point_segment_distance_sq(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ap = p - a;
    let ab = b - a;
    let denominator = ab.dot(ab);
    if denominator <= f32::EPSILON {
        // Degenerate segment, measure against the point `a` instead.
        return ap.length_squared();
    }
    let f = ap.dot(ab) / denominator;
    if f <= 0.0 {
        ap.length_squared()
    } else if f >= 1.0 {
        (p - b).length_squared()
    } else {
        (p - (a + ab * f)).length_squared()
    }
}

/// Barycentric coordinates of `p` with respect to the triangle `abc`,
/// all projected onto the xz-plane.
pub(crate) fn barycentric_xz(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.x * v0.x + v0.z * v0.z;
    let d01 = v0.x * v1.x + v0.z * v1.z;
    let d11 = v1.x * v1.x + v1.z * v1.z;
    let d20 = v2.x * v0.x + v2.z * v0.z;
    let d21 = v2.x * v1.x + v2.z * v1.z;
    let denominator = d00 * d11 - d01 * d01;
    if denominator.abs() <= f32::EPSILON {
        return (-1.0, -1.0, -1.0);
    }
    let v = (d11 * d20 - d01 * d21) / denominator;
    let w = (d00 * d21 - d01 * d20) / denominator;
    (1.0 - v - w, v, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn aabb_from_verts_spans_all_points() {
        let verts = [
            Vec3A::new(1.0, 2.0, 3.0),
            Vec3A::new(-1.0, 5.0, 0.0),
            Vec3A::new(0.0, -2.0, 7.0),
        ];
        let aabb = Aabb3d::from_verts(&verts).unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 5.0, 7.0));
    }

    #[test]
    fn aabb_from_no_verts_is_none() {
        assert_eq!(Aabb3d::from_verts(&[]), None);
    }

    #[test]
    fn tri_area_sign_matches_side() {
        let a = Vec3::ZERO;
        let b = Vec3::new(0.0, 0.0, 1.0);
        // Facing +z from above, -x is the right-hand side.
        let right = Vec3::new(-1.0, 0.0, 1.0);
        let left = Vec3::new(1.0, 0.0, 1.0);
        assert!(tri_area_xz(a, b, right) > 0.0);
        assert!(tri_area_xz(a, b, left) < 0.0);
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(2.0, 0.0);
        assert_relative_eq!(point_segment_distance_sq(Vec2::new(1.0, 1.0), a, b), 1.0);
        assert_relative_eq!(point_segment_distance_sq(Vec2::new(-1.0, 0.0), a, b), 1.0);
        assert_relative_eq!(point_segment_distance_sq(Vec2::new(3.0, 0.0), a, b), 1.0);
    }

    #[test]
    fn barycentric_recovers_vertices() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 0.0, 1.0);
        let (u, v, w) = barycentric_xz(a, a, b, c);
        assert_relative_eq!(u, 1.0);
        assert_relative_eq!(v, 0.0);
        assert_relative_eq!(w, 0.0);
        let (u, v, w) = barycentric_xz(Vec3::new(0.25, 0.0, 0.25), a, b, c);
        assert_relative_eq!(u, 0.5);
        assert_relative_eq!(v, 0.25);
        assert_relative_eq!(w, 0.25);
    }
}
