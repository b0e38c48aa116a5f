//! World-space triangle with box overlap and ray hit tests

use crate::core::types::Vec3;
use super::aabb::Aabb;
use super::ray::Ray;

/// Cross products shorter than this (squared) count as zero.
const DEGENERATE_EPSILON: f32 = 1e-12;

/// A triangle given by its three world-space corners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [self.a, self.b, self.c]
    }

    /// Unnormalized face normal (length = 2 * area)
    pub fn normal(&self) -> Vec3 {
        (self.b - self.a).cross(self.c - self.a)
    }

    /// Zero-area triangle (collinear or coincident corners)
    pub fn is_degenerate(&self) -> bool {
        self.normal().length_squared() <= DEGENERATE_EPSILON
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(
            self.a.min(self.b).min(self.c),
            self.a.max(self.b).max(self.c),
        )
    }

    /// Separating-axis overlap test against an axis-aligned box.
    ///
    /// Corners are translated into the box's frame first, then tested in order:
    /// bounding-box rejection, triangle-plane distance, and the nine
    /// edge x box-axis projections. Touching counts as overlapping.
    /// Degenerate triangles never overlap anything.
    pub fn intersects_box(&self, center: Vec3, half_extent: Vec3) -> bool {
        self.intersects_box_with_tolerance(center, half_extent, 0.0)
    }

    /// [`Self::intersects_box`] with the box grown by `tolerance` on every side.
    pub fn intersects_box_with_tolerance(&self, center: Vec3, half_extent: Vec3, tolerance: f32) -> bool {
        let half = half_extent + Vec3::splat(tolerance);
        let v0 = self.a - center;
        let v1 = self.b - center;
        let v2 = self.c - center;

        let min = v0.min(v1).min(v2);
        let max = v0.max(v1).max(v2);
        if min.x > half.x || max.x < -half.x
            || min.y > half.y || max.y < -half.y
            || min.z > half.z || max.z < -half.z
        {
            return false;
        }

        let e0 = v1 - v0;
        let e1 = v2 - v1;
        let e2 = v0 - v2;

        let normal = e0.cross(e1);
        if normal.length_squared() <= DEGENERATE_EPSILON {
            return false;
        }
        // Box center is the origin in this frame.
        let plane_distance = normal.dot(v0);
        if plane_distance.abs() > half.dot(normal.abs()) {
            return false;
        }

        for edge in [e0, e1, e2] {
            for box_axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                let axis = box_axis.cross(edge);
                if axis.length_squared() <= DEGENERATE_EPSILON {
                    continue;
                }
                let p0 = v0.dot(axis);
                let p1 = v1.dot(axis);
                let p2 = v2.dot(axis);
                let radius = half.dot(axis.abs());
                if p0.min(p1).min(p2) > radius || p0.max(p1).max(p2) < -radius {
                    return false;
                }
            }
        }

        true
    }

    /// Double-sided Moller-Trumbore hit test. Returns the ray parameter of
    /// the hit if it lies within `[0, max_distance]`.
    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<f32> {
        let edge1 = self.b - self.a;
        let edge2 = self.c - self.a;
        let p = ray.direction.cross(edge2);
        let det = edge1.dot(p);
        if det.abs() <= f32::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let s = ray.origin - self.a;
        let u = s.dot(p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = ray.direction.dot(q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(q) * inv_det;
        (t >= 0.0 && t <= max_distance).then_some(t)
    }
}
