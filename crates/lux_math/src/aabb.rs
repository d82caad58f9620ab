use crate::{Interval, Ray, Vec3};

/// Axis-aligned bounding box, stored as its two corners.
///
/// The empty box has `min = +inf` and `max = -inf` so that growing it by any
/// point yields exactly that point's box.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    /// Create an AABB from two arbitrary corner points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Tight bounds of a triangle.
    pub fn from_triangle(v0: Vec3, v1: Vec3, v2: Vec3) -> Self {
        Self {
            min: v0.min(v1).min(v2),
            max: v0.max(v1).max(v2),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow the box so that it contains `point`.
    pub fn grow_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow the box so that it contains `other`.
    pub fn grow(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn union(a: &Aabb, b: &Aabb) -> Self {
        let mut out = *a;
        out.grow(b);
        out
    }

    /// Size along each axis; zero for the empty box.
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Index (0=X, 1=Y, 2=Z) of the axis with the largest extent.
    ///
    /// Ties resolve towards the lower axis: Y only wins when strictly longer
    /// than X, and Z only when strictly longer than X and at least Y.
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();

        if e.y > e.x && e.y >= e.z {
            1
        } else if e.z > e.x && e.z >= e.y {
            2
        } else {
            0
        }
    }

    /// Returns true if `other` lies entirely inside this box (boundaries
    /// included).
    pub fn contains(&self, other: &Aabb) -> bool {
        other.is_empty()
            || (self.min.cmple(other.min).all() && self.max.cmpge(other.max).all())
    }

    /// Slab test. Returns the parametric overlap of the ray with the box,
    /// clipped to `ray_t`, or `None` when they do not overlap.
    pub fn hit(&self, ray: &Ray, ray_t: Interval) -> Option<Interval> {
        let t0 = (self.min - ray.origin) * ray.inv_direction;
        let t1 = (self.max - ray.origin) * ray.inv_direction;

        let slab = Interval::new(t0.min(t1).max_element(), t0.max(t1).min_element());
        let overlap = ray_t.intersect(&slab);

        (!overlap.is_empty()).then_some(overlap)
    }
}
