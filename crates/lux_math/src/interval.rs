/// A closed range of ray parameters `[min, max]`.
///
/// Used for ray `t` ranges during traversal and for per-axis slab tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f32,
    pub max: f32,
}

impl Interval {
    /// Everything from zero to infinity, i.e. the whole forward half of a ray.
    pub const FORWARD: Interval = Interval {
        min: 0.0,
        max: f32::INFINITY,
    };

    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }

    /// Shrinks the upper bound, e.g. after a closer hit has been found.
    pub fn with_max(&self, max: f32) -> Interval {
        Interval::new(self.min, max)
    }

    /// Intersection of two intervals; empty when they do not overlap.
    pub fn intersect(&self, other: &Interval) -> Interval {
        Interval::new(self.min.max(other.min), self.max.min(other.max))
    }
}
