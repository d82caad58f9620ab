use crate::Vec3;

/// A ray in 3D space.
///
/// Rays start at `origin` and travel along `direction`. The reciprocal of the
/// direction is cached because every BVH slab test needs it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub inv_direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
        }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_inverse_direction() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(2.0, -4.0, 0.0));

        assert_eq!(ray.inv_direction.x, 0.5);
        assert_eq!(ray.inv_direction.y, -0.25);
        assert!(ray.inv_direction.z.is_infinite());
    }
}
