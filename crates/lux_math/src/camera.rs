use glam::Vec3;

/// Squared distance the camera may drift before accumulation resets.
pub const POSITION_EPSILON_SQ: f32 = 1e-8;

/// Allowed `1 - dot(old, new)` between the normalized axes before
/// accumulation resets.
pub const AXIS_EPSILON: f32 = 1e-6;

/// Allowed change of `tan(fov_y / 2)` before accumulation resets.
pub const FOV_EPSILON: f32 = 1e-5;

/// Pinhole camera expressed as an orthonormal basis, as consumed by the
/// trace stage.
///
/// The host derives this from its own camera every frame. Primary rays are
/// `normalize(forward + px * right + py * up)` where `px`/`py` are scaled by
/// the aspect ratio and `tan_half_fov_y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraBasis {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub tan_half_fov_y: f32,
}

impl CameraBasis {
    /// Build a basis looking from `position` towards `target`.
    ///
    /// `fov_y` is the full vertical field of view in radians.
    pub fn look_at(position: Vec3, target: Vec3, world_up: Vec3, fov_y: f32) -> Self {
        let forward = (target - position).normalize();
        let right = forward.cross(world_up).normalize();
        let up = right.cross(forward);

        Self {
            position,
            forward,
            right,
            up,
            tan_half_fov_y: (0.5 * fov_y).tan(),
        }
    }

    /// Camera used before the host has provided one.
    pub fn fallback() -> Self {
        Self {
            position: Vec3::new(2.8, 1.6, 3.2),
            forward: Vec3::new(-0.65, -0.25, -0.72),
            right: Vec3::new(0.74, 0.0, -0.67),
            up: Vec3::new(-0.17, 0.97, -0.19),
            tan_half_fov_y: (0.5 * 45.0_f32.to_radians()).tan(),
        }
    }

    /// Whether moving from `self` to `other` is large enough to invalidate
    /// accumulated samples.
    ///
    /// Axes are compared by direction only, so a host basis that is not
    /// exactly unit length still compares equal to itself. Non-finite inputs
    /// are not validated; NaN comparisons evaluate to "unchanged".
    pub fn differs_from(&self, other: &CameraBasis) -> bool {
        if self == other {
            return false;
        }

        let axis_changed =
            |a: Vec3, b: Vec3| (1.0 - a.normalize_or_zero().dot(b.normalize_or_zero())) > AXIS_EPSILON;

        self.position.distance_squared(other.position) > POSITION_EPSILON_SQ
            || axis_changed(self.forward, other.forward)
            || axis_changed(self.right, other.right)
            || axis_changed(self.up, other.up)
            || (self.tan_half_fov_y - other.tan_half_fov_y).abs() > FOV_EPSILON
    }

    /// Direction of the primary ray through normalized device coordinates
    /// `ndc` (both axes in [-1, 1], +y pointing down the image).
    pub fn ray_direction(&self, ndc_x: f32, ndc_y: f32, aspect: f32) -> Vec3 {
        let px = ndc_x * aspect * self.tan_half_fov_y;
        let py = -ndc_y * self.tan_half_fov_y;

        (self.forward + px * self.right + py * self.up).normalize()
    }
}
