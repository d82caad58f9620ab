//! Reproducible per-pixel sampling.
//!
//! The GPU trace stage runs the same integer hash and LCG, so a CPU result
//! for a given pixel and sample index matches bit-for-bit up to float
//! rounding in the ray setup.

use lux_math::{CameraBasis, Ray, Vec2};

/// 32-bit integer finalizer (lowbias32).
#[inline]
pub fn hash_u32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x7feb_352d);
    x ^= x >> 15;
    x = x.wrapping_mul(0x846c_a68b);
    x ^= x >> 16;
    x
}

#[inline]
pub fn hash3(x: u32, y: u32, z: u32) -> u32 {
    hash_u32(x ^ hash_u32(y ^ hash_u32(z)))
}

/// Linear congruential generator producing floats in `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleRng {
    state: u32,
}

impl SampleRng {
    /// Seed for `sample_index` of pixel (`x`, `y`).
    pub fn for_pixel(x: u32, y: u32, sample_index: u32) -> Self {
        Self {
            state: hash3(x, y, sample_index),
        }
    }

    pub fn next_f32(&mut self) -> f32 {
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        // 23 mantissa bits into [1, 2), then shift down
        f32::from_bits((self.state >> 8) | 0x3f80_0000) - 1.0
    }
}

/// Sub-pixel jitter for one sample.
pub fn jitter(x: u32, y: u32, sample_index: u32) -> Vec2 {
    let mut rng = SampleRng::for_pixel(x, y, sample_index);
    let jx = rng.next_f32();
    let jy = rng.next_f32();
    Vec2::new(jx, jy)
}

/// Jittered primary ray through pixel (`x`, `y`) of a `width` x `height`
/// image.
pub fn primary_ray(
    camera: &CameraBasis,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    sample_index: u32,
) -> Ray {
    let j = jitter(x, y, sample_index);
    let (w, h) = (width.max(1) as f32, height.max(1) as f32);

    let ndc_x = ((x as f32 + j.x) / w) * 2.0 - 1.0;
    let ndc_y = ((y as f32 + j.y) / h) * 2.0 - 1.0;

    Ray::new(camera.position, camera.ray_direction(ndc_x, ndc_y, w / h))
}
