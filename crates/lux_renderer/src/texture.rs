//! Base-color textures for the CPU pipeline.
//!
//! Pixels are stored as linear float RGBA. Sampling matches a repeat,
//! bilinear GPU sampler with texel centers at half-integers and (0, 0) at
//! the first row.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lux_math::{Vec2, Vec3};
use thiserror::Error;

/// Errors that can occur when building a texture.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Texture data is {actual} bytes, expected {expected} for {width}x{height} RGBA8")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

pub type TextureResult<T> = Result<T, TextureError>;

/// A loaded texture with pixel data.
#[derive(Clone, Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,

    /// Linear RGBA, row-major, first row at v = 0.
    pub pixels: Vec<[f32; 4]>,
}

impl Texture {
    /// Create a texture from sRGB-encoded RGBA8 bytes.
    pub fn from_srgb_rgba8(width: u32, height: u32, bytes: &[u8]) -> TextureResult<Self> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() != expected || width == 0 || height == 0 {
            return Err(TextureError::SizeMismatch {
                width,
                height,
                expected,
                actual: bytes.len(),
            });
        }

        let pixels = bytes
            .chunks_exact(4)
            .map(|p| {
                [
                    srgb_to_linear(p[0]),
                    srgb_to_linear(p[1]),
                    srgb_to_linear(p[2]),
                    p[3] as f32 / 255.0, // Alpha is linear
                ]
            })
            .collect();

        Ok(Self { width, height, pixels })
    }

    /// Create a solid color texture (1x1).
    pub fn solid_color(color: Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![[color.x, color.y, color.z, 1.0]],
        }
    }

    /// Bilinear sample with repeat addressing.
    pub fn sample(&self, uv: Vec2) -> Vec3 {
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;

        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let p00 = self.texel(x0 as i64, y0 as i64);
        let p10 = self.texel(x0 as i64 + 1, y0 as i64);
        let p01 = self.texel(x0 as i64, y0 as i64 + 1);
        let p11 = self.texel(x0 as i64 + 1, y0 as i64 + 1);

        let top = p00.lerp(p10, fx);
        let bottom = p01.lerp(p11, fx);
        top.lerp(bottom, fy)
    }

    /// Texel at wrapped integer coordinates.
    fn texel(&self, x: i64, y: i64) -> Vec3 {
        let x = x.rem_euclid(self.width.max(1) as i64) as usize;
        let y = y.rem_euclid(self.height.max(1) as i64) as usize;
        self.pixels
            .get(y * self.width as usize + x)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .unwrap_or(Vec3::ZERO)
    }
}

/// Shared texture handle compared by identity.
///
/// Two handles are equal only if they point at the same allocation, so
/// materials sharing one loaded texture share one slot.
#[derive(Clone, Debug)]
pub struct TextureRef(pub Arc<Texture>);

impl TextureRef {
    pub fn new(texture: Texture) -> Self {
        Self(Arc::new(texture))
    }
}

impl PartialEq for TextureRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TextureRef {}

impl Hash for TextureRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// Convert sRGB byte value to linear float.
fn srgb_to_linear(value: u8) -> f32 {
    let v = value as f32 / 255.0;
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}
