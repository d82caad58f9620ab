//! Accumulate, denoise and tonemap math.

use crate::settings::DebugView;
use lux_math::{Vec2, Vec3, Vec4};

/// Separable near-Gaussian base weights of the 5x5 à-trous kernel.
pub const ATROUS_WEIGHTS: [f32; 5] = [0.06136, 0.24477, 0.38774, 0.24477, 0.06136];

/// Exponent applied to `max(dot(n0, ni), 0)`.
pub const SIGMA_N: f32 = 48.0;

/// Depth falloff rate in `exp(-|z0 - zi| * sigma_z)`.
pub const SIGMA_Z: f32 = 2.0;

/// Scale applied to linear depth in the depth debug view.
pub const DEPTH_VIEW_SCALE: f32 = 0.02;

/// Incremental mean: fold one more sample into an average of `count`.
#[inline]
pub fn accumulate(average: Vec4, count: u32, sample: Vec4) -> Vec4 {
    (average * count as f32 + sample) / (count as f32 + 1.0)
}

/// Edge-stopping weight of one à-trous tap.
#[inline]
pub fn edge_weight(n0: Vec3, ni: Vec3, z0: f32, zi: f32, sigma_n: f32, sigma_z: f32) -> f32 {
    let wn = n0.dot(ni).max(0.0).powf(sigma_n);
    let wz = (-(z0 - zi).abs() * sigma_z).exp();
    wn * wz
}

/// ACES filmic fit (Narkowicz), clamped to `[0, 1]`.
pub fn tonemap_aces(x: Vec3) -> Vec3 {
    const A: f32 = 2.51;
    const B: f32 = 0.03;
    const C: f32 = 2.43;
    const D: f32 = 0.59;
    const E: f32 = 0.14;

    ((x * (A * x + B)) / (x * (C * x + D) + E)).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Gamma 2.2 display encoding.
pub fn to_srgb(c: Vec3) -> Vec3 {
    c.max(Vec3::ZERO).powf(1.0 / 2.2)
}

fn finite_or_zero(c: Vec3) -> Vec3 {
    if c.is_finite() {
        c
    } else {
        Vec3::ZERO
    }
}

/// Linear input of the tonemap curve for `view`.
///
/// `color` is the already-selected HDR buffer; the auxiliary views ignore it.
pub fn debug_view_color(
    view: DebugView,
    color: Vec3,
    albedo: Vec3,
    normal: Vec3,
    depth: f32,
    rough_metal: Vec2,
) -> Vec3 {
    match view {
        DebugView::Albedo => albedo,
        DebugView::Normal => normal * 0.5 + 0.5,
        DebugView::Depth => Vec3::splat(depth * DEPTH_VIEW_SCALE),
        DebugView::RoughMetal => Vec3::new(rough_metal.x, rough_metal.y, 0.0),
        DebugView::Denoised | DebugView::Accumulated | DebugView::Sample => color,
    }
}

/// Exposure, curve and encoding of one display pixel (alpha is always 1).
pub fn tonemap_pixel(linear: Vec3, exposure_ev: f32) -> Vec4 {
    let exposed = finite_or_zero(finite_or_zero(linear) * exposure_ev.exp2());
    to_srgb(tonemap_aces(exposed)).extend(1.0)
}

/// Color of the diagnostic UV gradient at output pixel (`x`, `y`).
pub fn test_pattern(x: u32, y: u32, width: u32, height: u32) -> Vec4 {
    Vec4::new(
        x as f32 / width.max(1) as f32,
        y as f32 / height.max(1) as f32,
        1.0,
        1.0,
    )
}

/// Nearest internal texel for output pixel `p`.
pub fn resample_nearest(p: (u32, u32), output: (u32, u32), internal: (u32, u32)) -> (u32, u32) {
    let axis = |p: u32, out: u32, inp: u32| {
        let q = (p as f32 * inp as f32 / out.max(1) as f32) as u32;
        q.min(inp.saturating_sub(1))
    };
    (axis(p.0, output.0, internal.0), axis(p.1, output.1, internal.1))
}

/// Quantize a `[0, 1]` color to 8-bit RGBA.
pub fn to_rgba8(c: Vec4) -> [u8; 4] {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    [q(c.x), q(c.y), q(c.z), q(c.w)]
}
