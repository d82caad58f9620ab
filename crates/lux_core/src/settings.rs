//! Host-facing path tracer settings.
//!
//! Settings round-trip through serde so hosts can persist them. Values out
//! of range are clamped when read, never rejected.

use serde::{Deserialize, Serialize};

/// Lower bound of `render_scale`.
pub const MIN_RENDER_SCALE: f32 = 0.05;

/// Upper bound of `spp_per_frame`.
pub const MAX_SPP_PER_FRAME: u32 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Denoiser {
    None,
    /// Three-pass edge-avoiding à-trous blur.
    #[default]
    EdgeAwareBlur,
}

/// Which buffer the tonemap stage displays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebugView {
    #[default]
    Denoised,
    Accumulated,
    Sample,
    Albedo,
    Normal,
    Depth,
    RoughMetal,
}

impl DebugView {
    pub const ALL: [DebugView; 7] = [
        DebugView::Denoised,
        DebugView::Accumulated,
        DebugView::Sample,
        DebugView::Albedo,
        DebugView::Normal,
        DebugView::Depth,
        DebugView::RoughMetal,
    ];

    /// Index passed to the tonemap stage.
    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Parse a lowercase view name such as `"normal"` or `"rough-metal"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "denoised" => Some(DebugView::Denoised),
            "accumulated" | "accum" => Some(DebugView::Accumulated),
            "sample" => Some(DebugView::Sample),
            "albedo" => Some(DebugView::Albedo),
            "normal" => Some(DebugView::Normal),
            "depth" => Some(DebugView::Depth),
            "rough-metal" | "roughmetal" => Some(DebugView::RoughMetal),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    pub paused: bool,
    /// Run exactly one trace/accumulate pass, then stay paused.
    pub step_once: bool,
    pub spp_per_frame: u32,
    /// Internal resolution as a fraction of the viewport.
    pub render_scale: f32,
    pub exposure_ev: f32,
    pub denoiser: Denoiser,
    pub view: DebugView,
    /// One-shot request to zero the running average.
    pub reset_accumulation: bool,
    /// Replace the output with a UV gradient.
    pub force_test_pattern: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            paused: false,
            step_once: false,
            spp_per_frame: 1,
            render_scale: 1.0,
            exposure_ev: 0.0,
            denoiser: Denoiser::EdgeAwareBlur,
            view: DebugView::Denoised,
            reset_accumulation: false,
            force_test_pattern: false,
        }
    }
}

impl Settings {
    /// `spp_per_frame` clamped to `1..=8`.
    pub fn spp(&self) -> u32 {
        self.spp_per_frame.clamp(1, MAX_SPP_PER_FRAME)
    }

    /// `render_scale` clamped to `0.05..=1.0`; NaN reads as 1.
    pub fn scale(&self) -> f32 {
        if self.render_scale.is_nan() {
            return 1.0;
        }
        self.render_scale.clamp(MIN_RENDER_SCALE, 1.0)
    }

    pub fn denoise_enabled(&self) -> bool {
        self.denoiser == Denoiser::EdgeAwareBlur
    }

    /// Internal resolution for a viewport, each axis at least 1.
    pub fn internal_size(&self, viewport: (u32, u32)) -> (u32, u32) {
        let scale = self.scale();
        let axis = |v: u32| ((v.max(1) as f32 * scale).floor() as u32).max(1);
        (axis(viewport.0), axis(viewport.1))
    }
}
