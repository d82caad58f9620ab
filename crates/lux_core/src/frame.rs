//! Per-frame planning shared by the CPU and GPU pipelines.

use crate::settings::{DebugView, Settings};
use bytemuck::{Pod, Zeroable};
use lux_math::CameraBasis;
use serde::Serialize;

/// Step sizes of the three à-trous passes.
pub const ATROUS_STEPS: [u32; 3] = [1, 2, 4];

/// Compute workgroup edge length used by every stage.
pub const WORKGROUP_SIZE: u32 = 8;

/// Number of workgroups needed to cover `size` pixels on one axis.
pub fn dispatch_count(size: u32) -> u32 {
    size.div_ceil(WORKGROUP_SIZE)
}

/// Pipeline stages in issue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Clear,
    Trace,
    Accumulate,
    Denoise,
    Tonemap,
}

impl Stage {
    pub const ALL: [Stage; 5] = [Stage::Clear, Stage::Trace, Stage::Accumulate, Stage::Denoise, Stage::Tonemap];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Clear => "clear",
            Stage::Trace => "trace",
            Stage::Accumulate => "accumulate",
            Stage::Denoise => "denoise",
            Stage::Tonemap => "tonemap",
        }
    }
}

/// What a single `render` call will do.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FramePlan {
    /// Zero the accumulation buffers before anything else.
    pub clear: bool,
    /// Run trace, accumulate, denoise (if enabled) and tonemap.
    pub trace: bool,
    pub denoise: bool,
    /// Write a UV gradient instead of the image; nothing else runs.
    pub test_pattern: bool,
    /// Accumulated-sample index of this frame's first sample.
    pub sample_base: u64,
    pub spp: u32,
    pub view: DebugView,
}

impl FramePlan {
    /// A plan that does no work.
    pub fn idle() -> Self {
        Self {
            clear: false,
            trace: false,
            denoise: false,
            test_pattern: false,
            sample_base: 0,
            spp: 1,
            view: DebugView::Denoised,
        }
    }

    /// Stages to dispatch, in order.
    pub fn stages(&self) -> Vec<Stage> {
        if self.test_pattern {
            return vec![Stage::Tonemap];
        }

        let mut stages = Vec::with_capacity(5);
        if self.clear {
            stages.push(Stage::Clear);
        }
        if self.trace {
            stages.push(Stage::Trace);
            stages.push(Stage::Accumulate);
            if self.denoise {
                stages.push(Stage::Denoise);
            }
            stages.push(Stage::Tonemap);
        }
        stages
    }

    /// Buffer the tonemap stage reads for color views.
    pub fn color_source(&self) -> ColorSource {
        match self.view {
            DebugView::Sample => ColorSource::Sample,
            DebugView::Accumulated => ColorSource::Accumulated,
            _ if self.denoise => ColorSource::Denoised,
            _ => ColorSource::Accumulated,
        }
    }
}

/// HDR input of the tonemap stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSource {
    Accumulated,
    Sample,
    Denoised,
}

/// Outcome of one `render` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    pub plan: FramePlan,
    pub recreated_internal: bool,
    pub recreated_output: bool,
}

impl FrameReport {
    pub fn idle() -> Self {
        Self {
            plan: FramePlan::idle(),
            recreated_internal: false,
            recreated_output: false,
        }
    }

    /// Whether new samples were traced and accumulated.
    pub fn traced(&self) -> bool {
        self.plan.trace && !self.plan.test_pattern
    }
}

/// Viewport and internal resolution currently allocated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub viewport: (u32, u32),
    pub internal: (u32, u32),
}

/// Which resources must be (re)created to render at a new size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizePlan {
    pub resolution: Resolution,
    pub recreate_internal: bool,
    pub recreate_output: bool,
}

impl ResizePlan {
    /// Decide what to reallocate for `viewport`.
    ///
    /// Internal images depend only on the scaled size; the output image
    /// depends only on the viewport. Invalid (missing) resources always
    /// count as changed.
    pub fn new(
        current: Resolution,
        internal_valid: bool,
        output_valid: bool,
        viewport: (u32, u32),
        settings: &Settings,
    ) -> Self {
        let viewport = (viewport.0.max(1), viewport.1.max(1));
        let internal = settings.internal_size(viewport);

        Self {
            resolution: Resolution { viewport, internal },
            recreate_internal: !internal_valid || internal != current.internal,
            recreate_output: !output_valid || viewport != current.viewport,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.recreate_internal && !self.recreate_output
    }
}

/// Snapshot of the tracer's state for display by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Stats {
    pub internal_width: u32,
    pub internal_height: u32,
    pub accumulated_samples: u64,
    pub ms_trace: f32,
    pub ms_accumulate: f32,
    pub ms_denoise: f32,
    pub ms_tonemap: f32,
    pub using_scene: bool,
    pub triangle_count: u32,
    pub node_count: u32,
    pub material_count: u32,
}

/// Per-frame uniform block shared by every stage (112 bytes).
///
/// Rows are 16 bytes; `vec3` fields are followed by a scalar so the WGSL
/// struct has the same layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuFrameParams {
    pub internal_size: [u32; 2],
    pub output_size: [u32; 2],
    pub sample_base: u32,
    pub spp: u32,
    pub has_scene: u32,
    pub texture_count: u32,
    pub cam_pos: [f32; 3],
    pub tan_half_fov_y: f32,
    pub cam_forward: [f32; 3],
    pub aspect: f32,
    pub cam_right: [f32; 3],
    pub exposure_ev: f32,
    pub cam_up: [f32; 3],
    pub view: u32,
    pub test_pattern: u32,
    pub sigma_n: f32,
    pub sigma_z: f32,
    pub _pad: u32,
}

impl GpuFrameParams {
    pub fn new(
        plan: &FramePlan,
        resolution: Resolution,
        camera: &CameraBasis,
        exposure_ev: f32,
        has_scene: bool,
        texture_count: u32,
    ) -> Self {
        let (iw, ih) = resolution.internal;

        Self {
            internal_size: [iw, ih],
            output_size: [resolution.viewport.0, resolution.viewport.1],
            // The shader hash works on 32 bits; wrap like the counter would
            sample_base: plan.sample_base as u32,
            spp: plan.spp,
            has_scene: has_scene as u32,
            texture_count,
            cam_pos: camera.position.to_array(),
            tan_half_fov_y: camera.tan_half_fov_y,
            cam_forward: camera.forward.to_array(),
            aspect: iw as f32 / ih.max(1) as f32,
            cam_right: camera.right.to_array(),
            exposure_ev,
            cam_up: camera.up.to_array(),
            view: plan.view.index(),
            test_pattern: plan.test_pattern as u32,
            sigma_n: crate::postprocess::SIGMA_N,
            sigma_z: crate::postprocess::SIGMA_Z,
            _pad: 0,
        }
    }
}
