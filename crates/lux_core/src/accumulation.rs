//! Accumulation/reset state machine.
//!
//! Decides, once per frame, whether the running average must be cleared and
//! whether new samples are traced. Inputs are the host's settings, the
//! camera basis and scene/resource events; output is a [`FramePlan`].

use crate::frame::FramePlan;
use crate::settings::Settings;
use lux_math::CameraBasis;

/// Observable state of the accumulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Disabled, or no scene is loaded.
    Idle,
    Accumulating,
    /// The next frame starts with a clear.
    ResetPending,
    Paused,
    /// Paused with one pass requested.
    Stepping,
}

/// Why the last reset was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetReason {
    SceneChanged,
    RenderScaleChanged,
    ResourcesReallocated,
    CameraMoved,
    SamplesPerFrameChanged,
    Unpaused,
    Enabled,
    Requested,
}

/// Settings fields whose edges trigger resets.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Tracked {
    enabled: bool,
    paused: bool,
    spp: u32,
    render_scale: f32,
}

impl Tracked {
    fn of(settings: &Settings) -> Self {
        Self {
            enabled: settings.enabled,
            paused: settings.paused,
            spp: settings.spp(),
            render_scale: settings.scale(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Accumulator {
    camera: Option<CameraBasis>,
    previous: Tracked,
    has_scene: bool,
    reset_pending: bool,
    last_reset: Option<ResetReason>,
    step_requested: bool,
    accumulated_samples: u64,
    frame_index: u64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator {
    pub fn new() -> Self {
        Self {
            camera: None,
            previous: Tracked::of(&Settings::default()),
            has_scene: false,
            // Fresh buffers hold garbage until the first clear
            reset_pending: true,
            last_reset: None,
            step_requested: false,
            accumulated_samples: 0,
            frame_index: 0,
        }
    }

    pub fn request_reset(&mut self, reason: ResetReason) {
        if !self.reset_pending {
            log::debug!("Accumulation reset: {:?}", reason);
        }
        self.reset_pending = true;
        self.last_reset = Some(reason);
    }

    /// Record the host camera, resetting when it moved beyond the
    /// thresholds. The first camera ever set counts as a move.
    pub fn set_camera(&mut self, camera: CameraBasis) {
        let moved = self.camera.map_or(true, |previous| previous.differs_from(&camera));
        if moved {
            self.request_reset(ResetReason::CameraMoved);
        }
        self.camera = Some(camera);
    }

    /// Active camera, or the fixed fallback before the host set one.
    pub fn camera(&self) -> CameraBasis {
        self.camera.unwrap_or_else(CameraBasis::fallback)
    }

    pub fn has_camera(&self) -> bool {
        self.camera.is_some()
    }

    /// A scene was uploaded (`present = true`) or cleared.
    pub fn scene_changed(&mut self, present: bool) {
        self.has_scene = present;
        self.request_reset(ResetReason::SceneChanged);
    }

    pub fn has_scene(&self) -> bool {
        self.has_scene
    }

    /// Consume one-shot settings flags and react to edges since last frame.
    ///
    /// `reset_accumulation` and `step_once` are cleared here; a step request
    /// also sets `paused`.
    pub fn apply_settings(&mut self, settings: &mut Settings) {
        if settings.reset_accumulation {
            settings.reset_accumulation = false;
            self.request_reset(ResetReason::Requested);
        }

        if settings.step_once {
            settings.step_once = false;
            settings.paused = true;
            self.step_requested = true;
        }

        let current = Tracked::of(settings);
        let previous = self.previous;

        if current.enabled && !previous.enabled {
            self.request_reset(ResetReason::Enabled);
        }
        if previous.paused && !current.paused {
            self.request_reset(ResetReason::Unpaused);
        }
        if current.spp != previous.spp {
            self.request_reset(ResetReason::SamplesPerFrameChanged);
        }
        if current.render_scale != previous.render_scale {
            self.request_reset(ResetReason::RenderScaleChanged);
        }

        self.previous = current;
    }

    /// Plan this frame's work and consume the pending reset and step.
    ///
    /// A pending clear runs even while paused. Call after resources were
    /// ensured so reallocation resets are included.
    pub fn begin_frame(&mut self, settings: &Settings) -> FramePlan {
        if !settings.enabled {
            return FramePlan::idle();
        }

        let mut plan = FramePlan {
            spp: settings.spp(),
            view: settings.view,
            denoise: settings.denoise_enabled(),
            ..FramePlan::idle()
        };

        if settings.force_test_pattern {
            plan.test_pattern = true;
            return plan;
        }

        if self.reset_pending {
            plan.clear = true;
            self.reset_pending = false;
            self.accumulated_samples = 0;
        }

        plan.trace = !settings.paused || self.step_requested;
        if plan.trace {
            self.step_requested = false;
        }
        plan.sample_base = self.accumulated_samples;

        plan
    }

    /// Accumulation finished; advance the counter.
    pub fn finish_accumulate(&mut self, spp: u32) {
        self.accumulated_samples += u64::from(spp.max(1));
    }

    /// The traced frame completed.
    pub fn end_frame(&mut self) {
        self.frame_index += 1;
    }

    pub fn accumulated_samples(&self) -> u64 {
        self.accumulated_samples
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn last_reset(&self) -> Option<ResetReason> {
        self.last_reset
    }

    pub fn is_reset_pending(&self) -> bool {
        self.reset_pending
    }

    pub fn phase(&self) -> Phase {
        if !self.previous.enabled || !self.has_scene {
            Phase::Idle
        } else if self.reset_pending {
            Phase::ResetPending
        } else if self.previous.paused && self.step_requested {
            Phase::Stepping
        } else if self.previous.paused {
            Phase::Paused
        } else {
            Phase::Accumulating
        }
    }
}
