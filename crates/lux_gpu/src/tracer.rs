//! The GPU path tracer context.

use lux_core::accumulation::{Accumulator, Phase, ResetReason};
use lux_core::frame::{FrameReport, GpuFrameParams, Resolution, Stage, Stats, ATROUS_STEPS};
use lux_core::{pack_scene, BvhBuilder, MaterialInput, MedianSplitBuilder, Settings, TriangleInput};
use lux_math::CameraBasis;

use crate::context::{check_limits, GpuContext};
use crate::error::{TracerError, TracerResult};
use crate::pipelines::{BindingSources, FrameBindings, FrameUniforms, StagePipelines};
use crate::resources::ResourceManager;
use crate::scene_buffers::{BaseColorDefaults, SceneBuffers, TextureHandle};
use crate::timers::StageTimers;

/// Progressive path tracer running the five compute stages on a wgpu device.
///
/// Call [`PathTracer::render`] once per host frame; samples accumulate until
/// the camera, scene, resolution or relevant settings change.
pub struct PathTracer {
    ctx: GpuContext,
    settings: Settings,
    accumulator: Accumulator,
    builder: Box<dyn BvhBuilder + Send + Sync>,
    pipelines: StagePipelines,
    uniforms: FrameUniforms,
    defaults: BaseColorDefaults,
    resources: ResourceManager,
    placeholder: SceneBuffers,
    scene: Option<SceneBuffers>,
    scene_generation: u64,
    bindings: Option<FrameBindings>,
    timers: StageTimers,
    stats: Stats,
}

impl PathTracer {
    pub fn new(ctx: GpuContext) -> TracerResult<Self> {
        Self::with_builder(ctx, MedianSplitBuilder::default())
    }

    /// Create a context on its own headless device.
    pub fn new_headless() -> TracerResult<Self> {
        Self::new(GpuContext::new_blocking()?)
    }

    /// Use a different BVH construction strategy.
    pub fn with_builder<B: BvhBuilder + Send + Sync + 'static>(ctx: GpuContext, builder: B) -> TracerResult<Self> {
        check_limits(&ctx.device.limits())?;

        let texture_slots = ctx.texture_slots();
        let pipelines = StagePipelines::new(&ctx.device, texture_slots);
        let uniforms = FrameUniforms::new(&ctx.device);
        let defaults = BaseColorDefaults::new(&ctx.device, &ctx.queue);
        let placeholder = SceneBuffers::placeholder(&ctx.device);
        let timers = StageTimers::new(&ctx);

        log::info!(
            "Path tracer ready: {} texture slots, {} stage(s) unavailable, stage timing {}",
            texture_slots,
            pipelines.errors().len(),
            if timers.is_enabled() { "on" } else { "off" }
        );

        Ok(Self {
            ctx,
            settings: Settings::default(),
            accumulator: Accumulator::new(),
            builder: Box::new(builder),
            pipelines,
            uniforms,
            defaults,
            resources: ResourceManager::new(),
            placeholder,
            scene: None,
            scene_generation: 0,
            bindings: None,
            timers,
            stats: Stats::default(),
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Settings are read at the start of the next `render`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn set_camera(&mut self, camera: CameraBasis) {
        self.accumulator.set_camera(camera);
    }

    pub fn request_reset(&mut self) {
        self.accumulator.request_reset(ResetReason::Requested);
    }

    /// Replace the current scene.
    ///
    /// Zero triangles or zero materials clears the scene. Packing errors
    /// leave the previous scene current; a device allocation failure leaves
    /// no scene.
    pub fn upload_scene(
        &mut self,
        triangles: &[TriangleInput],
        materials: &[MaterialInput<TextureHandle>],
    ) -> TracerResult<()> {
        let Some(packed) = pack_scene(triangles, materials, self.pipelines.texture_slots(), self.builder.as_ref())?
        else {
            self.clear_scene();
            return Ok(());
        };

        // The previous scene's buffers go before the new ones are created
        self.drop_scene();

        let buffers = match SceneBuffers::upload(&self.ctx.device, &packed) {
            Ok(buffers) => buffers,
            Err(err) => {
                self.accumulator.scene_changed(false);
                return Err(err);
            }
        };

        log::info!(
            "Uploaded scene: {} triangles, {} BVH nodes (depth {}), {} materials, {} texture slots",
            buffers.triangle_count,
            buffers.node_count,
            packed.bvh_depth,
            buffers.material_count,
            buffers.textures.len()
        );

        self.scene = Some(buffers);
        self.accumulator.scene_changed(true);
        Ok(())
    }

    pub fn clear_scene(&mut self) {
        self.drop_scene();
        self.accumulator.scene_changed(false);
    }

    fn drop_scene(&mut self) {
        self.bindings = None;
        self.scene = None;
        self.scene_generation += 1;
    }

    pub fn has_scene(&self) -> bool {
        self.scene.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.accumulator.phase()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn resolution(&self) -> Resolution {
        self.resources.resolution()
    }

    /// Stage build failures; those stages are skipped every frame.
    pub fn pipeline_errors(&self) -> &[TracerError] {
        self.pipelines.errors()
    }

    /// Whether `stage` compiled on this device.
    pub fn stage_available(&self, stage: Stage) -> bool {
        self.pipelines.stage(stage).is_ready()
    }

    /// The display image, once allocated. Valid until the next `render`.
    pub fn output(&self) -> Option<&wgpu::TextureView> {
        self.resources.output().map(|o| o.view())
    }

    pub fn output_texture(&self) -> Option<&wgpu::Texture> {
        self.resources.output().map(|o| o.texture())
    }

    /// Run one frame for a `viewport_width` x `viewport_height` output.
    ///
    /// Allocation failures release all images and return an error; the next
    /// call retries.
    pub fn render(&mut self, viewport_width: u32, viewport_height: u32) -> TracerResult<FrameReport> {
        self.accumulator.apply_settings(&mut self.settings);
        if !self.settings.enabled {
            return Ok(FrameReport::idle());
        }

        let resize = match self
            .resources
            .ensure(&self.ctx.device, (viewport_width, viewport_height), &self.settings)
        {
            Ok(resize) => resize,
            Err(err) => {
                self.bindings = None;
                return Err(err);
            }
        };
        if resize.recreate_internal {
            self.accumulator.request_reset(ResetReason::ResourcesReallocated);
        }
        self.refresh_bindings()?;

        let timer_slot = self.timers.begin_frame(&self.ctx.device);

        let plan = self.accumulator.begin_frame(&self.settings);
        let resolution = self.resources.resolution();
        let camera = self.accumulator.camera();
        let texture_count = self.scene.as_ref().map_or(0, |s| s.textures.len() as u32);
        let params = GpuFrameParams::new(
            &plan,
            resolution,
            &camera,
            self.settings.exposure_ev,
            self.scene.is_some(),
            texture_count,
        );
        self.ctx
            .queue
            .write_buffer(&self.uniforms.params, 0, bytemuck::bytes_of(&params));

        let bindings = self.bindings.as_ref().ok_or(TracerError::NoOutput)?;
        let stages = &self.pipelines;
        let internal = resolution.internal;

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lux_frame"),
        });

        for stage in plan.stages() {
            let writes = |first, last| self.timers.pass_writes(timer_slot, stage, first, last);

            let ran = match stage {
                Stage::Clear => stages.clear.dispatch(&mut encoder, &[&bindings.clear], internal, None),
                Stage::Trace => stages.trace.dispatch(
                    &mut encoder,
                    &[&bindings.trace, &bindings.scene],
                    internal,
                    writes(true, true),
                ),
                Stage::Accumulate => {
                    stages
                        .accumulate
                        .dispatch(&mut encoder, &[&bindings.accumulate], internal, writes(true, true))
                }
                Stage::Denoise => {
                    let last = ATROUS_STEPS.len() - 1;
                    let mut ran = true;
                    for (i, group) in bindings.atrous.iter().enumerate() {
                        ran &= stages
                            .atrous
                            .dispatch(&mut encoder, &[group], internal, writes(i == 0, i == last));
                    }
                    ran
                }
                Stage::Tonemap => stages.tonemap.dispatch(
                    &mut encoder,
                    &[bindings.tonemap(plan.color_source())],
                    resolution.viewport,
                    writes(true, true),
                ),
            };

            if ran {
                self.timers.mark_written(timer_slot, stage);
            }
            if stage == Stage::Accumulate {
                self.accumulator.finish_accumulate(plan.spp);
            }
        }

        self.timers.resolve(&mut encoder, timer_slot);
        self.ctx.queue.submit(Some(encoder.finish()));
        self.timers.after_submit(timer_slot);

        if plan.trace {
            self.accumulator.end_frame();
        }
        self.update_stats();

        Ok(FrameReport {
            plan,
            recreated_internal: resize.recreate_internal,
            recreated_output: resize.recreate_output,
        })
    }

    fn refresh_bindings(&mut self) -> TracerResult<()> {
        let key = (self.resources.generation(), self.scene_generation);
        if self.bindings.as_ref().is_some_and(|b| b.key == key) {
            return Ok(());
        }

        let (Some(targets), Some(output)) = (self.resources.internal(), self.resources.output()) else {
            return Err(TracerError::NoOutput);
        };

        log::debug!("Rebuilding bind groups");
        self.bindings = Some(FrameBindings::new(
            &self.ctx.device,
            &self.pipelines,
            key,
            BindingSources {
                uniforms: &self.uniforms,
                targets,
                output,
                scene: self.scene.as_ref().unwrap_or(&self.placeholder),
                defaults: &self.defaults,
            },
        ));
        Ok(())
    }

    fn update_stats(&mut self) {
        let (iw, ih) = self.resources.resolution().internal;
        let scene = self.scene.as_ref();

        self.stats = Stats {
            internal_width: iw,
            internal_height: ih,
            accumulated_samples: self.accumulator.accumulated_samples(),
            ms_trace: self.timers.ms(Stage::Trace),
            ms_accumulate: self.timers.ms(Stage::Accumulate),
            ms_denoise: if self.settings.denoise_enabled() {
                self.timers.ms(Stage::Denoise)
            } else {
                0.0
            },
            ms_tonemap: self.timers.ms(Stage::Tonemap),
            using_scene: scene.is_some(),
            triangle_count: scene.map_or(0, |s| s.triangle_count),
            node_count: scene.map_or(0, |s| s.node_count),
            material_count: scene.map_or(0, |s| s.material_count),
        };
    }

    /// Copy the display image back to host memory as tightly packed RGBA8.
    pub fn read_output_rgba8(&self) -> TracerResult<Vec<u8>> {
        let output = self.resources.output().ok_or(TracerError::NoOutput)?;
        let (width, height) = output.size();

        let unpadded = width * 4;
        let padded = unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let device = &self.ctx.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lux_output_readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lux_output_readback"),
        });
        encoder.copy_texture_to_buffer(
            output.texture().as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.ctx.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| TracerError::Readback(e.to_string()))?
            .map_err(|e| TracerError::Readback(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();
        buffer.destroy();

        Ok(pixels)
    }
}
