//! Compute stages and their bind groups.
//!
//! Layouts are explicit so bind groups can be built even when a stage's
//! shader failed to compile. A failed stage is logged once and its dispatch
//! becomes a no-op; the remaining stages keep running.

use lux_core::frame::{dispatch_count, ColorSource, ATROUS_STEPS};
use lux_core::Stage;
use wgpu::util::DeviceExt;

use crate::error::TracerError;
use crate::resources::{InternalTargets, OutputImage, OUTPUT_FORMAT};
use crate::scene_buffers::{BaseColorDefaults, SceneBuffers};
use crate::shaders;

fn uniform() -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Uniform,
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

fn storage(read_only: bool) -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Storage { read_only },
        has_dynamic_offset: false,
        min_binding_size: None,
    }
}

fn sampled_texture() -> wgpu::BindingType {
    wgpu::BindingType::Texture {
        sample_type: wgpu::TextureSampleType::Float { filterable: true },
        view_dimension: wgpu::TextureViewDimension::D2,
        multisampled: false,
    }
}

fn output_texture() -> wgpu::BindingType {
    wgpu::BindingType::StorageTexture {
        access: wgpu::StorageTextureAccess::WriteOnly,
        format: OUTPUT_FORMAT,
        view_dimension: wgpu::TextureViewDimension::D2,
    }
}

/// Layout with `types[i]` at binding `i`.
fn layout(device: &wgpu::Device, label: &str, types: &[wgpu::BindingType]) -> wgpu::BindGroupLayout {
    let entries: Vec<_> = types
        .iter()
        .enumerate()
        .map(|(binding, &ty)| wgpu::BindGroupLayoutEntry {
            binding: binding as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty,
            count: None,
        })
        .collect();

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Bind group with `resources[i]` at binding `i`.
fn bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    resources: Vec<wgpu::BindingResource<'_>>,
) -> wgpu::BindGroup {
    let entries: Vec<_> = resources
        .into_iter()
        .enumerate()
        .map(|(binding, resource)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource,
        })
        .collect();

    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

/// One compute stage: its layouts and, if it compiled, its pipeline.
pub struct ComputeStage {
    pass_label: String,
    layouts: Vec<wgpu::BindGroupLayout>,
    pipeline: Option<wgpu::ComputePipeline>,
}

impl ComputeStage {
    fn new(
        device: &wgpu::Device,
        label: &'static str,
        source: String,
        layouts: Vec<wgpu::BindGroupLayout>,
    ) -> (Self, Option<TracerError>) {
        log::debug!("Initializing stage: {label}");

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let layout_refs: Vec<_> = layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
            compilation_options: Default::default(),
            cache: None,
        });

        let (pipeline, error) = match pollster::block_on(device.pop_error_scope()) {
            None => (Some(pipeline), None),
            Some(err) => {
                log::error!("Stage `{label}` failed to build and will be skipped: {err}");
                let error = TracerError::Pipeline {
                    stage: label,
                    reason: err.to_string(),
                };
                (None, Some(error))
            }
        };

        let stage = Self {
            pass_label: format!("lux_{label}_pass"),
            layouts,
            pipeline,
        };
        (stage, error)
    }

    pub fn is_ready(&self) -> bool {
        self.pipeline.is_some()
    }

    fn layout(&self, group: usize) -> &wgpu::BindGroupLayout {
        &self.layouts[group]
    }

    /// Record one pass covering `size` pixels. Returns whether it ran.
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_groups: &[&wgpu::BindGroup],
        size: (u32, u32),
        timestamp_writes: Option<wgpu::ComputePassTimestampWrites<'_>>,
    ) -> bool {
        let Some(pipeline) = &self.pipeline else {
            return false;
        };

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&self.pass_label),
            timestamp_writes,
        });

        pass.set_pipeline(pipeline);
        for (index, &group) in bind_groups.iter().enumerate() {
            pass.set_bind_group(index as u32, group, &[]);
        }
        pass.dispatch_workgroups(dispatch_count(size.0), dispatch_count(size.1), 1);

        true
    }
}

/// The five stages of a frame.
pub struct StagePipelines {
    pub clear: ComputeStage,
    pub trace: ComputeStage,
    pub accumulate: ComputeStage,
    pub atrous: ComputeStage,
    pub tonemap: ComputeStage,
    texture_slots: usize,
    errors: Vec<TracerError>,
}

impl StagePipelines {
    pub fn new(device: &wgpu::Device, texture_slots: usize) -> Self {
        let rw = storage(false);
        let ro = storage(true);

        let mut scene_types = vec![ro, ro, ro, ro, wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)];
        scene_types.extend(std::iter::repeat(sampled_texture()).take(texture_slots));

        let mut errors = Vec::new();
        let mut build = |label: &'static str, source: String, layouts: Vec<wgpu::BindGroupLayout>| {
            let (stage, error) = ComputeStage::new(device, label, source, layouts);
            errors.extend(error);
            stage
        };

        let clear = build(
            Stage::Clear.label(),
            shaders::clear(),
            vec![layout(device, "lux_clear", &[uniform(), rw, rw, rw, rw, rw])],
        );
        let trace = build(
            Stage::Trace.label(),
            shaders::trace(texture_slots),
            vec![
                layout(device, "lux_trace", &[uniform(), rw, rw, rw, rw, rw]),
                layout(device, "lux_trace_scene", &scene_types),
            ],
        );
        let accumulate = build(
            Stage::Accumulate.label(),
            shaders::accumulate(),
            vec![layout(device, "lux_accumulate", &[uniform(), ro, rw, rw])],
        );
        let atrous = build(
            Stage::Denoise.label(),
            shaders::atrous(),
            vec![layout(device, "lux_atrous", &[uniform(), uniform(), ro, rw, ro, ro])],
        );
        let tonemap = build(
            Stage::Tonemap.label(),
            shaders::tonemap(),
            vec![layout(device, "lux_tonemap", &[uniform(), ro, ro, ro, ro, ro, output_texture()])],
        );

        Self {
            clear,
            trace,
            accumulate,
            atrous,
            tonemap,
            texture_slots,
            errors,
        }
    }

    /// Failures recorded while building the stages.
    pub fn errors(&self) -> &[TracerError] {
        &self.errors
    }

    pub fn stage(&self, stage: Stage) -> &ComputeStage {
        match stage {
            Stage::Clear => &self.clear,
            Stage::Trace => &self.trace,
            Stage::Accumulate => &self.accumulate,
            Stage::Denoise => &self.atrous,
            Stage::Tonemap => &self.tonemap,
        }
    }

    pub fn texture_slots(&self) -> usize {
        self.texture_slots
    }
}

/// Uniform buffers that live as long as the tracer.
pub struct FrameUniforms {
    pub params: wgpu::Buffer,
    pub atrous_steps: [wgpu::Buffer; 3],
}

impl FrameUniforms {
    pub fn new(device: &wgpu::Device) -> Self {
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lux_frame_params"),
            size: std::mem::size_of::<lux_core::GpuFrameParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let atrous_steps = ATROUS_STEPS.map(|step| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lux_atrous_step"),
                contents: bytemuck::cast_slice(&[step, 0, 0, 0]),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        Self { params, atrous_steps }
    }
}

/// Bind groups for the current images and scene.
///
/// Rebuilt whenever either changes; `key` records which versions they were
/// built from.
pub struct FrameBindings {
    pub key: (u64, u64),
    pub clear: wgpu::BindGroup,
    pub trace: wgpu::BindGroup,
    pub scene: wgpu::BindGroup,
    pub accumulate: wgpu::BindGroup,
    /// accum -> A, A -> B, B -> A; the result ends up in A.
    pub atrous: [wgpu::BindGroup; 3],
    tonemap: [wgpu::BindGroup; 3],
}

pub struct BindingSources<'a> {
    pub uniforms: &'a FrameUniforms,
    pub targets: &'a InternalTargets,
    pub output: &'a OutputImage,
    pub scene: &'a SceneBuffers,
    pub defaults: &'a BaseColorDefaults,
}

impl FrameBindings {
    pub fn new(device: &wgpu::Device, stages: &StagePipelines, key: (u64, u64), src: BindingSources<'_>) -> Self {
        let t = src.targets;
        let params = || src.uniforms.params.as_entire_binding();

        let clear = bind_group(
            device,
            "lux_clear",
            stages.clear.layout(0),
            vec![
                params(),
                t.accum.binding(),
                t.sample.binding(),
                t.count.binding(),
                t.denoise_a.binding(),
                t.denoise_b.binding(),
            ],
        );

        let trace = bind_group(
            device,
            "lux_trace",
            stages.trace.layout(0),
            vec![
                params(),
                t.sample.binding(),
                t.albedo.binding(),
                t.normal.binding(),
                t.depth.binding(),
                t.rough_metal.binding(),
            ],
        );

        let mut scene_resources = vec![
            src.scene.nodes.as_entire_binding(),
            src.scene.indices.as_entire_binding(),
            src.scene.triangles.as_entire_binding(),
            src.scene.materials.as_entire_binding(),
            wgpu::BindingResource::Sampler(&src.defaults.sampler),
        ];
        scene_resources.extend(
            (0..stages.texture_slots())
                .map(|slot| wgpu::BindingResource::TextureView(src.defaults.slot_view(src.scene, slot))),
        );
        let scene = bind_group(device, "lux_trace_scene", stages.trace.layout(1), scene_resources);

        let accumulate = bind_group(
            device,
            "lux_accumulate",
            stages.accumulate.layout(0),
            vec![params(), t.sample.binding(), t.accum.binding(), t.count.binding()],
        );

        let passes = [(&t.accum, &t.denoise_a), (&t.denoise_a, &t.denoise_b), (&t.denoise_b, &t.denoise_a)];
        let atrous = std::array::from_fn(|i| {
            let (input, output) = passes[i];
            bind_group(
                device,
                "lux_atrous",
                stages.atrous.layout(0),
                vec![
                    params(),
                    src.uniforms.atrous_steps[i].as_entire_binding(),
                    input.binding(),
                    output.binding(),
                    t.normal.binding(),
                    t.depth.binding(),
                ],
            )
        });

        let tonemap = [&t.accum, &t.sample, &t.denoise_a].map(|color| {
            bind_group(
                device,
                "lux_tonemap",
                stages.tonemap.layout(0),
                vec![
                    params(),
                    color.binding(),
                    t.albedo.binding(),
                    t.normal.binding(),
                    t.depth.binding(),
                    t.rough_metal.binding(),
                    wgpu::BindingResource::TextureView(src.output.view()),
                ],
            )
        });

        Self {
            key,
            clear,
            trace,
            scene,
            accumulate,
            atrous,
            tonemap,
        }
    }

    pub fn tonemap(&self, source: ColorSource) -> &wgpu::BindGroup {
        match source {
            ColorSource::Accumulated => &self.tonemap[0],
            ColorSource::Sample => &self.tonemap[1],
            ColorSource::Denoised => &self.tonemap[2],
        }
    }
}
