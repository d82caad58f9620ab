//! CPU evaluation of the five-stage progressive pipeline.
//!
//! `CpuPathTracer` exposes the same context API as the GPU tracer and runs
//! every stage over plain buffers with rayon. It is the reference the GPU
//! output is checked against, and the fallback when no adapter exists.

use std::time::Instant;

use lux_core::accumulation::{Accumulator, Phase, ResetReason};
use lux_core::frame::{ColorSource, FramePlan, FrameReport, GpuFrameParams, ResizePlan, Resolution, Stage, Stats, ATROUS_STEPS};
use lux_core::postprocess::{
    accumulate, debug_view_color, edge_weight, resample_nearest, test_pattern, to_rgba8, tonemap_pixel,
    ATROUS_WEIGHTS,
};
use lux_core::sampling::primary_ray;
use lux_core::shading::{oct_decode, shade, surface_normal, surface_uv, PixelSample, SampleSum, SurfaceHit};
use lux_core::{
    pack_scene, BvhBuilder, MaterialInput, MedianSplitBuilder, PackedScene, SceneError, Settings, TriangleInput,
    MAX_TEXTURE_SLOTS,
};
use lux_math::{CameraBasis, Ray, Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::buffer::ImageBuffer;
use crate::texture::TextureRef;
use crate::traverse::SceneView;

/// Internal-resolution buffers, one texel per traced pixel.
#[derive(Clone, Debug)]
pub struct InternalImages {
    pub sample: ImageBuffer<Vec4>,
    pub accum: ImageBuffer<Vec4>,
    pub count: ImageBuffer<u32>,
    pub albedo: ImageBuffer<Vec4>,
    /// Octahedral-encoded normals.
    pub normal: ImageBuffer<Vec2>,
    pub depth: ImageBuffer<f32>,
    pub rough_metal: ImageBuffer<Vec2>,
    pub denoise_a: ImageBuffer<Vec4>,
    pub denoise_b: ImageBuffer<Vec4>,
}

impl InternalImages {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            sample: ImageBuffer::new(width, height, Vec4::ZERO),
            accum: ImageBuffer::new(width, height, Vec4::ZERO),
            count: ImageBuffer::new(width, height, 0),
            albedo: ImageBuffer::new(width, height, Vec4::ZERO),
            normal: ImageBuffer::new(width, height, Vec2::ZERO),
            depth: ImageBuffer::new(width, height, 0.0),
            rough_metal: ImageBuffer::new(width, height, Vec2::ZERO),
            denoise_a: ImageBuffer::new(width, height, Vec4::ZERO),
            denoise_b: ImageBuffer::new(width, height, Vec4::ZERO),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.sample.size()
    }
}

/// CPU path tracer context.
pub struct CpuPathTracer {
    settings: Settings,
    accumulator: Accumulator,
    builder: Box<dyn BvhBuilder + Send + Sync>,
    scene: Option<PackedScene<TextureRef>>,
    resolution: Resolution,
    internal: Option<InternalImages>,
    output: Option<ImageBuffer<[u8; 4]>>,
    stats: Stats,
}

impl Default for CpuPathTracer {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuPathTracer {
    pub fn new() -> Self {
        Self::with_builder(MedianSplitBuilder::default())
    }

    /// Use a different BVH construction strategy.
    pub fn with_builder<B: BvhBuilder + Send + Sync + 'static>(builder: B) -> Self {
        Self {
            settings: Settings::default(),
            accumulator: Accumulator::new(),
            builder: Box::new(builder),
            scene: None,
            resolution: Resolution::default(),
            internal: None,
            output: None,
            stats: Stats::default(),
        }
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
    /// Zero triangles or zero materials clears the scene instead. On error
    /// the previous scene stays current.
    pub fn upload_scene(
        &mut self,
        triangles: &[TriangleInput],
        materials: &[MaterialInput<TextureRef>],
    ) -> Result<(), SceneError> {
        match pack_scene(triangles, materials, MAX_TEXTURE_SLOTS, self.builder.as_ref())? {
            Some(packed) => {
                log::info!(
                    "Uploaded scene: {} triangles, {} BVH nodes (depth {}), {} materials, {} texture slots",
                    packed.triangle_count(),
                    packed.node_count(),
                    packed.bvh_depth,
                    packed.material_count(),
                    packed.textures.len()
                );
                self.scene = Some(packed);
                self.accumulator.scene_changed(true);
            }
            None => self.clear_scene(),
        }
        Ok(())
    }

    pub fn clear_scene(&mut self) {
        self.scene = None;
        self.accumulator.scene_changed(false);
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
        self.resolution
    }

    /// Tonemapped display image, once one has been allocated.
    pub fn output(&self) -> Option<&ImageBuffer<[u8; 4]>> {
        self.output.as_ref()
    }

    pub fn read_output_rgba8(&self) -> Option<Vec<u8>> {
        self.output.as_ref().map(ImageBuffer::to_rgba_bytes)
    }

    pub fn internal_images(&self) -> Option<&InternalImages> {
        self.internal.as_ref()
    }

    /// Run one frame for a `viewport_width` x `viewport_height` output.
    pub fn render(&mut self, viewport_width: u32, viewport_height: u32) -> FrameReport {
        self.accumulator.apply_settings(&mut self.settings);
        if !self.settings.enabled {
            return FrameReport::idle();
        }

        let resize = ResizePlan::new(
            self.resolution,
            self.internal.is_some(),
            self.output.is_some(),
            (viewport_width, viewport_height),
            &self.settings,
        );
        let (iw, ih) = resize.resolution.internal;
        let (vw, vh) = resize.resolution.viewport;

        if resize.recreate_internal {
            log::debug!("Allocating internal images {}x{}", iw, ih);
            self.internal = Some(InternalImages::new(iw, ih));
            self.accumulator.request_reset(ResetReason::ResourcesReallocated);
        }
        if resize.recreate_output {
            log::debug!("Allocating output image {}x{}", vw, vh);
            self.output = Some(ImageBuffer::new(vw, vh, [0, 0, 0, 255]));
        }
        self.resolution = resize.resolution;

        let plan = self.accumulator.begin_frame(&self.settings);
        let camera = self.accumulator.camera();
        let texture_count = self.scene.as_ref().map_or(0, |s| s.textures.len() as u32);
        let params = GpuFrameParams::new(
            &plan,
            self.resolution,
            &camera,
            self.settings.exposure_ev,
            self.scene.is_some(),
            texture_count,
        );

        let mut timings = StageTimings::default();

        if let (Some(images), Some(output)) = (self.internal.as_mut(), self.output.as_mut()) {
            for stage in plan.stages() {
                let start = Instant::now();
                match stage {
                    Stage::Clear => clear(images),
                    Stage::Trace => trace(images, self.scene.as_ref(), &params, &camera),
                    Stage::Accumulate => {
                        accumulate_samples(images);
                        self.accumulator.finish_accumulate(plan.spp);
                    }
                    Stage::Denoise => denoise(images, &params),
                    Stage::Tonemap => tonemap(images, output, &plan, &params),
                }
                timings.record(stage, start.elapsed().as_secs_f32() * 1000.0);
            }
        }

        if plan.trace {
            self.accumulator.end_frame();
            self.stats.ms_trace = timings.trace;
            self.stats.ms_accumulate = timings.accumulate;
            self.stats.ms_denoise = if plan.denoise { timings.denoise } else { 0.0 };
            self.stats.ms_tonemap = timings.tonemap;
        }
        self.update_stats();

        FrameReport {
            plan,
            recreated_internal: resize.recreate_internal,
            recreated_output: resize.recreate_output,
        }
    }

    fn update_stats(&mut self) {
        let (iw, ih) = self.resolution.internal;
        self.stats.internal_width = iw;
        self.stats.internal_height = ih;
        self.stats.accumulated_samples = self.accumulator.accumulated_samples();
        self.stats.using_scene = self.scene.is_some();
        self.stats.triangle_count = self.scene.as_ref().map_or(0, |s| s.triangle_count() as u32);
        self.stats.node_count = self.scene.as_ref().map_or(0, |s| s.node_count() as u32);
        self.stats.material_count = self.scene.as_ref().map_or(0, |s| s.material_count() as u32);
    }
}

/// Wall-clock milliseconds per stage for the current frame.
#[derive(Default)]
struct StageTimings {
    trace: f32,
    accumulate: f32,
    denoise: f32,
    tonemap: f32,
}

impl StageTimings {
    fn record(&mut self, stage: Stage, ms: f32) {
        match stage {
            Stage::Clear => {}
            Stage::Trace => self.trace = ms,
            Stage::Accumulate => self.accumulate = ms,
            Stage::Denoise => self.denoise = ms,
            Stage::Tonemap => self.tonemap = ms,
        }
    }
}

fn clear(images: &mut InternalImages) {
    images.accum.fill(Vec4::ZERO);
    images.sample.fill(Vec4::ZERO);
    images.count.fill(0);
    images.denoise_a.fill(Vec4::ZERO);
    images.denoise_b.fill(Vec4::ZERO);
}

fn trace(
    images: &mut InternalImages,
    scene: Option<&PackedScene<TextureRef>>,
    params: &GpuFrameParams,
    camera: &CameraBasis,
) {
    let (width, height) = images.size();
    let spp = params.spp.max(1);

    let samples: Vec<PixelSample> = (0..width * height)
        .into_par_iter()
        .map(|i| {
            let (x, y) = (i % width, i / width);
            let mut sum = SampleSum::default();

            for s in 0..spp {
                let ray = primary_ray(camera, x, y, width, height, params.sample_base.wrapping_add(s));
                match scene.and_then(|scene| shade_primary(scene, camera, &ray)) {
                    Some((radiance, hit, depth)) => sum.add_hit(radiance, &hit, depth),
                    None => sum.add_miss(ray.direction),
                }
            }

            sum.finish(spp)
        })
        .collect();

    for (i, px) in samples.into_iter().enumerate() {
        images.sample.pixels[i] = px.radiance.extend(1.0);
        images.albedo.pixels[i] = px.albedo.extend(1.0);
        images.normal.pixels[i] = px.normal;
        images.depth.pixels[i] = px.depth;
        images.rough_metal.pixels[i] = px.rough_metal;
    }
}

/// Radiance, surface and view depth of the primary hit, if any.
fn shade_primary(
    scene: &PackedScene<TextureRef>,
    camera: &CameraBasis,
    ray: &Ray,
) -> Option<(Vec3, SurfaceHit, f32)> {
    let view = SceneView {
        nodes: &scene.nodes,
        indices: &scene.indices,
        triangles: &scene.triangles,
    };

    let hit = view.closest_hit(ray.origin, ray.direction, f32::INFINITY)?;
    let tri = &scene.triangles[hit.triangle as usize];
    let material = scene.materials.get(tri.material as usize)?;

    let mut albedo = material.base_color().truncate();
    if let Some(texture) = material.base_color_slot().and_then(|slot| scene.textures.get(slot as usize)) {
        albedo *= texture.0.sample(surface_uv(tri, hit.u, hit.v));
    }

    let position = ray.at(hit.t);
    let surface = SurfaceHit {
        position,
        normal: surface_normal(tri, hit.u, hit.v),
        albedo,
        emissive: material.emissive(),
        roughness: material.roughness(),
        metallic: material.metallic(),
    };

    let radiance = shade(ray.direction, &surface, |o, d, t| view.occluded(o, d, t));
    let depth = (position - camera.position).dot(camera.forward);

    Some((radiance, surface, depth))
}

fn accumulate_samples(images: &mut InternalImages) {
    images
        .accum
        .pixels
        .par_iter_mut()
        .zip(images.count.pixels.par_iter_mut())
        .zip(images.sample.pixels.par_iter())
        .for_each(|((avg, count), sample)| {
            *avg = accumulate(*avg, *count, *sample);
            *count += 1;
        });
}

fn denoise(images: &mut InternalImages, params: &GpuFrameParams) {
    let [s0, s1, s2] = ATROUS_STEPS;
    let guide = (&images.normal, &images.depth);

    atrous_pass(&images.accum, &mut images.denoise_a, guide, s0, params);
    atrous_pass(&images.denoise_a, &mut images.denoise_b, guide, s1, params);
    atrous_pass(&images.denoise_b, &mut images.denoise_a, guide, s2, params);
}

/// One 5x5 edge-avoiding pass with taps spaced `step` pixels apart.
fn atrous_pass(
    input: &ImageBuffer<Vec4>,
    output: &mut ImageBuffer<Vec4>,
    (normal, depth): (&ImageBuffer<Vec2>, &ImageBuffer<f32>),
    step: u32,
    params: &GpuFrameParams,
) {
    let (width, height) = (input.width as i64, input.height as i64);
    let step = step as i64;

    output.par_fill_with(|x, y| {
        let c0 = input.get(x, y);
        let n0 = oct_decode(normal.get(x, y));
        let z0 = depth.get(x, y);

        let mut sum = Vec4::ZERO;
        let mut wsum = 0.0;

        for (ky, wy) in ATROUS_WEIGHTS.iter().enumerate() {
            for (kx, wx) in ATROUS_WEIGHTS.iter().enumerate() {
                let qx = x as i64 + (kx as i64 - 2) * step;
                let qy = y as i64 + (ky as i64 - 2) * step;
                if qx < 0 || qy < 0 || qx >= width || qy >= height {
                    continue;
                }
                let (qx, qy) = (qx as u32, qy as u32);

                let ni = oct_decode(normal.get(qx, qy));
                let zi = depth.get(qx, qy);
                let w = wx * wy * edge_weight(n0, ni, z0, zi, params.sigma_n, params.sigma_z);

                sum += input.get(qx, qy) * w;
                wsum += w;
            }
        }

        if wsum > 0.0 {
            sum / wsum
        } else {
            c0
        }
    });
}

fn tonemap(images: &InternalImages, output: &mut ImageBuffer<[u8; 4]>, plan: &FramePlan, params: &GpuFrameParams) {
    let out_size = output.size();

    if plan.test_pattern {
        output.par_fill_with(|x, y| to_rgba8(test_pattern(x, y, out_size.0, out_size.1)));
        return;
    }

    let source = match plan.color_source() {
        ColorSource::Accumulated => &images.accum,
        ColorSource::Sample => &images.sample,
        ColorSource::Denoised => &images.denoise_a,
    };
    let in_size = images.size();

    output.par_fill_with(|x, y| {
        let (qx, qy) = resample_nearest((x, y), out_size, in_size);
        let linear = debug_view_color(
            plan.view,
            source.get(qx, qy).truncate(),
            images.albedo.get(qx, qy).truncate(),
            oct_decode(images.normal.get(qx, qy)),
            images.depth.get(qx, qy),
            images.rough_metal.get(qx, qy),
        );
        to_rgba8(tonemap_pixel(linear, params.exposure_ev))
    });
}
