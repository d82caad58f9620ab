//! End-to-end frames on a real device, checked against the CPU pipeline.
//!
//! Every test skips when no suitable adapter is available.

use lux_core::{DebugView, Denoiser, MaterialInput, Phase, Stage, TriangleInput};
use lux_gpu::{PathTracer, TextureHandle, TracerError};
use lux_math::{CameraBasis, Vec3};
use lux_renderer::CpuPathTracer;

fn camera() -> CameraBasis {
    CameraBasis::look_at(
        Vec3::new(0.3, 0.3, 2.0),
        Vec3::new(0.3, 0.3, 0.0),
        Vec3::Y,
        45.0_f32.to_radians(),
    )
}

fn triangle() -> Vec<TriangleInput> {
    vec![TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 0)]
}

fn gpu_tracer() -> Option<PathTracer> {
    let _ = env_logger::builder().is_test(true).try_init();

    match PathTracer::new_headless() {
        Ok(mut tracer) => {
            let settings = tracer.settings_mut();
            settings.enabled = true;
            settings.denoiser = Denoiser::None;
            settings.view = DebugView::Accumulated;
            tracer.set_camera(camera());
            Some(tracer)
        }
        Err(err @ (TracerError::NoAdapter | TracerError::UnsupportedDevice { .. })) => {
            log::warn!("Skipping GPU test: {err}");
            None
        }
        Err(err) => panic!("failed to create tracer: {err}"),
    }
}

fn pixel(image: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [image[i], image[i + 1], image[i + 2], image[i + 3]]
}

#[test]
fn test_one_triangle_frame() {
    let Some(mut tracer) = gpu_tracer() else { return };
    let materials: Vec<MaterialInput<TextureHandle>> = vec![MaterialInput::flat(Vec3::ONE)];

    tracer.render(64, 64).unwrap();
    let sky = tracer.read_output_rgba8().unwrap();

    tracer.upload_scene(&triangle(), &materials).unwrap();
    let report = tracer.render(64, 64).unwrap();
    assert!(report.plan.clear);
    assert_eq!(tracer.stats().accumulated_samples, 1);
    assert!(tracer.stats().using_scene);

    let output = tracer.output_texture().unwrap();
    assert_eq!(output.format(), lux_gpu::OUTPUT_FORMAT);
    assert_eq!((output.width(), output.height()), (64, 64));
    assert!(tracer.output().is_some());

    let image = tracer.read_output_rgba8().unwrap();
    assert_eq!(image.len(), 64 * 64 * 4);
    assert_ne!(pixel(&image, 64, 32, 32), pixel(&sky, 64, 32, 32));
    assert_eq!(pixel(&image, 64, 61, 2), pixel(&sky, 64, 61, 2));
    assert!(image.chunks(4).all(|p| p[3] == 255));
}

#[test]
fn test_matches_cpu_reference() {
    let Some(mut gpu) = gpu_tracer() else { return };
    let mut cpu = CpuPathTracer::new();
    {
        let settings = cpu.settings_mut();
        *settings = gpu.settings().clone();
        settings.spp_per_frame = 2;
        settings.denoiser = Denoiser::EdgeAwareBlur;
        settings.view = DebugView::Denoised;
    }
    *gpu.settings_mut() = cpu.settings().clone();
    cpu.set_camera(camera());

    let triangles = vec![
        TriangleInput::flat(Vec3::new(-2.0, 0.0, -2.0), Vec3::new(2.0, 0.0, -2.0), Vec3::new(0.0, 0.0, 2.0), 0),
        TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 1),
    ];
    cpu.upload_scene(
        &triangles,
        &[MaterialInput::flat(Vec3::splat(0.8)), MaterialInput::flat(Vec3::new(0.9, 0.2, 0.2))],
    )
    .unwrap();
    gpu.upload_scene(
        &triangles,
        &[MaterialInput::flat(Vec3::splat(0.8)), MaterialInput::flat(Vec3::new(0.9, 0.2, 0.2))],
    )
    .unwrap();

    for _ in 0..3 {
        cpu.render(48, 32);
        gpu.render(48, 32).unwrap();
    }
    assert_eq!(gpu.stats().accumulated_samples, cpu.stats().accumulated_samples);

    let a = cpu.read_output_rgba8().unwrap();
    let b = gpu.read_output_rgba8().unwrap();
    assert_eq!(a.len(), b.len());

    // Transcendentals differ slightly between host and device
    let close = a.iter().zip(&b).filter(|(x, y)| x.abs_diff(**y) <= 4).count();
    assert!(close as f32 >= 0.98 * a.len() as f32, "{close} of {} channels within 4", a.len());
}

#[test]
fn test_pause_holds_and_unpause_resets() {
    let Some(mut tracer) = gpu_tracer() else { return };
    tracer
        .upload_scene(&triangle(), &[MaterialInput::flat(Vec3::ONE)])
        .unwrap();

    tracer.render(16, 16).unwrap();
    tracer.render(16, 16).unwrap();
    assert_eq!(tracer.stats().accumulated_samples, 2);

    tracer.settings_mut().paused = true;
    let report = tracer.render(16, 16).unwrap();
    assert!(!report.traced());
    assert_eq!(tracer.stats().accumulated_samples, 2);
    assert_eq!(tracer.phase(), Phase::Paused);

    tracer.settings_mut().step_once = true;
    tracer.render(16, 16).unwrap();
    assert_eq!(tracer.stats().accumulated_samples, 3);

    tracer.settings_mut().paused = false;
    let report = tracer.render(16, 16).unwrap();
    assert!(report.plan.clear);
    assert_eq!(tracer.stats().accumulated_samples, 1);
}

#[test]
fn test_viewport_change_keeps_accumulation() {
    let Some(mut tracer) = gpu_tracer() else { return };
    tracer.settings_mut().render_scale = 0.5;

    tracer.render(40, 40).unwrap();
    tracer.render(40, 40).unwrap();

    // 41 * 0.5 still floors to 20 internal pixels
    let report = tracer.render(41, 40).unwrap();
    assert!(report.recreated_output);
    assert!(!report.recreated_internal);
    assert_eq!(tracer.stats().accumulated_samples, 3);
    assert_eq!(tracer.read_output_rgba8().unwrap().len(), 41 * 40 * 4);

    tracer.settings_mut().render_scale = 1.0;
    let report = tracer.render(41, 40).unwrap();
    assert!(report.recreated_internal);
    assert_eq!(tracer.stats().accumulated_samples, 1);
    assert_eq!((tracer.stats().internal_width, tracer.stats().internal_height), (41, 40));
}

#[test]
fn test_test_pattern_is_uv_gradient() {
    let Some(mut tracer) = gpu_tracer() else { return };
    tracer.settings_mut().force_test_pattern = true;

    let report = tracer.render(32, 16).unwrap();
    assert!(report.plan.test_pattern);
    assert!(!report.traced());

    let image = tracer.read_output_rgba8().unwrap();
    let p = pixel(&image, 32, 16, 8);
    assert!(p[0].abs_diff(128) <= 1 && p[1].abs_diff(128) <= 1);
    assert_eq!((p[2], p[3]), (255, 255));
}

#[test]
fn test_every_view_renders() {
    let Some(mut tracer) = gpu_tracer() else { return };
    tracer
        .upload_scene(&triangle(), &[MaterialInput::flat(Vec3::ONE)])
        .unwrap();
    tracer.settings_mut().denoiser = Denoiser::EdgeAwareBlur;

    for view in DebugView::ALL {
        tracer.settings_mut().view = view;
        tracer.render(16, 16).unwrap();
        assert_eq!(tracer.read_output_rgba8().unwrap().len(), 16 * 16 * 4, "{view:?}");
    }
    assert!(tracer.pipeline_errors().is_empty());
    assert!(Stage::ALL.iter().all(|&stage| tracer.stage_available(stage)));
}

#[test]
fn test_texture_slot_tints_surface() {
    let Some(mut tracer) = gpu_tracer() else { return };

    let device = &tracer.context().device;
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("test_red"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    tracer.context().queue.write_texture(
        texture.as_image_copy(),
        &[255, 0, 0, 255],
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    let red = TextureHandle::new(texture.create_view(&Default::default()));

    tracer
        .upload_scene(&triangle(), &[MaterialInput::flat(Vec3::ONE).with_texture(red)])
        .unwrap();
    tracer.settings_mut().view = DebugView::Albedo;
    tracer.render(32, 32).unwrap();

    let image = tracer.read_output_rgba8().unwrap();
    let p = pixel(&image, 32, 16, 16);
    assert!(p[0] > 200 && p[1] < 10 && p[2] < 10, "{p:?}");
}

#[test]
fn test_clear_scene_shows_environment() {
    let Some(mut tracer) = gpu_tracer() else { return };
    tracer
        .upload_scene(&triangle(), &[MaterialInput::flat(Vec3::ONE)])
        .unwrap();
    tracer.render(16, 16).unwrap();
    assert!(tracer.has_scene());

    tracer.clear_scene();
    let report = tracer.render(16, 16).unwrap();
    assert!(report.plan.clear);
    assert!(!tracer.stats().using_scene);
    assert_eq!(tracer.stats().triangle_count, 0);

    let empty: Vec<MaterialInput<TextureHandle>> = Vec::new();
    tracer.upload_scene(&triangle(), &empty).unwrap();
    assert!(!tracer.has_scene());
}

#[test]
fn test_rough_metal_view_matches_cpu_at_edges() {
    let Some(mut gpu) = gpu_tracer() else { return };
    let mut cpu = CpuPathTracer::new();
    {
        let settings = gpu.settings_mut();
        settings.spp_per_frame = 4;
        settings.view = DebugView::RoughMetal;
    }
    *cpu.settings_mut() = gpu.settings().clone();
    cpu.set_camera(camera());

    fn rough<H>() -> MaterialInput<H> {
        MaterialInput {
            roughness: 0.2,
            metallic: 1.0,
            ..MaterialInput::flat(Vec3::ONE)
        }
    }
    cpu.upload_scene(&triangle(), &[rough()]).unwrap();
    gpu.upload_scene(&triangle(), &[rough()]).unwrap();

    cpu.render(32, 32);
    gpu.render(32, 32).unwrap();

    // Pixels straddling the hypotenuse mix hits and misses within a frame
    let a = cpu.read_output_rgba8().unwrap();
    let b = gpu.read_output_rgba8().unwrap();
    let close = a.iter().zip(&b).filter(|(x, y)| x.abs_diff(**y) <= 2).count();
    assert!(close as f32 >= 0.99 * a.len() as f32, "{close} of {} channels within 2", a.len());
}
