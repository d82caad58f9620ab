//! End-to-end behaviour of the CPU pipeline.

use lux_core::{DebugView, Denoiser, MaterialInput, Phase, TriangleInput};
use lux_math::{CameraBasis, Vec3, Vec4};
use lux_renderer::{CpuPathTracer, Texture, TextureRef};

fn triangle_camera() -> CameraBasis {
    CameraBasis::look_at(
        Vec3::new(0.3, 0.3, 2.0),
        Vec3::new(0.3, 0.3, 0.0),
        Vec3::Y,
        45.0_f32.to_radians(),
    )
}

fn one_triangle_tracer() -> CpuPathTracer {
    let mut tracer = CpuPathTracer::new();
    {
        let settings = tracer.settings_mut();
        settings.enabled = true;
        settings.spp_per_frame = 1;
        settings.denoiser = Denoiser::None;
        settings.view = DebugView::Accumulated;
    }

    let triangles = vec![TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 0)];
    let materials = vec![MaterialInput::flat(Vec3::ONE)];
    tracer.upload_scene(&triangles, &materials).unwrap();
    tracer.set_camera(triangle_camera());
    tracer
}

/// Rendered with no scene, to compare against.
fn background(width: u32, height: u32) -> Vec<u8> {
    let mut tracer = one_triangle_tracer();
    tracer.clear_scene();
    tracer.render(width, height);
    tracer.read_output_rgba8().unwrap()
}

#[test]
fn test_one_triangle_renders() {
    let mut tracer = one_triangle_tracer();
    let report = tracer.render(64, 64);

    assert!(report.plan.clear);
    assert!(report.traced());
    assert_eq!(tracer.stats().accumulated_samples, 1);
    assert!(tracer.stats().using_scene);
    assert_eq!(tracer.stats().triangle_count, 1);

    let image = tracer.read_output_rgba8().unwrap();
    let sky = background(64, 64);

    // The triangle covers the center-left of the view; the pixel looking
    // straight down the camera axis hits it at (0.3, 0.3)
    let center = (32 * 64 + 32) * 4;
    assert_ne!(&image[center..center + 4], &sky[center..center + 4]);

    // Top-right corner looks past the hypotenuse into the sky
    let corner = (2 * 64 + 61) * 4;
    assert_eq!(&image[corner..corner + 4], &sky[corner..corner + 4]);
}

#[test]
fn test_accumulation_is_running_mean() {
    let mut tracer = one_triangle_tracer();
    tracer.settings_mut().view = DebugView::Sample;

    let mut samples = Vec::new();
    for _ in 0..5 {
        tracer.render(16, 16);
        samples.push(tracer.internal_images().unwrap().sample.pixels.clone());
    }

    let accum = &tracer.internal_images().unwrap().accum.pixels;
    for (i, avg) in accum.iter().enumerate() {
        let mean = samples.iter().map(|s| s[i]).fold(Vec4::ZERO, |a, b| a + b) / samples.len() as f32;
        assert!((*avg - mean).length() < 1e-4, "pixel {i}: {avg:?} vs {mean:?}");
    }
    assert!(tracer.internal_images().unwrap().count.pixels.iter().all(|&c| c == 5));
    assert_eq!(tracer.stats().accumulated_samples, 5);
}

#[test]
fn test_fixed_seed_is_deterministic() {
    let mut a = one_triangle_tracer();
    let mut b = one_triangle_tracer();
    a.settings_mut().spp_per_frame = 3;
    b.settings_mut().spp_per_frame = 3;

    for _ in 0..3 {
        a.render(24, 16);
        b.render(24, 16);
    }

    assert_eq!(a.read_output_rgba8(), b.read_output_rgba8());
    assert_eq!(a.stats().accumulated_samples, 9);
}

#[test]
fn test_scene_upload_resets() {
    let mut tracer = one_triangle_tracer();
    tracer.render(16, 16);
    tracer.render(16, 16);
    assert_eq!(tracer.stats().accumulated_samples, 2);

    let triangles = vec![TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 0)];
    let materials = vec![MaterialInput::flat(Vec3::new(1.0, 0.0, 0.0))];
    tracer.upload_scene(&triangles, &materials).unwrap();
    assert_eq!(tracer.phase(), Phase::ResetPending);

    let report = tracer.render(16, 16);
    assert!(report.plan.clear);
    assert_eq!(report.plan.sample_base, 0);
    assert_eq!(tracer.stats().accumulated_samples, 1);
}

#[test]
fn test_bad_material_keeps_previous_scene() {
    let mut tracer = one_triangle_tracer();
    tracer.render(8, 8);

    let triangles = vec![TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 4)];
    let materials = vec![MaterialInput::flat(Vec3::ONE)];
    assert!(tracer.upload_scene(&triangles, &materials).is_err());

    assert!(tracer.has_scene());
    let report = tracer.render(8, 8);
    assert!(!report.plan.clear);
}

#[test]
fn test_empty_upload_clears_scene() {
    let mut tracer = one_triangle_tracer();
    tracer.upload_scene(&[], &[]).unwrap();

    assert!(!tracer.has_scene());
    tracer.render(8, 8);
    assert!(!tracer.stats().using_scene);
    assert_eq!(tracer.phase(), Phase::Idle);
}

#[test]
fn test_camera_move_resets() {
    let mut tracer = one_triangle_tracer();
    tracer.render(16, 16);
    tracer.render(16, 16);

    // Below threshold
    let mut camera = triangle_camera();
    camera.position.x += 1e-5;
    tracer.set_camera(camera);
    assert!(!tracer.render(16, 16).plan.clear);
    assert_eq!(tracer.stats().accumulated_samples, 3);

    camera.position.x += 0.05;
    tracer.set_camera(camera);
    let report = tracer.render(16, 16);
    assert!(report.plan.clear);
    assert_eq!(tracer.stats().accumulated_samples, 1);
}

#[test]
fn test_pause_unpause_clears() {
    let mut tracer = one_triangle_tracer();
    tracer.render(16, 16);
    tracer.render(16, 16);
    let frozen = tracer.read_output_rgba8();

    tracer.settings_mut().paused = true;
    let report = tracer.render(16, 16);
    assert!(!report.traced());
    assert_eq!(tracer.stats().accumulated_samples, 2);
    assert_eq!(tracer.read_output_rgba8(), frozen);

    tracer.settings_mut().paused = false;
    let report = tracer.render(16, 16);
    assert!(report.plan.clear);
    assert!(report.traced());
    assert_eq!(tracer.stats().accumulated_samples, 1);
}

#[test]
fn test_step_once() {
    let mut tracer = one_triangle_tracer();
    tracer.render(16, 16);

    tracer.settings_mut().step_once = true;
    assert!(tracer.render(16, 16).traced());
    assert!(tracer.settings().paused);
    assert_eq!(tracer.stats().accumulated_samples, 2);

    assert!(!tracer.render(16, 16).traced());
    assert_eq!(tracer.stats().accumulated_samples, 2);
}

#[test]
fn test_render_scale_recreates_internal_only() {
    let mut tracer = one_triangle_tracer();
    tracer.render(40, 20);
    tracer.render(40, 20);

    tracer.settings_mut().render_scale = 0.5;
    let report = tracer.render(40, 20);
    assert!(report.recreated_internal);
    assert!(!report.recreated_output);
    assert!(report.plan.clear);
    assert_eq!(tracer.stats().internal_width, 20);
    assert_eq!(tracer.stats().internal_height, 10);
    assert_eq!(tracer.output().unwrap().size(), (40, 20));
}

#[test]
fn test_viewport_change_recreates_output_only() {
    let mut tracer = one_triangle_tracer();
    tracer.settings_mut().render_scale = 0.5;
    tracer.render(40, 20);
    tracer.render(40, 20);

    // 41 * 0.5 floors to the same internal width
    let report = tracer.render(41, 20);
    assert!(!report.recreated_internal);
    assert!(report.recreated_output);
    assert!(!report.plan.clear);
    assert_eq!(tracer.stats().accumulated_samples, 3);
    assert_eq!(tracer.output().unwrap().size(), (41, 20));
}

#[test]
fn test_debug_views_render() {
    let mut tracer = one_triangle_tracer();

    for view in DebugView::ALL {
        tracer.settings_mut().view = view;
        tracer.render(16, 16);
        let image = tracer.read_output_rgba8().unwrap();
        assert_eq!(image.len(), 16 * 16 * 4);
        assert!(image.chunks_exact(4).all(|p| p[3] == 255));
    }
}

#[test]
fn test_texture_modulates_albedo() {
    let mut tracer = one_triangle_tracer();
    tracer.settings_mut().view = DebugView::Albedo;

    let red = TextureRef::new(Texture::solid_color(Vec3::new(1.0, 0.0, 0.0)));
    let triangles = vec![TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 0)];
    let materials = vec![MaterialInput::flat(Vec3::ONE).with_texture(red)];
    tracer.upload_scene(&triangles, &materials).unwrap();
    tracer.render(32, 32);

    let albedo = tracer.internal_images().unwrap().albedo.get(16, 16);
    assert!((albedo.x - 1.0).abs() < 1e-5);
    assert!(albedo.y.abs() < 1e-5);
}

#[test]
fn test_same_camera_every_frame_accumulates() {
    let mut tracer = one_triangle_tracer();

    for _ in 0..5 {
        tracer.set_camera(CameraBasis::fallback());
        tracer.render(8, 8);
    }
    assert_eq!(tracer.stats().accumulated_samples, 5);

    let mut scaled = triangle_camera();
    scaled.right *= 0.999;
    for _ in 0..5 {
        tracer.set_camera(scaled);
        tracer.render(8, 8);
    }
    assert_eq!(tracer.stats().accumulated_samples, 5);
}
