use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use lux_core::{Settings, Stats};
use lux_gpu::{PathTracer, TextureHandle, TracerError};
use lux_renderer::{CpuPathTracer, Texture, TextureRef};
use wgpu::util::DeviceExt;

mod args;
mod demo;

use args::Args;

/// Floor texture as sRGB RGBA8 pixels.
struct FloorTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl FloorTexture {
    fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let image = image::open(path)
                    .with_context(|| format!("loading texture {}", path.display()))?
                    .to_rgba8();
                Ok(Self {
                    width: image.width(),
                    height: image.height(),
                    rgba: image.into_raw(),
                })
            }
            None => Ok(Self {
                width: 256,
                height: 256,
                rgba: demo::checker_rgba8(256, 8),
            }),
        }
    }
}

fn render_gpu(tracer: &mut PathTracer, args: &Args, settings: &Settings, floor: &FloorTexture) -> Result<(Vec<u8>, Stats)> {
    let ctx = tracer.context();
    let texture = ctx.device.create_texture_with_data(
        &ctx.queue,
        &wgpu::TextureDescriptor {
            label: Some("floor"),
            size: wgpu::Extent3d {
                width: floor.width,
                height: floor.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &floor.rgba,
    );
    let handle = TextureHandle::new(texture.create_view(&wgpu::TextureViewDescriptor::default()));

    tracer.upload_scene(&demo::triangles(), &demo::materials(Some(handle)))?;
    *tracer.settings_mut() = settings.clone();

    for _ in 0..args.frames {
        tracer.render(args.width, args.height)?;
    }

    Ok((tracer.read_output_rgba8()?, tracer.stats()))
}

fn render_cpu(args: &Args, settings: &Settings, floor: &FloorTexture) -> Result<(Vec<u8>, Stats)> {
    let texture = Texture::from_srgb_rgba8(floor.width, floor.height, &floor.rgba)?;

    let mut tracer = CpuPathTracer::new();
    tracer.upload_scene(&demo::triangles(), &demo::materials(Some(TextureRef::new(texture))))?;
    *tracer.settings_mut() = settings.clone();

    for _ in 0..args.frames {
        tracer.render(args.width, args.height);
    }

    let pixels = tracer.read_output_rgba8().context("no output image was rendered")?;
    Ok((pixels, tracer.stats()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let settings = args.resolve_settings()?;
    let floor = FloorTexture::load(args.texture.as_deref())?;

    let gpu = if args.cpu {
        None
    } else {
        match PathTracer::new_headless() {
            Ok(tracer) => Some(tracer),
            Err(err @ (TracerError::NoAdapter | TracerError::UnsupportedDevice { .. })) => {
                log::warn!("{err}; falling back to the CPU pipeline");
                None
            }
            Err(err) => return Err(err.into()),
        }
    };

    let (pixels, stats) = match gpu {
        Some(mut tracer) => {
            log::info!("Rendering {} frame(s) on {}", args.frames, tracer.context().adapter_info().name);
            render_gpu(&mut tracer, &args, &settings, &floor)?
        }
        None => {
            log::info!("Rendering {} frame(s) on the CPU", args.frames);
            render_cpu(&args, &settings, &floor)?
        }
    };

    image::RgbaImage::from_raw(args.width, args.height, pixels)
        .context("output image has an unexpected size")?
        .save(&args.out)
        .with_context(|| format!("writing {}", args.out.display()))?;

    log::info!("Wrote {}", args.out.display());
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
