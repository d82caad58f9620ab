//! Device Resource Manager.
//!
//! Owns the internal-resolution storage images and the display texture.
//! Internal images depend only on the scaled resolution and the display
//! texture only on the viewport, so each is recreated independently.
//! Every wrapper destroys its device object on drop; a failed allocation
//! releases everything and leaves the manager empty.

use lux_core::{ResizePlan, Resolution, Settings};

use crate::error::{TracerError, TracerResult};

/// Format of the display texture.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Bytes per texel of each internal image kind.
pub mod texel {
    pub const COLOR: u64 = 16;
    pub const COUNT: u64 = 4;
    pub const VEC2: u64 = 8;
    pub const SCALAR: u64 = 4;
}

/// A `width * height` storage buffer standing in for an image.
pub struct StorageImage {
    buffer: wgpu::Buffer,
    size: (u32, u32),
}

impl StorageImage {
    fn new(device: &wgpu::Device, label: &str, size: (u32, u32), texel_size: u64) -> Self {
        let bytes = image_bytes(size, texel_size);
        log::debug!("Allocating `{label}`; size={bytes}");

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        Self { buffer, size }
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for StorageImage {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

/// The internal-resolution image set.
pub struct InternalTargets {
    pub sample: StorageImage,
    pub accum: StorageImage,
    pub count: StorageImage,
    pub albedo: StorageImage,
    pub normal: StorageImage,
    pub depth: StorageImage,
    pub rough_metal: StorageImage,
    pub denoise_a: StorageImage,
    pub denoise_b: StorageImage,
}

/// (label, bytes per texel) of every internal image, in field order.
const INTERNAL_LAYOUT: [(&str, u64); 9] = [
    ("lux_sample", texel::COLOR),
    ("lux_accum", texel::COLOR),
    ("lux_count", texel::COUNT),
    ("lux_albedo", texel::COLOR),
    ("lux_normal", texel::VEC2),
    ("lux_depth", texel::SCALAR),
    ("lux_rough_metal", texel::VEC2),
    ("lux_denoise_a", texel::COLOR),
    ("lux_denoise_b", texel::COLOR),
];

impl InternalTargets {
    fn allocate(device: &wgpu::Device, size: (u32, u32)) -> TracerResult<Self> {
        let limits = device.limits();
        for (label, texel_size) in INTERNAL_LAYOUT {
            check_buffer_size(&limits, label, image_bytes(size, texel_size))?;
        }

        let [sample, accum, count, albedo, normal, depth, rough_metal, denoise_a, denoise_b] = INTERNAL_LAYOUT;
        let image = |(label, texel_size): (&str, u64)| StorageImage::new(device, label, size, texel_size);

        let targets = scoped(device, "lux_internal", total_bytes(size), || Self {
            sample: image(sample),
            accum: image(accum),
            count: image(count),
            albedo: image(albedo),
            normal: image(normal),
            depth: image(depth),
            rough_metal: image(rough_metal),
            denoise_a: image(denoise_a),
            denoise_b: image(denoise_b),
        })?;

        log::info!(
            "Allocated internal images {}x{} ({} bytes)",
            size.0,
            size.1,
            total_bytes(size)
        );
        Ok(targets)
    }

    pub fn size(&self) -> (u32, u32) {
        self.sample.size()
    }
}

/// The display image: storage-writable, sampleable and copyable.
pub struct OutputImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl OutputImage {
    fn allocate(device: &wgpu::Device, size: (u32, u32)) -> TracerResult<Self> {
        check_texture_size(&device.limits(), "lux_output", size)?;

        let image = scoped(device, "lux_output", image_bytes(size, 4), || {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("lux_output"),
                size: wgpu::Extent3d {
                    width: size.0,
                    height: size.1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: OUTPUT_FORMAT,
                usage: wgpu::TextureUsages::STORAGE_BINDING
                    | wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Self { texture, view, size }
        })?;

        log::info!("Allocated output image {}x{}", size.0, size.1);
        Ok(image)
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl Drop for OutputImage {
    fn drop(&mut self) {
        self.texture.destroy();
    }
}

/// Lazily (re)allocates the images a frame needs.
#[derive(Default)]
pub struct ResourceManager {
    resolution: Resolution,
    internal: Option<InternalTargets>,
    output: Option<OutputImage>,
    generation: u64,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure images exist for `viewport` at the current render scale.
    ///
    /// Returns what was recreated. The caller resets accumulation when the
    /// internal images changed. On failure nothing stays allocated.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        viewport: (u32, u32),
        settings: &Settings,
    ) -> TracerResult<ResizePlan> {
        let plan = ResizePlan::new(
            self.resolution,
            self.internal.is_some(),
            self.output.is_some(),
            viewport,
            settings,
        );
        if plan.is_noop() {
            return Ok(plan);
        }

        if plan.recreate_internal {
            self.internal = None;
            match InternalTargets::allocate(device, plan.resolution.internal) {
                Ok(targets) => self.internal = Some(targets),
                Err(err) => {
                    self.release();
                    return Err(err);
                }
            }
        }

        if plan.recreate_output {
            self.output = None;
            match OutputImage::allocate(device, plan.resolution.viewport) {
                Ok(output) => self.output = Some(output),
                Err(err) => {
                    self.release();
                    return Err(err);
                }
            }
        }

        self.resolution = plan.resolution;
        self.generation += 1;
        Ok(plan)
    }

    /// Drop every image.
    pub fn release(&mut self) {
        if self.internal.is_some() || self.output.is_some() {
            log::debug!("Releasing frame images");
        }
        self.internal = None;
        self.output = None;
        self.resolution = Resolution::default();
        self.generation += 1;
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn internal(&self) -> Option<&InternalTargets> {
        self.internal.as_ref()
    }

    pub fn output(&self) -> Option<&OutputImage> {
        self.output.as_ref()
    }

    /// Changes whenever any image is created or released.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Run `create` inside out-of-memory and validation error scopes.
///
/// The created value is dropped (releasing whatever was made) if either
/// scope reports an error.
pub(crate) fn scoped<T>(
    device: &wgpu::Device,
    label: &str,
    bytes: u64,
    create: impl FnOnce() -> T,
) -> TracerResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let value = create();

    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());

    match validation.or(out_of_memory) {
        None => Ok(value),
        Some(err) => {
            drop(value);
            log::error!("Failed to allocate `{label}`: {err}");
            Err(TracerError::Allocation {
                label: label.to_string(),
                bytes,
                reason: err.to_string(),
            })
        }
    }
}

fn image_bytes(size: (u32, u32), texel_size: u64) -> u64 {
    u64::from(size.0) * u64::from(size.1) * texel_size
}

fn total_bytes(size: (u32, u32)) -> u64 {
    INTERNAL_LAYOUT
        .iter()
        .map(|&(_, texel_size)| image_bytes(size, texel_size))
        .sum()
}

/// Reject buffers the device cannot create or bind whole.
pub fn check_buffer_size(limits: &wgpu::Limits, label: &str, bytes: u64) -> TracerResult<()> {
    let max = limits
        .max_buffer_size
        .min(u64::from(limits.max_storage_buffer_binding_size));

    if bytes > max {
        return Err(TracerError::Allocation {
            label: label.to_string(),
            bytes,
            reason: format!("exceeds the device's {max}-byte storage buffer limit"),
        });
    }
    Ok(())
}

pub fn check_texture_size(limits: &wgpu::Limits, label: &str, size: (u32, u32)) -> TracerResult<()> {
    let max = limits.max_texture_dimension_2d;

    if size.0 > max || size.1 > max {
        return Err(TracerError::Allocation {
            label: label.to_string(),
            bytes: image_bytes(size, 4),
            reason: format!("{}x{} exceeds the device's {max}-texel texture limit", size.0, size.1),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint() {
        // 4 color, 2 vec2, count and depth: 16*5 + 8*2 + 4 + 4
        assert_eq!(total_bytes((1, 1)), 104);
        assert_eq!(total_bytes((10, 20)), 200 * 104);
    }

    #[test]
    fn test_buffer_limit() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1024,
            ..wgpu::Limits::default()
        };

        assert!(check_buffer_size(&limits, "ok", 1024).is_ok());
        let err = check_buffer_size(&limits, "lux_accum", 1025).unwrap_err();
        assert!(matches!(err, TracerError::Allocation { ref label, bytes: 1025, .. } if label == "lux_accum"));
    }

    #[test]
    fn test_texture_limit() {
        let limits = wgpu::Limits::default();
        let max = limits.max_texture_dimension_2d;

        assert!(check_texture_size(&limits, "lux_output", (max, 1)).is_ok());
        assert!(check_texture_size(&limits, "lux_output", (max + 1, 1)).is_err());
    }
}
