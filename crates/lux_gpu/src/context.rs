//! Device acquisition.

use crate::error::{TracerError, TracerResult};
use lux_core::MAX_TEXTURE_SLOTS;

/// Storage buffers bound by the trace stage: four scene arrays plus five
/// per-pixel outputs.
pub const REQUIRED_STORAGE_BUFFERS: u32 = 9;

/// A wgpu device and queue plus the capabilities the tracer cares about.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create a headless context on the best available adapter.
    pub async fn new() -> TracerResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(TracerError::NoAdapter)?;

        Self::from_adapter(&adapter).await
    }

    /// Blocking variant of [`GpuContext::new`].
    pub fn new_blocking() -> TracerResult<Self> {
        pollster::block_on(Self::new())
    }

    /// Request a device from a host-selected adapter.
    ///
    /// Asks for the adapter's full limits and, when available, timestamp
    /// queries.
    pub async fn from_adapter(adapter: &wgpu::Adapter) -> TracerResult<Self> {
        let limits = adapter.limits();
        check_limits(&limits)?;

        let features = adapter.features() & wgpu::Features::TIMESTAMP_QUERY;
        let adapter_info = adapter.get_info();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Lux Device"),
                    required_features: features,
                    required_limits: limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        log::info!(
            "Using adapter: {} ({:?}), timestamps: {}",
            adapter_info.name,
            adapter_info.backend,
            features.contains(wgpu::Features::TIMESTAMP_QUERY)
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn supports_timestamps(&self) -> bool {
        self.device.features().contains(wgpu::Features::TIMESTAMP_QUERY)
    }

    /// Number of base-color texture slots the trace stage declares.
    pub fn texture_slots(&self) -> usize {
        texture_slots(&self.device.limits())
    }
}

/// Base-color slots for a device: its sampled-texture limit, capped.
pub fn texture_slots(limits: &wgpu::Limits) -> usize {
    (limits.max_sampled_textures_per_shader_stage as usize).min(MAX_TEXTURE_SLOTS)
}

/// Reject devices that cannot bind the trace stage.
pub fn check_limits(limits: &wgpu::Limits) -> TracerResult<()> {
    if limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
        return Err(TracerError::UnsupportedDevice {
            limit: "max_storage_buffers_per_shader_stage",
            supported: limits.max_storage_buffers_per_shader_stage as u64,
            required: REQUIRED_STORAGE_BUFFERS as u64,
        });
    }

    if limits.max_storage_textures_per_shader_stage < 1 {
        return Err(TracerError::UnsupportedDevice {
            limit: "max_storage_textures_per_shader_stage",
            supported: limits.max_storage_textures_per_shader_stage as u64,
            required: 1,
        });
    }

    Ok(())
}
