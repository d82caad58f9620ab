//! Lux GPU - wgpu compute backend for the Lux progressive path tracer.
//!
//! Each frame runs up to five compute stages over internal-resolution
//! storage buffers: clear, trace, accumulate, an à-trous denoise and a
//! tonemap into an `Rgba8Unorm` display texture. Scene packing, the BVH and
//! the accumulation state machine come from `lux_core`.
//!
//! # Example
//!
//! ```no_run
//! use lux_core::{MaterialInput, TriangleInput};
//! use lux_gpu::PathTracer;
//! use lux_math::Vec3;
//!
//! let mut tracer = PathTracer::new_headless()?;
//! tracer.upload_scene(
//!     &[TriangleInput::flat(Vec3::new(-1.0, 0.0, 0.0), Vec3::X, Vec3::Y, 0)],
//!     &[MaterialInput::flat(Vec3::ONE)],
//! )?;
//! tracer.settings_mut().enabled = true;
//!
//! tracer.render(640, 360)?;
//! let rgba = tracer.read_output_rgba8()?;
//! # Ok::<(), lux_gpu::TracerError>(())
//! ```

pub mod context;
pub mod error;
pub mod pipelines;
pub mod resources;
pub mod scene_buffers;
pub mod shaders;
pub mod timers;
pub mod tracer;

pub use context::GpuContext;
pub use error::{TracerError, TracerResult};
pub use resources::OUTPUT_FORMAT;
pub use scene_buffers::TextureHandle;
pub use tracer::PathTracer;
