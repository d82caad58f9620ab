//! Lux Renderer - CPU reference pipeline.
//!
//! Evaluates the same clear, trace, accumulate, denoise and tonemap stages
//! as the GPU tracer, over plain buffers, parallelised with rayon.

pub mod buffer;
pub mod pipeline;
pub mod texture;
pub mod traverse;

pub use buffer::ImageBuffer;
pub use pipeline::{CpuPathTracer, InternalImages};
pub use texture::{Texture, TextureError, TextureRef};
pub use traverse::{SceneView, TriangleHit};

/// Re-export common math types from lux_math
pub use lux_math::{CameraBasis, Vec3};
