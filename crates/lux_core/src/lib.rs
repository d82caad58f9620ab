//! Lux Core - scene packing, BVH construction and frame logic for the Lux
//! progressive path tracer.
//!
//! This crate provides:
//!
//! - **Scene input**: `TriangleInput`, `MaterialInput`
//! - **Packing**: device layouts (`GpuTriangle`, `GpuMaterial`,
//!   `GpuBvhNode`) and texture slot deduplication
//! - **Acceleration structure**: median-split BVH behind the `BvhBuilder`
//!   trait
//! - **Frame logic**: `Settings`, the `Accumulator` reset state machine,
//!   resize planning and stats
//! - **Kernels**: sampling, shading and post-processing math shared by the
//!   CPU reference pipeline and mirrored by the WGSL shaders
//!
//! # Example
//!
//! ```
//! use lux_core::{pack_scene, MaterialInput, MedianSplitBuilder, TriangleInput};
//! use lux_math::Vec3;
//!
//! let triangles = vec![TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 0)];
//! let materials = vec![MaterialInput::<()>::flat(Vec3::ONE)];
//!
//! let packed = pack_scene(&triangles, &materials, 16, &MedianSplitBuilder::default())
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(packed.node_count(), 1);
//! ```

pub mod accumulation;
pub mod bvh;
pub mod frame;
pub mod packing;
pub mod postprocess;
pub mod sampling;
pub mod scene;
pub mod settings;
pub mod shading;

// Re-export commonly used types
pub use accumulation::{Accumulator, Phase, ResetReason};
pub use bvh::{Bvh, BvhBuilder, BvhNode, BvhNodeKind, GpuBvhNode, MedianSplitBuilder, PrimitiveBounds};
pub use frame::{ColorSource, FramePlan, FrameReport, GpuFrameParams, ResizePlan, Resolution, Stage, Stats};
pub use packing::{pack_scene, GpuMaterial, GpuTriangle, PackedScene, TextureSlots, MAX_TEXTURE_SLOTS};
pub use scene::{MaterialInput, SceneError, TriangleInput};
pub use settings::{DebugView, Denoiser, Settings};
