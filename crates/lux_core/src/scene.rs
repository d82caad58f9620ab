//! Caller-facing scene description.
//!
//! These types are what a host hands to the path tracer. They are plain
//! values in world space; nothing here knows about GPU layouts. The packer
//! (`crate::packing`) turns them into the compact wire format.

use lux_math::{Aabb, Vec2, Vec3, Vec4};
use thiserror::Error;

/// Errors raised while validating or packing a scene.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("triangle {triangle} references material {material}, but only {material_count} materials were supplied")]
    MaterialOutOfRange {
        triangle: usize,
        material: u32,
        material_count: usize,
    },

    #[error("scene has {0} triangles, more than a u32 index can address")]
    TooManyTriangles(usize),

    #[error("BVH leaf depth {depth} needs a traversal stack of {required} entries (limit {limit})")]
    TraversalTooDeep {
        depth: usize,
        required: usize,
        limit: usize,
    },
}

/// A single triangle with per-vertex attributes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleInput {
    pub positions: [Vec3; 3],
    pub normals: [Vec3; 3],
    pub uvs: [Vec2; 3],
    /// Index into the material array uploaded alongside the triangles.
    pub material: u32,
}

impl TriangleInput {
    /// Create a triangle whose vertex normals all equal the face normal and
    /// whose UVs are zero.
    pub fn flat(v0: Vec3, v1: Vec3, v2: Vec3, material: u32) -> Self {
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();

        Self {
            positions: [v0, v1, v2],
            normals: [normal; 3],
            uvs: [Vec2::ZERO; 3],
            material,
        }
    }

    /// Set per-vertex UVs.
    pub fn with_uvs(mut self, uvs: [Vec2; 3]) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn bounds(&self) -> Aabb {
        let [v0, v1, v2] = self.positions;
        Aabb::from_triangle(v0, v1, v2)
    }

    pub fn centroid(&self) -> Vec3 {
        let [v0, v1, v2] = self.positions;
        (v0 + v1 + v2) / 3.0
    }
}

/// A surface material.
///
/// `H` is whatever the host uses to identify a texture (a GPU texture
/// handle, an `Arc` to CPU pixels, a plain id in tests). Handles only need
/// equality and hashing so identical textures can share a sampler slot.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialInput<H = ()> {
    /// Base color factor (RGBA, linear).
    pub base_color: Vec4,

    /// Emitted radiance (RGB, linear).
    pub emissive: Vec3,

    pub roughness: f32,
    pub metallic: f32,

    /// Optional base color texture, multiplied with `base_color`.
    pub base_color_texture: Option<H>,
}

impl<H> Default for MaterialInput<H> {
    fn default() -> Self {
        Self {
            base_color: Vec4::ONE,
            emissive: Vec3::ZERO,
            roughness: 0.5,
            metallic: 0.0,
            base_color_texture: None,
        }
    }
}

impl<H> MaterialInput<H> {
    /// An opaque material with just a base color.
    pub fn flat(color: Vec3) -> Self {
        Self {
            base_color: color.extend(1.0),
            ..Default::default()
        }
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_texture(mut self, texture: H) -> Self {
        self.base_color_texture = Some(texture);
        self
    }

    /// Check if this material is emissive.
    pub fn is_emissive(&self) -> bool {
        self.emissive.length_squared() > 0.0
    }
}

/// Check that every triangle references an existing material.
pub fn validate_material_indices<H>(
    triangles: &[TriangleInput],
    materials: &[MaterialInput<H>],
) -> Result<(), SceneError> {
    if triangles.len() > u32::MAX as usize {
        return Err(SceneError::TooManyTriangles(triangles.len()));
    }

    match triangles
        .iter()
        .enumerate()
        .find(|(_, tri)| tri.material as usize >= materials.len())
    {
        Some((triangle, tri)) => Err(SceneError::MaterialOutOfRange {
            triangle,
            material: tri.material,
            material_count: materials.len(),
        }),
        None => Ok(()),
    }
}
