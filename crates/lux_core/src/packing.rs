//! Scene packing: caller triangles and materials to device layouts.
//!
//! All `Gpu*` structs are `#[repr(C)]` with 16-byte aligned rows so they can
//! be uploaded with `bytemuck::cast_slice` and read as WGSL storage arrays
//! without padding surprises.

use crate::bvh::{Bvh, BvhBuilder, GpuBvhNode, PrimitiveBounds};
use crate::scene::{validate_material_indices, MaterialInput, TriangleInput};
use crate::SceneError;
use bytemuck::{Pod, Zeroable};
use lux_math::{Vec2, Vec3, Vec4};
use std::collections::HashMap;
use std::hash::Hash;

/// Hard cap on bound base-color textures, whatever the device reports.
pub const MAX_TEXTURE_SLOTS: usize = 16;

/// Texture slot value meaning "no texture".
pub const NO_TEXTURE: i32 = -1;

/// Triangle stored as base vertex plus two edges (128 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub v0: [f32; 3],
    pub material: u32,
    pub e1: [f32; 4],
    pub e2: [f32; 4],
    pub n0: [f32; 4],
    pub n1: [f32; 4],
    pub n2: [f32; 4],
    /// uv0 in `xy`, uv1 in `zw`.
    pub uv01: [f32; 4],
    pub uv2: [f32; 4],
}

impl GpuTriangle {
    pub fn from_input(tri: &TriangleInput) -> Self {
        let [p0, p1, p2] = tri.positions;
        let [n0, n1, n2] = tri.normals;
        let [uv0, uv1, uv2] = tri.uvs;

        Self {
            v0: p0.to_array(),
            material: tri.material,
            e1: (p1 - p0).extend(0.0).to_array(),
            e2: (p2 - p0).extend(0.0).to_array(),
            n0: n0.extend(0.0).to_array(),
            n1: n1.extend(0.0).to_array(),
            n2: n2.extend(0.0).to_array(),
            uv01: [uv0.x, uv0.y, uv1.x, uv1.y],
            uv2: [uv2.x, uv2.y, 0.0, 0.0],
        }
    }

    pub fn vertex0(&self) -> Vec3 {
        Vec3::from_array(self.v0)
    }

    pub fn edge1(&self) -> Vec3 {
        Vec4::from_array(self.e1).truncate()
    }

    pub fn edge2(&self) -> Vec3 {
        Vec4::from_array(self.e2).truncate()
    }

    pub fn normals(&self) -> [Vec3; 3] {
        [self.n0, self.n1, self.n2].map(|n| Vec4::from_array(n).truncate())
    }

    pub fn uvs(&self) -> [Vec2; 3] {
        [
            Vec2::new(self.uv01[0], self.uv01[1]),
            Vec2::new(self.uv01[2], self.uv01[3]),
            Vec2::new(self.uv2[0], self.uv2[1]),
        ]
    }
}

/// Material factors plus base-color texture slot (64 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub base_color: [f32; 4],
    /// Emissive RGB in `xyz`, roughness in `w`.
    pub emissive_roughness: [f32; 4],
    /// Metallic in `x`.
    pub metallic: [f32; 4],
    /// Base-color slot in `x`, [`NO_TEXTURE`] when unbound.
    pub textures: [i32; 4],
}

impl GpuMaterial {
    pub fn new<H>(material: &MaterialInput<H>, base_color_slot: Option<u32>) -> Self {
        Self {
            base_color: material.base_color.to_array(),
            emissive_roughness: material.emissive.extend(material.roughness).to_array(),
            metallic: [material.metallic, 0.0, 0.0, 0.0],
            textures: [
                base_color_slot.map_or(NO_TEXTURE, |s| s as i32),
                NO_TEXTURE,
                NO_TEXTURE,
                NO_TEXTURE,
            ],
        }
    }

    pub fn base_color(&self) -> Vec4 {
        Vec4::from_array(self.base_color)
    }

    pub fn emissive(&self) -> Vec3 {
        Vec4::from_array(self.emissive_roughness).truncate()
    }

    pub fn roughness(&self) -> f32 {
        self.emissive_roughness[3]
    }

    pub fn metallic(&self) -> f32 {
        self.metallic[0]
    }

    /// Bound texture slot, if any.
    pub fn base_color_slot(&self) -> Option<u32> {
        u32::try_from(self.textures[0]).ok()
    }
}

/// Deduplicating map from texture handle to sampler slot.
///
/// Slots are handed out in first-seen order. Once `capacity` slots are in
/// use, further distinct handles are dropped and counted.
#[derive(Clone, Debug)]
pub struct TextureSlots<H> {
    capacity: usize,
    handles: Vec<H>,
    lookup: HashMap<H, u32>,
    dropped: usize,
}

impl<H: Clone + Eq + Hash> TextureSlots<H> {
    /// `device_limit` is the reported sampled-texture limit; the effective
    /// capacity never exceeds [`MAX_TEXTURE_SLOTS`].
    pub fn new(device_limit: usize) -> Self {
        Self {
            capacity: device_limit.min(MAX_TEXTURE_SLOTS),
            handles: Vec::new(),
            lookup: HashMap::new(),
            dropped: 0,
        }
    }

    /// Slot for `handle`, allocating one if capacity allows.
    pub fn slot_for(&mut self, handle: &H) -> Option<u32> {
        if let Some(&slot) = self.lookup.get(handle) {
            return Some(slot);
        }

        if self.handles.len() >= self.capacity {
            self.dropped += 1;
            return None;
        }

        let slot = self.handles.len() as u32;
        self.handles.push(handle.clone());
        self.lookup.insert(handle.clone(), slot);
        Some(slot)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of material bindings that fell back to the flat factor.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Handles in slot order.
    pub fn into_handles(self) -> Vec<H> {
        self.handles
    }
}

/// Everything the trace stage needs, in device layout.
#[derive(Clone, Debug)]
pub struct PackedScene<H> {
    pub triangles: Vec<GpuTriangle>,
    pub materials: Vec<GpuMaterial>,
    pub nodes: Vec<GpuBvhNode>,
    /// Permuted triangle indices referenced by leaf ranges.
    pub indices: Vec<u32>,
    /// Texture handles in slot order.
    pub textures: Vec<H>,
    /// Material texture bindings dropped for lack of slots.
    pub dropped_textures: usize,
    pub bvh_depth: usize,
}

impl<H> PackedScene<H> {
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Pack a scene for upload.
///
/// Returns `Ok(None)` when there are no triangles or no materials, which
/// callers treat as "clear the current scene". Errors leave nothing
/// half-built; the caller's current scene stays as it was.
pub fn pack_scene<H, B>(
    triangles: &[TriangleInput],
    materials: &[MaterialInput<H>],
    texture_limit: usize,
    builder: &B,
) -> Result<Option<PackedScene<H>>, SceneError>
where
    H: Clone + Eq + Hash,
    B: BvhBuilder + ?Sized,
{
    if triangles.is_empty() || materials.is_empty() {
        return Ok(None);
    }

    validate_material_indices(triangles, materials)?;

    let mut slots = TextureSlots::new(texture_limit);
    let gpu_materials: Vec<GpuMaterial> = materials
        .iter()
        .map(|m| {
            let slot = m.base_color_texture.as_ref().and_then(|h| slots.slot_for(h));
            GpuMaterial::new(m, slot)
        })
        .collect();

    if slots.dropped() > 0 {
        log::warn!(
            "{} material texture binding(s) exceed the {} available slots; using base color factor",
            slots.dropped(),
            slots.capacity()
        );
    }

    let primitives: Vec<PrimitiveBounds> = triangles
        .iter()
        .map(|t| PrimitiveBounds::new(t.bounds()))
        .collect();
    let bvh: Bvh = builder.build(&primitives);
    bvh.validate_traversal_depth()?;

    let dropped_textures = slots.dropped();

    Ok(Some(PackedScene {
        triangles: triangles.iter().map(GpuTriangle::from_input).collect(),
        materials: gpu_materials,
        nodes: bvh.to_gpu_nodes(),
        indices: bvh.indices.clone(),
        bvh_depth: bvh.depth(),
        textures: slots.into_handles(),
        dropped_textures,
    }))
}
