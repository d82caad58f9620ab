//! Device copies of a packed scene.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytemuck::Zeroable;
use lux_core::{GpuBvhNode, GpuMaterial, GpuTriangle, PackedScene};
use wgpu::util::DeviceExt;

use crate::error::TracerResult;
use crate::resources::scoped;

/// A host-owned base-color texture.
///
/// Compared by identity so materials sharing a view share a slot. The view
/// must be a filterable float 2D texture (for example `Rgba8UnormSrgb`).
#[derive(Clone, Debug)]
pub struct TextureHandle(pub Arc<wgpu::TextureView>);

impl TextureHandle {
    pub fn new(view: wgpu::TextureView) -> Self {
        Self(Arc::new(view))
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.0
    }
}

impl PartialEq for TextureHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TextureHandle {}

impl Hash for TextureHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

/// Triangle, material, node and index buffers of the current scene.
pub struct SceneBuffers {
    pub triangles: wgpu::Buffer,
    pub materials: wgpu::Buffer,
    pub nodes: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub textures: Vec<TextureHandle>,
    pub triangle_count: u32,
    pub material_count: u32,
    pub node_count: u32,
}

impl SceneBuffers {
    pub fn upload(device: &wgpu::Device, scene: &PackedScene<TextureHandle>) -> TracerResult<Self> {
        let bytes = (std::mem::size_of_val(scene.triangles.as_slice())
            + std::mem::size_of_val(scene.materials.as_slice())
            + std::mem::size_of_val(scene.nodes.as_slice())
            + std::mem::size_of_val(scene.indices.as_slice())) as u64;

        scoped(device, "lux_scene", bytes, || Self {
            triangles: storage(device, "lux_triangles", bytemuck::cast_slice(&scene.triangles)),
            materials: storage(device, "lux_materials", bytemuck::cast_slice(&scene.materials)),
            nodes: storage(device, "lux_bvh_nodes", bytemuck::cast_slice(&scene.nodes)),
            indices: storage(device, "lux_bvh_indices", bytemuck::cast_slice(&scene.indices)),
            textures: scene.textures.clone(),
            triangle_count: scene.triangle_count() as u32,
            material_count: scene.material_count() as u32,
            node_count: scene.node_count() as u32,
        })
    }

    /// Single zeroed elements, bound while no scene is loaded.
    pub fn placeholder(device: &wgpu::Device) -> Self {
        Self {
            triangles: storage(device, "lux_triangles_empty", bytemuck::bytes_of(&GpuTriangle::zeroed())),
            materials: storage(device, "lux_materials_empty", bytemuck::bytes_of(&GpuMaterial::zeroed())),
            nodes: storage(device, "lux_bvh_nodes_empty", bytemuck::bytes_of(&GpuBvhNode::zeroed())),
            indices: storage(device, "lux_bvh_indices_empty", bytemuck::bytes_of(&0u32)),
            textures: Vec::new(),
            triangle_count: 0,
            material_count: 0,
            node_count: 0,
        }
    }
}

impl Drop for SceneBuffers {
    fn drop(&mut self) {
        self.triangles.destroy();
        self.materials.destroy();
        self.nodes.destroy();
        self.indices.destroy();
    }
}

fn storage(device: &wgpu::Device, label: &str, contents: &[u8]) -> wgpu::Buffer {
    log::debug!("Allocating `{label}`; size={}", contents.len());

    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage: wgpu::BufferUsages::STORAGE,
    })
}

/// Sampler and fallback texture for the base-color slots.
pub struct BaseColorDefaults {
    pub sampler: wgpu::Sampler,
    white_texture: wgpu::Texture,
    pub white: wgpu::TextureView,
}

impl BaseColorDefaults {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lux_base_color_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white_texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("lux_white"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
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
            &[255, 255, 255, 255],
        );
        let white = white_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            sampler,
            white_texture,
            white,
        }
    }

    /// View bound at `slot`: the scene's texture, or white past its end.
    pub fn slot_view<'a>(&'a self, scene: &'a SceneBuffers, slot: usize) -> &'a wgpu::TextureView {
        scene.textures.get(slot).map_or(&self.white, TextureHandle::view)
    }
}

impl Drop for BaseColorDefaults {
    fn drop(&mut self) {
        self.white_texture.destroy();
    }
}
