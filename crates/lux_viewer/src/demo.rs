//! Built-in test scene: a checkered floor, a back wall, two boxes and an
//! emissive ceiling panel.

use lux_core::{MaterialInput, TriangleInput};
use lux_math::{Vec2, Vec3};

pub const FLOOR: u32 = 0;
pub const WALL: u32 = 1;
pub const RED_BOX: u32 = 2;
pub const BLUE_BOX: u32 = 3;
pub const PANEL: u32 = 4;

/// Two triangles over `p0..p3` (counter-clockwise seen from the front).
fn quad(p: [Vec3; 4], uv_scale: f32, material: u32) -> [TriangleInput; 2] {
    let uv = [Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y].map(|t| t * uv_scale);
    [
        TriangleInput::flat(p[0], p[1], p[2], material).with_uvs([uv[0], uv[1], uv[2]]),
        TriangleInput::flat(p[0], p[2], p[3], material).with_uvs([uv[0], uv[2], uv[3]]),
    ]
}

/// Axis-aligned box with outward-facing triangles.
fn cuboid(min: Vec3, max: Vec3, material: u32) -> Vec<TriangleInput> {
    let (x0, y0, z0) = min.into();
    let (x1, y1, z1) = max.into();
    let v = Vec3::new;

    [
        [v(x0, y1, z1), v(x1, y1, z1), v(x1, y1, z0), v(x0, y1, z0)],
        [v(x0, y0, z0), v(x1, y0, z0), v(x1, y0, z1), v(x0, y0, z1)],
        [v(x0, y0, z1), v(x1, y0, z1), v(x1, y1, z1), v(x0, y1, z1)],
        [v(x1, y0, z0), v(x0, y0, z0), v(x0, y1, z0), v(x1, y1, z0)],
        [v(x1, y0, z1), v(x1, y0, z0), v(x1, y1, z0), v(x1, y1, z1)],
        [v(x0, y0, z0), v(x0, y0, z1), v(x0, y1, z1), v(x0, y1, z0)],
    ]
    .into_iter()
    .flat_map(|face| quad(face, 1.0, material))
    .collect()
}

pub fn triangles() -> Vec<TriangleInput> {
    let v = Vec3::new;
    let mut tris = Vec::new();

    tris.extend(quad([v(-3.0, 0.0, 3.0), v(3.0, 0.0, 3.0), v(3.0, 0.0, -3.0), v(-3.0, 0.0, -3.0)], 6.0, FLOOR));
    tris.extend(quad([v(-3.0, 0.0, -3.0), v(3.0, 0.0, -3.0), v(3.0, 3.0, -3.0), v(-3.0, 3.0, -3.0)], 1.0, WALL));
    tris.extend(cuboid(v(-1.4, 0.0, -1.2), v(-0.4, 1.6, -0.2), RED_BOX));
    tris.extend(cuboid(v(0.2, 0.0, -0.4), v(1.1, 0.9, 0.5), BLUE_BOX));
    tris.extend(quad([v(-0.6, 2.6, -1.4), v(0.6, 2.6, -1.4), v(0.6, 2.6, -0.2), v(-0.6, 2.6, -0.2)], 1.0, PANEL));

    tris
}

/// Materials indexed by the constants above; the floor uses `floor_texture`.
pub fn materials<H>(floor_texture: Option<H>) -> Vec<MaterialInput<H>> {
    let mut floor = MaterialInput::flat(Vec3::ONE);
    floor.base_color_texture = floor_texture;

    vec![
        floor,
        MaterialInput::flat(Vec3::new(0.8, 0.8, 0.75)),
        MaterialInput {
            roughness: 0.4,
            ..MaterialInput::flat(Vec3::new(0.75, 0.2, 0.15))
        },
        MaterialInput {
            roughness: 0.2,
            metallic: 0.8,
            ..MaterialInput::flat(Vec3::new(0.2, 0.35, 0.8))
        },
        MaterialInput::flat(Vec3::splat(0.9)).with_emissive(Vec3::new(4.0, 3.6, 3.0)),
    ]
}

/// sRGB RGBA8 checkerboard, `cells` squares per side.
pub fn checker_rgba8(size: u32, cells: u32) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut bytes = Vec::with_capacity((size * size * 4) as usize);

    for y in 0..size {
        for x in 0..size {
            let light = (x / cell + y / cell) % 2 == 0;
            bytes.extend_from_slice(if light { &[220, 220, 210, 255] } else { &[60, 60, 70, 255] });
        }
    }
    bytes
}
