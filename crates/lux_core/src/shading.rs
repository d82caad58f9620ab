//! Intersection and shading kernels.
//!
//! Mirrors `trace.wgsl` so the CPU pipeline can serve as a reference for
//! the device output.

use crate::packing::GpuTriangle;
use lux_math::{Vec2, Vec3};
use std::f32::consts::PI;

/// Fixed point light position.
pub const LIGHT_POSITION: Vec3 = Vec3::new(0.0, 4.0, 1.5);

/// Point light color, scaled by [`LIGHT_INTENSITY`] / distance².
pub const LIGHT_COLOR: Vec3 = Vec3::new(1.0, 0.98, 0.92);

pub const LIGHT_INTENSITY: f32 = 65.0;

/// Smallest accepted hit distance along a ray.
pub const HIT_EPSILON: f32 = 0.001;

/// Depth written when a ray escapes.
pub const MISS_DEPTH: f32 = 1.0e10;

/// Roughness/metallic written when nothing was hit.
pub const MISS_ROUGH_METAL: Vec2 = Vec2::new(0.7, 0.0);

const SKY_HORIZON: Vec3 = Vec3::new(0.70, 0.80, 1.00);
const SKY_GROUND: Vec3 = Vec3::new(0.08, 0.08, 0.10);

/// Möller–Trumbore test against a packed triangle.
///
/// Returns `(t, u, v)` with `u`/`v` the barycentrics of vertices 1 and 2.
pub fn intersect_triangle(origin: Vec3, dir: Vec3, tri: &GpuTriangle) -> Option<(f32, f32, f32)> {
    let e1 = tri.edge1();
    let e2 = tri.edge2();

    let pvec = dir.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;

    let tvec = origin - tri.vertex0();
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(e1);
    let v = dir.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(qvec) * inv_det;
    (t > HIT_EPSILON).then_some((t, u, v))
}

/// Vertical gradient used for misses and as the no-scene background.
pub fn environment_sky(dir: Vec3) -> Vec3 {
    let t = 0.5 * (dir.y + 1.0);
    SKY_HORIZON.lerp(SKY_GROUND, 1.0 - t)
}

/// Shading normal: interpolated vertex normal, else geometric normal, else +Y.
pub fn surface_normal(tri: &GpuTriangle, u: f32, v: f32) -> Vec3 {
    let [n0, n1, n2] = tri.normals();
    let w = 1.0 - u - v;

    let interpolated = n0 * w + n1 * u + n2 * v;
    if interpolated.length_squared() > 1e-12 {
        return interpolated.normalize();
    }

    let geometric = tri.edge1().cross(tri.edge2());
    if geometric.length_squared() > 1e-12 {
        geometric.normalize()
    } else {
        Vec3::Y
    }
}

pub fn surface_uv(tri: &GpuTriangle, u: f32, v: f32) -> Vec2 {
    let [uv0, uv1, uv2] = tri.uvs();
    uv0 * (1.0 - u - v) + uv1 * u + uv2 * v
}

/// Octahedral encoding of a unit vector into `[-1, 1]²`.
pub fn oct_encode(n: Vec3) -> Vec2 {
    let n = n / (n.x.abs() + n.y.abs() + n.z.abs() + 1e-8);
    let p = Vec2::new(n.x, n.y);
    if n.z < 0.0 {
        (Vec2::ONE - Vec2::new(p.y.abs(), p.x.abs())) * sign(p)
    } else {
        p
    }
}

pub fn oct_decode(e: Vec2) -> Vec3 {
    let mut v = Vec3::new(e.x, e.y, 1.0 - e.x.abs() - e.y.abs());
    if v.z < 0.0 {
        let xy = (Vec2::ONE - Vec2::new(v.y.abs(), v.x.abs())) * sign(Vec2::new(v.x, v.y));
        v.x = xy.x;
        v.y = xy.y;
    }
    v.normalize()
}

/// GLSL/WGSL `sign`: zero maps to zero.
fn sign(v: Vec2) -> Vec2 {
    let s = |x: f32| {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    };
    Vec2::new(s(v.x), s(v.y))
}

/// Surface properties at a hit, after material and texture lookup.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceHit {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo: Vec3,
    pub emissive: Vec3,
    pub roughness: f32,
    pub metallic: f32,
}

/// Outgoing radiance towards the camera.
///
/// Emission plus a view-aligned headlight plus one shadowed point light.
/// `occluded(origin, dir, t_max)` answers the shadow ray.
pub fn shade<F>(ray_dir: Vec3, hit: &SurfaceHit, occluded: F) -> Vec3
where
    F: FnOnce(Vec3, Vec3, f32) -> bool,
{
    let n = hit.normal;

    let headlight = n.dot(-ray_dir).max(0.0);
    let diffuse = hit.albedo * (headlight / PI) * 2.0;

    let to_light = LIGHT_POSITION - hit.position;
    let dist2 = to_light.length_squared();
    let dist = dist2.max(1e-8).sqrt();
    let light_dir = to_light / dist;
    let n_dot_l = n.dot(light_dir).max(0.0);

    let visible = n_dot_l > 0.0 && !occluded(hit.position + n * HIT_EPSILON, light_dir, dist - 0.002);
    let incoming = if visible {
        LIGHT_COLOR * (LIGHT_INTENSITY / dist2)
    } else {
        Vec3::ZERO
    };
    let direct = hit.albedo * (n_dot_l / PI) * incoming;

    hit.emissive + diffuse + direct
}

/// Per-pixel trace output, averaged over the frame's samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelSample {
    pub radiance: Vec3,
    pub albedo: Vec3,
    /// Octahedral-encoded shading normal.
    pub normal: Vec2,
    pub depth: f32,
    pub rough_metal: Vec2,
}

/// Running sums over the sample loop of one pixel.
#[derive(Clone, Copy, Debug)]
pub struct SampleSum {
    radiance: Vec3,
    albedo: Vec3,
    normal: Vec3,
    depth: f32,
    rough_metal: Vec2,
    hits: u32,
}

impl Default for SampleSum {
    fn default() -> Self {
        Self {
            radiance: Vec3::ZERO,
            albedo: Vec3::ZERO,
            normal: Vec3::ZERO,
            depth: 0.0,
            rough_metal: Vec2::ZERO,
            hits: 0,
        }
    }
}

impl SampleSum {
    pub fn add_hit(&mut self, radiance: Vec3, hit: &SurfaceHit, depth: f32) {
        self.radiance += radiance;
        self.albedo += hit.albedo;
        self.normal += hit.normal;
        self.depth += depth;
        self.rough_metal += Vec2::new(hit.roughness, hit.metallic);
        self.hits += 1;
    }

    pub fn add_miss(&mut self, ray_dir: Vec3) {
        self.radiance += environment_sky(ray_dir);
        self.normal += Vec3::Y;
        self.depth += MISS_DEPTH;
    }

    pub fn finish(&self, spp: u32) -> PixelSample {
        let inv = 1.0 / spp.max(1) as f32;

        let n = self.normal * inv;
        let normal = if n.length_squared() > 1e-12 {
            n.normalize()
        } else {
            Vec3::Y
        };

        PixelSample {
            radiance: self.radiance * inv,
            albedo: self.albedo * inv,
            normal: oct_encode(normal),
            depth: self.depth * inv,
            // Averaged over the samples that hit a surface
            rough_metal: if self.hits > 0 {
                self.rough_metal / self.hits as f32
            } else {
                MISS_ROUGH_METAL
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::TriangleInput;

    fn unit_triangle() -> GpuTriangle {
        GpuTriangle::from_input(&TriangleInput::flat(Vec3::ZERO, Vec3::X, Vec3::Y, 0))
    }

    #[test]
    fn test_intersect_hit() {
        let tri = unit_triangle();
        let (t, u, v) = intersect_triangle(Vec3::new(0.25, 0.25, 2.0), Vec3::NEG_Z, &tri).unwrap();

        assert!((t - 2.0).abs() < 1e-6);
        assert!((u - 0.25).abs() < 1e-6);
        assert!((v - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_intersect_miss_cases() {
        let tri = unit_triangle();

        // Outside the edge
        assert!(intersect_triangle(Vec3::new(0.8, 0.8, 2.0), Vec3::NEG_Z, &tri).is_none());
        // Parallel
        assert!(intersect_triangle(Vec3::new(0.2, 0.2, 2.0), Vec3::X, &tri).is_none());
        // Behind the origin
        assert!(intersect_triangle(Vec3::new(0.2, 0.2, 2.0), Vec3::Z, &tri).is_none());
        // Too close
        assert!(intersect_triangle(Vec3::new(0.2, 0.2, 0.0005), Vec3::NEG_Z, &tri).is_none());
    }

    #[test]
    fn test_sky_gradient() {
        assert!((environment_sky(Vec3::Y) - SKY_HORIZON).length() < 1e-6);
        assert!((environment_sky(Vec3::NEG_Y) - SKY_GROUND).length() < 1e-6);
    }

    #[test]
    fn test_oct_roundtrip_hemispheres() {
        for n in [
            Vec3::X,
            Vec3::NEG_Y,
            Vec3::Z,
            Vec3::new(0.3, -0.5, -0.8).normalize(),
            Vec3::new(-0.6, 0.2, 0.7).normalize(),
        ] {
            let decoded = oct_decode(oct_encode(n));
            assert!((decoded - n).length() < 1e-4, "{n:?} -> {decoded:?}");
        }
    }

    #[test]
    fn test_normal_fallbacks() {
        let mut tri = unit_triangle();
        assert!((surface_normal(&tri, 0.2, 0.2) - Vec3::Z).length() < 1e-6);

        tri.n0 = [0.0; 4];
        tri.n1 = [0.0; 4];
        tri.n2 = [0.0; 4];
        assert!((surface_normal(&tri, 0.2, 0.2) - Vec3::Z).length() < 1e-6);

        tri.e2 = tri.e1;
        assert_eq!(surface_normal(&tri, 0.2, 0.2), Vec3::Y);
    }

    #[test]
    fn test_shade_shadowed_vs_lit() {
        let hit = SurfaceHit {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            albedo: Vec3::ONE,
            emissive: Vec3::ZERO,
            roughness: 0.5,
            metallic: 0.0,
        };
        let dir = Vec3::NEG_Y;

        let lit = shade(dir, &hit, |_, _, _| false);
        let shadowed = shade(dir, &hit, |_, _, _| true);

        // Headlight alone: 1 / pi * 2
        assert!((shadowed - Vec3::splat(2.0 / PI)).length() < 1e-5);
        assert!(lit.x > shadowed.x);
    }

    #[test]
    fn test_sample_sum_miss_sentinels() {
        let mut sum = SampleSum::default();
        sum.add_miss(Vec3::Y);
        sum.add_miss(Vec3::Y);
        let px = sum.finish(2);

        assert_eq!(px.albedo, Vec3::ZERO);
        assert_eq!(px.depth, MISS_DEPTH);
        assert_eq!(px.rough_metal, MISS_ROUGH_METAL);
        assert!((oct_decode(px.normal) - Vec3::Y).length() < 1e-5);
        assert!((px.radiance - SKY_HORIZON).length() < 1e-6);
    }

    #[test]
    fn test_sample_sum_averages_rough_metal_over_hits() {
        let surface = |roughness, metallic| SurfaceHit {
            position: Vec3::ZERO,
            normal: Vec3::Y,
            albedo: Vec3::ONE,
            emissive: Vec3::ZERO,
            roughness,
            metallic,
        };

        let mut sum = SampleSum::default();
        sum.add_hit(Vec3::ONE, &surface(0.2, 1.0), 1.0);
        sum.add_miss(Vec3::Y);
        sum.add_hit(Vec3::ONE, &surface(0.6, 0.0), 1.0);
        let px = sum.finish(3);

        // The miss does not pull the average towards the sentinel
        assert!((px.rough_metal - Vec2::new(0.4, 0.5)).length() < 1e-6);
        assert!((px.albedo - Vec3::splat(2.0 / 3.0)).length() < 1e-6);
    }
}
