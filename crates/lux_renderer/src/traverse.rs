//! Stack-based BVH traversal over the packed scene layout.
//!
//! Walks the same `GpuBvhNode`/index/triangle arrays the trace shader reads,
//! with the same fixed-capacity stack.

use lux_core::bvh::MAX_TRAVERSAL_STACK;
use lux_core::shading::intersect_triangle;
use lux_core::{GpuBvhNode, GpuTriangle};
use lux_math::{Interval, Ray, Vec3};

/// Closest intersection found by [`SceneView::closest_hit`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TriangleHit {
    pub t: f32,
    pub triangle: u32,
    pub u: f32,
    pub v: f32,
}

/// Borrowed view of the packed scene arrays.
#[derive(Clone, Copy)]
pub struct SceneView<'a> {
    pub nodes: &'a [GpuBvhNode],
    pub indices: &'a [u32],
    pub triangles: &'a [GpuTriangle],
}

impl<'a> SceneView<'a> {
    /// Visit every leaf whose box overlaps `[0, t_max]`. `leaf` returns the
    /// new `t_max`, or `None` to stop.
    fn walk<F>(&self, origin: Vec3, dir: Vec3, mut t_max: f32, mut leaf: F)
    where
        F: FnMut(u32, u32, f32) -> Option<f32>,
    {
        if self.nodes.is_empty() {
            return;
        }

        let ray = Ray::new(origin, dir);
        let mut stack = [0u32; MAX_TRAVERSAL_STACK];
        let mut sp = 1;

        while sp > 0 {
            sp -= 1;
            let node = &self.nodes[stack[sp] as usize];

            if node.bounds().hit(&ray, Interval::FORWARD.with_max(t_max)).is_none() {
                continue;
            }

            if node.is_leaf() {
                let (first, count) = node.leaf_range();
                match leaf(first, count, t_max) {
                    Some(t) => t_max = t,
                    None => return,
                }
            } else if sp + 2 <= MAX_TRAVERSAL_STACK {
                let (left, right) = node.children();
                stack[sp] = left;
                stack[sp + 1] = right;
                sp += 2;
            } else {
                // Unreachable for depth-validated trees; the shader drops the
                // subtree the same way
                log::warn!("BVH traversal stack overflow, subtree skipped");
            }
        }
    }

    /// Nearest triangle hit with `t < t_max`.
    pub fn closest_hit(&self, origin: Vec3, dir: Vec3, t_max: f32) -> Option<TriangleHit> {
        let mut best: Option<TriangleHit> = None;

        self.walk(origin, dir, t_max, |first, count, t_best| {
            let mut t_best = t_best;
            for slot in first..first + count {
                let tid = self.indices[slot as usize];
                let tri = &self.triangles[tid as usize];
                if let Some((t, u, v)) = intersect_triangle(origin, dir, tri) {
                    if t < t_best {
                        t_best = t;
                        best = Some(TriangleHit { t, triangle: tid, u, v });
                    }
                }
            }
            Some(t_best)
        });

        best
    }

    /// Whether any triangle blocks the segment `(0, t_max)`.
    pub fn occluded(&self, origin: Vec3, dir: Vec3, t_max: f32) -> bool {
        let mut blocked = false;

        self.walk(origin, dir, t_max, |first, count, t_max| {
            for slot in first..first + count {
                let tri = &self.triangles[self.indices[slot as usize] as usize];
                if matches!(intersect_triangle(origin, dir, tri), Some((t, _, _)) if t < t_max) {
                    blocked = true;
                    return None;
                }
            }
            Some(t_max)
        });

        blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lux_core::{pack_scene, MaterialInput, MedianSplitBuilder, PackedScene, TriangleInput};

    /// A row of unit triangles along +x at z = -i.
    fn wall_scene(n: usize) -> PackedScene<()> {
        let triangles: Vec<_> = (0..n)
            .map(|i| {
                let z = -(i as f32);
                TriangleInput::flat(
                    Vec3::new(-1.0, -1.0, z),
                    Vec3::new(1.0, -1.0, z),
                    Vec3::new(0.0, 1.0, z),
                    0,
                )
            })
            .collect();
        let materials = vec![MaterialInput::default()];
        pack_scene(&triangles, &materials, 16, &MedianSplitBuilder::default())
            .unwrap()
            .unwrap()
    }

    fn view(scene: &PackedScene<()>) -> SceneView<'_> {
        SceneView {
            nodes: &scene.nodes,
            indices: &scene.indices,
            triangles: &scene.triangles,
        }
    }

    #[test]
    fn test_closest_hit_picks_nearest() {
        let scene = wall_scene(50);
        let hit = view(&scene)
            .closest_hit(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, f32::INFINITY)
            .unwrap();

        assert_eq!(hit.triangle, 0);
        assert!((hit.t - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_closest_hit_matches_brute_force() {
        let scene = wall_scene(37);
        let origin = Vec3::new(0.1, 0.2, -10.5);
        let dir = Vec3::new(0.0, 0.0, 1.0);

        let brute = scene
            .triangles
            .iter()
            .enumerate()
            .filter_map(|(i, tri)| intersect_triangle(origin, dir, tri).map(|(t, _, _)| (t, i as u32)))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let hit = view(&scene).closest_hit(origin, dir, f32::INFINITY).unwrap();
        assert_eq!(Some((hit.t, hit.triangle)), brute);
    }

    #[test]
    fn test_miss_and_t_max() {
        let scene = wall_scene(10);
        let v = view(&scene);

        assert!(v.closest_hit(Vec3::new(5.0, 0.0, 5.0), Vec3::NEG_Z, f32::INFINITY).is_none());
        assert!(v.closest_hit(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, 4.0).is_none());
    }

    #[test]
    fn test_occluded() {
        let scene = wall_scene(3);
        let v = view(&scene);

        assert!(v.occluded(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, 10.0));
        assert!(!v.occluded(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, 4.9));
        assert!(!v.occluded(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, 10.0));
    }

    #[test]
    fn test_empty_scene() {
        let v = SceneView {
            nodes: &[],
            indices: &[],
            triangles: &[],
        };
        assert!(v.closest_hit(Vec3::ZERO, Vec3::X, f32::INFINITY).is_none());
        assert!(!v.occluded(Vec3::ZERO, Vec3::X, 1.0));
    }
}
