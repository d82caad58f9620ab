//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! The tree is stored as a flat node array plus a permutation of primitive
//! indices; leaves reference contiguous ranges of that permutation. Node 0 is
//! the root. Construction strategy lives behind [`BvhBuilder`] so a different
//! split heuristic can produce the same layout.
//!
//! # Traversal depth
//!
//! Traversal pops one node and pushes both children, so a leaf at depth `d`
//! needs at most `d + 1` stack entries. [`MedianSplitBuilder`] halves the
//! primitive count at every level and stops at [`LEAF_MAX_SIZE`], so its
//! leaf depth is at most `ceil(log2(N / LEAF_MAX_SIZE))`, which is 29 for
//! any `N` that fits in a `u32`. Other builders carry no such bound, which is
//! why [`Bvh::validate_traversal_depth`] is checked before a tree is used.

use crate::SceneError;
use bytemuck::{Pod, Zeroable};
use lux_math::{Aabb, Vec3};

/// Maximum primitives per leaf node before splitting.
pub const LEAF_MAX_SIZE: usize = 8;

/// Capacity of the explicit traversal stack used by the trace stage.
pub const MAX_TRAVERSAL_STACK: usize = 64;

/// Bounds and centroid of one primitive, the only input a builder sees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimitiveBounds {
    pub bounds: Aabb,
    pub centroid: Vec3,
}

impl PrimitiveBounds {
    pub fn new(bounds: Aabb) -> Self {
        Self {
            bounds,
            centroid: bounds.centroid(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BvhNodeKind {
    /// Internal node with indices of its two children.
    Internal { left: u32, right: u32 },
    /// Leaf covering `indices[first..first + count]`.
    Leaf { first: u32, count: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BvhNode {
    pub bounds: Aabb,
    pub kind: BvhNodeKind,
}

/// A built hierarchy: node arena plus primitive permutation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bvh {
    pub nodes: Vec<BvhNode>,
    pub indices: Vec<u32>,
}

/// Tree construction strategy.
pub trait BvhBuilder {
    fn build(&self, primitives: &[PrimitiveBounds]) -> Bvh;
}

/// Recursive median split on the axis of largest centroid extent.
///
/// Uses an O(n) selection per level rather than a full sort. Tree quality
/// depends on input ordering; no surface area heuristic is applied.
#[derive(Clone, Copy, Debug)]
pub struct MedianSplitBuilder {
    pub leaf_max_size: usize,
}

impl Default for MedianSplitBuilder {
    fn default() -> Self {
        Self {
            leaf_max_size: LEAF_MAX_SIZE,
        }
    }
}

impl BvhBuilder for MedianSplitBuilder {
    fn build(&self, primitives: &[PrimitiveBounds]) -> Bvh {
        let mut bvh = Bvh {
            nodes: Vec::with_capacity(2 * primitives.len()),
            indices: (0..primitives.len() as u32).collect(),
        };

        if !primitives.is_empty() {
            self.build_range(primitives, &mut bvh, 0, primitives.len());
        }

        bvh
    }
}

impl MedianSplitBuilder {
    /// Build the subtree for `indices[first..first + count]`, returning its
    /// node index.
    fn build_range(
        &self,
        primitives: &[PrimitiveBounds],
        bvh: &mut Bvh,
        first: usize,
        count: usize,
    ) -> u32 {
        let range = first..first + count;

        let bounds = bvh.indices[range.clone()]
            .iter()
            .fold(Aabb::EMPTY, |acc, &i| Aabb::union(&acc, &primitives[i as usize].bounds));

        let node_index = bvh.nodes.len() as u32;

        if count <= self.leaf_max_size.max(1) {
            bvh.nodes.push(BvhNode {
                bounds,
                kind: BvhNodeKind::Leaf {
                    first: first as u32,
                    count: count as u32,
                },
            });
            return node_index;
        }

        // Placeholder, patched once both children exist
        bvh.nodes.push(BvhNode {
            bounds,
            kind: BvhNodeKind::Internal { left: 0, right: 0 },
        });

        let mut centroid_bounds = Aabb::EMPTY;
        for &i in &bvh.indices[range.clone()] {
            centroid_bounds.grow_point(primitives[i as usize].centroid);
        }
        let axis = centroid_bounds.longest_axis();

        let half = count / 2;
        bvh.indices[range].select_nth_unstable_by(half, |&a, &b| {
            let ca = primitives[a as usize].centroid[axis];
            let cb = primitives[b as usize].centroid[axis];
            ca.total_cmp(&cb)
        });

        let left = self.build_range(primitives, bvh, first, half);
        let right = self.build_range(primitives, bvh, first + half, count - half);

        bvh.nodes[node_index as usize].kind = BvhNodeKind::Internal { left, right };

        node_index
    }
}

impl Bvh {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth of the deepest leaf (root is depth 0).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut deepest = 0;
        let mut stack = vec![(0u32, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            match self.nodes[index as usize].kind {
                BvhNodeKind::Leaf { .. } => deepest = deepest.max(depth),
                BvhNodeKind::Internal { left, right } => {
                    stack.push((left, depth + 1));
                    stack.push((right, depth + 1));
                }
            }
        }
        deepest
    }

    /// Stack entries needed to traverse this tree.
    pub fn required_stack(&self) -> usize {
        if self.nodes.is_empty() {
            0
        } else {
            self.depth() + 1
        }
    }

    /// Reject trees too deep for the fixed-capacity traversal stack.
    pub fn validate_traversal_depth(&self) -> Result<(), SceneError> {
        let required = self.required_stack();
        if required > MAX_TRAVERSAL_STACK {
            return Err(SceneError::TraversalTooDeep {
                depth: self.depth(),
                required,
                limit: MAX_TRAVERSAL_STACK,
            });
        }
        Ok(())
    }

    /// Convert to the layout read by the trace stage.
    pub fn to_gpu_nodes(&self) -> Vec<GpuBvhNode> {
        self.nodes.iter().map(GpuBvhNode::from).collect()
    }
}

/// BVH node as stored in the device buffer (48 bytes).
///
/// `meta` is `[left, right, 0, 0]` for internal nodes and
/// `[0, 0, first, count]` for leaves; a non-zero count marks a leaf.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuBvhNode {
    pub min: [f32; 4],
    pub max: [f32; 4],
    pub meta: [u32; 4],
}

impl GpuBvhNode {
    pub fn bounds(&self) -> Aabb {
        Aabb {
            min: Vec3::new(self.min[0], self.min[1], self.min[2]),
            max: Vec3::new(self.max[0], self.max[1], self.max[2]),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.meta[3] > 0
    }

    pub fn children(&self) -> (u32, u32) {
        (self.meta[0], self.meta[1])
    }

    /// `(first, count)` of a leaf's primitive range.
    pub fn leaf_range(&self) -> (u32, u32) {
        (self.meta[2], self.meta[3])
    }
}

impl From<&BvhNode> for GpuBvhNode {
    fn from(node: &BvhNode) -> Self {
        let meta = match node.kind {
            BvhNodeKind::Internal { left, right } => [left, right, 0, 0],
            BvhNodeKind::Leaf { first, count } => [0, 0, first, count],
        };

        Self {
            min: node.bounds.min.extend(0.0).to_array(),
            max: node.bounds.max.extend(0.0).to_array(),
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so tests don't need a rand dependency.
    fn lcg(state: &mut u32) -> f32 {
        *state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        (*state >> 8) as f32 / (1u32 << 24) as f32
    }

    fn random_boxes(n: usize, seed: u32) -> Vec<PrimitiveBounds> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                let p = Vec3::new(lcg(&mut state), lcg(&mut state), lcg(&mut state)) * 10.0;
                let s = Vec3::new(lcg(&mut state), lcg(&mut state), lcg(&mut state)) * 0.5;
                PrimitiveBounds::new(Aabb::from_points(p, p + s))
            })
            .collect()
    }

    fn check_invariants(bvh: &Bvh, primitives: &[PrimitiveBounds]) {
        let n = primitives.len();
        assert!(bvh.nodes.len() <= 2 * n - 1);

        let mut covered = vec![0u32; n];
        let mut stack = vec![0u32];
        while let Some(index) = stack.pop() {
            let node = &bvh.nodes[index as usize];
            match node.kind {
                BvhNodeKind::Leaf { first, count } => {
                    assert!(count > 0);
                    for slot in first..first + count {
                        covered[slot as usize] += 1;
                        let prim = &primitives[bvh.indices[slot as usize] as usize];
                        assert!(node.bounds.contains(&prim.bounds));
                    }
                }
                BvhNodeKind::Internal { left, right } => {
                    for child in [left, right] {
                        assert!(node.bounds.contains(&bvh.nodes[child as usize].bounds));
                        stack.push(child);
                    }
                }
            }
        }

        // Leaf ranges partition [0, n) exactly once
        assert!(covered.iter().all(|&c| c == 1));

        let mut sorted = bvh.indices.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_input() {
        let bvh = MedianSplitBuilder::default().build(&[]);
        assert!(bvh.is_empty());
        assert_eq!(bvh.depth(), 0);
        assert!(bvh.validate_traversal_depth().is_ok());
    }

    #[test]
    fn test_single_leaf() {
        let prims = random_boxes(5, 1);
        let bvh = MedianSplitBuilder::default().build(&prims);

        assert_eq!(bvh.node_count(), 1);
        assert_eq!(bvh.nodes[0].kind, BvhNodeKind::Leaf { first: 0, count: 5 });
        check_invariants(&bvh, &prims);
    }

    #[test]
    fn test_invariants_random_sets() {
        for (n, seed) in [(9, 2), (64, 3), (1000, 4), (4097, 5)] {
            let prims = random_boxes(n, seed);
            let bvh = MedianSplitBuilder::default().build(&prims);
            check_invariants(&bvh, &prims);
        }
    }

    #[test]
    fn test_leaf_size_respected() {
        let prims = random_boxes(500, 7);
        let bvh = MedianSplitBuilder::default().build(&prims);

        for node in &bvh.nodes {
            if let BvhNodeKind::Leaf { count, .. } = node.kind {
                assert!(count as usize <= LEAF_MAX_SIZE);
            }
        }
    }

    #[test]
    fn test_depth_bound_for_coincident_centroids() {
        // Identical primitives give zero centroid extent on every axis
        let p = PrimitiveBounds::new(Aabb::from_points(Vec3::ZERO, Vec3::ONE));
        let prims = vec![p; 10_000];
        let bvh = MedianSplitBuilder::default().build(&prims);

        check_invariants(&bvh, &prims);
        // ceil(log2(10000 / 8)) = 11
        assert!(bvh.depth() <= 11);
        assert!(bvh.validate_traversal_depth().is_ok());
    }

    #[test]
    fn test_median_split_partitions_on_axis() {
        let prims: Vec<_> = (0..16)
            .rev()
            .map(|i| {
                let p = Vec3::new(i as f32, 0.0, 0.0);
                PrimitiveBounds::new(Aabb::from_points(p, p + Vec3::splat(0.1)))
            })
            .collect();
        let bvh = MedianSplitBuilder::default().build(&prims);

        let BvhNodeKind::Internal { left, right } = bvh.nodes[0].kind else {
            panic!("root should be internal");
        };
        assert!(bvh.nodes[left as usize].bounds.max.x < bvh.nodes[right as usize].bounds.min.x);
    }

    #[test]
    fn test_validate_rejects_deep_tree() {
        // Degenerate chain, as a foreign builder might produce: internal node
        // 2k has its leaf at 2k + 1 and the next internal node at 2k + 2
        let depth = MAX_TRAVERSAL_STACK;
        let bounds = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let mut nodes = Vec::new();
        for k in 0..depth as u32 {
            nodes.push(BvhNode {
                bounds,
                kind: BvhNodeKind::Internal {
                    left: 2 * k + 2,
                    right: 2 * k + 1,
                },
            });
            nodes.push(BvhNode {
                bounds,
                kind: BvhNodeKind::Leaf { first: 0, count: 1 },
            });
        }
        nodes.push(BvhNode {
            bounds,
            kind: BvhNodeKind::Leaf { first: 0, count: 1 },
        });

        let bvh = Bvh {
            nodes,
            indices: vec![0],
        };
        assert_eq!(bvh.depth(), depth);
        assert!(matches!(
            bvh.validate_traversal_depth(),
            Err(SceneError::TraversalTooDeep { .. })
        ));
    }

    #[test]
    fn test_gpu_node_layout() {
        assert_eq!(std::mem::size_of::<GpuBvhNode>(), 48);

        let leaf = BvhNode {
            bounds: Aabb::from_points(Vec3::ZERO, Vec3::ONE),
            kind: BvhNodeKind::Leaf { first: 3, count: 2 },
        };
        let gpu = GpuBvhNode::from(&leaf);
        assert!(gpu.is_leaf());
        assert_eq!(gpu.leaf_range(), (3, 2));
        assert_eq!(gpu.bounds(), leaf.bounds);

        let internal = BvhNode {
            bounds: leaf.bounds,
            kind: BvhNodeKind::Internal { left: 1, right: 2 },
        };
        let gpu = GpuBvhNode::from(&internal);
        assert!(!gpu.is_leaf());
        assert_eq!(gpu.children(), (1, 2));
    }
}
