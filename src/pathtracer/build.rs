//! Binned SAH construction of the flat [`Bvh`].
//!
//! Nodes are emitted depth-first with both children of an internal node
//! stored next to each other, so `right = left + 1`.

use super::bvh::{Bvh, BvhNode, Primitive};
use crate::util::{Aabb, Vec3};

const BIN_COUNT: usize = 12;
/// Leaves are always made at or below this many primitives.
const LEAF_MAX: usize = 4;
/// Relative cost of one node visit against one primitive test.
const NODE_COST: f32 = 1.0;

/// Per-primitive data the builder works on.
#[derive(Clone, Copy)]
struct Item {
    bounds: Aabb,
    centroid: Vec3,
    prim: usize,
}

#[derive(Clone, Copy)]
struct Bin {
    bounds: Aabb,
    count: usize,
}

const EMPTY_BIN: Bin = Bin {
    bounds: Aabb::EMPTY,
    count: 0,
};

/// Chosen split: items whose centroid lies below `pos` on `axis` go left.
#[derive(Debug, Clone, Copy)]
struct SplitPlane {
    axis: usize,
    pos: f32,
    cost: f32,
}

/// Build a BVH over `prims`. The slice is left in place; leaves address it
/// through `Bvh::prim_indices`.
#[tracing::instrument(skip_all, fields(prim_count = prims.len()))]
pub fn build_bvh(prims: &[Primitive]) -> Bvh {
    if prims.is_empty() {
        return Bvh {
            nodes: vec![BvhNode::leaf(&Aabb::new(Vec3::ZERO, Vec3::ZERO), 0, 0)],
            prim_indices: Vec::new(),
        };
    }

    let mut items: Vec<Item> = prims
        .iter()
        .enumerate()
        .map(|(prim, p)| Item {
            bounds: p.aabb(),
            centroid: p.centroid(),
            prim,
        })
        .collect();

    let mut nodes = Vec::with_capacity(2 * prims.len());
    nodes.push(BvhNode::leaf(&Aabb::EMPTY, 0, 0));
    subdivide(&mut nodes, 0, &mut items, 0);

    let bvh = Bvh {
        nodes,
        prim_indices: items.iter().map(|it| it.prim).collect(),
    };
    tracing::debug!("bvh: {} nodes over {} primitives", bvh.nodes.len(), prims.len());
    bvh
}

/// Fill `nodes[slot]` for `items`, which start at `offset` in the final
/// index list.
fn subdivide(nodes: &mut Vec<BvhNode>, slot: usize, items: &mut [Item], offset: usize) {
    let bounds = items.iter().fold(Aabb::EMPTY, |mut acc, it| {
        acc.grow(&it.bounds);
        acc
    });
    if items.len() <= LEAF_MAX {
        nodes[slot] = BvhNode::leaf(&bounds, offset, items.len());
        return;
    }

    let leaf_cost = items.len() as f32 * bounds.area();
    let plane = match best_plane(items) {
        Some(p) if p.cost < leaf_cost => p,
        _ => {
            nodes[slot] = BvhNode::leaf(&bounds, offset, items.len());
            return;
        }
    };
    tracing::trace!(axis = plane.axis, cost = plane.cost, n = items.len(), "split");

    let mut mid = split_items(items, |it| it.centroid[plane.axis] < plane.pos);
    if mid == 0 || mid == items.len() {
        mid = items.len() / 2;
    }

    let left = nodes.len();
    nodes.push(BvhNode::leaf(&Aabb::EMPTY, 0, 0));
    nodes.push(BvhNode::leaf(&Aabb::EMPTY, 0, 0));
    nodes[slot] = BvhNode::internal(&bounds, left);

    let (lo, hi) = items.split_at_mut(mid);
    subdivide(nodes, left, lo, offset);
    subdivide(nodes, left + 1, hi, offset + mid);
}

/// Cheapest bin boundary over all three axes, if any axis has extent.
fn best_plane(items: &[Item]) -> Option<SplitPlane> {
    let centroids = items.iter().fold(Aabb::EMPTY, |mut acc, it| {
        acc.grow_point(it.centroid);
        acc
    });

    let mut best: Option<SplitPlane> = None;
    for axis in 0..3 {
        let lo = centroids.min[axis];
        let extent = centroids.max[axis] - lo;
        if extent <= 1e-8 {
            continue;
        }

        let scale = BIN_COUNT as f32 / extent;
        let mut bins = [EMPTY_BIN; BIN_COUNT];
        for it in items {
            let b = (((it.centroid[axis] - lo) * scale) as usize).min(BIN_COUNT - 1);
            bins[b].bounds.grow(&it.bounds);
            bins[b].count += 1;
        }

        // cost_below[k] covers bins 0..=k
        let mut cost_below = [0.0f32; BIN_COUNT - 1];
        let mut acc = EMPTY_BIN;
        for (k, bin) in bins[..BIN_COUNT - 1].iter().enumerate() {
            acc.bounds.grow(&bin.bounds);
            acc.count += bin.count;
            cost_below[k] = acc.count as f32 * acc.bounds.area();
        }

        let mut acc = EMPTY_BIN;
        for k in (1..BIN_COUNT).rev() {
            acc.bounds.grow(&bins[k].bounds);
            acc.count += bins[k].count;
            let cost = NODE_COST + cost_below[k - 1] + acc.count as f32 * acc.bounds.area();
            if best.is_none_or(|b| cost < b.cost) {
                best = Some(SplitPlane {
                    axis,
                    pos: lo + k as f32 / scale,
                    cost,
                });
            }
        }
    }
    best
}

/// Move items matching `below` to the front; returns how many matched.
fn split_items(items: &mut [Item], below: impl Fn(&Item) -> bool) -> usize {
    let mut front = 0;
    for i in 0..items.len() {
        if below(&items[i]) {
            items.swap(front, i);
            front += 1;
        }
    }
    front
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Ray;

    fn tri_at(c: Vec3) -> Primitive {
        Primitive::triangle(
            [c + Vec3::new(-0.5, -0.5, 0.0), c + Vec3::new(0.5, -0.5, 0.0), c + Vec3::new(0.0, 0.5, 0.0)],
            0,
        )
        .unwrap()
    }

    fn nearest(prims: &[Primitive], ray: &Ray) -> Option<f32> {
        prims
            .iter()
            .filter_map(|p| p.intersect(ray, 1e-4, f32::INFINITY))
            .map(|h| h.t)
            .reduce(f32::min)
    }

    #[test]
    fn test_no_primitives() {
        let bvh = build_bvh(&[]);
        assert_eq!(bvh.nodes.len(), 1);
        assert!(bvh.prim_indices.is_empty());
        assert!(bvh.intersect(&[], &Ray::new(Vec3::ZERO, Vec3::Z), 0.0, f32::INFINITY).is_none());
    }

    #[test]
    fn test_few_primitives_make_one_leaf() {
        let prims: Vec<_> = (0..3).map(|i| tri_at(Vec3::new(i as f32, 0.0, 0.0))).collect();
        let bvh = build_bvh(&prims);
        assert_eq!(bvh.nodes.len(), 1);
        assert!(bvh.nodes[0].is_leaf());
        assert_eq!(bvh.nodes[0].count, 3);
    }

    #[test]
    fn test_every_primitive_lands_in_one_leaf() {
        let prims: Vec<_> = (0..100).map(|i| tri_at(Vec3::new(i as f32 * 2.0, 0.0, 0.0))).collect();
        let bvh = build_bvh(&prims);
        assert!(!bvh.nodes[0].is_leaf());

        let mut seen = bvh.prim_indices.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());

        let leaf_total: u32 = bvh.nodes.iter().filter(|n| n.is_leaf()).map(|n| n.count).sum();
        assert_eq!(leaf_total, 100);

        let root = bvh.nodes[0].bounds();
        assert!(root.min.x < 0.0 && root.max.x > 198.0);
    }

    #[test]
    fn test_coincident_centroids_still_terminate() {
        let prims: Vec<_> = (0..20).map(|_| tri_at(Vec3::ZERO)).collect();
        let bvh = build_bvh(&prims);
        assert_eq!(bvh.prim_indices.len(), 20);
    }

    #[test]
    fn test_nearest_hit_agrees_with_linear_scan() {
        let mut prims: Vec<_> = (0..60)
            .map(|i| tri_at(Vec3::new((i % 10) as f32 * 1.5, (i / 10) as f32 * 1.5, -(i as f32) * 0.1)))
            .collect();
        prims.push(Primitive::sphere(Vec3::new(5.0, 3.0, -20.0), 2.0, 1));
        let bvh = build_bvh(&prims);

        for k in 0..40 {
            let origin = Vec3::new((k % 8) as f32 * 1.3, (k / 8) as f32 * 1.7, 10.0);
            let ray = Ray::new(origin, Vec3::new(0.05, -0.02, -1.0));
            let via_bvh = bvh.intersect(&prims, &ray, 1e-4, f32::INFINITY).map(|h| h.t);
            assert_eq!(via_bvh, nearest(&prims, &ray), "ray {}", k);
        }
    }
}
