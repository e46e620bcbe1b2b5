//! Binary bounding volume hierarchy over arbitrary surfaces.
//!
//! Nodes live in an arena addressed by `NodeIdx`, root is always the first node.
//! Surfaces are owned by the tree and stay in insertion order, so `SurfaceIdx` doubles as
//! a stable surface identity; leaves refer to contiguous runs of a separate permutation
//! of surface indices.
//! The tree is immutable once built, rebuilding means building a new one.

mod building;
mod printing;
mod ray_bvh_intersection;

use index_vec::IndexVec;

use crate::geometry::{TimeInterval, WorldBox};

pub use building::{BuildSettings, SplitStrategy};
pub use printing::BvhStatistics;
pub use ray_bvh_intersection::TraversalStats;

/// Depth after which the surface area heuristic gives up and splits at the median.
/// Median splits of the remaining (at most 2^32) surfaces add at most 32 more levels.
const MAX_SAH_DEPTH: usize = 32;
const MAX_DEPTH: usize = MAX_SAH_DEPTH + 32;

/// Traversal keeps at most one postponed sibling per level.
const TRAVERSAL_STACK_SIZE: usize = MAX_DEPTH + 1;

#[derive(Clone, Debug)]
pub struct Bvh<S> {
    nodes: IndexVec<NodeIdx, Node>,
    leaf_surfaces: Vec<SurfaceIdx>,
    surfaces: IndexVec<SurfaceIdx, S>,

    /// Time interval the node boxes are valid for
    interval: TimeInterval,
}

#[derive(Clone, Debug, PartialEq)]
enum Node {
    Leaf {
        bounds: WorldBox,
        surfaces: LeafRange,
    },
    Inner {
        bounds: WorldBox,
        children: [NodeIdx; 2],
        /// Axis along which the children were split
        axis: u8,
    },
}

impl Node {
    fn bounds(&self) -> &WorldBox {
        match self {
            Node::Leaf { bounds, .. } | Node::Inner { bounds, .. } => bounds,
        }
    }
}

/// Range of `Bvh::leaf_surfaces` belonging to a single leaf.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct LeafRange {
    first: u32,
    count: u32,
}

impl LeafRange {
    fn into_range(self) -> std::ops::Range<usize> {
        let first = self.first as usize;
        first..first + self.count as usize
    }
}

index_vec::define_index_type! {
    /// Index of a surface in the order it was added.
    pub struct SurfaceIdx = u32;
}

index_vec::define_index_type! {
    struct NodeIdx = u32;
}

impl NodeIdx {
    fn root() -> NodeIdx {
        NodeIdx::from_usize(0)
    }
}

impl<S> Bvh<S> {
    /// Number of surfaces in the tree.
    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn surface(&self, index: SurfaceIdx) -> Option<&S> {
        self.surfaces.get(index)
    }

    pub fn surfaces(&self) -> impl Iterator<Item = (SurfaceIdx, &S)> {
        self.surfaces.iter_enumerated()
    }

    /// Box enclosing every surface over the whole build interval.
    pub fn bounding_box(&self) -> WorldBox {
        *self.root().bounds()
    }

    pub fn interval(&self) -> TimeInterval {
        self.interval
    }

    /// Dismantles the tree, returning the surfaces in insertion order.
    pub fn into_surfaces(self) -> Vec<S> {
        self.surfaces.raw
    }

    fn root(&self) -> &Node {
        &self.nodes[NodeIdx::root()]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::assert;
    use proptest::prelude::*;
    use test_strategy::proptest;

    use crate::{
        geometry::{FloatType, Ray, RayIntersectionExt as _, WorldPoint, WorldVector},
        scene::{
            HitRecord, Surface,
            primitives::{MovingSphere, Primitive, Sphere},
        },
    };

    pub fn sphere_strategy() -> impl Strategy<Value = Primitive> {
        (
            (-50.0f32..50.0, -50.0f32..50.0, -50.0f32..50.0),
            0.1f32..5.0,
            prop::option::of((-5.0f32..5.0, -5.0f32..5.0, -5.0f32..5.0)),
        )
            .prop_map(|((x, y, z), radius, motion)| {
                let center = WorldPoint::new(x, y, z);
                match motion {
                    None => Primitive::Sphere(Sphere::new(center, radius)),
                    Some((dx, dy, dz)) => Primitive::MovingSphere(MovingSphere::new(
                        [center, center + WorldVector::new(dx, dy, dz)],
                        TimeInterval::new(0.0, 1.0),
                        radius,
                    )),
                }
            })
    }

    pub fn scene_strategy(max_size: usize) -> impl Strategy<Value = Vec<Primitive>> {
        prop::collection::vec(sphere_strategy(), 0..max_size)
    }

    pub fn ray_strategy() -> impl Strategy<Value = Ray> {
        (
            (-80.0f32..80.0, -80.0f32..80.0, -80.0f32..80.0),
            (-1.0f32..1.0, -1.0f32..1.0, -1.0f32..1.0),
            0.0f32..1.0,
        )
            .prop_map(|((x, y, z), (dx, dy, dz), time)| {
                Ray::with_time(WorldPoint::new(x, y, z), WorldVector::new(dx, dy, dz), time)
            })
    }

    /// Nearest hit found by testing every surface.
    pub fn brute_force(
        surfaces: &[Primitive],
        ray: &Ray,
        start: FloatType,
        end: FloatType,
    ) -> Option<(usize, FloatType)> {
        let mut best: Option<(usize, FloatType)> = None;
        for (i, s) in surfaces.iter().enumerate() {
            let limit = best.map_or(end, |(_, t)| t);
            if let Some(hit) = s.hit(ray, start, limit) {
                if best.is_none_or(|(_, t)| hit.t < t) {
                    best = Some((i, hit.t));
                }
            }
        }
        best
    }

    fn build(surfaces: Vec<Primitive>, settings: &BuildSettings) -> Bvh<Primitive> {
        Bvh::build(surfaces, TimeInterval::new(0.0, 1.0), settings)
    }

    /// Walks the tree, checking structure invariants and returning surface indices in leaf order.
    fn check_node(bvh: &Bvh<Primitive>, index: NodeIdx, seen: &mut Vec<SurfaceIdx>) -> WorldBox {
        match &bvh.nodes[index] {
            Node::Leaf { bounds, surfaces } => {
                for &surface in &bvh.leaf_surfaces[surfaces.into_range()] {
                    let surface_box = bvh.surfaces[surface].bounding_box(&bvh.interval);
                    assert!(bounds.contains(&surface_box));
                    seen.push(surface);
                }
                *bounds
            }
            Node::Inner {
                bounds, children, ..
            } => {
                assert!(children[0] > index);
                assert!(children[1] > index);
                let left = check_node(bvh, children[0], seen);
                let right = check_node(bvh, children[1], seen);
                assert!(*bounds == left.union(&right));
                *bounds
            }
        }
    }

    #[test]
    fn empty_tree_is_single_empty_leaf() {
        let bvh = build(Vec::new(), &BuildSettings::default());
        assert!(bvh.node_count() == 1);
        assert!(bvh.is_empty());
        assert!(bvh.bounding_box().is_empty());

        let ray = Ray::new(WorldPoint::origin(), WorldVector::x());
        let mut record = HitRecord::default();
        assert!(!bvh.hit(&ray, 0.0, FloatType::INFINITY, &mut record));
        assert!(!bvh.bounding_box().intersects(&ray, 0.0, FloatType::INFINITY));
    }

    #[test]
    fn small_input_is_single_leaf() {
        let surfaces = (0..4)
            .map(|i| Primitive::Sphere(Sphere::new(WorldPoint::new(i as f32, 0.0, 0.0), 0.5)))
            .collect();
        let bvh = build(surfaces, &BuildSettings::default());
        assert!(bvh.node_count() == 1);
        assert!(matches!(bvh.root(), Node::Leaf { .. }));
    }

    #[test]
    fn into_surfaces_keeps_insertion_order() {
        let surfaces: Vec<_> = (0..20)
            .map(|i| Primitive::Sphere(Sphere::new(WorldPoint::new((i * 7 % 20) as f32, 0.0, 0.0), 0.5)))
            .collect();
        let bvh = build(surfaces.clone(), &BuildSettings::default());
        let returned = bvh.into_surfaces();
        let centers = |s: &[Primitive]| {
            s.iter()
                .map(|p| p.bounding_box(&TimeInterval::default()).center())
                .collect::<Vec<_>>()
        };
        assert!(centers(&returned) == centers(&surfaces));
    }

    /// Every surface is in exactly one leaf and every node box encloses its subtree.
    #[proptest]
    fn structure_invariants(
        #[strategy(scene_strategy(200))] surfaces: Vec<Primitive>,
        #[strategy(1usize..8)] leaf_size: usize,
        sah: bool,
    ) {
        let split = if sah {
            SplitStrategy::SurfaceAreaHeuristic { bins: 12 }
        } else {
            SplitStrategy::Median
        };
        let settings = BuildSettings::builder().leaf_size(leaf_size).split(split).build();
        let count = surfaces.len();
        let bvh = build(surfaces, &settings);

        let mut seen = Vec::new();
        check_node(&bvh, NodeIdx::root(), &mut seen);
        seen.sort();
        prop_assert!(seen == (0..count).map(SurfaceIdx::from_usize).collect::<Vec<_>>());

        for node in bvh.nodes.iter() {
            if let Node::Leaf { surfaces, .. } = node {
                prop_assert!(surfaces.count as usize <= leaf_size);
            }
        }
    }

    /// Sampled moving spheres stay inside the boxes of all their ancestors.
    #[proptest]
    fn boxes_enclose_motion(
        #[strategy(scene_strategy(100))] surfaces: Vec<Primitive>,
        #[strategy(0.0f32..=1.0)] time: f32,
    ) {
        let bvh = build(surfaces, &BuildSettings::default());
        let instant = TimeInterval::instant(time);
        for (_, surface) in bvh.surfaces() {
            prop_assert!(bvh.bounding_box().contains(&surface.bounding_box(&instant)));
        }
        fn visit(bvh: &Bvh<Primitive>, index: NodeIdx, instant: &TimeInterval) -> Vec<WorldBox> {
            match &bvh.nodes[index] {
                Node::Leaf { surfaces, bounds } => {
                    let boxes: Vec<_> = bvh.leaf_surfaces[surfaces.into_range()]
                        .iter()
                        .map(|&s| bvh.surfaces[s].bounding_box(instant))
                        .collect();
                    assert!(boxes.iter().all(|b| bounds.contains(b)));
                    boxes
                }
                Node::Inner { children, bounds, .. } => {
                    let mut boxes = visit(bvh, children[0], instant);
                    boxes.extend(visit(bvh, children[1], instant));
                    assert!(boxes.iter().all(|b| bounds.contains(b)));
                    boxes
                }
            }
        }
        visit(&bvh, NodeIdx::root(), &instant);
    }
}
