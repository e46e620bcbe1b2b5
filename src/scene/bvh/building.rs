use std::{thread, time::Instant};

use bon::bon;
use index_vec::IndexVec;
use ordered_float::OrderedFloat;

use crate::{
    geometry::{TimeInterval, WorldBox, WorldPoint},
    scene::Surface,
};

use super::{Bvh, LeafRange, MAX_SAH_DEPTH, Node, NodeIdx, SurfaceIdx};

const DEFAULT_LEAF_SIZE: usize = 4;
const DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Sort by box center along the longest axis, split in two equally sized halves.
    #[default]
    Median,
    /// Binned surface area heuristic along the longest axis.
    SurfaceAreaHeuristic { bins: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildSettings {
    /// Maximum number of surfaces in a leaf
    pub leaf_size: usize,
    pub split: SplitStrategy,
    /// Subsets with at least this many surfaces build their two halves in parallel
    pub parallel_threshold: usize,
}

#[bon]
impl BuildSettings {
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_LEAF_SIZE)] leaf_size: usize,
        #[builder(default)] split: SplitStrategy,
        #[builder(default = DEFAULT_PARALLEL_THRESHOLD)] parallel_threshold: usize,
    ) -> Self {
        let split = match split {
            SplitStrategy::SurfaceAreaHeuristic { bins } => {
                SplitStrategy::SurfaceAreaHeuristic { bins: bins.max(2) }
            }
            median => median,
        };
        BuildSettings {
            leaf_size: leaf_size.max(1),
            split,
            parallel_threshold: parallel_threshold.max(2),
        }
    }
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings::builder().build()
    }
}

impl<S: Surface> Bvh<S> {
    /// Builds the tree over the surfaces, with boxes valid over the whole `interval`.
    /// The same input order and settings always give the same tree.
    pub fn build(surfaces: Vec<S>, interval: TimeInterval, settings: &BuildSettings) -> Bvh<S> {
        let start = Instant::now();
        let surfaces: IndexVec<SurfaceIdx, S> = IndexVec::from_vec(surfaces);

        let mut items: Vec<BuildItem> = surfaces
            .iter_enumerated()
            .map(|(index, surface)| BuildItem::new(index, surface.bounding_box(&interval)))
            .collect();

        let builder = Builder {
            settings,
            parallel_levels: parallel_levels(num_cpus::get()),
        };
        let root = builder.build_recursive(&mut items, 0, 0);

        let mut bvh = Bvh {
            nodes: IndexVec::new(),
            leaf_surfaces: items.iter().map(|item| item.index).collect(),
            surfaces,
            interval,
        };
        bvh.flatten(root);

        log::debug!(
            "Built tree over {} surfaces: {} nodes in {:.1?}",
            bvh.len(),
            bvh.node_count(),
            start.elapsed()
        );
        bvh
    }
}

impl<S> Bvh<S> {
    /// Moves a build tree into the node arena, depth first, parents before children.
    fn flatten(&mut self, node: BuildNode) -> NodeIdx {
        match node {
            BuildNode::Leaf { bounds, surfaces } => self.nodes.push(Node::Leaf { bounds, surfaces }),
            BuildNode::Inner {
                bounds,
                axis,
                children,
            } => {
                // Create placeholder node that will be overwriten later
                let node_index = self.nodes.push(Node::Leaf {
                    bounds,
                    surfaces: LeafRange { first: 0, count: 0 },
                });

                let [left, right] = *children;
                let children = [self.flatten(left), self.flatten(right)];

                self.nodes[node_index] = Node::Inner {
                    bounds,
                    children,
                    axis,
                };
                node_index
            }
        }
    }
}

/// Per-surface data needed while building, computed once up front.
#[derive(Copy, Clone, Debug)]
struct BuildItem {
    index: SurfaceIdx,
    bounds: WorldBox,
    center: WorldPoint,
}

impl BuildItem {
    fn new(index: SurfaceIdx, bounds: WorldBox) -> BuildItem {
        BuildItem {
            index,
            bounds,
            center: bounds.center(),
        }
    }

    fn sort_key(&self, axis: usize) -> OrderedFloat<f32> {
        OrderedFloat(self.center[axis])
    }
}

/// Tree as produced by the (possibly parallel) recursion, before moving it into the arena.
enum BuildNode {
    Leaf {
        bounds: WorldBox,
        surfaces: LeafRange,
    },
    Inner {
        bounds: WorldBox,
        axis: u8,
        children: Box<[BuildNode; 2]>,
    },
}

impl BuildNode {
    fn bounds(&self) -> &WorldBox {
        match self {
            BuildNode::Leaf { bounds, .. } | BuildNode::Inner { bounds, .. } => bounds,
        }
    }
}

struct Builder<'a> {
    settings: &'a BuildSettings,
    /// How many levels of the recursion may still fork a thread
    parallel_levels: usize,
}

impl Builder<'_> {
    /// `offset` is the position of `items` in the complete item list.
    fn build_recursive(&self, items: &mut [BuildItem], offset: usize, depth: usize) -> BuildNode {
        let bounds = items
            .iter()
            .fold(WorldBox::empty(), |acc, item| acc.union(&item.bounds));

        if items.len() <= self.settings.leaf_size {
            return BuildNode::Leaf {
                bounds,
                surfaces: LeafRange {
                    first: offset as u32,
                    count: items.len() as u32,
                },
            };
        }

        let axis = bounds.longest_axis();
        let mid = self.split(items, axis, depth);
        debug_assert!(0 < mid && mid < items.len());

        let parallel = depth < self.parallel_levels && items.len() >= self.settings.parallel_threshold;
        let (left_items, right_items) = items.split_at_mut(mid);
        let [left, right] = if parallel {
            thread::scope(|scope| {
                let left = scope.spawn(|| self.build_recursive(left_items, offset, depth + 1));
                let right = self.build_recursive(right_items, offset + mid, depth + 1);
                let left = left
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
                [left, right]
            })
        } else {
            [
                self.build_recursive(left_items, offset, depth + 1),
                self.build_recursive(right_items, offset + mid, depth + 1),
            ]
        };

        BuildNode::Inner {
            bounds: left.bounds().union(right.bounds()),
            axis: axis as u8,
            children: Box::new([left, right]),
        }
    }

    /// Reorders the items and returns the index where they should be split into two children.
    fn split(&self, items: &mut [BuildItem], axis: usize, depth: usize) -> usize {
        // Stable sort, equal keys keep insertion order
        items.sort_by_key(|item| item.sort_key(axis));

        match self.settings.split {
            SplitStrategy::SurfaceAreaHeuristic { bins } if depth < MAX_SAH_DEPTH => {
                sah_split(items, axis, bins).unwrap_or_else(|| {
                    log::trace!(
                        "No usable SAH split of {} surfaces at depth {depth}, using median",
                        items.len()
                    );
                    items.len() / 2
                })
            }
            _ => items.len() / 2,
        }
    }
}

/// Finds the cheapest split between bins of centers along the axis.
/// Items must already be sorted along the axis.
/// Returns None if all centers fall into a single bin.
fn sah_split(items: &[BuildItem], axis: usize, bin_count: usize) -> Option<usize> {
    let first = items.first()?.center[axis];
    let last = items.last()?.center[axis];
    let extent = last - first;
    if !(extent > 0.0) || !extent.is_finite() {
        return None;
    }

    let scale = bin_count as f32 / extent;
    let bin_index = |item: &BuildItem| {
        (((item.center[axis] - first) * scale) as usize).min(bin_count - 1)
    };

    let mut bins = vec![(0usize, WorldBox::empty()); bin_count];
    for item in items {
        let bin = &mut bins[bin_index(item)];
        bin.0 += 1;
        bin.1 = bin.1.union(&item.bounds);
    }

    // Cost of the right side of every split position, accumulated from the back
    let mut right_costs = vec![0.0f32; bin_count];
    let mut accumulated = (0usize, WorldBox::empty());
    for split in (1..bin_count).rev() {
        accumulated.0 += bins[split].0;
        accumulated.1 = accumulated.1.union(&bins[split].1);
        right_costs[split] = accumulated.0 as f32 * accumulated.1.surface_area();
    }

    let mut best: Option<(OrderedFloat<f32>, usize)> = None;
    let mut left = (0usize, WorldBox::empty());
    for split in 1..bin_count {
        left.0 += bins[split - 1].0;
        left.1 = left.1.union(&bins[split - 1].1);
        if left.0 == 0 || left.0 == items.len() {
            continue;
        }

        let cost = OrderedFloat(left.0 as f32 * left.1.surface_area() + right_costs[split]);
        if best.is_none_or(|(best_cost, _)| cost < best_cost) {
            best = Some((cost, left.0));
        }
    }

    best.map(|(_, mid)| mid)
}

/// Number of recursion levels that fork, so that there are about as many threads as CPUs.
fn parallel_levels(cpu_count: usize) -> usize {
    cpu_count.next_power_of_two().trailing_zeros() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::WorldVector,
        scene::{
            bvh::test::scene_strategy,
            primitives::{Primitive, Sphere},
        },
    };
    use assert2::{assert, let_assert};
    use proptest::prop_assert;
    use test_case::test_case;
    use test_strategy::proptest;

    fn spheres_along_x(count: usize) -> Vec<Primitive> {
        (0..count)
            .map(|i| Primitive::Sphere(Sphere::new(WorldPoint::new(i as f32 * 3.0, 0.0, 0.0), 1.0)))
            .collect()
    }

    fn depth(bvh: &Bvh<Primitive>, index: NodeIdx) -> usize {
        match &bvh.nodes[index] {
            Node::Leaf { .. } => 1,
            Node::Inner { children, .. } => {
                1 + depth(bvh, children[0]).max(depth(bvh, children[1]))
            }
        }
    }

    #[test]
    fn settings_defaults() {
        let settings = BuildSettings::default();
        assert!(settings.leaf_size == 4);
        assert!(settings.split == SplitStrategy::Median);
    }

    #[test]
    fn settings_are_clamped() {
        let settings = BuildSettings::builder()
            .leaf_size(0)
            .split(SplitStrategy::SurfaceAreaHeuristic { bins: 0 })
            .parallel_threshold(0)
            .build();
        assert!(settings.leaf_size == 1);
        assert!(settings.split == SplitStrategy::SurfaceAreaHeuristic { bins: 2 });
        assert!(settings.parallel_threshold == 2);
    }

    #[test_case(1, 0)]
    #[test_case(2, 1)]
    #[test_case(3, 2)]
    #[test_case(8, 3)]
    #[test_case(12, 4)]
    fn parallel_levels_for_cpus(cpus: usize, expected: usize) {
        assert!(parallel_levels(cpus) == expected);
    }

    #[test]
    fn splits_along_longest_axis() {
        let bvh = Bvh::build(spheres_along_x(8), TimeInterval::default(), &BuildSettings::default());
        let_assert!(Node::Inner { axis, children, .. } = bvh.root());
        assert!(*axis == 0);

        // Median split, the lower half of x goes left
        let_assert!(Node::Leaf { bounds, surfaces } = &bvh.nodes[children[0]]);
        assert!(surfaces.count == 4);
        assert!(bounds.max.x == 10.0);
    }

    #[test]
    fn median_split_depth_is_logarithmic() {
        // All centers identical, the split must still halve the count
        let surfaces = (0..1024)
            .map(|_| Primitive::Sphere(Sphere::new(WorldPoint::origin(), 1.0)))
            .collect();
        let bvh = Bvh::build(surfaces, TimeInterval::default(), &BuildSettings::default());
        assert!(depth(&bvh, NodeIdx::root()) == 9);
    }

    #[test]
    fn sah_separates_clusters() {
        // Two distant clusters of unequal size, median split would cut the big one
        let mut surfaces = Vec::new();
        for i in 0..6 {
            surfaces.push(Primitive::Sphere(Sphere::new(WorldPoint::new(i as f32 * 0.1, 0.0, 0.0), 0.1)));
        }
        for i in 0..2 {
            surfaces.push(Primitive::Sphere(Sphere::new(WorldPoint::new(100.0 + i as f32 * 0.1, 0.0, 0.0), 0.1)));
        }
        let settings = BuildSettings::builder()
            .split(SplitStrategy::SurfaceAreaHeuristic { bins: 16 })
            .leaf_size(6)
            .build();
        let bvh = Bvh::build(surfaces, TimeInterval::default(), &settings);

        let_assert!(Node::Inner { children, .. } = bvh.root());
        let_assert!(Node::Leaf { surfaces: left, .. } = &bvh.nodes[children[0]]);
        let_assert!(Node::Leaf { surfaces: right, .. } = &bvh.nodes[children[1]]);
        assert!(left.count == 6);
        assert!(right.count == 2);
    }

    #[test]
    fn sah_without_spread_falls_back() {
        let items: Vec<_> = (0..10)
            .map(|i| BuildItem::new(SurfaceIdx::from_usize(i), WorldBox::from_point(&WorldPoint::origin())))
            .collect();
        assert!(sah_split(&items, 0, 8).is_none());
    }

    #[test]
    fn parallel_build_matches_sequential() {
        let surfaces: Vec<_> = (0..2000)
            .map(|i| {
                let f = i as f32;
                Primitive::Sphere(Sphere::new(
                    WorldPoint::new((f * 7.3) % 50.0, (f * 3.1) % 40.0, (f * 1.7) % 30.0),
                    0.5,
                ))
            })
            .collect::<Vec<_>>();
        let sequential = BuildSettings::builder().parallel_threshold(usize::MAX).build();
        let parallel = BuildSettings::builder().parallel_threshold(16).build();

        let a = Bvh::build(surfaces.clone(), TimeInterval::default(), &sequential);
        let b = Bvh::build(surfaces, TimeInterval::default(), &parallel);
        assert!(a.nodes == b.nodes);
        assert!(a.leaf_surfaces == b.leaf_surfaces);
    }

    #[test]
    fn motion_is_included_in_boxes() {
        let surface = Primitive::MovingSphere(crate::scene::primitives::MovingSphere::new(
            [WorldPoint::origin(), WorldPoint::origin() + WorldVector::new(0.0, 10.0, 0.0)],
            TimeInterval::new(0.0, 1.0),
            1.0,
        ));
        let bvh = Bvh::build(vec![surface], TimeInterval::new(0.0, 1.0), &BuildSettings::default());
        assert!(bvh.bounding_box().max.y == 11.0);

        let bvh = Bvh::build(bvh.into_surfaces(), TimeInterval::new(0.0, 0.5), &BuildSettings::default());
        assert!(bvh.bounding_box().max.y == 6.0);
    }

    /// Same input in the same order always gives the same tree.
    #[proptest]
    fn build_is_deterministic(#[strategy(scene_strategy(300))] surfaces: Vec<Primitive>, sah: bool) {
        let split = if sah {
            SplitStrategy::SurfaceAreaHeuristic { bins: 8 }
        } else {
            SplitStrategy::Median
        };
        let settings = BuildSettings::builder().split(split).parallel_threshold(32).build();
        let a = Bvh::build(surfaces.clone(), TimeInterval::default(), &settings);
        let b = Bvh::build(surfaces, TimeInterval::default(), &settings);
        prop_assert!(a.nodes == b.nodes);
        prop_assert!(a.leaf_surfaces == b.leaf_surfaces);
    }
}
