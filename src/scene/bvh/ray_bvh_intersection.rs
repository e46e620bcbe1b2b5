use arrayvec::ArrayVec;
use assert2::debug_assert;

use super::{Bvh, Node, NodeIdx, TRAVERSAL_STACK_SIZE};
use crate::{
    geometry::{FloatType, Ray, RayIntersectionExt as _},
    scene::{HitRecord, Surface},
};

/// Work done by a single traversal.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub boxes_tested: usize,
    pub leaves_visited: usize,
    pub surfaces_tested: usize,
}

trait TraversalObserver {
    fn box_tested(&mut self);
    fn leaf_visited(&mut self);
    fn surface_tested(&mut self);
}

impl TraversalObserver for () {
    fn box_tested(&mut self) {}
    fn leaf_visited(&mut self) {}
    fn surface_tested(&mut self) {}
}

impl TraversalObserver for TraversalStats {
    fn box_tested(&mut self) {
        self.boxes_tested += 1;
    }

    fn leaf_visited(&mut self) {
        self.leaves_visited += 1;
    }

    fn surface_tested(&mut self) {
        self.surfaces_tested += 1;
    }
}

impl<S: Surface> Bvh<S> {
    /// Finds the nearest surface hit with ray parameter in `[t_min, t_max]`.
    ///
    /// On a hit, overwrites `record` and returns true.
    /// On a miss `record` is left untouched.
    /// An inverted or NaN range never hits.
    pub fn hit(&self, ray: &Ray, t_min: FloatType, t_max: FloatType, record: &mut HitRecord) -> bool {
        self.traverse(ray, t_min, t_max, record, &mut ())
    }

    /// Same as `hit`, also counting the work done into `stats`.
    pub fn hit_with_stats(
        &self,
        ray: &Ray,
        t_min: FloatType,
        t_max: FloatType,
        record: &mut HitRecord,
        stats: &mut TraversalStats,
    ) -> bool {
        self.traverse(ray, t_min, t_max, record, stats)
    }

    pub fn intersect(&self, ray: &Ray, t_min: FloatType, t_max: FloatType) -> Option<HitRecord> {
        let mut record = HitRecord::default();
        self.hit(ray, t_min, t_max, &mut record).then_some(record)
    }

    fn traverse(
        &self,
        ray: &Ray,
        t_min: FloatType,
        t_max: FloatType,
        record: &mut HitRecord,
        observer: &mut impl TraversalObserver,
    ) -> bool {
        if !(t_min <= t_max) || ray.is_degenerate() {
            log::trace!("Rejected query {ray:?} in [{t_min}, {t_max}]");
            return false;
        }

        let mut stack = ArrayVec::<NodeIdx, TRAVERSAL_STACK_SIZE>::new();
        stack.push(NodeIdx::root());

        let mut best = t_max;
        let mut found = false;

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];

            observer.box_tested();
            if !node.bounds().intersects(ray, t_min, best) {
                // Either a miss, or the box starts further away than the best hit so far
                continue;
            }

            match node {
                Node::Leaf { surfaces, .. } => {
                    observer.leaf_visited();
                    for &surface_index in &self.leaf_surfaces[surfaces.into_range()] {
                        observer.surface_tested();
                        let Some(hit) = self.surfaces[surface_index].hit(ray, t_min, best) else {
                            continue;
                        };
                        debug_assert!(
                            t_min <= hit.t && hit.t <= best,
                            "Surface reported a hit outside of the requested range"
                        );

                        // Out of range hits are never accepted, also in release builds
                        let in_range = t_min <= hit.t && hit.t <= best;
                        if in_range && (!found || hit.t < best) {
                            best = hit.t;
                            found = true;
                            *record = HitRecord::new(hit, surface_index);
                        }
                    }
                }
                Node::Inner { children, axis, .. } => {
                    let [near, far] = if ray.direction[*axis as usize] >= 0.0 {
                        *children
                    } else {
                        [children[1], children[0]]
                    };
                    // Near child goes on top, to shrink `best` as soon as possible
                    stack.push(far);
                    stack.push(near);
                }
            }
        }

        found
    }
}
