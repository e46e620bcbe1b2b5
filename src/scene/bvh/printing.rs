use std::fmt::Display;

use itertools::Itertools as _;

use crate::util::Stats;

use super::{Bvh, Node, NodeIdx};

/// Shape of a built tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BvhStatistics {
    pub surfaces: usize,
    pub nodes: usize,
    pub leaves: usize,
    /// Depth of each leaf, root leaf has depth 1
    pub depth: Stats,
    /// Number of surfaces in each leaf
    pub leaf_size: Stats,
}

impl Display for BvhStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} surfaces, {} nodes, {} leaves",
            self.surfaces, self.nodes, self.leaves
        )?;
        writeln!(f, "Depth: {}", self.depth)?;
        write!(f, "Leaf size: {}", self.leaf_size)
    }
}

impl<S> Bvh<S> {
    pub fn statistics(&self) -> BvhStatistics {
        let depth = self.depth_statistics_recursive(NodeIdx::root());
        let leaf_size = Stats::from_samples(self.nodes.iter().filter_map(|node| match node {
            Node::Leaf { surfaces, .. } => Some(surfaces.count as usize),
            Node::Inner { .. } => None,
        }));

        BvhStatistics {
            surfaces: self.len(),
            nodes: self.node_count(),
            leaves: leaf_size.count,
            depth,
            leaf_size,
        }
    }

    pub fn print_tree(&self) {
        self.print_recursive(0, NodeIdx::root());
    }

    fn depth_statistics_recursive(&self, index: NodeIdx) -> Stats {
        match &self.nodes[index] {
            Node::Leaf { .. } => Stats::from_samples([1]),
            Node::Inner { children, .. } => {
                let mut ret = self
                    .depth_statistics_recursive(children[0])
                    .merge(&self.depth_statistics_recursive(children[1]));

                // One more level above every leaf of the subtree
                ret.min += 1;
                ret.max += 1;
                ret.sum += ret.count;

                ret
            }
        }
    }

    fn print_recursive(&self, indent: usize, index: NodeIdx) {
        let node = &self.nodes[index];
        let bounds = node.bounds();
        println!(
            "{}- {}{}: {:?}-{:?}",
            "  ".repeat(indent),
            if matches!(node, Node::Leaf { .. }) { "L" } else { "I" },
            index.index(),
            bounds.min,
            bounds.max,
        );

        match node {
            Node::Leaf { surfaces, .. } => {
                let indices = &self.leaf_surfaces[surfaces.into_range()];
                if !indices.is_empty() {
                    println!(
                        "{}{}",
                        "  ".repeat(indent + 1),
                        indices.iter().map(|i| i.index()).join(", ")
                    );
                }
            }
            Node::Inner { children, .. } => {
                for child in children {
                    self.print_recursive(indent + 1, *child);
                }
            }
        }
    }
}
