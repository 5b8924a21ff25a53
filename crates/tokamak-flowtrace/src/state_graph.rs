//! Shapes fork/merge edges for the symbolic-state graph.
//!
//! Identity resolution and the single shared rename on fork/merge are
//! orchestrated by [`crate::plugin::PluginBoundary`], since both the block
//! graph and the state graph must agree on parent/child identity. This
//! builder only shapes the resulting edges once ids are
//! resolved.

use crate::edge_batcher::Edge;
use crate::node::StateNode;

#[derive(Default)]
pub struct SymbolicStateGraphBuilder;

impl SymbolicStateGraphBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn fork_edge(&self, from: StateNode, to: StateNode) -> Edge<StateNode> {
        debug_assert_ne!(
            from.internal_id, to.internal_id,
            "fork parent and child must have distinct internal ids"
        );
        Edge { from, to }
    }

    pub fn merge_edges(&self, left: StateNode, right: StateNode, to: StateNode) -> [Edge<StateNode>; 2] {
        [
            Edge {
                from: left,
                to: to.clone(),
            },
            Edge { from: right, to },
        ]
    }
}
