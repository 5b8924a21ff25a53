//! Turns execute-block-start callbacks into block-graph edges under forks
//! and merges.

use rustc_hash::FxHashMap;

use crate::edge_batcher::Edge;
use crate::identity::InternalStateId;
use crate::node::{BlockNode, ROOT_BLOCK};

/// Per-state cursor: the last-observed [`BlockNode`] for each live internal
/// state. Entries are created lazily on first block-start and propagated
/// (never deleted) on fork/merge.
#[derive(Default)]
pub struct BasicBlockGraphBuilder {
    cursor: FxHashMap<InternalStateId, BlockNode>,
}

impl BasicBlockGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// React to one execute-block-start for an already-identity-resolved
    /// state. Returns the edge to append to the batcher and advances the
    /// state's cursor to `curr`.
    ///
    /// The first block a state ever executes has no prior cursor, so the
    /// edge's source is the synthetic [`ROOT_BLOCK`] — every observed block
    /// stays reachable from a known source.
    pub fn on_execute_block_start(
        &mut self,
        state: InternalStateId,
        curr: BlockNode,
    ) -> Edge<BlockNode> {
        let prev = self.cursor.get(&state).cloned().unwrap_or(ROOT_BLOCK);
        self.cursor.insert(state, curr.clone());
        Edge {
            from: prev,
            to: curr,
        }
    }

    pub fn cursor_of(&self, state: InternalStateId) -> Option<&BlockNode> {
        self.cursor.get(&state)
    }

    /// Propagate a (possibly absent) source cursor onto `target` — used on
    /// fork (child inherits parent's pre-fork cursor) and on merge
    /// (the renumbered destination inherits its own pre-rename cursor).
    /// A `None` source leaves `target` without a cursor entry, so its next
    /// block-start still draws from [`ROOT_BLOCK`].
    pub fn propagate_cursor(&mut self, target: InternalStateId, source_cursor: Option<BlockNode>) {
        if let Some(node) = source_cursor {
            self.cursor.insert(target, node);
        }
    }
}
