//! Patch Stream
//!
//! The reconciler's output: an ordered list of host mutations.
//!
//! Invariants:
//! - Patches are applied in order.
//! - Every index is exact at the moment its patch is applied, counting the
//!   parent's children as they are after all earlier patches.
//! - `target` handles come from snapshots taken before any mutation, so they
//!   stay valid however siblings shift.
//! - Within one parent, removals of unmatched nodes come first (highest
//!   index first). Inserts, moves and replaces follow from the last target
//!   position to the first. Reused nodes already in relative order keep
//!   their place. A replaced node out of that order is removed and the new
//!   node inserted instead.
//! - A reused node is moved at most once.

use super::vnode::VNode;
use super::props::PropValue;

/// A change to one host node that keeps its identity.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    /// Replace the content of a text node.
    Text(String),
    /// Set an attribute or register a listener.
    SetProp { name: String, value: PropValue },
    /// Remove an attribute or unregister a listener. `value` is the old
    /// value, which tells the two apart.
    RemoveProp { name: String, value: PropValue },
}

/// One host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<N> {
    /// Materialize `node` and insert its host nodes starting at `index`.
    Insert { parent: N, index: usize, node: VNode },
    /// Detach `target`, currently at `index`.
    Remove { parent: N, index: usize, target: N },
    /// Swap `target`, currently at `index`, for the materialized `node`.
    Replace {
        parent: N,
        index: usize,
        target: N,
        node: VNode,
    },
    /// Reposition `target` from `from` to `to`.
    Move {
        parent: N,
        target: N,
        from: usize,
        to: usize,
    },
    /// Change `target` in place.
    Update { target: N, change: NodeChange },
}

impl<N> Patch<N> {
    pub fn is_move(&self) -> bool {
        matches!(self, Patch::Move { .. })
    }

    pub fn is_structural(&self) -> bool {
        !matches!(self, Patch::Update { .. })
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Patch::Insert { .. } => "insert",
            Patch::Remove { .. } => "remove",
            Patch::Replace { .. } => "replace",
            Patch::Move { .. } => "move",
            Patch::Update { .. } => "update",
        }
    }
}
