//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent reactive values (signals), derived values (computeds)
//!   or side effects (effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B to A
//! - Effects additionally record which sources they write, which is only
//!   used to order effects within one notification pass
//!
//! # Design Decisions
//!
//! 1. We use a centralized graph rather than edges stored inside closures:
//!    - It enables topological ordering of effects within a flush
//!    - It keeps cycle fallback a plain graph walk
//!    - Nodes are plain data, keyed by `NodeId`, with no reference to the
//!      values they stand for
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (dependencies) and reverse (dependents) edges
//!    to enable efficient traversal in both directions.
//!
//! The graph does no locking of its own. One [`Runtime`](crate::reactive::Runtime)
//! owns one scheduler behind a mutex.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::{Scheduled, UpdateScheduler};
