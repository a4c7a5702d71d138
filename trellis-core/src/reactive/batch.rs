//! Batching
//!
//! A batch defers notifications until the outermost batch exits. Nested
//! batches share one pending set, so the flush happens exactly once no
//! matter how deep the nesting goes, and a signal written several times is
//! notified once with its final value.
//!
//! Computeds are not recomputed inside a batch: a computed read before the
//! flush still returns the value it had when the batch opened.

use indexmap::IndexSet;
use tracing::debug;

use crate::graph::NodeId;

use super::runtime::RuntimeInner;

/// Batch nesting depth and the sources written while it was non-zero.
#[derive(Debug, Default)]
pub(crate) struct BatchState {
    depth: usize,
    pending: IndexSet<NodeId>,
}

impl BatchState {
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Queue `source` if a batch is open. Returns `true` if it was queued.
    pub(crate) fn defer(&mut self, source: NodeId) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.pending.insert(source);
        true
    }

    /// Drop a released node from the pending set.
    pub(crate) fn forget(&mut self, source: NodeId) {
        self.pending.shift_remove(&source);
    }

    fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leave one level. Returns the pending sources if this was the
    /// outermost level.
    fn exit(&mut self) -> Option<Vec<NodeId>> {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return None;
        }
        Some(std::mem::take(&mut self.pending).into_iter().collect())
    }
}

/// RAII guard for one batch level.
///
/// Flushes on drop, including when the batched closure panics, so that
/// writes made before the panic are not silently lost.
pub(crate) struct BatchGuard<'a> {
    runtime: &'a RuntimeInner,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn enter(runtime: &'a RuntimeInner) -> Self {
        runtime.batch.lock().enter();
        Self { runtime }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let pending = self.runtime.batch.lock().exit();

        if let Some(pending) = pending {
            if !pending.is_empty() {
                debug!(signals = pending.len(), "flushing batch");
                self.runtime.notify(&pending);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defer_only_inside_a_batch() {
        let mut state = BatchState::default();
        let id = NodeId::new();

        assert!(!state.defer(id));

        state.enter();
        assert!(state.defer(id));
        assert!(state.defer(id));
        assert_eq!(state.exit(), Some(vec![id]));
    }

    #[test]
    fn nested_levels_flush_once() {
        let mut state = BatchState::default();
        let a = NodeId::new();
        let b = NodeId::new();

        state.enter();
        state.defer(a);
        state.enter();
        state.defer(b);
        state.defer(a);
        assert_eq!(state.exit(), None);
        assert_eq!(state.depth(), 1);
        assert_eq!(state.exit(), Some(vec![a, b]));
        assert_eq!(state.depth(), 0);
    }

    #[test]
    fn forgotten_sources_are_not_flushed() {
        let mut state = BatchState::default();
        let a = NodeId::new();
        let b = NodeId::new();

        state.enter();
        state.defer(a);
        state.defer(b);
        state.forget(a);
        assert_eq!(state.exit(), Some(vec![b]));
    }
}
