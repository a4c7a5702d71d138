//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns one stack of frames. When entering a reactive context
//! (running a computed or an effect) we push the subscriber onto the stack;
//! the returned guard pops it when dropped, including during unwinding.
//!
//! An untracked frame shadows whatever is below it, which is how
//! `Runtime::untrack` and cleanup callbacks read signals without subscribing.
//!
//! The stack is not thread-local. A runtime assumes it is driven by one
//! thread at a time.

use parking_lot::Mutex;

use crate::graph::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Tracked(NodeId),
    Untracked,
}

/// The per-runtime stack of running computations.
#[derive(Debug, Default)]
pub(crate) struct ReactiveContext {
    frames: Mutex<Vec<Frame>>,
}

impl ReactiveContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enter a tracking frame for `subscriber`.
    ///
    /// While the returned guard lives, reads register `subscriber` as a
    /// dependent.
    pub(crate) fn enter(&self, subscriber: NodeId) -> ContextGuard<'_> {
        self.push(Frame::Tracked(subscriber))
    }

    /// Enter a frame in which reads are not tracked.
    pub(crate) fn enter_untracked(&self) -> ContextGuard<'_> {
        self.push(Frame::Untracked)
    }

    fn push(&self, frame: Frame) -> ContextGuard<'_> {
        self.frames.lock().push(frame);
        ContextGuard {
            context: self,
            frame,
        }
    }

    /// The subscriber that reads should register against, if any.
    pub(crate) fn current_subscriber(&self) -> Option<NodeId> {
        match self.frames.lock().last() {
            Some(Frame::Tracked(id)) => Some(*id),
            _ => None,
        }
    }

    /// Check if reads are currently being tracked.
    pub(crate) fn is_tracking(&self) -> bool {
        self.current_subscriber().is_some()
    }
}

/// Guard that pops the frame when dropped.
pub(crate) struct ContextGuard<'a> {
    context: &'a ReactiveContext,
    frame: Frame,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.frames.lock().pop();

        // Frames must be released in LIFO order.
        debug_assert_eq!(
            popped,
            Some(self.frame),
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.frame,
            popped
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_subscriber() {
        let context = ReactiveContext::new();
        let id = NodeId::new();

        assert!(!context.is_tracking());
        assert!(context.current_subscriber().is_none());

        {
            let _frame = context.enter(id);
            assert!(context.is_tracking());
            assert_eq!(context.current_subscriber(), Some(id));
        }

        assert!(!context.is_tracking());
    }

    #[test]
    fn nested_contexts() {
        let context = ReactiveContext::new();
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _outer = context.enter(id1);
            assert_eq!(context.current_subscriber(), Some(id1));

            {
                let _inner = context.enter(id2);
                assert_eq!(context.current_subscriber(), Some(id2));
            }

            assert_eq!(context.current_subscriber(), Some(id1));
        }

        assert!(context.current_subscriber().is_none());
    }

    #[test]
    fn untracked_frame_shadows_outer_subscriber() {
        let context = ReactiveContext::new();
        let id = NodeId::new();

        let _outer = context.enter(id);
        {
            let _untracked = context.enter_untracked();
            assert!(!context.is_tracking());
        }
        assert_eq!(context.current_subscriber(), Some(id));
    }

    #[test]
    fn frame_is_popped_on_unwind() {
        let context = ReactiveContext::new();
        let id = NodeId::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _frame = context.enter(id);
            panic!("computation failed");
        }));

        assert!(result.is_err());
        assert!(!context.is_tracking());
    }
}
