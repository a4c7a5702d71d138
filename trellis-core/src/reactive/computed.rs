//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On creation, the computed runs its computation once and caches the
//!    result.
//!
//! 2. When accessed again, if no dependencies have changed, returns the
//!    cached value.
//!
//! 3. When a signal it reads changes, the computed is marked dirty. A
//!    computed that only reads other computeds is marked "maybe dirty".
//!
//! 4. On next access, a maybe-dirty computed first brings its computed
//!    inputs up to date and checks whether any of them actually changed.
//!
//! 5. If inputs changed, recompute. Otherwise, mark clean and return cache.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually accessed will recompute
//! - Computeds that are never read stay dirty (no wasted work)
//!
//! Because a recompute that yields an equal value does not bump the
//! computed's version, everything downstream of it stays clean. In a diamond
//! `a -> (b, c) -> d`, one write to `a` recomputes `d` once.
//!
//! # Failures
//!
//! If the computation panics, the computed stays dirty, keeps its previous
//! value and the panic is resumed in the reader. The next read tries again.

use std::fmt::{self, Debug};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use crate::error::{panic_message, ReactiveError};
use crate::graph::{DirtyState, Node, NodeId};

use super::runtime::{PanicPayload, Runtime, Subscriber};

/// Type-erased view of a computed, used by the runtime to refresh
/// dependencies it only knows by id.
pub(crate) trait ComputedNode: Send + Sync {
    fn update_if_necessary(&self) -> Result<(), PanicPayload>;
}

/// A cached derived value.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = runtime.signal(2);
/// let squared = runtime.computed({
///     let count = count.clone();
///     move || count.get() * count.get()
/// });
///
/// assert_eq!(squared.get(), 4);
/// count.set(3);
/// assert_eq!(squared.get(), 9);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    id: NodeId,
    runtime: Runtime,
    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// `None` until the first successful evaluation.
    value: RwLock<Option<T>>,

    /// Set while `compute` runs; a read in that window is a cycle.
    computing: AtomicBool,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed and evaluate it once.
    ///
    /// A failing first evaluation is logged and leaves the computed dirty.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = runtime.inner().register_node(Node::derived());
        let inner = Arc::new(ComputedInner {
            id,
            runtime: runtime.clone(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            computing: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let weak: Weak<dyn ComputedNode> = weak;
        runtime.inner().register_subscriber(id, Subscriber::Computed(weak));

        if let Err(payload) = inner.update_if_necessary() {
            runtime.inner().report(ReactiveError::ComputeEvaluation {
                node: id,
                message: panic_message(payload.as_ref()),
            });
        }

        Self { inner }
    }

    /// Attach a name that shows up in log output.
    pub fn with_label(self, label: &str) -> Self {
        if let Some(node) = self.inner.runtime.inner().graph.lock().get_node_mut(self.inner.id) {
            node.set_label(label);
        }
        self
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing first if needed.
    ///
    /// Registers the running computation as a dependent.
    ///
    /// # Panics
    ///
    /// Resumes the panic of a failing computation.
    pub fn get(&self) -> T {
        self.inner.runtime.inner().track(self.inner.id);
        self.peek()
    }

    /// Like [`get`](Self::get), but returns a failing computation as an error.
    pub fn try_get(&self) -> Result<T, ReactiveError> {
        self.inner.runtime.inner().track(self.inner.id);
        self.read().map_err(|payload| ReactiveError::ComputeEvaluation {
            node: self.inner.id,
            message: panic_message(payload.as_ref()),
        })
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        match self.read() {
            Ok(value) => value,
            Err(payload) => resume_unwind(payload),
        }
    }

    fn read(&self) -> Result<T, PanicPayload> {
        self.inner.update_if_necessary()?;
        match self.inner.value.read().as_ref() {
            Some(value) => Ok(value.clone()),
            None => Err(Box::new(format!(
                "computed {} has no value",
                self.inner.id
            ))),
        }
    }

    pub fn state(&self) -> DirtyState {
        self.inner
            .runtime
            .inner()
            .graph
            .lock()
            .get_node(self.inner.id)
            .map_or(DirtyState::Dirty, Node::dirty_state)
    }

    /// Number of times the value has changed.
    pub fn version(&self) -> u64 {
        self.inner.runtime.inner().graph.lock().version(self.inner.id).unwrap_or_default()
    }

    /// Check if at least one evaluation succeeded.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner
            .runtime
            .inner()
            .graph
            .lock()
            .get_node(self.inner.id)
            .map_or(0, |node| node.dependencies().len())
    }

    pub fn dependent_count(&self) -> usize {
        self.inner
            .runtime
            .inner()
            .graph
            .lock()
            .get_node(self.inner.id)
            .map_or(0, |node| node.dependents().len())
    }
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Evaluate `compute` in a fresh tracking frame and store the result.
    fn recompute(&self) -> Result<(), PanicPayload> {
        if self.computing.swap(true, Ordering::SeqCst) {
            let message = format!("cycle detected: computed {} depends on itself", self.id);
            return Err(Box::new(message));
        }
        let _computing = ComputingGuard(&self.computing);
        let runtime = self.runtime.inner();

        trace!(computed = %self.id, "recomputing");
        runtime.graph.lock().clear_dependencies(self.id);

        let result = {
            let _frame = runtime.context.enter(self.id);
            catch_unwind(AssertUnwindSafe(|| (self.compute)()))
        };

        match result {
            Ok(value) => {
                let changed = self.value.read().as_ref() != Some(&value);
                if changed {
                    *self.value.write() = Some(value);
                }
                if let Some(node) = runtime.graph.lock().get_node_mut(self.id) {
                    if changed {
                        node.bump_version();
                    }
                    node.mark_clean();
                }
                Ok(())
            }
            Err(payload) => {
                if let Some(node) = runtime.graph.lock().get_node_mut(self.id) {
                    node.mark_dirty();
                }
                Err(payload)
            }
        }
    }
}

impl<T> ComputedNode for ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn update_if_necessary(&self) -> Result<(), PanicPayload> {
        let runtime = self.runtime.inner();
        let state = runtime.graph.lock().get_node(self.id).map(Node::dirty_state);

        match state {
            None | Some(DirtyState::Clean) => Ok(()),
            Some(DirtyState::Dirty) => self.recompute(),
            Some(DirtyState::MaybeDirty) => {
                let inputs = runtime.graph.lock().derived_dependencies(self.id);
                for (input, version) in inputs {
                    runtime.refresh(input)?;
                    if runtime.graph.lock().version(input) != Some(version) {
                        return self.recompute();
                    }
                }
                trace!(computed = %self.id, "inputs unchanged; keeping cached value");
                if let Some(node) = runtime.graph.lock().get_node_mut(self.id) {
                    node.mark_clean();
                }
                Ok(())
            }
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        self.runtime.inner().release(self.id);
    }
}

struct ComputingGuard<'a>(&'a AtomicBool);

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("state", &self.state())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn computed_caches_value() {
        let runtime = Runtime::new();
        let count = runtime.signal(2);
        let evaluations = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let evaluations_clone = evaluations.clone();
        let squared = runtime.computed(move || {
            evaluations_clone.fetch_add(1, Ordering::SeqCst);
            count_clone.get() * count_clone.get()
        });

        assert_eq!(squared.get(), 4);
        assert_eq!(squared.get(), 4);
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        count.set(3);
        assert_eq!(squared.state(), DirtyState::Dirty);
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        assert_eq!(squared.get(), 9);
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
        assert_eq!(squared.state(), DirtyState::Clean);
    }

    #[test]
    fn unchanged_result_keeps_version() {
        let runtime = Runtime::new();
        let count = runtime.signal(1);

        let count_clone = count.clone();
        let parity = runtime.computed(move || count_clone.get() % 2);
        assert_eq!(parity.version(), 1);

        count.set(3);
        assert_eq!(parity.get(), 1);
        assert_eq!(parity.version(), 1);

        count.set(4);
        assert_eq!(parity.get(), 0);
        assert_eq!(parity.version(), 2);
    }

    #[test]
    fn maybe_dirty_chain_skips_unchanged_inputs() {
        let runtime = Runtime::new();
        let count = runtime.signal(1);
        let evaluations = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let is_positive = runtime.computed(move || count_clone.get() > 0);

        let is_positive_clone = is_positive.clone();
        let evaluations_clone = evaluations.clone();
        let label = runtime.computed(move || {
            evaluations_clone.fetch_add(1, Ordering::SeqCst);
            if is_positive_clone.get() { "positive" } else { "non-positive" }
        });
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        count.set(5);
        assert_eq!(label.state(), DirtyState::MaybeDirty);
        assert_eq!(label.get(), "positive");
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);

        count.set(-1);
        assert_eq!(label.get(), "non-positive");
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn conditional_dependencies_are_retracked() {
        let runtime = Runtime::new();
        let flag = runtime.signal(true);
        let a = runtime.signal(1);
        let b = runtime.signal(2);

        let (flag_c, a_c, b_c) = (flag.clone(), a.clone(), b.clone());
        let picked = runtime.computed(move || if flag_c.get() { a_c.get() } else { b_c.get() });
        assert_eq!(picked.dependency_count(), 2);
        assert_eq!(b.subscriber_count(), 0);

        flag.set(false);
        assert_eq!(picked.get(), 2);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn failing_computation_stays_dirty_and_retries() {
        let runtime = Runtime::new();
        let divisor = runtime.signal(1);

        let divisor_clone = divisor.clone();
        let quotient = runtime.computed(move || {
            let d = divisor_clone.get();
            if d == 0 {
                panic!("division by zero");
            }
            100 / d
        });
        assert_eq!(quotient.get(), 100);

        divisor.set(0);
        let error = quotient.try_get().unwrap_err();
        assert!(matches!(error, ReactiveError::ComputeEvaluation { .. }));
        assert!(error.to_string().contains("division by zero"));
        assert_eq!(quotient.state(), DirtyState::Dirty);
        assert!(quotient.has_value());

        divisor.set(4);
        assert_eq!(quotient.get(), 25);
        assert_eq!(quotient.state(), DirtyState::Clean);
    }

    #[test]
    fn failing_first_evaluation_has_no_value() {
        let runtime = Runtime::new();
        let broken = runtime.computed(|| -> i32 { panic!("not ready") });
        assert!(!broken.has_value());
        assert_eq!(broken.state(), DirtyState::Dirty);
        assert!(broken.try_get().is_err());
    }

    #[test]
    fn self_reading_computed_reports_a_cycle() {
        let runtime = Runtime::new();
        let trigger = runtime.signal(0);
        let slot: Arc<RwLock<Option<Computed<i32>>>> = Arc::new(RwLock::new(None));

        let trigger_clone = trigger.clone();
        let slot_clone = slot.clone();
        let looped = runtime.computed(move || {
            let n = trigger_clone.get();
            let me = slot_clone.read().clone();
            me.map_or(n, |me| me.get() + 1)
        });
        assert_eq!(looped.get(), 0);

        // Once the computed can see itself, the next evaluation loops.
        *slot.write() = Some(looped.clone());
        trigger.set(1);

        let error = looped.try_get().unwrap_err();
        assert!(error.to_string().contains("cycle detected"));
        assert_eq!(looped.state(), DirtyState::Dirty);
        slot.write().take();
    }

    #[test]
    fn computed_clone_shares_cache() {
        let runtime = Runtime::new();
        let signal = runtime.signal(10);

        let signal_clone = signal.clone();
        let computed1 = runtime.computed(move || signal_clone.get() + 1);
        let computed2 = computed1.clone();

        signal.set(20);
        assert_eq!(computed1.get(), 21);
        assert_eq!(computed2.state(), DirtyState::Clean);
        assert_eq!(computed1.id(), computed2.id());
    }
}
