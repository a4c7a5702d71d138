//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal's value changes, all subscribers are notified. Writing a
//!    value equal to the current one does nothing.
//!
//! 3. Notifications trigger re-execution of dependent computations.
//!
//! Only `set` and `update` notify. Mutating a value obtained from `get`
//! changes a clone and is never observed.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A graph node ID (8 bytes)
//! - A handle to its runtime
//! - The value, behind a `RwLock` shared by every clone of the signal

use std::any::type_name;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, trace, warn};

use crate::error::ReactiveError;
use crate::graph::{Node, NodeId};

use super::effect::Effect;
use super::runtime::Runtime;

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. `PartialEq` decides whether
///   a write is a change.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T> {
    /// Graph node for this signal.
    id: NodeId,

    runtime: Runtime,

    /// The current value, shared by every clone of the handle.
    value: RwLock<T>,

    destroyed: AtomicBool,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        let id = runtime.inner().register_node(Node::source());
        Self {
            inner: Arc::new(SignalInner {
                id,
                runtime: runtime.clone(),
                value: RwLock::new(value),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    /// Attach a name that shows up in log output.
    pub fn with_label(self, label: &str) -> Self {
        if let Some(node) = self.inner.runtime.inner().graph.lock().get_node_mut(self.inner.id) {
            node.set_label(label);
        }
        self
    }

    /// Get the signal's graph node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Borrow the current value, tracking the read like [`get`](Self::get).
    ///
    /// `f` must not write this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.ensure_alive("read");
        self.inner.value.read().clone()
    }

    /// Set a new value and notify subscribers.
    ///
    /// Equal values are ignored. A write issued from an effect that this
    /// signal's own notification led to is dropped with a warning. Inside a
    /// batch, notification is deferred until the batch exits.
    pub fn set(&self, value: T) {
        if !self.ensure_alive("write") {
            return;
        }
        let runtime = self.inner.runtime.inner();
        let id = self.inner.id;

        // Writers are recorded even for no-op writes; they only drive ordering.
        runtime.record_write(id);

        let unchanged = *self.inner.value.read() == value;
        if unchanged {
            trace!(signal = %id, "equal write ignored");
            return;
        }

        if runtime.is_circular_write(id) {
            warn!(
                error = %ReactiveError::CircularUpdate { node: id },
                label = runtime.label(id).as_deref().unwrap_or(""),
                value_type = type_name::<T>(),
                "dropping circular write"
            );
            return;
        }

        *self.inner.value.write() = value;
        runtime.commit_write(id);
    }

    /// Update the value using a function of the current value.
    ///
    /// The current value is read without tracking.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// Number of changes since creation.
    pub fn version(&self) -> u64 {
        self.inner.runtime.inner().graph.lock().version(self.inner.id).unwrap_or_default()
    }

    /// Call `callback` with the new value after every change.
    ///
    /// Unlike an effect, the callback is not run on subscription; only
    /// subsequent changes reach it.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let signal = self.clone();
        let primed = AtomicBool::new(false);
        let effect = Effect::new(&self.inner.runtime, move || {
            let value = signal.get();
            if primed.swap(true, Ordering::SeqCst) {
                callback(value);
            }
        });
        Subscription { effect }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .inner()
            .graph
            .lock()
            .get_node(self.inner.id)
            .map_or(0, |node| node.dependents().len())
    }

    /// Detach every subscriber from this signal and retire it.
    ///
    /// Subscribers are not stopped; they simply stop hearing from this
    /// signal. Using the signal afterwards panics in debug builds and is
    /// logged and ignored in release builds.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.runtime.inner().release(self.inner.id);
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    fn track(&self) {
        if self.ensure_alive("read") {
            self.inner.runtime.inner().track(self.inner.id);
        }
    }

    fn ensure_alive(&self, operation: &'static str) -> bool {
        if !self.is_destroyed() {
            return true;
        }
        if cfg!(debug_assertions) {
            panic!("signal {} {} after destroy", self.inner.id, operation);
        }
        error!(
            error = %ReactiveError::Destroyed { node: self.inner.id },
            operation,
            "signal used after destroy"
        );
        false
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        self.runtime.inner().release(self.id);
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("destroyed", &self.is_destroyed())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`Signal::subscribe`].
#[derive(Debug, Clone)]
pub struct Subscription {
    effect: Effect,
}

impl Subscription {
    /// Stop delivering changes to the callback.
    pub fn unsubscribe(self) {
        self.effect.stop();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
