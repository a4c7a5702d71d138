//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! and effects. It owns the dependency graph, the tracking context and the
//! batch state, and schedules updates when signals change.
//!
//! # How It Works
//!
//! 1. When a signal, computed or effect is created, it registers a node with
//!    the runtime.
//!
//! 2. When a computed or effect reads a signal, the runtime records the edge.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Takes the signal's dependents out of the graph
//!    b. Marks computeds dirty (they recompute lazily, on next read)
//!    c. Orders the affected effects topologically
//!    d. Runs each effect, isolating failures
//!
//! Each running effect carries a notification chain: the sources that
//! scheduled it, plus the chain of the effect that wrote those sources. A
//! write to a source already on the current chain is circular and dropped.
//!
//! # Threading
//!
//! Handles are `Send + Sync` and all shared state sits behind `parking_lot`
//! locks, but one runtime must be driven by one thread at a time: the
//! tracking stack and the notification chains assume a single logical thread of
//! control. Locks are never held while user code runs.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, error, trace};

use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{Node, NodeId, Scheduled, UpdateScheduler};

use super::batch::{BatchGuard, BatchState};
use super::computed::{Computed, ComputedNode};
use super::context::ReactiveContext;
use super::effect::{Effect, EffectInner, EffectOutput};
use super::signal::Signal;

/// Sources whose notification led to the running effect.
type Chain = SmallVec<[NodeId; 4]>;

/// Payload of a panic caught at a subscriber boundary.
pub(crate) type PanicPayload = Box<dyn Any + Send>;

/// A registered subscriber, dispatched exhaustively during notification.
pub(crate) enum Subscriber {
    /// Computeds are owned by their handles; the runtime only observes them.
    Computed(Weak<dyn ComputedNode>),
    /// Effects are owned by the runtime until stopped.
    Effect(Arc<EffectInner>),
}

pub(crate) struct RuntimeInner {
    pub(crate) graph: Mutex<UpdateScheduler>,
    pub(crate) context: ReactiveContext,
    pub(crate) batch: Mutex<BatchState>,
    subscribers: Mutex<HashMap<NodeId, Subscriber>>,
    /// One chain per effect currently running inside a notification pass.
    chains: Mutex<Vec<Chain>>,
    config: RuntimeConfig,
}

/// The reactive scheduler for one application (or one test).
///
/// Cloning a `Runtime` is cheap and yields a handle to the same graph.
/// Independent runtimes never observe each other's reads or writes.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
/// let doubled = runtime.computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// let effect = runtime.effect({
///     let doubled = doubled.clone();
///     move || println!("doubled = {}", doubled.get())
/// });
///
/// count.set(5); // prints "doubled = 10"
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                graph: Mutex::new(UpdateScheduler::new()),
                context: ReactiveContext::new(),
                batch: Mutex::new(BatchState::default()),
                subscribers: Mutex::new(HashMap::new()),
                chains: Mutex::new(Vec::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Create a signal owned by this runtime.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        Signal::new(self, value)
    }

    /// Create a computed value. It is evaluated once immediately.
    pub fn computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Computed::new(self, compute)
    }

    /// Create an effect. It runs once immediately.
    pub fn effect<O, F>(&self, run: F) -> Effect
    where
        O: EffectOutput,
        F: Fn() -> O + Send + Sync + 'static,
    {
        Effect::new(self, run)
    }

    /// Run `f` with notifications deferred until the outermost batch exits.
    ///
    /// Each signal written inside the batch notifies at most once, and all
    /// written signals are flushed in a single pass.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::enter(&self.inner);
        f()
    }

    /// Run `f` without recording any reads as dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = self.inner.context.enter_untracked();
        f()
    }

    /// Check if a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.batch.lock().depth() > 0
    }

    /// Check if reads are currently tracked.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// Number of live nodes (signals, computeds and effects).
    pub fn node_count(&self) -> usize {
        self.inner.graph.lock().node_count()
    }

    /// Number of active effects.
    pub fn effect_count(&self) -> usize {
        self.inner.graph.lock().effect_ids().len()
    }

    /// Stop every effect owned by this runtime.
    ///
    /// Effects hold their closures (and whatever handles those capture) until
    /// stopped, so this is how an application releases a whole graph.
    pub fn dispose(&self) {
        let effects: Vec<Arc<EffectInner>> = self
            .inner
            .subscribers
            .lock()
            .values()
            .filter_map(|subscriber| match subscriber {
                Subscriber::Effect(effect) => Some(Arc::clone(effect)),
                Subscriber::Computed(_) => None,
            })
            .collect();

        debug!(effects = effects.len(), "disposing runtime");
        for effect in effects {
            effect.stop();
        }
    }

    pub(crate) fn inner(&self) -> &Arc<RuntimeInner> {
        &self.inner
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("node_count", &self.node_count())
            .field("batching", &self.is_batching())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl RuntimeInner {
    pub(crate) fn register_node(&self, node: Node) -> NodeId {
        self.graph.lock().add_node(node)
    }

    pub(crate) fn register_subscriber(&self, id: NodeId, subscriber: Subscriber) {
        self.subscribers.lock().insert(id, subscriber);
    }

    /// Forget a node entirely: edges, subscriber handle and pending flush.
    pub(crate) fn release(&self, id: NodeId) {
        self.graph.lock().remove_node(id);
        self.batch.lock().forget(id);
        // Dropped after the lock is released: an effect's closure may own
        // the last handle to other nodes.
        let removed = self.subscribers.lock().remove(&id);
        drop(removed);
    }

    pub(crate) fn label(&self, id: NodeId) -> Option<String> {
        self.graph
            .lock()
            .get_node(id)
            .and_then(|node| node.label().map(str::to_string))
    }

    /// Record a read of `source` against the running subscriber, if any.
    pub(crate) fn track(&self, source: NodeId) {
        if let Some(subscriber) = self.context.current_subscriber() {
            trace!(source = %source, subscriber = %subscriber, "tracking dependency");
            self.graph.lock().add_edge(source, subscriber);
        }
    }

    /// Record that the running effect (if any) writes `source`.
    pub(crate) fn record_write(&self, source: NodeId) {
        if let Some(subscriber) = self.context.current_subscriber() {
            self.graph.lock().record_write(source, subscriber);
        }
    }

    /// Check whether writing `source` now would feed its own notification.
    pub(crate) fn is_circular_write(&self, source: NodeId) -> bool {
        self.chains.lock().last().is_some_and(|chain| chain.contains(&source))
    }

    /// Extend the current chain with `causes` until the guard drops.
    fn enter_chain(&self, causes: &[NodeId]) -> ChainGuard<'_> {
        let mut chains = self.chains.lock();
        let mut chain = chains.last().cloned().unwrap_or_default();
        for cause in causes {
            if !chain.contains(cause) {
                chain.push(*cause);
            }
        }
        chains.push(chain);
        ChainGuard { runtime: self }
    }

    /// Bump the version of a written source and notify or defer.
    pub(crate) fn commit_write(&self, source: NodeId) {
        if let Some(node) = self.graph.lock().get_node_mut(source) {
            node.bump_version();
        }

        let deferred = self.batch.lock().defer(source);
        if deferred {
            trace!(source = %source, "write deferred until batch exit");
        } else {
            self.notify(&[source]);
        }
    }

    /// Notify the subscribers of `sources` in one pass.
    pub(crate) fn notify(&self, sources: &[NodeId]) {
        let (order, mut scheduled) = {
            let mut graph = self.graph.lock();
            let scheduled = graph.mark_changed(sources);
            let queued: Vec<NodeId> = scheduled.iter().map(|s| s.id).collect();
            let order = graph.order_effects(&queued);
            let scheduled: HashMap<NodeId, Scheduled> = scheduled.into_iter().map(|s| (s.id, s)).collect();
            (order, scheduled)
        };

        let effects: Vec<(Arc<EffectInner>, Scheduled, usize)> = {
            let subscribers = self.subscribers.lock();
            order
                .iter()
                .filter_map(|id| match (subscribers.get(id), scheduled.remove(id)) {
                    (Some(Subscriber::Effect(effect)), Some(entry)) => {
                        Some((Arc::clone(effect), entry, effect.run_count()))
                    }
                    _ => None,
                })
                .collect()
        };

        if effects.is_empty() {
            return;
        }
        debug!(effects = effects.len(), "running effects");

        for (effect, entry, runs_before) in effects {
            let id = effect.id();
            if !effect.is_active() {
                continue;
            }
            if effect.is_executing() {
                // Still running further up the stack; keep its subscriptions.
                trace!(effect = %id, "effect triggered itself; skipping");
                self.graph.lock().restore_dependents(id);
                continue;
            }
            if effect.run_count() != runs_before {
                trace!(effect = %id, "effect already re-ran during this pass");
                continue;
            }
            if !entry.certain && !self.is_stale(id) {
                trace!(effect = %id, "upstream computeds unchanged; skipping");
                continue;
            }
            let _chain = self.enter_chain(&entry.causes);
            effect.execute();
        }
    }

    /// Bring a computed up to date.
    pub(crate) fn refresh(&self, id: NodeId) -> Result<(), PanicPayload> {
        let computed = match self.subscribers.lock().get(&id) {
            Some(Subscriber::Computed(node)) => node.upgrade(),
            _ => None,
        };
        match computed {
            Some(computed) => computed.update_if_necessary(),
            None => Ok(()),
        }
    }

    /// Check whether any computed an effect depends on actually changed.
    fn is_stale(&self, effect: NodeId) -> bool {
        let dependencies = self.graph.lock().derived_dependencies(effect);
        for (dependency, version) in dependencies {
            if self.refresh(dependency).is_err() {
                return true;
            }
            if self.graph.lock().version(dependency) != Some(version) {
                return true;
            }
        }
        false
    }

    /// Log a subscriber failure, unless disabled by configuration.
    pub(crate) fn report(&self, error: ReactiveError) {
        if self.config.log_subscriber_errors {
            error!(%error, "reactive subscriber failed");
        }
    }
}

/// Pops the chain pushed by [`RuntimeInner::enter_chain`], even on unwind.
struct ChainGuard<'a> {
    runtime: &'a RuntimeInner,
}

impl Drop for ChainGuard<'_> {
    fn drop(&mut self) {
        self.runtime.chains.lock().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn runtimes_are_isolated() {
        let first = Runtime::new();
        let second = Runtime::new();

        let signal = first.signal(1);
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let signal_clone = signal.clone();
        let _effect = second.effect(move || {
            // Read through another runtime: no edge is recorded anywhere
            signal_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(first.node_count(), 1);
        assert_eq!(second.node_count(), 1);
    }

    #[test]
    fn untrack_suppresses_edges() {
        let runtime = Runtime::new();
        let signal = runtime.signal(0);
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let signal_clone = signal.clone();
        let rt = runtime.clone();
        let effect = runtime.effect(move || {
            rt.untrack(|| signal_clone.get());
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(effect.dependency_count(), 0);
        signal.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        effect.stop();
    }

    #[test]
    fn dispose_stops_all_effects() {
        let runtime = Runtime::new();
        let signal = runtime.signal(0);
        let runs = Arc::new(AtomicI32::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            let signal = signal.clone();
            runtime.effect(move || {
                signal.get();
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(runtime.effect_count(), 3);

        runtime.dispose();
        assert_eq!(runtime.effect_count(), 0);

        signal.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dropped_handles_release_nodes() {
        let runtime = Runtime::new();
        {
            let signal = runtime.signal(1);
            let _computed = runtime.computed(move || signal.get() + 1);
            assert_eq!(runtime.node_count(), 2);
        }
        assert_eq!(runtime.node_count(), 0);
    }
}
