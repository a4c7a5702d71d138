//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the runtime re-runs the effect
//!    synchronously (or at the end of the enclosing batch).
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution. Conditional reads therefore subscribe only
//!    to what the last run actually read.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects return at most a cleanup.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is stopped. Cleanups run untracked.
//!
//! # Failures
//!
//! A panicking body, or one returning `Err`, is logged and counted as a run.
//! Other effects in the same notification pass still run, and the failing
//! effect keeps whatever dependencies it read before failing.

use std::fmt::{self, Display};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{panic_message, ReactiveError};
use crate::graph::{Node, NodeId};

use super::runtime::{Runtime, RuntimeInner, Subscriber};

/// A teardown callback returned by an effect body.
pub struct Cleanup(Box<dyn FnOnce() + Send + Sync>);

impl Cleanup {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup")
    }
}

/// Values an effect body may return.
///
/// Implemented for `()`, [`Cleanup`], `Option<Cleanup>` and
/// `Result<O, E>` where `O` is itself an output and `E: Display`.
pub trait EffectOutput: 'static {
    /// Split the output into an optional cleanup or a failure message.
    fn into_cleanup(self) -> Result<Option<Cleanup>, String>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        Ok(self)
    }
}

impl<O, E> EffectOutput for Result<O, E>
where
    O: EffectOutput,
    E: Display + 'static,
{
    fn into_cleanup(self) -> Result<Option<Cleanup>, String> {
        match self {
            Ok(output) => output.into_cleanup(),
            Err(error) => Err(error.to_string()),
        }
    }
}

type EffectFn = dyn Fn() -> Result<Option<Cleanup>, String> + Send + Sync;

pub(crate) struct EffectInner {
    id: NodeId,

    /// Weak so that the runtime's own strong reference to this effect does
    /// not form a cycle.
    runtime: Weak<RuntimeInner>,

    run: Box<EffectFn>,

    /// Cleanup returned by the last run.
    cleanup: Mutex<Option<Cleanup>>,

    active: AtomicBool,
    executing: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    pub(crate) fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }

    /// Run the effect body inside a tracking frame.
    pub(crate) fn execute(&self) {
        if !self.is_active() {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if self.executing.swap(true, Ordering::SeqCst) {
            trace!(effect = %self.id, "effect already executing; skipping");
            return;
        }
        let _executing = ExecutingGuard(&self.executing);

        runtime.graph.lock().clear_dependencies(self.id);

        let previous = self.cleanup.lock().take();
        if let Some(cleanup) = previous {
            self.run_cleanup(&runtime, cleanup);
        }

        let result = {
            let _frame = runtime.context.enter(self.id);
            catch_unwind(AssertUnwindSafe(|| (self.run)()))
        };
        self.run_count.fetch_add(1, Ordering::SeqCst);

        let message = match result {
            Ok(Ok(Some(cleanup))) => {
                if self.is_active() {
                    *self.cleanup.lock() = Some(cleanup);
                } else {
                    // Stopped from inside its own body.
                    self.run_cleanup(&runtime, cleanup);
                }
                return;
            }
            Ok(Ok(None)) => return,
            Ok(Err(message)) => message,
            Err(payload) => panic_message(payload.as_ref()),
        };
        runtime.report(ReactiveError::EffectExecution {
            node: self.id,
            message,
        });
    }

    /// Deactivate, detach from the graph and run the final cleanup.
    pub(crate) fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let runtime = self.runtime.upgrade();
        if let Some(runtime) = &runtime {
            trace!(effect = %self.id, "stopping effect");
            runtime.release(self.id);
        }

        let cleanup = self.cleanup.lock().take();
        if let (Some(cleanup), Some(runtime)) = (cleanup, runtime) {
            self.run_cleanup(&runtime, cleanup);
        }
    }

    fn run_cleanup(&self, runtime: &RuntimeInner, cleanup: Cleanup) {
        let _frame = runtime.context.enter_untracked();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| cleanup.run())) {
            runtime.report(ReactiveError::EffectExecution {
                node: self.id,
                message: format!("cleanup panicked: {}", panic_message(payload.as_ref())),
            });
        }
    }
}

struct ExecutingGuard<'a>(&'a AtomicBool);

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Effects are owned by their runtime: dropping every `Effect` handle does
/// not stop one. Call [`stop`](Self::stop) or [`Runtime::dispose`].
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
///
/// let effect = runtime.effect({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.stop();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<O, F>(runtime: &Runtime, run: F) -> Self
    where
        O: EffectOutput,
        F: Fn() -> O + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(runtime, run);

        // Run immediately to establish dependencies
        effect.execute();

        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies, and so never re-runs, until the first
    /// [`execute`](Self::execute).
    pub fn new_lazy<O, F>(runtime: &Runtime, run: F) -> Self
    where
        O: EffectOutput,
        F: Fn() -> O + Send + Sync + 'static,
    {
        let id = runtime.inner().register_node(Node::effect());
        let inner = Arc::new(EffectInner {
            id,
            runtime: Arc::downgrade(runtime.inner()),
            run: Box::new(move || run().into_cleanup()),
            cleanup: Mutex::new(None),
            active: AtomicBool::new(true),
            executing: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        runtime
            .inner()
            .register_subscriber(id, Subscriber::Effect(Arc::clone(&inner)));

        Self { inner }
    }

    /// Get the effect's graph node ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the effect now, re-tracking its dependencies.
    ///
    /// Does nothing if the effect is stopped or already running.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Stop the effect.
    ///
    /// Removes it from the graph and runs its last cleanup. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Check if the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count()
    }

    /// Get the number of dependencies recorded by the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.runtime.upgrade().map_or(0, |runtime| {
            runtime
                .graph
                .lock()
                .get_node(self.inner.id)
                .map_or(0, |node| node.dependencies().len())
        })
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
