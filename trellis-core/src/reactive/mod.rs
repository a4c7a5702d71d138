//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Trellis's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are used to synchronize reactive state with
//! external systems, such as updating a host tree or logging.
//!
//! ## Batches
//!
//! [`Runtime::batch`] groups writes so that subscribers are notified once,
//! after the outermost batch exits.
//!
//! # Implementation Notes
//!
//! Every primitive belongs to a [`Runtime`]. Reads are tracked against the
//! runtime's own frame stack rather than a thread-local, so two runtimes in
//! the same thread (say, two tests) cannot see each other.

mod batch;
mod computed;
mod context;
mod effect;
mod runtime;
mod signal;
mod source;

pub use computed::Computed;
pub use effect::{Cleanup, Effect, EffectOutput};
pub use runtime::Runtime;
pub use signal::{Signal, Subscription};
pub use source::Reactive;
