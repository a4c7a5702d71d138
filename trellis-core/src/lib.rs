//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects, batches)
//! - A dependency graph with lazy, version-checked recomputation
//! - Virtual tree descriptors and a key-aware reconciler
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Computational dependency graph implementation
//! - `render`: Virtual nodes, the host abstraction and the reconciler
//! - `config`: Runtime configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::Runtime;
//!
//! let runtime = Runtime::new();
//!
//! // Create a signal
//! let count = runtime.signal(0);
//!
//! // Create a derived value
//! let doubled = runtime.computed({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! runtime.effect({
//!     let (count, doubled) = (count.clone(), doubled.clone());
//!     move || println!("Count: {}, Doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal
//! count.set(5);
//! // Effect automatically runs, prints: "Count: 5, Doubled: 10"
//! ```
//!
//! The library logs through `tracing` and installs no subscriber of its own.

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod render;

pub use config::{KeyPolicy, RuntimeConfig};
pub use error::{ConfigError, ReactiveError, ReconcileError};
pub use reactive::{Cleanup, Computed, Effect, Reactive, Runtime, Signal, Subscription};
pub use render::{element, fragment, reconcile, text, Host, Patch, Reconciler, VNode};
