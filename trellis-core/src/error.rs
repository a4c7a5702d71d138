//! Error Types
//!
//! Failures inside the reactive graph are isolated per subscriber, so most of
//! these errors are never returned to the writer that caused them. They still
//! exist as values so that logging carries the same structured context that a
//! returned error would.

use thiserror::Error;

use crate::graph::NodeId;
use crate::render::Key;

/// Errors raised by the reactive graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A signal was written while its own notification pass was running.
    /// The write is dropped.
    #[error("signal {node} written during its own notification; write ignored")]
    CircularUpdate { node: NodeId },

    /// A computed's function panicked. The computed stays dirty.
    #[error("computed {node} failed to evaluate: {message}")]
    ComputeEvaluation { node: NodeId, message: String },

    /// An effect body panicked or returned an error.
    #[error("effect {node} failed: {message}")]
    EffectExecution { node: NodeId, message: String },

    /// A destroyed signal was read or written.
    #[error("signal {node} used after destroy")]
    Destroyed { node: NodeId },
}

/// Errors raised by the reconciler for malformed trees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Two siblings share the same key.
    #[error("duplicate key `{key}` among siblings")]
    DuplicateKey { key: Key },

    /// An element descriptor has an empty tag name.
    #[error("element descriptor has an empty tag")]
    EmptyTag,

    /// The host children do not line up with the previous tree.
    #[error("host tree out of sync: previous tree expects {expected} children, host has {found}")]
    HostMismatch { expected: usize, found: usize },
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render a caught panic payload as a message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_handles_both_string_kinds() {
        let payload = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static text");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }

    #[test]
    fn errors_render_context() {
        let err = ReconcileError::DuplicateKey { key: Key::from("row-1") };
        assert_eq!(err.to_string(), "duplicate key `row-1` among siblings");

        let err = ReconcileError::HostMismatch { expected: 3, found: 1 };
        assert!(err.to_string().contains("expects 3"));
    }
}
