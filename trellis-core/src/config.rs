//! Runtime Configuration
//!
//! Configuration is plain data. It can be built in code or loaded from JSON,
//! and every field has a default so partial documents are accepted.
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json_str(r#"{ "key_policy": "last_wins" }"#)?;
//! let runtime = Runtime::with_config(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the reconciler treats duplicate keys among siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Reject the tree with [`ReconcileError::DuplicateKey`](crate::error::ReconcileError).
    Strict,
    /// Log a warning and let the last sibling with a key win.
    LastWins,
}

impl Default for KeyPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            KeyPolicy::Strict
        } else {
            KeyPolicy::LastWins
        }
    }
}

/// Configuration for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Log effect failures. Failures stay isolated either way.
    pub log_subscriber_errors: bool,

    /// Duplicate key handling for trees mounted on this runtime.
    pub key_policy: KeyPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_subscriber_errors: true,
            key_policy: KeyPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}
