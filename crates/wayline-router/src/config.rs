//! Router configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while loading a [`RouterConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid JSON or has the wrong shape.
    #[error("invalid router config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The navigation queue bound must allow at least one request.
    #[error("max_pending_navigations must be at least 1")]
    ZeroQueueBound,
}

/// Tunables for a [`Router`](crate::Router).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Seed for switches started without an explicit state.
    #[serde(default)]
    pub default_switching_state: Option<Value>,
    /// Upper bound on requests queued behind an in-flight transition or switch.
    #[serde(default = "default_max_pending_navigations")]
    pub max_pending_navigations: usize,
    /// Fail snapshot encoding when a derived state has no derivation record,
    /// instead of storing it by value.
    #[serde(default)]
    pub strict_derivations: bool,
}

fn default_max_pending_navigations() -> usize {
    64
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_switching_state: None,
            max_pending_navigations: default_max_pending_navigations(),
            strict_derivations: false,
        }
    }
}

impl RouterConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_navigations == 0 {
            return Err(ConfigError::ZeroQueueBound);
        }
        Ok(())
    }

    /// Set the default switching state.
    pub fn with_default_switching_state(mut self, value: Value) -> Self {
        self.default_switching_state = Some(value);
        self
    }
}
