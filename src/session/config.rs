//! Session configuration.

use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Copy live containers at capture time. When off, only scalars and
    /// owned values are stored and container bindings are recorded as
    /// untracked placeholders.
    pub record_state: bool,

    /// Steps between periodic checkpoints. Larger values use less memory
    /// and make `state()` replay more events.
    pub checkpoint_interval: u64,

    /// Also checkpoint at the first step after a scope is entered. On by
    /// default; turning it off only changes replay cost.
    pub checkpoint_on_scope_entry: bool,

    /// Maximum number of steps (None = unbounded).
    pub max_steps: Option<u64>,

    /// Maximum estimated bytes held by the value store (None = unbounded).
    pub max_value_bytes: Option<usize>,

    /// Number of reconstructed states to cache (0 = no cache).
    pub state_cache_size: usize,

    /// Free-text label, e.g. the name of the traced program.
    pub label: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            record_state: true,
            checkpoint_interval: 256,
            checkpoint_on_scope_entry: true,
            max_steps: None,
            max_value_bytes: None,
            state_cache_size: 64,
            label: None,
        }
    }
}

impl SessionConfig {
    /// Config with a label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    /// Check the config before a session starts.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval == 0 {
            return Err(RecorderError::InvalidConfig(
                "checkpoint_interval must be positive".into(),
            ));
        }
        if self.max_steps == Some(0) {
            return Err(RecorderError::InvalidConfig(
                "max_steps must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// How often the session callback runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallbackInterval {
    /// Whenever the step count is a multiple of this value.
    Steps(u64),
    /// At the first capture after this much time has passed since the
    /// previous invocation.
    Elapsed(Duration),
}

impl CallbackInterval {
    pub fn validate(&self) -> Result<()> {
        match self {
            CallbackInterval::Steps(0) => Err(RecorderError::InvalidConfig(
                "callback step interval must be positive".into(),
            )),
            _ => Ok(()),
        }
    }
}
