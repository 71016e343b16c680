//! Subscription types for live session updates.

use crate::recording::Outcome;
use crate::types::{ScopeId, Step};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Receive `CheckpointCreated` events.
    pub include_checkpoints: bool,

    /// Receive `ScopeEntered`/`ScopeExited` events.
    pub include_scopes: bool,

    /// Receive `CallbackCompleted` events.
    pub include_callbacks: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            include_checkpoints: true,
            include_scopes: true,
            include_callbacks: true,
        }
    }
}

impl SubscriptionConfig {
    /// Only lifecycle events (finish and drop).
    pub fn lifecycle() -> Self {
        Self {
            include_checkpoints: false,
            include_scopes: false,
            include_callbacks: false,
            ..Default::default()
        }
    }
}

/// Events emitted to session subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A checkpoint was materialized at `step`.
    CheckpointCreated { step: Step },

    /// A new scope was opened. `at` is the step count at entry.
    ScopeEntered {
        scope: ScopeId,
        label: String,
        at: u64,
    },

    /// A scope was closed. `at` is the step count at exit.
    ScopeExited { scope: ScopeId, at: u64 },

    /// The periodic callback returned successfully.
    CallbackCompleted { steps: u64, duration: Duration },

    /// The session reached a terminal state.
    Finished { outcome: Outcome, steps: u64 },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SessionEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SessionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SessionEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<SessionEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.receiver.try_iter().collect()
    }
}
