//! Error types for the recorder.

use crate::session::SessionState;
use crate::types::{ScopeId, Step};
use thiserror::Error;

/// Main error type for capture and query operations.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Step {step} out of range (recording has {steps} steps)")]
    OutOfRange { step: Step, steps: u64 },

    #[error("Callback failed before step {step}: {message}")]
    CallbackFailure { step: Step, message: String },

    #[error("Capture overflow: {0}")]
    CaptureOverflow(String),

    #[error("Session is not recording (state: {0})")]
    SessionClosed(SessionState),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown scope: {0}")]
    UnknownScope(ScopeId),

    #[error("Scope already exited: {0}")]
    ScopeClosed(ScopeId),

    #[error("The global scope cannot be exited")]
    GlobalScopeExit,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },
}

impl RecorderError {
    /// Whether this error aborts the session that raised it.
    pub fn aborts_session(&self) -> bool {
        matches!(
            self,
            RecorderError::CallbackFailure { .. } | RecorderError::CaptureOverflow(_)
        )
    }
}

impl From<serde_json::Error> for RecorderError {
    fn from(e: serde_json::Error) -> Self {
        RecorderError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for RecorderError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        RecorderError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RecorderError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        RecorderError::Deserialization(e.to_string())
    }
}

/// Result type for recorder operations.
pub type Result<T> = std::result::Result<T, RecorderError>;
