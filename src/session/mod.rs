//! Capture sessions.
//!
//! A [`Session`] moves through `Idle -> Recording -> {Completed | Aborted}`
//! and is the only writer of its [`Recording`](crate::Recording). Capture is
//! synchronous: the optional callback runs in line with `capture` on the
//! capturing thread and is the one point where the host gets control back.

mod config;
mod controller;

pub use config::{CallbackInterval, SessionConfig};
pub use controller::{Callback, CallbackError, Session, SessionState};
