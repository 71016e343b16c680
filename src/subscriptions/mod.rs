//! Subscription system for live session updates.
//!
//! Observers on other threads can follow a running session without
//! querying it:
//! - Checkpoint creation
//! - Scope entry and exit
//! - Callback completion, with how long the callback took
//! - Session completion or abort
//!
//! Buffers are bounded and slow subscribers are dropped, so a stalled
//! observer never stalls capture.
//!
//! # Example
//!
//! ```ignore
//! let handle = session.subscribe(SubscriptionConfig::default());
//!
//! std::thread::spawn(move || loop {
//!     match handle.recv() {
//!         Ok(SessionEvent::CallbackCompleted { duration, .. }) => println!("callback took {:?}", duration),
//!         Ok(SessionEvent::Finished { outcome, steps }) => break,
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! });
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, SessionEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
};
