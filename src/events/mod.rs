//! Event log and visit index.
//!
//! Events are stored in an append-only log whose positions are the step
//! numbers, giving O(1) access by step. The visit index is maintained
//! alongside it on every append.

mod log;
mod visits;

pub use log::EventLog;
pub use visits::VisitIndex;
