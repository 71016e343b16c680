//! Checkpoints and replay.
//!
//! A checkpoint is a materialized state taken every K steps. Reconstructing
//! the state at step n starts from the closest checkpoint at or before n and
//! replays at most K events, regardless of total recording length.

mod index;
mod replay;

pub use index::{Checkpoint, CheckpointIndex};
pub use replay::{apply_event, replay, ScopeMap, StateMap};
