//! # Retrace
//!
//! A record-once, query-many execution tracer. A host interpreter reports
//! every state mutation while a program runs; afterwards (or during the
//! run) the recording answers "what was every live variable at step N"
//! without re-running the program.
//!
//! ## Core Concepts
//!
//! - **Events**: Append-only log of mutations, one step each
//! - **Values**: Owned copies of captured values, never aliasing host memory
//! - **Checkpoints**: Full states every K steps, bounding replay cost
//! - **Visits**: Per-location ascending step lists for "when did X happen"
//! - **Sessions**: Drive capture, run a periodic callback, end in a terminal state
//!
//! ## Example
//!
//! ```
//! use retrace::{LocationId, Outcome, ScopeId, Session, SessionConfig, Value};
//!
//! let mut session = Session::begin(SessionConfig::default())?;
//! let here = LocationId(1);
//!
//! session.bind(ScopeId::GLOBAL, "x", 5i64, here)?;
//! session.update(ScopeId::GLOBAL, "x", 5i64, 6i64, here)?;
//! session.unbind(ScopeId::GLOBAL, "x", 6i64, here)?;
//!
//! let recording = session.end(Outcome::Completed);
//! assert_eq!(recording.steps(), 3);
//! assert_eq!(recording.state(0)?.global("x"), Some(&Value::Int(5)));
//! assert_eq!(recording.state(1)?.global("x"), Some(&Value::Int(6)));
//! assert!(recording.state(2)?.is_empty());
//! assert_eq!(recording.visits(here).len(), 3);
//! # Ok::<(), retrace::RecorderError>(())
//! ```

mod archive;
pub mod checkpoints;
pub mod error;
pub mod events;
pub mod recording;
pub mod session;
pub mod subscriptions;
pub mod types;
pub mod values;

// Re-exports
pub use checkpoints::{Checkpoint, CheckpointIndex};
pub use error::{RecorderError, Result};
pub use events::{EventLog, VisitIndex};
pub use recording::{AbortReason, Outcome, Recording, ScopeInfo, State};
pub use session::{Callback, CallbackError, CallbackInterval, Session, SessionConfig, SessionState};
pub use subscriptions::{
    DropReason, SessionEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
pub use types::*;
pub use values::{Observed, Shape, Value, ValueStore};
