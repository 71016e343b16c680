//! Session controller: drives one capture session from start to end.

use crate::error::{RecorderError, Result};
use crate::recording::{AbortReason, Outcome, Prepared, Recording};
use crate::subscriptions::{
    SessionEvent, SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager,
};
use crate::types::{EventKind, LocationId, ScopeId, Slot, Step};
use crate::values::Observed;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::config::{CallbackInterval, SessionConfig};

/// Error type returned by session callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Caller-supplied logic run periodically during capture. Receives the
/// recording in a consistent state; no capture happens until it returns.
pub type Callback = Box<dyn FnMut(&Recording) -> std::result::Result<(), CallbackError> + Send>;

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Callback plus its schedule.
struct Scheduled {
    callback: Callback,
    interval: CallbackInterval,
    last_run: Instant,
    /// Step count at the last invocation.
    last_boundary: Option<u64>,
}

impl Scheduled {
    fn is_due(&self, steps: u64, now: Instant) -> bool {
        if self.last_boundary == Some(steps) {
            return false;
        }
        match self.interval {
            CallbackInterval::Steps(every) => steps % every == 0,
            CallbackInterval::Elapsed(period) => now.duration_since(self.last_run) >= period,
        }
    }
}

/// A capture session.
///
/// The session is the single writer of its [`Recording`]. The host calls
/// [`capture`](Session::capture) once per observed mutation, in execution
/// order. Queries can be issued at any time through
/// [`recording`](Session::recording).
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    recording: Arc<Recording>,
    callback: Option<Scheduled>,
    subscriptions: SubscriptionManager,
}

impl Session {
    /// Create an idle session.
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let recording = Arc::new(Recording::new(&config));

        Ok(Self {
            config,
            state: SessionState::Idle,
            recording,
            callback: None,
            subscriptions: SubscriptionManager::new(),
        })
    }

    /// Create a session and start recording.
    pub fn begin(config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(config)?;
        session.start()?;
        Ok(session)
    }

    /// Create a session with a periodic callback and start recording.
    pub fn begin_with_callback<F>(
        config: SessionConfig,
        interval: CallbackInterval,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(&Recording) -> std::result::Result<(), CallbackError> + Send + 'static,
    {
        let mut session = Self::new(config)?;
        session.set_callback(interval, callback)?;
        session.start()?;
        Ok(session)
    }

    /// Install (or replace) the periodic callback.
    pub fn set_callback<F>(&mut self, interval: CallbackInterval, callback: F) -> Result<()>
    where
        F: FnMut(&Recording) -> std::result::Result<(), CallbackError> + Send + 'static,
    {
        interval.validate()?;
        if self.state.is_terminal() {
            return Err(RecorderError::SessionClosed(self.state));
        }
        self.callback = Some(Scheduled {
            callback: Box::new(callback),
            interval,
            last_run: Instant::now(),
            last_boundary: None,
        });
        Ok(())
    }

    /// `Idle -> Recording`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(RecorderError::SessionClosed(self.state));
        }
        self.state = SessionState::Recording;
        if let Some(scheduled) = self.callback.as_mut() {
            scheduled.last_run = Instant::now();
        }

        tracing::debug!(
            label = ?self.config.label,
            record_state = self.config.record_state,
            checkpoint_interval = self.config.checkpoint_interval,
            "session started"
        );
        Ok(())
    }

    // --- Capture ---

    /// Record one mutation. Returns the step assigned to it.
    ///
    /// Live values are copied (or not) according to `record_state` before
    /// the recording lock is taken. A callback failure or an exhausted
    /// budget aborts the session; everything captured before stays
    /// queryable.
    pub fn capture<'a>(
        &mut self,
        scope: ScopeId,
        slot: impl Into<Slot>,
        kind: EventKind,
        previous: impl Into<Observed<'a>>,
        new: impl Into<Observed<'a>>,
        location: LocationId,
    ) -> Result<Step> {
        self.ensure_recording()?;
        self.run_callback_if_due()?;

        let record_state = self.config.record_state;
        let previous = Prepared::from_observed(previous.into(), record_state);
        let new = Prepared::from_observed(new.into(), record_state);

        match self
            .recording
            .append(scope, slot.into(), kind, previous, new, location)
        {
            Ok(appended) => {
                if let Some(step) = appended.checkpoint {
                    self.subscriptions
                        .broadcast(SessionEvent::CheckpointCreated { step });
                }
                Ok(appended.step)
            }
            Err(err) if err.aborts_session() => {
                tracing::warn!(
                    steps = self.recording.steps(),
                    error = %err,
                    "capture failed, aborting session"
                );
                self.finish(Outcome::Aborted(AbortReason::Overflow {
                    message: err.to_string(),
                }));
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// `Bind` with no previous value.
    pub fn bind<'a>(
        &mut self,
        scope: ScopeId,
        slot: impl Into<Slot>,
        value: impl Into<Observed<'a>>,
        location: LocationId,
    ) -> Result<Step> {
        self.capture(scope, slot, EventKind::Bind, Observed::Absent, value, location)
    }

    /// `InPlaceUpdate` of a bound slot.
    pub fn update<'a>(
        &mut self,
        scope: ScopeId,
        slot: impl Into<Slot>,
        previous: impl Into<Observed<'a>>,
        new: impl Into<Observed<'a>>,
        location: LocationId,
    ) -> Result<Step> {
        self.capture(scope, slot, EventKind::InPlaceUpdate, previous, new, location)
    }

    /// `Unbind` of a slot.
    pub fn unbind<'a>(
        &mut self,
        scope: ScopeId,
        slot: impl Into<Slot>,
        previous: impl Into<Observed<'a>>,
        location: LocationId,
    ) -> Result<Step> {
        self.capture(
            scope,
            slot,
            EventKind::Unbind,
            previous,
            Observed::Absent,
            location,
        )
    }

    /// Open a scope, e.g. a new call frame. Ids are never reused.
    pub fn enter_scope(&mut self, label: impl Into<String>) -> Result<ScopeId> {
        self.ensure_recording()?;
        let label = label.into();
        let (scope, at) = self.recording.enter_scope(label.clone());

        if self.subscriptions.has_subscribers() {
            self.subscriptions
                .broadcast(SessionEvent::ScopeEntered { scope, label, at });
        }
        Ok(scope)
    }

    /// Close a scope. Its slots disappear from every state from now on.
    pub fn exit_scope(&mut self, scope: ScopeId) -> Result<()> {
        self.ensure_recording()?;
        let at = self.recording.exit_scope(scope)?;
        self.subscriptions
            .broadcast(SessionEvent::ScopeExited { scope, at });
        Ok(())
    }

    /// End the session and hand back the recording.
    ///
    /// A session that already aborted keeps its abort outcome.
    pub fn end(mut self, outcome: Outcome) -> Arc<Recording> {
        if !self.state.is_terminal() {
            self.finish(outcome);
        }
        Arc::clone(&self.recording)
    }

    // --- Accessors ---

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shared handle to the recording; valid for queries in every state.
    pub fn recording(&self) -> Arc<Recording> {
        Arc::clone(&self.recording)
    }

    /// Number of captured steps.
    pub fn steps(&self) -> u64 {
        self.recording.steps()
    }

    /// Follow this session's lifecycle from another thread.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.subscriptions.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    // --- Internal ---

    fn ensure_recording(&self) -> Result<()> {
        if self.state != SessionState::Recording {
            return Err(RecorderError::SessionClosed(self.state));
        }
        Ok(())
    }

    fn run_callback_if_due(&mut self) -> Result<()> {
        let Some(scheduled) = self.callback.as_mut() else {
            return Ok(());
        };

        let steps = self.recording.steps();
        let started = Instant::now();
        if !scheduled.is_due(steps, started) {
            return Ok(());
        }

        let result = (scheduled.callback)(&*self.recording);
        let duration = started.elapsed();
        scheduled.last_run = Instant::now();
        scheduled.last_boundary = Some(steps);

        match result {
            Ok(()) => {
                self.subscriptions
                    .broadcast(SessionEvent::CallbackCompleted { steps, duration });
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(steps, error = %message, "session callback failed");
                self.finish(Outcome::Aborted(AbortReason::CallbackFailed {
                    message: message.clone(),
                }));
                Err(RecorderError::CallbackFailure {
                    step: Step(steps),
                    message,
                })
            }
        }
    }

    fn finish(&mut self, outcome: Outcome) -> Outcome {
        let outcome = self.recording.finish(outcome);
        self.state = match outcome {
            Outcome::Completed => SessionState::Completed,
            Outcome::Aborted(_) => SessionState::Aborted,
        };

        let steps = self.recording.steps();
        tracing::debug!(steps, outcome = ?outcome, "session ended");
        self.subscriptions.broadcast(SessionEvent::Finished {
            outcome: outcome.clone(),
            steps,
        });
        outcome
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Recording {
            self.finish(Outcome::Aborted(AbortReason::Dropped));
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("steps", &self.recording.steps())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
