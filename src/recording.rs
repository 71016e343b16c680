//! Recording: the queryable result of one capture session.

use crate::checkpoints::{replay, CheckpointIndex, StateMap};
use crate::error::{RecorderError, Result};
use crate::events::{EventLog, VisitIndex};
use crate::session::SessionConfig;
use crate::types::{
    Event, EventKind, LocationId, RecordingStats, ScopeId, Slot, Step, Timestamp, ValueRef,
};
use crate::values::{Observed, Shape, Value, ValueStore};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::Path;

/// Why a session stopped before completing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The host ended the session as aborted.
    Requested,
    /// The session handle was dropped while still recording.
    Dropped,
    /// The periodic callback returned an error.
    CallbackFailed { message: String },
    /// A step or memory budget was exhausted.
    Overflow { message: String },
}

/// Terminal outcome of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Aborted(AbortReason),
}

impl Outcome {
    /// Host-requested abort.
    pub fn aborted() -> Self {
        Outcome::Aborted(AbortReason::Requested)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Lifetime of one scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub id: ScopeId,

    /// Host-supplied name (function name, module name, ...).
    pub label: String,

    /// Step count when the scope was entered.
    pub entered_at: u64,

    /// Step count when the scope was exited. The scope is absent from
    /// `state(n)` for every `n >= exited_at`.
    pub exited_at: Option<u64>,
}

impl ScopeInfo {
    /// Whether the scope is still live at step `n`.
    pub fn is_live_at(&self, n: Step) -> bool {
        self.exited_at.map_or(true, |exit| n.0 < exit)
    }
}

/// Program state at one step, with every value resolved.
///
/// Returned by value: nothing in it points into the recording.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct State {
    scopes: BTreeMap<ScopeId, BTreeMap<Slot, Value>>,
}

impl State {
    /// Value of `slot` in `scope`.
    pub fn get(&self, scope: ScopeId, slot: &str) -> Option<&Value> {
        self.scopes.get(&scope).and_then(|slots| slots.get(slot))
    }

    /// Value of a global slot.
    pub fn global(&self, slot: &str) -> Option<&Value> {
        self.get(ScopeId::GLOBAL, slot)
    }

    /// Slots of one scope.
    pub fn scope(&self, scope: ScopeId) -> Option<&BTreeMap<Slot, Value>> {
        self.scopes.get(&scope)
    }

    /// Scopes with at least one bound slot.
    pub fn scope_ids(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.scopes.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Total number of bound slots.
    pub fn slot_count(&self) -> usize {
        self.scopes.values().map(BTreeMap::len).sum()
    }

    pub fn into_inner(self) -> BTreeMap<ScopeId, BTreeMap<Slot, Value>> {
        self.scopes
    }

    /// `{ "<scope id>": { "<slot>": <value> } }`
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (scope, slots) in &self.scopes {
            let mut inner = serde_json::Map::new();
            for (slot, value) in slots {
                inner.insert(slot.to_string(), value.to_json());
            }
            obj.insert(scope.to_string(), serde_json::Value::Object(inner));
        }
        serde_json::Value::Object(obj)
    }
}

/// Session-side status of a recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Status {
    Live,
    Finished(Outcome),
}

/// A value prepared outside the lock, ready to be stored.
pub(crate) enum Prepared {
    Absent,
    /// Immutable: intern.
    Shared(Value),
    /// Fresh copy of live memory: always a new entry.
    Copied(Value),
    /// Live container that was not copied.
    Untracked(String),
}

impl Prepared {
    /// Apply the capture policy to a host observation.
    ///
    /// Snapshot functions run here, before the recording lock is taken.
    pub(crate) fn from_observed(observed: Observed<'_>, record_state: bool) -> Self {
        match observed {
            Observed::Absent => Prepared::Absent,
            Observed::Owned(value) => Prepared::Shared(value),
            Observed::Live {
                shape: Shape::Scalar,
                snapshot,
                ..
            } => Prepared::Shared(snapshot()),
            Observed::Live {
                shape: Shape::Container,
                type_name,
                snapshot,
            } => {
                if record_state {
                    Prepared::Copied(snapshot())
                } else {
                    Prepared::Untracked(type_name.to_string())
                }
            }
        }
    }

    /// Store the value. An untracked in-place update stores nothing, so
    /// replay keeps the last tracked version.
    fn store(self, values: &mut ValueStore, in_place: bool) -> Result<Option<ValueRef>> {
        match self {
            Prepared::Absent => Ok(None),
            Prepared::Shared(value) => values.intern(value).map(Some),
            Prepared::Copied(value) => values.insert(value).map(Some),
            Prepared::Untracked(_) if in_place => Ok(None),
            Prepared::Untracked(type_name) => values.intern(Value::untracked(type_name)).map(Some),
        }
    }
}

/// Result of appending one event.
pub(crate) struct Appended {
    pub step: Step,
    pub checkpoint: Option<Step>,
}

/// Mutable core, guarded by one lock.
pub(crate) struct RecordingCore {
    pub(crate) log: EventLog,
    pub(crate) values: ValueStore,
    pub(crate) checkpoints: CheckpointIndex,
    pub(crate) visits: VisitIndex,
    /// Indexed by `ScopeId.0`.
    pub(crate) scopes: Vec<ScopeInfo>,
    pub(crate) status: Status,
}

impl RecordingCore {
    fn scope(&self, scope: ScopeId) -> Result<&ScopeInfo> {
        self.scopes
            .get(scope.0 as usize)
            .ok_or(RecorderError::UnknownScope(scope))
    }
}

/// The queryable result of one capture session.
///
/// While its session runs, the session is the only writer; queries and
/// appends are serialized by a per-recording lock held only for the
/// duration of one append or one query. Once finished it never changes and
/// can be shared freely between reader threads.
pub struct Recording {
    /// Free-text label from the session config.
    label: Option<String>,

    /// Whether live containers are copied.
    record_state: bool,

    /// Whether scope entries trigger checkpoints.
    checkpoint_on_scope_entry: bool,

    /// When the recording was created.
    created: Timestamp,

    pub(crate) core: RwLock<RecordingCore>,

    /// Reconstructed states for steps below `steps()`.
    cache: Option<Mutex<LruCache<Step, State>>>,
}

impl Recording {
    /// Label of the global scope.
    pub const GLOBAL_LABEL: &'static str = "<global>";

    /// Create an empty, live recording.
    pub(crate) fn new(config: &SessionConfig) -> Self {
        let global = ScopeInfo {
            id: ScopeId::GLOBAL,
            label: Self::GLOBAL_LABEL.to_string(),
            entered_at: 0,
            exited_at: None,
        };

        Self::from_core(
            config.label.clone(),
            config.record_state,
            config.checkpoint_on_scope_entry,
            Timestamp::now(),
            config.state_cache_size,
            RecordingCore {
                log: EventLog::new(config.max_steps),
                values: ValueStore::new(config.max_value_bytes),
                checkpoints: CheckpointIndex::new(config.checkpoint_interval),
                visits: VisitIndex::new(),
                scopes: vec![global],
                status: Status::Live,
            },
        )
    }

    pub(crate) fn from_core(
        label: Option<String>,
        record_state: bool,
        checkpoint_on_scope_entry: bool,
        created: Timestamp,
        cache_size: usize,
        core: RecordingCore,
    ) -> Self {
        Self {
            label,
            record_state,
            checkpoint_on_scope_entry,
            created,
            core: RwLock::new(core),
            cache: NonZeroUsize::new(cache_size).map(|n| Mutex::new(LruCache::new(n))),
        }
    }

    // --- Capture (crate-internal, driven by the session) ---

    /// Append one mutation.
    pub(crate) fn append(
        &self,
        scope: ScopeId,
        slot: Slot,
        kind: EventKind,
        previous: Prepared,
        new: Prepared,
        location: LocationId,
    ) -> Result<Appended> {
        let mut core = self.core.write();
        let core = &mut *core;

        if core.status != Status::Live {
            return Err(RecorderError::Corruption(
                "append to a finished recording".into(),
            ));
        }
        core.log.check_capacity()?;

        let info = core.scope(scope)?;
        if info.exited_at.is_some() {
            return Err(RecorderError::ScopeClosed(scope));
        }

        let previous_value = previous.store(&mut core.values, false)?;
        let new_value = new.store(&mut core.values, kind == EventKind::InPlaceUpdate)?;

        let event = core
            .log
            .append(kind, scope, slot, previous_value, new_value, location)?;
        core.visits.record(event.location, event.step)?;
        let checkpoint = core.checkpoints.observe(event);

        Ok(Appended {
            step: event.step,
            checkpoint,
        })
    }

    /// Open a new scope. Returns its id and the step count at entry.
    pub(crate) fn enter_scope(&self, label: String) -> (ScopeId, u64) {
        let mut core = self.core.write();
        let id = ScopeId(core.scopes.len() as u64);
        let at = core.log.len();

        core.scopes.push(ScopeInfo {
            id,
            label,
            entered_at: at,
            exited_at: None,
        });
        if self.checkpoint_on_scope_entry {
            core.checkpoints.mark_boundary();
        }

        (id, at)
    }

    /// Close a scope. Returns the step count at exit. The global scope
    /// stays open until the session ends.
    pub(crate) fn exit_scope(&self, scope: ScopeId) -> Result<u64> {
        if scope.is_global() {
            return Err(RecorderError::GlobalScopeExit);
        }
        let mut core = self.core.write();
        let at = core.log.len();

        let info = core
            .scopes
            .get_mut(scope.0 as usize)
            .ok_or(RecorderError::UnknownScope(scope))?;
        if info.exited_at.is_some() {
            return Err(RecorderError::ScopeClosed(scope));
        }
        info.exited_at = Some(at);

        core.checkpoints.remove_scope(scope);
        Ok(at)
    }

    /// Mark the recording terminal. A recording that is already finished
    /// keeps its first outcome.
    pub(crate) fn finish(&self, outcome: Outcome) -> Outcome {
        let mut core = self.core.write();
        match &core.status {
            Status::Finished(existing) => existing.clone(),
            Status::Live => {
                core.status = Status::Finished(outcome.clone());
                outcome
            }
        }
    }

    // --- Queries ---

    /// Number of captured steps.
    pub fn steps(&self) -> u64 {
        self.core.read().log.len()
    }

    /// State at step `n`: every event with step <= `n` applied to the empty
    /// initial state. `n` must be in `[0, steps()]`; `state(steps())` is the
    /// final state.
    ///
    /// Starts from the latest checkpoint at or before `n`, so at most one
    /// checkpoint interval of events is replayed.
    pub fn state(&self, n: u64) -> Result<State> {
        let n = Step(n);
        let core = self.core.read();
        let steps = core.log.len();

        if n.0 > steps {
            return Err(RecorderError::OutOfRange { step: n, steps });
        }

        // States below the tip never change once captured
        let cacheable = n.0 < steps;
        if cacheable {
            if let Some(cache) = &self.cache {
                if let Some(state) = cache.lock().get(&n) {
                    return Ok(state.clone());
                }
            }
        }

        let state = Self::reconstruct(&core, n)?;

        if cacheable {
            if let Some(cache) = &self.cache {
                cache.lock().put(n, state.clone());
            }
        }

        Ok(state)
    }

    /// Slots of one scope at step `n`. `Ok(None)` if the scope had no bound
    /// slots at that step.
    pub fn scope_state(
        &self,
        n: u64,
        scope: ScopeId,
    ) -> Result<Option<BTreeMap<Slot, Value>>> {
        let mut scopes = self.state(n)?.into_inner();
        Ok(scopes.remove(&scope))
    }

    /// Steps at which `location` was visited, ascending. Empty if never
    /// visited.
    pub fn visits(&self, location: LocationId) -> Vec<Step> {
        self.core.read().visits.get(location).to_vec()
    }

    /// Number of visits to `location`.
    pub fn visit_count(&self, location: LocationId) -> usize {
        self.core.read().visits.count(location)
    }

    /// Every visited location, sorted.
    pub fn locations(&self) -> Vec<LocationId> {
        self.core.read().visits.locations()
    }

    /// Event at `step`.
    pub fn event(&self, step: u64) -> Option<Event> {
        self.core.read().log.get(Step(step)).cloned()
    }

    /// Events with steps in `range`, clamped to the log.
    pub fn events(&self, range: Range<Step>) -> Vec<Event> {
        self.core.read().log.range(range).to_vec()
    }

    /// Resolve a value ref.
    pub fn value(&self, value_ref: ValueRef) -> Option<Value> {
        self.core.read().values.get(value_ref).cloned()
    }

    /// Steps of all checkpoints, ascending.
    /// Steps that have a checkpoint, ascending. Step 0 is always listed;
    /// before the first event it stands for the empty initial state.
    pub fn checkpoint_steps(&self) -> Vec<Step> {
        self.core.read().checkpoints.steps()
    }

    pub fn checkpoint_interval(&self) -> u64 {
        self.core.read().checkpoints.interval()
    }

    /// Terminal outcome, or None while the session is still recording.
    pub fn outcome(&self) -> Option<Outcome> {
        match &self.core.read().status {
            Status::Live => None,
            Status::Finished(outcome) => Some(outcome.clone()),
        }
    }

    /// Whether the session has ended (completed or aborted).
    pub fn is_complete(&self) -> bool {
        self.outcome().is_some()
    }

    /// All scopes ever entered, by id.
    pub fn scopes(&self) -> Vec<ScopeInfo> {
        self.core.read().scopes.clone()
    }

    pub fn scope(&self, scope: ScopeId) -> Option<ScopeInfo> {
        self.core.read().scopes.get(scope.0 as usize).cloned()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn record_state(&self) -> bool {
        self.record_state
    }

    pub fn checkpoint_on_scope_entry(&self) -> bool {
        self.checkpoint_on_scope_entry
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    /// Recording statistics.
    pub fn stats(&self) -> RecordingStats {
        let core = self.core.read();
        RecordingStats {
            step_count: core.log.len(),
            value_count: core.values.len() as u64,
            value_bytes: core.values.bytes() as u64,
            interned_count: core.values.interned_count() as u64,
            checkpoint_count: core.checkpoints.len() as u64,
            location_count: core.visits.len() as u64,
            scope_count: core.scopes.len() as u64,
        }
    }

    // --- Persistence ---

    /// Write a finished recording to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::archive::save(self, path.as_ref())
    }

    /// Load a recording written by `save`. Checkpoint and visit indices are
    /// rebuilt by replay.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        crate::archive::load(path.as_ref())
    }

    fn reconstruct(core: &RecordingCore, n: Step) -> Result<State> {
        let steps = core.log.len();
        let mut working = StateMap::new();

        if steps > 0 {
            // Last event to apply
            let target = Step(n.0.min(steps - 1));

            let start = match core.checkpoints.base_for(target) {
                Some(checkpoint) => {
                    working = (*checkpoint.state).clone();
                    checkpoint.step.next()
                }
                None => Step(0),
            };

            replay(&mut working, core.log.range(start..target.next()));
        }

        let mut scopes = BTreeMap::new();
        for (scope, slots) in working {
            let live = core
                .scopes
                .get(scope.0 as usize)
                .map_or(false, |info| info.is_live_at(n));
            if !live {
                continue;
            }

            let mut resolved = BTreeMap::new();
            for (slot, value_ref) in slots {
                let value = core.values.get(value_ref).ok_or_else(|| {
                    RecorderError::Corruption(format!("dangling value ref {:?}", value_ref))
                })?;
                resolved.insert(slot, value.clone());
            }
            scopes.insert(scope, resolved);
        }

        Ok(State { scopes })
    }
}

impl std::fmt::Debug for Recording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recording")
            .field("label", &self.label)
            .field("steps", &self.steps())
            .field("outcome", &self.outcome())
            .finish()
    }
}
