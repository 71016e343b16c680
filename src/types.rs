//! Core types for the recorder.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Index of one captured mutation. Zero-based and contiguous.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Step(pub u64);

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step({})", self.0)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Step {
    pub fn next(self) -> Self {
        Step(self.0 + 1)
    }

    pub fn prev(self) -> Option<Self> {
        if self.0 > 0 {
            Some(Step(self.0 - 1))
        } else {
            None
        }
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u64> for Step {
    fn from(n: u64) -> Self {
        Step(n)
    }
}

/// Logical namespace holding slots: module globals or one call-frame instance.
///
/// Ids are allocated by the session and never reused, so a frame that lands on
/// the same host address as an earlier frame still gets a distinct id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u64);

impl ScopeId {
    /// The module-level scope, live for the whole session.
    pub const GLOBAL: ScopeId = ScopeId(0);

    pub fn is_global(self) -> bool {
        self == Self::GLOBAL
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({})", self.0)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a binding within a scope.
///
/// Backed by `Arc<str>`: the same few names are captured over and over, and
/// clones should not allocate.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot(Arc<str>);

impl Slot {
    pub fn new(name: impl AsRef<str>) -> Self {
        Slot(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({:?})", &*self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Slot {
    fn from(s: &str) -> Self {
        Slot::new(s)
    }
}

impl From<String> for Slot {
    fn from(s: String) -> Self {
        Slot(Arc::from(s))
    }
}

impl Borrow<str> for Slot {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Host-defined code location (line number, instruction offset, ...).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationId(pub u64);

impl fmt::Debug for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loc({})", self.0)
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to an immutable value held by the value store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueRef(pub u32);

impl fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueRef({})", self.0)
    }
}

/// What a captured mutation did to its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Slot is (re)bound to a new value.
    Bind,
    /// Slot is removed from its scope.
    Unbind,
    /// The value bound to the slot was mutated in place.
    InPlaceUpdate,
}

/// One captured mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the log (assigned at capture).
    pub step: Step,

    pub kind: EventKind,

    pub scope: ScopeId,

    pub slot: Slot,

    /// Value before the mutation, if it was captured.
    pub previous_value: Option<ValueRef>,

    /// Value after the mutation. `None` for unbinds and for untracked
    /// in-place updates.
    pub new_value: Option<ValueRef>,

    /// Where in the host program the mutation happened.
    pub location: LocationId,
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Recording statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub step_count: u64,
    pub value_count: u64,
    pub value_bytes: u64,
    pub interned_count: u64,
    pub checkpoint_count: u64,
    pub location_count: u64,
    pub scope_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_navigation() {
        let step = Step(5);
        assert_eq!(step.next(), Step(6));
        assert_eq!(step.prev(), Some(Step(4)));
        assert_eq!(Step(0).prev(), None);
    }

    #[test]
    fn test_slot_clone_shares_name() {
        let a = Slot::new("counter");
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(b.as_str(), "counter");
        assert_eq!(format!("{}", b), "counter");
    }

    #[test]
    fn test_global_scope() {
        assert!(ScopeId::GLOBAL.is_global());
        assert!(!ScopeId(7).is_global());
    }
}
