//! Append-only event log.

use crate::error::{RecorderError, Result};
use crate::types::{Event, EventKind, LocationId, ScopeId, Slot, Step, ValueRef};
use std::ops::Range;

/// Strictly ordered sequence of captured mutations.
///
/// The position of an event in the log is its step, so steps are contiguous
/// from zero by construction.
#[derive(Default)]
pub struct EventLog {
    events: Vec<Event>,

    /// Upper bound on the number of events (None = unbounded).
    max_steps: Option<u64>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new(max_steps: Option<u64>) -> Self {
        Self {
            events: Vec::new(),
            max_steps,
        }
    }

    /// Rebuild a log from events loaded off disk, checking step contiguity.
    pub fn from_events(events: Vec<Event>) -> Result<Self> {
        for (i, event) in events.iter().enumerate() {
            if event.step.0 != i as u64 {
                return Err(RecorderError::Corruption(format!(
                    "event at position {} has step {}",
                    i, event.step
                )));
            }
        }

        Ok(Self {
            events,
            max_steps: None,
        })
    }

    /// The step the next append will get.
    pub fn next_step(&self) -> Step {
        Step(self.events.len() as u64)
    }

    /// Fail with `CaptureOverflow` if one more event would exceed the budget.
    pub fn check_capacity(&self) -> Result<()> {
        if let Some(max) = self.max_steps {
            if self.events.len() as u64 >= max {
                return Err(RecorderError::CaptureOverflow(format!(
                    "step limit of {} reached",
                    max
                )));
            }
        }
        Ok(())
    }

    /// Append an event, assigning it the next step.
    pub fn append(
        &mut self,
        kind: EventKind,
        scope: ScopeId,
        slot: Slot,
        previous_value: Option<ValueRef>,
        new_value: Option<ValueRef>,
        location: LocationId,
    ) -> Result<&Event> {
        self.check_capacity()?;

        let step = self.next_step();
        self.events.push(Event {
            step,
            kind,
            scope,
            slot,
            previous_value,
            new_value,
            location,
        });

        Ok(&self.events[step.as_usize()])
    }

    /// Get an event by step.
    pub fn get(&self, step: Step) -> Option<&Event> {
        self.events.get(step.as_usize())
    }

    /// Events with steps in `range` (clamped to the log).
    pub fn range(&self, range: Range<Step>) -> &[Event] {
        let len = self.events.len();
        let start = range.start.as_usize().min(len);
        let end = range.end.as_usize().min(len).max(start);
        &self.events[start..end]
    }

    /// Number of events (== `steps()`).
    pub fn len(&self) -> u64 {
        self.events.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append_bind(log: &mut EventLog, name: &str, value: u32) -> Step {
        log.append(
            EventKind::Bind,
            ScopeId::GLOBAL,
            Slot::new(name),
            None,
            Some(ValueRef(value)),
            LocationId(1),
        )
        .unwrap()
        .step
    }

    #[test]
    fn test_append_assigns_contiguous_steps() {
        let mut log = EventLog::default();
        for i in 0..10 {
            assert_eq!(append_bind(&mut log, "x", i), Step(i as u64));
        }
        assert_eq!(log.len(), 10);
        assert_eq!(log.next_step(), Step(10));
    }

    #[test]
    fn test_range_is_clamped() {
        let mut log = EventLog::default();
        for i in 0..5 {
            append_bind(&mut log, "x", i);
        }

        assert_eq!(log.range(Step(1)..Step(3)).len(), 2);
        assert_eq!(log.range(Step(3)..Step(100)).len(), 2);
        assert!(log.range(Step(7)..Step(9)).is_empty());
    }

    #[test]
    fn test_step_limit() {
        let mut log = EventLog::new(Some(2));
        append_bind(&mut log, "a", 0);
        append_bind(&mut log, "b", 1);

        let result = log.append(
            EventKind::Bind,
            ScopeId::GLOBAL,
            Slot::new("c"),
            None,
            Some(ValueRef(2)),
            LocationId(1),
        );
        assert!(matches!(result, Err(RecorderError::CaptureOverflow(_))));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_from_events_rejects_gaps() {
        let mut log = EventLog::default();
        append_bind(&mut log, "a", 0);
        append_bind(&mut log, "b", 1);

        let mut events = log.as_slice().to_vec();
        events.remove(0);
        assert!(matches!(
            EventLog::from_events(events),
            Err(RecorderError::Corruption(_))
        ));
    }
}
