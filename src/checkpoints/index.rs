//! Checkpoint index.

use super::replay::{apply_event, StateMap};
use crate::types::{Event, ScopeId, Step};
use std::sync::Arc;

/// Materialized state including every event up to and including `step`.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub step: Step,
    pub state: Arc<StateMap>,
}

/// Periodic full-state snapshots bounding replay distance.
///
/// Periodic checkpoints sit at every multiple of the interval and are found
/// by direct index. Checkpoints taken at scope entries are kept apart in a
/// sorted list and found by binary search.
pub struct CheckpointIndex {
    /// Steps between periodic checkpoints.
    interval: u64,

    /// `periodic[i].step == i * interval`.
    periodic: Vec<Checkpoint>,

    /// Extra checkpoints at the first step of new scopes, sorted by step.
    boundaries: Vec<Checkpoint>,

    /// State after the last observed event.
    working: StateMap,

    /// Take a boundary checkpoint at the next observed event.
    boundary_pending: bool,

    /// Steps observed so far.
    observed: u64,
}

impl CheckpointIndex {
    /// Create an index with the given interval (clamped to at least 1).
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            periodic: Vec::new(),
            boundaries: Vec::new(),
            working: StateMap::new(),
            boundary_pending: false,
            observed: 0,
        }
    }

    /// Feed the next event. Returns the step if a checkpoint was taken.
    ///
    /// Events must be fed in step order without gaps.
    pub fn observe(&mut self, event: &Event) -> Option<Step> {
        debug_assert_eq!(event.step.0, self.observed);
        apply_event(&mut self.working, event);
        self.observed += 1;

        if event.step.0 % self.interval == 0 {
            self.boundary_pending = false;
            self.periodic.push(self.snapshot(event.step));
            return Some(event.step);
        }

        if self.boundary_pending {
            self.boundary_pending = false;
            self.boundaries.push(self.snapshot(event.step));
            return Some(event.step);
        }

        None
    }

    /// Request a checkpoint at the next observed event.
    pub fn mark_boundary(&mut self) {
        self.boundary_pending = true;
    }

    /// Drop a destroyed scope from the working state, so later checkpoints
    /// no longer carry it. Earlier checkpoints are untouched.
    pub fn remove_scope(&mut self, scope: ScopeId) {
        self.working.remove(&scope);
    }

    /// Latest checkpoint with step <= `step`, or None if no checkpoint is at
    /// or before it (replay then starts from the empty genesis state).
    pub fn base_for(&self, step: Step) -> Option<&Checkpoint> {
        let periodic = if self.periodic.is_empty() {
            None
        } else {
            let i = ((step.0 / self.interval) as usize).min(self.periodic.len() - 1);
            Some(&self.periodic[i])
        };

        let boundary = match self.boundaries.partition_point(|c| c.step <= step) {
            0 => None,
            i => Some(&self.boundaries[i - 1]),
        };

        match (periodic, boundary) {
            (Some(p), Some(b)) => Some(if b.step > p.step { b } else { p }),
            (p, b) => p.or(b),
        }
    }

    /// State after the last observed event.
    pub fn working(&self) -> &StateMap {
        &self.working
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Number of materialized checkpoints. The genesis state is not counted.
    pub fn len(&self) -> usize {
        self.periodic.len() + self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All checkpoint steps, ascending. Before any event is observed this is
    /// just `[Step(0)]`, the empty genesis state.
    pub fn steps(&self) -> Vec<Step> {
        if self.periodic.is_empty() {
            return vec![Step(0)];
        }
        let mut steps: Vec<Step> = self
            .periodic
            .iter()
            .chain(self.boundaries.iter())
            .map(|c| c.step)
            .collect();
        steps.sort();
        steps
    }

    fn snapshot(&self, step: Step) -> Checkpoint {
        tracing::trace!(step = step.0, scopes = self.working.len(), "checkpoint");
        Checkpoint {
            step,
            state: Arc::new(self.working.clone()),
        }
    }
}
