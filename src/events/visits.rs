//! Per-location visit index.

use crate::error::{RecorderError, Result};
use crate::types::{LocationId, Step};
use std::collections::HashMap;

/// Location -> ascending steps at which it was hit.
///
/// Each list is built by appending the step of every capture at that
/// location, so it is sorted and duplicate free and callers can binary
/// search it directly.
#[derive(Default)]
pub struct VisitIndex {
    entries: HashMap<LocationId, Vec<Step>>,
}

impl VisitIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit.
    ///
    /// Steps must arrive in strictly increasing order per location.
    pub fn record(&mut self, location: LocationId, step: Step) -> Result<()> {
        let visits = self.entries.entry(location).or_default();
        if let Some(&last) = visits.last() {
            if step <= last {
                return Err(RecorderError::Corruption(format!(
                    "visit at step {} for location {} after step {}",
                    step, location, last
                )));
            }
        }
        visits.push(step);
        Ok(())
    }

    /// Steps at which `location` was visited. Empty if never visited.
    pub fn get(&self, location: LocationId) -> &[Step] {
        self.entries
            .get(&location)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of visits to `location`.
    pub fn count(&self, location: LocationId) -> usize {
        self.get(location).len()
    }

    /// All visited locations, sorted.
    pub fn locations(&self) -> Vec<LocationId> {
        let mut locations: Vec<_> = self.entries.keys().copied().collect();
        locations.sort();
        locations
    }

    /// Number of distinct locations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
