//! Event application.

use crate::types::{Event, EventKind, ScopeId, Slot, ValueRef};
use std::collections::BTreeMap;

/// Slots of one scope.
pub type ScopeMap = BTreeMap<Slot, ValueRef>;

/// Unresolved program state: scope -> slot -> value ref.
pub type StateMap = BTreeMap<ScopeId, ScopeMap>;

/// Apply one event to a state.
///
/// Total over the three event kinds. An update without a new value is an
/// untracked change and leaves the slot at its last tracked version.
/// Scopes left without slots are removed.
pub fn apply_event(state: &mut StateMap, event: &Event) {
    match event.kind {
        EventKind::Bind | EventKind::InPlaceUpdate => {
            if let Some(value) = event.new_value {
                state
                    .entry(event.scope)
                    .or_default()
                    .insert(event.slot.clone(), value);
            }
        }
        EventKind::Unbind => {
            if let Some(slots) = state.get_mut(&event.scope) {
                slots.remove(&event.slot);
                if slots.is_empty() {
                    state.remove(&event.scope);
                }
            }
        }
    }
}

/// Apply a run of events in order.
pub fn replay<'a>(state: &mut StateMap, events: impl IntoIterator<Item = &'a Event>) {
    for event in events {
        apply_event(state, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LocationId, Step};

    fn event(step: u64, kind: EventKind, slot: &str, new_value: Option<u32>) -> Event {
        Event {
            step: Step(step),
            kind,
            scope: ScopeId::GLOBAL,
            slot: Slot::new(slot),
            previous_value: None,
            new_value: new_value.map(ValueRef),
            location: LocationId(0),
        }
    }

    #[test]
    fn test_bind() {
        let mut state = StateMap::new();
        apply_event(&mut state, &event(0, EventKind::Bind, "x", Some(1)));
        assert_eq!(state[&ScopeId::GLOBAL]["x"], ValueRef(1));
    }

    #[test]
    fn test_in_place_update_replaces_ref() {
        let mut state = StateMap::new();
        apply_event(&mut state, &event(0, EventKind::Bind, "x", Some(1)));
        apply_event(&mut state, &event(1, EventKind::InPlaceUpdate, "x", Some(2)));
        assert_eq!(state[&ScopeId::GLOBAL]["x"], ValueRef(2));
    }

    #[test]
    fn test_untracked_update_keeps_last_version() {
        let mut state = StateMap::new();
        apply_event(&mut state, &event(0, EventKind::Bind, "x", Some(1)));
        apply_event(&mut state, &event(1, EventKind::InPlaceUpdate, "x", None));
        assert_eq!(state[&ScopeId::GLOBAL]["x"], ValueRef(1));
    }

    #[test]
    fn test_unbind_drops_empty_scope() {
        let mut state = StateMap::new();
        replay(
            &mut state,
            &[
                event(0, EventKind::Bind, "x", Some(1)),
                event(1, EventKind::Bind, "y", Some(2)),
                event(2, EventKind::Unbind, "x", None),
            ],
        );
        assert_eq!(state[&ScopeId::GLOBAL].len(), 1);

        apply_event(&mut state, &event(3, EventKind::Unbind, "y", None));
        assert!(state.is_empty());
    }

    #[test]
    fn test_unbind_missing_slot_is_noop() {
        let mut state = StateMap::new();
        apply_event(&mut state, &event(0, EventKind::Unbind, "ghost", None));
        assert!(state.is_empty());
    }
}
