//! Checkpointed reconstruction against full replay.

use proptest::prelude::*;
use retrace::{
    EventKind, LocationId, Outcome, Recording, ScopeId, Session, SessionConfig, Slot, Step, Value,
};
use std::collections::BTreeMap;

type Model = BTreeMap<ScopeId, BTreeMap<Slot, Value>>;

/// State at `n` computed the slow way: every event from step 0, no checkpoints.
fn full_replay(recording: &Recording, n: u64) -> Model {
    let mut state = Model::new();
    let end = Step((n + 1).min(recording.steps()));

    for event in recording.events(Step(0)..end) {
        match event.kind {
            EventKind::Bind | EventKind::InPlaceUpdate => {
                if let Some(value_ref) = event.new_value {
                    let value = recording.value(value_ref).unwrap();
                    state.entry(event.scope).or_default().insert(event.slot, value);
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

    for info in recording.scopes() {
        if !info.is_live_at(Step(n)) {
            state.remove(&info.id);
        }
    }
    state
}

#[derive(Clone, Debug)]
enum Op {
    Bind(u8, i64),
    Update(u8, i64),
    Unbind(u8),
    Enter,
    Exit,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..4, -50i64..50).prop_map(|(s, v)| Op::Bind(s, v)),
        3 => (0u8..4, -50i64..50).prop_map(|(s, v)| Op::Update(s, v)),
        2 => (0u8..4).prop_map(Op::Unbind),
        1 => Just(Op::Enter),
        1 => Just(Op::Exit),
    ]
}

fn run(ops: &[Op], config: SessionConfig) -> std::sync::Arc<Recording> {
    let mut session = Session::begin(config).unwrap();
    let mut frames = vec![ScopeId::GLOBAL];

    for (i, op) in ops.iter().enumerate() {
        let scope = *frames.last().unwrap();
        let location = LocationId(i as u64 % 7);
        match op {
            Op::Bind(slot, v) => {
                session
                    .bind(scope, format!("s{}", slot), *v, location)
                    .unwrap();
            }
            Op::Update(slot, v) => {
                session
                    .update(scope, format!("s{}", slot), Value::None, Value::list([*v]), location)
                    .unwrap();
            }
            Op::Unbind(slot) => {
                session
                    .unbind(scope, format!("s{}", slot), Value::None, location)
                    .unwrap();
            }
            Op::Enter => frames.push(session.enter_scope("frame").unwrap()),
            Op::Exit => {
                if frames.len() > 1 {
                    let frame = frames.pop().unwrap();
                    session.exit_scope(frame).unwrap();
                }
            }
        }
    }

    session.end(Outcome::Completed)
}

proptest! {
    #[test]
    fn prop_checkpointed_state_matches_full_replay(
        ops in prop::collection::vec(op(), 0..120),
        interval in 1u64..9,
        on_scope_entry in any::<bool>(),
    ) {
        let config = SessionConfig {
            checkpoint_interval: interval,
            checkpoint_on_scope_entry: on_scope_entry,
            state_cache_size: 0,
            ..Default::default()
        };
        let recording = run(&ops, config);

        for n in 0..=recording.steps() {
            let state = recording.state(n).unwrap().into_inner();
            prop_assert_eq!(state, full_replay(&recording, n), "step {}", n);
        }
    }

    #[test]
    fn prop_interval_does_not_change_results(
        ops in prop::collection::vec(op(), 1..80),
        interval in 2u64..16,
    ) {
        let dense = run(&ops, SessionConfig { checkpoint_interval: 1, ..Default::default() });
        let sparse = run(&ops, SessionConfig { checkpoint_interval: interval, ..Default::default() });

        prop_assert_eq!(dense.steps(), sparse.steps());
        for n in 0..=dense.steps() {
            prop_assert_eq!(dense.state(n).unwrap(), sparse.state(n).unwrap());
        }
    }
}

// --- Boundary Scenarios ---

#[test]
fn test_checkpoints_every_two_steps() {
    let config = SessionConfig {
        checkpoint_interval: 2,
        ..Default::default()
    };
    let mut session = Session::begin(config).unwrap();
    for i in 0..5i64 {
        session
            .bind(ScopeId::GLOBAL, format!("v{}", i), i, LocationId(1))
            .unwrap();
    }
    let recording = session.end(Outcome::Completed);

    assert_eq!(recording.checkpoint_steps(), vec![Step(0), Step(2), Step(4)]);

    let state = recording.state(3).unwrap();
    assert_eq!(state.slot_count(), 4);
    assert_eq!(state.global("v3"), Some(&Value::Int(3)));
    assert!(state.global("v4").is_none());
}

#[test]
fn test_base_checkpoint_for_step() {
    let mut session = Session::begin(SessionConfig {
        checkpoint_interval: 2,
        ..Default::default()
    })
    .unwrap();
    for i in 0..5i64 {
        session.bind(ScopeId::GLOBAL, "x", i, LocationId(1)).unwrap();
    }
    let recording = session.end(Outcome::Completed);

    // Rebuild the index from the log and check which base a query uses
    let mut index = retrace::CheckpointIndex::new(2);
    for event in recording.events(Step(0)..Step(recording.steps())) {
        index.observe(&event);
    }

    let base = index.base_for(Step(3)).unwrap();
    assert_eq!(base.step, Step(2));
    assert_eq!(index.base_for(Step(4)).unwrap().step, Step(4));
    assert_eq!(index.base_for(Step(1)).unwrap().step, Step(0));
}

#[test]
fn test_scope_entry_checkpoints() {
    let config = SessionConfig {
        checkpoint_interval: 100,
        ..Default::default()
    };
    let mut session = Session::begin(config).unwrap();

    for i in 0..3i64 {
        session.bind(ScopeId::GLOBAL, "i", i, LocationId(1)).unwrap();
    }
    let frame = session.enter_scope("f").unwrap();
    session.bind(frame, "a", 1i64, LocationId(2)).unwrap();
    session.bind(frame, "b", 2i64, LocationId(2)).unwrap();

    let recording = session.end(Outcome::Completed);
    assert_eq!(recording.checkpoint_steps(), vec![Step(0), Step(3)]);

    let state = recording.state(4).unwrap();
    assert_eq!(state.get(frame, "b"), Some(&Value::Int(2)));
    assert_eq!(state.global("i"), Some(&Value::Int(2)));
}

#[test]
fn test_scope_entry_checkpoints_disabled() {
    let config = SessionConfig {
        checkpoint_interval: 100,
        checkpoint_on_scope_entry: false,
        ..Default::default()
    };
    let mut session = Session::begin(config).unwrap();

    session.bind(ScopeId::GLOBAL, "i", 0i64, LocationId(1)).unwrap();
    let frame = session.enter_scope("f").unwrap();
    session.bind(frame, "a", 1i64, LocationId(2)).unwrap();

    let recording = session.end(Outcome::Completed);
    assert_eq!(recording.checkpoint_steps(), vec![Step(0)]);
    assert_eq!(recording.state(2).unwrap().get(frame, "a"), Some(&Value::Int(1)));
}

#[test]
fn test_empty_recording_lists_initial_checkpoint() {
    let session = Session::begin(SessionConfig::default()).unwrap();
    let recording = session.recording();

    assert_eq!(recording.checkpoint_steps(), vec![Step(0)]);
    assert!(recording.state(0).unwrap().is_empty());
    assert_eq!(recording.stats().checkpoint_count, 0);

    let recording = session.end(Outcome::Completed);
    assert_eq!(recording.checkpoint_steps(), vec![Step(0)]);
}

#[test]
fn test_exited_scope_not_in_later_checkpoints() {
    let config = SessionConfig {
        checkpoint_interval: 2,
        ..Default::default()
    };
    let mut session = Session::begin(config).unwrap();

    let frame = session.enter_scope("f").unwrap();
    session.bind(frame, "a", 1i64, LocationId(1)).unwrap();
    session.bind(frame, "b", 2i64, LocationId(1)).unwrap();
    session.exit_scope(frame).unwrap();
    for i in 0..4i64 {
        session.bind(ScopeId::GLOBAL, "i", i, LocationId(2)).unwrap();
    }
    let recording = session.end(Outcome::Completed);

    // Historical states before the exit still see the frame
    assert_eq!(recording.state(1).unwrap().get(frame, "b"), Some(&Value::Int(2)));
    for n in 2..=recording.steps() {
        assert!(recording.state(n).unwrap().scope(frame).is_none());
    }
}
