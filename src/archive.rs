//! On-disk archive of a finished recording.
//!
//! Layout: magic, version byte, then four frames (metadata, values, events,
//! scopes). Each frame is a little-endian `u32` length, a MessagePack body
//! and a CRC32 of the body. Checkpoints and visits are not stored; `load`
//! rebuilds them by replaying the event log.

use crate::checkpoints::CheckpointIndex;
use crate::error::{RecorderError, Result};
use crate::events::{EventLog, VisitIndex};
use crate::recording::{Outcome, Recording, RecordingCore, ScopeInfo, Status};
use crate::session::{SessionConfig, SessionState};
use crate::types::{Event, ScopeId, Timestamp};
use crate::values::{Value, ValueStore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes for archive files.
const ARCHIVE_MAGIC: &[u8; 4] = b"RTR\0";

/// Current archive format version.
const ARCHIVE_VERSION: u8 = 1;

/// Sanity bound on a single frame.
const MAX_FRAME_LEN: usize = 1 << 30;

/// Everything about a recording that is not a value, event or scope.
#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    label: Option<String>,
    record_state: bool,
    checkpoint_on_scope_entry: bool,
    checkpoint_interval: u64,
    created: Timestamp,
    outcome: Outcome,
    steps: u64,
}

/// Write a finished recording to `path`, replacing any existing file.
pub(crate) fn save(recording: &Recording, path: &Path) -> Result<()> {
    let core = recording.core.read();
    let outcome = match &core.status {
        Status::Live => return Err(RecorderError::SessionClosed(SessionState::Recording)),
        Status::Finished(outcome) => outcome.clone(),
    };

    let meta = Metadata {
        label: recording.label().map(str::to_string),
        record_state: recording.record_state(),
        checkpoint_on_scope_entry: recording.checkpoint_on_scope_entry(),
        checkpoint_interval: core.checkpoints.interval(),
        created: recording.created(),
        outcome,
        steps: core.log.len(),
    };

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(ARCHIVE_MAGIC)?;
    writer.write_all(&[ARCHIVE_VERSION])?;

    write_frame(&mut writer, &meta)?;
    write_frame(&mut writer, &core.values.values())?;
    write_frame(&mut writer, &core.log.as_slice())?;
    write_frame(&mut writer, &core.scopes)?;

    writer.flush()?;
    writer.get_ref().sync_all()?;

    tracing::debug!(
        path = %path.display(),
        steps = meta.steps,
        values = core.values.len(),
        "recording saved"
    );
    Ok(())
}

/// Read an archive written by [`save`] and rebuild its indices.
pub(crate) fn load(path: &Path) -> Result<Recording> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != ARCHIVE_MAGIC {
        return Err(RecorderError::InvalidFormat("Invalid archive magic".into()));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != ARCHIVE_VERSION {
        return Err(RecorderError::InvalidFormat(format!(
            "Unsupported archive version: {}",
            version[0]
        )));
    }

    let meta: Metadata = read_frame(&mut reader)?;
    let values: Vec<Value> = read_frame(&mut reader)?;
    let events: Vec<Event> = read_frame(&mut reader)?;
    let scopes: Vec<ScopeInfo> = read_frame(&mut reader)?;

    if meta.checkpoint_interval == 0 {
        return Err(RecorderError::Corruption("zero checkpoint interval".into()));
    }
    check_scopes(&scopes)?;

    let values = ValueStore::from_values(values)?;
    let log = EventLog::from_events(events)?;
    if log.len() != meta.steps {
        return Err(RecorderError::Corruption(format!(
            "metadata claims {} steps, log holds {}",
            meta.steps,
            log.len()
        )));
    }

    let (checkpoints, visits) = rebuild_indices(&meta, &log, &values, &scopes)?;

    tracing::debug!(
        path = %path.display(),
        steps = log.len(),
        checkpoints = checkpoints.len(),
        "recording loaded"
    );

    let core = RecordingCore {
        log,
        values,
        checkpoints,
        visits,
        scopes,
        status: Status::Finished(meta.outcome),
    };

    Ok(Recording::from_core(
        meta.label,
        meta.record_state,
        meta.checkpoint_on_scope_entry,
        meta.created,
        SessionConfig::default().state_cache_size,
        core,
    ))
}

/// Scope ids must match their position, starting with the global scope.
fn check_scopes(scopes: &[ScopeInfo]) -> Result<()> {
    if scopes.first().map(|s| s.id) != Some(ScopeId::GLOBAL) {
        return Err(RecorderError::Corruption("missing global scope".into()));
    }
    if scopes[0].exited_at.is_some() {
        return Err(RecorderError::Corruption("global scope marked exited".into()));
    }
    for (i, info) in scopes.iter().enumerate() {
        if info.id != ScopeId(i as u64) {
            return Err(RecorderError::Corruption(format!(
                "scope at position {} has id {}",
                i, info.id
            )));
        }
        if info.exited_at.map_or(false, |exit| exit < info.entered_at) {
            return Err(RecorderError::Corruption(format!(
                "scope {} exits before it is entered",
                info.id
            )));
        }
    }
    Ok(())
}

/// Replay the log through fresh indices, applying scope entries and exits
/// at the same step counts they happened at during capture.
fn rebuild_indices(
    meta: &Metadata,
    log: &EventLog,
    values: &ValueStore,
    scopes: &[ScopeInfo],
) -> Result<(CheckpointIndex, VisitIndex)> {
    let mut exits: HashMap<u64, Vec<ScopeId>> = HashMap::new();
    let mut entries: HashSet<u64> = HashSet::new();
    for info in scopes.iter().filter(|s| !s.id.is_global()) {
        if let Some(at) = info.exited_at {
            exits.entry(at).or_default().push(info.id);
        }
        entries.insert(info.entered_at);
    }

    let mut checkpoints = CheckpointIndex::new(meta.checkpoint_interval);
    let mut visits = VisitIndex::new();

    for event in log.iter() {
        let at = event.step.0;

        if event.scope.0 as usize >= scopes.len() {
            return Err(RecorderError::UnknownScope(event.scope));
        }
        for value_ref in [event.previous_value, event.new_value].into_iter().flatten() {
            if values.get(value_ref).is_none() {
                return Err(RecorderError::Corruption(format!(
                    "event {} references missing value {:?}",
                    event.step, value_ref
                )));
            }
        }

        if let Some(closed) = exits.get(&at) {
            for scope in closed {
                checkpoints.remove_scope(*scope);
            }
        }
        if meta.checkpoint_on_scope_entry && entries.contains(&at) {
            checkpoints.mark_boundary();
        }

        visits.record(event.location, event.step)?;
        checkpoints.observe(event);
    }

    Ok((checkpoints, visits))
}

fn write_frame<T: Serialize>(writer: &mut impl Write, value: &T) -> Result<()> {
    let encoded = rmp_serde::to_vec(value)?;
    if encoded.len() > MAX_FRAME_LEN {
        return Err(RecorderError::Serialization(format!(
            "frame of {} bytes exceeds the archive limit",
            encoded.len()
        )));
    }

    writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
    writer.write_all(&encoded)?;
    writer.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
    Ok(())
}

fn read_frame<T: DeserializeOwned>(reader: &mut impl Read) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(RecorderError::Corruption("archive frame too large".into()));
    }

    let mut encoded = vec![0u8; len];
    reader.read_exact(&mut encoded)?;

    let mut checksum_bytes = [0u8; 4];
    reader.read_exact(&mut checksum_bytes)?;
    let expected = u32::from_le_bytes(checksum_bytes);

    let got = crc32fast::hash(&encoded);
    if expected != got {
        return Err(RecorderError::ChecksumMismatch { expected, got });
    }

    Ok(rmp_serde::from_slice(&encoded)?)
}
