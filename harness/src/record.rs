//! Run record persistence: scenario name → ordered events, on disk.
//!
//! # Directory layout
//!
//! ```text
//! <dir>/
//!   run_record.json          canonical JSON (sorted keys, compact)
//!   run_record_digest.txt    "sha256:<hex>" of DOMAIN_RUN_RECORD ‖ record bytes
//! ```
//!
//! Event field names are the data-model names (`StreamText`, `payloads`,
//! `executionIndex`, ...), so a record can be diffed against a reference
//! capture without a schema step.
//!
//! # Fail-closed reads
//!
//! - Missing file → error
//! - Extra file in the directory → error
//! - Record bytes not canonical → error
//! - Stored digest ≠ recomputed digest → error

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use outcheck_wire::OutputEvent;

use crate::canon::{canonical_hash, canonical_json_bytes, CanonError, DOMAIN_RUN_RECORD};
use crate::collect::Execution;

const RECORD_FILENAME: &str = "run_record.json";
const DIGEST_FILENAME: &str = "run_record_digest.txt";
const RECORD_FILENAMES: &[&str] = &[RECORD_FILENAME, DIGEST_FILENAME];

/// Persisted capture of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunRecord {
    scenarios: BTreeMap<String, Vec<OutputEvent>>,
}

impl RunRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `execution`'s events under `scenario`, replacing any earlier
    /// capture with that name.
    pub fn insert(&mut self, scenario: &str, execution: &Execution) {
        self.insert_events(scenario, execution.events().to_vec());
    }

    /// Record an event list directly.
    pub fn insert_events(&mut self, scenario: &str, events: Vec<OutputEvent>) {
        self.scenarios.insert(scenario.to_string(), events);
    }

    /// Events recorded for `scenario`.
    #[must_use]
    pub fn events(&self, scenario: &str) -> Option<&[OutputEvent]> {
        self.scenarios.get(scenario).map(Vec::as_slice)
    }

    /// Scenario names in sorted order.
    pub fn scenario_names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Canonical JSON bytes of the record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] if serialization fails or a payload carries a
    /// non-finite number.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, RecordError> {
        let value = serde_json::to_value(self).map_err(|e| RecordError::Serialize {
            detail: e.to_string(),
        })?;
        Ok(canonical_json_bytes(&value)?)
    }

    /// `"sha256:<hex>"` digest of the canonical bytes.
    ///
    /// # Errors
    ///
    /// As [`RunRecord::canonical_bytes`].
    pub fn digest(&self) -> Result<String, RecordError> {
        Ok(canonical_hash(DOMAIN_RUN_RECORD, &self.canonical_bytes()?))
    }
}

/// Error writing or reading a run record directory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("run record I/O error: {detail}")]
    Io { detail: String },
    #[error("run record serialization failed: {detail}")]
    Serialize { detail: String },
    #[error(transparent)]
    Canon(#[from] CanonError),
    #[error("missing run record file: {filename}")]
    MissingFile { filename: String },
    #[error("unexpected file in run record directory: {name}")]
    ExtraFile { name: String },
    #[error("run record parse error: {detail}")]
    Parse { detail: String },
    #[error("run record bytes are not canonical JSON")]
    NonCanonical,
    #[error("run record digest mismatch: stored={stored}, recomputed={recomputed}")]
    DigestMismatch { stored: String, recomputed: String },
}

/// Write `record` into `dir`, creating it if needed. Returns the digest.
///
/// # Errors
///
/// Returns [`RecordError`] on serialization or I/O failure.
pub fn write_record_dir(record: &RunRecord, dir: &Path) -> Result<String, RecordError> {
    std::fs::create_dir_all(dir).map_err(|e| RecordError::Io {
        detail: format!("create_dir_all: {e}"),
    })?;
    let bytes = record.canonical_bytes()?;
    let digest = canonical_hash(DOMAIN_RUN_RECORD, &bytes);
    write_atomic(&dir.join(RECORD_FILENAME), &bytes)?;
    write_atomic(&dir.join(DIGEST_FILENAME), digest.as_bytes())?;
    Ok(digest)
}

/// Read and verify a run record directory.
///
/// # Errors
///
/// Returns [`RecordError`] on any validation failure (see module docs).
pub fn read_record_dir(dir: &Path) -> Result<RunRecord, RecordError> {
    let bytes = read_required(dir, RECORD_FILENAME)?;
    let stored = read_required(dir, DIGEST_FILENAME)?;

    for name in list_files(dir)? {
        if !RECORD_FILENAMES.contains(&name.as_str()) {
            return Err(RecordError::ExtraFile { name });
        }
    }

    let recomputed = canonical_hash(DOMAIN_RUN_RECORD, &bytes);
    let stored = String::from_utf8_lossy(&stored).trim().to_string();
    if stored != recomputed {
        return Err(RecordError::DigestMismatch { stored, recomputed });
    }

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| RecordError::Parse {
            detail: e.to_string(),
        })?;
    if canonical_json_bytes(&value)? != bytes {
        return Err(RecordError::NonCanonical);
    }
    serde_json::from_value(value).map_err(|e| RecordError::Parse {
        detail: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Temp file + rename in the same directory.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), RecordError> {
    let dir = path.parent().ok_or_else(|| RecordError::Io {
        detail: "no parent directory".into(),
    })?;
    let temp_path = dir.join(format!(
        ".tmp_{}",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));
    std::fs::write(&temp_path, content).map_err(|e| RecordError::Io {
        detail: format!("write {}: {e}", temp_path.display()),
    })?;
    std::fs::rename(&temp_path, path).map_err(|e| RecordError::Io {
        detail: format!("rename {} → {}: {e}", temp_path.display(), path.display()),
    })
}

fn read_required(dir: &Path, filename: &str) -> Result<Vec<u8>, RecordError> {
    std::fs::read(dir.join(filename)).map_err(|_| RecordError::MissingFile {
        filename: filename.to_string(),
    })
}

/// Regular files in `dir`, skipping `write_atomic` temp files.
fn list_files(dir: &Path) -> Result<BTreeSet<String>, RecordError> {
    let io = |e: std::io::Error| RecordError::Io {
        detail: format!("read_dir: {e}"),
    };
    let mut files = BTreeSet::new();
    for entry in std::fs::read_dir(dir).map_err(io)? {
        let entry = entry.map_err(io)?;
        if !entry.file_type().map_err(io)?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with(".tmp_") {
                files.insert(name.to_string());
            }
        }
    }
    Ok(files)
}
