use crate::candidate::Candidate;
use crate::executor::Outcome;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Defines errors that can arise while loading, validating or persisting a checkpoint.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The checkpoint file (or its directory) could not be read or written.
    #[error("Checkpoint I/O error for {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    /// The file exists but does not hold a valid record. A partially written
    /// file always lands here; it is never accepted as a record.
    #[error("Checkpoint {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// The record belongs to another target. Checkpoints are never merged.
    #[error(
        "Targeting {requested:?} but checkpoint {path:?} is for {recorded:?}; use a different checkpoint file"
    )]
    TargetMismatch {
        path: PathBuf,
        requested: String,
        recorded: String,
    },

    /// Another search holds the lock on this checkpoint.
    #[error("Checkpoint {0:?} is in use by another search")]
    Locked(PathBuf),
}

impl CheckpointError {
    fn io(path: &Path, context: &str, err: impl std::fmt::Display) -> Self {
        CheckpointError::Io {
            path: path.to_path_buf(),
            message: format!("{context}: {err}"),
        }
    }

    fn corrupt(path: &Path, message: impl Into<String>) -> Self {
        CheckpointError::Corrupt {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Every candidate already tried against one target, split by outcome.
///
/// The two sets are kept disjoint. Once `success` is non-empty the record is
/// terminal and no further attempts should be made against it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CheckpointRecord {
    version: u32,
    target_identity: String,
    success: BTreeSet<Candidate>,
    failure: BTreeSet<Candidate>,
}

impl CheckpointRecord {
    pub const SCHEMA_VERSION: u32 = 1;

    pub fn new(target_identity: impl Into<String>) -> Self {
        Self {
            version: Self::SCHEMA_VERSION,
            target_identity: target_identity.into(),
            success: BTreeSet::new(),
            failure: BTreeSet::new(),
        }
    }

    pub fn target_identity(&self) -> &str {
        &self.target_identity
    }

    pub fn success(&self) -> &BTreeSet<Candidate> {
        &self.success
    }

    pub fn failure(&self) -> &BTreeSet<Candidate> {
        &self.failure
    }

    pub fn is_solved(&self) -> bool {
        !self.success.is_empty()
    }

    pub fn is_known_failure(&self, candidate: &Candidate) -> bool {
        self.failure.contains(candidate)
    }

    pub fn attempted(&self) -> usize {
        self.success.len() + self.failure.len()
    }

    /// Records the outcome of one attempt in memory. Does not persist.
    pub fn record_attempt(&mut self, candidate: Candidate, outcome: Outcome) {
        match outcome {
            Outcome::Success => {
                self.failure.remove(&candidate);
                self.success.insert(candidate);
            }
            Outcome::Failure => {
                self.success.remove(&candidate);
                self.failure.insert(candidate);
            }
        }
    }

    fn validate(&self, path: &Path) -> Result<(), CheckpointError> {
        if self.version != Self::SCHEMA_VERSION {
            return Err(CheckpointError::corrupt(
                path,
                format!(
                    "unsupported schema version {} (expected {})",
                    self.version,
                    Self::SCHEMA_VERSION
                ),
            ));
        }
        if let Some(both) = self.success.intersection(&self.failure).next() {
            return Err(CheckpointError::corrupt(
                path,
                format!("candidate {both:?} is recorded as both success and failure"),
            ));
        }
        Ok(())
    }
}

/// Result of loading a checkpoint for a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded {
    /// No file existed; an empty record was created in memory.
    Fresh(CheckpointRecord),
    /// A valid record with no success yet; the search may continue.
    Resumed(CheckpointRecord),
    /// The record already holds a success; no attempts may be made.
    AlreadySolved(CheckpointRecord),
}

impl Loaded {
    pub fn record(&self) -> &CheckpointRecord {
        match self {
            Loaded::Fresh(r) | Loaded::Resumed(r) | Loaded::AlreadySolved(r) => r,
        }
    }

    pub fn into_record(self) -> CheckpointRecord {
        match self {
            Loaded::Fresh(r) | Loaded::Resumed(r) | Loaded::AlreadySolved(r) => r,
        }
    }
}

/// JSON checkpoint file with atomic replacement.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    const LOCK_SUFFIX: &'static str = ".lock";
    const TEMP_SUFFIX: &'static str = ".tmp";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and validates the record for `target_identity`.
    ///
    /// A missing file yields a fresh record. An existing file is never modified
    /// here, even when it fails validation.
    pub fn load(&self, target_identity: &str) -> Result<Loaded, CheckpointError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "Checkpoint {:?} not found, starting a new one for {:?}",
                    self.path, target_identity
                );
                return Ok(Loaded::Fresh(CheckpointRecord::new(target_identity)));
            }
            Err(e) => return Err(CheckpointError::io(&self.path, "failed to read", e)),
        };

        if bytes.is_empty() {
            return Err(CheckpointError::corrupt(&self.path, "file is empty"));
        }

        let record: CheckpointRecord = serde_json::from_slice(&bytes)
            .map_err(|e| CheckpointError::corrupt(&self.path, format!("invalid JSON: {e}")))?;
        record.validate(&self.path)?;

        if record.target_identity != target_identity {
            return Err(CheckpointError::TargetMismatch {
                path: self.path.clone(),
                requested: target_identity.to_string(),
                recorded: record.target_identity,
            });
        }

        debug!(
            "Loaded checkpoint {:?}: {} failures, {} successes",
            self.path,
            record.failure.len(),
            record.success.len()
        );

        if record.is_solved() {
            Ok(Loaded::AlreadySolved(record))
        } else {
            Ok(Loaded::Resumed(record))
        }
    }

    /// Atomically replaces the checkpoint file with `record`.
    ///
    /// The record is written to a temporary file in the same directory, synced,
    /// then renamed over the store path. A crash at any point leaves either the
    /// previous file or the new one, never a mix.
    pub fn persist(&self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        let dir = self.parent_dir();
        let prefix = self.sibling_name(".", "");

        let mut temp_file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(Self::TEMP_SUFFIX)
            .tempfile_in(&dir)
            .map_err(|e| CheckpointError::io(&self.path, "failed to create temp file", e))?;

        {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, record)
                .map_err(|e| CheckpointError::io(&self.path, "failed to serialize record", e))?;
            writer
                .flush()
                .map_err(|e| CheckpointError::io(&self.path, "failed to flush temp file", e))?;
        }
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| CheckpointError::io(&self.path, "failed to sync temp file", e))?;

        temp_file
            .persist(&self.path)
            .map_err(|e| CheckpointError::io(&self.path, "failed to replace checkpoint", e.error))?;

        // Make the rename itself durable. Not every platform can sync a directory.
        if let Ok(dir_handle) = File::open(&dir) {
            if let Err(e) = dir_handle.sync_all() {
                debug!("Could not sync checkpoint directory {dir:?}: {e}");
            }
        }
        Ok(())
    }

    /// Takes the single-writer lock for this checkpoint. Released on drop.
    pub fn lock(&self) -> Result<CheckpointLock, CheckpointError> {
        let lock_path = self.parent_dir().join(self.sibling_name("", Self::LOCK_SUFFIX));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| CheckpointError::io(&lock_path, "failed to open lock file", e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(CheckpointLock {
                _file: file,
                path: lock_path,
            }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(CheckpointError::Locked(self.path.clone()))
            }
            Err(e) => Err(CheckpointError::io(&lock_path, "failed to lock", e)),
        }
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// `<prefix><store file name><suffix>`, used for the temp and lock siblings.
    fn sibling_name(&self, prefix: &str, suffix: &str) -> OsString {
        let mut name = OsString::from(prefix);
        name.push(
            self.path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("checkpoint")),
        );
        name.push(suffix);
        name
    }
}

/// Exclusive advisory lock held for the duration of a search.
#[derive(Debug)]
pub struct CheckpointLock {
    _file: File,
    path: PathBuf,
}

impl CheckpointLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}
