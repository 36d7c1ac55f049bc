//! Run state storage for interrupted and undoable workflows.
//!
//! One record per working copy lives at `<git-dir>/branchflow/run_state.json`.
//! There is no cross-process locking: two invocations racing on the same
//! working copy overwrite each other (last writer wins).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::branch::BranchName;
use crate::core::opcode::Opcode;
use crate::core::program::Program;

/// Version marker written into every record.
pub const RUN_STATE_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("read run state {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse run state {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("run state {path} has no version marker")]
    MissingVersion { path: PathBuf },
    #[error(
        "run state {path} has version {found}, this build supports version {RUN_STATE_VERSION} (finish or delete it with an older build)"
    )]
    IncompatibleVersion { path: PathBuf, found: u64 },
    #[error("write run state {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize run state")]
    Serialize(#[source] serde_json::Error),
    #[error("delete run state {path}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where and why the workflow stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnfinishedDetails {
    /// Branch checked out when the workflow stopped.
    pub end_branch: BranchName,
    pub can_skip: bool,
    /// The opcode that stopped; continue/skip/abort derive their steps from it.
    pub failed_opcode: Opcode,
    pub ended_at: DateTime<Utc>,
}

/// Persisted record of one workflow invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    /// Command that started the workflow (`sync`, `hack`, ...).
    pub command: String,
    /// Opcodes not yet executed.
    pub remaining_program: Program,
    /// Undo opcodes of executed steps, already in replay order.
    pub undo_program: Program,
    pub unfinished_details: Option<UnfinishedDetails>,
}

impl RunState {
    pub fn new(command: impl Into<String>, program: Program) -> Self {
        Self {
            command: command.into(),
            remaining_program: program,
            undo_program: Program::new(),
            unfinished_details: None,
        }
    }

    pub fn is_unfinished(&self) -> bool {
        self.unfinished_details.is_some()
    }
}

/// On-disk layout of [`RunState`]. Unknown fields are ignored.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunStateRecord {
    version: u64,
    command: String,
    remaining_program: Program,
    undo_program: Program,
    is_unfinished: bool,
    #[serde(default)]
    unfinished_details: Option<UnfinishedDetails>,
}

/// Run state persistence keyed by the repository's administrative directory.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record, `None` when there is none.
    ///
    /// An unreadable or invalid record is an error, never "no state".
    pub fn load(&self) -> Result<Option<RunState>, PersistenceError> {
        let path = &self.path;
        debug!(path = %path.display(), "loading run state");
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };
        let parse = |source| PersistenceError::Parse {
            path: path.clone(),
            source,
        };
        let value: Value = serde_json::from_str(&contents).map_err(parse)?;
        let found = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| PersistenceError::MissingVersion { path: path.clone() })?;
        if found != RUN_STATE_VERSION {
            return Err(PersistenceError::IncompatibleVersion {
                path: path.clone(),
                found,
            });
        }
        let record: RunStateRecord = serde_json::from_value(value).map_err(parse)?;
        if record.is_unfinished != record.unfinished_details.is_some() {
            return Err(PersistenceError::Parse {
                path: path.clone(),
                source: serde::de::Error::custom(
                    "isUnfinished must be true exactly when unfinishedDetails is present",
                ),
            });
        }
        debug!(command = %record.command, unfinished = record.is_unfinished, "run state loaded");
        Ok(Some(RunState {
            command: record.command,
            remaining_program: record.remaining_program,
            undo_program: record.undo_program,
            unfinished_details: record.unfinished_details,
        }))
    }

    /// Atomically write the record (temp file + rename), replacing any prior one.
    pub fn save(&self, state: &RunState) -> Result<(), PersistenceError> {
        debug!(
            path = %self.path.display(),
            command = %state.command,
            remaining = state.remaining_program.len(),
            unfinished = state.is_unfinished(),
            "writing run state"
        );
        let record = RunStateRecord {
            version: RUN_STATE_VERSION,
            command: state.command.clone(),
            remaining_program: state.remaining_program.clone(),
            undo_program: state.undo_program.clone(),
            is_unfinished: state.is_unfinished(),
            unfinished_details: state.unfinished_details.clone(),
        };
        let mut buf = serde_json::to_string_pretty(&record).map_err(PersistenceError::Serialize)?;
        buf.push('\n');
        self.write_atomic(&buf)
    }

    /// Remove the record. Deleting a missing record is not an error.
    pub fn delete(&self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "run state deleted");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Delete {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn has_unfinished(&self) -> Result<bool, PersistenceError> {
        Ok(self.load()?.is_some_and(|state| state.is_unfinished()))
    }

    fn write_atomic(&self, contents: &str) -> Result<(), PersistenceError> {
        let write_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PersistenceError::Write { path, source }
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err(parent))?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).map_err(write_err(&tmp_path))?;
        fs::rename(&tmp_path, &self.path).map_err(write_err(&self.path))?;
        Ok(())
    }
}
