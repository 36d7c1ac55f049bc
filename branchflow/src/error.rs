//! Error taxonomy for workflow execution.
//!
//! Conflicts are not errors here: the executor reports them as
//! [`crate::execute::ExecOutcome::Stopped`] after persisting a resumable record.

use thiserror::Error;

use crate::core::branch::{BranchName, NameError};
use crate::core::lineage::LineageError;
use crate::io::backend::BackendError;
use crate::io::run_state::PersistenceError;

#[derive(Debug, Error)]
pub enum FlowError {
    /// Raised before any opcode runs; nothing was mutated.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Lineage(#[from] LineageError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Backend query failed outside of opcode execution.
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("nothing to {command}")]
    NothingToResume { command: &'static str },

    #[error("cannot skip branch '{branch}' that resulted in conflicts")]
    CannotSkip { branch: BranchName },

    #[error(
        "a previous '{command}' run is unfinished (run `branchflow continue`, `branchflow skip` or `branchflow abort`)"
    )]
    UnfinishedRun { command: String },

    #[error("you must resolve the conflicts before continuing")]
    UnresolvedConflicts,

    /// Non-conflict failure while executing an opcode. Only an interrupted
    /// rollback leaves a record behind (for `abort` to retry).
    #[error("{opcode} failed")]
    Fatal {
        opcode: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Undo was requested for an opcode whose pre-action state was never captured.
    #[error("internal error: cannot compute undo for {opcode} before it ran")]
    NotExecuted { opcode: &'static str },
}
