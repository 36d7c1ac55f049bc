//! Primitive version-control capability consumed by opcodes.
//!
//! The [`Backend`] trait decouples workflow execution from the actual `git`
//! subprocess calls ([`crate::io::git::Git`]). Tests use scripted in-memory
//! backends that never spawn processes.

use thiserror::Error;

use crate::core::branch::{BranchName, Sha};

/// Failure of a single backend primitive.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The command stopped because changes could not be reconciled automatically.
    #[error("{command} stopped with conflicts: {message}")]
    Conflict { command: String, message: String },

    /// The command ran and reported failure.
    #[error("{command} failed (exit code {code:?}): {message}")]
    Failed {
        command: String,
        code: Option<i32>,
        message: String,
    },

    /// The command could not be started.
    #[error("spawn {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command succeeded but its output was not understood.
    #[error("unexpected output from {command}: {output}")]
    UnexpectedOutput { command: String, output: String },
}

impl BackendError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Conflict { .. })
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// One blocking call per version-control primitive.
pub trait Backend {
    /// Branch currently checked out (also while a rebase is in progress).
    fn current_branch(&self) -> BackendResult<BranchName>;
    fn current_sha(&self) -> BackendResult<Sha>;
    fn branch_sha(&self, branch: &BranchName) -> BackendResult<Sha>;
    /// SHA of `origin/<branch>`, if the tracking branch exists.
    fn remote_branch_sha(&self, branch: &BranchName) -> BackendResult<Option<Sha>>;
    fn has_local_branch(&self, branch: &BranchName) -> BackendResult<bool>;
    fn has_remote_branch(&self, branch: &BranchName) -> BackendResult<bool>;
    fn has_uncommitted_changes(&self) -> BackendResult<bool>;
    fn has_unresolved_conflicts(&self) -> BackendResult<bool>;
    fn remote_url(&self, name: &str) -> BackendResult<Option<String>>;

    fn fetch(&self) -> BackendResult<()>;
    fn checkout(&self, branch: &BranchName) -> BackendResult<()>;
    fn create_branch(&self, branch: &BranchName, start_point: &str) -> BackendResult<()>;
    fn merge_no_edit(&self, branch: &BranchName) -> BackendResult<()>;
    fn rebase(&self, branch: &BranchName) -> BackendResult<()>;
    fn push(&self, branch: &BranchName, force: bool) -> BackendResult<()>;
    fn create_remote_branch(&self, sha: &Sha, branch: &BranchName) -> BackendResult<()>;
    fn delete_local_branch(&self, branch: &BranchName, force: bool) -> BackendResult<()>;
    fn delete_remote_branch(&self, branch: &BranchName) -> BackendResult<()>;
    fn reset(&self, sha: &Sha, hard: bool) -> BackendResult<()>;
    fn abort_merge(&self) -> BackendResult<()>;
    fn continue_merge(&self) -> BackendResult<()>;
    fn abort_rebase(&self) -> BackendResult<()>;
    fn continue_rebase(&self) -> BackendResult<()>;
    fn add_remote(&self, name: &str, url: &str) -> BackendResult<()>;
    fn remove_remote(&self, name: &str) -> BackendResult<()>;
}
