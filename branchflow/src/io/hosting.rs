//! Optional hosting-platform capability (pull/merge requests).
//!
//! Only [`crate::core::opcode::Opcode::MergeProposal`] uses a connector. Running
//! without one (offline, or no platform configured) turns that opcode into a
//! logged no-op.

use anyhow::Result;

use crate::core::branch::{BranchName, Sha};

/// A pull/merge request on the hosting platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub number: u64,
    pub title: String,
    pub source: BranchName,
    pub target: BranchName,
}

pub trait Connector {
    /// Open proposal that merges `branch` into `target`, if any.
    fn find_proposal(&self, branch: &BranchName, target: &BranchName) -> Result<Option<Proposal>>;

    /// Squash-merge the proposal, returning the resulting commit on the target branch.
    fn merge_proposal(&self, number: u64, message: &str) -> Result<Sha>;
}
