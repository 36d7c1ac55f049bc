//! The closed set of atomic workflow actions.
//!
//! Every opcode shares the same contract: `run` (see [`crate::dispatch`]),
//! [`Opcode::abort_steps`], [`Opcode::continue_steps`] and
//! [`Opcode::undo_steps`]. Abort/continue/undo default to nothing; only the
//! variants that need them override. Fields named `previous*` are pre-action
//! slots filled in by `run` and are what `undo_steps` reads.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::branch::{BranchName, ORIGIN, Sha};
use crate::error::FlowError;

/// Parent entry observed before a lineage mutation (`parent: None` = no entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorParent {
    pub parent: Option<BranchName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Opcode {
    Checkout {
        branch: BranchName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<BranchName>,
    },
    CreateBranch {
        branch: BranchName,
        /// Branch name or SHA the new branch starts at.
        start_point: String,
    },
    DeleteLocalBranch {
        branch: BranchName,
        force: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_sha: Option<Sha>,
    },
    CreateRemoteBranch {
        branch: BranchName,
        sha: Sha,
    },
    DeleteRemoteBranch {
        branch: BranchName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_sha: Option<Sha>,
    },
    Fetch,
    /// Merge `branch` into the current branch.
    Merge {
        branch: BranchName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_sha: Option<Sha>,
    },
    /// Rebase the current branch onto `branch`.
    Rebase {
        branch: BranchName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_sha: Option<Sha>,
    },
    AbortMerge,
    ContinueMerge,
    AbortRebase,
    ContinueRebase,
    Push {
        branch: BranchName,
        force: bool,
    },
    ResetToSha {
        sha: Sha,
        hard: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_sha: Option<Sha>,
    },
    SetParent {
        branch: BranchName,
        parent: BranchName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<PriorParent>,
    },
    RemoveParent {
        branch: BranchName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<PriorParent>,
    },
    AddRemote {
        name: String,
        url: String,
    },
    RemoveRemote {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_url: Option<String>,
    },
    /// Merge the hosted pull request of `branch` into `target`.
    MergeProposal {
        branch: BranchName,
        target: BranchName,
        message: String,
    },
}

impl Opcode {
    pub fn checkout(branch: BranchName) -> Self {
        Opcode::Checkout {
            branch,
            previous: None,
        }
    }

    pub fn merge(branch: BranchName) -> Self {
        Opcode::Merge {
            branch,
            previous_sha: None,
        }
    }

    pub fn rebase(branch: BranchName) -> Self {
        Opcode::Rebase {
            branch,
            previous_sha: None,
        }
    }

    pub fn set_parent(branch: BranchName, parent: BranchName) -> Self {
        Opcode::SetParent {
            branch,
            parent,
            previous: None,
        }
    }

    pub fn remove_parent(branch: BranchName) -> Self {
        Opcode::RemoveParent {
            branch,
            previous: None,
        }
    }

    pub fn delete_local_branch(branch: BranchName, force: bool) -> Self {
        Opcode::DeleteLocalBranch {
            branch,
            force,
            previous_sha: None,
        }
    }

    pub fn delete_remote_branch(branch: BranchName) -> Self {
        Opcode::DeleteRemoteBranch {
            branch,
            previous_sha: None,
        }
    }

    pub fn reset_to_sha(sha: Sha, hard: bool) -> Self {
        Opcode::ResetToSha {
            sha,
            hard,
            previous_sha: None,
        }
    }

    /// Stable kind name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Checkout { .. } => "checkout",
            Opcode::CreateBranch { .. } => "create_branch",
            Opcode::DeleteLocalBranch { .. } => "delete_local_branch",
            Opcode::CreateRemoteBranch { .. } => "create_remote_branch",
            Opcode::DeleteRemoteBranch { .. } => "delete_remote_branch",
            Opcode::Fetch => "fetch",
            Opcode::Merge { .. } => "merge",
            Opcode::Rebase { .. } => "rebase",
            Opcode::AbortMerge => "abort_merge",
            Opcode::ContinueMerge => "continue_merge",
            Opcode::AbortRebase => "abort_rebase",
            Opcode::ContinueRebase => "continue_rebase",
            Opcode::Push { .. } => "push",
            Opcode::ResetToSha { .. } => "reset_to_sha",
            Opcode::SetParent { .. } => "set_parent",
            Opcode::RemoveParent { .. } => "remove_parent",
            Opcode::AddRemote { .. } => "add_remote",
            Opcode::RemoveRemote { .. } => "remove_remote",
            Opcode::MergeProposal { .. } => "merge_proposal",
        }
    }

    pub fn is_checkout(&self) -> bool {
        matches!(self, Opcode::Checkout { .. })
    }

    /// Opcodes that cleanly cancel an in-progress, conflicting run of this opcode.
    pub fn abort_steps(&self) -> Vec<Opcode> {
        match self {
            Opcode::Merge { .. } | Opcode::ContinueMerge => vec![Opcode::AbortMerge],
            Opcode::Rebase { .. } | Opcode::ContinueRebase => vec![Opcode::AbortRebase],
            _ => Vec::new(),
        }
    }

    /// Opcodes that finish this opcode after the user resolved its conflicts.
    pub fn continue_steps(&self) -> Vec<Opcode> {
        match self {
            Opcode::Merge { .. } | Opcode::ContinueMerge => vec![Opcode::ContinueMerge],
            Opcode::Rebase { .. } | Opcode::ContinueRebase => vec![Opcode::ContinueRebase],
            _ => Vec::new(),
        }
    }

    /// Opcodes that reverse the effect of this opcode after it ran.
    ///
    /// Errors with [`FlowError::NotExecuted`] when the opcode carries a pre-action
    /// slot that was never filled.
    pub fn undo_steps(&self) -> Result<Vec<Opcode>, FlowError> {
        let steps = match self {
            Opcode::Checkout { branch, previous } => {
                let previous = captured(self, previous)?;
                if previous == branch {
                    Vec::new()
                } else {
                    vec![Opcode::checkout(previous.clone())]
                }
            }
            Opcode::CreateBranch { branch, .. } => {
                vec![Opcode::delete_local_branch(branch.clone(), true)]
            }
            Opcode::DeleteLocalBranch {
                branch,
                previous_sha,
                ..
            } => vec![Opcode::CreateBranch {
                branch: branch.clone(),
                start_point: captured(self, previous_sha)?.to_string(),
            }],
            Opcode::CreateRemoteBranch { branch, .. } => {
                vec![Opcode::delete_remote_branch(branch.clone())]
            }
            Opcode::DeleteRemoteBranch {
                branch,
                previous_sha,
            } => vec![Opcode::CreateRemoteBranch {
                branch: branch.clone(),
                sha: captured(self, previous_sha)?.clone(),
            }],
            Opcode::Merge { previous_sha, .. } | Opcode::Rebase { previous_sha, .. } => {
                vec![Opcode::reset_to_sha(captured(self, previous_sha)?.clone(), true)]
            }
            Opcode::ResetToSha {
                hard, previous_sha, ..
            } => vec![Opcode::reset_to_sha(
                captured(self, previous_sha)?.clone(),
                *hard,
            )],
            Opcode::SetParent {
                branch, previous, ..
            } => match &captured(self, previous)?.parent {
                Some(parent) => vec![Opcode::set_parent(branch.clone(), parent.clone())],
                None => vec![Opcode::remove_parent(branch.clone())],
            },
            Opcode::RemoveParent { branch, previous } => match &captured(self, previous)?.parent {
                Some(parent) => vec![Opcode::set_parent(branch.clone(), parent.clone())],
                None => Vec::new(),
            },
            Opcode::AddRemote { name, .. } => vec![Opcode::RemoveRemote {
                name: name.clone(),
                previous_url: None,
            }],
            Opcode::RemoveRemote { name, previous_url } => vec![Opcode::AddRemote {
                name: name.clone(),
                url: captured(self, previous_url)?.clone(),
            }],
            Opcode::Fetch
            | Opcode::AbortMerge
            | Opcode::ContinueMerge
            | Opcode::AbortRebase
            | Opcode::ContinueRebase
            | Opcode::Push { .. }
            | Opcode::MergeProposal { .. } => Vec::new(),
        };
        Ok(steps)
    }

    /// Whether the user may skip the branch this opcode stopped on with a conflict.
    ///
    /// A conflicting rebase of a root branch is not skippable: the local root
    /// would stay diverged from its tracking branch for every branch synced after it.
    pub fn can_skip_conflict(&self, end_branch_is_root: bool) -> bool {
        match self {
            Opcode::Merge { .. } | Opcode::ContinueMerge => true,
            Opcode::Rebase { .. } | Opcode::ContinueRebase => !end_branch_is_root,
            _ => false,
        }
    }

    /// Opcodes whose conflicts are never resumable and therefore fatal.
    pub fn auto_abort_on_error(&self) -> bool {
        matches!(self, Opcode::MergeProposal { .. })
    }
}

/// The command a user would type to perform the opcode by hand.
impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Checkout { branch, .. } => write!(f, "git checkout {branch}"),
            Opcode::CreateBranch {
                branch,
                start_point,
            } => write!(f, "git branch {branch} {start_point}"),
            Opcode::DeleteLocalBranch { branch, force, .. } => {
                let flag = if *force { "-D" } else { "-d" };
                write!(f, "git branch {flag} {branch}")
            }
            Opcode::CreateRemoteBranch { branch, sha } => {
                write!(f, "git push {ORIGIN} {sha}:refs/heads/{branch}")
            }
            Opcode::DeleteRemoteBranch { branch, .. } => {
                write!(f, "git push {ORIGIN} :{branch}")
            }
            Opcode::Fetch => write!(f, "git fetch --prune {ORIGIN}"),
            Opcode::Merge { branch, .. } => write!(f, "git merge --no-edit {branch}"),
            Opcode::Rebase { branch, .. } => write!(f, "git rebase {branch}"),
            Opcode::AbortMerge => write!(f, "git merge --abort"),
            Opcode::ContinueMerge => write!(f, "git commit --no-edit"),
            Opcode::AbortRebase => write!(f, "git rebase --abort"),
            Opcode::ContinueRebase => write!(f, "git rebase --continue"),
            Opcode::Push { branch, force } => {
                let flag = if *force { " --force-with-lease" } else { "" };
                write!(f, "git push{flag} {ORIGIN} {branch}")
            }
            Opcode::ResetToSha { sha, hard, .. } => {
                let flag = if *hard { " --hard" } else { "" };
                write!(f, "git reset{flag} {sha}")
            }
            Opcode::SetParent { branch, parent, .. } => {
                write!(f, "set parent of {branch} to {parent}")
            }
            Opcode::RemoveParent { branch, .. } => write!(f, "remove parent of {branch}"),
            Opcode::AddRemote { name, url } => write!(f, "git remote add {name} {url}"),
            Opcode::RemoveRemote { name, .. } => write!(f, "git remote remove {name}"),
            Opcode::MergeProposal { branch, target, .. } => {
                write!(f, "merge proposal {branch} into {target}")
            }
        }
    }
}

fn captured<'a, T>(opcode: &Opcode, slot: &'a Option<T>) -> Result<&'a T, FlowError> {
    slot.as_ref().ok_or(FlowError::NotExecuted {
        opcode: opcode.name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(name: &str) -> BranchName {
        BranchName::new(name).expect("branch")
    }

    fn sha(raw: &str) -> Sha {
        Sha::new(raw).expect("sha")
    }

    #[test]
    fn display_reads_like_the_manual_command() {
        assert_eq!(
            Opcode::merge(b("main")).to_string(),
            "git merge --no-edit main"
        );
        assert_eq!(
            Opcode::reset_to_sha(sha("abc123"), true).to_string(),
            "git reset --hard abc123"
        );
        assert_eq!(
            Opcode::set_parent(b("f1"), b("main")).to_string(),
            "set parent of f1 to main"
        );
    }

    #[test]
    fn merge_has_abort_continue_and_undo() {
        let merge = Opcode::Merge {
            branch: b("main"),
            previous_sha: Some(sha("abc123")),
        };
        assert_eq!(merge.abort_steps(), vec![Opcode::AbortMerge]);
        assert_eq!(merge.continue_steps(), vec![Opcode::ContinueMerge]);
        assert_eq!(
            merge.undo_steps().expect("undo"),
            vec![Opcode::reset_to_sha(sha("abc123"), true)]
        );
    }

    #[test]
    fn undo_before_run_is_an_internal_error() {
        let err = Opcode::merge(b("main")).undo_steps().unwrap_err();
        assert!(matches!(err, FlowError::NotExecuted { opcode: "merge" }));
        let err = Opcode::set_parent(b("f1"), b("main")).undo_steps().unwrap_err();
        assert!(matches!(err, FlowError::NotExecuted { opcode: "set_parent" }));
    }

    #[test]
    fn stateless_opcodes_have_empty_defaults() {
        for opcode in [
            Opcode::Fetch,
            Opcode::Push {
                branch: b("f1"),
                force: false,
            },
            Opcode::CreateBranch {
                branch: b("f1"),
                start_point: "main".to_string(),
            },
        ] {
            assert!(opcode.abort_steps().is_empty());
            assert!(opcode.continue_steps().is_empty());
        }
        assert!(Opcode::Fetch.undo_steps().expect("undo").is_empty());
    }

    #[test]
    fn lineage_undo_restores_prior_parent_or_absence() {
        let set = Opcode::SetParent {
            branch: b("f1"),
            parent: b("f0"),
            previous: Some(PriorParent {
                parent: Some(b("main")),
            }),
        };
        assert_eq!(
            set.undo_steps().expect("undo"),
            vec![Opcode::set_parent(b("f1"), b("main"))]
        );

        let fresh = Opcode::SetParent {
            branch: b("f1"),
            parent: b("main"),
            previous: Some(PriorParent { parent: None }),
        };
        assert_eq!(
            fresh.undo_steps().expect("undo"),
            vec![Opcode::remove_parent(b("f1"))]
        );

        let removed = Opcode::RemoveParent {
            branch: b("f1"),
            previous: Some(PriorParent {
                parent: Some(b("main")),
            }),
        };
        assert_eq!(
            removed.undo_steps().expect("undo"),
            vec![Opcode::set_parent(b("f1"), b("main"))]
        );
    }

    #[test]
    fn checkout_of_current_branch_has_no_undo() {
        let same = Opcode::Checkout {
            branch: b("main"),
            previous: Some(b("main")),
        };
        assert!(same.undo_steps().expect("undo").is_empty());
        let other = Opcode::Checkout {
            branch: b("f1"),
            previous: Some(b("main")),
        };
        assert_eq!(other.undo_steps().expect("undo"), vec![Opcode::checkout(b("main"))]);
    }

    #[test]
    fn skip_eligibility_depends_on_kind() {
        assert!(Opcode::merge(b("main")).can_skip_conflict(false));
        assert!(Opcode::merge(b("origin/main")).can_skip_conflict(true));
        assert!(Opcode::rebase(b("main")).can_skip_conflict(false));
        assert!(!Opcode::rebase(b("origin/main")).can_skip_conflict(true));
        assert!(
            !Opcode::Push {
                branch: b("f1"),
                force: false
            }
            .can_skip_conflict(false)
        );
    }

    #[test]
    fn serializes_with_type_tag_and_omits_empty_slots() {
        let json = serde_json::to_value(Opcode::merge(b("main"))).expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "merge", "branch": "main"}));
        let parsed: Opcode =
            serde_json::from_value(serde_json::json!({"type": "fetch"})).expect("parse");
        assert_eq!(parsed, Opcode::Fetch);
    }
}
