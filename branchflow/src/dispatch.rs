//! Side effects of each opcode.
//!
//! `run` is the only place opcodes touch the backend, the hosting connector or
//! the lineage. Before mutating anything it fills the opcode's pre-action slot
//! so [`Opcode::undo_steps`] can reverse the action later, including when the
//! action itself stops with a conflict.

use anyhow::anyhow;
use tracing::{debug, info, instrument};

use crate::core::opcode::{Opcode, PriorParent};
use crate::execute::RunContext;
use crate::io::backend::BackendError;

/// How a single opcode failed.
#[derive(Debug)]
pub enum OpcodeFailure {
    /// The action stopped on conflicting content; the user can resolve it.
    Conflict { message: String },
    /// Anything else.
    Fatal(anyhow::Error),
}

impl From<BackendError> for OpcodeFailure {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Conflict { .. } => OpcodeFailure::Conflict {
                message: err.to_string(),
            },
            other => OpcodeFailure::Fatal(other.into()),
        }
    }
}

impl Opcode {
    /// Perform the action against the context.
    #[instrument(skip_all, fields(opcode = self.name()))]
    pub fn run(&mut self, ctx: &mut RunContext<'_>) -> Result<(), OpcodeFailure> {
        let backend = ctx.backend;
        match self {
            Opcode::Checkout { branch, previous } => {
                let current = backend.current_branch()?;
                let unchanged = current == *branch;
                *previous = Some(current);
                if unchanged {
                    debug!(branch = %branch, "already checked out");
                } else {
                    backend.checkout(branch)?;
                }
            }
            Opcode::CreateBranch {
                branch,
                start_point,
            } => backend.create_branch(branch, start_point)?,
            Opcode::DeleteLocalBranch {
                branch,
                force,
                previous_sha,
            } => {
                *previous_sha = Some(backend.branch_sha(branch)?);
                backend.delete_local_branch(branch, *force)?;
            }
            Opcode::CreateRemoteBranch { branch, sha } => {
                backend.create_remote_branch(sha, branch)?;
            }
            Opcode::DeleteRemoteBranch {
                branch,
                previous_sha,
            } => {
                let sha = backend.remote_branch_sha(branch)?.ok_or_else(|| {
                    OpcodeFailure::Fatal(anyhow!(
                        "remote branch '{}' does not exist",
                        branch.tracking()
                    ))
                })?;
                *previous_sha = Some(sha);
                backend.delete_remote_branch(branch)?;
            }
            Opcode::Fetch => backend.fetch()?,
            Opcode::Merge {
                branch,
                previous_sha,
            } => {
                *previous_sha = Some(backend.current_sha()?);
                backend.merge_no_edit(branch)?;
            }
            Opcode::Rebase {
                branch,
                previous_sha,
            } => {
                *previous_sha = Some(backend.current_sha()?);
                backend.rebase(branch)?;
            }
            Opcode::AbortMerge => backend.abort_merge()?,
            Opcode::ContinueMerge => backend.continue_merge()?,
            Opcode::AbortRebase => backend.abort_rebase()?,
            Opcode::ContinueRebase => backend.continue_rebase()?,
            Opcode::Push { branch, force } => backend.push(branch, *force)?,
            Opcode::ResetToSha {
                sha,
                hard,
                previous_sha,
            } => {
                *previous_sha = Some(backend.current_sha()?);
                backend.reset(sha, *hard)?;
            }
            Opcode::SetParent {
                branch,
                parent,
                previous,
            } => {
                let prior = ctx
                    .lineage
                    .set_parent(branch, parent)
                    .map_err(|err| OpcodeFailure::Fatal(err.into()))?;
                *previous = Some(PriorParent { parent: prior });
                ctx.lineage_store
                    .save_lineage(ctx.lineage)
                    .map_err(OpcodeFailure::Fatal)?;
            }
            Opcode::RemoveParent { branch, previous } => {
                let prior = ctx.lineage.remove_parent(branch);
                *previous = Some(PriorParent { parent: prior });
                ctx.lineage_store
                    .save_lineage(ctx.lineage)
                    .map_err(OpcodeFailure::Fatal)?;
            }
            Opcode::AddRemote { name, url } => backend.add_remote(name, url)?,
            Opcode::RemoveRemote { name, previous_url } => {
                let url = backend.remote_url(name)?.ok_or_else(|| {
                    OpcodeFailure::Fatal(anyhow!("remote '{name}' does not exist"))
                })?;
                *previous_url = Some(url);
                backend.remove_remote(name)?;
            }
            Opcode::MergeProposal {
                branch,
                target,
                message,
            } => {
                let Some(connector) = ctx.connector else {
                    info!(branch = %branch, "no hosting connector, not merging proposal");
                    return Ok(());
                };
                let proposal = connector
                    .find_proposal(branch, target)
                    .map_err(OpcodeFailure::Fatal)?
                    .ok_or_else(|| {
                        OpcodeFailure::Fatal(anyhow!(
                            "no open proposal merges '{branch}' into '{target}'"
                        ))
                    })?;
                let sha = connector
                    .merge_proposal(proposal.number, message)
                    .map_err(OpcodeFailure::Fatal)?;
                info!(number = proposal.number, sha = %sha, "proposal merged");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::branch::{BranchName, Sha};
    use crate::core::lineage::Lineage;
    use crate::io::run_state::RunStateStore;
    use crate::test_support::{FakeBackend, MemoryLineageStore, RecordingConnector};

    fn b(name: &str) -> BranchName {
        BranchName::new(name).expect("branch")
    }

    struct Fixture {
        backend: FakeBackend,
        lineage: Lineage,
        lineage_store: MemoryLineageStore,
        store: RunStateStore,
        _temp: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempfile::tempdir().expect("tempdir");
            Self {
                backend: FakeBackend::new("main", &["main", "feature"]),
                lineage: Lineage::new(b("main"), []),
                lineage_store: MemoryLineageStore::default(),
                store: RunStateStore::new(temp.path().join("run_state.json")),
                _temp: temp,
            }
        }

        fn run(&mut self, opcode: &mut Opcode) -> Result<(), OpcodeFailure> {
            let mut ctx = RunContext {
                backend: &self.backend,
                connector: None,
                lineage: &mut self.lineage,
                lineage_store: &self.lineage_store,
                store: &self.store,
                retain_undo: false,
                observer: None,
            };
            opcode.run(&mut ctx)
        }
    }

    #[test]
    fn checkout_records_previous_branch() {
        let mut fx = Fixture::new();
        let mut opcode = Opcode::checkout(b("feature"));
        fx.run(&mut opcode).expect("run");
        assert_eq!(fx.backend.current(), b("feature"));
        assert_eq!(
            opcode.undo_steps().expect("undo"),
            vec![Opcode::checkout(b("main"))]
        );
    }

    #[test]
    fn conflicting_merge_keeps_pre_merge_sha() {
        let mut fx = Fixture::new();
        fx.backend.set_current("feature");
        let before = fx.backend.sha_of("feature");
        fx.backend.conflict_on("merge main");

        let mut opcode = Opcode::merge(b("main"));
        let failure = fx.run(&mut opcode).unwrap_err();
        assert!(matches!(failure, OpcodeFailure::Conflict { .. }));
        assert_eq!(
            opcode.undo_steps().expect("undo"),
            vec![Opcode::reset_to_sha(before, true)]
        );
    }

    #[test]
    fn lineage_opcodes_persist_and_capture_prior_parent() {
        let mut fx = Fixture::new();
        let mut set = Opcode::set_parent(b("feature"), b("main"));
        fx.run(&mut set).expect("set");
        assert_eq!(fx.lineage.parent(&b("feature")), Some(&b("main")));
        assert_eq!(fx.lineage_store.saved().last(), Some(&fx.lineage));
        assert_eq!(
            set.undo_steps().expect("undo"),
            vec![Opcode::remove_parent(b("feature"))]
        );

        let mut remove = Opcode::remove_parent(b("feature"));
        fx.run(&mut remove).expect("remove");
        assert_eq!(fx.lineage.parent(&b("feature")), None);
        assert_eq!(
            remove.undo_steps().expect("undo"),
            vec![Opcode::set_parent(b("feature"), b("main"))]
        );
    }

    #[test]
    fn cyclic_set_parent_is_fatal_and_leaves_lineage_alone() {
        let mut fx = Fixture::new();
        fx.lineage.set_parent(&b("feature"), &b("main")).expect("set");
        let before = fx.lineage.clone();

        let mut opcode = Opcode::set_parent(b("feature"), b("feature"));
        assert!(matches!(
            fx.run(&mut opcode).unwrap_err(),
            OpcodeFailure::Fatal(_)
        ));
        assert_eq!(fx.lineage, before);
        assert!(fx.lineage_store.saved().is_empty());
    }

    #[test]
    fn backend_failure_is_fatal() {
        let mut fx = Fixture::new();
        let mut opcode = Opcode::checkout(b("missing"));
        assert!(matches!(
            fx.run(&mut opcode).unwrap_err(),
            OpcodeFailure::Fatal(_)
        ));
    }

    #[test]
    fn merge_proposal_without_connector_is_a_no_op() {
        let mut fx = Fixture::new();
        let mut opcode = Opcode::MergeProposal {
            branch: b("feature"),
            target: b("main"),
            message: "ship it".to_string(),
        };
        fx.run(&mut opcode).expect("run");
        assert!(fx.backend.calls().is_empty());
    }

    #[test]
    fn merge_proposal_uses_connector() {
        let fx = Fixture::new();
        let mut lineage = fx.lineage.clone();
        let connector = RecordingConnector::with_proposal(
            7,
            b("feature"),
            b("main"),
            Sha::new("abcd1234").expect("sha"),
        );
        let mut ctx = RunContext {
            backend: &fx.backend,
            connector: Some(&connector),
            lineage: &mut lineage,
            lineage_store: &fx.lineage_store,
            store: &fx.store,
            retain_undo: false,
            observer: None,
        };
        let mut opcode = Opcode::MergeProposal {
            branch: b("feature"),
            target: b("main"),
            message: "ship it".to_string(),
        };
        opcode.run(&mut ctx).expect("run");
        assert_eq!(connector.merged(), vec![(7, "ship it".to_string())]);

        let mut missing = Opcode::MergeProposal {
            branch: b("other"),
            target: b("main"),
            message: "nope".to_string(),
        };
        assert!(matches!(
            missing.run(&mut ctx).unwrap_err(),
            OpcodeFailure::Fatal(_)
        ));
    }
}
