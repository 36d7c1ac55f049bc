//! Pure planners that compile a high-level command into a [`Program`].
//!
//! Planners only read the lineage and a snapshot of repository facts. They
//! never touch the backend, so every command can be planned (and rejected)
//! before anything is mutated.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::branch::BranchName;
use crate::core::lineage::Lineage;
use crate::core::opcode::Opcode;
use crate::core::program::Program;
use crate::error::FlowError;

/// How feature branches pick up changes from their parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    #[default]
    Merge,
    Rebase,
}

/// Snapshot of the repository taken before planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFacts {
    /// Branch checked out when the command started.
    pub initial_branch: BranchName,
    pub local_branches: BTreeSet<BranchName>,
    /// Local branches that have a branch of the same name on origin.
    pub tracked_branches: BTreeSet<BranchName>,
}

impl RepoFacts {
    fn require_local(&self, branch: &BranchName) -> Result<(), FlowError> {
        if self.local_branches.contains(branch) {
            Ok(())
        } else {
            Err(FlowError::Validation(format!(
                "there is no local branch '{branch}'"
            )))
        }
    }

    fn is_tracked(&self, branch: &BranchName) -> bool {
        self.tracked_branches.contains(branch)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    pub offline: bool,
    pub sync_strategy: SyncStrategy,
    pub push_new_branches: bool,
}

/// Sync `branches` and their local ancestors, parents before children.
pub fn plan_sync(
    lineage: &Lineage,
    branches: &[BranchName],
    facts: &RepoFacts,
    options: &PlanOptions,
) -> Result<Program, FlowError> {
    let mut wanted = Vec::new();
    for branch in branches {
        facts.require_local(branch)?;
        let mut chain = lineage.ancestors(branch)?;
        chain.reverse();
        wanted.extend(
            chain
                .into_iter()
                .filter(|ancestor| facts.local_branches.contains(ancestor)),
        );
        wanted.push(branch.clone());
    }
    let ordered = lineage.order_ancestors_first(&wanted)?;

    let mut program = Program::new();
    if !options.offline {
        program.push_back(Opcode::Fetch);
    }
    for branch in &ordered {
        program.push_back(Opcode::checkout(branch.clone()));
        let tracked = facts.is_tracked(branch) && !options.offline;
        if lineage.is_root(branch) {
            if tracked {
                program.push_back(Opcode::rebase(branch.tracking()));
                program.push_back(Opcode::Push {
                    branch: branch.clone(),
                    force: false,
                });
            }
            continue;
        }
        let parent = lineage
            .parent(branch)
            .unwrap_or_else(|| lineage.main_branch())
            .clone();
        match options.sync_strategy {
            SyncStrategy::Merge => {
                if tracked {
                    program.push_back(Opcode::merge(branch.tracking()));
                }
                program.push_back(Opcode::merge(parent));
            }
            SyncStrategy::Rebase => {
                if tracked {
                    program.push_back(Opcode::rebase(branch.tracking()));
                }
                program.push_back(Opcode::rebase(parent));
            }
        }
        if tracked || (options.push_new_branches && !options.offline) {
            program.push_back(Opcode::Push {
                branch: branch.clone(),
                force: tracked && options.sync_strategy == SyncStrategy::Rebase,
            });
        }
    }
    program.push_back(Opcode::checkout(facts.initial_branch.clone()));
    Ok(program)
}

/// Create `new` off `parent` (the main branch by default) and check it out.
pub fn plan_hack(
    lineage: &Lineage,
    new: &BranchName,
    parent: Option<&BranchName>,
    facts: &RepoFacts,
    options: &PlanOptions,
) -> Result<Program, FlowError> {
    if facts.local_branches.contains(new) || lineage.is_root(new) {
        return Err(FlowError::Validation(format!(
            "a branch named '{new}' already exists"
        )));
    }
    if new.is_remote_qualified() {
        return Err(FlowError::Validation(format!(
            "'{new}' names a remote branch"
        )));
    }
    let parent = parent.unwrap_or_else(|| lineage.main_branch());
    facts.require_local(parent)?;

    let mut program = Program::from(vec![
        Opcode::CreateBranch {
            branch: new.clone(),
            start_point: parent.to_string(),
        },
        Opcode::set_parent(new.clone(), parent.clone()),
        Opcode::checkout(new.clone()),
    ]);
    if options.push_new_branches && !options.offline {
        program.push_back(Opcode::Push {
            branch: new.clone(),
            force: false,
        });
    }
    Ok(program)
}

/// Delete `branch` locally and on origin, handing its children to its parent.
pub fn plan_kill(
    lineage: &Lineage,
    branch: &BranchName,
    facts: &RepoFacts,
    options: &PlanOptions,
) -> Result<Program, FlowError> {
    if lineage.is_root(branch) {
        return Err(FlowError::Validation(format!(
            "cannot kill root branch '{branch}'"
        )));
    }
    facts.require_local(branch)?;
    let parent = lineage
        .parent(branch)
        .unwrap_or_else(|| lineage.main_branch())
        .clone();

    let mut program = Program::new();
    if facts.initial_branch == *branch {
        program.push_back(Opcode::checkout(parent.clone()));
    }
    if facts.is_tracked(branch) && !options.offline {
        program.push_back(Opcode::delete_remote_branch(branch.clone()));
    }
    program.push_back(Opcode::delete_local_branch(branch.clone(), true));
    for child in lineage.children(branch) {
        program.push_back(Opcode::set_parent(child, parent.clone()));
    }
    program.push_back(Opcode::remove_parent(branch.clone()));
    Ok(program)
}

/// Record `parent` as the parent of `branch`.
pub fn plan_set_parent(
    lineage: &Lineage,
    branch: &BranchName,
    parent: &BranchName,
) -> Result<Program, FlowError> {
    lineage.clone().set_parent(branch, parent)?;
    Ok(Program::from(vec![Opcode::set_parent(
        branch.clone(),
        parent.clone(),
    )]))
}
