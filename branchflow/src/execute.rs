//! The resumable workflow loop.
//!
//! [`execute`] pops opcodes off a [`RunState`]'s remaining program one at a
//! time. Successful opcodes contribute their undo steps to the front of the
//! undo program. A conflict persists the state as unfinished and stops.
//!
//! Rollback opcodes (abort and undo programs, and the leading part of a skip
//! program) record no undo. When one fails, the rollback opcodes that did not
//! run yet are persisted as the undo program of an unfinished record, so
//! `branchflow abort` retries from the step that failed. Any other failure is
//! fatal and writes nothing.

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::branch::BranchName;
use crate::core::lineage::Lineage;
use crate::core::opcode::Opcode;
use crate::core::program::Program;
use crate::dispatch::OpcodeFailure;
use crate::error::FlowError;
use crate::io::backend::Backend;
use crate::io::config::LineageStore;
use crate::io::hosting::Connector;
use crate::io::run_state::{RunState, RunStateStore, UnfinishedDetails};

/// Receives every opcode as it runs, e.g. to echo progress to the terminal.
pub trait StepObserver {
    fn started(&self, opcode: &Opcode);
    fn finished(&self, opcode: &Opcode, ok: bool);
}

/// Everything opcodes and the executor may touch. No global state.
pub struct RunContext<'a> {
    pub backend: &'a dyn Backend,
    /// `None` when offline or no hosting platform is configured.
    pub connector: Option<&'a dyn Connector>,
    pub lineage: &'a mut Lineage,
    pub lineage_store: &'a dyn LineageStore,
    pub store: &'a RunStateStore,
    /// Keep a finished record after success so `undo` can replay it.
    pub retain_undo: bool,
    pub observer: Option<&'a dyn StepObserver>,
}

/// `Forward` runs a workflow (and its continue/skip programs); `Rollback`
/// runs abort and undo programs, where every failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Forward,
    Rollback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed {
        command: String,
        executed: usize,
    },
    /// Stopped on a conflict; an unfinished record was persisted.
    Stopped {
        command: String,
        end_branch: BranchName,
        can_skip: bool,
        message: String,
    },
}

/// Drive `state` until its program is empty or an opcode fails.
#[instrument(skip_all, fields(command = %state.command, mode = ?mode))]
pub fn execute(
    state: RunState,
    ctx: &mut RunContext<'_>,
    mode: ExecMode,
) -> Result<ExecOutcome, FlowError> {
    let rollback = match mode {
        ExecMode::Forward => 0,
        ExecMode::Rollback => state.remaining_program.len(),
    };
    run_program(state, ctx, rollback)
}

/// Run `rollback` as rollback opcodes, then `state` forward.
#[instrument(skip_all, fields(command = %state.command, rollback = rollback.len()))]
pub fn execute_after_rollback(
    rollback: Program,
    mut state: RunState,
    ctx: &mut RunContext<'_>,
) -> Result<ExecOutcome, FlowError> {
    let count = rollback.len();
    state.remaining_program.prepend(rollback);
    run_program(state, ctx, count)
}

/// The first `rollback` opcodes of the remaining program are rollback opcodes.
fn run_program(
    mut state: RunState,
    ctx: &mut RunContext<'_>,
    mut rollback: usize,
) -> Result<ExecOutcome, FlowError> {
    state.unfinished_details = None;
    let mut executed = 0;
    while let Some(mut opcode) = state.remaining_program.pop_front() {
        let rolling_back = rollback > 0;
        rollback = rollback.saturating_sub(1);
        debug!(
            opcode = opcode.name(),
            rolling_back,
            remaining = state.remaining_program.len(),
            "running opcode"
        );
        if let Some(observer) = ctx.observer {
            observer.started(&opcode);
        }
        let result = opcode.run(ctx);
        if let Some(observer) = ctx.observer {
            observer.finished(&opcode, result.is_ok());
        }
        match result {
            Ok(()) => {
                executed += 1;
                if !rolling_back {
                    state.undo_program.prepend(opcode.undo_steps()?);
                }
            }
            Err(OpcodeFailure::Conflict { message })
                if !rolling_back && !opcode.auto_abort_on_error() =>
            {
                state.undo_program.prepend(opcode.undo_steps()?);
                let end_branch = ctx.backend.current_branch()?;
                let can_skip = opcode.can_skip_conflict(ctx.lineage.is_root(&end_branch));
                warn!(
                    opcode = opcode.name(),
                    branch = %end_branch,
                    can_skip,
                    "stopped on conflict"
                );
                state.unfinished_details = Some(UnfinishedDetails {
                    end_branch: end_branch.clone(),
                    can_skip,
                    failed_opcode: opcode,
                    ended_at: Utc::now(),
                });
                ctx.store.save(&state)?;
                return Ok(ExecOutcome::Stopped {
                    command: state.command,
                    end_branch,
                    can_skip,
                    message,
                });
            }
            Err(failure) => {
                let source = match failure {
                    OpcodeFailure::Conflict { message } => anyhow!(message),
                    OpcodeFailure::Fatal(err) => err,
                };
                warn!(opcode = opcode.name(), error = %format!("{source:#}"), "opcode failed");
                if rolling_back {
                    save_interrupted_rollback(state, opcode.clone(), rollback, ctx)?;
                }
                return Err(FlowError::Fatal {
                    opcode: opcode.name(),
                    source,
                });
            }
        }
    }

    if ctx.retain_undo && !state.undo_program.is_empty() {
        debug!(undo = state.undo_program.len(), "retaining undo program");
        ctx.store.save(&state)?;
    } else {
        ctx.store.delete()?;
    }
    info!(executed, "workflow completed");
    Ok(ExecOutcome::Completed {
        command: state.command,
        executed,
    })
}

/// Persist a failed rollback so `abort` resumes it at `failed`.
///
/// The record's undo program is `failed`, the `pending` rollback opcodes still
/// queued behind it, then the undo program collected so far. An abort runs
/// `failed`'s abort steps (none, unless it left a merge or rebase behind)
/// followed by that program.
fn save_interrupted_rollback(
    mut state: RunState,
    failed: Opcode,
    pending: usize,
    ctx: &RunContext<'_>,
) -> Result<(), FlowError> {
    let (pending, _forward) = state.remaining_program.split_at(pending);
    let mut undo: Program = std::iter::once(failed.clone()).collect();
    undo.append(pending);
    undo.append(state.undo_program);
    let end_branch = match ctx.backend.current_branch() {
        Ok(branch) => branch,
        Err(err) => {
            debug!(error = %err, "current branch unknown after failed rollback");
            ctx.lineage.main_branch().clone()
        }
    };
    state.remaining_program = Program::new();
    state.undo_program = undo;
    state.unfinished_details = Some(UnfinishedDetails {
        end_branch,
        can_skip: false,
        failed_opcode: failed,
        ended_at: Utc::now(),
    });
    warn!(
        steps = state.undo_program.len(),
        "rollback interrupted, `branchflow abort` retries it"
    );
    ctx.store.save(&state)?;
    Ok(())
}
