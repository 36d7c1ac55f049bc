//! Recovery commands for a stored run: continue, skip, abort and undo.
//!
//! Each command loads the record, derives a new program from it and hands it
//! back to [`execute`]. A missing record is an explicit
//! [`FlowError::NothingToResume`], never a silent no-op.

use tracing::{info, instrument};

use crate::core::opcode::Opcode;
use crate::core::program::Program;
use crate::error::FlowError;
use crate::execute::{ExecMode, ExecOutcome, RunContext, execute, execute_after_rollback};
use crate::io::run_state::{RunState, UnfinishedDetails};

fn load_unfinished(
    ctx: &RunContext<'_>,
    command: &'static str,
) -> Result<(RunState, UnfinishedDetails), FlowError> {
    let mut state = ctx
        .store
        .load()?
        .ok_or(FlowError::NothingToResume { command })?;
    let details = state
        .unfinished_details
        .take()
        .ok_or(FlowError::NothingToResume { command })?;
    Ok((state, details))
}

/// Finish the stopped opcode after the user resolved its conflicts, then run the rest.
#[instrument(skip_all)]
pub fn continue_run(ctx: &mut RunContext<'_>) -> Result<ExecOutcome, FlowError> {
    let (mut state, details) = load_unfinished(ctx, "continue")?;
    if ctx.backend.has_unresolved_conflicts()? {
        return Err(FlowError::UnresolvedConflicts);
    }
    info!(command = %state.command, branch = %details.end_branch, "continuing");
    state
        .remaining_program
        .prepend(details.failed_opcode.continue_steps());
    execute(state, ctx, ExecMode::Forward)
}

/// Give up on the branch that conflicted and continue with the next one.
///
/// Undo opcodes up to the first checkout roll back what already happened on
/// the skipped branch; they run as rollback opcodes and leave no undo behind.
/// Queued opcodes up to the next checkout belong to the skipped branch and are
/// dropped.
#[instrument(skip_all)]
pub fn skip_run(ctx: &mut RunContext<'_>) -> Result<ExecOutcome, FlowError> {
    let (state, details) = load_unfinished(ctx, "skip")?;
    if !details.can_skip {
        return Err(FlowError::CannotSkip {
            branch: details.end_branch,
        });
    }
    info!(command = %state.command, branch = %details.end_branch, "skipping branch");

    let undo_at = state
        .undo_program
        .position(Opcode::is_checkout)
        .unwrap_or(state.undo_program.len());
    let (rollback, kept_undo) = state.undo_program.split_at(undo_at);
    let next_at = state
        .remaining_program
        .position(Opcode::is_checkout)
        .unwrap_or(state.remaining_program.len());
    let (_skipped, rest) = state.remaining_program.split_at(next_at);

    let mut undo_skipped: Program = details.failed_opcode.abort_steps().into_iter().collect();
    undo_skipped.append(rollback);
    let next = RunState {
        command: state.command,
        remaining_program: rest,
        undo_program: kept_undo,
        unfinished_details: None,
    };
    execute_after_rollback(undo_skipped, next, ctx)
}

/// Cancel the stopped opcode and roll back everything the run already did.
#[instrument(skip_all)]
pub fn abort_run(ctx: &mut RunContext<'_>) -> Result<ExecOutcome, FlowError> {
    let (state, details) = load_unfinished(ctx, "abort")?;
    info!(command = %state.command, branch = %details.end_branch, "aborting");
    let mut program: Program = details.failed_opcode.abort_steps().into_iter().collect();
    program.append(state.undo_program);
    execute(RunState::new(state.command, program), ctx, ExecMode::Rollback)
}

/// Replay the undo program of the last finished run.
#[instrument(skip_all)]
pub fn undo_run(ctx: &mut RunContext<'_>) -> Result<ExecOutcome, FlowError> {
    let state = ctx
        .store
        .load()?
        .ok_or(FlowError::NothingToResume { command: "undo" })?;
    if state.is_unfinished() {
        return Err(FlowError::UnfinishedRun {
            command: state.command,
        });
    }
    info!(command = %state.command, steps = state.undo_program.len(), "undoing");
    execute(
        RunState::new(state.command, state.undo_program),
        ctx,
        ExecMode::Rollback,
    )
}
