//! Orchestration for starting a new workflow.
//!
//! A workflow may only start when no unfinished run is stored and the working
//! tree is clean. A finished, undoable record from an earlier run is replaced.

use tracing::{debug, info, instrument};

use crate::core::program::Program;
use crate::error::FlowError;
use crate::execute::{ExecMode, ExecOutcome, RunContext, execute};
use crate::io::run_state::RunState;

/// Validate preconditions, then execute `program` as the `command` workflow.
#[instrument(skip_all, fields(command = command, opcodes = program.len()))]
pub fn start_workflow(
    command: &str,
    program: Program,
    ctx: &mut RunContext<'_>,
) -> Result<ExecOutcome, FlowError> {
    if let Some(existing) = ctx.store.load()? {
        if existing.is_unfinished() {
            return Err(FlowError::UnfinishedRun {
                command: existing.command,
            });
        }
        debug!(previous = %existing.command, "replacing finished run record");
    }
    if ctx.backend.has_uncommitted_changes()? {
        return Err(FlowError::Validation(
            "you have uncommitted changes; commit or stash them first".to_string(),
        ));
    }
    info!("starting workflow");
    execute(RunState::new(command, program), ctx, ExecMode::Forward)
}
