//! Human-readable summary of the stored run state for `branchflow status`.

use crate::io::run_state::RunState;

pub fn describe(state: Option<&RunState>) -> String {
    let Some(state) = state else {
        return "No workflow is in progress and there is nothing to undo.".to_string();
    };
    let Some(details) = &state.unfinished_details else {
        return format!(
            "The last '{}' run finished. `branchflow undo` reverts its {} step(s).",
            state.command,
            state.undo_program.len()
        );
    };
    let skip = if details.can_skip {
        ", `branchflow skip`"
    } else {
        ""
    };
    format!(
        "'{}' stopped on branch '{}' at {} while running {}.\n\
         {} step(s) remain, {} step(s) can be rolled back.\n\
         Resolve the conflicts and run `branchflow continue`{skip} or `branchflow abort`.",
        state.command,
        details.end_branch,
        details.ended_at.format("%Y-%m-%d %H:%M:%S UTC"),
        details.failed_opcode.name(),
        state.remaining_program.len(),
        state.undo_program.len(),
    )
}
