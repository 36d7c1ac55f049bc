//! Stable exit codes for branchflow CLI commands.

/// Command succeeded (including reports and finished workflows).
pub const OK: i32 = 0;
/// Command failed: invalid input, fatal opcode failure, unreadable state, etc.
pub const FAILED: i32 = 1;
/// Workflow stopped on a conflict; a resumable record was persisted.
pub const STOPPED: i32 = 2;
/// The user declined a confirmation prompt; nothing was changed.
pub const DECLINED: i32 = 3;
