//! Resumable branch workflows on top of git.
//!
//! Every command compiles into a program of atomic opcodes that the executor
//! runs one by one. A conflict stops the run and persists it, so a later
//! invocation can continue, skip the conflicting branch, or abort and roll
//! back. A finished run can be undone.
//!
//! - **[`core`]**: Pure, deterministic logic (names, lineage, opcodes,
//!   programs, planners, dialogs). No I/O.
//! - **[`io`]**: Side-effecting seams (git backend, hosting connector,
//!   configuration, run state store).
//!
//! Orchestration modules ([`execute`], [`resume`], [`start`], [`cli`])
//! coordinate core logic with I/O to implement CLI commands.

pub mod cli;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod resume;
pub mod start;
pub mod status;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
