//! Resumable branch workflows on top of git.
//!
//! Commands compile into opcode programs. A conflict stops the program and
//! exits with [`exit_codes::STOPPED`]; `continue`, `skip` and `abort` pick it
//! up from `<git-dir>/branchflow/run_state.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use branchflow::cli::{self, CommandOutcome};
use branchflow::execute::ExecOutcome;
use branchflow::{exit_codes, logging};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "branchflow",
    version,
    about = "Resumable branch workflows on top of git"
)]
struct Cli {
    /// Run as if started in this directory.
    #[arg(short = 'C', long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Update the current branch (or all branches) from its parent and origin.
    Sync {
        #[arg(long)]
        all: bool,
    },
    /// Create a feature branch off the main branch or `--parent`.
    Hack {
        branch: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Delete a feature branch locally and on origin.
    Kill { branch: Option<String> },
    /// Change the parent of the current branch (or `--branch`).
    SetParent {
        parent: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Resume a stopped workflow after resolving its conflicts.
    Continue,
    /// Skip the branch that stopped with conflicts and resume with the next.
    Skip,
    /// Cancel a stopped workflow and roll back what it already did.
    Abort,
    /// Revert the last finished workflow.
    Undo {
        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the stored workflow state.
    Status,
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(outcome) => report(outcome),
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::FAILED
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<CommandOutcome> {
    let workdir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolve current directory")?,
    };
    match cli.command {
        Command::Sync { all } => cli::sync(&workdir, all),
        Command::Hack { branch, parent } => cli::hack(&workdir, &branch, parent.as_deref()),
        Command::Kill { branch } => cli::kill(&workdir, branch.as_deref()),
        Command::SetParent { parent, branch } => {
            cli::set_parent(&workdir, &parent, branch.as_deref())
        }
        Command::Continue => cli::resume_continue(&workdir),
        Command::Skip => cli::resume_skip(&workdir),
        Command::Abort => cli::resume_abort(&workdir),
        Command::Undo { yes } => cli::undo(&workdir, yes),
        Command::Status => cli::status(&workdir),
    }
}

fn report(outcome: CommandOutcome) -> i32 {
    match outcome {
        CommandOutcome::Executed(ExecOutcome::Completed { command, executed }) => {
            println!("{command}: done ({executed} steps)");
            exit_codes::OK
        }
        CommandOutcome::Executed(ExecOutcome::Stopped {
            command,
            end_branch,
            can_skip,
            message,
        }) => {
            eprintln!("{command} stopped on branch '{end_branch}': {message}");
            let skip = if can_skip { ", `branchflow skip`" } else { "" };
            eprintln!(
                "Resolve the conflicts, then run `branchflow continue`{skip} or `branchflow abort`."
            );
            exit_codes::STOPPED
        }
        CommandOutcome::Declined => {
            eprintln!("nothing changed");
            exit_codes::DECLINED
        }
        CommandOutcome::Report(text) => {
            println!("{text}");
            exit_codes::OK
        }
    }
}
