//! CLI command implementations.
//!
//! A [`Session`] opens the working copy (git backend, config, lineage, run
//! state store) once per invocation; each command plans or loads a program
//! and runs it through the executor.

use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::branch::BranchName;
use crate::core::dialog::{
    ConfirmDialog, DIALOG_INPUTS_ENV, DialogStatus, KeyEvent, parse_test_inputs, run_scripted,
};
use crate::core::lineage::Lineage;
use crate::core::plan::{RepoFacts, plan_hack, plan_kill, plan_set_parent, plan_sync};
use crate::core::opcode::Opcode;
use crate::execute::{ExecOutcome, RunContext, StepObserver};
use crate::io::backend::Backend;
use crate::io::config::{ConfigStore, FlowConfig};
use crate::io::git::Git;
use crate::io::paths::FlowPaths;
use crate::io::run_state::RunStateStore;
use crate::resume::{abort_run, continue_run, skip_run, undo_run};
use crate::start::start_workflow;
use crate::status::describe;

/// Result of a CLI command, mapped to an exit code by `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Executed(ExecOutcome),
    /// The user declined a confirmation prompt; nothing was changed.
    Declined,
    Report(String),
}

/// Echoes each opcode as it runs: `<command> ... ok` or `... FAILED`.
struct StdoutProgress;

impl StepObserver for StdoutProgress {
    fn started(&self, opcode: &Opcode) {
        print!("{opcode} ... ");
        if let Err(err) = std::io::stdout().flush() {
            debug!(error = %err, "flush progress");
        }
    }

    fn finished(&self, _opcode: &Opcode, ok: bool) {
        println!("{}", if ok { "ok" } else { "FAILED" });
    }
}

/// Everything one invocation needs from the working copy.
pub struct Session {
    git: Git,
    config: FlowConfig,
    lineage: Lineage,
    config_store: ConfigStore,
    store: RunStateStore,
}

impl Session {
    pub fn open(workdir: &Path) -> Result<Self> {
        let git = Git::new(workdir);
        let git_dir = git
            .git_dir()
            .with_context(|| format!("{} is not a git working copy", workdir.display()))?;
        let paths = FlowPaths::new(git_dir);
        let config_store = ConfigStore::new(&paths.config_path);
        let config = config_store.load()?;
        let lineage = config.lineage()?;
        debug!(git_dir = %paths.git_dir.display(), "session opened");
        Ok(Self {
            git,
            config,
            lineage,
            config_store,
            store: RunStateStore::new(&paths.run_state_path),
        })
    }

    fn run<T>(&mut self, f: impl FnOnce(&mut RunContext<'_>) -> T) -> T {
        let mut ctx = RunContext {
            backend: &self.git,
            connector: None,
            lineage: &mut self.lineage,
            lineage_store: &self.config_store,
            store: &self.store,
            retain_undo: self.config.retain_undo,
            observer: Some(&StdoutProgress),
        };
        f(&mut ctx)
    }

    /// Local and tracked branches among those the lineage knows plus `extra`.
    fn facts(&self, extra: &[BranchName]) -> Result<RepoFacts> {
        let initial_branch = self.git.current_branch()?;
        let mut candidates = self.lineage.branches();
        candidates.insert(initial_branch.clone());
        candidates.extend(extra.iter().cloned());

        let mut local_branches = BTreeSet::new();
        let mut tracked_branches = BTreeSet::new();
        for branch in candidates {
            if !self.git.has_local_branch(&branch)? {
                continue;
            }
            if self.git.has_remote_branch(&branch)? {
                tracked_branches.insert(branch.clone());
            }
            local_branches.insert(branch);
        }
        Ok(RepoFacts {
            initial_branch,
            local_branches,
            tracked_branches,
        })
    }
}

pub fn sync(workdir: &Path, all: bool) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    let facts = session.facts(&[])?;
    let branches: Vec<BranchName> = if all {
        facts.local_branches.iter().cloned().collect()
    } else {
        vec![facts.initial_branch.clone()]
    };
    let program = plan_sync(
        &session.lineage,
        &branches,
        &facts,
        &session.config.plan_options(),
    )?;
    info!(branches = branches.len(), opcodes = program.len(), "sync planned");
    let outcome = session.run(|ctx| start_workflow("sync", program, ctx))?;
    Ok(CommandOutcome::Executed(outcome))
}

pub fn hack(workdir: &Path, branch: &str, parent: Option<&str>) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    let branch = BranchName::new(branch)?;
    let parent = parent.map(BranchName::new).transpose()?;
    let mut probe = vec![branch.clone()];
    probe.extend(parent.iter().cloned());
    let facts = session.facts(&probe)?;
    let program = plan_hack(
        &session.lineage,
        &branch,
        parent.as_ref(),
        &facts,
        &session.config.plan_options(),
    )?;
    let outcome = session.run(|ctx| start_workflow("hack", program, ctx))?;
    Ok(CommandOutcome::Executed(outcome))
}

pub fn kill(workdir: &Path, branch: Option<&str>) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    let branch = branch.map(BranchName::new).transpose()?;
    let facts = session.facts(branch.as_slice())?;
    let branch = branch.unwrap_or_else(|| facts.initial_branch.clone());
    let program = plan_kill(
        &session.lineage,
        &branch,
        &facts,
        &session.config.plan_options(),
    )?;
    let outcome = session.run(|ctx| start_workflow("kill", program, ctx))?;
    Ok(CommandOutcome::Executed(outcome))
}

pub fn set_parent(workdir: &Path, parent: &str, branch: Option<&str>) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    let parent = BranchName::new(parent)?;
    let branch = match branch {
        Some(name) => BranchName::new(name)?,
        None => session.git.current_branch()?,
    };
    let program = plan_set_parent(&session.lineage, &branch, &parent)?;
    let outcome = session.run(|ctx| start_workflow("set-parent", program, ctx))?;
    Ok(CommandOutcome::Executed(outcome))
}

pub fn resume_continue(workdir: &Path) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    Ok(CommandOutcome::Executed(session.run(continue_run)?))
}

pub fn resume_skip(workdir: &Path) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    Ok(CommandOutcome::Executed(session.run(skip_run)?))
}

pub fn resume_abort(workdir: &Path) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    Ok(CommandOutcome::Executed(session.run(abort_run)?))
}

/// Undo the last finished run, asking for confirmation unless `yes`.
pub fn undo(workdir: &Path, yes: bool) -> Result<CommandOutcome> {
    let mut session = Session::open(workdir)?;
    let finished = session
        .store
        .load()?
        .filter(|state| !state.is_unfinished());
    if let (false, Some(state)) = (yes, finished) {
        let dialog = ConfirmDialog::new(format!("Undo the last '{}' run?", state.command));
        if confirm(dialog)? != DialogStatus::Accepted {
            info!("undo declined");
            return Ok(CommandOutcome::Declined);
        }
    }
    Ok(CommandOutcome::Executed(session.run(undo_run)?))
}

pub fn status(workdir: &Path) -> Result<CommandOutcome> {
    let session = Session::open(workdir)?;
    let state = session.store.load()?;
    Ok(CommandOutcome::Report(describe(state.as_ref())))
}

/// Run a dialog against scripted inputs, or stdin lines when none are set.
fn confirm(dialog: ConfirmDialog) -> Result<DialogStatus> {
    if let Ok(raw) = std::env::var(DIALOG_INPUTS_ENV) {
        let inputs =
            parse_test_inputs(&raw).with_context(|| format!("parse {DIALOG_INPUTS_ENV}"))?;
        return Ok(run_scripted(dialog, inputs));
    }
    let mut dialog = dialog;
    eprint!("{}", dialog.view());
    for line in std::io::stdin().lock().lines() {
        let line = line.context("read confirmation")?;
        let (next, command) = dialog.update(KeyEvent::from_line(&line));
        dialog = next;
        if command.is_some() {
            return Ok(dialog.status());
        }
    }
    Ok(DialogStatus::Aborted)
}
