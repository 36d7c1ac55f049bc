//! Git adapter implementing [`Backend`] with `git` subprocess calls.
//!
//! Every primitive is one blocking `git` invocation in the working copy.
//! Merge, rebase and their continuations are classified as
//! [`BackendError::Conflict`] when git leaves unmerged paths behind.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, instrument, warn};

use crate::core::branch::{BranchName, ORIGIN, Sha};
use crate::io::backend::{Backend, BackendError, BackendResult};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    /// True for the unmerged XY codes git reports during a conflict.
    pub fn is_unmerged(&self) -> bool {
        matches!(
            self.code.as_str(),
            "DD" | "AU" | "UD" | "UA" | "DU" | "AA" | "UU"
        )
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Absolute path of the repository's administrative directory (`.git`).
    ///
    /// Fails when the working directory is not inside a git working copy.
    pub fn git_dir(&self) -> BackendResult<PathBuf> {
        let out = self.run_capture(&["rev-parse", "--absolute-git-dir"])?;
        Ok(PathBuf::from(out.trim()))
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> BackendResult<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    fn rebase_head_name(&self) -> BackendResult<Option<String>> {
        let git_dir = self.git_dir()?;
        for dir in ["rebase-merge", "rebase-apply"] {
            let path = git_dir.join(dir).join("head-name");
            if let Ok(contents) = std::fs::read_to_string(&path) {
                return Ok(Some(contents.trim().to_string()));
            }
        }
        Ok(None)
    }

    fn has_merge_in_progress(&self) -> BackendResult<bool> {
        Ok(self.git_dir()?.join("MERGE_HEAD").exists())
    }

    fn has_rebase_in_progress(&self) -> BackendResult<bool> {
        let git_dir = self.git_dir()?;
        Ok(git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists())
    }

    fn parse_sha(&self, command: &str, raw: &str) -> BackendResult<Sha> {
        Sha::new(raw).map_err(|_| BackendError::UnexpectedOutput {
            command: command.to_string(),
            output: raw.trim().to_string(),
        })
    }

    /// Run a command that may stop with conflicts (merge, rebase, continuations).
    fn run_conflicting(&self, args: &[&str]) -> BackendResult<()> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut files = conflicting_files(&stdout);
        if files.is_empty() {
            files = self
                .status_porcelain()?
                .into_iter()
                .filter(StatusEntry::is_unmerged)
                .map(|entry| entry.path)
                .collect();
        }
        let command = format!("git {}", args.join(" "));
        if files.is_empty() {
            return Err(BackendError::Failed {
                command,
                code: output.status.code(),
                message: stderr.trim().to_string(),
            });
        }
        warn!(command = %command, files = ?files, "conflicts detected");
        Err(BackendError::Conflict {
            command,
            message: format!("conflicts in {}", files.join(", ")),
        })
    }

    fn run_status_ok(&self, args: &[&str]) -> BackendResult<bool> {
        Ok(self.run(args)?.status.success())
    }

    fn run_unit(&self, args: &[&str]) -> BackendResult<()> {
        self.run_checked(args)?;
        Ok(())
    }

    pub(crate) fn run_capture(&self, args: &[&str]) -> BackendResult<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> BackendResult<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Failed {
                command: format!("git {}", args.join(" ")),
                code: output.status.code(),
                message: stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> BackendResult<Output> {
        debug!(args = ?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            // Continuations must never open an editor.
            .env("GIT_EDITOR", "true")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|source| BackendError::Spawn {
                command: format!("git {}", args.join(" ")),
                source,
            })
    }
}

impl Backend for Git {
    #[instrument(skip_all)]
    fn current_branch(&self) -> BackendResult<BranchName> {
        if let Some(head_name) = self.rebase_head_name()? {
            return BranchName::new(&head_name).map_err(|_| BackendError::UnexpectedOutput {
                command: "rebase head-name".to_string(),
                output: head_name,
            });
        }
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(BackendError::UnexpectedOutput {
                command: "git rev-parse --abbrev-ref HEAD".to_string(),
                output: "detached HEAD".to_string(),
            });
        }
        debug!(branch = %name, "current branch");
        BranchName::new(name).map_err(|_| BackendError::UnexpectedOutput {
            command: "git rev-parse --abbrev-ref HEAD".to_string(),
            output: name.to_string(),
        })
    }

    fn current_sha(&self) -> BackendResult<Sha> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        self.parse_sha("git rev-parse HEAD", &out)
    }

    fn branch_sha(&self, branch: &BranchName) -> BackendResult<Sha> {
        let reference = format!("refs/heads/{branch}");
        let out = self.run_capture(&["rev-parse", &reference])?;
        self.parse_sha("git rev-parse", &out)
    }

    fn remote_branch_sha(&self, branch: &BranchName) -> BackendResult<Option<Sha>> {
        let reference = format!("refs/remotes/{ORIGIN}/{branch}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &reference])?;
        if !output.status.success() {
            return Ok(None);
        }
        let out = String::from_utf8_lossy(&output.stdout);
        self.parse_sha("git rev-parse --verify", &out).map(Some)
    }

    fn has_local_branch(&self, branch: &BranchName) -> BackendResult<bool> {
        self.run_status_ok(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ])
    }

    fn has_remote_branch(&self, branch: &BranchName) -> BackendResult<bool> {
        self.run_status_ok(&[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/remotes/{ORIGIN}/{branch}"),
        ])
    }

    fn has_uncommitted_changes(&self) -> BackendResult<bool> {
        Ok(!self.status_porcelain()?.is_empty())
    }

    fn has_unresolved_conflicts(&self) -> BackendResult<bool> {
        Ok(self
            .status_porcelain()?
            .iter()
            .any(StatusEntry::is_unmerged))
    }

    fn remote_url(&self, name: &str) -> BackendResult<Option<String>> {
        let output = self.run(&["remote", "get-url", name])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    #[instrument(skip_all)]
    fn fetch(&self) -> BackendResult<()> {
        self.run_unit(&["fetch", "--prune", ORIGIN])
    }

    #[instrument(skip_all, fields(branch = %branch))]
    fn checkout(&self, branch: &BranchName) -> BackendResult<()> {
        self.run_unit(&["checkout", branch.as_str()])
    }

    #[instrument(skip_all, fields(branch = %branch, start_point))]
    fn create_branch(&self, branch: &BranchName, start_point: &str) -> BackendResult<()> {
        self.run_unit(&["branch", branch.as_str(), start_point])
    }

    #[instrument(skip_all, fields(branch = %branch))]
    fn merge_no_edit(&self, branch: &BranchName) -> BackendResult<()> {
        self.run_conflicting(&["merge", "--no-edit", branch.as_str()])
    }

    #[instrument(skip_all, fields(branch = %branch))]
    fn rebase(&self, branch: &BranchName) -> BackendResult<()> {
        self.run_conflicting(&["rebase", branch.as_str()])
    }

    #[instrument(skip_all, fields(branch = %branch, force))]
    fn push(&self, branch: &BranchName, force: bool) -> BackendResult<()> {
        if force {
            self.run_unit(&["push", "--force-with-lease", ORIGIN, branch.as_str()])
        } else {
            self.run_unit(&["push", "-u", ORIGIN, branch.as_str()])
        }
    }

    #[instrument(skip_all, fields(branch = %branch, sha = %sha))]
    fn create_remote_branch(&self, sha: &Sha, branch: &BranchName) -> BackendResult<()> {
        let refspec = format!("{sha}:refs/heads/{branch}");
        self.run_unit(&["push", ORIGIN, &refspec])
    }

    #[instrument(skip_all, fields(branch = %branch, force))]
    fn delete_local_branch(&self, branch: &BranchName, force: bool) -> BackendResult<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_unit(&["branch", flag, branch.as_str()])
    }

    #[instrument(skip_all, fields(branch = %branch))]
    fn delete_remote_branch(&self, branch: &BranchName) -> BackendResult<()> {
        self.run_unit(&["push", ORIGIN, "--delete", branch.as_str()])
    }

    #[instrument(skip_all, fields(sha = %sha, hard))]
    fn reset(&self, sha: &Sha, hard: bool) -> BackendResult<()> {
        if hard {
            self.run_unit(&["reset", "--hard", sha.as_str()])
        } else {
            self.run_unit(&["reset", sha.as_str()])
        }
    }

    #[instrument(skip_all)]
    fn abort_merge(&self) -> BackendResult<()> {
        self.run_unit(&["merge", "--abort"])
    }

    #[instrument(skip_all)]
    fn continue_merge(&self) -> BackendResult<()> {
        if !self.has_merge_in_progress()? {
            debug!("no merge in progress, nothing to commit");
            return Ok(());
        }
        self.run_conflicting(&["commit", "--no-edit"])
    }

    #[instrument(skip_all)]
    fn abort_rebase(&self) -> BackendResult<()> {
        self.run_unit(&["rebase", "--abort"])
    }

    #[instrument(skip_all)]
    fn continue_rebase(&self) -> BackendResult<()> {
        if !self.has_rebase_in_progress()? {
            debug!("no rebase in progress");
            return Ok(());
        }
        self.run_conflicting(&["rebase", "--continue"])
    }

    #[instrument(skip_all, fields(name, url))]
    fn add_remote(&self, name: &str, url: &str) -> BackendResult<()> {
        self.run_unit(&["remote", "add", name, url])
    }

    #[instrument(skip_all, fields(name))]
    fn remove_remote(&self, name: &str) -> BackendResult<()> {
        self.run_unit(&["remote", "remove", name])
    }
}

/// Paths named in `CONFLICT (...): ... in <path>` lines of merge/rebase output.
fn conflicting_files(output: &str) -> Vec<String> {
    use std::sync::LazyLock;
    static CONFLICT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?m)^CONFLICT \([^)]*\): (?:Merge conflict in (\S+)|(\S+) deleted in)")
            .unwrap()
    });
    CONFLICT_RE
        .captures_iter(output)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn parse_status_line(line: &str) -> BackendResult<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(BackendError::UnexpectedOutput {
            command: "git status --porcelain".to_string(),
            output: line.to_string(),
        });
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
