//! Test-only doubles: an in-memory backend, a recording hosting connector, an
//! in-memory lineage store and a real-git test repository.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};

use crate::core::branch::{BranchName, ORIGIN, Sha};
use crate::core::lineage::Lineage;
use crate::io::backend::{Backend, BackendError, BackendResult};
use crate::io::config::LineageStore;
use crate::io::git::Git;
use crate::io::hosting::{Connector, Proposal};
use crate::io::paths::FlowPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Merge,
    Rebase,
}

#[derive(Debug)]
struct FakeRepo {
    current: BranchName,
    local: BTreeMap<BranchName, Sha>,
    remote: BTreeMap<BranchName, Sha>,
    remotes: BTreeMap<String, String>,
    pending: Option<Pending>,
    unresolved: bool,
    uncommitted: bool,
    /// Call key -> occurrence that conflicts (1 = next call).
    conflicts: Vec<(String, usize)>,
    failures: Vec<String>,
    calls: Vec<String>,
    commits: u64,
}

impl FakeRepo {
    fn commit(&mut self) -> Sha {
        self.commits += 1;
        fake_sha(self.commits)
    }

    fn resolve(&self, rev: &str) -> Option<Sha> {
        if let Ok(branch) = BranchName::new(rev) {
            if let Some(sha) = self.local.get(&branch) {
                return Some(sha.clone());
            }
            if branch.is_remote_qualified() {
                return self.remote.get(&branch.local_name()).cloned();
            }
        }
        Sha::new(rev).ok()
    }

    fn current_sha(&self) -> BackendResult<Sha> {
        self.local
            .get(&self.current)
            .cloned()
            .ok_or_else(|| failed("rev-parse HEAD", "no commit on current branch"))
    }

    /// Log the call and report an injected conflict or failure for it.
    fn record(&mut self, key: String) -> BackendResult<()> {
        self.calls.push(key.clone());
        if let Some(pos) = self.failures.iter().position(|f| *f == key) {
            self.failures.remove(pos);
            return Err(failed(&key, "injected failure"));
        }
        if let Some(pos) = self.conflicts.iter().position(|(k, _)| *k == key) {
            let remaining = &mut self.conflicts[pos].1;
            if *remaining <= 1 {
                self.conflicts.remove(pos);
                self.unresolved = true;
                return Err(BackendError::Conflict {
                    command: key,
                    message: "CONFLICT (content): Merge conflict in file.txt".to_string(),
                });
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

fn fake_sha(n: u64) -> Sha {
    Sha::new(format!("{n:08x}")).unwrap_or_else(|_| unreachable!("hex sha"))
}

fn failed(command: &str, message: &str) -> BackendError {
    BackendError::Failed {
        command: command.to_string(),
        code: Some(1),
        message: message.to_string(),
    }
}

fn branch(name: &str) -> BranchName {
    BranchName::new(name).unwrap_or_else(|err| panic!("test branch name {name}: {err}"))
}

/// Scripted in-memory [`Backend`].
///
/// Every branch points at a fake SHA; merges, rebases and continues create a
/// new one. Conflicts are injected per call key (`"merge main"`,
/// `"rebase origin/main"`, `"continue_merge"`, ...). Only mutating calls are
/// logged.
#[derive(Debug)]
pub struct FakeBackend {
    repo: RefCell<FakeRepo>,
}

impl FakeBackend {
    /// Repository with `branches` (local and on origin) and `current` checked out.
    pub fn new(current: &str, branches: &[&str]) -> Self {
        let mut repo = FakeRepo {
            current: branch(current),
            local: BTreeMap::new(),
            remote: BTreeMap::new(),
            remotes: BTreeMap::from([(ORIGIN.to_string(), "file:///origin.git".to_string())]),
            pending: None,
            unresolved: false,
            uncommitted: false,
            conflicts: Vec::new(),
            failures: Vec::new(),
            calls: Vec::new(),
            commits: 0,
        };
        for name in branches {
            let sha = repo.commit();
            repo.local.insert(branch(name), sha.clone());
            repo.remote.insert(branch(name), sha);
        }
        Self {
            repo: RefCell::new(repo),
        }
    }

    pub fn current(&self) -> BranchName {
        self.repo.borrow().current.clone()
    }

    pub fn set_current(&self, name: &str) {
        self.repo.borrow_mut().current = branch(name);
    }

    pub fn sha_of(&self, name: &str) -> Sha {
        self.repo
            .borrow()
            .local
            .get(&branch(name))
            .cloned()
            .unwrap_or_else(|| panic!("no local branch {name}"))
    }

    pub fn remote_sha_of(&self, name: &str) -> Option<Sha> {
        self.repo.borrow().remote.get(&branch(name)).cloned()
    }

    pub fn has_branch(&self, name: &str) -> bool {
        self.repo.borrow().local.contains_key(&branch(name))
    }

    /// Remove the tracking branch of `name`.
    pub fn forget_remote(&self, name: &str) {
        self.repo.borrow_mut().remote.remove(&branch(name));
    }

    /// Make the next call with this key stop with a conflict.
    pub fn conflict_on(&self, key: &str) {
        self.conflict_on_nth(key, 1);
    }

    /// Make the `nth` call with this key stop with a conflict.
    pub fn conflict_on_nth(&self, key: &str, nth: usize) {
        self.repo
            .borrow_mut()
            .conflicts
            .push((key.to_string(), nth));
    }

    /// Make the next call with this key fail.
    pub fn fail_on(&self, key: &str) {
        self.repo.borrow_mut().failures.push(key.to_string());
    }

    /// Simulate the user resolving and staging conflicted files.
    pub fn resolve_conflicts(&self) {
        self.repo.borrow_mut().unresolved = false;
    }

    pub fn set_uncommitted(&self, dirty: bool) {
        self.repo.borrow_mut().uncommitted = dirty;
    }

    pub fn calls(&self) -> Vec<String> {
        self.repo.borrow().calls.clone()
    }
}

impl Backend for FakeBackend {
    fn current_branch(&self) -> BackendResult<BranchName> {
        Ok(self.current())
    }

    fn current_sha(&self) -> BackendResult<Sha> {
        self.repo.borrow().current_sha()
    }

    fn branch_sha(&self, name: &BranchName) -> BackendResult<Sha> {
        self.repo
            .borrow()
            .resolve(name.as_str())
            .ok_or_else(|| failed("rev-parse", &format!("unknown revision {name}")))
    }

    fn remote_branch_sha(&self, name: &BranchName) -> BackendResult<Option<Sha>> {
        Ok(self.repo.borrow().remote.get(name).cloned())
    }

    fn has_local_branch(&self, name: &BranchName) -> BackendResult<bool> {
        Ok(self.repo.borrow().local.contains_key(name))
    }

    fn has_remote_branch(&self, name: &BranchName) -> BackendResult<bool> {
        Ok(self.repo.borrow().remote.contains_key(name))
    }

    fn has_uncommitted_changes(&self) -> BackendResult<bool> {
        Ok(self.repo.borrow().uncommitted)
    }

    fn has_unresolved_conflicts(&self) -> BackendResult<bool> {
        Ok(self.repo.borrow().unresolved)
    }

    fn remote_url(&self, name: &str) -> BackendResult<Option<String>> {
        Ok(self.repo.borrow().remotes.get(name).cloned())
    }

    fn fetch(&self) -> BackendResult<()> {
        self.repo.borrow_mut().record("fetch".to_string())
    }

    fn checkout(&self, name: &BranchName) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("checkout {name}");
        repo.record(key.clone())?;
        if repo.pending.is_some() {
            return Err(failed(&key, "merge or rebase in progress"));
        }
        if !repo.local.contains_key(name) {
            return Err(failed(&key, "pathspec did not match"));
        }
        repo.current = name.clone();
        Ok(())
    }

    fn create_branch(&self, name: &BranchName, start_point: &str) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("create_branch {name} {start_point}");
        repo.record(key.clone())?;
        if repo.local.contains_key(name) {
            return Err(failed(&key, "branch already exists"));
        }
        let sha = repo
            .resolve(start_point)
            .ok_or_else(|| failed(&key, "not a valid start point"))?;
        repo.local.insert(name.clone(), sha);
        Ok(())
    }

    fn merge_no_edit(&self, name: &BranchName) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("merge {name}");
        if let Err(err) = repo.record(key.clone()) {
            if err.is_conflict() {
                repo.pending = Some(Pending::Merge);
            }
            return Err(err);
        }
        if repo.resolve(name.as_str()).is_none() {
            return Err(failed(&key, "not something we can merge"));
        }
        let sha = repo.commit();
        let current = repo.current.clone();
        repo.local.insert(current, sha);
        Ok(())
    }

    fn rebase(&self, name: &BranchName) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("rebase {name}");
        if let Err(err) = repo.record(key.clone()) {
            if err.is_conflict() {
                repo.pending = Some(Pending::Rebase);
            }
            return Err(err);
        }
        if repo.resolve(name.as_str()).is_none() {
            return Err(failed(&key, "invalid upstream"));
        }
        let sha = repo.commit();
        let current = repo.current.clone();
        repo.local.insert(current, sha);
        Ok(())
    }

    fn push(&self, name: &BranchName, force: bool) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = if force {
            format!("push --force {name}")
        } else {
            format!("push {name}")
        };
        repo.record(key.clone())?;
        let sha = repo
            .local
            .get(name)
            .cloned()
            .ok_or_else(|| failed(&key, "src refspec does not match any"))?;
        repo.remote.insert(name.clone(), sha);
        Ok(())
    }

    fn create_remote_branch(&self, sha: &Sha, name: &BranchName) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        repo.record(format!("create_remote_branch {name} {sha}"))?;
        repo.remote.insert(name.clone(), sha.clone());
        Ok(())
    }

    fn delete_local_branch(&self, name: &BranchName, force: bool) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("delete_local_branch {name}");
        repo.record(key.clone())?;
        if repo.current == *name {
            return Err(failed(&key, "cannot delete the checked out branch"));
        }
        if !force && repo.remote.get(name) != repo.local.get(name) {
            return Err(failed(&key, "branch is not fully merged"));
        }
        repo.local
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| failed(&key, "branch not found"))
    }

    fn delete_remote_branch(&self, name: &BranchName) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("delete_remote_branch {name}");
        repo.record(key.clone())?;
        repo.remote
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| failed(&key, "remote ref does not exist"))
    }

    fn reset(&self, sha: &Sha, hard: bool) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let mode = if hard { "--hard" } else { "--soft" };
        repo.record(format!("reset {mode} {sha}"))?;
        let current = repo.current.clone();
        repo.local.insert(current, sha.clone());
        Ok(())
    }

    fn abort_merge(&self) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        repo.record("abort_merge".to_string())?;
        if repo.pending != Some(Pending::Merge) {
            return Err(failed("abort_merge", "there is no merge to abort"));
        }
        repo.pending = None;
        repo.unresolved = false;
        Ok(())
    }

    fn continue_merge(&self) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        repo.record("continue_merge".to_string())?;
        if repo.unresolved {
            return Err(BackendError::Conflict {
                command: "continue_merge".to_string(),
                message: "unmerged files".to_string(),
            });
        }
        if repo.pending == Some(Pending::Merge) {
            repo.pending = None;
            let sha = repo.commit();
            let current = repo.current.clone();
            repo.local.insert(current, sha);
        }
        Ok(())
    }

    fn abort_rebase(&self) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        repo.record("abort_rebase".to_string())?;
        if repo.pending != Some(Pending::Rebase) {
            return Err(failed("abort_rebase", "no rebase in progress"));
        }
        repo.pending = None;
        repo.unresolved = false;
        Ok(())
    }

    fn continue_rebase(&self) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        repo.record("continue_rebase".to_string())?;
        if repo.unresolved {
            return Err(BackendError::Conflict {
                command: "continue_rebase".to_string(),
                message: "unmerged files".to_string(),
            });
        }
        if repo.pending == Some(Pending::Rebase) {
            repo.pending = None;
            let sha = repo.commit();
            let current = repo.current.clone();
            repo.local.insert(current, sha);
        }
        Ok(())
    }

    fn add_remote(&self, name: &str, url: &str) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("add_remote {name}");
        repo.record(key.clone())?;
        if repo.remotes.contains_key(name) {
            return Err(failed(&key, "remote already exists"));
        }
        repo.remotes.insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn remove_remote(&self, name: &str) -> BackendResult<()> {
        let mut repo = self.repo.borrow_mut();
        let key = format!("remove_remote {name}");
        repo.record(key.clone())?;
        repo.remotes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| failed(&key, "no such remote"))
    }
}

/// [`Connector`] over a fixed set of proposals that records merges.
#[derive(Debug, Default)]
pub struct RecordingConnector {
    proposals: Vec<(Proposal, Sha)>,
    merged: RefCell<Vec<(u64, String)>>,
}

impl RecordingConnector {
    pub fn with_proposal(number: u64, source: BranchName, target: BranchName, sha: Sha) -> Self {
        Self {
            proposals: vec![(
                Proposal {
                    number,
                    title: format!("Merge {source}"),
                    source,
                    target,
                },
                sha,
            )],
            merged: RefCell::new(Vec::new()),
        }
    }

    pub fn merged(&self) -> Vec<(u64, String)> {
        self.merged.borrow().clone()
    }
}

impl Connector for RecordingConnector {
    fn find_proposal(&self, branch: &BranchName, target: &BranchName) -> Result<Option<Proposal>> {
        Ok(self
            .proposals
            .iter()
            .find(|(p, _)| p.source == *branch && p.target == *target)
            .map(|(p, _)| p.clone()))
    }

    fn merge_proposal(&self, number: u64, message: &str) -> Result<Sha> {
        let (_, sha) = self
            .proposals
            .iter()
            .find(|(p, _)| p.number == number)
            .ok_or_else(|| anyhow!("no proposal #{number}"))?;
        self.merged
            .borrow_mut()
            .push((number, message.to_string()));
        Ok(sha.clone())
    }
}

/// [`LineageStore`] that keeps every saved snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryLineageStore {
    saved: RefCell<Vec<Lineage>>,
}

impl MemoryLineageStore {
    pub fn saved(&self) -> Vec<Lineage> {
        self.saved.borrow().clone()
    }
}

impl LineageStore for MemoryLineageStore {
    fn save_lineage(&self, lineage: &Lineage) -> Result<()> {
        self.saved.borrow_mut().push(lineage.clone());
        Ok(())
    }
}

/// Temporary working copy cloned from a bare `origin`, with `main` pushed.
pub struct TestRepo {
    _temp: tempfile::TempDir,
    root: PathBuf,
    origin: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let origin = temp.path().join("origin.git");
        let root = temp.path().join("work");
        run_git(temp.path(), &["init", "--bare", "-b", "main", "origin.git"])?;
        run_git(temp.path(), &["clone", "-q", "origin.git", "work"])?;
        run_git(&root, &["checkout", "-q", "-B", "main"])?;
        run_git(&root, &["config", "user.name", "Branchflow Test"])?;
        run_git(&root, &["config", "user.email", "test@example.com"])?;
        run_git(&root, &["config", "commit.gpgsign", "false"])?;
        let repo = Self {
            _temp: temp,
            root,
            origin,
        };
        repo.commit_file("README.md", "base\n", "initial commit")?;
        repo.git(&["push", "-q", "-u", ORIGIN, "main"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn origin_path(&self) -> &Path {
        &self.origin
    }

    pub fn backend(&self) -> Git {
        Git::new(&self.root)
    }

    pub fn paths(&self) -> FlowPaths {
        FlowPaths::new(self.root.join(".git"))
    }

    /// Run git in the working copy and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.root, args)
    }

    /// Write `file` on the current branch and commit it.
    pub fn commit_file(&self, file: &str, contents: &str, message: &str) -> Result<()> {
        fs::write(self.root.join(file), contents)
            .with_context(|| format!("write {file}"))?;
        self.git(&["add", file])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Create `name` from the current branch, check it out and push it.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        self.git(&["checkout", "-q", "-b", name])?;
        self.git(&["push", "-q", "-u", ORIGIN, name])?;
        Ok(())
    }

    pub fn sha(&self, rev: &str) -> Result<String> {
        self.git(&["rev-parse", rev])
    }

    pub fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Set up `feature` and `main` so merging `main` into `feature` conflicts.
    pub fn diverge_feature_from_main(&self) -> Result<()> {
        self.create_branch("feature")?;
        self.commit_file("README.md", "feature change\n", "feature edit")?;
        self.git(&["push", "-q"])?;
        self.git(&["checkout", "-q", "main"])?;
        self.commit_file("README.md", "main change\n", "main edit")?;
        self.git(&["push", "-q"])?;
        self.git(&["checkout", "-q", "feature"])?;
        Ok(())
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
