//! Workflow lifecycle tests against real git repositories.
//!
//! Each test clones a bare `origin` into a temporary working copy, drives the
//! executor through the git backend and checks the resulting repository and
//! persisted run state.

use std::fs;

use branchflow::core::branch::BranchName;
use branchflow::core::lineage::Lineage;
use branchflow::core::opcode::Opcode;
use branchflow::core::plan::{PlanOptions, RepoFacts, plan_sync};
use branchflow::core::program::Program;
use branchflow::error::FlowError;
use branchflow::execute::{ExecOutcome, RunContext};
use branchflow::io::config::{ConfigStore, FlowConfig, LineageStore, write_config};
use branchflow::io::git::Git;
use branchflow::io::run_state::RunStateStore;
use branchflow::resume::{abort_run, continue_run, skip_run, undo_run};
use branchflow::start::start_workflow;
use branchflow::test_support::TestRepo;

fn b(name: &str) -> BranchName {
    BranchName::new(name).expect("branch")
}

/// Real working copy plus the stores a CLI invocation would open.
struct Fixture {
    repo: TestRepo,
    git: Git,
    lineage: Lineage,
    config_store: ConfigStore,
    store: RunStateStore,
}

impl Fixture {
    fn new() -> Self {
        let repo = TestRepo::new().expect("repo");
        let paths = repo.paths();
        Self {
            git: repo.backend(),
            lineage: Lineage::new(b("main"), []),
            config_store: ConfigStore::new(&paths.config_path),
            store: RunStateStore::new(&paths.run_state_path),
            repo,
        }
    }

    fn with<T>(&mut self, f: impl FnOnce(&mut RunContext<'_>) -> T) -> T {
        let mut ctx = RunContext {
            backend: &self.git,
            connector: None,
            lineage: &mut self.lineage,
            lineage_store: &self.config_store,
            store: &self.store,
            retain_undo: true,
            observer: None,
        };
        f(&mut ctx)
    }

    fn start(&mut self, program: Vec<Opcode>) -> ExecOutcome {
        self.with(|ctx| start_workflow("sync", Program::from(program), ctx))
            .expect("start workflow")
    }

    fn merge_in_progress(&self) -> bool {
        self.repo.paths().git_dir.join("MERGE_HEAD").exists()
    }
}

/// Merging `main` into a diverged `feature` conflicts; abort restores `feature`.
#[test]
fn conflicting_merge_stops_and_abort_restores_branch() {
    let mut fx = Fixture::new();
    fx.repo.diverge_feature_from_main().expect("diverge");
    let before = fx.repo.sha("feature").expect("sha");

    let outcome = fx.start(vec![Opcode::merge(b("main"))]);
    let ExecOutcome::Stopped {
        end_branch,
        can_skip,
        ..
    } = outcome
    else {
        panic!("expected stop, got {outcome:?}");
    };
    assert_eq!(end_branch, b("feature"));
    assert!(can_skip);
    assert!(fx.merge_in_progress());

    let state = fx.store.load().expect("load").expect("record");
    let details = state.unfinished_details.expect("unfinished");
    assert!(details.can_skip);
    assert_eq!(details.end_branch, b("feature"));

    let outcome = fx.with(abort_run).expect("abort");
    assert!(matches!(outcome, ExecOutcome::Completed { .. }));
    assert!(!fx.merge_in_progress());
    assert_eq!(fx.repo.sha("feature").expect("sha"), before);
    assert_eq!(fx.repo.current_branch().expect("branch"), "feature");
    assert!(fx.store.load().expect("load").is_none());
}

#[test]
fn continue_commits_resolved_merge() {
    let mut fx = Fixture::new();
    fx.repo.diverge_feature_from_main().expect("diverge");
    fx.start(vec![
        Opcode::merge(b("main")),
        Opcode::checkout(b("main")),
    ]);

    assert!(matches!(
        fx.with(continue_run).unwrap_err(),
        FlowError::UnresolvedConflicts
    ));

    fs::write(fx.repo.path().join("README.md"), "resolved\n").expect("write");
    fx.repo.git(&["add", "README.md"]).expect("add");
    let outcome = fx.with(continue_run).expect("continue");
    assert!(matches!(outcome, ExecOutcome::Completed { executed: 2, .. }));

    let parents = fx
        .repo
        .git(&["rev-list", "--parents", "-n", "1", "feature"])
        .expect("rev-list");
    assert_eq!(parents.split_whitespace().count(), 3, "merge commit");
    assert_eq!(fx.repo.current_branch().expect("branch"), "main");
    assert!(!fx.store.has_unfinished().expect("query"));
}

/// Planned sync over two feature branches; the first conflicts and is skipped.
#[test]
fn skip_moves_on_to_next_branch() {
    let mut fx = Fixture::new();
    fx.repo.create_branch("other").expect("other");
    fx.repo
        .commit_file("other.txt", "other\n", "other work")
        .expect("commit");
    fx.repo.git(&["push", "-q"]).expect("push");
    fx.repo.git(&["checkout", "-q", "main"]).expect("checkout");
    fx.repo.diverge_feature_from_main().expect("diverge");
    let feature_before = fx.repo.sha("feature").expect("sha");
    let main_sha = fx.repo.sha("main").expect("sha");

    fx.lineage = Lineage::from_entries(
        b("main"),
        [],
        [(b("feature"), b("main")), (b("other"), b("main"))],
    )
    .expect("lineage");
    let all = [b("main"), b("feature"), b("other")];
    let facts = RepoFacts {
        initial_branch: b("feature"),
        local_branches: all.iter().cloned().collect(),
        tracked_branches: all.iter().cloned().collect(),
    };
    let program =
        plan_sync(&fx.lineage, &all, &facts, &PlanOptions::default()).expect("plan");
    let outcome = fx.with(|ctx| start_workflow("sync", program, ctx)).expect("sync");
    assert!(matches!(
        outcome,
        ExecOutcome::Stopped { ref end_branch, can_skip: true, .. } if *end_branch == b("feature")
    ));

    let outcome = fx.with(skip_run).expect("skip");
    assert!(matches!(outcome, ExecOutcome::Completed { .. }));
    assert_eq!(fx.repo.sha("feature").expect("sha"), feature_before);
    assert!(!fx.merge_in_progress());
    let merged = fx
        .repo
        .git(&["merge-base", "--is-ancestor", &main_sha, "other"])
        .is_ok();
    assert!(merged, "other was synced with main");
    assert_eq!(
        fx.repo.sha("other").expect("sha"),
        fx.repo.sha("origin/other").expect("sha"),
        "other was pushed"
    );
    assert_eq!(fx.repo.current_branch().expect("branch"), "feature");
}

/// A conflicting rebase of the main branch cannot be skipped.
#[test]
fn rebase_conflict_on_root_cannot_be_skipped() {
    let mut fx = Fixture::new();
    fx.repo
        .commit_file("README.md", "local main\n", "local edit")
        .expect("commit");
    let local = fx.repo.sha("main").expect("sha");
    fx.repo.git(&["reset", "-q", "--hard", "HEAD~1"]).expect("reset");
    fx.repo
        .commit_file("README.md", "remote main\n", "remote edit")
        .expect("commit");
    fx.repo.git(&["push", "-q"]).expect("push");
    fx.repo.git(&["reset", "-q", "--hard", &local]).expect("reset");

    let outcome = fx.start(vec![Opcode::rebase(b("origin/main"))]);
    assert!(matches!(
        outcome,
        ExecOutcome::Stopped { ref end_branch, can_skip: false, .. } if *end_branch == b("main")
    ));
    let record = fx.store.load().expect("load");

    let err = fx.with(skip_run).unwrap_err();
    assert!(matches!(err, FlowError::CannotSkip { .. }));
    assert_eq!(fx.store.load().expect("load"), record);

    fx.with(abort_run).expect("abort");
    assert_eq!(fx.repo.sha("main").expect("sha"), local);
    assert!(fx.store.load().expect("load").is_none());
}

/// Lineage mutations are durable and undo restores the original parent.
#[test]
fn undo_restores_lineage_in_config() {
    let mut fx = Fixture::new();
    fx.repo.create_branch("f1").expect("f1");
    fx.lineage.set_parent(&b("f1"), &b("main")).expect("parent");
    write_config(&fx.repo.paths().config_path, &FlowConfig::default()).expect("config");
    fx.config_store.save_lineage(&fx.lineage).expect("save");

    let outcome = fx.start(vec![
        Opcode::set_parent(b("f1"), b("main")),
        Opcode::remove_parent(b("f1")),
    ]);
    assert!(matches!(outcome, ExecOutcome::Completed { executed: 2, .. }));
    let stored = fx.config_store.load().expect("config");
    assert_eq!(stored.lineage().expect("lineage").parent(&b("f1")), None);

    fx.with(undo_run).expect("undo");
    assert_eq!(fx.lineage.parent(&b("f1")), Some(&b("main")));
    let stored = fx.config_store.load().expect("config");
    assert_eq!(
        stored.lineage().expect("lineage").parent(&b("f1")),
        Some(&b("main"))
    );
    assert!(matches!(
        fx.with(undo_run).unwrap_err(),
        FlowError::NothingToResume { command: "undo" }
    ));
}

#[test]
fn continue_without_record_changes_nothing() {
    let mut fx = Fixture::new();
    let head = fx.repo.sha("HEAD").expect("sha");
    let err = fx.with(continue_run).unwrap_err();
    assert!(matches!(
        err,
        FlowError::NothingToResume {
            command: "continue"
        }
    ));
    assert_eq!(err.to_string(), "nothing to continue");
    assert_eq!(fx.repo.sha("HEAD").expect("sha"), head);
    assert!(!fx.repo.paths().run_state_path.exists());
}

#[test]
fn undo_of_sync_resets_merged_branch() {
    let mut fx = Fixture::new();
    fx.repo.create_branch("feature").expect("feature");
    fx.repo
        .commit_file("feature.txt", "feature\n", "feature work")
        .expect("commit");
    fx.repo.git(&["checkout", "-q", "main"]).expect("checkout");
    fx.repo
        .commit_file("main.txt", "main\n", "main work")
        .expect("commit");
    let feature_before = fx.repo.sha("feature").expect("sha");

    fx.start(vec![
        Opcode::checkout(b("feature")),
        Opcode::merge(b("main")),
        Opcode::checkout(b("main")),
    ]);
    assert_ne!(fx.repo.sha("feature").expect("sha"), feature_before);

    fx.with(undo_run).expect("undo");
    assert_eq!(fx.repo.sha("feature").expect("sha"), feature_before);
    assert_eq!(fx.repo.current_branch().expect("branch"), "main");
}
