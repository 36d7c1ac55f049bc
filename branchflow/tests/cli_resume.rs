//! CLI tests for the resumable commands.
//!
//! Spawns the branchflow binary in a real working copy and verifies exit codes,
//! persisted state and repository effects.

use std::process::{Command, Output};

use branchflow::core::dialog::DIALOG_INPUTS_ENV;
use branchflow::exit_codes;
use branchflow::io::config::{FlowConfig, load_config, write_config};
use branchflow::io::run_state::RunStateStore;
use branchflow::test_support::TestRepo;

fn branchflow(repo: &TestRepo, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_branchflow"))
        .current_dir(repo.path())
        .args(args)
        .env_remove(DIALOG_INPUTS_ENV)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn branchflow")
}

fn branchflow_with_inputs(repo: &TestRepo, args: &[&str], inputs: &str) -> Output {
    Command::new(env!("CARGO_BIN_EXE_branchflow"))
        .current_dir(repo.path())
        .args(args)
        .env(DIALOG_INPUTS_ENV, inputs)
        .output()
        .expect("spawn branchflow")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn repo_with_feature_lineage() -> TestRepo {
    let repo = TestRepo::new().expect("repo");
    let mut cfg = FlowConfig::default();
    cfg.lineage.insert("feature".to_string(), "main".to_string());
    write_config(&repo.paths().config_path, &cfg).expect("config");
    repo
}

#[test]
fn resume_commands_without_record_report_nothing_to_do() {
    let repo = TestRepo::new().expect("repo");
    for command in ["continue", "skip", "abort"] {
        let output = branchflow(&repo, &[command]);
        assert_eq!(output.status.code(), Some(exit_codes::FAILED), "{command}");
        assert!(
            stderr(&output).contains(&format!("nothing to {command}")),
            "{command}: {}",
            stderr(&output)
        );
    }
    let output = branchflow(&repo, &["undo", "--yes"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&output).contains("nothing to undo"));
}

#[test]
fn conflicting_sync_stops_then_abort_restores() {
    let repo = repo_with_feature_lineage();
    repo.diverge_feature_from_main().expect("diverge");
    let before = repo.sha("feature").expect("sha");

    let output = branchflow(&repo, &["sync"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::STOPPED),
        "stderr: {}",
        stderr(&output)
    );
    assert!(stderr(&output).contains("branchflow skip"));
    let progress = stdout(&output);
    assert!(progress.contains("git checkout main ... ok"), "{progress}");
    assert!(
        progress.contains("git merge --no-edit main ... FAILED"),
        "{progress}"
    );

    let output = branchflow(&repo, &["status"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(
        stdout(&output).contains("'sync' stopped on branch 'feature'"),
        "{}",
        stdout(&output)
    );

    let output = branchflow(&repo, &["hack", "another"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&output).contains("unfinished"), "{}", stderr(&output));

    let output = branchflow(&repo, &["abort"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        stderr(&output)
    );
    assert_eq!(repo.sha("feature").expect("sha"), before);
    assert_eq!(repo.current_branch().expect("branch"), "feature");
    let store = RunStateStore::new(repo.paths().run_state_path);
    assert!(store.load().expect("load").is_none());
}

#[test]
fn hack_records_parent_and_undo_asks_first() {
    let repo = TestRepo::new().expect("repo");

    let output = branchflow(&repo, &["hack", "topic"]);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        stderr(&output)
    );
    assert_eq!(repo.current_branch().expect("branch"), "topic");
    let cfg = load_config(&repo.paths().config_path).expect("config");
    assert_eq!(cfg.lineage.get("topic").map(String::as_str), Some("main"));

    let output = branchflow_with_inputs(&repo, &["undo"], "x,n");
    assert_eq!(output.status.code(), Some(exit_codes::DECLINED));
    assert_eq!(repo.current_branch().expect("branch"), "topic");

    let output = branchflow_with_inputs(&repo, &["undo"], "enter");
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        stderr(&output)
    );
    assert_eq!(repo.current_branch().expect("branch"), "main");
    assert!(repo.git(&["rev-parse", "--verify", "topic"]).is_err());
    let cfg = load_config(&repo.paths().config_path).expect("config");
    assert!(cfg.lineage.is_empty());
}

#[test]
fn hack_and_set_parent_validate_before_running() {
    let repo = TestRepo::new().expect("repo");
    assert_eq!(
        branchflow(&repo, &["hack", "a"]).status.code(),
        Some(exit_codes::OK)
    );
    assert_eq!(
        branchflow(&repo, &["hack", "b", "--parent", "a"]).status.code(),
        Some(exit_codes::OK)
    );

    let output = branchflow(&repo, &["hack", "a"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&output).contains("already exists"), "{}", stderr(&output));

    let output = branchflow(&repo, &["set-parent", "b", "--branch", "a"]);
    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(stderr(&output).contains("cyclic lineage"), "{}", stderr(&output));
    let cfg = load_config(&repo.paths().config_path).expect("config");
    assert_eq!(cfg.lineage.get("a").map(String::as_str), Some("main"));
}
