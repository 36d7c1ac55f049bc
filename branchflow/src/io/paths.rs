//! Canonical file locations inside the repository's administrative directory.

use std::path::PathBuf;

/// All branchflow paths for one working copy.
#[derive(Debug, Clone)]
pub struct FlowPaths {
    pub git_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub run_state_path: PathBuf,
}

impl FlowPaths {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        let git_dir = git_dir.into();
        let state_dir = git_dir.join("branchflow");
        Self {
            git_dir,
            config_path: state_dir.join("config.toml"),
            run_state_path: state_dir.join("run_state.json"),
            state_dir,
        }
    }
}
