//! Repository configuration stored under `<git-dir>/branchflow/config.toml`.
//!
//! The file also holds the branch lineage (`[lineage]`, child = parent), so
//! [`ConfigStore`] doubles as the durable [`LineageStore`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::branch::BranchName;
use crate::core::lineage::Lineage;
use crate::core::plan::{PlanOptions, SyncStrategy};

/// Workflow configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FlowConfig {
    pub main_branch: String,

    /// Long-lived root branches besides the main branch.
    pub perennial_branches: Vec<String>,

    /// Skip every operation that talks to the remote.
    pub offline: bool,

    pub sync_strategy: SyncStrategy,

    /// Push branches that have no tracking branch yet during sync and hack.
    pub push_new_branches: bool,

    /// Keep a finished record after a successful run so `undo` can replay it.
    pub retain_undo: bool,

    /// Child branch -> parent branch.
    pub lineage: BTreeMap<String, String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            main_branch: "main".to_string(),
            perennial_branches: Vec::new(),
            offline: false,
            sync_strategy: SyncStrategy::Merge,
            push_new_branches: false,
            retain_undo: true,
            lineage: BTreeMap::new(),
        }
    }
}

impl FlowConfig {
    pub fn validate(&self) -> Result<()> {
        self.lineage().map(|_| ())
    }

    /// Build the validated lineage described by this config.
    pub fn lineage(&self) -> Result<Lineage> {
        let main = BranchName::new(&self.main_branch).context("main_branch")?;
        let perennials = self
            .perennial_branches
            .iter()
            .map(|name| BranchName::new(name).context("perennial_branches"))
            .collect::<Result<Vec<_>>>()?;
        let entries = self
            .lineage
            .iter()
            .map(|(child, parent)| {
                let child = BranchName::new(child).context("lineage key")?;
                let parent = BranchName::new(parent)
                    .with_context(|| format!("lineage parent of '{child}'"))?;
                Ok((child, parent))
            })
            .collect::<Result<Vec<_>>>()?;
        Lineage::from_entries(main, perennials, entries)
            .map_err(|err| anyhow!("invalid lineage: {err}"))
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            offline: self.offline,
            sync_strategy: self.sync_strategy,
            push_new_branches: self.push_new_branches,
        }
    }

    /// Replace the stored lineage entries with those of `lineage`.
    pub fn set_lineage(&mut self, lineage: &Lineage) {
        self.lineage = lineage
            .entries()
            .map(|(child, parent)| (child.to_string(), parent.to_string()))
            .collect();
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FlowConfig::default()`.
pub fn load_config(path: &Path) -> Result<FlowConfig> {
    if !path.exists() {
        let cfg = FlowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FlowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FlowConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Durable sink for lineage mutations made by opcodes.
pub trait LineageStore {
    fn save_lineage(&self, lineage: &Lineage) -> Result<()>;
}

/// [`LineageStore`] backed by the `[lineage]` table of the config file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<FlowConfig> {
        load_config(&self.path)
    }
}

impl LineageStore for ConfigStore {
    fn save_lineage(&self, lineage: &Lineage) -> Result<()> {
        let mut cfg = load_config(&self.path)?;
        cfg.set_lineage(lineage);
        debug!(path = %self.path.display(), entries = cfg.lineage.len(), "saving lineage");
        write_config(&self.path, &cfg)
    }
}
