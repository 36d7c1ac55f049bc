//! Validated branch and commit names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote that tracking branches and pushes refer to.
pub const ORIGIN: &str = "origin";

/// Rejected branch or SHA name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("invalid branch name '{name}': {reason}")]
    Branch { name: String, reason: &'static str },
    #[error("invalid commit sha '{0}'")]
    Sha(String),
}

/// A local (`feature`) or remote-qualified (`origin/feature`) branch name.
///
/// Names are normalized on construction: surrounding whitespace is trimmed and
/// a leading `refs/heads/` is stripped. Equality is exact string equality of the
/// normalized form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, NameError> {
        let trimmed = raw.as_ref().trim();
        let name = trimmed.strip_prefix("refs/heads/").unwrap_or(trimmed);
        if let Some(reason) = invalid_reason(name) {
            return Err(NameError::Branch {
                name: name.to_string(),
                reason,
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `origin/<name>` tracking branch of a local branch.
    pub fn tracking(&self) -> BranchName {
        BranchName(format!("{ORIGIN}/{}", self.0))
    }

    pub fn is_remote_qualified(&self) -> bool {
        self.0
            .strip_prefix(ORIGIN)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Strip the `origin/` prefix, if present.
    pub fn local_name(&self) -> BranchName {
        match self.0.strip_prefix(&format!("{ORIGIN}/")) {
            Some(local) => BranchName(local.to_string()),
            None => self.clone(),
        }
    }
}

fn invalid_reason(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("empty");
    }
    if name.starts_with('-') {
        return Some("starts with '-'");
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Some("contains whitespace or control characters");
    }
    if name.chars().any(|c| matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\')) {
        return Some("contains a character git forbids in ref names");
    }
    if name.contains("..") || name.contains("@{") || name.contains("//") {
        return Some("contains a forbidden sequence");
    }
    if name.ends_with('/') || name.ends_with('.') || name.ends_with(".lock") {
        return Some("has a forbidden suffix");
    }
    if name == "@" || name.starts_with('/') {
        return Some("is not a valid ref name");
    }
    None
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BranchName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(value: BranchName) -> Self {
        value.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A commit SHA (abbreviated or full), lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha(String);

impl Sha {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, NameError> {
        let sha = raw.as_ref().trim().to_ascii_lowercase();
        let valid = (4..=64).contains(&sha.len()) && sha.chars().all(|c| c.is_ascii_hexdigit());
        if !valid {
            return Err(NameError::Sha(raw.as_ref().to_string()));
        }
        Ok(Self(sha))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sha {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Sha> for String {
    fn from(value: Sha) -> Self {
        value.0
    }
}
