//! Branch lineage: the parent/child forest that orders branch operations.
//!
//! Roots are the main branch and the perennial branches. Every other branch
//! may carry exactly one parent entry. Traversals are iterative and bounded so
//! a malformed (cyclic) lineage loaded from disk surfaces as
//! [`LineageError::CyclicLineage`] instead of looping.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use thiserror::Error;

use crate::core::branch::BranchName;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineageError {
    #[error("cyclic lineage at branch '{branch}'")]
    CyclicLineage { branch: BranchName },
    #[error("'{branch}' is a root branch and cannot have a parent")]
    RootBranch { branch: BranchName },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    main: BranchName,
    perennials: BTreeSet<BranchName>,
    parents: BTreeMap<BranchName, BranchName>,
}

impl Lineage {
    pub fn new(main: BranchName, perennials: impl IntoIterator<Item = BranchName>) -> Self {
        let perennials = perennials.into_iter().filter(|b| *b != main).collect();
        Self {
            main,
            perennials,
            parents: BTreeMap::new(),
        }
    }

    /// Build a lineage from stored entries, validating that it is acyclic.
    pub fn from_entries(
        main: BranchName,
        perennials: impl IntoIterator<Item = BranchName>,
        entries: impl IntoIterator<Item = (BranchName, BranchName)>,
    ) -> Result<Self, LineageError> {
        let mut lineage = Self::new(main, perennials);
        for (branch, parent) in entries {
            if lineage.is_root(&branch) {
                return Err(LineageError::RootBranch { branch });
            }
            lineage.parents.insert(branch, parent);
        }
        for branch in lineage.parents.keys() {
            lineage.ancestors(branch)?;
        }
        Ok(lineage)
    }

    pub fn main_branch(&self) -> &BranchName {
        &self.main
    }

    pub fn is_root(&self, branch: &BranchName) -> bool {
        *branch == self.main || self.perennials.contains(branch)
    }

    /// Main branch first, then perennials in name order.
    pub fn roots(&self) -> Vec<BranchName> {
        std::iter::once(self.main.clone())
            .chain(self.perennials.iter().cloned())
            .collect()
    }

    pub fn parent(&self, branch: &BranchName) -> Option<&BranchName> {
        self.parents.get(branch)
    }

    pub fn children(&self, branch: &BranchName) -> BTreeSet<BranchName> {
        self.parents
            .iter()
            .filter(|(_, parent)| *parent == branch)
            .map(|(child, _)| child.clone())
            .collect()
    }

    /// Branches with a parent entry.
    pub fn entries(&self) -> impl Iterator<Item = (&BranchName, &BranchName)> {
        self.parents.iter()
    }

    /// Every branch the lineage knows about: roots, children and parents.
    pub fn branches(&self) -> BTreeSet<BranchName> {
        let mut all: BTreeSet<BranchName> = self.roots().into_iter().collect();
        for (child, parent) in &self.parents {
            all.insert(child.clone());
            all.insert(parent.clone());
        }
        all
    }

    /// Ancestors of `branch`, nearest first.
    ///
    /// The chain ends at a root, or at the first ancestor without a parent entry.
    /// It never contains `branch` itself or any branch twice.
    pub fn ancestors(&self, branch: &BranchName) -> Result<Vec<BranchName>, LineageError> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([branch]);
        let max_hops = self.parents.len();
        let mut current = branch;
        while let Some(parent) = self.parents.get(current) {
            if !visited.insert(parent) || result.len() >= max_hops {
                return Err(LineageError::CyclicLineage {
                    branch: branch.clone(),
                });
            }
            result.push(parent.clone());
            if self.is_root(parent) {
                break;
            }
            current = parent;
        }
        Ok(result)
    }

    /// All transitive children of `branch`, breadth first.
    pub fn descendants(&self, branch: &BranchName) -> Vec<BranchName> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = vec![branch.clone()];
        while let Some(next) = queue.pop() {
            for child in self.children(&next) {
                if seen.insert(child.clone()) {
                    result.push(child.clone());
                    queue.insert(0, child);
                }
            }
        }
        result
    }

    /// Set the parent of `branch`, returning the previous parent.
    ///
    /// Rejected without mutation when `branch` is a root, or when `parent` is
    /// `branch` itself or one of its descendants.
    pub fn set_parent(
        &mut self,
        branch: &BranchName,
        parent: &BranchName,
    ) -> Result<Option<BranchName>, LineageError> {
        if self.is_root(branch) {
            return Err(LineageError::RootBranch {
                branch: branch.clone(),
            });
        }
        if parent == branch || self.ancestors(parent)?.contains(branch) {
            return Err(LineageError::CyclicLineage {
                branch: branch.clone(),
            });
        }
        Ok(self.parents.insert(branch.clone(), parent.clone()))
    }

    /// Remove the parent entry of `branch`, returning it.
    pub fn remove_parent(&mut self, branch: &BranchName) -> Option<BranchName> {
        self.parents.remove(branch)
    }

    /// Order `branches` so every branch comes after its ancestors.
    ///
    /// Ancestors not in `branches` are not added. Duplicates are dropped.
    pub fn order_ancestors_first(
        &self,
        branches: &[BranchName],
    ) -> Result<Vec<BranchName>, LineageError> {
        let wanted: HashSet<&BranchName> = branches.iter().collect();
        let mut ordered = Vec::new();
        let mut placed = HashSet::new();
        for branch in branches {
            let mut chain = self.ancestors(branch)?;
            chain.reverse();
            chain.push(branch.clone());
            for item in chain {
                if wanted.contains(&item) && placed.insert(item.clone()) {
                    ordered.push(item);
                }
            }
        }
        Ok(ordered)
    }
}
