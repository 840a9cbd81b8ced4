//! Immutable commits and the change identity model
//!
//! A [`Commit`] snapshots a tree together with parent links and authorship.
//! Its id is a content hash, so a commit can never be edited; rewriting
//! (amend, rebase) always creates a new commit. What survives a rewrite is
//! the commit's [`ChangeId`]: the stable logical identity that views map to
//! "the current commit realizing this change".
//!
//! The `conflict` flag marks commits whose tree carries unresolved conflict
//! entries. Such commits are ordinary first-class commits; the engine
//! produces them instead of failing when a merge cannot be resolved.

use crate::error::{EngineError, Result};
use crate::ids::{ChangeId, CommitId, TreeId};
use crate::store::{get_json, put_json, ObjectStore};
use crate::tree::Tree;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};

/// Author/committer identity with timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// When the commit was authored or committed
    pub timestamp: DateTime<Utc>,
}

impl Signature {
    /// Create a signature stamped with the current time
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Serialized commit payload; the commit id is the hash of this record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitRecord {
    parent_ids: Vec<CommitId>,
    tree_id: TreeId,
    change_id: ChangeId,
    author: Signature,
    committer: Signature,
    description: String,
    has_conflict: bool,
}

/// An immutable, content-addressed commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Content hash identity
    pub id: CommitId,
    /// Parent commits: empty for a root, one for a normal commit, two or
    /// more for a merge
    pub parent_ids: Vec<CommitId>,
    /// Tree snapshotted by this commit
    pub tree_id: TreeId,
    /// Stable logical identity, preserved across rewrites
    pub change_id: ChangeId,
    /// Who authored the change
    pub author: Signature,
    /// Who created this commit object
    pub committer: Signature,
    /// Human-readable description
    pub description: String,
    /// Whether the tree carries unresolved conflicts
    pub has_conflict: bool,
}

impl Commit {
    /// Load a commit by id
    pub fn load(store: &dyn ObjectStore, id: &CommitId) -> Result<Self> {
        let record: CommitRecord = get_json(store, id.as_str())?;
        Ok(Self {
            id: id.clone(),
            parent_ids: record.parent_ids,
            tree_id: record.tree_id,
            change_id: record.change_id,
            author: record.author,
            committer: record.committer,
            description: record.description,
            has_conflict: record.has_conflict,
        })
    }

    /// Load this commit's tree
    pub fn tree(&self, store: &dyn ObjectStore) -> Result<Tree> {
        Tree::load(store, &self.tree_id)
    }

    /// Format for display in logs
    pub fn display_format(&self) -> String {
        format!(
            "[{}] change {}{} - {}",
            self.id.short(),
            self.change_id.short(),
            if self.has_conflict { " (conflict)" } else { "" },
            if self.description.is_empty() {
                "(no description)"
            } else {
                &self.description
            },
        )
    }
}

/// Builder for new commits
///
/// Validates that every referenced parent and the tree exist in the object
/// store before writing, so a stored commit never dangles.
#[derive(Debug)]
pub struct CommitBuilder {
    parent_ids: Vec<CommitId>,
    tree_id: TreeId,
    change_id: Option<ChangeId>,
    author: Signature,
    committer: Option<Signature>,
    description: String,
    has_conflict: bool,
}

impl CommitBuilder {
    /// Start a builder for the given tree and author
    pub fn new(tree_id: TreeId, author: Signature) -> Self {
        Self {
            parent_ids: Vec::new(),
            tree_id,
            change_id: None,
            author,
            committer: None,
            description: String::new(),
            has_conflict: false,
        }
    }

    /// Set parent commits
    pub fn parents(mut self, parent_ids: Vec<CommitId>) -> Self {
        self.parent_ids = parent_ids;
        self
    }

    /// Carry an existing change id (a rewrite); omitted means a fresh change
    pub fn change_id(mut self, change_id: ChangeId) -> Self {
        self.change_id = Some(change_id);
        self
    }

    /// Set the committer; defaults to the author
    pub fn committer(mut self, committer: Signature) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the commit as conflicted
    pub fn has_conflict(mut self, has_conflict: bool) -> Self {
        self.has_conflict = has_conflict;
        self
    }

    /// Validate references and write the commit
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidReference`] if a parent or the tree is
    /// absent from the object store.
    pub fn write(self, store: &dyn ObjectStore) -> Result<Commit> {
        for parent in &self.parent_ids {
            if !store.has(parent.as_str())? {
                return Err(EngineError::invalid_reference(format!(
                    "parent commit {} not in object store",
                    parent
                )));
            }
        }
        if !store.has(self.tree_id.as_str())? {
            return Err(EngineError::invalid_reference(format!(
                "tree {} not in object store",
                self.tree_id
            )));
        }

        let record = CommitRecord {
            parent_ids: self.parent_ids,
            tree_id: self.tree_id,
            change_id: self.change_id.unwrap_or_else(ChangeId::generate),
            author: self.author.clone(),
            committer: self.committer.unwrap_or(self.author),
            description: self.description,
            has_conflict: self.has_conflict,
        };
        let id = CommitId::new(put_json(store, &record)?);
        Ok(Commit {
            id,
            parent_ids: record.parent_ids,
            tree_id: record.tree_id,
            change_id: record.change_id,
            author: record.author,
            committer: record.committer,
            description: record.description,
            has_conflict: record.has_conflict,
        })
    }
}

/// Check whether `ancestor` is an ancestor of `descendant` (strictly)
pub fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: &CommitId,
    descendant: &CommitId,
) -> Result<bool> {
    if ancestor == descendant {
        return Ok(false);
    }
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([descendant.clone()]);
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let commit = Commit::load(store, &id)?;
        for parent in commit.parent_ids {
            if &parent == ancestor {
                return Ok(true);
            }
            queue.push_back(parent);
        }
    }
    Ok(false)
}

/// Reduce a set of commits to its maximal elements under the ancestor order
///
/// Any candidate reachable through the parent links of another candidate is
/// dropped. This is the head-pruning step of view merging: after unioning
/// head sets, superseded commits stop being heads without becoming
/// unreachable.
pub fn heads_of(store: &dyn ObjectStore, candidates: &BTreeSet<CommitId>) -> Result<BTreeSet<CommitId>> {
    // Walk ancestors of all candidates; any candidate reached is not a head.
    let mut reached = HashSet::new();
    let mut queue: VecDeque<CommitId> = candidates.iter().cloned().collect();
    let mut visited = HashSet::new();
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let commit = Commit::load(store, &id)?;
        for parent in commit.parent_ids {
            reached.insert(parent.clone());
            queue.push_back(parent);
        }
    }
    Ok(candidates
        .iter()
        .filter(|id| !reached.contains(*id))
        .cloned()
        .collect())
}

/// Find a common ancestor of two commits, if any
///
/// Used to pick the merge base for auto-merge commits when a view merge
/// finds both sides moved the same name. Prefers the ancestor closest to
/// `a` in breadth-first order.
pub fn common_ancestor(
    store: &dyn ObjectStore,
    a: &CommitId,
    b: &CommitId,
) -> Result<Option<CommitId>> {
    let mut ancestors_of_a = HashSet::new();
    let mut queue = VecDeque::from([a.clone()]);
    while let Some(id) = queue.pop_front() {
        if !ancestors_of_a.insert(id.clone()) {
            continue;
        }
        let commit = Commit::load(store, &id)?;
        queue.extend(commit.parent_ids);
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([b.clone()]);
    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        if ancestors_of_a.contains(&id) {
            return Ok(Some(id));
        }
        let commit = Commit::load(store, &id)?;
        queue.extend(commit.parent_ids);
    }
    Ok(None)
}
