//! Views: immutable snapshots of repository-visible state
//!
//! A [`View`] captures everything a repository "points at" at one moment:
//! the set of head commits, bookmark targets, the change-id indirection
//! table, and per-workspace working-copy bindings. Views are plain immutable
//! values, created only as the output of applying an operation and never
//! edited in place.
//!
//! The three-way [`merge_views`] algorithm is what makes concurrent writers
//! safe. It merges each mapping independently and it never loses data: when
//! both sides moved the same name to different commits, the name is pointed
//! at a freshly created merge commit whose parents are both sides. Merging
//! is deterministic (synthesized merge commits derive their change id and
//! timestamp from their inputs), so merging the same views in either order
//! produces identical results.

use crate::commit::{common_ancestor, heads_of, Commit, CommitBuilder, Signature};
use crate::content_merge::ContentMerger;
use crate::error::Result;
use crate::ids::{hash_hex, ChangeId, CommitId, WorkspaceId};
use crate::store::ObjectStore;
use crate::tree::{merge_trees, Tree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Immutable snapshot of repository-visible pointers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// Commits with no visible descendant
    pub head_ids: BTreeSet<CommitId>,
    /// Named bookmark targets
    pub bookmarks: BTreeMap<String, CommitId>,
    /// Current commit realizing each visible change
    pub changes: BTreeMap<ChangeId, CommitId>,
    /// Working-copy commit bound to each workspace
    pub wc_commits: BTreeMap<WorkspaceId, CommitId>,
}

impl View {
    /// Create an empty view (the state of a freshly initialized repository)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a head commit
    pub fn add_head(&mut self, id: CommitId) {
        self.head_ids.insert(id);
    }

    /// Remove a head commit
    pub fn remove_head(&mut self, id: &CommitId) {
        self.head_ids.remove(id);
    }

    /// Point a bookmark at a commit
    pub fn set_bookmark(&mut self, name: impl Into<String>, target: CommitId) {
        self.bookmarks.insert(name.into(), target);
    }

    /// Delete a bookmark
    pub fn remove_bookmark(&mut self, name: &str) -> Option<CommitId> {
        self.bookmarks.remove(name)
    }

    /// Point a change id at its current commit
    pub fn set_change(&mut self, change_id: ChangeId, commit_id: CommitId) {
        self.changes.insert(change_id, commit_id);
    }

    /// Remove a change from the visible set (abandon)
    pub fn remove_change(&mut self, change_id: &ChangeId) -> Option<CommitId> {
        self.changes.remove(change_id)
    }

    /// Current commit for a change id
    pub fn get_change(&self, change_id: &ChangeId) -> Option<&CommitId> {
        self.changes.get(change_id)
    }

    /// Bind a workspace to a working-copy commit
    pub fn set_wc_commit(&mut self, workspace_id: WorkspaceId, commit_id: CommitId) {
        self.wc_commits.insert(workspace_id, commit_id);
    }

    /// Working-copy commit bound to a workspace
    pub fn get_wc_commit(&self, workspace_id: &WorkspaceId) -> Option<&CommitId> {
        self.wc_commits.get(workspace_id)
    }

    /// Compute the symmetric difference from `self` to `other`
    pub fn diff(&self, other: &View) -> ViewDiff {
        ViewDiff {
            added_heads: other.head_ids.difference(&self.head_ids).cloned().collect(),
            removed_heads: self.head_ids.difference(&other.head_ids).cloned().collect(),
            bookmarks: diff_map(&self.bookmarks, &other.bookmarks),
            changes: diff_map(&self.changes, &other.changes),
            wc_commits: diff_map(&self.wc_commits, &other.wc_commits),
        }
    }
}

/// One changed mapping entry: name, old target, new target
pub type TargetChange<K> = (K, Option<CommitId>, Option<CommitId>);

/// Symmetric difference between two views
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewDiff {
    /// Heads present only in the target view
    pub added_heads: Vec<CommitId>,
    /// Heads present only in the source view
    pub removed_heads: Vec<CommitId>,
    /// Bookmarks whose target changed (old, new; `None` = absent)
    pub bookmarks: Vec<TargetChange<String>>,
    /// Change-id mappings that changed
    pub changes: Vec<TargetChange<ChangeId>>,
    /// Workspace bindings that changed
    pub wc_commits: Vec<TargetChange<WorkspaceId>>,
}

impl ViewDiff {
    /// Whether the two views are identical
    pub fn is_empty(&self) -> bool {
        self.added_heads.is_empty()
            && self.removed_heads.is_empty()
            && self.bookmarks.is_empty()
            && self.changes.is_empty()
            && self.wc_commits.is_empty()
    }
}

fn diff_map<K: Ord + Clone>(
    before: &BTreeMap<K, CommitId>,
    after: &BTreeMap<K, CommitId>,
) -> Vec<TargetChange<K>> {
    let mut out = Vec::new();
    for (key, old) in before {
        match after.get(key) {
            None => out.push((key.clone(), Some(old.clone()), None)),
            Some(new) if new != old => {
                out.push((key.clone(), Some(old.clone()), Some(new.clone())))
            }
            Some(_) => {}
        }
    }
    for (key, new) in after {
        if !before.contains_key(key) {
            out.push((key.clone(), None, Some(new.clone())));
        }
    }
    out
}

/// Three-way merge of two views against their common ancestor view
///
/// Each mapping merges independently:
///
/// - **Heads**: three-way set merge (additions from both sides are kept,
///   removals from either side honored), then every named target is added
///   as a reachability candidate and the set is reduced to its maximal
///   elements under commit ancestry.
/// - **Bookmarks / changes / workspace bindings**: per name, an unchanged
///   side yields to the changed side; if both sides moved the name to
///   different commits, the name is pointed at a synthesized merge commit of
///   the two (never dropped, never an error). A removal on one side loses to
///   a move on the other side: the moved-to commit survives.
///
/// Every commit that was a head or a named target on either input remains
/// reachable in the result.
pub fn merge_views(
    store: &dyn ObjectStore,
    merger: &dyn ContentMerger,
    actor: &Signature,
    ancestor: &View,
    left: &View,
    right: &View,
) -> Result<View> {
    let mut merged = View::empty();

    merged.bookmarks = merge_map(
        store,
        merger,
        actor,
        &ancestor.bookmarks,
        &left.bookmarks,
        &right.bookmarks,
    )?;
    merged.changes = merge_change_map(
        store,
        merger,
        actor,
        &ancestor.changes,
        &left.changes,
        &right.changes,
    )?;
    merged.wc_commits = merge_map(
        store,
        merger,
        actor,
        &ancestor.wc_commits,
        &left.wc_commits,
        &right.wc_commits,
    )?;

    // Three-way head set merge: keep what either side added, drop what
    // either side removed (a rewrite removes the superseded commit).
    let mut candidates: BTreeSet<CommitId> = ancestor
        .head_ids
        .iter()
        .filter(|id| left.head_ids.contains(*id) && right.head_ids.contains(*id))
        .cloned()
        .collect();
    candidates.extend(left.head_ids.difference(&ancestor.head_ids).cloned());
    candidates.extend(right.head_ids.difference(&ancestor.head_ids).cloned());

    // Named targets must stay reachable; any that aren't covered by an
    // existing head become heads themselves.
    candidates.extend(merged.bookmarks.values().cloned());
    candidates.extend(merged.changes.values().cloned());
    candidates.extend(merged.wc_commits.values().cloned());

    merged.head_ids = heads_of(store, &candidates)?;
    debug!(
        heads = merged.head_ids.len(),
        bookmarks = merged.bookmarks.len(),
        changes = merged.changes.len(),
        "Merged views"
    );
    Ok(merged)
}

/// Merge one name→commit mapping three-way
fn merge_map<K: Ord + Clone>(
    store: &dyn ObjectStore,
    merger: &dyn ContentMerger,
    actor: &Signature,
    ancestor: &BTreeMap<K, CommitId>,
    left: &BTreeMap<K, CommitId>,
    right: &BTreeMap<K, CommitId>,
) -> Result<BTreeMap<K, CommitId>> {
    let mut keys: Vec<&K> = ancestor.keys().collect();
    keys.extend(left.keys());
    keys.extend(right.keys());
    keys.sort();
    keys.dedup();

    let mut merged = BTreeMap::new();
    for key in keys {
        let b = ancestor.get(key);
        let l = left.get(key);
        let r = right.get(key);

        let target = match (b, l, r) {
            _ if l == r => l.cloned(),
            _ if l == b => r.cloned(),
            _ if r == b => l.cloned(),
            // Both sides moved the name to different commits
            (_, Some(lc), Some(rc)) => {
                Some(auto_merge_commit(store, merger, actor, b, lc, rc, None)?)
            }
            // Moved on one side, removed on the other: the move wins
            (_, Some(lc), None) => Some(lc.clone()),
            (_, None, Some(rc)) => Some(rc.clone()),
            (_, None, None) => None,
        };
        if let Some(target) = target {
            merged.insert(key.clone(), target);
        }
    }
    Ok(merged)
}

fn merge_change_map(
    store: &dyn ObjectStore,
    merger: &dyn ContentMerger,
    actor: &Signature,
    ancestor: &BTreeMap<ChangeId, CommitId>,
    left: &BTreeMap<ChangeId, CommitId>,
    right: &BTreeMap<ChangeId, CommitId>,
) -> Result<BTreeMap<ChangeId, CommitId>> {
    // Per-key merge where the synthesized commit must keep the key's change
    // id, so the change still maps to "its" commit afterwards.
    let mut keys: Vec<&ChangeId> = ancestor.keys().collect();
    keys.extend(left.keys());
    keys.extend(right.keys());
    keys.sort();
    keys.dedup();

    let mut merged = BTreeMap::new();
    for key in keys {
        let b = ancestor.get(key);
        let l = left.get(key);
        let r = right.get(key);
        let target = match (b, l, r) {
            _ if l == r => l.cloned(),
            _ if l == b => r.cloned(),
            _ if r == b => l.cloned(),
            (_, Some(lc), Some(rc)) => {
                Some(auto_merge_commit(store, merger, actor, b, lc, rc, Some(key))?)
            }
            (_, Some(lc), None) => Some(lc.clone()),
            (_, None, Some(rc)) => Some(rc.clone()),
            (_, None, None) => None,
        };
        if let Some(target) = target {
            merged.insert(key.clone(), target);
        }
    }
    Ok(merged)
}

/// Synthesize a merge commit joining two divergent targets of one name
///
/// Deterministic by construction: the two sides are ordered by commit id,
/// the timestamp is the later of the two committer timestamps, and the
/// change id (when not forced by the caller) is derived from the pair. The
/// resulting commit, and therefore the merged view, is identical no matter
/// which writer performs the merge or in which argument order.
fn auto_merge_commit(
    store: &dyn ObjectStore,
    merger: &dyn ContentMerger,
    actor: &Signature,
    ancestor_target: Option<&CommitId>,
    left_id: &CommitId,
    right_id: &CommitId,
    keep_change: Option<&ChangeId>,
) -> Result<CommitId> {
    // Canonical side order makes merging commutative.
    let (first_id, second_id) = if left_id <= right_id {
        (left_id, right_id)
    } else {
        (right_id, left_id)
    };

    // One target descending from the other is not a divergence.
    if crate::commit::is_ancestor(store, first_id, second_id)? {
        return Ok(second_id.clone());
    }
    if crate::commit::is_ancestor(store, second_id, first_id)? {
        return Ok(first_id.clone());
    }

    let first = Commit::load(store, first_id)?;
    let second = Commit::load(store, second_id)?;

    let base_id = match ancestor_target {
        Some(id) => Some(id.clone()),
        None => common_ancestor(store, first_id, second_id)?,
    };
    let base_tree = match &base_id {
        Some(id) => Commit::load(store, id)?.tree(store)?,
        None => Tree::empty(),
    };

    let merged_tree = merge_trees(
        store,
        merger,
        &base_tree,
        &first.tree(store)?,
        &second.tree(store)?,
    )?;
    let has_conflict = merged_tree.has_conflict();
    let tree_id = merged_tree.store(store)?;

    let change_id = match keep_change {
        Some(id) => id.clone(),
        None if first.change_id == second.change_id => first.change_id.clone(),
        None => ChangeId::new(
            &hash_hex(format!("{}+{}", first_id, second_id).as_bytes())[..32],
        ),
    };

    let timestamp = first.committer.timestamp.max(second.committer.timestamp);
    let signature = Signature {
        name: actor.name.clone(),
        email: actor.email.clone(),
        timestamp,
    };

    let commit = CommitBuilder::new(tree_id, signature)
        .parents(vec![first_id.clone(), second_id.clone()])
        .change_id(change_id)
        .description(format!("merge of {} and {}", first_id.short(), second_id.short()))
        .has_conflict(has_conflict)
        .write(store)?;
    debug!(
        "Auto-merged {} and {} into {}{}",
        first_id.short(),
        second_id.short(),
        commit.id.short(),
        if has_conflict { " (conflict)" } else { "" }
    );
    Ok(commit.id)
}
