//! Tree manifests and three-way tree merging
//!
//! A [`Tree`] is a flat, ordered manifest mapping repo-relative slash paths
//! to entries. Trees are immutable values stored content-addressed in the
//! object store; the engine compares directory states by comparing tree ids.
//!
//! Conflicts are data, not errors: when a three-way merge cannot losslessly
//! combine two sides of a path, the merged tree records a
//! [`TreeEntry::Conflict`] carrying all sides. A tree containing any conflict
//! entry is a conflicted tree and commits built on it carry the conflict
//! flag. Only materialization into a working copy renders markers; the graph
//! itself never refuses a merge.

use crate::content_merge::{ContentMerger, MergeOutcome};
use crate::error::Result;
use crate::ids::{FileId, TreeId};
use crate::store::{get_json, put_json, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One side of an unresolved path conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictSide {
    /// A regular file
    File {
        /// Blob hash
        id: FileId,
        /// Unix executable bit
        executable: bool,
    },
    /// A symbolic link
    Symlink {
        /// Link target
        target: String,
    },
}

/// Entry for one path in a tree manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeEntry {
    /// A regular file
    File {
        /// Blob hash
        id: FileId,
        /// Unix executable bit
        executable: bool,
    },
    /// A symbolic link
    Symlink {
        /// Link target
        target: String,
    },
    /// An unresolved merge conflict. `None` on a side means the path was
    /// absent (deleted) there. Conflicts do not nest; re-merging an already
    /// conflicted entry degrades to its representable sides.
    Conflict {
        /// State at the common ancestor
        base: Option<ConflictSide>,
        /// State on the first merged side
        left: Option<ConflictSide>,
        /// State on the second merged side
        right: Option<ConflictSide>,
    },
}

impl TreeEntry {
    /// Whether this entry is an unresolved conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, TreeEntry::Conflict { .. })
    }

    fn as_side(&self) -> Option<ConflictSide> {
        match self {
            TreeEntry::File { id, executable } => Some(ConflictSide::File {
                id: id.clone(),
                executable: *executable,
            }),
            TreeEntry::Symlink { target } => Some(ConflictSide::Symlink {
                target: target.clone(),
            }),
            TreeEntry::Conflict { .. } => None,
        }
    }
}

/// Immutable flat manifest of a directory state
///
/// Paths are repo-relative, `/`-separated, and sorted (BTreeMap), so the
/// serialized form, and therefore the tree id, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    entries: BTreeMap<String, TreeEntry>,
}

/// A change to one path between two trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeDiffEntry {
    /// Path exists only in the target tree
    Added(String, TreeEntry),
    /// Path exists only in the source tree
    Removed(String, TreeEntry),
    /// Path exists in both with different entries (before, after)
    Modified(String, TreeEntry, TreeEntry),
}

impl Tree {
    /// Create an empty tree
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up a path
    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.get(path)
    }

    /// Insert or replace a path
    pub fn insert(&mut self, path: impl Into<String>, entry: TreeEntry) {
        self.entries.insert(path.into(), entry);
    }

    /// Remove a path
    pub fn remove(&mut self, path: &str) -> Option<TreeEntry> {
        self.entries.remove(path)
    }

    /// Iterate entries in path order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TreeEntry)> {
        self.entries.iter()
    }

    /// Number of paths in the tree
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tree has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any path carries an unresolved conflict
    pub fn has_conflict(&self) -> bool {
        self.entries.values().any(TreeEntry::is_conflict)
    }

    /// Store the tree and return its content id
    pub fn store(&self, store: &dyn ObjectStore) -> Result<TreeId> {
        Ok(TreeId::new(put_json(store, self)?))
    }

    /// Load a tree by id
    pub fn load(store: &dyn ObjectStore, id: &TreeId) -> Result<Self> {
        get_json(store, id.as_str())
    }

    /// Compute the per-path difference from `self` to `other`
    pub fn diff(&self, other: &Tree) -> Vec<TreeDiffEntry> {
        let mut changes = Vec::new();
        for (path, entry) in &self.entries {
            match other.entries.get(path) {
                None => changes.push(TreeDiffEntry::Removed(path.clone(), entry.clone())),
                Some(new_entry) if new_entry != entry => changes.push(TreeDiffEntry::Modified(
                    path.clone(),
                    entry.clone(),
                    new_entry.clone(),
                )),
                Some(_) => {}
            }
        }
        for (path, entry) in &other.entries {
            if !self.entries.contains_key(path) {
                changes.push(TreeDiffEntry::Added(path.clone(), entry.clone()));
            }
        }
        changes.sort_by(|a, b| diff_path(a).cmp(diff_path(b)));
        changes
    }
}

fn diff_path(entry: &TreeDiffEntry) -> &str {
    match entry {
        TreeDiffEntry::Added(p, _)
        | TreeDiffEntry::Removed(p, _)
        | TreeDiffEntry::Modified(p, _, _) => p,
    }
}

/// Three-way merge of two trees against their common base
///
/// Per path: if both sides agree, or only one side changed relative to the
/// base, the result is unambiguous. If both sides changed a file's content,
/// the [`ContentMerger`] decides; a resolved merge stores a new blob, an
/// unresolved one records a [`TreeEntry::Conflict`]. Type mismatches and
/// delete-versus-modify also conflict rather than dropping either side.
/// This function never fails on divergent content.
pub fn merge_trees(
    store: &dyn ObjectStore,
    merger: &dyn ContentMerger,
    base: &Tree,
    left: &Tree,
    right: &Tree,
) -> Result<Tree> {
    let mut paths: Vec<&String> = base.entries.keys().collect();
    paths.extend(left.entries.keys());
    paths.extend(right.entries.keys());
    paths.sort();
    paths.dedup();

    let mut merged = Tree::empty();
    for path in paths {
        let b = base.entries.get(path);
        let l = left.entries.get(path);
        let r = right.entries.get(path);

        let entry = match (b, l, r) {
            _ if l == r => l.cloned(),
            _ if l == b => r.cloned(),
            _ if r == b => l.cloned(),
            // Both sides changed, differently
            (_, Some(le), Some(re)) => Some(merge_entry(store, merger, b, le, re)?),
            // Delete on one side, change on the other: keep the conflict so
            // neither the deletion intent nor the new content is lost
            _ => Some(TreeEntry::Conflict {
                base: b.and_then(TreeEntry::as_side),
                left: l.and_then(TreeEntry::as_side),
                right: r.and_then(TreeEntry::as_side),
            }),
        };

        if let Some(entry) = entry {
            merged.insert(path.clone(), entry);
        }
    }
    Ok(merged)
}

fn merge_entry(
    store: &dyn ObjectStore,
    merger: &dyn ContentMerger,
    base: Option<&TreeEntry>,
    left: &TreeEntry,
    right: &TreeEntry,
) -> Result<TreeEntry> {
    if let (
        TreeEntry::File {
            id: left_id,
            executable: left_exec,
        },
        TreeEntry::File {
            id: right_id,
            executable: right_exec,
        },
    ) = (left, right)
    {
        let base_file = match base {
            None => Some(Vec::new()),
            Some(TreeEntry::File { id, .. }) => Some(store.get(id.as_str())?),
            Some(_) => None,
        };
        if let Some(base_bytes) = base_file {
            let left_bytes = store.get(left_id.as_str())?;
            let right_bytes = store.get(right_id.as_str())?;
            match merger.merge(&base_bytes, &left_bytes, &right_bytes) {
                MergeOutcome::Resolved(bytes) => {
                    let id = FileId::new(store.put(&bytes)?);
                    return Ok(TreeEntry::File {
                        id,
                        executable: *left_exec || *right_exec,
                    });
                }
                MergeOutcome::Conflicted(_) => {}
            }
        }
    }

    Ok(TreeEntry::Conflict {
        base: base.and_then(TreeEntry::as_side),
        left: left.as_side(),
        right: right.as_side(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_merge::LineMerger;
    use crate::store::MemoryStore;

    fn file(store: &MemoryStore, content: &[u8]) -> TreeEntry {
        TreeEntry::File {
            id: FileId::new(store.put(content).unwrap()),
            executable: false,
        }
    }

    #[test]
    fn test_tree_id_is_deterministic() {
        let store = MemoryStore::new();
        let mut a = Tree::empty();
        a.insert("b.txt", file(&store, b"two"));
        a.insert("a.txt", file(&store, b"one"));
        let mut b = Tree::empty();
        b.insert("a.txt", file(&store, b"one"));
        b.insert("b.txt", file(&store, b"two"));
        assert_eq!(a.store(&store).unwrap(), b.store(&store).unwrap());
    }

    #[test]
    fn test_tree_roundtrip() {
        let store = MemoryStore::new();
        let mut tree = Tree::empty();
        tree.insert("src/main.rs", file(&store, b"fn main() {}"));
        tree.insert(
            "link",
            TreeEntry::Symlink {
                target: "src/main.rs".to_string(),
            },
        );
        let id = tree.store(&store).unwrap();
        let loaded = Tree::load(&store, &id).unwrap();
        assert_eq!(loaded, tree);
    }

    #[test]
    fn test_diff() {
        let store = MemoryStore::new();
        let mut before = Tree::empty();
        before.insert("kept", file(&store, b"same"));
        before.insert("gone", file(&store, b"old"));
        before.insert("changed", file(&store, b"v1"));
        let mut after = Tree::empty();
        after.insert("kept", file(&store, b"same"));
        after.insert("changed", file(&store, b"v2"));
        after.insert("new", file(&store, b"fresh"));

        let diff = before.diff(&after);
        assert_eq!(diff.len(), 3);
        assert!(matches!(&diff[0], TreeDiffEntry::Modified(p, _, _) if p == "changed"));
        assert!(matches!(&diff[1], TreeDiffEntry::Removed(p, _) if p == "gone"));
        assert!(matches!(&diff[2], TreeDiffEntry::Added(p, _) if p == "new"));
    }

    #[test]
    fn test_merge_one_side_changed() {
        let store = MemoryStore::new();
        let merger = LineMerger;
        let mut base = Tree::empty();
        base.insert("f", file(&store, b"base\n"));
        let mut left = base.clone();
        left.insert("f", file(&store, b"left\n"));
        let right = base.clone();

        let merged = merge_trees(&store, &merger, &base, &left, &right).unwrap();
        assert_eq!(merged.get("f"), left.get("f"));
        assert!(!merged.has_conflict());
    }

    #[test]
    fn test_merge_divergent_content_conflicts() {
        let store = MemoryStore::new();
        let merger = LineMerger;
        let mut base = Tree::empty();
        base.insert("f", file(&store, b"base\n"));
        let mut left = base.clone();
        left.insert("f", file(&store, b"left\n"));
        let mut right = base.clone();
        right.insert("f", file(&store, b"right\n"));

        let merged = merge_trees(&store, &merger, &base, &left, &right).unwrap();
        assert!(merged.has_conflict());
        match merged.get("f").unwrap() {
            TreeEntry::Conflict { base, left, right } => {
                assert!(base.is_some());
                assert!(left.is_some());
                assert!(right.is_some());
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_disjoint_line_edits_resolve() {
        let store = MemoryStore::new();
        let merger = LineMerger;
        let mut base = Tree::empty();
        base.insert("f", file(&store, b"a\nb\nc\nd\ne\n"));
        let mut left = base.clone();
        left.insert("f", file(&store, b"A\nb\nc\nd\ne\n"));
        let mut right = base.clone();
        right.insert("f", file(&store, b"a\nb\nc\nd\nE\n"));

        let merged = merge_trees(&store, &merger, &base, &left, &right).unwrap();
        assert!(!merged.has_conflict());
        let TreeEntry::File { id, .. } = merged.get("f").unwrap() else {
            panic!("expected file");
        };
        assert_eq!(store.get(id.as_str()).unwrap(), b"A\nb\nc\nd\nE\n");
    }

    #[test]
    fn test_merge_delete_vs_modify_conflicts() {
        let store = MemoryStore::new();
        let merger = LineMerger;
        let mut base = Tree::empty();
        base.insert("f", file(&store, b"base\n"));
        let left = Tree::empty(); // deleted
        let mut right = base.clone();
        right.insert("f", file(&store, b"modified\n"));

        let merged = merge_trees(&store, &merger, &base, &left, &right).unwrap();
        match merged.get("f").unwrap() {
            TreeEntry::Conflict { left, right, .. } => {
                assert!(left.is_none());
                assert!(right.is_some());
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_both_added_same_content() {
        let store = MemoryStore::new();
        let merger = LineMerger;
        let base = Tree::empty();
        let mut left = Tree::empty();
        left.insert("f", file(&store, b"same\n"));
        let mut right = Tree::empty();
        right.insert("f", file(&store, b"same\n"));

        let merged = merge_trees(&store, &merger, &base, &left, &right).unwrap();
        assert!(!merged.has_conflict());
        assert_eq!(merged.get("f"), left.get("f"));
    }
}
