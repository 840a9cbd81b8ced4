//! Repository facade
//!
//! [`Repo`] ties the object store, the operation log, the content merger,
//! and the user configuration into one handle. The on-disk state lives under
//! `<workspace root>/.tidemark/`:
//!
//! ```text
//! .tidemark/
//!   repo.json                user config
//!   objects/<xx>/<rest>      content-addressed store
//!   tmp/                     staging for atomic renames
//!   op_store/operations/     operation records
//!   op_store/heads/          head markers
//! ```
//!
//! All reads go through [`Repo::resolve_heads`]: if concurrent writers left
//! multiple head markers, the divergent views are merged into a merge
//! operation right there, so every caller observes a single consistent view.

use crate::commit::{Commit, Signature};
use crate::content_merge::{ContentMerger, LineMerger};
use crate::error::{EngineError, Result};
use crate::ids::{CommitId, OperationId};
use crate::op_store::{OpStore, Operation};
use crate::store::{FileStore, ObjectStore};
use crate::transaction::Transaction;
use crate::tree::{ConflictSide, Tree, TreeEntry};
use crate::view::{merge_views, View};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Name of the repository state directory inside the workspace root
pub const STATE_DIR: &str = ".tidemark";

/// Default cap on snapshotted file size (100 MB)
const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Persisted repository configuration (`.tidemark/repo.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Name recorded on commits and operations
    pub user_name: String,
    /// Email recorded on commits
    pub user_email: String,
    /// Files larger than this are rejected by the snapshot scanner
    pub max_file_size: u64,
    /// Extra ignore patterns applied when scanning, gitignore syntax
    pub ignore_patterns: Vec<String>,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            user_name: "unknown".to_string(),
            user_email: "unknown@localhost".to_string(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            ignore_patterns: Vec::new(),
        }
    }
}

/// Handle to an initialized repository
pub struct Repo {
    root: PathBuf,
    store: FileStore,
    op_store: OpStore,
    merger: Box<dyn ContentMerger>,
    config: RepoConfig,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo").field("root", &self.root).finish()
    }
}

impl Repo {
    /// Initialize a new repository in `root` with default configuration
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        Self::init_with_config(root.into(), RepoConfig::default())
    }

    /// Initialize a new repository in `root`
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::RepoAlreadyExists`] if `root` already carries a
    /// state directory.
    #[instrument(skip(config))]
    pub fn init_with_config(root: impl Into<PathBuf> + std::fmt::Debug, config: RepoConfig) -> Result<Self> {
        let root = root.into();
        let state = root.join(STATE_DIR);
        if state.exists() {
            return Err(EngineError::RepoAlreadyExists(root));
        }

        let store = FileStore::init(&state)?;
        let (op_store, _root_op) = OpStore::init(state.join("op_store"))?;
        fs::write(state.join("repo.json"), serde_json::to_vec_pretty(&config)?)?;

        info!("Initialized repository at {:?}", root);
        Ok(Self {
            root,
            store,
            op_store,
            merger: Box::new(LineMerger),
            config,
        })
    }

    /// Open an existing repository rooted at `root`
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let state = root.join(STATE_DIR);
        let config_bytes = fs::read(state.join("repo.json"))
            .map_err(|_| EngineError::RepoNotInitialized(root.clone()))?;
        let config: RepoConfig = serde_json::from_slice(&config_bytes)?;

        Ok(Self {
            store: FileStore::load(&state)?,
            op_store: OpStore::load(state.join("op_store"))?,
            merger: Box::new(LineMerger),
            root,
            config,
        })
    }

    /// Workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The content-addressed object store
    pub fn store(&self) -> &dyn ObjectStore {
        &self.store
    }

    /// The operation log
    pub fn op_store(&self) -> &OpStore {
        &self.op_store
    }

    /// The content merger used for tree merges and checkout materialization
    pub fn merger(&self) -> &dyn ContentMerger {
        self.merger.as_ref()
    }

    /// Repository configuration
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// A signature for the configured user, stamped now
    pub fn actor(&self) -> Signature {
        Signature::now(&self.config.user_name, &self.config.user_email)
    }

    /// Resolve the operation heads to a single operation
    ///
    /// With one head marker this is a plain read. With several (concurrent
    /// writers raced), the divergent views are merged pairwise, three-way
    /// against their common ancestor operation's view, and a merge
    /// operation is published, repeating until one head remains. Deterministic
    /// because heads are taken in sorted order.
    #[instrument(skip(self))]
    pub fn resolve_heads(&self) -> Result<Operation> {
        resolve_op_heads(&self.store, &self.op_store, self.merger.as_ref(), &self.actor())
    }

    /// The current repository view, after resolving any divergent heads
    pub fn current_view(&self) -> Result<View> {
        Ok(self.resolve_heads()?.view)
    }

    /// Start a transaction based on the current (resolved) operation
    pub fn start_transaction(&self, description: impl Into<String>) -> Result<Transaction<'_>> {
        let base_op = self.resolve_heads()?;
        Ok(Transaction::new(
            &self.store,
            &self.op_store,
            self.merger.as_ref(),
            self.actor(),
            base_op,
            description,
        ))
    }

    /// All operations reachable from the current heads, most recent first
    pub fn log_operations(&self) -> Result<Vec<Operation>> {
        let heads = self.op_store.head_ids()?;
        self.op_store.ancestors(&heads)
    }

    /// Undo an operation by restoring its parent's view
    ///
    /// Publishes a *new* operation whose view is a content-identical copy of
    /// the target's first parent's view. History only grows: the undone
    /// operation stays in the log, and undoing an undo restores again.
    #[instrument(skip(self))]
    pub fn undo(&self, op_id: &OperationId) -> Result<Operation> {
        let target = self.op_store.read_operation(op_id)?;
        let restored = match target.parent_ids.first() {
            Some(parent_id) => self.op_store.read_operation(parent_id)?.view,
            None => View::empty(),
        };

        let base = self.resolve_heads()?;
        let parents = vec![base.id.clone()];
        let op = self.op_store.write_operation(
            parents.clone(),
            restored,
            format!("undo operation {}", target.id.short()),
        )?;
        self.op_store.advance_heads(&op.id, &parents)?;
        info!("Undid operation {} via {}", target.id.short(), op.id.short());
        Ok(op)
    }

    /// Drop operations unreachable from the current heads
    ///
    /// Normal engine operation never strands an operation; unreachable
    /// records appear only after interrupted writes. Returns the number
    /// removed.
    #[instrument(skip(self))]
    pub fn gc_operations(&self) -> Result<usize> {
        let heads = self.op_store.head_ids()?;
        let reachable: HashSet<OperationId> = self
            .op_store
            .ancestors(&heads)?
            .into_iter()
            .map(|op| op.id)
            .collect();

        let mut removed = 0;
        for id in self.op_store.list_operations()? {
            if !reachable.contains(&id) {
                self.op_store.remove_operation(&id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} unreachable operations", removed);
        }
        Ok(removed)
    }

    /// Drop objects unreachable from any view in the operation log
    ///
    /// Walks every reachable operation's view, every commit reachable from
    /// its heads and named targets, and every tree and blob those commits
    /// reference; everything else is swept. Views of *ancestor* operations
    /// count as roots too, so undo targets stay restorable. Returns the
    /// number of objects removed.
    #[instrument(skip(self))]
    pub fn gc_objects(&self) -> Result<usize> {
        let heads = self.op_store.head_ids()?;
        let ops = self.op_store.ancestors(&heads)?;

        let mut live = HashSet::new();
        let mut commit_queue: Vec<CommitId> = Vec::new();
        for op in &ops {
            commit_queue.extend(op.view.head_ids.iter().cloned());
            commit_queue.extend(op.view.bookmarks.values().cloned());
            commit_queue.extend(op.view.changes.values().cloned());
            commit_queue.extend(op.view.wc_commits.values().cloned());
        }

        let mut visited = HashSet::new();
        while let Some(commit_id) = commit_queue.pop() {
            if !visited.insert(commit_id.clone()) {
                continue;
            }
            live.insert(commit_id.as_str().to_string());
            let commit = Commit::load(&self.store, &commit_id)?;
            live.insert(commit.tree_id.as_str().to_string());
            mark_tree_blobs(&commit.tree(&self.store)?, &mut live);
            commit_queue.extend(commit.parent_ids);
        }

        let mut removed = 0;
        for hash in self.store.list()? {
            if !live.contains(&hash) {
                self.store.remove(&hash)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} unreachable objects", removed);
        }
        Ok(removed)
    }
}

/// Merge divergent operation heads down to a single operation
///
/// With one head marker this is a plain read. With several (concurrent
/// writers raced), the two lexicographically-first heads are merged
/// three-way against their common ancestor operation's view and a merge
/// operation is published, repeating until one head remains. Deterministic
/// because heads are taken in sorted order.
pub(crate) fn resolve_op_heads(
    store: &dyn ObjectStore,
    op_store: &OpStore,
    merger: &dyn ContentMerger,
    actor: &Signature,
) -> Result<Operation> {
    loop {
        let heads = op_store.head_ids()?;
        if let [single] = heads.as_slice() {
            return op_store.read_operation(single);
        }

        let a = op_store.read_operation(&heads[0])?;
        let b = op_store.read_operation(&heads[1])?;
        let ancestor_view = match op_store.common_ancestor(&a.id, &b.id)? {
            Some(id) => op_store.read_operation(&id)?.view,
            None => View::empty(),
        };
        let merged = merge_views(store, merger, actor, &ancestor_view, &a.view, &b.view)?;
        let parents = vec![a.id.clone(), b.id.clone()];
        let op =
            op_store.write_operation(parents.clone(), merged, "merge concurrent operations")?;
        op_store.advance_heads(&op.id, &parents)?;
        debug!(
            "Merged divergent operations {} and {} into {}",
            a.id.short(),
            b.id.short(),
            op.id.short()
        );
    }
}

fn mark_tree_blobs(tree: &Tree, live: &mut HashSet<String>) {
    for (_, entry) in tree.iter() {
        match entry {
            TreeEntry::File { id, .. } => {
                live.insert(id.as_str().to_string());
            }
            TreeEntry::Symlink { .. } => {}
            TreeEntry::Conflict { base, left, right } => {
                for side in [base, left, right].into_iter().flatten() {
                    if let ConflictSide::File { id, .. } = side {
                        live.insert(id.as_str().to_string());
                    }
                }
            }
        }
    }
}
