//! # Tidemark - history and state engine for a snapshot-first VCS
//!
//! A library implementing the repository model of a snapshot-first version
//! control system: immutable content-addressed commits, stable change
//! identities that survive rewrites, views over the commit graph, an
//! append-only operation log, and a working-copy snapshot engine.
//!
//! ## Overview
//!
//! Tidemark keeps all repository-visible state in a [`View`]: the set of
//! head commits, bookmark targets, the change-id table, and per-workspace
//! working-copy bindings. Views are immutable values; every mutation runs in
//! a [`Transaction`] and is published as an [`Operation`], so the
//! repository's own history has history, and any operation can be undone by
//! publishing its ancestor's view again.
//!
//! - Create immutable commits over flat tree manifests
//! - Rewrite (amend) commits while keeping their stable change identity
//! - Snapshot a working directory into its bound commit, amending in place
//! - Merge concurrent writers' views without locks: divergence becomes
//!   merge commits and merge operations, never an error
//! - Walk and undo the operation log
//! - Garbage-collect unreachable operations and objects explicitly
//!
//! ## Architecture
//!
//! - **Content-Addressable Storage**: commits, trees, and file blobs are
//!   stored by their SHA-256 hash ([`ObjectStore`]), making writes idempotent
//!   and collision-free across concurrent processes
//! - **Change Identity**: a commit's [`ChangeId`] is generated once and
//!   carried through every rewrite, decoupling "what the work is" from
//!   "which commit currently realizes it"
//! - **Operation Log**: every view transition is an append-only [`Operation`]
//!   record; head markers are swapped without locks and forks are merged on
//!   the next read
//! - **Conflicts as Data**: unresolvable merges produce commits whose trees
//!   carry conflict entries; nothing in the engine refuses a merge
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tidemark::{Repo, Workspace};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Initialize a repository in the current directory
//! let repo = Repo::init("./my_project")?;
//!
//! // Snapshot the working directory into its working-copy commit
//! let workspace = Workspace::default_in(&repo);
//! let outcome = workspace.snapshot(&repo)?;
//! println!("Working copy at {}", outcome.commit_id().short());
//!
//! // Point a bookmark at it
//! let mut tx = repo.start_transaction("set main")?;
//! tx.set_bookmark("main", outcome.commit_id().clone());
//! tx.commit()?;
//!
//! // Walk the operation log
//! for op in repo.log_operations()? {
//!     println!("{}", op.display_format());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Views
//!
//! A [`View`] is everything the repository points at: heads, bookmarks, the
//! change table, and workspace bindings. Two views merge three-way against
//! their common ancestor; per name, an unchanged side yields and a double
//! move synthesizes a merge commit. Merging is commutative and loses no
//! commit that either side referenced.
//!
//! ### Operations and Undo
//!
//! Every transaction commit appends an [`Operation`] carrying the complete
//! resulting view. Undo is itself an operation whose view copies the target's
//! parent: history only grows, and undo is always undoable.
//!
//! ### Working-copy snapshots
//!
//! The working directory is input, not state. [`Workspace::snapshot`] scans
//! disk and amends the bound working-copy commit in place: same change id,
//! same parents, new tree. Repeated snapshots of an unchanged directory are
//! no-ops.
//!
//! ## Concurrency
//!
//! No cross-process locks anywhere. Object writes are idempotent by
//! content addressing; operation publication uses head-marker files whose
//! races produce forks, not corruption; forks are merged deterministically
//! by the next reader. A transaction that loses a race still publishes, and
//! its commit returns the merge operation that joins the fork.
//!
//! ## Error Handling
//!
//! All operations return `Result<T, EngineError>`. Concurrent modification
//! and content conflicts are never errors; what remains are storage faults,
//! dangling references, and corruption, classified by
//! [`EngineError::is_recoverable`] and [`EngineError::is_corruption`].
//!
//! ## Module Organization
//!
//! - [`repo`]: repository facade, transactions, op log, undo, gc
//! - [`working_copy`]: workspace scanner, snapshot engine, checkout
//! - [`view`]: views and the three-way view merge
//! - [`op_store`]: operation records and the head-marker protocol
//! - [`transaction`]: mutable view edits and optimistic commit
//! - [`commit`]: commits, the commit builder, DAG queries
//! - [`tree`]: tree manifests, diff, three-way tree merge
//! - [`content_merge`]: file content merging and conflict markers
//! - [`store`]: content-addressed object stores
//! - [`ids`]: identifier newtypes
//! - [`error`]: error types and handling

// Public API modules
pub mod commit;
pub mod content_merge;
pub mod error;
pub mod ids;
pub mod op_store;
pub mod repo;
pub mod store;
pub mod transaction;
pub mod tree;
pub mod view;
pub mod working_copy;

// Re-export main types for convenience
pub use commit::{Commit, CommitBuilder, Signature};
pub use content_merge::{ContentMerger, LineMerger, MergeOutcome};
pub use error::{EngineError, Result};
pub use ids::{ChangeId, CommitId, FileId, OperationId, TreeId, WorkspaceId};
pub use op_store::{OpStore, Operation};
pub use repo::{Repo, RepoConfig};
pub use store::{FileStore, MemoryStore, ObjectStore};
pub use transaction::Transaction;
pub use tree::{ConflictSide, Tree, TreeDiffEntry, TreeEntry};
pub use view::{merge_views, View, ViewDiff};
pub use working_copy::{SnapshotOutcome, TreeScanner, Workspace};
