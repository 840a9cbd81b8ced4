//! Working-copy scanning, snapshotting, and checkout
//!
//! A [`Workspace`] is a directory bound to the repository through the view's
//! workspace map. The working copy is input, not state: [`Workspace::snapshot`]
//! reads whatever is on disk and *amends* the bound working-copy commit with
//! the observed tree (same change id, same parents), so repeated edits to
//! the working copy keep collapsing into one commit instead of stacking.
//!
//! Scanning walks the directory with the `ignore` crate (honoring
//! `.gitignore` and the repository's configured patterns, always skipping
//! the state directory) and hashes file contents in parallel with `rayon`.
//! Blobs are written to the object store as they are read; if the snapshot
//! is abandoned they are simply unreachable.

use crate::commit::{Commit, CommitBuilder};
use crate::content_merge::render_conflict;
use crate::error::{EngineError, Result};
use crate::ids::{CommitId, FileId, WorkspaceId};
use crate::op_store::Operation;
use crate::repo::{Repo, STATE_DIR};
use crate::store::ObjectStore;
use crate::tree::{ConflictSide, Tree, TreeEntry};
use ignore::overrides::OverrideBuilder;
use ignore::{WalkBuilder, WalkState};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, trace, warn};

/// Re-scans performed when the directory keeps changing under the scanner
/// before the latest scan is accepted anyway
const MAX_RESCANS: usize = 3;

/// Outcome of a snapshot attempt
#[derive(Debug)]
pub enum SnapshotOutcome {
    /// Disk matched the bound commit's tree; nothing was written
    Clean(CommitId),
    /// The working-copy commit was amended with the observed tree
    Committed {
        /// The new working-copy commit
        commit: Commit,
        /// The operation that published it
        operation: Operation,
    },
}

impl SnapshotOutcome {
    /// The working-copy commit after the snapshot, new or unchanged
    pub fn commit_id(&self) -> &CommitId {
        match self {
            SnapshotOutcome::Clean(id) => id,
            SnapshotOutcome::Committed { commit, .. } => &commit.id,
        }
    }

    /// Whether the snapshot found the working copy unchanged
    pub fn is_clean(&self) -> bool {
        matches!(self, SnapshotOutcome::Clean(_))
    }
}

/// A working directory bound to the repository
#[derive(Debug, Clone)]
pub struct Workspace {
    id: WorkspaceId,
    root: PathBuf,
}

impl Workspace {
    /// Create a workspace handle for `root` under the given name
    pub fn new(id: WorkspaceId, root: impl Into<PathBuf>) -> Self {
        Self {
            id,
            root: root.into(),
        }
    }

    /// The default workspace rooted at the repository root
    pub fn default_in(repo: &Repo) -> Self {
        Self::new(WorkspaceId::default(), repo.root())
    }

    /// Workspace name
    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    /// Directory this workspace scans and materializes into
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot the working directory into the bound working-copy commit
    ///
    /// Scans disk, and if the observed tree differs from the bound commit's
    /// tree, amends the bound commit (same change id, same parents) inside a
    /// transaction. With no existing binding, a fresh change is created. The
    /// scan is repeated while the directory keeps changing underneath, up to
    /// [`MAX_RESCANS`] times; after that the latest scan wins.
    #[instrument(skip(self, repo), fields(workspace = %self.id))]
    pub fn snapshot(&self, repo: &Repo) -> Result<SnapshotOutcome> {
        let store = repo.store();
        let view = repo.current_view()?;
        let bound = match view.get_wc_commit(&self.id) {
            Some(id) => Some(Commit::load(store, id)?),
            None => None,
        };

        let scanner = TreeScanner::new(
            &self.root,
            repo.config().max_file_size,
            repo.config().ignore_patterns.clone(),
        );
        let mut tree = scanner.scan(store)?;
        let mut tree_id = tree.store(store)?;
        for attempt in 0..MAX_RESCANS {
            let rescan = scanner.scan(store)?;
            let rescan_id = rescan.store(store)?;
            if rescan_id == tree_id {
                break;
            }
            trace!(attempt, "Directory changed during scan, retrying");
            tree = rescan;
            tree_id = rescan_id;
        }

        if let Some(bound) = &bound {
            if bound.tree_id == tree_id {
                debug!("Working copy clean at {}", bound.id.short());
                return Ok(SnapshotOutcome::Clean(bound.id.clone()));
            }
        }

        let has_conflict = tree.has_conflict();
        let mut tx = repo.start_transaction("snapshot working copy")?;
        let commit = match &bound {
            Some(bound) => {
                // Amend, don't stack: the new commit replaces the bound one
                // under the same change id and the same parents.
                let commit = CommitBuilder::new(tree_id, repo.actor())
                    .parents(bound.parent_ids.clone())
                    .change_id(bound.change_id.clone())
                    .description(bound.description.clone())
                    .has_conflict(has_conflict)
                    .write(store)?;
                tx.rewrite_commit(&commit);
                commit
            }
            None => {
                let commit = CommitBuilder::new(tree_id, repo.actor())
                    .has_conflict(has_conflict)
                    .write(store)?;
                tx.add_commit(&commit);
                commit
            }
        };
        tx.set_wc_commit(self.id.clone(), commit.id.clone());
        let operation = tx.commit()?;

        info!(
            "Snapshotted workspace {} into {} ({} paths)",
            self.id,
            commit.id.short(),
            tree.len()
        );
        Ok(SnapshotOutcome::Committed { commit, operation })
    }

    /// Snapshot, then return the current repository view
    ///
    /// The consistent-read entry point: any command that inspects repository
    /// state through a workspace first folds pending working-copy edits into
    /// the bound commit, so the returned view always reflects what is on
    /// disk.
    pub fn current_view(&self, repo: &Repo) -> Result<crate::view::View> {
        self.snapshot(repo)?;
        repo.current_view()
    }

    /// Materialize a commit's tree into the workspace and rebind to it
    ///
    /// Pending edits are snapshotted into the bound commit first, so nothing
    /// on disk is lost. Paths tracked by the previously bound commit but
    /// absent from the target are removed; conflict entries are written with
    /// standard markers. The rebinding is published as an operation.
    #[instrument(skip(self, repo, commit), fields(workspace = %self.id, commit = %commit.id.short()))]
    pub fn check_out(&self, repo: &Repo, commit: &Commit) -> Result<Operation> {
        let store = repo.store();
        let target_tree = commit.tree(store)?;

        // Fold pending edits into the bound commit before any file is
        // overwritten; checkout must never destroy work.
        self.snapshot(repo)?;
        let view = repo.current_view()?;

        // Remove files the old binding tracked that the target does not
        if let Some(old_id) = view.get_wc_commit(&self.id) {
            let old_tree = Commit::load(store, old_id)?.tree(store)?;
            for (path, _) in old_tree.iter() {
                if target_tree.get(path).is_none() {
                    match fs::remove_file(self.root.join(path)) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }

        for (path, entry) in target_tree.iter() {
            self.materialize_entry(store, path, entry)?;
        }

        let mut tx = repo.start_transaction(format!("check out commit {}", commit.id.short()))?;
        if view.get_change(&commit.change_id) != Some(&commit.id) {
            tx.add_commit(commit);
        }
        tx.set_wc_commit(self.id.clone(), commit.id.clone());
        let operation = tx.commit()?;

        info!("Checked out {} into workspace {}", commit.id.short(), self.id);
        Ok(operation)
    }

    fn materialize_entry(
        &self,
        store: &dyn ObjectStore,
        path: &str,
        entry: &TreeEntry,
    ) -> Result<()> {
        let disk_path = self.root.join(path);
        if let Some(parent) = disk_path.parent() {
            fs::create_dir_all(parent)?;
        }

        match entry {
            TreeEntry::File { id, executable } => {
                let bytes = store.get(id.as_str())?;
                fs::write(&disk_path, bytes)?;
                set_executable(&disk_path, *executable)?;
            }
            TreeEntry::Symlink { target } => {
                match fs::remove_file(&disk_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                write_symlink(target, &disk_path)?;
            }
            TreeEntry::Conflict { base, left, right } => {
                let rendered = render_conflict(
                    &side_bytes(store, base)?,
                    &side_bytes(store, left)?,
                    &side_bytes(store, right)?,
                );
                fs::write(&disk_path, rendered)?;
            }
        }
        Ok(())
    }
}

fn side_bytes(store: &dyn ObjectStore, side: &Option<ConflictSide>) -> Result<Vec<u8>> {
    match side {
        None => Ok(Vec::new()),
        Some(ConflictSide::File { id, .. }) => store.get(id.as_str()),
        Some(ConflictSide::Symlink { target }) => Ok(target.clone().into_bytes()),
    }
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if executable { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &str, path: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, path)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(target: &str, path: &Path) -> Result<()> {
    // No symlink support; record the target as file content
    fs::write(path, target.as_bytes())?;
    Ok(())
}

/// Directory scanner producing a tree manifest
///
/// Walks with the `ignore` crate's parallel walker, then reads and hashes
/// candidate files with `rayon`. The repository state directory and the
/// configured ignore patterns are always excluded.
#[derive(Debug)]
pub struct TreeScanner {
    root: PathBuf,
    max_file_size: u64,
    ignore_patterns: Vec<String>,
}

impl TreeScanner {
    /// Create a scanner for `root`
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64, ignore_patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            max_file_size,
            ignore_patterns,
        }
    }

    /// Scan the directory into a tree, writing blobs to the store
    #[instrument(skip(self, store), fields(root = ?self.root))]
    pub fn scan(&self, store: &dyn ObjectStore) -> Result<Tree> {
        let mut overrides = OverrideBuilder::new(&self.root);
        overrides
            .add(&format!("!{}", STATE_DIR))
            .map_err(|e| EngineError::internal(format!("bad override pattern: {}", e)))?;
        for pattern in &self.ignore_patterns {
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| EngineError::internal(format!("bad ignore pattern {:?}: {}", pattern, e)))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| EngineError::internal(format!("building overrides: {}", e)))?;

        let found: Mutex<Vec<(String, PathBuf, bool)>> = Mutex::new(Vec::new());
        let walk_errors: Mutex<Vec<EngineError>> = Mutex::new(Vec::new());

        WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .follow_links(false)
            .overrides(overrides)
            .threads(num_cpus::get())
            .build_parallel()
            .run(|| {
                Box::new(|entry| {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            warn!("Skipping unreadable path: {}", e);
                            return WalkState::Continue;
                        }
                    };
                    let Some(file_type) = entry.file_type() else {
                        return WalkState::Continue;
                    };
                    if file_type.is_dir() {
                        return WalkState::Continue;
                    }
                    match repo_relative(&self.root, entry.path()) {
                        Ok(rel) => {
                            found.lock().push((
                                rel,
                                entry.path().to_path_buf(),
                                file_type.is_symlink(),
                            ));
                        }
                        Err(e) => {
                            walk_errors.lock().push(e);
                            return WalkState::Quit;
                        }
                    }
                    WalkState::Continue
                })
            });

        if let Some(err) = walk_errors.into_inner().into_iter().next() {
            return Err(err);
        }

        let candidates = found.into_inner();
        let entries: Result<Vec<(String, TreeEntry)>> = candidates
            .into_par_iter()
            .map(|(rel, abs, is_symlink)| {
                let entry = self.scan_entry(store, &abs, is_symlink)?;
                Ok((rel, entry))
            })
            .collect();

        let mut tree = Tree::empty();
        for (path, entry) in entries? {
            tree.insert(path, entry);
        }
        trace!("Scanned {} paths under {:?}", tree.len(), self.root);
        Ok(tree)
    }

    fn scan_entry(
        &self,
        store: &dyn ObjectStore,
        abs: &Path,
        is_symlink: bool,
    ) -> Result<TreeEntry> {
        if is_symlink {
            let target = fs::read_link(abs)?;
            let target = target
                .to_str()
                .ok_or_else(|| EngineError::PathConversion(target.clone()))?
                .to_string();
            return Ok(TreeEntry::Symlink { target });
        }

        let metadata = fs::symlink_metadata(abs)?;
        if metadata.len() > self.max_file_size {
            return Err(EngineError::FileTooLarge {
                path: abs.to_path_buf(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }
        let bytes = fs::read(abs)?;
        let id = FileId::new(store.put(&bytes)?);
        Ok(TreeEntry::File {
            id,
            executable: is_executable(&metadata),
        })
    }
}

/// Convert an absolute path inside the workspace to a repo-relative
/// `/`-separated string
fn repo_relative(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| EngineError::PathConversion(path.to_path_buf()))?;
    let mut out = String::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| EngineError::PathConversion(path.to_path_buf()))?;
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    if out.is_empty() {
        return Err(EngineError::PathConversion(path.to_path_buf()));
    }
    Ok(out)
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoConfig;
    use tempfile::TempDir;

    fn init_repo(dir: &TempDir) -> Repo {
        Repo::init(dir.path()).unwrap()
    }

    #[test]
    fn test_scan_skips_state_dir_and_gitignore() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("tracked.txt"), "hello\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        fs::write(dir.path().join("noise.log"), "ignored\n").unwrap();

        let scanner = TreeScanner::new(dir.path(), u64::MAX, vec![]);
        let tree = scanner.scan(repo.store()).unwrap();

        assert!(tree.get("tracked.txt").is_some());
        assert!(tree.get(".gitignore").is_some());
        assert!(tree.get("noise.log").is_none());
        assert!(tree.iter().all(|(p, _)| !p.starts_with(STATE_DIR)));
    }

    #[test]
    fn test_scan_respects_configured_patterns() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("keep.txt"), "keep\n").unwrap();
        fs::write(dir.path().join("drop.tmp"), "drop\n").unwrap();

        let scanner = TreeScanner::new(dir.path(), u64::MAX, vec!["*.tmp".to_string()]);
        let tree = scanner.scan(repo.store()).unwrap();
        assert!(tree.get("keep.txt").is_some());
        assert!(tree.get("drop.tmp").is_none());
    }

    #[test]
    fn test_scan_rejects_oversized_file() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("big.bin"), vec![0u8; 1024]).unwrap();

        let scanner = TreeScanner::new(dir.path(), 512, vec![]);
        let err = scanner.scan(repo.store()).unwrap_err();
        assert!(matches!(err, EngineError::FileTooLarge { .. }));
    }

    #[test]
    fn test_first_snapshot_creates_commit_and_binding() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("a.txt"), "one\n").unwrap();

        let workspace = Workspace::default_in(&repo);
        let outcome = workspace.snapshot(&repo).unwrap();
        let SnapshotOutcome::Committed { commit, .. } = outcome else {
            panic!("expected a commit");
        };

        let view = repo.current_view().unwrap();
        assert_eq!(view.get_wc_commit(workspace.id()), Some(&commit.id));
        assert!(view.head_ids.contains(&commit.id));
        let tree = commit.tree(repo.store()).unwrap();
        assert!(tree.get("a.txt").is_some());
    }

    #[test]
    fn test_snapshot_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("a.txt"), "one\n").unwrap();

        let workspace = Workspace::default_in(&repo);
        let first = workspace.snapshot(&repo).unwrap();
        let ops_after_first = repo.log_operations().unwrap().len();

        let second = workspace.snapshot(&repo).unwrap();
        assert!(second.is_clean());
        assert_eq!(second.commit_id(), first.commit_id());
        assert_eq!(repo.log_operations().unwrap().len(), ops_after_first);
    }

    #[test]
    fn test_snapshot_amends_instead_of_stacking() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("a.txt"), "one\n").unwrap();

        let workspace = Workspace::default_in(&repo);
        let SnapshotOutcome::Committed { commit: first, .. } = workspace.snapshot(&repo).unwrap()
        else {
            panic!("expected a commit");
        };

        fs::write(dir.path().join("a.txt"), "two\n").unwrap();
        let SnapshotOutcome::Committed { commit: second, .. } = workspace.snapshot(&repo).unwrap()
        else {
            panic!("expected a commit");
        };

        assert_ne!(second.id, first.id);
        assert_eq!(second.change_id, first.change_id);
        assert_eq!(second.parent_ids, first.parent_ids);

        let view = repo.current_view().unwrap();
        assert!(view.head_ids.contains(&second.id));
        assert!(!view.head_ids.contains(&first.id));
        assert_eq!(view.get_change(&first.change_id), Some(&second.id));
    }

    #[test]
    fn test_current_view_folds_in_pending_edits() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("a.txt"), "one\n").unwrap();

        let workspace = Workspace::default_in(&repo);
        let first = workspace.snapshot(&repo).unwrap();

        fs::write(dir.path().join("a.txt"), "two\n").unwrap();
        let view = workspace.current_view(&repo).unwrap();

        let bound = view.get_wc_commit(workspace.id()).unwrap();
        assert_ne!(bound, first.commit_id());
        let tree = Commit::load(repo.store(), bound)
            .unwrap()
            .tree(repo.store())
            .unwrap();
        let TreeEntry::File { id, .. } = tree.get("a.txt").unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(repo.store().get(id.as_str()).unwrap(), b"two\n");
    }

    #[test]
    fn test_checkout_materializes_and_removes_stale_files() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("old.txt"), "old\n").unwrap();

        let workspace = Workspace::default_in(&repo);
        let SnapshotOutcome::Committed { commit: old, .. } = workspace.snapshot(&repo).unwrap()
        else {
            panic!("expected a commit");
        };

        // Build a different commit by hand and check it out
        let mut tree = Tree::empty();
        tree.insert(
            "new.txt",
            TreeEntry::File {
                id: FileId::new(repo.store().put(b"new\n").unwrap()),
                executable: false,
            },
        );
        let tree_id = tree.store(repo.store()).unwrap();
        let target = CommitBuilder::new(tree_id, repo.actor())
            .parents(vec![old.id.clone()])
            .write(repo.store())
            .unwrap();

        workspace.check_out(&repo, &target).unwrap();
        assert_eq!(fs::read(dir.path().join("new.txt")).unwrap(), b"new\n");
        assert!(!dir.path().join("old.txt").exists());
        let view = repo.current_view().unwrap();
        assert_eq!(view.get_wc_commit(workspace.id()), Some(&target.id));
    }

    #[test]
    fn test_checkout_preserves_pending_edits() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);
        fs::write(dir.path().join("f.txt"), "original\n").unwrap();

        let workspace = Workspace::default_in(&repo);
        let SnapshotOutcome::Committed { commit: bound, .. } = workspace.snapshot(&repo).unwrap()
        else {
            panic!("expected a commit");
        };

        // Edit after the snapshot, then check out a sibling commit without
        // snapshotting explicitly
        fs::write(dir.path().join("f.txt"), "precious uncommitted work\n").unwrap();

        let mut tree = Tree::empty();
        tree.insert(
            "f.txt",
            TreeEntry::File {
                id: FileId::new(repo.store().put(b"sibling\n").unwrap()),
                executable: false,
            },
        );
        let tree_id = tree.store(repo.store()).unwrap();
        let sibling = CommitBuilder::new(tree_id, repo.actor())
            .parents(bound.parent_ids.clone())
            .write(repo.store())
            .unwrap();

        workspace.check_out(&repo, &sibling).unwrap();

        // Disk shows the target, and the edit survived as an amendment of
        // the working-copy commit
        assert_eq!(
            fs::read(dir.path().join("f.txt")).unwrap(),
            b"sibling\n"
        );
        let view = repo.current_view().unwrap();
        let amended_id = view.get_change(&bound.change_id).unwrap();
        let amended = Commit::load(repo.store(), amended_id).unwrap();
        let TreeEntry::File { id, .. } = amended.tree(repo.store()).unwrap().get("f.txt").unwrap().clone()
        else {
            panic!("expected a file");
        };
        assert_eq!(
            repo.store().get(id.as_str()).unwrap(),
            b"precious uncommitted work\n"
        );
    }

    #[test]
    fn test_checkout_writes_conflict_markers() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(&dir);

        let mut tree = Tree::empty();
        tree.insert(
            "disputed.txt",
            TreeEntry::Conflict {
                base: Some(ConflictSide::File {
                    id: FileId::new(repo.store().put(b"base\n").unwrap()),
                    executable: false,
                }),
                left: Some(ConflictSide::File {
                    id: FileId::new(repo.store().put(b"left\n").unwrap()),
                    executable: false,
                }),
                right: Some(ConflictSide::File {
                    id: FileId::new(repo.store().put(b"right\n").unwrap()),
                    executable: false,
                }),
            },
        );
        let tree_id = tree.store(repo.store()).unwrap();
        let commit = CommitBuilder::new(tree_id, repo.actor())
            .has_conflict(true)
            .write(repo.store())
            .unwrap();

        let workspace = Workspace::default_in(&repo);
        workspace.check_out(&repo, &commit).unwrap();

        let text = fs::read_to_string(dir.path().join("disputed.txt")).unwrap();
        assert!(text.contains("<<<<<<<"));
        assert!(text.contains("|||||||"));
        assert!(text.contains(">>>>>>>"));
        assert!(text.contains("left"));
        assert!(text.contains("base"));
        assert!(text.contains("right"));
    }

    #[test]
    fn test_config_ignore_patterns_flow_through_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut config = RepoConfig::default();
        config.ignore_patterns = vec!["*.swp".to_string()];
        let repo = Repo::init_with_config(dir.path().to_path_buf(), config).unwrap();
        fs::write(dir.path().join("code.rs"), "fn main() {}\n").unwrap();
        fs::write(dir.path().join("editor.swp"), "junk").unwrap();

        let workspace = Workspace::default_in(&repo);
        let SnapshotOutcome::Committed { commit, .. } = workspace.snapshot(&repo).unwrap() else {
            panic!("expected a commit");
        };
        let tree = commit.tree(repo.store()).unwrap();
        assert!(tree.get("code.rs").is_some());
        assert!(tree.get("editor.swp").is_none());
    }
}
