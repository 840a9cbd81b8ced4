//! The operation log
//!
//! Every mutation of repository-visible state is recorded as an
//! [`Operation`]: an immutable record carrying the complete [`View`] that
//! resulted from it, linked to the operation(s) it was based on. Operations
//! form a DAG: the repository's own history has history.
//!
//! Concurrency is handled without locks. The current position is a set of
//! *head markers*: empty files under `heads/`, one per operation id. To
//! publish an operation, a writer creates the marker for the new operation
//! and then removes the markers of its parents. Two racing writers may both
//! succeed, leaving two markers behind; that is not an error but a fork in
//! the DAG, repaired by the next reader, which merges the divergent views
//! into a merge operation (see the repo layer).
//!
//! Records are JSON, written to a temp file and renamed into place, keyed by
//! the hash of their serialized form. Nothing in this log is ever modified
//! in place and nothing is deleted outside explicit garbage collection.

use crate::error::{EngineError, Result};
use crate::ids::OperationId;
use crate::store::ensure_dir;
use crate::view::View;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, trace};

/// Serialized operation payload; the operation id is the hash of this record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OperationRecord {
    parent_ids: Vec<OperationId>,
    view: View,
    description: String,
    timestamp: DateTime<Utc>,
    hostname: String,
    username: String,
}

/// One recorded mutation of repository-visible state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Content hash identity
    pub id: OperationId,
    /// Operations this one was based on; empty only for the root operation,
    /// two or more for a merge of divergent operation heads
    pub parent_ids: Vec<OperationId>,
    /// Complete resulting view
    pub view: View,
    /// What the operation did, for `log` display
    pub description: String,
    /// When the operation was committed
    pub timestamp: DateTime<Utc>,
    /// Machine that performed the operation
    pub hostname: String,
    /// User that performed the operation
    pub username: String,
}

impl Operation {
    fn from_record(id: OperationId, record: OperationRecord) -> Self {
        Self {
            id,
            parent_ids: record.parent_ids,
            view: record.view,
            description: record.description,
            timestamp: record.timestamp,
            hostname: record.hostname,
            username: record.username,
        }
    }

    /// Format for display in operation logs
    pub fn display_format(&self) -> String {
        format!(
            "{} {} ({}@{}, {})",
            self.id.short(),
            self.description,
            self.username,
            self.hostname,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

/// Append-only store of operations with lock-free head tracking
#[derive(Debug)]
pub struct OpStore {
    root: PathBuf,
}

impl OpStore {
    /// Initialize the log under `root` and record the root operation
    ///
    /// The root operation has no parents and an empty view; it is the common
    /// ancestor of everything that follows.
    pub fn init(root: impl Into<PathBuf>) -> Result<(Self, Operation)> {
        let root = root.into();
        ensure_dir(&root.join("operations"))?;
        ensure_dir(&root.join("heads"))?;
        ensure_dir(&root.join("tmp"))?;

        let store = Self { root };
        let root_op = store.write_operation(vec![], View::empty(), "initialize repository")?;
        store.advance_heads(&root_op.id, &[])?;
        debug!("Initialized operation log, root op {}", root_op.id.short());
        Ok((store, root_op))
    }

    /// Open an existing log
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join("operations").is_dir() {
            return Err(EngineError::RepoNotInitialized(root));
        }
        Ok(Self { root })
    }

    fn operation_path(&self, id: &OperationId) -> PathBuf {
        self.root.join("operations").join(id.as_str())
    }

    fn head_path(&self, id: &OperationId) -> PathBuf {
        self.root.join("heads").join(id.as_str())
    }

    /// Write an operation record; does not move the heads
    pub fn write_operation(
        &self,
        parent_ids: Vec<OperationId>,
        view: View,
        description: impl Into<String>,
    ) -> Result<Operation> {
        let record = OperationRecord {
            parent_ids,
            view,
            description: description.into(),
            timestamp: Utc::now(),
            hostname: current_hostname(),
            username: current_username(),
        };
        let bytes = serde_json::to_vec(&record)?;
        let id = OperationId::hash_of(&bytes);

        let path = self.operation_path(&id);
        if !path.is_file() {
            let mut tmp = tempfile::NamedTempFile::new_in(self.root.join("tmp"))?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path)
                .map_err(|e| EngineError::storage(format!("persist op {}: {}", id, e.error)))?;
        }
        trace!("Wrote operation {}: {}", id.short(), record.description);
        Ok(Operation::from_record(id, record))
    }

    /// Load an operation by id
    pub fn read_operation(&self, id: &OperationId) -> Result<Operation> {
        let bytes = fs::read(self.operation_path(id))
            .map_err(|_| EngineError::OperationNotFound(id.to_string()))?;
        let record: OperationRecord = serde_json::from_slice(&bytes)?;
        Ok(Operation::from_record(id.clone(), record))
    }

    /// Publish `new_head` and retire the markers of `parents`
    ///
    /// Create-then-remove ordering means there is never an instant with no
    /// head marker. A concurrent writer publishing against the same parents
    /// simply leaves a second marker standing; the fork is merged on the
    /// next [`OpStore::head_ids`] consumer that resolves views.
    pub fn advance_heads(&self, new_head: &OperationId, parents: &[OperationId]) -> Result<()> {
        fs::write(self.head_path(new_head), b"")?;
        for parent in parents {
            match fs::remove_file(self.head_path(parent)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Advanced op heads to {}", new_head.short());
        Ok(())
    }

    /// Current head operation ids, sorted
    ///
    /// Usually a single element; more than one means concurrent writers
    /// forked the log.
    pub fn head_ids(&self) -> Result<Vec<OperationId>> {
        let mut heads = Vec::new();
        for entry in fs::read_dir(self.root.join("heads"))? {
            let entry = entry?;
            heads.push(OperationId::new(
                entry.file_name().to_string_lossy().to_string(),
            ));
        }
        if heads.is_empty() {
            return Err(EngineError::MissingOperationHead);
        }
        heads.sort();
        Ok(heads)
    }

    /// All operations reachable from `from`, newest first
    ///
    /// Breadth-first over parent links with duplicates removed; used by the
    /// operation log display and by garbage collection.
    pub fn ancestors(&self, from: &[OperationId]) -> Result<Vec<Operation>> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<OperationId> = from.iter().cloned().collect();
        let mut ops = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let op = self.read_operation(&id)?;
            queue.extend(op.parent_ids.iter().cloned());
            ops.push(op);
        }
        ops.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(ops)
    }

    /// Find a common ancestor operation of `a` and `b`, if any
    ///
    /// Picks the candidate closest to `b` in breadth-first order; with a
    /// single-root log (which `init` guarantees) this always finds one.
    pub fn common_ancestor(
        &self,
        a: &OperationId,
        b: &OperationId,
    ) -> Result<Option<OperationId>> {
        let mut ancestors_of_a = HashSet::new();
        let mut queue = VecDeque::from([a.clone()]);
        while let Some(id) = queue.pop_front() {
            if !ancestors_of_a.insert(id.clone()) {
                continue;
            }
            queue.extend(self.read_operation(&id)?.parent_ids);
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
            queue.extend(self.read_operation(&id)?.parent_ids);
        }
        Ok(None)
    }

    /// All stored operation ids, reachable or not. Maintenance only.
    pub fn list_operations(&self) -> Result<Vec<OperationId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.root.join("operations"))? {
            let entry = entry?;
            ids.push(OperationId::new(
                entry.file_name().to_string_lossy().to_string(),
            ));
        }
        ids.sort();
        Ok(ids)
    }

    /// Delete an operation record. Maintenance only (garbage collection);
    /// never call on a reachable operation.
    pub fn remove_operation(&self, id: &OperationId) -> Result<()> {
        match fs::remove_file(self.operation_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn current_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn current_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
