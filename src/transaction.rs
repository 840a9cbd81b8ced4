//! Transactions over repository-visible state
//!
//! A [`Transaction`] starts from the view of a base operation and accumulates
//! edits on a private mutable copy. Nothing is visible to other readers until
//! [`Transaction::commit`] publishes a new operation; dropping an uncommitted
//! transaction leaves no trace (objects written to the content-addressed
//! store along the way are unreachable and swept by gc).
//!
//! Commit never fails because someone else won a race. The transaction's
//! operation is always published against its own base; if the heads moved in
//! the meantime, the publication leaves a fork in the operation log, which
//! commit immediately joins with a merge operation (three-way view merge
//! against the common ancestor operation). The fork and its join both stay
//! visible in the log.

use crate::commit::{Commit, Signature};
use crate::content_merge::ContentMerger;
use crate::error::Result;
use crate::ids::{ChangeId, CommitId, WorkspaceId};
use crate::op_store::{OpStore, Operation};
use crate::repo::resolve_op_heads;
use crate::store::ObjectStore;
use crate::view::View;
use tracing::debug;

/// An open, uncommitted mutation of repository-visible state
pub struct Transaction<'repo> {
    store: &'repo dyn ObjectStore,
    op_store: &'repo OpStore,
    merger: &'repo dyn ContentMerger,
    actor: Signature,
    base_op: Operation,
    view: View,
    description: String,
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("base_op", &self.base_op.id)
            .field("description", &self.description)
            .finish()
    }
}

impl<'repo> Transaction<'repo> {
    pub(crate) fn new(
        store: &'repo dyn ObjectStore,
        op_store: &'repo OpStore,
        merger: &'repo dyn ContentMerger,
        actor: Signature,
        base_op: Operation,
        description: impl Into<String>,
    ) -> Self {
        let view = base_op.view.clone();
        Self {
            store,
            op_store,
            merger,
            actor,
            base_op,
            view,
            description: description.into(),
        }
    }

    /// The operation this transaction was started from
    pub fn base_operation(&self) -> &Operation {
        &self.base_op
    }

    /// The in-progress view including all edits so far
    pub fn view(&self) -> &View {
        &self.view
    }

    /// Replace the description set at start
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Add a new commit as a head, retiring its parents from the head set
    pub fn add_head(&mut self, commit: &Commit) {
        for parent in &commit.parent_ids {
            self.view.remove_head(parent);
        }
        self.view.add_head(commit.id.clone());
    }

    /// Remove a commit from the head set
    pub fn remove_head(&mut self, id: &CommitId) {
        self.view.remove_head(id);
    }

    /// Record a freshly created commit: register its change and head it
    pub fn add_commit(&mut self, commit: &Commit) {
        self.view
            .set_change(commit.change_id.clone(), commit.id.clone());
        self.add_head(commit);
    }

    /// Replace the commit realizing a change with a rewritten one
    ///
    /// The superseded commit leaves the head set explicitly: a rewrite's
    /// parents are the old commit's parents, not the old commit, so ancestry
    /// pruning alone would keep both visible.
    pub fn rewrite_commit(&mut self, new_commit: &Commit) {
        if let Some(old_id) = self.view.get_change(&new_commit.change_id).cloned() {
            if old_id != new_commit.id {
                self.view.remove_head(&old_id);
                // Keep workspaces bound to the superseded commit on the
                // rewritten one
                let rebind: Vec<WorkspaceId> = self
                    .view
                    .wc_commits
                    .iter()
                    .filter(|(_, target)| **target == old_id)
                    .map(|(ws, _)| ws.clone())
                    .collect();
                for ws in rebind {
                    self.view.set_wc_commit(ws, new_commit.id.clone());
                }
            }
        }
        self.view
            .set_change(new_commit.change_id.clone(), new_commit.id.clone());
        self.add_head(new_commit);
    }

    /// Drop a change from visibility; its commit stays in the object store
    pub fn abandon_change(&mut self, change_id: &ChangeId) {
        if let Some(commit_id) = self.view.remove_change(change_id) {
            self.view.remove_head(&commit_id);
        }
    }

    /// Point a change id at a commit
    pub fn set_change(&mut self, change_id: ChangeId, commit_id: CommitId) {
        self.view.set_change(change_id, commit_id);
    }

    /// Point a bookmark at a commit
    pub fn set_bookmark(&mut self, name: impl Into<String>, target: CommitId) {
        self.view.set_bookmark(name, target);
    }

    /// Delete a bookmark
    pub fn remove_bookmark(&mut self, name: &str) {
        self.view.remove_bookmark(name);
    }

    /// Bind a workspace to a working-copy commit
    pub fn set_wc_commit(&mut self, workspace_id: WorkspaceId, commit_id: CommitId) {
        self.view.set_wc_commit(workspace_id, commit_id);
    }

    /// Publish the transaction as a new operation
    ///
    /// The operation records the base operation as its only parent, even if
    /// other writers advanced the heads in the meantime: such a race leaves
    /// a fork in the operation log, which is immediately joined by a merge
    /// operation (and that merge operation is what commit returns, so callers
    /// see the reconciled view). This never fails on concurrency; content
    /// disagreements become conflict commits.
    pub fn commit(self) -> Result<Operation> {
        let parents = vec![self.base_op.id.clone()];
        let op = self
            .op_store
            .write_operation(parents.clone(), self.view, self.description)?;
        self.op_store.advance_heads(&op.id, &parents)?;
        debug!("Committed operation {}", op.id.short());
        resolve_op_heads(self.store, self.op_store, self.merger, &self.actor)
    }
}
