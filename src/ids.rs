//! Identifier types used throughout the engine
//!
//! Four kinds of identity live in this system and keeping them apart is
//! load-bearing:
//!
//! - **Content ids** ([`CommitId`], [`TreeId`], [`FileId`], [`OperationId`]):
//!   hex-encoded SHA-256 hashes of serialized content. Equal content means
//!   equal id; rewriting a record always yields a new id.
//! - **[`ChangeId`]**: the stable logical identity of a unit of work.
//!   Generated once when a change is first authored and carried unchanged
//!   through every rewrite of that change. Deliberately *not* a content hash.
//! - **[`WorkspaceId`]**: a plain name for a working directory bound to the
//!   repository.
//!
//! All ids render as lowercase hex and provide a `short()` prefix for
//! display.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of characters used by `short()` display forms
const SHORT_LEN: usize = 8;

/// Compute the hex-encoded SHA-256 hash of a byte slice
pub(crate) fn hash_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing hex hash string
            pub fn new(hex: impl Into<String>) -> Self {
                Self(hex.into())
            }

            /// Compute the id of a serialized payload
            pub fn hash_of(bytes: &[u8]) -> Self {
                Self(hash_hex(bytes))
            }

            /// The full hex form
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Short prefix for display (first 8 characters)
            pub fn short(&self) -> &str {
                &self.0[..SHORT_LEN.min(self.0.len())]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

content_id! {
    /// Content hash identifying an immutable commit
    CommitId
}

content_id! {
    /// Content hash identifying an immutable tree manifest
    TreeId
}

content_id! {
    /// Content hash identifying a file blob in the object store
    FileId
}

content_id! {
    /// Content hash identifying an operation record in the operation log
    OperationId
}

/// Stable logical identity of a change
///
/// Unlike the content ids, a change id survives rewrites: amending or
/// rebasing a commit produces a new [`CommitId`] but the same `ChangeId`.
/// Within one view each visible change id maps to exactly one commit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Generate a fresh change id
    ///
    /// Uses a random UUID rather than a content hash so that the id stays
    /// stable while the content it names evolves.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing change id string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The full hex form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for display
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a workspace bound to the repository
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Create a workspace id from a name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The workspace name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for WorkspaceId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
