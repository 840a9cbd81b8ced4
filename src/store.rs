//! Content-addressed object storage
//!
//! The engine consumes storage through the [`ObjectStore`] capability:
//! immutable, content-addressed bytes keyed by SHA-256. Because objects are
//! keyed by their own hash, concurrent writers can never clobber each other:
//! re-writing existing content is idempotent and writing different content
//! can never collide. This property is what lets the rest of the engine run
//! without any cross-process lock.
//!
//! Two implementations ship with the crate:
//!
//! - [`FileStore`]: on-disk store with a sharded layout
//!   (`objects/<first 2 hash chars>/<rest>`), lz4-compressed payloads, and
//!   write-to-temp-then-rename atomicity.
//! - [`MemoryStore`]: ephemeral store for tests and in-memory repositories.
//!
//! The `list`/`remove` methods exist only for explicit garbage collection;
//! normal engine code never deletes.

use crate::error::{EngineError, Result};
use crate::ids::hash_hex;
use dashmap::DashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Content-addressed storage capability
///
/// `put` returns the hex SHA-256 hash of the payload; `get` and `has` look
/// objects up by that hash. Implementations must be safe for unsynchronized
/// concurrent use, including concurrent `put` of identical content.
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Store a payload and return its content hash
    fn put(&self, bytes: &[u8]) -> Result<String>;

    /// Load a payload by content hash
    fn get(&self, hash: &str) -> Result<Vec<u8>>;

    /// Check whether an object exists
    fn has(&self, hash: &str) -> Result<bool>;

    /// List all stored hashes. Maintenance only (garbage collection).
    fn list(&self) -> Result<Vec<String>>;

    /// Remove an object by hash. Maintenance only (garbage collection);
    /// removing a missing object is not an error.
    fn remove(&self, hash: &str) -> Result<()>;
}

/// On-disk content-addressed store
///
/// Objects live under `<root>/objects/<prefix>/<suffix>` where the prefix is
/// the first two characters of the hash, keeping directory fan-out bounded.
/// Payloads are lz4-compressed. Writes go to a temp file in the store root
/// and are renamed into place, so a crash never leaves a partial object
/// visible and two processes writing the same hash race benignly.
pub struct FileStore {
    root: PathBuf,
    /// Hashes known to exist on disk, to skip repeated stat calls
    present: DashMap<String, ()>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("root", &self.root)
            .field("cached", &self.present.len())
            .finish()
    }
}

impl FileStore {
    /// Initialize a store under `root`, creating the directory layout
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects"))?;
        fs::create_dir_all(root.join("tmp"))?;
        debug!("Initialized object store at {:?}", root);
        Ok(Self {
            root,
            present: DashMap::new(),
        })
    }

    /// Open an existing store
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.join("objects").is_dir() {
            return Err(EngineError::RepoNotInitialized(root));
        }
        Ok(Self {
            root,
            present: DashMap::new(),
        })
    }

    fn object_path(&self, hash: &str) -> PathBuf {
        let (prefix, suffix) = hash.split_at(2.min(hash.len()));
        self.root.join("objects").join(prefix).join(suffix)
    }
}

impl ObjectStore for FileStore {
    fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = hash_hex(bytes);
        if self.has(&hash)? {
            trace!("Object {} already stored", &hash[..8]);
            return Ok(hash);
        }

        let path = self.object_path(&hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let compressed = lz4_flex::compress_prepend_size(bytes);
        let mut tmp = tempfile::NamedTempFile::new_in(self.root.join("tmp"))?;
        tmp.write_all(&compressed)?;
        // persist() is a rename; if another process won the race the content
        // is identical by construction, so either outcome is correct.
        tmp.persist(&path)
            .map_err(|e| EngineError::storage(format!("persist {}: {}", hash, e.error)))?;

        self.present.insert(hash.clone(), ());
        trace!("Stored object {} ({} bytes)", &hash[..8], bytes.len());
        Ok(hash)
    }

    fn get(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.object_path(hash);
        let compressed = fs::read(&path)
            .map_err(|_| EngineError::ObjectNotFound(hash.to_string()))?;
        let bytes = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| EngineError::Decompression(format!("{}: {}", hash, e)))?;

        let actual = hash_hex(&bytes);
        if actual != hash {
            return Err(EngineError::HashMismatch {
                expected: hash.to_string(),
                actual,
            });
        }
        Ok(bytes)
    }

    fn has(&self, hash: &str) -> Result<bool> {
        if self.present.contains_key(hash) {
            return Ok(true);
        }
        let exists = self.object_path(hash).is_file();
        if exists {
            self.present.insert(hash.to_string(), ());
        }
        Ok(exists)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut hashes = Vec::new();
        let objects = self.root.join("objects");
        for shard in fs::read_dir(&objects)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            let prefix = shard.file_name().to_string_lossy().to_string();
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let suffix = entry.file_name().to_string_lossy().to_string();
                hashes.push(format!("{}{}", prefix, suffix));
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    fn remove(&self, hash: &str) -> Result<()> {
        self.present.remove(hash);
        match fs::remove_file(self.object_path(hash)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory content-addressed store
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = hash_hex(bytes);
        self.objects.entry(hash.clone()).or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }

    fn get(&self, hash: &str) -> Result<Vec<u8>> {
        self.objects
            .get(hash)
            .map(|v| v.clone())
            .ok_or_else(|| EngineError::ObjectNotFound(hash.to_string()))
    }

    fn has(&self, hash: &str) -> Result<bool> {
        Ok(self.objects.contains_key(hash))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut hashes: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        hashes.sort();
        Ok(hashes)
    }

    fn remove(&self, hash: &str) -> Result<()> {
        self.objects.remove(hash);
        Ok(())
    }
}

/// Store a serializable record and return its content hash
pub(crate) fn put_json<T: serde::Serialize>(store: &dyn ObjectStore, value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    store.put(&bytes)
}

/// Load and deserialize a record by content hash
pub(crate) fn get_json<T: serde::de::DeserializeOwned>(
    store: &dyn ObjectStore,
    hash: &str,
) -> Result<T> {
    let bytes = store.get(hash)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Ensure `dir` (and parents) exist; shared by the stores and the op log
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let hash = store.put(b"hello").unwrap();
        assert!(store.has(&hash).unwrap());
        assert_eq!(store.get(&hash).unwrap(), b"hello");
    }

    #[test]
    fn test_put_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.put(b"same").unwrap();
        let b = store.put(b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::init(dir.path().join("store")).unwrap();
        let hash = store.put(b"some file content").unwrap();
        assert!(store.has(&hash).unwrap());
        assert_eq!(store.get(&hash).unwrap(), b"some file content");

        // Reopen and read back
        let reopened = FileStore::load(dir.path().join("store")).unwrap();
        assert_eq!(reopened.get(&hash).unwrap(), b"some file content");
        assert!(reopened.list().unwrap().contains(&hash));
    }

    #[test]
    fn test_file_store_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::init(dir.path().join("store")).unwrap();
        let err = store.get(&"ab".repeat(32)).unwrap_err();
        assert!(matches!(err, EngineError::ObjectNotFound(_)));
    }

    #[test]
    fn test_file_store_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::init(dir.path().join("store")).unwrap();
        let hash = store.put(b"doomed").unwrap();
        store.remove(&hash).unwrap();
        assert!(!store.has(&hash).unwrap());
        // Removing again is fine
        store.remove(&hash).unwrap();
    }
}
