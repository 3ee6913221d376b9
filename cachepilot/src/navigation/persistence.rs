//! Snapshot persistence backends.
//!
//! Snapshots are opaque bytes stored under a namespace. The file backend
//! writes `<directory>/<namespace>.bin` through a temp file and an atomic
//! rename, so a crash mid-write never leaves a truncated snapshot behind.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::PersistenceError;

/// Namespaced byte snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot of `namespace`, if one exists.
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Replace the snapshot of `namespace`.
    fn save(&self, namespace: &str, bytes: &[u8]) -> Result<(), PersistenceError>;

    /// Delete the snapshot of `namespace`. Missing snapshots are not an error.
    fn remove(&self, namespace: &str) -> Result<(), PersistenceError>;
}

/// Snapshots stored as files in one directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    directory: PathBuf,
}

impl FileSnapshotStore {
    /// Store snapshots under `directory` (created on first save).
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Store snapshots under the platform cache directory, if there is one.
    pub fn default_location() -> Option<Self> {
        dirs::cache_dir().map(|dir| Self::new(dir.join("cachepilot")))
    }

    /// Snapshot directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the snapshot file for `namespace`.
    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.directory.join(format!("{}.bin", namespace))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        std::fs::create_dir_all(&self.directory)?;

        let temp_path = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        writer.write_all(bytes)?;
        writer.flush()?;
        drop(writer);

        std::fs::rename(&temp_path, path)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match std::fs::read(self.path_for(namespace)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(PersistenceError::Io {
                namespace: namespace.to_string(),
                source,
            }),
        }
    }

    fn save(&self, namespace: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.write_atomic(&self.path_for(namespace), bytes)
            .map_err(|source| PersistenceError::Io {
                namespace: namespace.to_string(),
                source,
            })
    }

    fn remove(&self, namespace: &str) -> Result<(), PersistenceError> {
        match std::fs::remove_file(self.path_for(namespace)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io {
                namespace: namespace.to_string(),
                source,
            }),
        }
    }
}

/// Snapshots held in memory, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, namespace: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.snapshots.lock().get(namespace).cloned())
    }

    fn save(&self, namespace: &str, bytes: &[u8]) -> Result<(), PersistenceError> {
        self.snapshots.lock().insert(namespace.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<(), PersistenceError> {
        self.snapshots.lock().remove(namespace);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(temp.path().join("snapshots"));

        assert_eq!(store.load("nav").unwrap(), None);
        store.save("nav", b"first").unwrap();
        store.save("nav", b"second").unwrap();
        assert_eq!(store.load("nav").unwrap().as_deref(), Some(&b"second"[..]));

        // No temp file left behind
        assert!(!store.path_for("nav").with_extension("tmp").exists());

        store.remove("nav").unwrap();
        store.remove("nav").unwrap();
        assert_eq!(store.load("nav").unwrap(), None);
    }

    #[test]
    fn test_file_store_reports_io_errors() {
        let temp = TempDir::new().unwrap();
        // A file where the directory should be
        let blocker = temp.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let store = FileSnapshotStore::new(&blocker);

        let err = store.save("nav", b"bytes").unwrap_err();
        assert!(matches!(err, PersistenceError::Io { namespace, .. } if namespace == "nav"));
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        store.save("a", b"1").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("a").unwrap(), Some(b"1".to_vec()));
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }
}
