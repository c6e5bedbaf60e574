//! Key-value persistence for the observation log.
//!
//! The store only needs three operations: read a value, replace it, and
//! delete it. Values are opaque JSON strings; decoding and recovery from
//! corrupt data happen in the caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable storage keyed by name.
pub trait KeyValueStore: Send + Sync {
    /// Read the value under `key`, or `None` if nothing was ever saved.
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Replace the value under `key`.
    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Remove the value under `key`. Removing a missing key is not an error.
    fn clear(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| PersistenceError::Read(format!("{}: {e}", path.display())))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PersistenceError::Write(format!("{}: {e}", self.dir.display())))?;

        // Write to a sibling file first so a crash mid-write leaves the old copy intact.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .map_err(|e| PersistenceError::Write(format!("{}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| PersistenceError::Write(format!("{}: {e}", path.display())))
    }

    fn clear(&self, key: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Write(format!("{}: {e}", path.display()))),
        }
    }
}

/// In-process store, used for tests and for running without a data directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, PersistenceError> {
        self.values
            .lock()
            .map_err(|_| PersistenceError::Write("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), PersistenceError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Persistence errors.
#[derive(Debug)]
pub enum PersistenceError {
    /// Stored data exists but cannot be decoded
    ReadCorrupt(String),
    /// Stored data could not be read
    Read(String),
    /// Writing or clearing the durable copy failed
    Write(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::ReadCorrupt(e) => write!(f, "Stored data is corrupt: {e}"),
            PersistenceError::Read(e) => write!(f, "Persistence read error: {e}"),
            PersistenceError::Write(e) => write!(f, "Persistence write error: {e}"),
        }
    }
}

impl std::error::Error for PersistenceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("data"));

        assert_eq!(store.load("history").unwrap(), None);

        store.save("history", "[1,2,3]").unwrap();
        assert_eq!(store.load("history").unwrap().as_deref(), Some("[1,2,3]"));
        assert!(store.path_for("history").exists());

        store.clear("history").unwrap();
        assert_eq!(store.load("history").unwrap(), None);

        // Clearing twice is fine
        store.clear("history").unwrap();
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemoryStore::new();
        store.save("k", "v").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some("v"));
        store.clear("k").unwrap();
        assert_eq!(store.load("k").unwrap(), None);
    }
}
