use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;

/// A persisted completion marker.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    /// Epoch milliseconds of the run that set it.
    Timestamp(i64),
}

impl FlagValue {
    pub fn is_set(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Timestamp(_) => true,
        }
    }
}

/// Small key/value store for completion markers.
pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<FlagValue>, StoreError>;
    fn set(&self, key: &str, value: FlagValue) -> Result<(), StoreError>;
}

/// Flags kept as a pretty-printed JSON object in a single file.
///
/// The file is re-read on every `get` so that separate processes see each
/// other's writes; `set` rewrites the whole map.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `<data_local_dir>/compose-pilot/flags.json`, falling back to the
    /// working directory when the platform has no data dir.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("compose-pilot")
            .join("flags.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, FlagValue>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let flags = serde_json::from_reader(reader)?;
        Ok(flags)
    }

    fn save(&self, flags: &BTreeMap<String, FlagValue>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;

        serde_json::to_writer_pretty(file, flags)?;
        Ok(())
    }
}

impl FlagStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<FlagValue>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.get(key).copied())
    }

    fn set(&self, key: &str, value: FlagValue) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut flags = self.load()?;
        flags.insert(key.to_string(), value);
        self.save(&flags)?;
        tracing::debug!(key, ?value, path = ?self.path, "Flag written");
        Ok(())
    }
}

/// In-process store; also records how many writes it has seen.
#[derive(Default)]
pub struct MemoryStore {
    flags: Mutex<BTreeMap<String, FlagValue>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flag(key: &str, value: FlagValue) -> Self {
        let store = Self::default();
        store
            .flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        store
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FlagStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<FlagValue>, StoreError> {
        Ok(self
            .flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied())
    }

    fn set(&self, key: &str, value: FlagValue) -> Result<(), StoreError> {
        self.flags
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope.json"));
        assert_eq!(store.get("composer.last_sent").unwrap(), None);
    }

    #[test]
    fn flags_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flags.json");

        let store = JsonFileStore::new(&path);
        store.set("sent", FlagValue::Timestamp(1_700_000_000_000)).unwrap();
        store.set("other", FlagValue::Bool(true)).unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get("sent").unwrap(),
            Some(FlagValue::Timestamp(1_700_000_000_000))
        );
        assert_eq!(reopened.get("other").unwrap(), Some(FlagValue::Bool(true)));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        std::fs::write(&path, "not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get("sent"), Err(StoreError::Json(_))));
    }

    #[test]
    fn flag_values_use_plain_json() {
        assert_eq!(serde_json::to_string(&FlagValue::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&FlagValue::Timestamp(42)).unwrap(), "42");
        assert!(!FlagValue::Bool(false).is_set());
        assert!(FlagValue::Timestamp(0).is_set());
    }

    #[test]
    fn memory_store_counts_writes() {
        let store = MemoryStore::new();
        assert_eq!(store.write_count(), 0);
        store.set("k", FlagValue::Bool(true)).unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.get("k").unwrap(), Some(FlagValue::Bool(true)));
    }
}
