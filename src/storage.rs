//! Persistence store for index definitions.
//!
//! The engine only needs a small key-value contract; definitions are stored
//! as JSON values. Two implementations ship: an in-memory store for tests
//! and a one-file-per-key JSON directory store.

use std::path::PathBuf;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Abstract key-value persistence with case-insensitive keys.
pub trait PersistenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn get_all(&self) -> Result<Vec<serde_json::Value>>;
}

/// Deserialize a stored value into `T`.
pub fn get_typed<T: DeserializeOwned>(
    store: &dyn PersistenceStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Serialize and store a value under `key`.
pub fn put_typed<T: Serialize>(store: &dyn PersistenceStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
    store.put(key, value)
}

/// Deserialize every stored value into `T`, skipping unreadable entries.
pub fn get_all_typed<T: DeserializeOwned>(store: &dyn PersistenceStore) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for value in store.get_all()? {
        match serde_json::from_value(value) {
            Ok(v) => out.push(v),
            Err(e) => log::warn!("[store] skipping unreadable entry: {}", e),
        }
    }
    Ok(out)
}

/// Volatile in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self
            .entries
            .get(&key.to_lowercase())
            .map(|e| e.value().clone()))
    }

    fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.entries.insert(key.to_lowercase(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(&key.to_lowercase());
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<serde_json::Value>> {
        Ok(self.entries.iter().map(|e| e.value().clone()).collect())
    }
}

/// One `<dir>/<key>.json` file per entry.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key.to_lowercase()))
    }
}

impl PersistenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let raw = serde_json::to_string_pretty(&value)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(self.path(key), raw)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<serde_json::Value>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&raw) {
                Ok(value) => out.push(value),
                Err(e) => log::warn!("[store] skipping {}: {}", path.display(), e),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Entry {
        name: String,
        count: u32,
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        let entry = Entry {
            name: "books".into(),
            count: 3,
        };
        put_typed(&store, "Books", &entry).unwrap();
        assert_eq!(get_typed::<Entry>(&store, "BOOKS").unwrap(), Some(entry));
        store.delete("books").unwrap();
        assert_eq!(get_typed::<Entry>(&store, "books").unwrap(), None);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let entry = Entry {
            name: "films".into(),
            count: 9,
        };
        put_typed(&store, "films", &entry).unwrap();
        assert_eq!(get_typed::<Entry>(&store, "films").unwrap(), Some(entry));
        assert_eq!(get_all_typed::<Entry>(&store).unwrap().len(), 1);
    }
}
