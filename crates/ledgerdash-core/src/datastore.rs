use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Key/value text storage with local-storage semantics: one opaque
/// string per key, whole-value replacement on write.
pub trait Storage: fmt::Debug + Send + Sync {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid {
            return Err(anyhow!("invalid storage key: {key:?}"));
        }
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            debug!(file = %path.display(), "storage key absent");
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value), fields(bytes = value.len()))]
    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed removing {}", path.display()))?;
        }
        Ok(())
    }
}

/// Shared in-memory storage. Clones see the same map, so a second store
/// opened on a clone behaves like a reload.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    map: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.map.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.map.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> anyhow::Result<()> {
        self.map.lock().remove(key);
        Ok(())
    }
}

/// Storage for environments that have none: reads are empty, writes vanish.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

impl Storage for NullStorage {
    fn get_item(&self, _key: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn set_item(&self, _key: &str, _value: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn remove_item(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Decodes the collection stored under `key`. Missing, unreadable or
/// corrupt data all yield an empty collection.
#[tracing::instrument(skip(storage))]
pub fn load_collection<T: DeserializeOwned>(storage: &dyn Storage, key: &str) -> Vec<T> {
    let raw = match storage.get_item(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            warn!(key, error = %format!("{err:#}"), "failed reading collection; starting empty");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<T>>(&raw) {
        Ok(items) => {
            debug!(key, count = items.len(), "loaded collection");
            items
        }
        Err(err) => {
            warn!(key, error = %err, "failed decoding collection; starting empty");
            Vec::new()
        }
    }
}

/// Replaces the value under `key` with the full serialized collection.
#[tracing::instrument(skip(storage, items), fields(count = items.len()))]
pub fn save_collection<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    items: &[T],
) -> anyhow::Result<()> {
    let serialized = serde_json::to_string(items)
        .with_context(|| format!("failed encoding collection {key}"))?;
    storage
        .set_item(key, &serialized)
        .with_context(|| format!("failed writing collection {key}"))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn file_storage_replaces_whole_value() {
        let temp = tempdir().expect("tempdir");
        let storage = FileStorage::open(temp.path()).expect("open storage");

        assert_eq!(storage.get_item("todos").expect("read"), None);
        storage.set_item("todos", "[1,2,3]").expect("write");
        storage.set_item("todos", "[4]").expect("overwrite");
        assert_eq!(
            storage.get_item("todos").expect("read").as_deref(),
            Some("[4]")
        );
        assert!(temp.path().join("todos.json").exists());

        storage.remove_item("todos").expect("remove");
        assert_eq!(storage.get_item("todos").expect("read"), None);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let temp = tempdir().expect("tempdir");
        let storage = FileStorage::open(temp.path()).expect("open storage");
        assert!(storage.set_item("../escape", "x").is_err());
        assert!(storage.get_item("").is_err());
    }

    #[test]
    fn corrupt_collection_loads_empty() {
        let storage = MemoryStorage::new();
        storage.set_item("todos", "{not json").expect("write");
        let items: Vec<u32> = load_collection(&storage, "todos");
        assert!(items.is_empty());

        storage.set_item("todos", r#"{"id":"1"}"#).expect("write");
        let items: Vec<u32> = load_collection(&storage, "todos");
        assert!(items.is_empty());
    }

    #[test]
    fn null_storage_forgets_writes() {
        let storage = NullStorage;
        save_collection(&storage, "todos", &[1_u32, 2]).expect("save");
        let items: Vec<u32> = load_collection(&storage, "todos");
        assert!(items.is_empty());
    }
}
