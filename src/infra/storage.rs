//! Usage: Key-value storage for the PKCE verifier and tokens (session vs. local semantics).

use crate::infra::settings::StorageKind;
use crate::shared::error::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const KEY_VERIFIER: &str = "verifier";
pub const KEY_ACCESS_TOKEN: &str = "access_token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub(crate) const ALL_KEYS: &[&str] = &[KEY_VERIFIER, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN];

/// String key-value store passed explicitly to every flow step.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

fn poisoned(what: &str) -> AppError {
    AppError::new("SYSTEM_ERROR", format!("{what} lock poisoned"))
}

/// Process-lifetime store (browser `sessionStorage` equivalent).
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| poisoned("memory store"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned("memory store"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = self.entries.lock().map_err(|_| poisoned("memory store"))?;
        entries.remove(key);
        Ok(())
    }
}

/// JSON-file backed store (browser `localStorage` equivalent).
///
/// Every write rewrites the whole object through a temp file + rename. Concurrent
/// processes are not coordinated; the last writer wins.
///
/// Calls do synchronous `std::fs` IO on the calling thread, including tokio workers
/// inside the async flow steps. The file only ever holds the verifier and two tokens.
/// Bulk or slow file work (settings) goes through `shared::blocking::run` instead.
#[derive(Debug)]
pub(crate) struct FileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn read_map(&self) -> AppResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("SYSTEM_ERROR: failed to read storage file: {e}"))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let map: BTreeMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| format!("SYSTEM_ERROR: storage file is not a string map: {e}"))?;
        Ok(map)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("SYSTEM_ERROR: failed to create storage dir: {e}"))?;
        }
        let content = serde_json::to_vec_pretty(map)
            .map_err(|e| format!("SYSTEM_ERROR: failed to serialize storage: {e}"))?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .map_err(|e| format!("SYSTEM_ERROR: failed to write temp storage file: {e}"))?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            format!("SYSTEM_ERROR: failed to finalize storage file: {e}")
        })?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let _guard = self.guard.lock().map_err(|_| poisoned("file store"))?;
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.guard.lock().map_err(|_| poisoned("file store"))?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let _guard = self.guard.lock().map_err(|_| poisoned("file store"))?;
        let mut map = self.read_map()?;
        if map.remove(key).is_none() {
            return Ok(());
        }
        self.write_map(&map)
    }
}

pub fn open_store(kind: StorageKind, storage_file: &Path) -> Box<dyn KeyValueStore> {
    match kind {
        StorageKind::Session => Box::new(MemoryStore::new()),
        StorageKind::Local => Box::new(FileStore::new(storage_file)),
    }
}

/// Reads a key, treating blank values as absent.
pub(crate) fn get_non_empty(store: &dyn KeyValueStore, key: &str) -> AppResult<Option<String>> {
    Ok(store
        .get(key)?
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Removes every key the flow writes.
pub(crate) fn clear_all(store: &dyn KeyValueStore) -> AppResult<()> {
    for key in ALL_KEYS {
        store.remove(key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get(KEY_VERIFIER).expect("get"), None);
        store.set(KEY_VERIFIER, "abc").expect("set");
        assert_eq!(store.get(KEY_VERIFIER).expect("get").as_deref(), Some("abc"));
        store.set(KEY_VERIFIER, "def").expect("overwrite");
        assert_eq!(store.get(KEY_VERIFIER).expect("get").as_deref(), Some("def"));
        store.remove(KEY_VERIFIER).expect("remove");
        assert_eq!(store.get(KEY_VERIFIER).expect("get"), None);
        store.remove(KEY_VERIFIER).expect("remove missing is ok");
    }

    #[test]
    fn memory_store_get_set_remove() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn file_store_get_set_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        exercise(&FileStore::new(dir.path().join("storage.json")));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("storage.json");

        FileStore::new(&path)
            .set(KEY_ACCESS_TOKEN, "BQA-token")
            .expect("set");
        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get(KEY_ACCESS_TOKEN).expect("get").as_deref(),
            Some("BQA-token")
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2, 3]").expect("write");

        let err = FileStore::new(&path).get(KEY_VERIFIER).expect_err("corrupt");
        assert_eq!(err.code(), "SYSTEM_ERROR");
    }

    #[test]
    fn open_store_session_does_not_touch_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("storage.json");
        let store = open_store(StorageKind::Session, &path);
        store.set(KEY_REFRESH_TOKEN, "r").expect("set");
        assert!(!path.exists());
    }

    #[test]
    fn clear_all_removes_flow_keys_only() {
        let store = MemoryStore::new();
        store.set(KEY_VERIFIER, "v").expect("set");
        store.set(KEY_ACCESS_TOKEN, "a").expect("set");
        store.set(KEY_REFRESH_TOKEN, "r").expect("set");
        store.set("unrelated", "x").expect("set");

        clear_all(&store).expect("clear");
        for key in ALL_KEYS {
            assert_eq!(store.get(key).expect("get"), None);
        }
        assert_eq!(store.get("unrelated").expect("get").as_deref(), Some("x"));
    }

    #[test]
    fn get_non_empty_treats_blank_as_missing() {
        let store = MemoryStore::new();
        store.set(KEY_ACCESS_TOKEN, "   ").expect("set");
        assert_eq!(get_non_empty(&store, KEY_ACCESS_TOKEN).expect("get"), None);
    }
}
