use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// String key/value storage that survives a client restart.
pub trait SessionStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is a no-op.
    fn remove(&self, key: &str) -> Result<()>;
}

/// JSON object on disk, e.g. `.reconflow/session.json`.
///
/// Every access holds an advisory lock on a sibling `.lock` file, and writes
/// go through a temporary file renamed over the target so a crash never
/// leaves a truncated store behind.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn with_lock<T>(&self, exclusive: bool, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .context("Failed to open session lock file")?;
        if exclusive {
            FileExt::lock_exclusive(&lock_file).context("Failed to lock session store")?;
        } else {
            FileExt::lock_shared(&lock_file).context("Failed to lock session store")?;
        }

        let result = f();
        if let Err(e) = FileExt::unlock(&lock_file) {
            tracing::warn!(path = %self.lock_path().display(), error = %e, "Failed to unlock session store");
        }
        result
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()));
            }
        };
        match serde_json::from_str(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Session store is corrupt, starting empty",
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if map.is_empty() {
            return match fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e)
                    .with_context(|| format!("Failed to remove {}", self.path.display())),
                _ => Ok(()),
            };
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("session.json");
        let tmp_path = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!(".{file_name}.tmp"));

        let content = serde_json::to_string_pretty(map).context("Failed to encode session store")?;
        {
            let mut tmp = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            std::io::Write::write_all(&mut tmp, content.as_bytes())
                .context("Failed to write session store")?;
            tmp.sync_all().context("Failed to flush session store")?;
        }
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_lock(false, || Ok(self.read_map()?.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_lock(true, || {
            let mut map = self.read_map()?;
            map.insert(key.to_string(), value.to_string());
            self.write_map(&map)
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_lock(true, || {
            let mut map = self.read_map()?;
            if map.remove(key).is_some() {
                self.write_map(&map)?;
            }
            Ok(())
        })
    }
}

/// In-process store. Clones share the same entries, so a clone kept aside
/// outlives the orchestrator that owned the original.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_set_get_remove() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join(".reconflow/session.json"));

        assert_eq!(store.get("activeSessionId").unwrap(), None);
        store.set("activeSessionId", "abc").unwrap();
        store.set("activePhase", "dense_reconstruction").unwrap();
        assert_eq!(store.get("activeSessionId").unwrap().as_deref(), Some("abc"));

        store.remove("activeSessionId").unwrap();
        store.remove("activeSessionId").unwrap();
        assert_eq!(store.get("activeSessionId").unwrap(), None);
        assert_eq!(
            store.get("activePhase").unwrap().as_deref(),
            Some("dense_reconstruction")
        );
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileSessionStore::new(&path).set("activeSessionId", "s-9").unwrap();

        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.get("activeSessionId").unwrap().as_deref(), Some("s-9"));
    }

    #[test]
    fn test_file_store_removes_file_when_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);
        store.set("k", "v").unwrap();
        assert!(path.exists());
        store.remove("k").unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join(".session.json.tmp").exists());
    }

    #[test]
    fn test_file_store_releases_lock_after_each_access() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::new(&path);
        store.set("activeSessionId", "s-1").unwrap();

        let lock_file = OpenOptions::new()
            .write(true)
            .open(path.with_extension("lock"))
            .unwrap();
        FileExt::try_lock_exclusive(&lock_file).unwrap();
        FileExt::unlock(&lock_file).unwrap();
        drop(lock_file);

        assert_eq!(store.get("activeSessionId").unwrap().as_deref(), Some("s-1"));
    }

    #[test]
    fn test_file_store_treats_corrupt_file_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();
        let store = FileSessionStore::new(&path);
        assert_eq!(store.get("activeSessionId").unwrap(), None);
        store.set("activeSessionId", "fresh").unwrap();
        assert_eq!(store.get("activeSessionId").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_memory_store_clones_share_entries() {
        let store = MemorySessionStore::new();
        let view = store.clone();
        store.set("activePhase", "frame_extraction").unwrap();
        assert_eq!(
            view.get("activePhase").unwrap().as_deref(),
            Some("frame_extraction")
        );
        view.remove("activePhase").unwrap();
        assert!(store.is_empty());
    }
}
