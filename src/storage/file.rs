//! File-Backed Store
//!
//! A persistent [`BackingStore`] that keeps its contents in a single JSON
//! object on disk, mapping raw keys to raw stored strings:
//!
//! ```text
//! {"stashkv_theme": "{\"payload\":\"dark\",...}", "stashkv_auth_token": "MhUQ..."}
//! ```
//!
//! Reads are served from memory. Every mutation rewrites the image to a
//! temporary file and renames it over the original, so a crash leaves either
//! the old or the new image, never a torn one. A mutation whose write fails
//! is rolled back in memory as well.

use crate::storage::backend::{BackendError, BackingStore};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// A backing store persisted as one JSON file.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    data: RwLock<BTreeMap<String, String>>,
}

impl FileBackend {
    /// Opens the store at `path`, creating an empty one if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object of strings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref().to_path_buf();

        let data = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = data.len(), "Opened file store");

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the temporary image written before the rename.
    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Writes the full image next to the target and renames it into place.
    ///
    /// On failure the temporary file is removed again.
    fn persist(&self, data: &BTreeMap<String, String>) -> Result<(), BackendError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.tmp_path();
        let image = serde_json::to_vec(data)?;
        let result = fs::write(&tmp, image).and_then(|()| fs::rename(&tmp, &self.path));

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temporary file");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Applies every change in `changes` (`Some` sets, `None` removes), then
    /// persists once. If persisting fails, all of them are undone.
    fn mutate(&self, changes: &[(&str, Option<&str>)]) -> Result<(), BackendError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);

        let mut undo: Vec<(&str, Option<String>)> = Vec::new();
        for &(key, new_value) in changes {
            let previous = match new_value {
                Some(value) => data.insert(key.to_string(), value.to_string()),
                None => data.remove(key),
            };
            // A remove of a missing key changes nothing
            if new_value.is_some() || previous.is_some() {
                undo.push((key, previous));
            }
        }

        if undo.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.persist(&data) {
            warn!(
                path = %self.path.display(),
                changes = undo.len(),
                error = %e,
                "File store write failed, rolling back"
            );
            for (key, previous) in undo.into_iter().rev() {
                match previous {
                    Some(old) => {
                        data.insert(key.to_string(), old);
                    }
                    None => {
                        data.remove(key);
                    }
                }
            }
            return Err(e);
        }

        Ok(())
    }
}

impl BackingStore for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.mutate(&[(key, Some(value))])
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.mutate(&[(key, None)])
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), BackendError> {
        let changes: Vec<(&str, Option<&str>)> =
            keys.iter().map(|key| (key.as_str(), None)).collect();
        self.mutate(&changes)
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileBackend::open(dir.path().join("store.json")).unwrap();
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = FileBackend::open(&path).unwrap();
            store.set("a", "1").unwrap();
            store.set("b", "2").unwrap();
            store.remove("a").unwrap();
        }

        let store = FileBackend::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some("2".to_string()));
        assert_eq!(store.keys().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("store.json");

        let store = FileBackend::open(&path).unwrap();
        store.set("k", "v").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "definitely not json").unwrap();

        assert!(matches!(
            FileBackend::open(&path),
            Err(BackendError::Serialization(_))
        ));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = FileBackend::open(&path).unwrap();
        store.set("k", "old").unwrap();

        // A directory where the file should be makes the rename fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::create_dir(path.join("occupied")).unwrap();

        assert!(store.set("k", "new").is_err());
        assert_eq!(store.get("k").unwrap(), Some("old".to_string()));

        assert!(store.set("fresh", "value").is_err());
        assert_eq!(store.get("fresh").unwrap(), None);

        // No half-written image is left next to the target
        assert!(!dir.path().join("store.tmp").exists());
    }

    #[test]
    fn test_remove_many_persists_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = FileBackend::open(&path).unwrap();
            for i in 0..5 {
                store.set(&format!("k{}", i), "v").unwrap();
            }
            store
                .remove_many(&["k1".to_string(), "k3".to_string(), "nope".to_string()])
                .unwrap();
        }

        let store = FileBackend::open(&path).unwrap();
        assert_eq!(store.keys().unwrap(), vec!["k0", "k2", "k4"]);
    }

    #[test]
    fn test_failed_remove_many_rolls_back_all() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let store = FileBackend::open(&path).unwrap();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::create_dir(path.join("occupied")).unwrap();

        assert!(store
            .remove_many(&["a".to_string(), "b".to_string()])
            .is_err());
        assert_eq!(store.keys().unwrap(), vec!["a", "b"]);
        assert!(!dir.path().join("store.tmp").exists());
    }
}
