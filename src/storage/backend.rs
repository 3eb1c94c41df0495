//! Backing Stores
//!
//! The engine never holds data itself. It reads and writes raw strings
//! through a [`BackingStore`], an abstract string-keyed map that may be
//! persistent ([`FileBackend`](crate::storage::FileBackend)) or in-memory
//! ([`MemoryBackend`]).
//!
//! Each call is expected to be atomic on its own. Nothing is atomic across
//! calls.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// Errors a backing store can report.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The write would take the store past its capacity
    #[error("quota exceeded: write needs {needed} bytes (quota: {quota})")]
    QuotaExceeded { needed: usize, quota: usize },

    /// The underlying medium failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted image could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// An abstract persistent string-keyed map.
///
/// A failed `set` must leave any previous value for that key untouched.
pub trait BackingStore {
    /// Reads the raw value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), BackendError>;

    /// Deletes `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Deletes every key in `keys`.
    ///
    /// Stores that pay a fixed cost per mutation (such as rewriting a file)
    /// should override this to pay it once. The default stops at the first
    /// failure, so on error any prefix of `keys` may already be gone.
    fn remove_many(&self, keys: &[String]) -> Result<(), BackendError> {
        keys.iter().try_for_each(|key| self.remove(key))
    }

    /// Returns a snapshot of every key in the store.
    fn keys(&self) -> Result<Vec<String>, BackendError>;
}

impl<B: BackingStore + ?Sized> BackingStore for &B {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        (**self).remove(key)
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), BackendError> {
        (**self).remove_many(keys)
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        (**self).keys()
    }
}

impl<B: BackingStore + ?Sized> BackingStore for Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        (**self).remove(key)
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), BackendError> {
        (**self).remove_many(keys)
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        (**self).keys()
    }
}

/// Size a single entry counts against a quota.
#[inline]
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// An in-memory backing store with an optional byte quota.
///
/// The quota counts the UTF-8 length of every key plus its value, the way a
/// browser's local storage counts characters against its limit.
///
/// # Example
///
/// ```
/// use stashkv::storage::{BackingStore, MemoryBackend};
///
/// let store = MemoryBackend::with_quota(16);
/// assert!(store.set("k", "small").is_ok());
/// assert!(store.set("k", "far too large for the quota").is_err());
/// assert_eq!(store.get("k").unwrap().as_deref(), Some("small"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryBackend {
    /// Creates an unbounded in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that rejects writes past `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    /// Returns the number of keys currently stored (across all namespaces).
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the bytes currently counted against the quota.
    pub fn used_bytes(&self) -> usize {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.iter().map(|(k, v)| entry_size(k, v)).sum()
    }
}

impl BackingStore for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(quota) = self.quota {
            let used: usize = data.iter().map(|(k, v)| entry_size(k, v)).sum();
            let replaced = data.get(key).map(|old| entry_size(key, old)).unwrap_or(0);
            let needed = used - replaced + entry_size(key, value);

            if needed > quota {
                return Err(BackendError::QuotaExceeded { needed, quota });
            }
        }

        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), BackendError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.remove(key);
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), BackendError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, BackendError> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.keys().cloned().collect())
    }
}
