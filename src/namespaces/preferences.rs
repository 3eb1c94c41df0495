//! User preference persistence.
//!
//! Preferences live for a year, refreshed every time they are written. They
//! are meant to be stored plain; like every key, their actual mode is the
//! one the engine's [`ObfuscationPolicy`](crate::ObfuscationPolicy) assigns.

use crate::clock::Clock;
use crate::storage::{BackingStore, ReadOptions, StorageEngine, WriteOptions};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Lifetime of a stored preference.
pub const PREFERENCE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Logical key of the UI theme.
pub const THEME_KEY: &str = "theme";

/// Stores and retrieves user preferences.
pub struct PreferenceStore<'a, B, C> {
    engine: &'a StorageEngine<B, C>,
}

impl<'a, B: BackingStore, C: Clock> PreferenceStore<'a, B, C> {
    /// Create a preference store backed by the given engine.
    pub fn new(engine: &'a StorageEngine<B, C>) -> Self {
        Self { engine }
    }

    /// Persist a preference.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.engine.set(key, value, WriteOptions::ttl(PREFERENCE_TTL))
    }

    /// Load a preference.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.engine.get(key, ReadOptions::default())
    }

    /// Load a preference, falling back to `default` if it is unset or stale.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Forget a preference.
    pub fn remove(&self, key: &str) {
        self.engine.remove(key);
    }

    /// The stored UI theme name.
    pub fn theme(&self) -> Option<String> {
        self.get(THEME_KEY)
    }

    /// Persist the UI theme name.
    pub fn set_theme(&self, theme: &str) -> bool {
        self.set(THEME_KEY, theme)
    }
}
