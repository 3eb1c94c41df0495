//! Namespaced Storage Engine with Expiry and Versioning
//!
//! This module implements the core storage engine for stashkv. It stores
//! typed values in any [`BackingStore`], wrapped in versioned, expiring
//! envelopes, under a fixed namespace prefix.
//!
//! ## Design Decisions
//!
//! 1. **Namespacing**: Logical key `k` lives at `prefix + k`. Nothing outside the prefix is ever touched.
//! 2. **Lazy Expiry**: Entries are judged on read, never marked. A stale entry is deleted the moment it is found.
//! 3. **Fail Closed**: Corrupt, expired and version-mismatched entries all read as absent.
//! 4. **No Exceptions for Data**: Write failures come back as `false`, read failures as `None`.
//!
//! ## Read Path
//!
//! ```text
//!  get(k) ──> backend.get(prefix+k) ──> None ─────────────────────────────> None
//!                    │
//!                    ▼
//!              codec.decode ──Err──┐
//!                    │             │
//!                    ▼             │
//!               expired? ──yes─────┤
//!                    │             ├──> backend.remove(prefix+k) ──> None
//!                    ▼             │
//!            version matches? ─no──┘
//!                    │
//!                    ▼
//!               Some(payload)
//! ```
//!
//! [`StorageEngine::inspect`] runs the same checks without the purge, for
//! callers that want to look before anything is deleted.
//!
//! ## Concurrency Model
//!
//! Every operation is synchronous and completes before returning. The engine
//! takes no locks of its own; each backend call is atomic but nothing spans
//! calls. Another writer sharing the backing store can slip in between the
//! read and the purge of a `get`, and the last write wins. There is no
//! read-modify-write or compare-and-swap, so counters and similar data that
//! need atomic updates do not belong here.

use crate::clock::{duration_to_ms, Clock, SystemClock};
use crate::codec::{DecodeError, EncodeError, Envelope, EnvelopeCodec, Obfuscator};
use crate::config::{ConfigError, EngineConfig};
use crate::storage::backend::{BackendError, BackingStore};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Lifetime requested for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Expire this long after the write
    After(Duration),
    /// Never expire
    Never,
}

/// Options for [`StorageEngine::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Lifetime of the entry (None = the engine's default TTL)
    pub ttl: Option<Ttl>,
    /// Store obfuscated (None = the engine's obfuscation policy)
    pub obfuscate: Option<bool>,
}

impl WriteOptions {
    /// Options that expire the entry after `ttl`.
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(Ttl::After(ttl)),
            ..Default::default()
        }
    }

    /// Options for an entry that never expires.
    pub fn never_expire() -> Self {
        Self {
            ttl: Some(Ttl::Never),
            ..Default::default()
        }
    }

    /// Sets whether the entry is stored obfuscated.
    pub fn obfuscated(mut self, obfuscate: bool) -> Self {
        self.obfuscate = Some(obfuscate);
        self
    }
}

/// Options for reads.
///
/// The engine does not record how an entry was stored, so a read must use
/// the same obfuscation mode as the write that produced it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Entry was stored obfuscated (None = the engine's obfuscation policy)
    pub obfuscated: Option<bool>,
}

impl ReadOptions {
    /// Options that read the entry in the given obfuscation mode.
    pub fn obfuscated(obfuscated: bool) -> Self {
        Self {
            obfuscated: Some(obfuscated),
        }
    }
}

/// Why a stored entry cannot be returned.
#[derive(Debug, Clone, PartialEq)]
pub enum StaleReason {
    /// The backing store failed to read the entry
    Unreadable(String),
    /// The entry could not be decoded
    Undecodable(DecodeError),
    /// The entry expired at the given Unix millisecond
    Expired { expires_at: u64 },
    /// The entry was written by a different format version
    VersionMismatch { found: String },
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable(e) => write!(f, "unreadable: {}", e),
            Self::Undecodable(e) => write!(f, "undecodable: {}", e),
            Self::Expired { expires_at } => write!(f, "expired at {}", expires_at),
            Self::VersionMismatch { found } => write!(f, "format version {}", found),
        }
    }
}

/// The result of looking at a key without side effects.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Nothing is stored under the key
    Missing,
    /// A live, current-version envelope
    Live(Envelope<T>),
    /// Something is stored but `get` would purge it
    Stale(StaleReason),
}

impl<T> Lookup<T> {
    /// Returns the payload of a live entry.
    pub fn into_payload(self) -> Option<T> {
        match self {
            Self::Live(envelope) => Some(envelope.payload),
            _ => None,
        }
    }

    /// Returns true if the entry would be purged on read.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }
}

/// Remaining lifetime of a live key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key never expires
    Persistent,
    /// The key expires after this long
    Remaining(Duration),
}

/// Errors from [`StorageEngine::try_set`].
#[derive(Debug, Error)]
pub enum WriteError {
    /// The value could not be serialized
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The backing store rejected the write
    #[error("backend write failed: {0}")]
    Backend(#[from] BackendError),

    /// The explicit obfuscation flag disagrees with the engine's policy
    #[error("obfuscate={requested} for key '{key}' contradicts the obfuscation policy")]
    ObfuscationMismatch { key: String, requested: bool },
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Total get operations
    pub gets: u64,
    /// Gets that returned a value
    pub hits: u64,
    /// Gets that returned nothing
    pub misses: u64,
    /// Total set operations
    pub sets: u64,
    /// Sets that failed to persist
    pub write_failures: u64,
    /// Entries removed because they were stale
    pub purged: u64,
}

/// The storage engine.
///
/// Construct one at startup and pass it by reference (or `Arc`) to whatever
/// needs it. Several engines with different prefixes can share one backing
/// store without seeing each other's keys.
///
/// # Example
///
/// ```
/// use stashkv::{EngineConfig, ObfuscationPolicy, ReadOptions, StorageEngine, WriteOptions};
/// use stashkv::storage::MemoryBackend;
/// use std::time::Duration;
///
/// let config = EngineConfig::new("app_").with_obfuscation(ObfuscationPolicy::keys(["token"]));
/// let engine = StorageEngine::new(config, MemoryBackend::new()).unwrap();
///
/// // Plain value with the default TTL
/// assert!(engine.set("theme", "dark", WriteOptions::default()));
/// assert_eq!(engine.get::<String>("theme", ReadOptions::default()), Some("dark".to_string()));
///
/// // Obfuscated (per the policy) with its own TTL
/// let opts = WriteOptions::ttl(Duration::from_secs(60)).obfuscated(true);
/// assert!(engine.set("token", "tok-123", opts));
/// assert_eq!(
///     engine.get::<String>("token", ReadOptions::obfuscated(true)),
///     Some("tok-123".to_string())
/// );
///
/// // A flag that contradicts the policy is refused
/// assert!(!engine.set("theme", "light", WriteOptions::default().obfuscated(true)));
/// ```
pub struct StorageEngine<B, C = SystemClock> {
    /// Immutable engine settings
    config: EngineConfig,

    /// Where the raw strings live
    backend: B,

    /// Source of every timestamp
    clock: C,

    /// Envelope encoder/decoder
    codec: EnvelopeCodec,

    /// Statistics: total get operations
    get_count: AtomicU64,

    /// Statistics: gets that returned a value
    hit_count: AtomicU64,

    /// Statistics: total set operations
    set_count: AtomicU64,

    /// Statistics: sets that failed
    write_failure_count: AtomicU64,

    /// Statistics: stale entries removed
    purge_count: AtomicU64,
}

impl<B, C> std::fmt::Debug for StorageEngine<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("prefix", &self.config.prefix)
            .field("format_version", &self.config.format_version)
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl<B: BackingStore> StorageEngine<B, SystemClock> {
    /// Creates an engine on the system clock.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the config is invalid.
    pub fn new(config: EngineConfig, backend: B) -> Result<Self, ConfigError> {
        Self::with_clock(config, backend, SystemClock)
    }
}

impl<B: BackingStore, C: Clock> StorageEngine<B, C> {
    /// Creates an engine with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the config is invalid.
    pub fn with_clock(config: EngineConfig, backend: B, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;

        let codec = EnvelopeCodec::new(Obfuscator::new(&config.obfuscation_key));

        debug!(
            prefix = %config.prefix,
            format_version = %config.format_version,
            default_ttl_ms = config.default_ttl.map(duration_to_ms),
            "Storage engine initialized"
        );

        Ok(Self {
            config,
            backend,
            clock,
            codec,
            get_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            write_failure_count: AtomicU64::new(0),
            purge_count: AtomicU64::new(0),
        })
    }

    /// Returns the engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Returns the backing store.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the engine's clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Maps a logical key to its backing-store key.
    #[inline]
    pub(crate) fn namespaced(&self, key: &str) -> String {
        let mut raw = String::with_capacity(self.config.prefix.len() + key.len());
        raw.push_str(&self.config.prefix);
        raw.push_str(key);
        raw
    }

    /// Resolves an optional per-call obfuscation flag against the policy.
    #[inline]
    pub(crate) fn obfuscation_for(&self, key: &str, flag: Option<bool>) -> bool {
        flag.unwrap_or_else(|| self.config.obfuscation.applies_to(key))
    }

    /// Stores `value` under `key`.
    ///
    /// Returns `false` if the value could not be serialized or the backing
    /// store rejected the write (e.g. quota exceeded). A failed write leaves
    /// any previous value for the key untouched.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, options: WriteOptions) -> bool {
        match self.try_set(key, value, options) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Write failed");
                false
            }
        }
    }

    /// Stores `value` under `key`, reporting why a write failed.
    ///
    /// An explicit `obfuscate` flag must agree with the engine's
    /// [`ObfuscationPolicy`](crate::ObfuscationPolicy). Cleanup decodes every
    /// entry in its policy mode, so an entry written any other way would
    /// later be purged as undecodable while still live.
    pub fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: WriteOptions,
    ) -> Result<(), WriteError> {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let ttl_ms = match options.ttl {
            Some(Ttl::After(ttl)) => Some(duration_to_ms(ttl)),
            Some(Ttl::Never) => None,
            None => self.config.default_ttl.map(duration_to_ms),
        };

        let obfuscate = self.config.obfuscation.applies_to(key);
        if let Some(requested) = options.obfuscate {
            if requested != obfuscate {
                self.write_failure_count.fetch_add(1, Ordering::Relaxed);
                return Err(WriteError::ObfuscationMismatch {
                    key: key.to_string(),
                    requested,
                });
            }
        }

        let envelope = Envelope::new(
            value,
            self.clock.now_ms(),
            ttl_ms,
            &self.config.format_version,
        );

        let result = self
            .codec
            .encode(&envelope, obfuscate)
            .map_err(WriteError::from)
            .and_then(|raw| {
                self.backend
                    .set(&self.namespaced(key), &raw)
                    .map_err(WriteError::from)
            });

        match &result {
            Ok(()) => trace!(key, obfuscate, ttl_ms, "Stored entry"),
            Err(_) => {
                self.write_failure_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        result
    }

    /// Looks at `key` without modifying anything.
    ///
    /// This is the side-effect-free half of [`get`](Self::get): it reports
    /// what `get` would return, or why `get` would purge the entry.
    pub fn inspect<T: DeserializeOwned>(&self, key: &str, options: ReadOptions) -> Lookup<T> {
        let obfuscated = self.obfuscation_for(key, options.obfuscated);
        self.inspect_raw(&self.namespaced(key), obfuscated)
    }

    /// Inspects a backing-store key in a known obfuscation mode.
    pub(crate) fn inspect_raw<T: DeserializeOwned>(&self, raw_key: &str, obfuscated: bool) -> Lookup<T> {
        match self.backend.get(raw_key) {
            Ok(Some(raw)) => self.judge(&raw, obfuscated),
            Ok(None) => Lookup::Missing,
            Err(e) => Lookup::Stale(StaleReason::Unreadable(e.to_string())),
        }
    }

    /// Decodes a stored string and checks expiry and format version.
    pub(crate) fn judge<T: DeserializeOwned>(&self, raw: &str, obfuscated: bool) -> Lookup<T> {
        let envelope: Envelope<T> = match self.codec.decode(raw, obfuscated) {
            Ok(envelope) => envelope,
            Err(e) => return Lookup::Stale(StaleReason::Undecodable(e)),
        };

        if envelope.is_expired(self.clock.now_ms()) {
            return Lookup::Stale(StaleReason::Expired {
                // is_expired only holds for envelopes with an expiry
                expires_at: envelope.expires_at.unwrap_or_default(),
            });
        }

        if envelope.format_version != self.config.format_version {
            return Lookup::Stale(StaleReason::VersionMismatch {
                found: envelope.format_version,
            });
        }

        Lookup::Live(envelope)
    }

    /// Reads the value stored under `key`.
    ///
    /// Returns `None` if nothing is stored, or if the stored entry is
    /// unreadable, corrupt, expired, or from another format version. In the
    /// last four cases the entry is deleted as a side effect, so it cannot
    /// resurface. Callers cannot tell "never set" from "set but stale" here;
    /// use [`inspect`](Self::inspect) or
    /// [`diagnostics`](Self::diagnostics) for that.
    pub fn get<T: DeserializeOwned>(&self, key: &str, options: ReadOptions) -> Option<T> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let payload = self.read_through(key, options).map(|envelope| envelope.payload);
        if payload.is_some() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }
        payload
    }

    /// Returns true if [`get`](Self::get) would return a value, with the same
    /// purge side effects.
    ///
    /// The payload is not deserialized into any particular type, so any
    /// well-formed live entry counts.
    pub fn has(&self, key: &str, options: ReadOptions) -> bool {
        self.get::<IgnoredAny>(key, options).is_some()
    }

    /// Returns the remaining lifetime of a live key, with the same purge side
    /// effects as [`get`](Self::get).
    pub fn ttl(&self, key: &str, options: ReadOptions) -> Option<KeyTtl> {
        let now = self.clock.now_ms();
        self.read_through::<IgnoredAny>(key, options)
            .map(|envelope| match envelope.remaining(now) {
                Some(remaining) => KeyTtl::Remaining(remaining),
                None => KeyTtl::Persistent,
            })
    }

    /// Inspects `key` and purges it if it is stale.
    fn read_through<T: DeserializeOwned>(&self, key: &str, options: ReadOptions) -> Option<Envelope<T>> {
        let raw_key = self.namespaced(key);
        let obfuscated = self.obfuscation_for(key, options.obfuscated);

        match self.inspect_raw(&raw_key, obfuscated) {
            Lookup::Live(envelope) => Some(envelope),
            Lookup::Missing => None,
            Lookup::Stale(reason) => {
                self.purge(&raw_key, &reason);
                None
            }
        }
    }

    /// Deletes a stale entry, best effort. Returns true if it was removed.
    pub(crate) fn purge(&self, raw_key: &str, reason: &StaleReason) -> bool {
        match self.backend.remove(raw_key) {
            Ok(()) => {
                self.purge_count.fetch_add(1, Ordering::Relaxed);
                debug!(key = raw_key, %reason, "Purged stale entry");
                true
            }
            Err(e) => {
                warn!(key = raw_key, %reason, error = %e, "Failed to purge stale entry");
                false
            }
        }
    }

    /// Deletes a batch of stale entries, best effort. Returns how many were
    /// removed.
    pub(crate) fn purge_many(&self, raw_keys: &[String]) -> usize {
        let purged = self.remove_raw_keys(raw_keys);
        self.purge_count.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Deletes `key`. Deleting a missing key is a no-op.
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove(&self.namespaced(key)) {
            warn!(key, error = %e, "Remove failed");
        }
    }

    /// Deletes the given backing-store keys, best effort. Returns how many
    /// were removed.
    ///
    /// Tries one batched removal first and falls back to removing keys one
    /// at a time if the batch fails, so a single bad key cannot block the rest.
    pub(crate) fn remove_raw_keys(&self, raw_keys: &[String]) -> usize {
        if raw_keys.is_empty() {
            return 0;
        }

        match self.backend.remove_many(raw_keys) {
            Ok(()) => raw_keys.len(),
            Err(e) => {
                warn!(error = %e, keys = raw_keys.len(), "Batched remove failed, removing one by one");
                raw_keys
                    .iter()
                    .filter(|raw| match self.backend.remove(raw) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(key = %raw, error = %e, "Failed to remove key");
                            false
                        }
                    })
                    .count()
            }
        }
    }

    /// Returns every backing-store key under this engine's prefix, paired
    /// with its logical name.
    pub(crate) fn namespaced_keys(&self) -> Vec<(String, String)> {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = %self.config.prefix, error = %e, "Failed to list keys");
                return Vec::new();
            }
        };

        let mut entries: Vec<(String, String)> = keys
            .into_iter()
            .filter_map(|raw| {
                let logical = raw.strip_prefix(self.config.prefix.as_str())?.to_string();
                Some((raw, logical))
            })
            .collect();
        entries.sort();
        entries
    }

    /// Returns the logical names of every key under the prefix, sorted.
    ///
    /// Entries are listed whether or not they are still live.
    pub fn keys(&self) -> Vec<String> {
        self.namespaced_keys()
            .into_iter()
            .map(|(_, logical)| logical)
            .collect()
    }

    /// Returns the number of keys under the prefix, live or not.
    pub fn len(&self) -> usize {
        self.namespaced_keys().len()
    }

    /// Returns true if nothing is stored under the prefix.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every key under this engine's prefix.
    ///
    /// Keys belonging to other prefixes in the same backing store are left
    /// alone. Returns the number of keys deleted.
    pub fn clear(&self) -> usize {
        let raw_keys: Vec<String> = self
            .namespaced_keys()
            .into_iter()
            .map(|(raw, _)| raw)
            .collect();
        let removed = self.remove_raw_keys(&raw_keys);

        debug!(prefix = %self.config.prefix, removed, "Cleared namespace");
        removed
    }

    /// Returns operation statistics.
    pub fn stats(&self) -> EngineStats {
        let gets = self.get_count.load(Ordering::Relaxed);
        let hits = self.hit_count.load(Ordering::Relaxed);

        EngineStats {
            gets,
            hits,
            misses: gets.saturating_sub(hits),
            sets: self.set_count.load(Ordering::Relaxed),
            write_failures: self.write_failure_count.load(Ordering::Relaxed),
            purged: self.purge_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec::FORMAT_VERSION;
    use crate::config::ObfuscationPolicy;
    use crate::storage::backend::MemoryBackend;
    use serde::Deserialize;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Arc, Mutex};

    const HOUR_MS: u64 = 60 * 60 * 1000;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        id: u64,
        email: String,
        tags: Vec<String>,
    }

    fn profile() -> Profile {
        Profile {
            id: 42,
            email: "ariz@example.com".to_string(),
            tags: vec!["admin".to_string(), "beta".to_string()],
        }
    }

    fn engine() -> (StorageEngine<MemoryBackend, ManualClock>, ManualClock) {
        engine_with(EngineConfig::new("test_"), MemoryBackend::new())
    }

    fn engine_with<B: BackingStore>(
        config: EngineConfig,
        backend: B,
    ) -> (StorageEngine<B, ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let engine = StorageEngine::with_clock(config, backend, clock.clone()).unwrap();
        (engine, clock)
    }

    #[test]
    fn test_set_and_get() {
        let (engine, _) = engine();

        assert!(engine.set("key", "value", WriteOptions::default()));
        assert_eq!(
            engine.get::<String>("key", ReadOptions::default()),
            Some("value".to_string())
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let (engine, _) = engine();
        assert_eq!(engine.get::<String>("nonexistent", ReadOptions::default()), None);
    }

    #[test]
    fn test_round_trip_structured_values() {
        let (engine, _) = engine();

        let mut settings = BTreeMap::new();
        settings.insert("sidebar".to_string(), true);
        settings.insert("compact".to_string(), false);

        assert!(engine.set("profile", &profile(), WriteOptions::ttl(Duration::from_secs(60))));
        assert!(engine.set("settings", &settings, WriteOptions::default()));
        assert!(engine.set("count", &7u32, WriteOptions::default()));

        assert_eq!(engine.get("profile", ReadOptions::default()), Some(profile()));
        assert_eq!(engine.get("settings", ReadOptions::default()), Some(settings));
        assert_eq!(engine.get::<u32>("count", ReadOptions::default()), Some(7));
    }

    fn obfuscating_engine(keys: &[&str]) -> (StorageEngine<MemoryBackend, ManualClock>, ManualClock) {
        let config = EngineConfig::new("test_")
            .with_obfuscation(ObfuscationPolicy::keys(keys.iter().copied()));
        engine_with(config, MemoryBackend::new())
    }

    #[test]
    fn test_round_trip_obfuscated() {
        let (engine, _) = obfuscating_engine(&["profile"]);
        let opts = WriteOptions::ttl(Duration::from_secs(60)).obfuscated(true);

        assert!(engine.set("profile", &profile(), opts));

        let raw = engine.backend().get("test_profile").unwrap().unwrap();
        assert!(!raw.contains("ariz@example.com"));

        assert_eq!(
            engine.get("profile", ReadOptions::obfuscated(true)),
            Some(profile())
        );
    }

    #[test]
    fn test_keys_are_namespaced() {
        let (engine, _) = engine();
        engine.set("theme", "dark", WriteOptions::default());

        assert!(engine.backend().get("test_theme").unwrap().is_some());
        assert!(engine.backend().get("theme").unwrap().is_none());
    }

    #[test]
    fn test_envelope_metadata() {
        let (engine, clock) = engine();
        engine.set("key", "value", WriteOptions::ttl(Duration::from_secs(10)));

        match engine.inspect::<String>("key", ReadOptions::default()) {
            Lookup::Live(envelope) => {
                assert_eq!(envelope.payload, "value");
                assert_eq!(envelope.created_at, clock.now_ms());
                assert_eq!(envelope.expires_at, Some(clock.now_ms() + 10_000));
                assert_eq!(envelope.format_version, FORMAT_VERSION);
            }
            other => panic!("expected live entry, got {:?}", other),
        }
    }

    #[test]
    fn test_default_ttl_applies() {
        let config = EngineConfig::new("test_").with_default_ttl(Some(Duration::from_secs(5)));
        let (engine, clock) = engine_with(config, MemoryBackend::new());

        engine.set("key", "value", WriteOptions::default());
        clock.advance_ms(5_000);
        assert!(engine.has("key", ReadOptions::default()));

        clock.advance_ms(1);
        assert!(!engine.has("key", ReadOptions::default()));
    }

    #[test]
    fn test_never_expire() {
        let (engine, clock) = engine();
        engine.set("key", "value", WriteOptions::never_expire());

        clock.advance_ms(10 * 365 * 24 * HOUR_MS);
        assert_eq!(
            engine.ttl("key", ReadOptions::default()),
            Some(KeyTtl::Persistent)
        );
        assert!(engine.has("key", ReadOptions::default()));
    }

    #[test]
    fn test_no_default_ttl_never_expires() {
        let config = EngineConfig::new("test_").with_default_ttl(None);
        let (engine, clock) = engine_with(config, MemoryBackend::new());

        engine.set("key", "value", WriteOptions::default());
        clock.advance_ms(u64::MAX / 2);
        assert!(engine.has("key", ReadOptions::default()));
    }

    #[test]
    fn test_expiry_purges_on_read() {
        let (engine, clock) = engine();
        engine.set("key", "value", WriteOptions::ttl(Duration::from_secs(1)));

        clock.advance_ms(2_000);

        // Still physically present until someone reads it
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get::<String>("key", ReadOptions::default()), None);
        assert_eq!(engine.len(), 0);
        assert!(engine.diagnostics().expired_keys.is_empty());
        assert_eq!(engine.stats().purged, 1);
    }

    #[test]
    fn test_version_guard() {
        let (engine, _) = engine();

        let foreign = r#"{"payload":"old","createdAt":1,"expiresAt":null,"formatVersion":"0.9"}"#;
        engine.backend().set("test_legacy", foreign).unwrap();

        assert!(matches!(
            engine.inspect::<String>("legacy", ReadOptions::default()),
            Lookup::Stale(StaleReason::VersionMismatch { ref found }) if found == "0.9"
        ));
        assert_eq!(engine.get::<String>("legacy", ReadOptions::default()), None);
        assert_eq!(engine.backend().get("test_legacy").unwrap(), None);
    }

    #[test]
    fn test_engine_version_bump_invalidates_entries() {
        let backend = Arc::new(MemoryBackend::new());
        let (v1, _) = engine_with(EngineConfig::new("app_"), Arc::clone(&backend));
        let (v2, _) = engine_with(
            EngineConfig::new("app_").with_format_version("2.0"),
            Arc::clone(&backend),
        );

        v1.set("key", "value", WriteOptions::default());
        assert_eq!(v2.get::<String>("key", ReadOptions::default()), None);
        assert!(backend.is_empty());
    }

    #[test]
    fn test_corrupt_entry_purged() {
        let (engine, _) = engine();
        engine.backend().set("test_broken", "{not json").unwrap();

        assert!(engine
            .inspect::<String>("broken", ReadOptions::default())
            .is_stale());
        assert_eq!(engine.get::<String>("broken", ReadOptions::default()), None);
        assert_eq!(engine.backend().get("test_broken").unwrap(), None);
    }

    #[test]
    fn test_obfuscation_mismatch_reads_as_corrupt() {
        let (engine, _) = obfuscating_engine(&["token"]);
        assert!(engine.set("token", "tok", WriteOptions::default()));

        assert_eq!(engine.get::<String>("token", ReadOptions::obfuscated(false)), None);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_flag_contradicting_policy_is_refused() {
        let (engine, _) = obfuscating_engine(&["token"]);
        engine.set("theme", "dark", WriteOptions::default());

        // Plain key asked to be obfuscated
        assert!(!engine.set("theme", "light", WriteOptions::default().obfuscated(true)));
        assert!(matches!(
            engine.try_set("theme", "light", WriteOptions::default().obfuscated(true)),
            Err(WriteError::ObfuscationMismatch { ref key, requested: true }) if key == "theme"
        ));

        // Obfuscated key asked to be plain
        assert!(matches!(
            engine.try_set("token", "tok", WriteOptions::default().obfuscated(false)),
            Err(WriteError::ObfuscationMismatch { requested: false, .. })
        ));

        // Prior value untouched, nothing new stored
        assert_eq!(
            engine.get::<String>("theme", ReadOptions::default()),
            Some("dark".to_string())
        );
        assert_eq!(engine.keys(), vec!["theme".to_string()]);
        assert_eq!(engine.stats().write_failures, 3);
    }

    #[test]
    fn test_inspect_has_no_side_effects() {
        let (engine, clock) = engine();
        engine.set("key", "value", WriteOptions::ttl(Duration::from_secs(1)));
        clock.advance_ms(5_000);

        for _ in 0..3 {
            assert!(matches!(
                engine.inspect::<String>("key", ReadOptions::default()),
                Lookup::Stale(StaleReason::Expired { .. })
            ));
        }
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.stats().gets, 0);
        assert_eq!(engine.stats().purged, 0);
    }

    #[test]
    fn test_policy_drives_default_mode() {
        let config = EngineConfig::new("test_")
            .with_obfuscation(ObfuscationPolicy::keys(["token"]));
        let (engine, _) = engine_with(config, MemoryBackend::new());

        engine.set("token", "tok-1", WriteOptions::default());
        engine.set("theme", "dark", WriteOptions::default());

        let raw_token = engine.backend().get("test_token").unwrap().unwrap();
        let raw_theme = engine.backend().get("test_theme").unwrap().unwrap();
        assert!(!raw_token.contains("tok-1"));
        assert!(raw_theme.contains("dark"));

        assert_eq!(
            engine.get::<String>("token", ReadOptions::default()),
            Some("tok-1".to_string())
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (engine, _) = engine();
        engine.set("key", "value", WriteOptions::default());

        engine.remove("key");
        assert!(!engine.has("key", ReadOptions::default()));
        engine.remove("key");
        engine.remove("never-existed");
    }

    #[test]
    fn test_has_ignores_payload_type() {
        let (engine, _) = engine();
        engine.set("profile", &profile(), WriteOptions::default());
        assert!(engine.has("profile", ReadOptions::default()));
    }

    #[test]
    fn test_ttl_remaining() {
        let (engine, clock) = engine();
        engine.set("key", "value", WriteOptions::ttl(Duration::from_secs(100)));

        clock.advance_ms(40_000);
        assert_eq!(
            engine.ttl("key", ReadOptions::default()),
            Some(KeyTtl::Remaining(Duration::from_secs(60)))
        );
        assert_eq!(engine.ttl("missing", ReadOptions::default()), None);
    }

    #[test]
    fn test_overwrite_resets_envelope() {
        let (engine, clock) = engine();
        engine.set("key", "first", WriteOptions::ttl(Duration::from_secs(1)));

        clock.advance_ms(500);
        engine.set("key", "second", WriteOptions::ttl(Duration::from_secs(1)));
        clock.advance_ms(800);

        assert_eq!(
            engine.get::<String>("key", ReadOptions::default()),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_namespace_isolation() {
        let backend = Arc::new(MemoryBackend::new());
        let (a, _) = engine_with(EngineConfig::new("a_"), Arc::clone(&backend));
        let (b, _) = engine_with(EngineConfig::new("b_"), Arc::clone(&backend));

        a.set("shared", "from a", WriteOptions::default());
        b.set("shared", "from b", WriteOptions::default());
        b.set("only_b", "x", WriteOptions::default());

        assert_eq!(a.clear(), 1);

        assert_eq!(a.get::<String>("shared", ReadOptions::default()), None);
        assert_eq!(
            b.get::<String>("shared", ReadOptions::default()),
            Some("from b".to_string())
        );
        assert_eq!(b.keys(), vec!["only_b".to_string(), "shared".to_string()]);
    }

    #[test]
    fn test_clear_ignores_foreign_keys() {
        let (engine, _) = engine();
        engine.backend().set("unrelated", "keep me").unwrap();
        engine.backend().set("tes", "prefix of the prefix").unwrap();
        engine.set("mine", "x", WriteOptions::default());

        assert_eq!(engine.clear(), 1);
        assert_eq!(engine.backend().len(), 2);
    }

    #[test]
    fn test_quota_failure_preserves_prior_value() {
        let (engine, _) = engine_with(EngineConfig::new("q_"), MemoryBackend::with_quota(200));

        assert!(engine.set("key", "small", WriteOptions::default()));

        let huge = "x".repeat(1_000);
        assert!(!engine.set("key", &huge, WriteOptions::default()));
        assert!(matches!(
            engine.try_set("key", &huge, WriteOptions::default()),
            Err(WriteError::Backend(BackendError::QuotaExceeded { .. }))
        ));

        assert_eq!(
            engine.get::<String>("key", ReadOptions::default()),
            Some("small".to_string())
        );
        assert!(!engine.set("other", &huge, WriteOptions::default()));
        assert_eq!(engine.get::<String>("other", ReadOptions::default()), None);
        assert_eq!(engine.stats().write_failures, 3);
    }

    #[test]
    fn test_unserializable_value_fails_write() {
        let (engine, _) = engine();
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON object keys");

        assert!(matches!(
            engine.try_set("bad", &map, WriteOptions::default()),
            Err(WriteError::Encode(_))
        ));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_auth_token_scenario() {
        let (engine, clock) = obfuscating_engine(&["auth_token"]);
        let opts = WriteOptions::ttl(Duration::from_millis(86_400_000)).obfuscated(true);

        assert!(engine.set("auth_token", "tok-123", opts));
        assert_eq!(
            engine.get::<String>("auth_token", ReadOptions::obfuscated(true)),
            Some("tok-123".to_string())
        );

        clock.advance_ms(25 * HOUR_MS);
        assert_eq!(
            engine.get::<String>("auth_token", ReadOptions::obfuscated(true)),
            None
        );

        engine.cleanup();
        assert!(!engine
            .diagnostics()
            .expired_keys
            .contains(&"auth_token".to_string()));
    }

    #[test]
    fn test_stats() {
        let (engine, _) = engine();

        engine.set("a", "1", WriteOptions::default());
        engine.get::<String>("a", ReadOptions::default());
        engine.get::<String>("b", ReadOptions::default());

        let stats = engine.stats();
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = StorageEngine::new(EngineConfig::new(""), MemoryBackend::new());
        assert!(matches!(result, Err(ConfigError::EmptyPrefix)));
    }

    /// A backing store whose reads or removes fail for chosen keys.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        unreadable: Mutex<HashSet<String>>,
        unremovable: Mutex<HashSet<String>>,
        remove_attempts: AtomicU64,
    }

    impl FlakyBackend {
        fn fail_reads(&self, key: &str) {
            self.unreadable.lock().unwrap().insert(key.to_string());
        }

        fn fail_removes(&self, key: &str) {
            self.unremovable.lock().unwrap().insert(key.to_string());
        }

        fn injected(key: &str) -> BackendError {
            BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("injected failure for {}", key),
            ))
        }
    }

    impl BackingStore for FlakyBackend {
        fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
            if self.unreadable.lock().unwrap().contains(key) {
                return Err(Self::injected(key));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), BackendError> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), BackendError> {
            self.remove_attempts.fetch_add(1, Ordering::Relaxed);
            if self.unremovable.lock().unwrap().contains(key) {
                return Err(Self::injected(key));
            }
            self.inner.remove(key)
        }

        fn keys(&self) -> Result<Vec<String>, BackendError> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_unreadable_entry_is_missing_and_purged() {
        let (engine, _) = engine_with(EngineConfig::new("test_"), FlakyBackend::default());
        engine.set("key", "value", WriteOptions::default());
        engine.backend().fail_reads("test_key");

        assert!(matches!(
            engine.inspect::<String>("key", ReadOptions::default()),
            Lookup::Stale(StaleReason::Unreadable(_))
        ));

        let report = engine.diagnostics();
        assert_eq!(report.total_items, 1);
        assert_eq!(report.expired_keys, vec!["key".to_string()]);

        assert_eq!(engine.get::<String>("key", ReadOptions::default()), None);
        assert_eq!(engine.backend().remove_attempts.load(Ordering::Relaxed), 1);
        assert_eq!(engine.backend().inner.get("test_key").unwrap(), None);
        assert_eq!(engine.stats().purged, 1);
    }

    #[test]
    fn test_failed_purge_leaves_entry_in_place() {
        let (engine, clock) = engine_with(EngineConfig::new("test_"), FlakyBackend::default());
        engine.set("key", "value", WriteOptions::ttl(Duration::from_secs(1)));
        engine.backend().fail_removes("test_key");
        clock.advance_ms(2_000);

        assert_eq!(engine.get::<String>("key", ReadOptions::default()), None);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.cleanup(), 0);
        assert_eq!(engine.stats().purged, 0);
        assert_eq!(engine.diagnostics().expired_keys, vec!["key".to_string()]);
    }

    #[test]
    fn test_clear_skips_keys_it_cannot_remove() {
        let (engine, _) = engine_with(EngineConfig::new("test_"), FlakyBackend::default());
        for key in ["a", "b", "c"] {
            engine.set(key, "value", WriteOptions::default());
        }
        engine.backend().fail_removes("test_b");

        assert_eq!(engine.clear(), 2);
        assert_eq!(engine.keys(), vec!["b".to_string()]);

        // remove() reports nothing but leaves the key
        engine.remove("b");
        assert!(engine.has("b", ReadOptions::default()));
    }

    #[test]
    fn test_shared_across_threads() {
        use std::thread;

        let engine = Arc::new(
            StorageEngine::new(EngineConfig::new("mt_"), MemoryBackend::new()).unwrap(),
        );
        let mut handles = vec![];

        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..50 {
                    let key = format!("key-{}-{}", i, j);
                    assert!(engine.set(&key, &j, WriteOptions::default()));
                    assert_eq!(engine.get::<i32>(&key, ReadOptions::default()), Some(j));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 400);
    }
}
