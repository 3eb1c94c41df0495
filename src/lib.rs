//! # stashkv - A Namespaced, Expiring Key-Value Store
//!
//! stashkv persists small JSON values for an application (auth state, user
//! preferences, session scraps) on top of a plain string key-value backing
//! store. Every value is wrapped in an envelope that records when it was
//! written, when it expires and which storage format wrote it, so stale data
//! disappears on its own instead of lingering forever.
//!
//! ## Features
//!
//! - **Envelopes**: Payload plus `createdAt`, `expiresAt` and `formatVersion`
//! - **TTL Support**: Per-write lifetimes with an engine-wide default
//! - **Format Versioning**: Entries from another format version read as absent
//! - **Obfuscation**: Optional XOR + base64 masking of stored text (not encryption!)
//! - **Namespacing**: Each engine only ever touches keys under its own prefix
//! - **Diagnostics & Cleanup**: Report and purge stale entries in bulk
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                stashkv                                  │
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────────┐  ┌──────────────┐                 │
//! │  │  AuthStore  │  │ PreferenceStore │  │ SessionStore │   namespaces    │
//! │  └──────┬──────┘  └────────┬────────┘  └──────┬───────┘                 │
//! │         └──────────────────┼──────────────────┘                         │
//! │                            ▼                                            │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │                        StorageEngine                             │   │
//! │  │  prefix ── EngineConfig ── ObfuscationPolicy ── Clock            │   │
//! │  │         EnvelopeCodec (serde_json + Obfuscator)                  │   │
//! │  └─────────────────────────────┬────────────────────────────────────┘   │
//! │                                ▼                                        │
//! │  ┌──────────────────────────────────────────────────────────────────┐   │
//! │  │              BackingStore: MemoryBackend | FileBackend           │   │
//! │  └──────────────────────────────────────────────────────────────────┘   │
//! │                                ▲                                        │
//! │                     ┌──────────┴──────────┐                             │
//! │                     │   CleanupSweeper    │                             │
//! │                     │ (Background Tokio)  │                             │
//! │                     └─────────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use stashkv::{
//!     EngineConfig, MemoryBackend, ObfuscationPolicy, ReadOptions, StorageEngine, WriteOptions,
//! };
//! use std::time::Duration;
//!
//! // The policy decides which keys are stored obfuscated
//! let config = EngineConfig::new("app_").with_obfuscation(ObfuscationPolicy::keys(["auth_token"]));
//! let engine = StorageEngine::new(config, MemoryBackend::new()).unwrap();
//!
//! // Default TTL (24 hours), stored as plain JSON
//! engine.set("theme", "dark", WriteOptions::default());
//!
//! // One hour, obfuscated
//! engine.set(
//!     "auth_token",
//!     "abc123",
//!     WriteOptions::ttl(Duration::from_secs(3600)).obfuscated(true),
//! );
//!
//! assert_eq!(
//!     engine.get::<String>("auth_token", ReadOptions::obfuscated(true)),
//!     Some("abc123".to_string())
//! );
//!
//! // Cleanup decodes with the same policy, so live entries stay put
//! assert_eq!(engine.cleanup(), 0);
//! assert_eq!(engine.keys(), vec!["auth_token", "theme"]);
//! ```
//!
//! ## Module Overview
//!
//! - [`clock`]: Millisecond time sources, real and manual
//! - [`codec`]: Envelope type, JSON codec and obfuscation
//! - [`config`]: Engine configuration and the obfuscation policy
//! - [`storage`]: The engine, backing stores, expiry and diagnostics
//! - [`namespaces`]: Typed facades for auth, preferences and session data
//!
//! ## Design Highlights
//!
//! ### No Global Engine
//!
//! Engines are ordinary values. Pass them by reference, or share them behind
//! an `Arc` when the background sweeper needs one too.
//!
//! ### Lazy + Active Expiry
//!
//! Stale entries are removed in two ways:
//! 1. **Lazy**: A read that finds an expired, foreign-version or corrupt entry deletes it
//! 2. **Active**: `cleanup()` (optionally driven by the sweeper) scans the whole namespace
//!
//! ### Explicit Obfuscation Modes
//!
//! Whether a key is obfuscated is decided by the engine's
//! [`ObfuscationPolicy`], never by trying both decodings and seeing which one
//! works. Per-call flags may restate the policy but never override it, so
//! cleanup can always decode what the engine wrote.

pub mod clock;
pub mod codec;
pub mod config;
pub mod namespaces;
pub mod storage;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{DecodeError, EncodeError, Envelope, EnvelopeCodec, Obfuscator, FORMAT_VERSION};
pub use config::{ConfigError, EngineConfig, ObfuscationPolicy};
pub use namespaces::{AuthStore, PreferenceStore, SessionStore};
pub use storage::{
    start_cleanup_sweeper, BackendError, BackingStore, CleanupSweeper, EngineStats, FileBackend,
    KeyTtl, Lookup, MemoryBackend, ReadOptions, StaleReason, StorageDiagnostics, StorageEngine,
    SweeperConfig, Ttl, WriteError, WriteOptions,
};

/// Version of stashkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
