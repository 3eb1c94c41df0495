//! Storage Engine Module
//!
//! This module provides the core storage functionality for stashkv: the
//! namespaced engine, the backing-store abstraction with two implementations,
//! the expiration policy, and the diagnostics/cleanup pass.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │   prefix + key ──> EnvelopeCodec ──> is_expired / version   │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ get / set / remove / keys
//!                            ▼
//!            ┌───────────────────────────────┐
//!            │         BackingStore          │
//!            │  MemoryBackend | FileBackend  │
//!            └───────────────────────────────┘
//!                            ▲
//!                            │ cleanup()
//!              ┌─────────────┴─────────────┐
//!              │     CleanupSweeper        │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Namespacing**: Every engine owns one key prefix and nothing else
//! - **TTL Support**: Entries carry their own expiry
//! - **Format Versioning**: Entries from another format version read as absent
//! - **Purge-on-Read**: Stale entries are deleted when a read finds them
//! - **Active Cleanup**: Optional background sweeper for entries nobody reads
//!
//! ## Example
//!
//! ```
//! use stashkv::storage::{MemoryBackend, StorageEngine, WriteOptions, ReadOptions};
//! use stashkv::EngineConfig;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new(EngineConfig::new("demo_"), MemoryBackend::new()).unwrap();
//!
//! engine.set("name", "Ariz", WriteOptions::default());
//! assert_eq!(engine.get::<String>("name", ReadOptions::default()), Some("Ariz".to_string()));
//!
//! engine.set("session", "token123", WriteOptions::ttl(Duration::from_secs(3600)));
//! assert_eq!(engine.diagnostics().total_items, 2);
//! ```

pub mod backend;
pub mod diagnostics;
pub mod engine;
pub mod expiry;
pub mod file;

// Re-export commonly used types
pub use backend::{BackendError, BackingStore, MemoryBackend};
pub use diagnostics::StorageDiagnostics;
pub use engine::{
    EngineStats, KeyTtl, Lookup, ReadOptions, StaleReason, StorageEngine, Ttl, WriteError,
    WriteOptions,
};
pub use expiry::{is_expired, start_cleanup_sweeper, CleanupSweeper, SweeperConfig};
pub use file::FileBackend;
