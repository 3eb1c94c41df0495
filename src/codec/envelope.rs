//! The Storage Envelope
//!
//! Every value the engine persists is wrapped in an [`Envelope`] that records
//! when it was written, when it stops being valid, and which format version
//! wrote it. On the wire an envelope is a JSON object:
//!
//! ```text
//! {"payload": <value>, "createdAt": 1700000000000, "expiresAt": 1700086400000, "formatVersion": "1.0"}
//! ```
//!
//! `expiresAt` is `null` for envelopes that never expire.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The envelope format version written by this crate.
pub const FORMAT_VERSION: &str = "1.0";

/// A versioned, timestamped, expiring wrapper around a stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// The stored value
    pub payload: T,
    /// Unix milliseconds at which the envelope was created
    pub created_at: u64,
    /// Unix milliseconds after which the envelope is expired (None = never)
    pub expires_at: Option<u64>,
    /// Format version of the writer
    pub format_version: String,
}

impl<T> Envelope<T> {
    /// Creates an envelope stamped at `now_ms`.
    ///
    /// A `ttl` of `None` produces an envelope that never expires.
    pub fn new(payload: T, now_ms: u64, ttl_ms: Option<u64>, format_version: &str) -> Self {
        Self {
            payload,
            created_at: now_ms,
            expires_at: ttl_ms.map(|ttl| now_ms.saturating_add(ttl)),
            format_version: format_version.to_string(),
        }
    }

    /// Checks if this envelope has expired at `now_ms`.
    #[inline]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        crate::storage::expiry::is_expired(self, now_ms)
    }

    /// Remaining lifetime at `now_ms`, or None if the envelope never expires.
    ///
    /// Returns a zero duration once the envelope has expired.
    pub fn remaining(&self, now_ms: u64) -> Option<Duration> {
        self.expires_at
            .map(|exp| Duration::from_millis(exp.saturating_sub(now_ms)))
    }

    /// Checks the structural invariants a freshly decoded envelope must hold.
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.format_version.is_empty() {
            return Err("empty format version");
        }
        if let Some(exp) = self.expires_at {
            if exp < self.created_at {
                return Err("expiresAt precedes createdAt");
            }
        }
        Ok(())
    }
}
