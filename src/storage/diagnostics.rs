//! Namespace Diagnostics and Cleanup
//!
//! Both operations walk every key under the engine's prefix and judge each
//! entry exactly the way [`StorageEngine::get`] would. Entries are decoded in
//! the mode the engine's [`ObfuscationPolicy`](crate::ObfuscationPolicy)
//! assigns to their logical key; the engine never guesses a mode by trial
//! decoding.
//!
//! - [`StorageEngine::diagnostics`] only reads.
//! - [`StorageEngine::cleanup`] deletes what diagnostics would report.

use crate::clock::Clock;
use crate::storage::backend::{entry_size, BackingStore};
use crate::storage::engine::{Lookup, StorageEngine};
use serde::de::IgnoredAny;
use serde::Serialize;
use tracing::{debug, info};

/// A read-only report over one engine's namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageDiagnostics {
    /// Number of keys under the prefix, live or not
    pub total_items: usize,
    /// UTF-8 bytes of every namespaced key plus its stored string
    pub total_size_bytes: usize,
    /// Logical keys that `cleanup()` would remove, sorted
    pub expired_keys: Vec<String>,
}

impl<B: BackingStore, C: Clock> StorageEngine<B, C> {
    /// Reports usage and stale keys without modifying anything.
    ///
    /// A key counts as stale if it is expired, from another format version,
    /// undecodable in its policy mode, or unreadable.
    pub fn diagnostics(&self) -> StorageDiagnostics {
        let mut report = StorageDiagnostics::default();

        for (raw_key, logical) in self.namespaced_keys() {
            let raw = match self.backend().get(&raw_key) {
                Ok(Some(raw)) => raw,
                // Removed between listing and reading
                Ok(None) => continue,
                Err(_) => {
                    report.total_items += 1;
                    report.expired_keys.push(logical);
                    continue;
                }
            };

            report.total_items += 1;
            report.total_size_bytes += entry_size(&raw_key, &raw);

            let obfuscated = self.obfuscation_for(&logical, None);
            if self.judge::<IgnoredAny>(&raw, obfuscated).is_stale() {
                report.expired_keys.push(logical);
            }
        }

        debug!(
            prefix = %self.prefix(),
            total_items = report.total_items,
            total_size_bytes = report.total_size_bytes,
            stale = report.expired_keys.len(),
            "Collected diagnostics"
        );

        report
    }

    /// Deletes every expired, version-mismatched, undecodable or unreadable
    /// entry under the prefix.
    ///
    /// Returns the number of entries removed. Running it twice in a row
    /// removes nothing the second time (barring clock movement).
    pub fn cleanup(&self) -> usize {
        let mut stale = Vec::new();

        for (raw_key, logical) in self.namespaced_keys() {
            let obfuscated = self.obfuscation_for(&logical, None);

            if let Lookup::Stale(reason) = self.inspect_raw::<IgnoredAny>(&raw_key, obfuscated) {
                debug!(key = %raw_key, %reason, "Found stale entry");
                stale.push(raw_key);
            }
        }

        // One batched removal, so file-backed stores rewrite once
        let purged = self.purge_many(&stale);

        if purged > 0 {
            info!(prefix = %self.prefix(), purged, "Cleanup removed stale entries");
        }

        purged
    }
}
