//! Expiration Policy and Background Cleanup
//!
//! Expiry is decided lazily: an envelope is never marked expired in the store,
//! it is simply judged expired whenever someone looks at it. [`is_expired`]
//! is that judgement.
//!
//! Lazy expiry alone has one problem: an entry that is never read again
//! stays in the backing store forever. The [`CleanupSweeper`] solves this by
//! periodically calling [`StorageEngine::cleanup`] from a Tokio task.
//!
//! ## Adaptive Frequency
//!
//! If a large share of the namespace was purged on the last pass, the sweeper
//! runs more often. If nothing was purged, it backs off to save work.

use crate::clock::Clock;
use crate::codec::Envelope;
use crate::storage::backend::BackingStore;
use crate::storage::engine::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Returns true if `envelope` is expired at `now_ms`.
///
/// An envelope without an expiry never expires. The comparison is strict,
/// so an envelope is still live at the exact millisecond it expires, and it
/// can never be expired at a time before its own `created_at`.
#[inline]
pub fn is_expired<T>(envelope: &Envelope<T>, now_ms: u64) -> bool {
    match envelope.expires_at {
        Some(expires_at) => now_ms >= envelope.created_at && now_ms > expires_at,
        None => false,
    }
}

/// Configuration for the cleanup sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Base interval between sweeps (default: 60s)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 1s)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 10min)
    pub max_interval: Duration,

    /// If this fraction of keys was purged, speed up sweeping
    pub speedup_threshold: f64,

    /// If this fraction of keys was purged, slow down sweeping
    pub slowdown_threshold: f64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(60),
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(600),
            speedup_threshold: 0.25,  // Speed up if >25% of keys were purged
            slowdown_threshold: 0.01, // Slow down if <1% of keys were purged
        }
    }
}

/// A handle to the running cleanup sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct CleanupSweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl CleanupSweeper {
    /// Starts the sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use stashkv::storage::{CleanupSweeper, MemoryBackend, StorageEngine, SweeperConfig};
    /// use stashkv::EngineConfig;
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new(EngineConfig::default(), MemoryBackend::new())?);
    /// let sweeper = CleanupSweeper::start(engine, SweeperConfig::default());
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start<B, C>(engine: Arc<StorageEngine<B, C>>, config: SweeperConfig) -> Self
    where
        B: BackingStore + Send + Sync + 'static,
        C: Clock + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!("Background cleanup sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Returns `false` if it was already stopped.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) -> bool {
        let was_stopped = self.shutdown_tx.send_replace(true);
        if !was_stopped {
            info!("Background cleanup sweeper stopped");
        }
        !was_stopped
    }
}

impl Drop for CleanupSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main sweeper loop.
async fn sweeper_loop<B, C>(
    engine: Arc<StorageEngine<B, C>>,
    config: SweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    B: BackingStore + Send + Sync + 'static,
    C: Clock + 'static,
{
    let mut current_interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Cleanup sweeper received shutdown signal");
                    return;
                }
            }
        }

        // Backends may do blocking I/O, keep it off the async workers
        let pass = {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || (engine.len(), engine.cleanup(), engine.len()))
        };
        let (keys_before, purged, keys_remaining) = match pass.await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Cleanup pass failed");
                continue;
            }
        };

        if keys_before > 0 {
            let purge_rate = purged as f64 / keys_before as f64;

            if purge_rate > config.speedup_threshold {
                current_interval = (current_interval / 2).max(config.min_interval);
                debug!(
                    purged = purged,
                    rate = %format!("{:.2}%", purge_rate * 100.0),
                    new_interval_ms = current_interval.as_millis(),
                    "High purge rate, speeding up sweeper"
                );
            } else if purge_rate < config.slowdown_threshold && purged == 0 {
                current_interval = (current_interval * 2).min(config.max_interval);
                trace!(
                    new_interval_ms = current_interval.as_millis(),
                    "Low purge rate, slowing down sweeper"
                );
            }
        }

        if purged > 0 {
            debug!(
                purged = purged,
                keys_remaining = keys_remaining,
                "Stale entries cleaned up"
            );
        }
    }
}

/// Starts the cleanup sweeper with default configuration.
pub fn start_cleanup_sweeper<B, C>(engine: Arc<StorageEngine<B, C>>) -> CleanupSweeper
where
    B: BackingStore + Send + Sync + 'static,
    C: Clock + 'static,
{
    CleanupSweeper::start(engine, SweeperConfig::default())
}
