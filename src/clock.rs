//! Injectable Time Sources
//!
//! Every timestamp the engine writes or compares comes from a [`Clock`].
//! Production code uses [`SystemClock`]; tests and simulations use
//! [`ManualClock`], which only moves when told to.
//!
//! All timestamps are Unix milliseconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock reads before the Unix epoch.
#[inline]
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A source of wall-clock time.
///
/// # Example
///
/// ```
/// use stashkv::clock::{Clock, ManualClock};
///
/// fn is_past<C: Clock>(clock: &C, deadline_ms: u64) -> bool {
///     clock.now_ms() > deadline_ms
/// }
///
/// let clock = ManualClock::new(1_000);
/// assert!(!is_past(&clock, 1_500));
/// clock.advance_ms(1_000);
/// assert!(is_past(&clock, 1_500));
/// ```
pub trait Clock: Send + Sync {
    /// Current Unix timestamp in milliseconds.
    fn now_ms(&self) -> u64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// A clock that only moves when advanced explicitly.
///
/// Clones share the same underlying time, so a test can keep one handle
/// while the engine owns another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at `initial_ms`.
    pub fn new(initial_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(initial_ms)),
        }
    }

    /// Creates a clock frozen at the current system time.
    pub fn from_system_time() -> Self {
        Self::new(current_time_ms())
    }

    /// Moves time forward by `delta_ms` milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        // Saturates at u64::MAX instead of wrapping back to the epoch
        let _ = self
            .now_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(delta_ms))
            });
    }

    /// Moves time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.advance_ms(duration_to_ms(delta));
    }

    /// Jumps to an absolute timestamp (which may be in the past).
    pub fn set_ms(&self, time_ms: u64) {
        self.now_ms.store(time_ms, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::from_system_time()
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    #[inline]
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
#[inline]
pub(crate) fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance_ms(500);
        assert_eq!(clock.now_ms(), 1_500);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_ms(), 3_500);
    }

    #[test]
    fn test_manual_clock_saturates() {
        let clock = ManualClock::new(u64::MAX - 5);
        clock.advance_ms(10);
        assert_eq!(clock.now_ms(), u64::MAX);

        clock.advance(Duration::MAX);
        assert_eq!(clock.now_ms(), u64::MAX);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new(0);
        let handle = clock.clone();

        handle.set_ms(42);
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now_ms() > 0);
    }

    #[test]
    fn test_duration_to_ms_saturates() {
        assert_eq!(duration_to_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_to_ms(Duration::MAX), u64::MAX);
    }
}
