//! Deterministic time for tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Duration, Utc};
use ledger_stream_core::clock::Clock;
use std::sync::RwLock;

/// Settable, advanceable clock.
///
/// Starts at the given instant and only moves when a test tells it to,
/// making TTL expiry, retention cutoffs, and provisioning horizons
/// reproducible.
///
/// # Example
///
/// ```
/// use ledger_stream_testing::clock::test_clock;
/// use ledger_stream_core::clock::Clock;
/// use chrono::Duration;
///
/// let clock = test_clock();
/// let before = clock.now();
/// clock.advance(Duration::hours(1));
/// assert_eq!(clock.now() - before, Duration::hours(1));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock pinned at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().unwrap() = to;
    }

    /// Move time forward (or backward, with a negative duration).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

/// A manual clock pinned at 2025-06-15 12:00:00 UTC.
///
/// Mid-year, so tests that cross partition boundaries do so deliberately.
#[must_use]
pub fn test_clock() -> ManualClock {
    ManualClock::new(
        DateTime::parse_from_rfc3339("2025-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stands_still_until_advanced() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn advance_moves_time() {
        let clock = test_clock();
        let before = clock.now();
        clock.advance(Duration::days(3));
        assert_eq!(clock.now(), before + Duration::days(3));
    }

    #[test]
    fn set_is_absolute() {
        let clock = test_clock();
        let target = clock.now() + Duration::weeks(52);
        clock.set(target);
        assert_eq!(clock.now(), target);
    }
}
