//! Clock seam.
//!
//! Time-dependent policy (partition horizons, retention cutoffs, TTLs,
//! access timestamps) goes through this trait instead of calling
//! `Utc::now()` directly, so tests can pin or advance time. `SystemClock`
//! is the production implementation; the testing crate provides
//! `ManualClock`.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation backed by `Utc::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
