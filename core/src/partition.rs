//! Time partitions of the event log.
//!
//! The event log is split into contiguous, calendar-year time ranges.
//! Partitions make range scans cheap and give retention management a unit
//! of work: a partition is archived (exported, verified, dropped) as a
//! whole, individual events never are.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a partition: the calendar year it covers.
///
/// # Examples
///
/// ```
/// use ledger_stream_core::partition::PartitionId;
///
/// let id = PartitionId::new(2026);
/// assert_eq!(id.year(), 2026);
/// assert_eq!(format!("{id}"), "events_2026");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(i32);

impl PartitionId {
    /// Create a partition ID for the given calendar year.
    #[must_use]
    pub const fn new(year: i32) -> Self {
        Self(year)
    }

    /// The calendar year this partition covers.
    #[must_use]
    pub const fn year(self) -> i32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "events_{}", self.0)
    }
}

/// Lifecycle status of a partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStatus {
    /// Accepting appends and serving reads from hot storage.
    Active,
    /// Exported to cold storage and detached from hot storage.
    Archived,
}

/// A contiguous time range of the event log.
///
/// The range is half-open: `range_start <= occurred_at < range_end`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    /// Partition identifier (calendar year).
    pub id: PartitionId,
    /// Inclusive start of the covered range.
    pub range_start: DateTime<Utc>,
    /// Exclusive end of the covered range.
    pub range_end: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: PartitionStatus,
}

impl Partition {
    /// Build the partition covering the given calendar year.
    #[must_use]
    pub fn for_year(year: i32) -> Self {
        Self {
            id: PartitionId::new(year),
            range_start: year_start(year),
            range_end: year_start(year + 1),
            status: PartitionStatus::Active,
        }
    }

    /// Build the partition covering the given instant.
    #[must_use]
    pub fn covering(at: DateTime<Utc>) -> Self {
        Self::for_year(at.year())
    }

    /// Whether `at` falls inside this partition's range.
    #[must_use]
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.range_start <= at && at < self.range_end
    }

    /// Whether the whole partition lies strictly before `cutoff`.
    #[must_use]
    pub fn ends_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.range_end <= cutoff
    }
}

fn year_start(year: i32) -> DateTime<Utc> {
    // chrono only rejects years outside its supported range, which the
    // calendar-year IDs used here never reach.
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[allow(clippy::unwrap_used)] // Test helper with fixed, valid dates
    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn covers_is_half_open() {
        let partition = Partition::for_year(2025);
        assert!(partition.covers(at(2025, 1, 1)));
        assert!(partition.covers(at(2025, 12, 31)));
        assert!(!partition.covers(at(2026, 1, 1)));
        assert!(!partition.covers(at(2024, 12, 31)));
        assert!(!partition.covers(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn covering_picks_the_calendar_year() {
        let partition = Partition::covering(at(2027, 6, 15));
        assert_eq!(partition.id, PartitionId::new(2027));
        assert!(partition.covers(at(2027, 1, 1)));
    }

    #[test]
    fn ends_before_requires_full_range() {
        let partition = Partition::for_year(2020);
        assert!(partition.ends_before(at(2021, 1, 2)));
        assert!(!partition.ends_before(at(2020, 6, 1)));
    }

    #[test]
    fn new_partitions_start_active() {
        assert_eq!(Partition::for_year(2030).status, PartitionStatus::Active);
    }

    #[test]
    fn display_names_the_year() {
        assert_eq!(format!("{}", PartitionId::new(2024)), "events_2024");
    }
}
