//! Builders for well-formed test data.

use chrono::{DateTime, Utc};
use ledger_stream_core::event::{EventIdGenerator, EventMetadata, EventRecord};
use ledger_stream_core::stream::{AggregateRef, Version};

/// Builder for a gapless stream of events for one aggregate.
///
/// Mints time-sortable IDs and assigns consecutive versions starting at
/// 1, so the produced records always satisfy the append contract.
///
/// # Example
///
/// ```
/// use ledger_stream_testing::EventSequence;
/// use ledger_stream_core::stream::{AggregateRef, Version};
/// use chrono::Utc;
///
/// let mut sequence = EventSequence::new(AggregateRef::new("acct-1", "account"));
/// let first = sequence.next("Debited.v1", vec![], Utc::now());
/// let second = sequence.next("Credited.v1", vec![], Utc::now());
/// assert_eq!(first.version, Version::new(1));
/// assert_eq!(second.version, Version::new(2));
/// ```
#[derive(Debug)]
pub struct EventSequence {
    generator: EventIdGenerator,
    aggregate: AggregateRef,
    last_version: Version,
}

impl EventSequence {
    /// Start a sequence at version 1 for the given aggregate.
    #[must_use]
    pub const fn new(aggregate: AggregateRef) -> Self {
        Self {
            generator: EventIdGenerator::new(0),
            aggregate,
            last_version: Version::NONE,
        }
    }

    /// Build the next event in the stream.
    pub fn next(
        &mut self,
        event_type: &str,
        payload: Vec<u8>,
        occurred_at: DateTime<Utc>,
    ) -> EventRecord {
        self.last_version = self.last_version.next();
        EventRecord::new(
            self.generator.next_id(),
            self.aggregate.clone(),
            self.last_version,
            event_type,
            payload,
            EventMetadata::default(),
            occurred_at,
        )
    }

    /// The version of the last built event.
    #[must_use]
    pub const fn last_version(&self) -> Version {
        self.last_version
    }

    /// The aggregate this sequence belongs to.
    #[must_use]
    pub const fn aggregate(&self) -> &AggregateRef {
        &self.aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_consecutive_and_ids_sortable() {
        let mut sequence = EventSequence::new(AggregateRef::new("acct-1", "account"));
        let first = sequence.next("Debited.v1", vec![], Utc::now());
        let second = sequence.next("Debited.v1", vec![], Utc::now());

        assert_eq!(first.version, Version::new(1));
        assert_eq!(second.version, Version::new(2));
        assert!(second.id > first.id);
        assert_eq!(sequence.last_version(), Version::new(2));
    }
}
