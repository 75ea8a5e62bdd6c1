//! Event identity and the immutable event record.
//!
//! Events are the source of truth in the ledger engine. An [`EventRecord`]
//! is an immutable fact: once appended to the event store it is never
//! updated or deleted (whole partitions are removed by archival, nothing
//! else). Domain payloads are carried as bincode bytes next to a stable
//! `event_type` discriminator, so the store never needs to understand the
//! payload shape.
//!
//! # Event IDs
//!
//! [`EventId`] is a 64-bit time-sortable identifier (snowflake layout:
//! milliseconds since a custom epoch, then worker ID, then a per-millisecond
//! sequence). Sorting IDs sorts events by creation time, which keeps
//! partition range scans cheap. IDs serialize as strings to survive JSON
//! consumers that truncate 64-bit integers.

use crate::stream::{AggregateRef, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch (2020-01-01T00:00:00Z) expressed in milliseconds.
const EPOCH_MILLIS: u64 = 1_577_836_800_000;
const WORKER_ID_BITS: u8 = 10;
const SEQUENCE_BITS: u8 = 12;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Largest worker ID that fits the snowflake layout.
pub const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

/// Globally unique, time-sortable event identifier.
///
/// Comparing two IDs orders them by creation time (then worker, then
/// sequence). Use [`EventIdGenerator`] to mint new IDs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

impl EventId {
    /// Raw 64-bit value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Reconstruct an ID from its raw value (for storage round-trips).
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventId").field(&self.0).finish()
    }
}

impl FromStr for EventId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(EventId)
    }
}

impl Serialize for EventId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value
            .parse::<EventId>()
            .map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

/// Generator for time-sortable [`EventId`]s.
///
/// Thread-safe; a single generator is shared per process (or per writer).
/// Within one millisecond IDs are disambiguated by a 12-bit sequence; if
/// the sequence wraps, the generator spins until the next millisecond.
#[derive(Debug)]
pub struct EventIdGenerator {
    inner: Mutex<GeneratorState>,
    worker_id: u16,
}

#[derive(Debug)]
struct GeneratorState {
    last_timestamp: u64,
    sequence: u16,
}

impl EventIdGenerator {
    /// Create a generator for the given worker.
    ///
    /// `worker_id` is masked to [`MAX_WORKER_ID`].
    #[must_use]
    pub const fn new(worker_id: u16) -> Self {
        Self {
            inner: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
            worker_id: worker_id & MAX_WORKER_ID,
        }
    }

    /// Mint the next ID.
    #[must_use]
    pub fn next_id(&self) -> EventId {
        let mut state = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut timestamp = current_millis().max(state.last_timestamp);

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                timestamp = wait_next_millis(state.last_timestamp);
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = timestamp;
        let elapsed = timestamp.saturating_sub(EPOCH_MILLIS);
        let id = (elapsed << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (u64::from(self.worker_id) << SEQUENCE_BITS)
            | u64::from(state.sequence);
        EventId(id)
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

fn wait_next_millis(last_timestamp: u64) -> u64 {
    loop {
        let timestamp = current_millis();
        if timestamp > last_timestamp {
            return timestamp;
        }
        std::hint::spin_loop();
    }
}

/// Correlation metadata carried by every event.
///
/// Identifies the request chain (`correlation_id`), the event that caused
/// this one (`causation_id`), the owning tenant and actor, plus free-form
/// key/values for anything the write side wants to attach.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Correlates all events produced by one logical request.
    pub correlation_id: Option<String>,
    /// The ID of the event that caused this one, if any.
    pub causation_id: Option<String>,
    /// Owning tenant, for multi-tenant deployments.
    pub tenant_id: Option<String>,
    /// The user or system principal that triggered the event.
    pub actor: Option<String>,
    /// Free-form key/values.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventMetadata {
    /// Metadata with only a correlation ID set.
    #[must_use]
    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Self::default()
        }
    }
}

/// An immutable domain fact, as persisted in the event store.
///
/// The invariant `(aggregate, version)` is unique and immutable once
/// committed; the store enforces it at append time. `occurred_at` routes
/// the record to a time partition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Globally unique, time-sortable identifier.
    pub id: EventId,
    /// The stream this event belongs to.
    pub aggregate: AggregateRef,
    /// Strictly increasing per aggregate, starting at 1.
    pub version: Version,
    /// Stable discriminator for the payload shape (e.g. `"Debited.v1"`).
    pub event_type: String,
    /// Bincode-serialized domain payload.
    pub payload: Vec<u8>,
    /// Correlation metadata.
    pub metadata: EventMetadata,
    /// Timestamp used to route the event to a partition.
    pub occurred_at: DateTime<Utc>,
}

impl EventRecord {
    /// Build a record from an already-serialized payload.
    #[must_use]
    pub fn new(
        id: EventId,
        aggregate: AggregateRef,
        version: Version,
        event_type: impl Into<String>,
        payload: Vec<u8>,
        metadata: EventMetadata,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            aggregate,
            version,
            event_type: event_type.into(),
            payload,
            metadata,
            occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let generator = EventIdGenerator::new(1);
        let mut previous = generator.next_id();
        for _ in 0..1000 {
            let next = generator.next_id();
            assert!(next > previous, "{next} should sort after {previous}");
            previous = next;
        }
    }

    #[test]
    fn worker_id_is_masked() {
        let generator = EventIdGenerator::new(u16::MAX);
        // Must not overflow into the timestamp bits.
        let id = generator.next_id();
        let worker = (id.as_u64() >> SEQUENCE_BITS) & u64::from(MAX_WORKER_ID);
        assert_eq!(worker, u64::from(MAX_WORKER_ID));
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if parse fails
    fn id_round_trips_through_string() {
        let generator = EventIdGenerator::default();
        let id = generator.next_id();
        let parsed: EventId = id.to_string().parse().expect("parse should succeed");
        assert_eq!(parsed, id);
    }

    #[test]
    #[allow(clippy::expect_used)] // Panics: Test will fail if serde fails
    fn id_serializes_as_string() {
        let id = EventId::from_u64(42);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"42\"");
        let back: EventId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn metadata_default_is_empty() {
        let metadata = EventMetadata::default();
        assert!(metadata.correlation_id.is_none());
        assert!(metadata.extra.is_empty());
    }

    #[test]
    fn correlated_sets_only_correlation_id() {
        let metadata = EventMetadata::correlated("req-7");
        assert_eq!(metadata.correlation_id.as_deref(), Some("req-7"));
        assert!(metadata.causation_id.is_none());
    }
}
