//! Aggregate identity and versioning types.
//!
//! This module defines strong types for aggregate identity (`AggregateId`,
//! `AggregateType`, `AggregateRef`) and per-aggregate version control
//! (`Version`) used throughout the ledger projection engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `AggregateId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid aggregate ID: {0}")]
pub struct ParseAggregateIdError(String);

/// Unique identifier for a single aggregate instance.
///
/// For example:
/// - `"acct-12345"`
/// - `"journal-abc-def"`
///
/// # Design
///
/// `AggregateId` is a newtype wrapper around `String` that provides:
/// - Type safety (can't accidentally use a regular string)
/// - Clear intent in function signatures
/// - Serialization support for storage
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `From::from()` and `new()`: No validation (for internal use with trusted input)
///
/// # Examples
///
/// ```
/// use ledger_stream_core::stream::AggregateId;
///
/// let id = AggregateId::new("acct-12345");
/// assert_eq!(id.as_str(), "acct-12345");
///
/// let parsed: AggregateId = "acct-9".parse().unwrap();
/// assert_eq!(parsed, AggregateId::new("acct-9"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateId(String);

impl AggregateId {
    /// Create a new `AggregateId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the aggregate ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `AggregateId` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AggregateId {
    type Err = ParseAggregateIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseAggregateIdError(
                "Aggregate ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for AggregateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AggregateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AggregateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Discriminator for the kind of aggregate a stream belongs to.
///
/// Examples: `"account"`, `"journal"`. The pair
/// `(AggregateId, AggregateType)` identifies one event stream; the same
/// raw ID may exist under different types without colliding.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateType(String);

impl AggregateType {
    /// Create a new `AggregateType` from a string.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// Get the aggregate type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AggregateType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The full key of one event stream: `(AggregateId, AggregateType)`.
///
/// # Examples
///
/// ```
/// use ledger_stream_core::stream::AggregateRef;
///
/// let aggregate = AggregateRef::new("acct-1", "account");
/// assert_eq!(aggregate.id.as_str(), "acct-1");
/// assert_eq!(aggregate.kind.as_str(), "account");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AggregateRef {
    /// The aggregate instance identifier.
    pub id: AggregateId,
    /// The aggregate type discriminator.
    pub kind: AggregateType,
}

impl AggregateRef {
    /// Create a new aggregate reference.
    #[must_use]
    pub fn new(id: impl Into<AggregateId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: AggregateType::new(kind),
        }
    }
}

impl fmt::Display for AggregateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Per-aggregate event version for optimistic concurrency control.
///
/// Event versions start at 1 and increase by exactly 1 for each event
/// committed to a stream. `Version::NONE` (0) means "no events yet" and is
/// the `last_event_version` of a projection that has not folded anything.
///
/// # Examples
///
/// ```
/// use ledger_stream_core::stream::Version;
///
/// let none = Version::NONE;
/// let v1 = none.next();
/// assert_eq!(v1, Version::new(1));
/// assert_eq!(v1.value(), 1);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The "no events" version (0). Not a valid event version.
    pub const NONE: Self = Self(0);

    /// The version of the first event in any stream.
    pub const FIRST: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    ///
    /// # Overflow Behavior
    ///
    /// Reaching `u64::MAX` events in one stream is not a realistic concern;
    /// plain addition is used.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this is the "no events" version (0).
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Number of events between `base` and this version.
    ///
    /// Saturates at 0 when `base` is ahead (a stale caller).
    #[must_use]
    pub const fn since(self, base: Self) -> u64 {
        self.0.saturating_sub(base.0)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}
