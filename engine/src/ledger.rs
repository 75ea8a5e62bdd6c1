//! The account-balance domain: ledger events and their fold.
//!
//! Amounts are integer minor units (cents). Folding is integer addition,
//! so replaying any split of a history (full replay, or snapshot plus
//! suffix) produces bit-identical state, which is the property the rebuild
//! coordinator is tested against.

use ledger_stream_core::event::EventRecord;
use ledger_stream_core::projection::{ProjectionError, ProjectionFold, Result};
use serde::{Deserialize, Serialize};

/// A domain event on a ledger account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// Funds debited to the account.
    Debited {
        /// Amount in minor units (cents).
        amount_minor: i64,
    },
    /// Funds credited from the account.
    Credited {
        /// Amount in minor units (cents).
        amount_minor: i64,
    },
}

impl LedgerEvent {
    /// Stable event type discriminator, with a schema version suffix.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Debited { .. } => "Debited.v1",
            Self::Credited { .. } => "Credited.v1",
        }
    }

    /// Serialize the payload for an [`EventRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Serialization`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProjectionError::Serialization(e.to_string()))
    }

    /// Decode the payload of an [`EventRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Fold`] if the payload bytes are not a
    /// valid `LedgerEvent`.
    pub fn decode(record: &EventRecord) -> Result<Self> {
        bincode::deserialize(&record.payload).map_err(|e| {
            ProjectionError::Fold(format!(
                "Undecodable {} payload for {}: {e}",
                record.event_type, record.aggregate
            ))
        })
    }
}

/// Materialized running balance for one account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Running balance in minor units.
    pub balance_minor: i64,
    /// Number of ledger entries folded in.
    pub entry_count: u64,
}

/// Pure fold of [`LedgerEvent`]s into an [`AccountBalance`].
#[derive(Clone, Copy, Debug, Default)]
pub struct BalanceFold;

impl ProjectionFold for BalanceFold {
    type State = AccountBalance;

    fn fold(&self, state: Self::State, event: &EventRecord) -> Result<Self::State> {
        let ledger_event = LedgerEvent::decode(event)?;
        let balance_minor = match ledger_event {
            LedgerEvent::Debited { amount_minor } => state.balance_minor + amount_minor,
            LedgerEvent::Credited { amount_minor } => state.balance_minor - amount_minor,
        };
        Ok(AccountBalance {
            balance_minor,
            entry_count: state.entry_count + 1,
        })
    }
}
