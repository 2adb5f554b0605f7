//! Error types for the reward layer.

use std::time::Duration;

use playclock_model::CurrencyId;

/// Errors a [`CurrencyLedger`](crate::CurrencyLedger) reports for a credit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger does not know this currency.
    #[error("unknown currency {0}")]
    UnknownCurrency(CurrencyId),

    /// The ledger refused the deposit (frozen account, limit reached, ...).
    #[error("deposit rejected: {0}")]
    Rejected(String),

    /// The ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Why a due reward was not granted.
///
/// Every variant leaves the checkpoint untouched, so the next reward tick
/// retries the grant.
#[derive(Debug, thiserror::Error)]
pub enum RewardError {
    /// The ledger answered with an error.
    #[error("credit of {currency} failed: {source}")]
    Ledger {
        /// Currency being credited.
        currency: CurrencyId,
        /// The ledger's answer.
        #[source]
        source: LedgerError,
    },

    /// The ledger did not answer in time.
    #[error("credit of {currency} timed out after {after:?}")]
    Timeout {
        /// Currency being credited.
        currency: CurrencyId,
        /// The configured bound.
        after: Duration,
    },
}
