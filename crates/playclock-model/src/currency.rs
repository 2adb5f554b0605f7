//! Static per-currency reward configuration.

use crate::{CurrencyId, ModelError};

/// How a single currency is paid out for playtime.
///
/// Built once when settings are applied and then shared read-only between
/// the reward tick and the admin surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyConfig {
    /// Ledger key of the currency.
    pub id: CurrencyId,
    /// Active seconds between two grants. Always > 0.
    pub reward_interval_secs: u64,
    /// Amount granted when no permission override is higher. Always >= 0.
    pub default_amount: f64,
    /// Display symbol used in chat messages. Falls back to the id.
    pub symbol: String,
}

impl CurrencyConfig {
    /// Builds a validated config whose symbol is the currency id.
    ///
    /// # Errors
    /// Returns [`ModelError::InvalidCurrency`] for an empty id, a zero
    /// interval, or a default amount that is negative or not finite.
    pub fn new(
        id: impl Into<CurrencyId>,
        reward_interval_secs: u64,
        default_amount: f64,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        let invalid = |reason: &str| ModelError::InvalidCurrency {
            id: id.to_string(),
            reason: reason.to_string(),
        };

        if id.as_str().is_empty() {
            return Err(invalid("currency id must not be empty"));
        }
        if reward_interval_secs == 0 {
            return Err(invalid("reward interval must be greater than zero"));
        }
        if !default_amount.is_finite() || default_amount < 0.0 {
            return Err(invalid("default amount must be a finite number >= 0"));
        }

        let symbol = id.to_string();
        Ok(Self {
            id,
            reward_interval_secs,
            default_amount,
            symbol,
        })
    }

    /// Replaces the display symbol.
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }
}
