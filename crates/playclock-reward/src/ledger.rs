//! The external currency ledger.
//!
//! Playclock never stores balances. It tells a ledger (an economy plugin,
//! a wallet service, an in-memory map in tests) to credit a user and trusts
//! the answer.

use playclock_model::{CurrencyId, UserId};

use crate::LedgerError;

/// Credits currency to users.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use std::sync::Mutex;
///
/// use playclock_model::{CurrencyId, UserId};
/// use playclock_reward::{CurrencyLedger, LedgerError};
///
/// #[derive(Default)]
/// struct Wallets(Mutex<HashMap<(UserId, CurrencyId), f64>>);
///
/// impl CurrencyLedger for Wallets {
///     fn resolve_symbol(&self, currency: &CurrencyId) -> Option<String> {
///         (currency.as_str() == "gold").then(|| "⛁".to_string())
///     }
///
///     async fn credit(
///         &self,
///         user: UserId,
///         currency: &CurrencyId,
///         amount: f64,
///     ) -> Result<(), LedgerError> {
///         let mut wallets = self.0.lock().unwrap();
///         *wallets.entry((user, currency.clone())).or_default() += amount;
///         Ok(())
///     }
/// }
/// ```
pub trait CurrencyLedger: Send + Sync + 'static {
    /// Display symbol for `currency`, if the ledger has one. Resolved when
    /// settings are loaded; `None` falls back to the currency id.
    fn resolve_symbol(&self, currency: &CurrencyId) -> Option<String>;

    /// Deposits `amount` of `currency` into `user`'s account.
    ///
    /// Called with the user's state locked, under a timeout. An `Err` means
    /// nothing was deposited.
    fn credit(
        &self,
        user: UserId,
        currency: &CurrencyId,
        amount: f64,
    ) -> impl std::future::Future<Output = Result<(), LedgerError>> + Send;
}
