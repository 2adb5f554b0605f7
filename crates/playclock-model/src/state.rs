//! Per-user accumulated playtime and reward checkpoints.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CurrencyId;

/// Everything Playclock remembers about one user.
///
/// Two independent clocks are kept:
///
/// - `total_active_secs` only ever grows (short of an administrative
///   reset). Reward eligibility is measured against it.
/// - `period_active_secs` grows at the same rate but is zeroed on every
///   period reset. Nothing forces it to stay below the total.
///
/// `reward_checkpoints` records, per currency, the total at which the last
/// reward was paid (or at which the clock was started for that currency).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    /// Lifetime active seconds.
    pub total_active_secs: u64,
    /// Active seconds since the last period reset.
    pub period_active_secs: u64,
    /// Total active seconds at the last grant, per currency.
    pub reward_checkpoints: BTreeMap<CurrencyId, u64>,
}

impl UserState {
    /// A brand-new user: no time, no checkpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `secs` of active time into both clocks.
    ///
    /// Saturates rather than wrapping; a `u64` of seconds will not overflow
    /// in practice, but a corrupted snapshot should not panic the process.
    pub fn add_active_secs(&mut self, secs: u64) {
        self.total_active_secs = self.total_active_secs.saturating_add(secs);
        self.period_active_secs = self.period_active_secs.saturating_add(secs);
    }

    /// Zeroes the period clock. Total time and checkpoints are untouched.
    pub fn reset_period(&mut self) {
        self.period_active_secs = 0;
    }

    /// The checkpoint for `currency`, if one was ever recorded.
    pub fn checkpoint(&self, currency: &str) -> Option<u64> {
        self.reward_checkpoints.get(currency).copied()
    }

    /// Moves the checkpoint for `currency` to the current total.
    pub fn mark_checkpoint(&mut self, currency: &CurrencyId) {
        self.reward_checkpoints
            .insert(currency.clone(), self.total_active_secs);
    }

    /// Moves the checkpoint for `currency` from `expected` to `to`, capped at
    /// the current total. Returns `false` and changes nothing if the
    /// checkpoint is no longer `expected`.
    pub fn advance_checkpoint(&mut self, currency: &CurrencyId, expected: u64, to: u64) -> bool {
        if self.checkpoint(currency.as_str()) != Some(expected) {
            return false;
        }
        self.reward_checkpoints
            .insert(currency.clone(), to.min(self.total_active_secs));
        true
    }

    /// Active seconds accumulated since the checkpoint for `currency`.
    ///
    /// `None` when no checkpoint exists yet. A checkpoint ahead of the total
    /// (only possible with a hand-edited snapshot) reads as zero.
    pub fn secs_since_checkpoint(&self, currency: &str) -> Option<u64> {
        self.checkpoint(currency)
            .map(|cp| self.total_active_secs.saturating_sub(cp))
    }
}
