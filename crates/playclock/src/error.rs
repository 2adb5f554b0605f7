//! Unified error type for Playclock.

use playclock_model::ModelError;
use playclock_reward::RewardError;
use playclock_store::StoreError;

use crate::SettingsError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PlayclockError {
    /// Identity or currency validation, or document encoding.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Loading or saving player state.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Crediting a reward.
    #[error(transparent)]
    Reward(#[from] RewardError),

    /// Reading settings.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
