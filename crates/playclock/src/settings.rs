//! Runtime settings, loaded from TOML.
//!
//! ```toml
//! reward_tick_secs = 60
//! persist_tick_secs = 600
//! late_tick_policy = "skip"
//! idle_disqualifies_reward = true
//! broadcast_on_reward = false
//! reward_message = "You received {amount} {currency} for playing!"
//!
//! [currencies.gold]
//! reward_interval_minutes = 60
//! reward_default = 5.0
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use playclock_model::CurrencyConfig;
use playclock_tick::TickPolicy;
use serde::Deserialize;

/// Errors loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("cannot read settings file {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or has wrongly typed keys.
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Service settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between reward ticks. 0 disables the reward tick.
    pub reward_tick_secs: u64,
    /// Seconds between persistence ticks. 0 disables the persistence tick
    /// (state is still saved on disconnect and shutdown).
    pub persist_tick_secs: u64,
    /// How both ticks recover after firing late.
    pub late_tick_policy: LateTickPolicy,
    /// Idle users are skipped by the reward tick.
    pub idle_disqualifies_reward: bool,
    /// Announce every grant to all connected users.
    pub broadcast_on_reward: bool,
    /// Sent to the rewarded user. Placeholders: `{amount}`, `{currency}`,
    /// `{player}`.
    pub reward_message: String,
    /// Broadcast on reward when enabled. Same placeholders.
    pub broadcast_message: String,
    /// First segment of amount-override permission nodes.
    pub permission_namespace: String,
    /// Upper bound on one ledger credit call.
    pub credit_timeout_ms: u64,
    /// How many users the reward tick evaluates at once.
    pub max_concurrent_evaluations: usize,
    /// Rewarded currencies, keyed by currency id.
    pub currencies: BTreeMap<String, CurrencySettings>,
}

/// `late_tick_policy` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LateTickPolicy {
    /// Drop the missed ticks and restart the period from the late one.
    #[default]
    Skip,
    /// Keep the original cadence; a missed tick runs right away.
    Cadence,
}

impl From<LateTickPolicy> for TickPolicy {
    fn from(policy: LateTickPolicy) -> Self {
        match policy {
            LateTickPolicy::Skip => TickPolicy::Skip,
            LateTickPolicy::Cadence => TickPolicy::Drop,
        }
    }
}

/// One `[currencies.<id>]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CurrencySettings {
    /// Active minutes between grants.
    pub reward_interval_minutes: u64,
    /// Amount granted when no permission override is higher.
    pub reward_default: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reward_tick_secs: 60,
            persist_tick_secs: 600,
            late_tick_policy: LateTickPolicy::Skip,
            idle_disqualifies_reward: true,
            broadcast_on_reward: false,
            reward_message: "You received {amount} {currency} for playing!".to_string(),
            broadcast_message: "{player} received {amount} {currency} for time on the server!"
                .to_string(),
            permission_namespace: "timereward".to_string(),
            credit_timeout_ms: 5_000,
            max_concurrent_evaluations: 16,
            currencies: BTreeMap::new(),
        }
    }
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            reward_interval_minutes: 60,
            reward_default: 1.0,
        }
    }
}

impl Settings {
    /// Parses settings from TOML text.
    ///
    /// # Errors
    /// [`SettingsError::Parse`] for malformed TOML or mistyped keys.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the settings file at `path`.
    ///
    /// # Errors
    /// [`SettingsError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let settings = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), currencies = settings.currencies.len(), "settings loaded");
        Ok(settings)
    }

    /// Validated currency configs. Invalid entries are logged and left out.
    pub fn currency_configs(&self) -> Vec<CurrencyConfig> {
        if self.currencies.is_empty() {
            tracing::warn!("no currencies configured, nothing will be rewarded");
        }

        self.currencies
            .iter()
            .filter_map(|(id, c)| {
                let interval = c.reward_interval_minutes.saturating_mul(60);
                CurrencyConfig::new(id.as_str(), interval, c.reward_default)
                    .inspect_err(|e| tracing::warn!(currency = %id, error = %e, "currency ignored"))
                    .ok()
            })
            .collect()
    }

    /// The reward tick period, `None` when disabled.
    pub fn reward_tick_period(&self) -> Option<Duration> {
        (self.reward_tick_secs > 0).then(|| Duration::from_secs(self.reward_tick_secs))
    }

    /// The persistence tick period, `None` when disabled.
    pub fn persist_tick_period(&self) -> Option<Duration> {
        (self.persist_tick_secs > 0).then(|| Duration::from_secs(self.persist_tick_secs))
    }

    /// The credit timeout.
    pub fn credit_timeout(&self) -> Duration {
        Duration::from_millis(self.credit_timeout_ms)
    }
}
