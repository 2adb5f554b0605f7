//! # Playclock
//!
//! Playtime tracking and timed currency rewards for live game sessions.
//!
//! Playclock accumulates each user's active (connected, non-idle) time,
//! survives restarts through a persistence backend, and periodically grants
//! configured currencies through an external ledger once enough active time
//! has passed.
//!
//! The game server implements [`SessionHost`] and
//! [`CurrencyLedger`](playclock_reward::CurrencyLedger), optionally
//! [`IdleProvider`](playclock_session::IdleProvider) and
//! [`Authorization`](playclock_reward::Authorization), and forwards its
//! session events to the service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use playclock::prelude::*;
//!
//! // let service = PlayclockService::builder(JsonFileStore::open("playerdata.json").await?, ledger, host)
//! //     .settings(Settings::load("playclock.toml").await?)
//! //     .build()
//! //     .await?;
//! // let running = service.start().await;
//! // running.service().on_connected(user).await;
//! // running.shutdown().await?;
//! ```

mod error;
mod host;
mod service;
mod settings;
mod stats;

pub use error::PlayclockError;
pub use host::SessionHost;
pub use service::{PlayclockService, PlayclockServiceBuilder, RewardTickReport, RunningService};
pub use settings::{CurrencySettings, LateTickPolicy, Settings, SettingsError};
pub use stats::{format_duration, CurrencyProgress, PlayerStats};

/// Everything a host needs to embed Playclock.
pub mod prelude {
    pub use crate::{
        format_duration, PlayclockError, PlayclockService, PlayerStats, RunningService,
        SessionHost, Settings,
    };
    pub use playclock_model::{CurrencyConfig, CurrencyId, UserId, UserState};
    pub use playclock_reward::{
        Authorization, CurrencyLedger, LedgerError, NoPermissions, RewardOutcome,
    };
    pub use playclock_session::{Clock, IdleProvider, NoIdleProvider, SystemClock};
    pub use playclock_store::{JsonFileStore, MemoryStore, Persistence};
}
