//! `PlayclockService` builder, event entrypoints, ticks and admin operations.
//!
//! This is the entry point for embedding Playclock in a game server. It
//! ties the layers together: session signals → accumulator → store →
//! reward evaluator → ledger, plus the two background ticks.
//!
//! ```text
//!             on_connected / on_disconnected / on_idle_changed
//!                               │
//!                               ▼
//!   ┌──────────────── PlayclockService ────────────────┐
//!   │  TimeAccumulator ──→ PlayerStore ──→ Persistence │
//!   │                         ▲                        │
//!   │  reward tick ── flush ──┤── RewardEvaluator ──→ CurrencyLedger
//!   │  persist tick ─ flush ──┘── save_all             │
//!   └──────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures_util::StreamExt;
use playclock_model::{CurrencyConfig, CurrencyId, UserId};
use playclock_reward::{
    render_template, Authorization, CurrencyLedger, NoPermissions, RewardEvaluator, RewardOutcome,
};
use playclock_session::{Clock, IdleProvider, NoIdleProvider, SystemClock, TimeAccumulator};
use playclock_store::{Persistence, PlayerStore};
use playclock_tick::{PeriodicTask, TickConfig};
use tokio::sync::RwLock;

use crate::{PlayclockError, PlayerStats, SessionHost, Settings};

// ---------------------------------------------------------------------------
// Active settings
// ---------------------------------------------------------------------------

/// Settings plus the currency configs derived from them, swapped as a unit
/// on reload so a tick never sees half of each.
struct ActiveSettings {
    settings: Settings,
    currencies: Vec<CurrencyConfig>,
}

impl ActiveSettings {
    fn resolve<L: CurrencyLedger>(settings: Settings, ledger: &L) -> Self {
        let currencies = settings
            .currency_configs()
            .into_iter()
            .map(|config| match ledger.resolve_symbol(&config.id) {
                Some(symbol) => config.with_symbol(symbol),
                None => {
                    tracing::warn!(currency = %config.id, "ledger has no symbol for currency, using its id");
                    config
                }
            })
            .collect();
        Self {
            settings,
            currencies,
        }
    }

    fn symbol<'a>(&'a self, currency: &'a CurrencyId) -> &'a str {
        self.currencies
            .iter()
            .find(|c| &c.id == currency)
            .map_or(currency.as_str(), |c| c.symbol.as_str())
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of one reward tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewardTickReport {
    /// Users whose rewards were evaluated.
    pub evaluated: usize,
    /// Users skipped because they were idle.
    pub skipped_idle: usize,
    /// Users the host lists but who never connected through the service.
    pub skipped_unknown: usize,
    /// Checkpoints initialized.
    pub initialized: usize,
    /// Grants credited.
    pub granted: usize,
    /// Grants that failed and will be retried.
    pub failed: usize,
    /// Users skipped because an earlier evaluation of theirs was still
    /// waiting on the ledger.
    pub skipped_busy: usize,
}

enum UserTick {
    Idle,
    Unknown,
    Busy,
    Evaluated(Vec<RewardOutcome>),
}

/// Marks a user as being evaluated; released on drop, including when the
/// evaluation future is cancelled.
struct InFlight<'a> {
    users: &'a StdMutex<HashSet<UserId>>,
    user: UserId,
}

impl<'a> InFlight<'a> {
    fn claim(users: &'a StdMutex<HashSet<UserId>>, user: UserId) -> Option<Self> {
        let claimed = users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user);
        claimed.then_some(Self { users, user })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user);
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`PlayclockService`].
///
/// # Example
///
/// ```rust,ignore
/// let service = PlayclockService::builder(JsonFileStore::open("playerdata.json").await?, ledger, host)
///     .settings(Settings::load("playclock.toml").await?)
///     .idle(Arc::new(my_afk_tracker))
///     .build()
///     .await?;
/// let running = service.start().await;
/// // ...
/// running.shutdown().await?;
/// ```
pub struct PlayclockServiceBuilder<P: Persistence, L: CurrencyLedger> {
    persistence: P,
    ledger: Arc<L>,
    host: Arc<dyn SessionHost>,
    idle: Arc<dyn IdleProvider>,
    auth: Arc<dyn Authorization>,
    clock: Arc<dyn Clock>,
    settings: Settings,
}

impl<P: Persistence, L: CurrencyLedger> PlayclockServiceBuilder<P, L> {
    /// Sets the settings. Default: [`Settings::default`].
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the idle provider. Default: nobody is ever idle.
    pub fn idle(mut self, idle: Arc<dyn IdleProvider>) -> Self {
        self.idle = idle;
        self
    }

    /// Sets the authorization source. Default: no overrides.
    pub fn authorization(mut self, auth: Arc<dyn Authorization>) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the clock. Default: system time.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Loads persisted state and builds the service. Nothing runs in the
    /// background until [`PlayclockService::start`].
    ///
    /// # Errors
    /// Propagates the persistence backend's initial load failure.
    pub async fn build(self) -> Result<PlayclockService<P, L>, PlayclockError> {
        let store = Arc::new(PlayerStore::open(self.persistence).await?);
        let accumulator =
            TimeAccumulator::new(Arc::clone(&store), self.clock, Arc::clone(&self.idle));
        let active = ActiveSettings::resolve(self.settings, self.ledger.as_ref());

        Ok(PlayclockService {
            store,
            accumulator,
            ledger: self.ledger,
            host: self.host,
            idle: self.idle,
            auth: self.auth,
            active: RwLock::new(Arc::new(active)),
            in_flight: StdMutex::new(HashSet::new()),
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Playtime tracking and timed rewards for one game server.
pub struct PlayclockService<P: Persistence, L: CurrencyLedger> {
    store: Arc<PlayerStore<P>>,
    accumulator: TimeAccumulator<P>,
    ledger: Arc<L>,
    host: Arc<dyn SessionHost>,
    idle: Arc<dyn IdleProvider>,
    auth: Arc<dyn Authorization>,
    active: RwLock<Arc<ActiveSettings>>,
    /// Users whose reward evaluation is between plan and commit.
    in_flight: StdMutex<HashSet<UserId>>,
}

impl<P: Persistence, L: CurrencyLedger> PlayclockService<P, L> {
    /// Creates a builder.
    pub fn builder(
        persistence: P,
        ledger: Arc<L>,
        host: Arc<dyn SessionHost>,
    ) -> PlayclockServiceBuilder<P, L> {
        PlayclockServiceBuilder {
            persistence,
            ledger,
            host,
            idle: Arc::new(NoIdleProvider),
            auth: Arc::new(NoPermissions),
            clock: Arc::new(SystemClock),
            settings: Settings::default(),
        }
    }

    /// The player store.
    pub fn store(&self) -> &Arc<PlayerStore<P>> {
        &self.store
    }

    /// The accumulator.
    pub fn accumulator(&self) -> &TimeAccumulator<P> {
        &self.accumulator
    }

    /// The current settings.
    pub async fn settings(&self) -> Settings {
        self.active.read().await.settings.clone()
    }

    /// The currency configs in effect, symbols resolved.
    pub async fn currencies(&self) -> Vec<CurrencyConfig> {
        self.active.read().await.currencies.clone()
    }

    async fn active(&self) -> Arc<ActiveSettings> {
        Arc::clone(&*self.active.read().await)
    }

    /// Registers every user the host already lists as connected, then spawns
    /// the reward and persistence ticks.
    pub async fn start(self) -> RunningService<P, L> {
        let service = Arc::new(self);

        let online = service.host.connected_users();
        for user in &online {
            service.accumulator.on_connect(*user).await;
        }

        let settings = service.settings().await;
        let reward = {
            let service = Arc::clone(&service);
            PeriodicTask::spawn("reward", tick_config(settings.reward_tick_period(), &settings), move || {
                let service = Arc::clone(&service);
                async move {
                    service.run_reward_tick().await;
                }
            })
        };
        let persist = {
            let service = Arc::clone(&service);
            PeriodicTask::spawn("persist", tick_config(settings.persist_tick_period(), &settings), move || {
                let service = Arc::clone(&service);
                async move {
                    // Failures are logged inside; the next tick retries.
                    let _ = service.run_persist_tick().await;
                }
            })
        };

        tracing::info!(
            online = online.len(),
            reward_tick_secs = settings.reward_tick_secs,
            persist_tick_secs = settings.persist_tick_secs,
            "playclock started"
        );

        RunningService {
            service,
            reward,
            persist,
        }
    }

    // -- Session events ---------------------------------------------------

    /// A user joined.
    pub async fn on_connected(&self, user: UserId) {
        self.accumulator.on_connect(user).await;
    }

    /// A user left. Folds their open segment and saves their state.
    pub async fn on_disconnected(&self, user: UserId) {
        self.accumulator.on_disconnect(user).await;
        if let Err(e) = self.store.save_user(user).await {
            tracing::error!(%user, error = %e, "failed to save user on disconnect");
        }
    }

    /// A user's idle status changed.
    pub async fn on_idle_changed(&self, user: UserId, idle: bool) {
        self.accumulator.on_idle_changed(user, idle).await;
    }

    // -- Ticks ------------------------------------------------------------

    /// Runs one reward evaluation over every connected user.
    ///
    /// Users are evaluated concurrently, at most
    /// `max_concurrent_evaluations` at a time, so one slow ledger call
    /// never holds up the rest. One user's failure never affects another.
    ///
    /// A user's state is locked only while grants are planned and committed,
    /// never across a ledger call, so session events and the persistence
    /// tick proceed while a credit is pending. A user whose previous
    /// evaluation is still crediting is counted in `skipped_busy`.
    pub async fn run_reward_tick(&self) -> RewardTickReport {
        let active = self.active().await;
        let evaluator = RewardEvaluator::new(
            Arc::clone(&self.ledger),
            Arc::clone(&self.auth),
            active.settings.permission_namespace.clone(),
            active.settings.credit_timeout(),
        );
        let limit = active.settings.max_concurrent_evaluations.max(1);
        let users = self.host.connected_users();

        let results: Vec<UserTick> = futures_util::stream::iter(users)
            .map(|user| self.reward_user(user, &evaluator, &active))
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut report = RewardTickReport::default();
        for result in results {
            match result {
                UserTick::Idle => report.skipped_idle += 1,
                UserTick::Unknown => report.skipped_unknown += 1,
                UserTick::Busy => report.skipped_busy += 1,
                UserTick::Evaluated(outcomes) => {
                    report.evaluated += 1;
                    for outcome in outcomes {
                        match outcome {
                            RewardOutcome::Initialized { .. } => report.initialized += 1,
                            RewardOutcome::Granted { .. } => report.granted += 1,
                            RewardOutcome::Failed { .. } => report.failed += 1,
                            RewardOutcome::Skipped { .. } => {}
                        }
                    }
                }
            }
        }

        tracing::debug!(?report, "reward tick finished");
        report
    }

    async fn reward_user(
        &self,
        user: UserId,
        evaluator: &RewardEvaluator<L>,
        active: &ActiveSettings,
    ) -> UserTick {
        if active.settings.idle_disqualifies_reward && self.idle.is_idle(user) {
            tracing::trace!(%user, "idle user skipped by reward tick");
            return UserTick::Idle;
        }
        if !self.accumulator.is_connected(user).await {
            tracing::debug!(%user, "host lists user that never connected, skipped");
            return UserTick::Unknown;
        }

        let Some(_claim) = InFlight::claim(&self.in_flight, user) else {
            tracing::debug!(%user, "previous evaluation still crediting, skipped");
            return UserTick::Busy;
        };

        self.accumulator.flush(user).await;

        // The user's lock is held only around plan and commit; the ledger
        // calls in between run unlocked.
        let plan = {
            let mut state = self.store.lock_user(user).await;
            evaluator.plan(user, &mut state, &active.currencies)
        };
        let credited = evaluator.credit(plan).await;
        let outcomes = {
            let mut state = self.store.lock_user(user).await;
            evaluator.commit(&mut state, credited)
        };

        for outcome in &outcomes {
            if let Some(amount) = outcome.granted_amount() {
                self.announce(user, outcome.currency(), amount, active);
            }
        }
        UserTick::Evaluated(outcomes)
    }

    fn announce(&self, user: UserId, currency: &CurrencyId, amount: f64, active: &ActiveSettings) {
        let player = self
            .host
            .display_name(user)
            .unwrap_or_else(|| user.to_string());
        let symbol = active.symbol(currency);

        let text = render_template(&active.settings.reward_message, amount, symbol, &player);
        self.host.send_message(user, &text);

        if active.settings.broadcast_on_reward {
            let text = render_template(&active.settings.broadcast_message, amount, symbol, &player);
            self.host.broadcast(&text);
        }
    }

    /// Flushes every connected user and saves the whole store. Returns the
    /// number of users saved.
    ///
    /// # Errors
    /// Propagates the save failure (also logged); in-memory state is kept.
    pub async fn run_persist_tick(&self) -> Result<usize, PlayclockError> {
        let users = self.accumulator.connected_users().await;
        self.accumulator.flush_all(&users).await;

        match self.store.save_all().await {
            Ok(saved) => {
                tracing::info!(saved, "player state persisted");
                Ok(saved)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to persist player state, will retry");
                Err(e.into())
            }
        }
    }

    // -- Admin ------------------------------------------------------------

    /// Replaces currencies, templates and flags. Tick periods take effect
    /// on the next start.
    pub async fn reload_settings(&self, settings: Settings) {
        let active = ActiveSettings::resolve(settings, self.ledger.as_ref());
        let currencies = active.currencies.len();
        *self.active.write().await = Arc::new(active);
        tracing::info!(currencies, "settings reloaded");
    }

    /// Reads `path` and applies it with [`reload_settings`](Self::reload_settings).
    /// The current settings stay in place if the file is unusable.
    ///
    /// # Errors
    /// Propagates [`SettingsError`](crate::SettingsError).
    pub async fn reload_settings_from(&self, path: impl AsRef<Path>) -> Result<(), PlayclockError> {
        let settings = Settings::load(path).await?;
        self.reload_settings(settings).await;
        Ok(())
    }

    /// Zeroes everyone's period time, including users only in persistence.
    /// Connected users are flushed first so time played before the reset
    /// stays in the old period.
    ///
    /// # Errors
    /// Propagates the persistence half of the reset; memory is always reset.
    pub async fn reset_period_time(&self) -> Result<(), PlayclockError> {
        let users = self.accumulator.connected_users().await;
        self.accumulator.flush_all(&users).await;
        self.store.reset_all_period_time().await?;
        Ok(())
    }

    /// Statistics for `user`, or `None` if the user is unknown to both the
    /// store and persistence.
    ///
    /// # Errors
    /// Propagates a persistence lookup failure for evicted users.
    pub async fn stats(&self, user: UserId) -> Result<Option<PlayerStats>, PlayclockError> {
        let connected = self.accumulator.is_connected(user).await;
        if connected {
            self.accumulator.flush(user).await;
        }

        let state = match self.store.get(user).await {
            Some(state) => state,
            None => match self.store.persistence().load(user).await? {
                Some(state) => state,
                None => return Ok(None),
            },
        };

        let active = self.active().await;
        Ok(Some(PlayerStats::new(
            user,
            self.host.display_name(user),
            connected,
            &state,
            &active.currencies,
        )))
    }

    /// Total active seconds of every known user, highest first.
    ///
    /// # Errors
    /// Propagates a persistence load failure.
    pub async fn total_times(&self) -> Result<Vec<(UserId, u64)>, PlayclockError> {
        self.ranked(|s| s.total_active_secs).await
    }

    /// Period active seconds of every known user, highest first.
    ///
    /// # Errors
    /// Propagates a persistence load failure.
    pub async fn period_times(&self) -> Result<Vec<(UserId, u64)>, PlayclockError> {
        self.ranked(|s| s.period_active_secs).await
    }

    async fn ranked(
        &self,
        key: impl Fn(&playclock_model::UserState) -> u64,
    ) -> Result<Vec<(UserId, u64)>, PlayclockError> {
        let users = self.accumulator.connected_users().await;
        self.accumulator.flush_all(&users).await;

        let mut ranked: Vec<(UserId, u64)> = self
            .store
            .all_states()
            .await?
            .iter()
            .map(|(id, state)| (*id, key(state)))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(ranked)
    }

    /// Saves `user` and drops them from memory. A connected user is flushed
    /// first; their next fold reloads them from persistence.
    ///
    /// # Errors
    /// Propagates the save failure; the user then stays in memory.
    pub async fn evict(&self, user: UserId) -> Result<bool, PlayclockError> {
        self.accumulator.flush(user).await;
        Ok(self.store.evict(user).await?.is_some())
    }

    /// Flushes connected users and saves now, outside the persistence tick.
    ///
    /// # Errors
    /// See [`run_persist_tick`](Self::run_persist_tick).
    pub async fn save_now(&self) -> Result<usize, PlayclockError> {
        self.run_persist_tick().await
    }
}

fn tick_config(period: Option<std::time::Duration>, settings: &Settings) -> TickConfig {
    match period {
        Some(period) => TickConfig {
            policy: settings.late_tick_policy.into(),
            ..TickConfig::every(period)
        },
        None => TickConfig::disabled(),
    }
}

// ---------------------------------------------------------------------------
// Running service
// ---------------------------------------------------------------------------

/// A started service with its background ticks.
pub struct RunningService<P: Persistence, L: CurrencyLedger> {
    service: Arc<PlayclockService<P, L>>,
    reward: PeriodicTask,
    persist: PeriodicTask,
}

impl<P: Persistence, L: CurrencyLedger> RunningService<P, L> {
    /// The service, for events and admin calls.
    pub fn service(&self) -> &Arc<PlayclockService<P, L>> {
        &self.service
    }

    /// Completed (reward, persistence) tick runs.
    pub fn tick_runs(&self) -> (u64, u64) {
        (self.reward.runs(), self.persist.runs())
    }

    /// Holds back the reward tick. Play time keeps accumulating and a grant
    /// already being credited completes.
    pub fn pause_rewards(&self) {
        self.reward.pause();
    }

    /// Restarts the reward tick; the first run is one period away.
    pub fn resume_rewards(&self) {
        self.reward.resume();
    }

    /// Whether the reward tick is paused.
    pub fn rewards_paused(&self) -> bool {
        self.reward.is_paused()
    }

    /// Stops both ticks (waiting for in-flight runs), flushes every
    /// connected user and saves. Returns the number of users saved.
    ///
    /// # Errors
    /// Propagates the final save failure.
    pub async fn shutdown(self) -> Result<usize, PlayclockError> {
        tracing::info!("playclock shutting down");
        self.reward.cancel().await;
        self.persist.cancel().await;

        let saved = self.service.run_persist_tick().await?;
        tracing::info!(saved, "playclock stopped");
        Ok(saved)
    }
}
