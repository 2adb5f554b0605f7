//! The time accumulator: converts session signals into active seconds.
//!
//! Every connected user is in one of two presence states:
//!
//! ```text
//!              on_idle_changed(true)
//!   Active { since } ─────────────────→ Idle
//!         ↑  │                           │
//!         │  └─ flush(): fold, since=now │
//!         └──────────────────────────────┘
//!              on_idle_changed(false)
//! ```
//!
//! `on_connect` enters one of them, `on_disconnect` leaves both. Time is
//! only ever measured as `now - since` for an `Active` segment, so idle
//! time is excluded structurally: there is no open segment to measure.
//!
//! # Concurrency note
//!
//! The presence map is private and guarded by one mutex. The delta of a
//! segment and the restart of that segment are computed under that lock in
//! one step, so two concurrent flushes of the same user can never both
//! count the same seconds. The delta is then added to the store outside the
//! lock; addition commutes, so the order in which deltas land is irrelevant.

use std::collections::HashMap;
use std::sync::Arc;

use playclock_model::UserId;
use playclock_store::{Persistence, PlayerStore};
use tokio::sync::Mutex;

use crate::{Clock, IdleProvider};

/// Presence of one connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    /// Connected and accruing since `since` (epoch seconds).
    Active { since: i64 },
    /// Connected but idle. Nothing accrues.
    Idle,
}

/// Tracks open segments and folds elapsed active time into the store.
pub struct TimeAccumulator<P: Persistence> {
    store: Arc<PlayerStore<P>>,
    clock: Arc<dyn Clock>,
    idle: Arc<dyn IdleProvider>,
    presence: Mutex<HashMap<UserId, Presence>>,
}

impl<P: Persistence> TimeAccumulator<P> {
    /// Creates an accumulator with no connected users.
    pub fn new(
        store: Arc<PlayerStore<P>>,
        clock: Arc<dyn Clock>,
        idle: Arc<dyn IdleProvider>,
    ) -> Self {
        Self {
            store,
            clock,
            idle,
            presence: Mutex::new(HashMap::new()),
        }
    }

    /// The store time is folded into.
    pub fn store(&self) -> &Arc<PlayerStore<P>> {
        &self.store
    }

    /// Current time according to the accumulator's clock.
    pub fn now(&self) -> i64 {
        self.clock.now_epoch_secs()
    }

    /// A user joined the session.
    ///
    /// Makes sure the user has state in the store, then opens a segment
    /// unless the idle provider reports the user as idle. A duplicate
    /// connect folds whatever segment was already open before starting over.
    pub async fn on_connect(&self, user: UserId) {
        self.store.get_or_create(user).await;

        let idle = self.idle.is_idle(user);
        let now = self.now();
        let next = if idle {
            Presence::Idle
        } else {
            Presence::Active { since: now }
        };

        let folded = {
            let mut presence = self.presence.lock().await;
            match presence.insert(user, next) {
                Some(Presence::Active { since }) => elapsed(since, now),
                _ => 0,
            }
        };
        self.store.add_active_time(user, folded).await;

        tracing::info!(%user, idle, "user connected");
    }

    /// A user left the session. Folds the open segment, if any, and forgets
    /// the user. Returns the seconds folded.
    pub async fn on_disconnect(&self, user: UserId) -> u64 {
        let now = self.now();
        let (known, folded) = {
            let mut presence = self.presence.lock().await;
            match presence.remove(&user) {
                Some(Presence::Active { since }) => (true, elapsed(since, now)),
                Some(Presence::Idle) => (true, 0),
                None => (false, 0),
            }
        };

        if !known {
            tracing::debug!(%user, "disconnect for unknown user ignored");
            return 0;
        }
        self.store.add_active_time(user, folded).await;
        tracing::info!(%user, folded, "user disconnected");
        folded
    }

    /// The host reported an idle-status change. Returns the seconds folded
    /// (non-zero only when going idle with an open segment).
    ///
    /// Going active opens a segment only for connected users that have none;
    /// signals for users that are not connected are ignored.
    pub async fn on_idle_changed(&self, user: UserId, idle: bool) -> u64 {
        let now = self.now();
        let folded = {
            let mut presence = self.presence.lock().await;
            let Some(state) = presence.get_mut(&user) else {
                tracing::debug!(%user, idle, "idle change for disconnected user ignored");
                return 0;
            };
            match (*state, idle) {
                (Presence::Active { since }, true) => {
                    *state = Presence::Idle;
                    elapsed(since, now)
                }
                (Presence::Idle, false) => {
                    *state = Presence::Active { since: now };
                    0
                }
                // Already in the requested state.
                _ => return 0,
            }
        };

        self.store.add_active_time(user, folded).await;
        if idle {
            tracing::info!(%user, folded, "user went idle, segment closed");
        } else {
            tracing::info!(%user, "user returned from idle, segment opened");
        }
        folded
    }

    /// Captures progress without ending the session: folds `now - since`
    /// and restarts the segment at `now`. Returns the seconds folded, zero
    /// when the user has no open segment.
    pub async fn flush(&self, user: UserId) -> u64 {
        let now = self.now();
        let folded = {
            let mut presence = self.presence.lock().await;
            match presence.get_mut(&user) {
                Some(Presence::Active { since }) => {
                    let delta = elapsed(*since, now);
                    *since = now;
                    delta
                }
                _ => 0,
            }
        };

        self.store.add_active_time(user, folded).await;
        if folded > 0 {
            tracing::trace!(%user, folded, "segment flushed");
        }
        folded
    }

    /// Flushes each of `users`. Returns the total seconds folded.
    pub async fn flush_all(&self, users: &[UserId]) -> u64 {
        let mut total = 0u64;
        for user in users {
            total = total.saturating_add(self.flush(*user).await);
        }
        total
    }

    /// Whether `user` is connected (idle or not).
    pub async fn is_connected(&self, user: UserId) -> bool {
        self.presence.lock().await.contains_key(&user)
    }

    /// Whether `user` has an open segment right now.
    pub async fn is_accruing(&self, user: UserId) -> bool {
        matches!(
            self.presence.lock().await.get(&user),
            Some(Presence::Active { .. })
        )
    }

    /// Every connected user.
    pub async fn connected_users(&self) -> Vec<UserId> {
        self.presence.lock().await.keys().copied().collect()
    }
}

/// Seconds between two epoch instants. A clock stepping backwards yields
/// zero instead of negative time.
fn elapsed(since: i64, now: i64) -> u64 {
    u64::try_from(now.saturating_sub(since)).unwrap_or(0)
}

// =========================================================================
// Tests
// =========================================================================
