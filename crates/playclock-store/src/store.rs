//! The player store: every known user's state, safe to share across tasks.
//!
//! # Concurrency note
//!
//! Two granularities of locking are used:
//!
//! - **Per user**: each [`UserState`] sits behind its own
//!   `tokio::sync::Mutex`. Session events and reward evaluation for one
//!   user serialize on it; different users never contend. The map itself is
//!   only read-locked long enough to clone the entry's `Arc`.
//! - **Whole store**: snapshot-style operations ([`PlayerStore::snapshot`],
//!   [`PlayerStore::reset_all_period_time`], [`PlayerStore::for_each`])
//!   take the map write lock, which stops new per-user operations from
//!   starting, then acquire every entry lock before touching anything.
//!   The result is a cut of all users at a single instant.
//!
//! Nobody ever holds two entry locks except a whole-store operation, and
//! those are mutually exclusive through the map write lock, so the scheme
//! cannot deadlock. Entry locks are only held for in-memory work; nothing
//! awaits I/O or a ledger while holding one.
//!
//! # Save ordering
//!
//! Every write to persistence (bulk save, single-user save, eviction,
//! period reset) and every reload of a missing user runs under one save
//! lock, from the moment its state is read until the write lands. A bulk
//! save that snapshotted older state can therefore never land after an
//! eviction that saved newer state, and a user reloaded after eviction
//! always sees the eviction's write. Lock order is save lock, then map,
//! then entry.

use std::collections::HashMap;
use std::sync::Arc;

use playclock_model::{UserId, UserState};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, RwLock};

use crate::{Persistence, StoreError};

/// Shared handle to one user's state.
pub type UserEntry = Arc<Mutex<UserState>>;

/// Exclusive access to one user's state, independent of the store borrow.
///
/// Held by the reward evaluator across a user's ledger calls so no other
/// mutator can interleave mid-update.
pub type UserGuard = OwnedMutexGuard<UserState>;

/// Owns the [`UserState`] of every known user.
///
/// ## Lifecycle
///
/// ```text
/// open() ──→ get_or_create() / update() / lock_user() ──→ save_all()
///   │                  ▲                                    │
///   │ load_all()       │ load() (after evict)               ▼
///   ▼                  │                              Persistence
/// [Persistence] ───────┘
/// ```
pub struct PlayerStore<P: Persistence> {
    users: RwLock<HashMap<UserId, UserEntry>>,
    persistence: P,
    save_lock: Mutex<()>,
}

impl<P: Persistence> PlayerStore<P> {
    /// Creates a store and eagerly loads every persisted user.
    ///
    /// # Errors
    /// Propagates the backend's `load_all` failure.
    pub async fn open(persistence: P) -> Result<Self, StoreError> {
        let loaded = persistence.load_all().await?;
        tracing::info!(users = loaded.len(), "player store loaded");

        let users = loaded
            .into_iter()
            .map(|(id, state)| (id, Arc::new(Mutex::new(state))))
            .collect();

        Ok(Self {
            users: RwLock::new(users),
            persistence,
            save_lock: Mutex::new(()),
        })
    }

    /// The persistence backend.
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    async fn entry(&self, user: UserId) -> Option<UserEntry> {
        self.users.read().await.get(&user).cloned()
    }

    /// Returns the entry for `user`, creating it on first reference.
    ///
    /// A missing user is looked up in persistence first (this only finds
    /// something for users evicted since startup), then falls back to a
    /// fresh zero state. A failing lookup is logged and treated as "not
    /// found".
    async fn entry_or_create(&self, user: UserId) -> UserEntry {
        if let Some(entry) = self.entry(user).await {
            return entry;
        }

        let _save = self.save_lock.lock().await;
        if let Some(entry) = self.entry(user).await {
            return entry;
        }

        let state = match self.persistence.load(user).await {
            Ok(Some(state)) => {
                tracing::debug!(%user, "user state reloaded from persistence");
                state
            }
            Ok(None) => UserState::new(),
            Err(e) => {
                tracing::warn!(%user, error = %e, "failed to load user state, starting fresh");
                UserState::new()
            }
        };

        let mut users = self.users.write().await;
        Arc::clone(
            users
                .entry(user)
                .or_insert_with(|| Arc::new(Mutex::new(state))),
        )
    }

    /// Returns a copy of `user`'s state, creating it on first reference.
    pub async fn get_or_create(&self, user: UserId) -> UserState {
        self.entry_or_create(user).await.lock().await.clone()
    }

    /// Returns a copy of `user`'s state, or `None` if the user is not in
    /// memory. Never touches persistence.
    pub async fn get(&self, user: UserId) -> Option<UserState> {
        let entry = self.entry(user).await?;
        let state = entry.lock().await.clone();
        Some(state)
    }

    /// Whether `user` is in the in-memory working set.
    pub async fn contains(&self, user: UserId) -> bool {
        self.users.read().await.contains_key(&user)
    }

    /// Locks `user`'s state for a multi-step read/modify/write, creating the
    /// user if needed.
    pub async fn lock_user(&self, user: UserId) -> UserGuard {
        self.entry_or_create(user).await.lock_owned().await
    }

    /// Applies `f` to `user`'s state under the user's lock.
    pub async fn update<R>(&self, user: UserId, f: impl FnOnce(&mut UserState) -> R) -> R {
        let entry = self.entry_or_create(user).await;
        let mut state = entry.lock().await;
        f(&mut state)
    }

    /// Folds `secs` of active time into `user`'s total and period clocks.
    pub async fn add_active_time(&self, user: UserId, secs: u64) {
        if secs == 0 {
            return;
        }
        self.update(user, |state| state.add_active_secs(secs)).await;
    }

    /// Runs `f` over every in-memory user against a consistent cut.
    pub async fn for_each(&self, mut f: impl FnMut(UserId, &mut UserState)) {
        let users = self.users.write().await;
        let mut guards = lock_all(&users).await;
        for (id, state) in guards.iter_mut() {
            f(*id, state);
        }
    }

    /// A consistent copy of every in-memory user.
    pub async fn snapshot(&self) -> HashMap<UserId, UserState> {
        let mut out = HashMap::new();
        self.for_each(|id, state| {
            out.insert(id, state.clone());
        })
        .await;
        out
    }

    /// Every user known to the store or to persistence.
    ///
    /// In-memory state wins over persisted state for users present in both.
    ///
    /// # Errors
    /// Propagates the backend's `load_all` failure.
    pub async fn all_states(&self) -> Result<HashMap<UserId, UserState>, StoreError> {
        let mut all = self.snapshot().await;
        for (id, state) in self.persistence.load_all().await? {
            all.entry(id).or_insert(state);
        }
        Ok(all)
    }

    /// Zeroes the period clock of every user, in memory and in persistence.
    ///
    /// The in-memory reset always happens; the returned error only reports
    /// the persistence half.
    pub async fn reset_all_period_time(&self) -> Result<(), StoreError> {
        let _save = self.save_lock.lock().await;
        let mut reset = 0usize;
        self.for_each(|_, state| {
            state.reset_period();
            reset += 1;
        })
        .await;
        tracing::info!(users = reset, "period time reset");

        self.persistence.reset_all_period().await.inspect_err(|e| {
            tracing::error!(error = %e, "failed to reset period time in persistence");
        })
    }

    /// Durably saves every in-memory user.
    ///
    /// The snapshot is taken under the map lock; the write happens after
    /// it is released, so slow I/O never blocks the per-user path. The save
    /// lock is held throughout.
    ///
    /// # Errors
    /// Propagates the backend's `save_all` failure. In-memory state is
    /// untouched either way.
    pub async fn save_all(&self) -> Result<usize, StoreError> {
        let _save = self.save_lock.lock().await;
        let snapshot = self.snapshot().await;
        let count = snapshot.len();
        self.persistence.save_all(&snapshot).await?;
        tracing::debug!(users = count, "player state saved");
        Ok(count)
    }

    /// Durably saves a single user, if present in memory.
    ///
    /// # Errors
    /// Propagates the backend's `save_all` failure.
    pub async fn save_user(&self, user: UserId) -> Result<(), StoreError> {
        let _save = self.save_lock.lock().await;
        let Some(state) = self.get(user).await else {
            return Ok(());
        };
        let single = HashMap::from([(user, state)]);
        self.persistence.save_all(&single).await
    }

    /// Saves `user` and drops them from the in-memory working set.
    ///
    /// Returns the evicted state, or `None` if the user was not in memory.
    /// If the save fails the user is put back and the error is returned, so
    /// nothing is lost.
    pub async fn evict(&self, user: UserId) -> Result<Option<UserState>, StoreError> {
        let _save = self.save_lock.lock().await;

        // Anyone who already cloned the entry queued on its lock before the
        // map write lock was granted, so the copy below includes their work.
        let (entry, state) = {
            let mut users = self.users.write().await;
            let Some(entry) = users.remove(&user) else {
                return Ok(None);
            };
            let state = entry.lock().await.clone();
            (entry, state)
        };

        if let Err(e) = self
            .persistence
            .save_all(&HashMap::from([(user, state.clone())]))
            .await
        {
            self.users.write().await.entry(user).or_insert(entry);
            return Err(e);
        }

        tracing::info!(%user, "user evicted from memory");
        Ok(Some(state))
    }

    /// Number of users in memory.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// `true` if no users are in memory.
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

/// Acquires every entry lock in the map. Callers must hold the map write
/// lock so the set of entries cannot change underneath.
async fn lock_all(
    users: &HashMap<UserId, UserEntry>,
) -> Vec<(UserId, MutexGuard<'_, UserState>)> {
    let mut guards = Vec::with_capacity(users.len());
    for (id, entry) in users {
        guards.push((*id, entry.lock().await));
    }
    guards
}

// =========================================================================
// Tests
// =========================================================================
