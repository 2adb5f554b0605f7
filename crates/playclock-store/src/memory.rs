//! In-process persistence for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use playclock_model::{UserId, UserState};
use tokio::sync::Mutex;

use crate::{Persistence, StoreError};

/// A [`Persistence`] that keeps snapshots in a `HashMap`.
///
/// Nothing survives the process, but it behaves like a real backend
/// otherwise: saves are upserts, and [`set_fail_saves`](Self::set_fail_saves)
/// simulates a broken disk so callers can exercise their error paths.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<UserId, UserState>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with snapshots, as if loaded from a previous run.
    pub fn with_users(users: impl IntoIterator<Item = (UserId, UserState)>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Makes every subsequent `save_all` / `reset_all_period` fail.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save_all` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// What the store currently holds for `user`.
    pub async fn stored(&self, user: UserId) -> Option<UserState> {
        self.users.lock().await.get(&user).cloned()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("memory store is read-only".into()));
        }
        Ok(())
    }
}

impl Persistence for MemoryStore {
    async fn load(&self, user: UserId) -> Result<Option<UserState>, StoreError> {
        Ok(self.stored(user).await)
    }

    async fn load_all(&self) -> Result<Vec<(UserId, UserState)>, StoreError> {
        let users = self.users.lock().await;
        Ok(users.iter().map(|(id, s)| (*id, s.clone())).collect())
    }

    async fn save_all(&self, users: &HashMap<UserId, UserState>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut stored = self.users.lock().await;
        for (id, state) in users {
            stored.insert(*id, state.clone());
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reset_all_period(&self) -> Result<(), StoreError> {
        self.check_writable()?;
        for state in self.users.lock().await.values_mut() {
            state.reset_period();
        }
        Ok(())
    }
}
