//! The durable-storage boundary.
//!
//! Playclock does not care where snapshots end up. It defines the
//! [`Persistence`] trait and ships two implementations; a host can plug in
//! a database-backed one without touching the store.

use std::collections::HashMap;

use playclock_model::{UserId, UserState};

use crate::StoreError;

/// Loads and saves [`UserState`] snapshots keyed by [`UserId`].
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → shared by the persistence tick, shutdown,
///   and admin calls across runtime workers.
/// - Every future is `Send` so callers can `tokio::spawn` around it.
///
/// # Contract
///
/// - `save_all` is an **upsert**: users missing from `users` keep whatever
///   the backend already holds for them.
/// - A backend that cannot interpret one stored entry (e.g. a malformed
///   identity key) skips it in `load_all` and logs a warning instead of
///   failing the whole load.
pub trait Persistence: Send + Sync + 'static {
    /// Loads one user's snapshot. `Ok(None)` if the backend has never seen
    /// the user.
    fn load(
        &self,
        user: UserId,
    ) -> impl std::future::Future<Output = Result<Option<UserState>, StoreError>> + Send;

    /// Loads every stored snapshot. Used once at startup.
    fn load_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<(UserId, UserState)>, StoreError>> + Send;

    /// Durably writes the given snapshots.
    fn save_all(
        &self,
        users: &HashMap<UserId, UserState>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Zeroes the period time of every stored user, including users that
    /// are not in memory.
    fn reset_all_period(
        &self,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
