//! Optional idle-status capability.
//!
//! Many game servers have an away-from-keyboard concept provided by some
//! other plugin or subsystem; some don't. Playclock asks through the
//! [`IdleProvider`] trait and, when the host has nothing to offer, is wired
//! with [`NoIdleProvider`], under which nobody is ever idle.

use playclock_model::UserId;

/// Reports whether a user is currently idle (away from keyboard).
///
/// Called on connect and on every reward tick, so implementations should
/// answer from memory rather than doing I/O.
pub trait IdleProvider: Send + Sync + 'static {
    /// `true` if `user` is idle right now.
    fn is_idle(&self, user: UserId) -> bool;
}

/// The null object: no user is ever idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIdleProvider;

impl IdleProvider for NoIdleProvider {
    fn is_idle(&self, _user: UserId) -> bool {
        false
    }
}
