//! The host session boundary.
//!
//! Playclock does not own connections. The game server tells it about
//! joins, leaves and idle changes through [`PlayclockService`]'s event
//! methods, and answers the questions below through [`SessionHost`].
//!
//! [`PlayclockService`]: crate::PlayclockService

use playclock_model::UserId;

/// What Playclock needs from the game server.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → shared with the background ticks.
/// - All methods are synchronous and should return quickly; they are called
///   from inside the reward tick.
pub trait SessionHost: Send + Sync + 'static {
    /// Every user currently connected, idle or not.
    fn connected_users(&self) -> Vec<UserId>;

    /// Human-readable name for `user`, used in reward messages. `None`
    /// falls back to the user id.
    fn display_name(&self, user: UserId) -> Option<String>;

    /// Sends a private message to `user`. Dropped silently if the user has
    /// left in the meantime.
    fn send_message(&self, user: UserId, text: &str);

    /// Sends a message to every connected user.
    fn broadcast(&self, text: &str);
}
