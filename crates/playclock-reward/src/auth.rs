//! The authorization collaborator.
//!
//! The host's permission system knows which nodes a user holds. Playclock
//! only needs the flat list; the override parsing lives in
//! [`PermissionOverride`].

use playclock_model::UserId;

use crate::PermissionOverride;

/// Lists the permission nodes a user effectively holds.
pub trait Authorization: Send + Sync + 'static {
    /// Every permission node granted to `user`, inherited ones included.
    fn effective_permissions(&self, user: UserId) -> Vec<String>;

    /// Amount overrides for `currency` under `namespace`. Nodes that do not
    /// parse as overrides are ignored.
    fn effective_overrides(&self, user: UserId, currency: &str, namespace: &str) -> Vec<f64> {
        self.effective_permissions(user)
            .iter()
            .filter_map(|node| PermissionOverride::parse(node, namespace))
            .filter(|o| o.currency.as_str() == currency)
            .map(|o| o.amount)
            .collect()
    }
}

/// Grants nothing. Every user gets the configured default amounts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPermissions;

impl Authorization for NoPermissions {
    fn effective_permissions(&self, _user: UserId) -> Vec<String> {
        Vec::new()
    }
}
