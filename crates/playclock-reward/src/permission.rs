//! Permission-node amount overrides.
//!
//! A node of the form `<namespace>.<currency>.<amount>` raises the reward
//! amount for that currency. For example, with namespace `timereward`:
//!
//! ```text
//! timereward.gold.10     → gold, 10.0
//! timereward.gold.2.5    → ignored (four parts)
//! timereward.gold.lots   → ignored (not a number)
//! timereward.gold        → ignored (no amount)
//! ```

use playclock_model::CurrencyId;

/// A parsed `<namespace>.<currency>.<amount>` node.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionOverride {
    /// Currency the override applies to.
    pub currency: CurrencyId,
    /// Amount granted per reward, always finite.
    pub amount: f64,
}

impl PermissionOverride {
    /// Parses `node` as an override under `namespace`.
    ///
    /// Returns `None` unless the node has exactly three dot-separated
    /// parts, the first equals `namespace`, the second is non-empty, and
    /// the third is a finite number.
    pub fn parse(node: &str, namespace: &str) -> Option<Self> {
        let mut parts = node.split('.');
        let (ns, currency, amount) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || ns != namespace || currency.is_empty() {
            return None;
        }

        let amount: f64 = amount.trim().parse().ok()?;
        amount.is_finite().then(|| Self {
            currency: CurrencyId::new(currency),
            amount,
        })
    }
}
