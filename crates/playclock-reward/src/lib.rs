//! Reward eligibility for Playclock.
//!
//! Given a user's accumulated time and the configured currencies, this crate
//! decides which currencies are due, how much to grant, and credits them
//! through an external ledger:
//!
//! 1. **Ledger**: where currency actually lands ([`CurrencyLedger`] trait)
//! 2. **Authorization**: the user's permission nodes, from which per-user
//!    amount overrides are parsed ([`Authorization`], [`PermissionOverride`])
//! 3. **Evaluation**: the checkpoint state machine ([`RewardEvaluator`])
//! 4. **Messages**: placeholder rendering for reward notices
//!    ([`render_template`], [`format_amount`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Service (above)      ← reward tick: flush, plan, credit, commit
//!     ↕
//! Reward (this crate)  ← decide, credit, advance checkpoints
//!     ↕
//! Ledger (external)    ← the economy plugin / wallet service
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod evaluator;
mod ledger;
mod message;
mod permission;

pub use auth::{Authorization, NoPermissions};
pub use error::{LedgerError, RewardError};
pub use evaluator::{CreditedPlan, DueGrant, RewardEvaluator, RewardOutcome, RewardPlan};
pub use ledger::CurrencyLedger;
pub use message::{format_amount, render_template};
pub use permission::PermissionOverride;
