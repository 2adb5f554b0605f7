//! Shared data model for Playclock.
//!
//! This crate defines the vocabulary every other layer speaks:
//!
//! - **Identities** ([`UserId`], [`CurrencyId`]): who earns, and what
//!   they earn.
//! - **State** ([`UserState`]): a user's accumulated active time and
//!   per-currency reward checkpoints.
//! - **Currencies** ([`CurrencyConfig`]): how often and how much each
//!   currency pays out.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how persisted documents
//!   are turned into bytes and back.
//!
//! # Architecture
//!
//! The model has no knowledge of sessions, schedulers, or ledgers. Higher
//! layers mutate [`UserState`] through their own contracts; this crate only
//! guarantees that the arithmetic on it never underflows.
//!
//! ```text
//! Session (accrual) ─┐
//!                    ├─→ Model (UserState) ←─ Store (persistence)
//! Reward (grants) ───┘
//! ```

mod codec;
mod currency;
mod error;
mod ids;
mod state;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use currency::CurrencyConfig;
pub use error::ModelError;
pub use ids::{CurrencyId, UserId};
pub use state::UserState;
