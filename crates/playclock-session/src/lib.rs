//! Playtime accrual for Playclock.
//!
//! This crate turns the host's session signals into active seconds:
//!
//! 1. **Clock**: where "now" comes from ([`Clock`] trait,
//!    [`SystemClock`] for production, [`ManualClock`] for tests)
//! 2. **Idle status**: whether a user is away ([`IdleProvider`] trait,
//!    [`NoIdleProvider`] when the host has no such concept)
//! 3. **Accrual**: folding connected, non-idle segments into each user's
//!    [`UserState`](playclock_model::UserState) ([`TimeAccumulator`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Host events (connect / disconnect / idle)  ← the game server
//!     ↕
//! Session layer (this crate)                 ← open / fold / close segments
//!     ↕
//! Store layer (below)                        ← total & period seconds
//! ```

mod accumulator;
mod clock;
mod idle;

pub use accumulator::TimeAccumulator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use idle::{IdleProvider, NoIdleProvider};
