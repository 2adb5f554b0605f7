//! Player state storage for Playclock.
//!
//! Two concerns live here:
//!
//! 1. **In-memory working set** ([`PlayerStore`]): the authoritative
//!    [`UserState`](playclock_model::UserState) of every known user, with
//!    per-user locking for the hot path and a full-store lock for coarse
//!    snapshot operations.
//! 2. **Durable storage** ([`Persistence`] trait): where snapshots go
//!    between restarts. [`JsonFileStore`] writes a single document on disk;
//!    [`MemoryStore`] keeps everything in-process for tests and demos.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session / Reward layers (above)  ← mutate one user at a time
//!     ↕
//! Store (this crate)               ← owns every UserState
//!     ↕
//! Persistence (below)              ← load at startup, save on timer / shutdown
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod json_file;
mod memory;
mod persistence;
mod store;

pub use error::StoreError;
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use persistence::Persistence;
pub use store::{PlayerStore, UserEntry, UserGuard};
