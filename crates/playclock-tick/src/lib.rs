//! Periodic scheduling for Playclock.
//!
//! Two layers:
//!
//! - [`TickScheduler`]: a period timer with overrun handling, budget
//!   monitoring, and pause/resume. Sits inside a `tokio::select!` loop.
//! - [`PeriodicTask`]: a spawned loop around a scheduler that runs an
//!   async job on every tick until it is cancelled.
//!
//! # Disabled mode
//!
//! A config without a period (or with a zero period) never fires:
//! [`TickScheduler::wait_for_tick`] pends forever. Hosts use this to turn a
//! background job off without special-casing the wiring.
//!
//! ```ignore
//! let task = PeriodicTask::spawn("persist", TickConfig::every(Duration::from_secs(600)), move || {
//!     let service = Arc::clone(&service);
//!     async move { service.run_persist_tick().await; }
//! });
//! // ...
//! task.cancel().await;
//! ```

mod scheduler;
mod task;

pub use scheduler::{JobBudget, TickConfig, TickInfo, TickMetrics, TickPolicy, TickScheduler};
pub use task::PeriodicTask;
