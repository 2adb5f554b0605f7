//! Cancellable background jobs driven by a [`TickScheduler`].

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{TickConfig, TickScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Stop,
}

/// A spawned loop that runs a job on every tick.
///
/// A run that has started always completes: [`cancel`](Self::cancel) stops
/// future runs and waits for the in-flight one, and [`pause`](Self::pause)
/// takes effect after it. Dropping the handle without cancelling also stops
/// the loop after the current run.
pub struct PeriodicTask {
    name: &'static str,
    control: watch::Sender<Control>,
    runs: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns `job` on the current runtime, ticking per `config`.
    ///
    /// `job` is called once per tick; the returned future is awaited before
    /// the scheduler waits for the next tick, so runs never overlap.
    pub fn spawn<F, Fut>(name: &'static str, config: TickConfig, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (control, mut commands) = watch::channel(Control::Run);
        let runs = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&runs);

        let handle = tokio::spawn(async move {
            let mut scheduler = TickScheduler::new(config);
            tracing::info!(task = name, period = ?scheduler.period(), "periodic task started");

            loop {
                tokio::select! {
                    biased;
                    changed = commands.changed() => {
                        // A closed channel means the handle was dropped.
                        let command = match changed {
                            Ok(()) => *commands.borrow_and_update(),
                            Err(_) => Control::Stop,
                        };
                        match command {
                            Control::Stop => break,
                            Control::Pause => scheduler.pause(),
                            Control::Run => scheduler.resume(),
                        }
                    }
                    info = scheduler.wait_for_tick() => {
                        tracing::debug!(task = name, tick = info.tick, "periodic task running");
                        job().await;
                        scheduler.job_finished();
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }

            tracing::info!(task = name, runs = scheduler.tick_count(), "periodic task stopped");
        });

        Self {
            name,
            control,
            runs,
            handle,
        }
    }

    /// The name given at spawn time.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Completed runs so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Stops ticking until [`resume`](Self::resume). A run in progress
    /// finishes first.
    pub fn pause(&self) {
        self.send(Control::Pause);
        tracing::info!(task = self.name, "periodic task paused");
    }

    /// Resumes ticking; the next run is one full period away.
    pub fn resume(&self) {
        self.send(Control::Run);
        tracing::info!(task = self.name, "periodic task resumed");
    }

    /// Whether the task is paused.
    pub fn is_paused(&self) -> bool {
        *self.control.borrow() == Control::Pause
    }

    fn send(&self, command: Control) {
        self.control.send_if_modified(|current| {
            let changed = *current != command && *current != Control::Stop;
            if changed {
                *current = command;
            }
            changed
        });
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops future runs and waits for an in-flight run to finish.
    pub async fn cancel(self) {
        self.send(Control::Stop);
        if let Err(e) = self.handle.await {
            tracing::error!(task = self.name, error = %e, "periodic task panicked");
        }
    }
}
