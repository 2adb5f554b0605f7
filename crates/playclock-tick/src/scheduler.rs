//! Period timer for background jobs, with late-tick handling and a job-time
//! budget.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// What to do when a tick fires late because the previous job ran long or
/// the runtime was starved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Forget the missed ticks and schedule the next one a full period from
    /// the late fire. Jobs never run back to back.
    #[default]
    Skip,
    /// Keep the cadence anchored at startup. The next tick is due one period
    /// after the missed deadline, possibly right away.
    Drop,
}

/// Fractions of the period a single job may use before warnings are logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobBudget {
    /// Warn when a job uses at least this share of the period. Default 0.8.
    pub warn_at: f64,
    /// Log a critical warning at or above this share. Default 1.0.
    pub critical_at: f64,
}

impl Default for JobBudget {
    fn default() -> Self {
        Self {
            warn_at: 0.8,
            critical_at: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BudgetLevel {
    Within,
    Warn,
    Critical,
}

impl JobBudget {
    /// Both fractions in `0.0..=1.0`, with `warn_at <= critical_at`.
    fn clamped(self) -> Self {
        let critical_at = self.critical_at.clamp(0.0, 1.0);
        Self {
            warn_at: self.warn_at.clamp(0.0, 1.0).min(critical_at),
            critical_at,
        }
    }

    fn level(&self, utilization: f64) -> BudgetLevel {
        if utilization >= self.critical_at {
            BudgetLevel::Critical
        } else if utilization >= self.warn_at {
            BudgetLevel::Warn
        } else {
            BudgetLevel::Within
        }
    }
}

/// Configuration for a [`TickScheduler`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. `None` never ticks.
    pub period: Option<Duration>,
    /// Late-tick handling.
    pub policy: TickPolicy,
    /// Job-time warning thresholds.
    pub budget: JobBudget,
    /// Track average and longest job time.
    pub metrics_enabled: bool,
    /// Upper bound of a random delay added to the first tick, so tasks
    /// started together drift apart.
    pub initial_jitter: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: None,
            policy: TickPolicy::default(),
            budget: JobBudget::default(),
            metrics_enabled: true,
            initial_jitter: Duration::from_millis(250),
        }
    }
}

impl TickConfig {
    /// Ticks every `period`, everything else default.
    pub fn every(period: Duration) -> Self {
        Self {
            period: Some(period),
            ..Self::default()
        }
    }

    /// Never ticks.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Normalizes out-of-range values: a zero period disables the
    /// scheduler and the budget is clamped. [`TickScheduler::new`] calls
    /// this itself.
    pub fn validated(mut self) -> Self {
        if self.period == Some(Duration::ZERO) {
            warn!("zero tick period, scheduler disabled");
            self.period = None;
        }
        self.budget = self.budget.clamped();
        self
    }

    fn first_deadline(&self, now: TokioInstant) -> Option<TokioInstant> {
        let period = self.period?;
        let max = u64::try_from(self.initial_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if max == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..max))
        };
        Some(now + period + jitter)
    }
}

/// A fired tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Sequence number, starting at 1.
    pub tick: u64,
    /// The configured period.
    pub period: Duration,
    /// Fired more than a tenth of a period after its deadline.
    pub overrun: bool,
    /// Whole periods skipped. Always zero under [`TickPolicy::Drop`].
    pub ticks_skipped: u64,
}

/// Counters and job timings of one scheduler.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    /// Ticks fired.
    pub ticks: u64,
    /// Ticks that fired late.
    pub overruns: u64,
    /// Periods skipped under [`TickPolicy::Skip`].
    pub skipped: u64,
    /// Moving average of job time (weight 0.1 for the newest job).
    pub avg_job_time: Duration,
    /// Longest job seen.
    pub max_job_time: Duration,
    /// Last job time divided by the period.
    pub last_utilization: f64,
}

impl TickMetrics {
    fn record_job(&mut self, elapsed: Duration) {
        const WEIGHT: f64 = 0.1;
        self.max_job_time = self.max_job_time.max(elapsed);
        let avg = self.avg_job_time.as_secs_f64() * (1.0 - WEIGHT) + elapsed.as_secs_f64() * WEIGHT;
        self.avg_job_time = Duration::from_secs_f64(avg);
    }
}

/// Drives one background job on a fixed period.
///
/// Meant to sit in a `tokio::select!` loop: [`wait_for_tick`](Self::wait_for_tick)
/// resolves when the job is due, [`job_finished`](Self::job_finished) reports
/// how long it took.
pub struct TickScheduler {
    config: TickConfig,
    deadline: Option<TokioInstant>,
    job_started: Option<Instant>,
    paused: bool,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// The first tick is due one period (plus jitter) from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let deadline = config.first_deadline(TokioInstant::now());
        match config.period {
            Some(period) => debug!(period = ?period, policy = ?config.policy, "tick scheduler ready"),
            None => debug!("tick scheduler disabled"),
        }
        Self {
            config,
            deadline,
            job_started: None,
            paused: false,
            metrics: TickMetrics::default(),
        }
    }

    /// Resolves when the next tick is due. Pends forever while disabled or
    /// paused.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let (due, period) = match (self.deadline, self.config.period) {
            (Some(due), Some(period)) if !self.paused => (due, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(due).await;
        let fired = TokioInstant::now();
        self.job_started = Some(Instant::now());
        self.metrics.ticks += 1;

        let late_by = fired.saturating_duration_since(due);
        let overrun = late_by > period / 10;
        let ticks_skipped = self.reschedule(due, fired, period, overrun, late_by);

        if overrun {
            self.metrics.overruns += 1;
        }
        self.metrics.skipped += ticks_skipped;
        trace!(tick = self.metrics.ticks, overrun, "tick");

        TickInfo {
            tick: self.metrics.ticks,
            period,
            overrun,
            ticks_skipped,
        }
    }

    /// Sets the next deadline per policy. Returns the periods skipped.
    fn reschedule(
        &mut self,
        due: TokioInstant,
        fired: TokioInstant,
        period: Duration,
        overrun: bool,
        late_by: Duration,
    ) -> u64 {
        let tick = self.metrics.ticks;
        match self.config.policy {
            TickPolicy::Skip => {
                self.deadline = Some(fired + period);
                if !overrun {
                    return 0;
                }
                let skipped = u64::try_from(late_by.as_nanos() / period.as_nanos()).unwrap_or(u64::MAX);
                if skipped > 0 {
                    warn!(tick, skipped, late = ?late_by, "tick late, skipping missed periods");
                }
                skipped
            }
            TickPolicy::Drop => {
                self.deadline = Some(due + period);
                if overrun {
                    warn!(tick, late = ?late_by, "tick late, cadence kept");
                }
                0
            }
        }
    }

    /// Reports that the job started by the last tick has returned. Feeds
    /// the budget warnings and job-time metrics; a call without a
    /// preceding tick does nothing.
    pub fn job_finished(&mut self) {
        let Some(started) = self.job_started.take() else {
            return;
        };
        let elapsed = started.elapsed();

        if let Some(period) = self.config.period {
            let utilization = elapsed.as_secs_f64() / period.as_secs_f64();
            self.metrics.last_utilization = utilization;
            let tick = self.metrics.ticks;
            match self.config.budget.level(utilization) {
                BudgetLevel::Critical => {
                    warn!(tick, job = ?elapsed, period = ?period, "job took longer than its period")
                }
                BudgetLevel::Warn => {
                    warn!(tick, job = ?elapsed, period = ?period, "job is close to its period")
                }
                BudgetLevel::Within => {}
            }
        }

        if self.config.metrics_enabled {
            self.metrics.record_job(elapsed);
        }
    }

    /// Stops ticking until [`resume`](Self::resume).
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.metrics.ticks, "tick scheduler paused");
        }
    }

    /// Restarts ticking one full period from now; a long pause never
    /// produces a burst.
    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.deadline = self.config.period.map(|period| TokioInstant::now() + period);
        debug!(tick = self.metrics.ticks, "tick scheduler resumed");
    }

    /// Paused right now.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Has no period and never fires.
    pub fn is_disabled(&self) -> bool {
        self.config.period.is_none()
    }

    /// Ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.metrics.ticks
    }

    /// Counters and timings.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    /// The period, `None` when disabled.
    pub fn period(&self) -> Option<Duration> {
        self.config.period
    }
}
