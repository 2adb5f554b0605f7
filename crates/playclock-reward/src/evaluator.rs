//! The reward checkpoint state machine.
//!
//! For each configured currency, a user's checkpoint is the value of
//! `total_active_secs` at which that currency was last granted (or first
//! seen). Per currency and evaluation:
//!
//! ```text
//! no checkpoint ──────────────→ checkpoint = total       (Initialized)
//! total - checkpoint < interval → nothing
//! amount <= 0 ─────────────────→ nothing changes         (Skipped)
//! credit ok ───────────────────→ checkpoint = total      (Granted)
//! credit err / timeout ────────→ checkpoint unchanged    (Failed)
//! ```
//!
//! A granted checkpoint moves to the total seen when the grant was planned,
//! not to `checkpoint + interval`: a user who has been away from the reward
//! tick for a long time gets one grant, not a burst.
//!
//! # Phases
//!
//! Ledger calls can be slow, so an evaluation against shared state runs in
//! three steps and the caller only holds the user's state for the first
//! and last:
//!
//! ```text
//! plan()   state locked   initialize checkpoints, pick due grants
//! credit() state free     call the ledger, each call under a timeout
//! commit() state locked   advance checkpoints that did not move meanwhile
//! ```
//!
//! [`RewardEvaluator::evaluate`] runs all three against a `&mut UserState`
//! the caller owns outright.

use std::sync::Arc;
use std::time::Duration;

use playclock_model::{CurrencyConfig, CurrencyId, UserId, UserState};

use crate::{Authorization, CurrencyLedger, RewardError};

/// What happened to one currency during an evaluation.
///
/// Currencies that were simply not due yet produce no outcome.
#[derive(Debug)]
pub enum RewardOutcome {
    /// First evaluation for this currency: the checkpoint was set to the
    /// current total and nothing was granted.
    Initialized {
        /// The currency.
        currency: CurrencyId,
        /// The new checkpoint.
        checkpoint: u64,
    },

    /// The ledger credited the user and the checkpoint advanced.
    Granted {
        /// The currency.
        currency: CurrencyId,
        /// Amount credited.
        amount: f64,
    },

    /// The reward was due but the credit failed. Retried next evaluation.
    Failed {
        /// The currency.
        currency: CurrencyId,
        /// Amount that was attempted.
        amount: f64,
        /// Why it failed.
        error: RewardError,
    },

    /// The reward was due but the resolved amount was not positive.
    Skipped {
        /// The currency.
        currency: CurrencyId,
    },
}

impl RewardOutcome {
    /// The currency this outcome is about.
    pub fn currency(&self) -> &CurrencyId {
        match self {
            Self::Initialized { currency, .. }
            | Self::Granted { currency, .. }
            | Self::Failed { currency, .. }
            | Self::Skipped { currency } => currency,
        }
    }

    /// `Some(amount)` if this outcome is a grant.
    pub fn granted_amount(&self) -> Option<f64> {
        match self {
            Self::Granted { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

/// A grant found due while planning.
#[derive(Debug, Clone, PartialEq)]
pub struct DueGrant {
    /// The currency.
    pub currency: CurrencyId,
    /// Amount to credit.
    pub amount: f64,
    /// Checkpoint at planning time.
    pub checkpoint: u64,
    /// Total active seconds at planning time; the checkpoint on success.
    pub total: u64,
}

#[derive(Debug)]
enum PlanStep {
    Settled(RewardOutcome),
    Due(DueGrant),
}

#[derive(Debug)]
enum CreditStep {
    Settled(RewardOutcome),
    Credited(DueGrant, Result<(), RewardError>),
}

/// Output of [`RewardEvaluator::plan`], in currency order.
#[derive(Debug)]
pub struct RewardPlan {
    user: UserId,
    steps: Vec<PlanStep>,
}

impl RewardPlan {
    /// The user this plan is for.
    pub fn user(&self) -> UserId {
        self.user
    }

    /// Grants waiting for the ledger.
    pub fn due(&self) -> impl Iterator<Item = &DueGrant> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::Due(grant) => Some(grant),
            PlanStep::Settled(_) => None,
        })
    }
}

/// Output of [`RewardEvaluator::credit`], ready to commit.
#[derive(Debug)]
pub struct CreditedPlan {
    user: UserId,
    steps: Vec<CreditStep>,
}

impl CreditedPlan {
    /// The user this plan is for.
    pub fn user(&self) -> UserId {
        self.user
    }
}

/// Decides and credits rewards for one user at a time.
///
/// Cheap to build: the service constructs one per reward tick from the
/// current settings, sharing the ledger and authorization handles.
pub struct RewardEvaluator<L: CurrencyLedger> {
    ledger: Arc<L>,
    auth: Arc<dyn Authorization>,
    namespace: String,
    credit_timeout: Duration,
}

impl<L: CurrencyLedger> RewardEvaluator<L> {
    /// Creates an evaluator.
    ///
    /// `namespace` is the first segment of override permission nodes;
    /// `credit_timeout` bounds every ledger call.
    pub fn new(
        ledger: Arc<L>,
        auth: Arc<dyn Authorization>,
        namespace: impl Into<String>,
        credit_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            auth,
            namespace: namespace.into(),
            credit_timeout,
        }
    }

    /// The amount `user` receives per grant of `config`'s currency: the
    /// larger of the configured default and every valid override.
    pub fn reward_amount(&self, user: UserId, config: &CurrencyConfig) -> f64 {
        self.auth
            .effective_overrides(user, config.id.as_str(), &self.namespace)
            .into_iter()
            .fold(config.default_amount, f64::max)
    }

    /// Plans, credits and commits in one go against state the caller owns
    /// exclusively for the whole call. Grants at most once per currency.
    pub async fn evaluate(
        &self,
        user: UserId,
        state: &mut UserState,
        currencies: &[CurrencyConfig],
    ) -> Vec<RewardOutcome> {
        let plan = self.plan(user, state, currencies);
        let credited = self.credit(plan).await;
        self.commit(state, credited)
    }

    /// Initializes missing checkpoints and decides which grants are due.
    /// Touches no ledger.
    pub fn plan(&self, user: UserId, state: &mut UserState, currencies: &[CurrencyConfig]) -> RewardPlan {
        let steps = currencies
            .iter()
            .filter_map(|config| self.plan_one(user, state, config))
            .collect();
        RewardPlan { user, steps }
    }

    fn plan_one(&self, user: UserId, state: &mut UserState, config: &CurrencyConfig) -> Option<PlanStep> {
        let currency = &config.id;
        let total = state.total_active_secs;

        let Some(checkpoint) = state.checkpoint(currency.as_str()) else {
            state.mark_checkpoint(currency);
            tracing::debug!(%user, %currency, checkpoint = total, "reward checkpoint initialized");
            return Some(PlanStep::Settled(RewardOutcome::Initialized {
                currency: currency.clone(),
                checkpoint: total,
            }));
        };

        if total.saturating_sub(checkpoint) < config.reward_interval_secs {
            return None;
        }

        let amount = self.reward_amount(user, config);
        if amount <= 0.0 {
            tracing::debug!(%user, %currency, amount, "reward due but amount is not positive");
            return Some(PlanStep::Settled(RewardOutcome::Skipped {
                currency: currency.clone(),
            }));
        }

        Some(PlanStep::Due(DueGrant {
            currency: currency.clone(),
            amount,
            checkpoint,
            total,
        }))
    }

    /// Calls the ledger for every due grant of `plan`, one after another.
    pub async fn credit(&self, plan: RewardPlan) -> CreditedPlan {
        let user = plan.user;
        let mut steps = Vec::with_capacity(plan.steps.len());
        for step in plan.steps {
            steps.push(match step {
                PlanStep::Settled(outcome) => CreditStep::Settled(outcome),
                PlanStep::Due(grant) => {
                    let result = self.credit_one(user, &grant.currency, grant.amount).await;
                    CreditStep::Credited(grant, result)
                }
            });
        }
        CreditedPlan { user, steps }
    }

    /// Applies credit results to `state`. A successful grant advances its
    /// checkpoint only if it still holds the value seen while planning.
    pub fn commit(&self, state: &mut UserState, credited: CreditedPlan) -> Vec<RewardOutcome> {
        let user = credited.user;
        credited
            .steps
            .into_iter()
            .map(|step| match step {
                CreditStep::Settled(outcome) => outcome,
                CreditStep::Credited(grant, Ok(())) => {
                    let DueGrant {
                        currency,
                        amount,
                        checkpoint,
                        total,
                    } = grant;
                    if state.advance_checkpoint(&currency, checkpoint, total) {
                        tracing::info!(%user, %currency, amount, "reward granted");
                    } else {
                        tracing::warn!(
                            %user,
                            %currency,
                            amount,
                            expected = checkpoint,
                            found = ?state.checkpoint(currency.as_str()),
                            "reward granted but checkpoint moved during credit, left as found"
                        );
                    }
                    RewardOutcome::Granted { currency, amount }
                }
                CreditStep::Credited(grant, Err(error)) => {
                    tracing::warn!(
                        %user,
                        currency = %grant.currency,
                        amount = grant.amount,
                        error = %error,
                        "reward credit failed, will retry"
                    );
                    RewardOutcome::Failed {
                        currency: grant.currency,
                        amount: grant.amount,
                        error,
                    }
                }
            })
            .collect()
    }

    async fn credit_one(&self, user: UserId, currency: &CurrencyId, amount: f64) -> Result<(), RewardError> {
        match tokio::time::timeout(self.credit_timeout, self.ledger.credit(user, currency, amount)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(RewardError::Ledger {
                currency: currency.clone(),
                source,
            }),
            Err(_elapsed) => Err(RewardError::Timeout {
                currency: currency.clone(),
                after: self.credit_timeout,
            }),
        }
    }
}
