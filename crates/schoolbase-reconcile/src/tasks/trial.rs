use async_trait::async_trait;
use schoolbase_core::{PROFILES_TABLE, PlanTier, SeatStatus, TrialWindow};
use schoolbase_storage::{Filter, Row};
use time::{Duration, OffsetDateTime};

use super::{Target, decode_profile};
use crate::error::ReconcileError;
use crate::procedures::{ProcedureCall, StartTrial, decode_response};
use crate::recipe::{Mutation, MutationOutcome, Plan, Reconciliation};
use crate::runner::Runner;

/// Timestamps read back may lose sub-second precision.
const STORE_GRANULARITY: Duration = Duration::seconds(1);

/// Starts a paid trial on one profile through the `start_trial` procedure.
///
/// The window is `issued_at + days`; `issued_at` is taken once by the caller
/// so the sent end date and the verified end date are the same instant.
#[derive(Debug, Clone)]
pub struct StartTrialRun {
    pub target: Target,
    pub tier: PlanTier,
    pub days: i64,
    pub issued_at: OffsetDateTime,
}

impl StartTrialRun {
    pub fn window(&self) -> Result<TrialWindow, ReconcileError> {
        Ok(TrialWindow::starting_at(self.issued_at, self.days)?)
    }
}

#[async_trait]
impl Reconciliation for StartTrialRun {
    fn name(&self) -> &'static str {
        "start-trial"
    }

    fn table(&self) -> &str {
        PROFILES_TABLE
    }

    fn target(&self) -> Filter {
        self.target.filter()
    }

    fn plan(&self, before: &Row) -> Result<Plan, ReconcileError> {
        let profile = decode_profile(before)?;
        let window = self.window()?;
        let request = StartTrial {
            p_user_id: profile.identity.id,
            p_plan_tier: self.tier,
            p_trial_started_at: window.starts_at,
            p_trial_ends_at: window.ends_at,
        };
        let mut plan = Plan::new(Mutation::Procedure(ProcedureCall::new(&request)?));

        let current = &profile.entitlement;
        if current.trial_active_at(self.issued_at) {
            if let Some(ends) = current.trial_ends_at {
                plan = plan.warn(format!(
                    "profile already has a trial running until {ends}; it will be replaced"
                ));
            }
        } else if current.subscription_tier.is_some_and(|t| t.is_paid()) && !current.is_trial {
            plan = plan.warn("profile already holds a paid subscription tier");
        }
        Ok(plan)
    }

    async fn verify(
        &self,
        _runner: &Runner<'_>,
        _before: &Row,
        after: &Row,
        outcome: &MutationOutcome,
    ) -> Result<(), ReconcileError> {
        if let MutationOutcome::Procedure(result) = outcome {
            decode_response::<StartTrial>(result.clone())?;
        }

        let window = self.window()?;
        let state = decode_profile(after)?.entitlement;
        if !state.is_trial {
            return Err(ReconcileError::verification("profile is not flagged as a trial"));
        }
        if state.subscription_tier != Some(self.tier) {
            return Err(ReconcileError::verification(format!(
                "subscription tier is {:?}, expected {}",
                state.subscription_tier.map(|t| t.as_str()),
                self.tier
            )));
        }
        match state.trial_ends_at {
            Some(ends) if (ends - window.ends_at).abs() <= STORE_GRANULARITY => {}
            other => {
                return Err(ReconcileError::verification(format!(
                    "trial end is {other:?}, expected {}",
                    window.ends_at
                )));
            }
        }
        if state.seat_status != Some(SeatStatus::Active) {
            return Err(ReconcileError::verification("seat is not active"));
        }
        state
            .validate(self.issued_at)
            .map_err(|e| ReconcileError::verification(e.to_string()))
    }
}
