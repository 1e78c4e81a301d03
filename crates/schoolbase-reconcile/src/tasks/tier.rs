use async_trait::async_trait;
use schoolbase_core::{PROFILES_TABLE, PlanTier, USAGE_TIERS_TABLE, UsageTierAssignment};
use schoolbase_storage::{Filter, Row};
use time::OffsetDateTime;

use super::{Target, decode_profile, decode_row};
use crate::error::ReconcileError;
use crate::procedures::{AssignUsageTier, ProcedureCall};
use crate::recipe::{Mutation, MutationOutcome, Plan, Reconciliation};
use crate::runner::{Runner, target_id};

/// Moves a profile to a subscription tier through `assign_usage_tier`,
/// leaving exactly one active usage tier assignment.
#[derive(Debug, Clone)]
pub struct SetTier {
    pub target: Target,
    pub tier: PlanTier,
    pub reason: String,
    pub expires_at: Option<OffsetDateTime>,
}

#[async_trait]
impl Reconciliation for SetTier {
    fn name(&self) -> &'static str {
        "set-tier"
    }

    fn table(&self) -> &str {
        PROFILES_TABLE
    }

    fn target(&self) -> Filter {
        self.target.filter()
    }

    fn plan(&self, before: &Row) -> Result<Plan, ReconcileError> {
        let profile = decode_profile(before)?;
        let request = AssignUsageTier {
            p_user_id: profile.identity.id,
            p_tier: self.tier,
            p_reason: self.reason.trim().to_string(),
            p_expires_at: self.expires_at,
        };
        let mut plan = Plan::new(Mutation::Procedure(ProcedureCall::new(&request)?));
        if profile.entitlement.subscription_tier == Some(self.tier) {
            plan = plan.warn(format!(
                "profile is already on tier {}; the assignment will be replaced",
                self.tier
            ));
        }
        if profile.entitlement.is_trial {
            plan = plan.warn("profile is on a trial; its trial flag is left as it is");
        }
        Ok(plan)
    }

    async fn verify(
        &self,
        runner: &Runner<'_>,
        _before: &Row,
        after: &Row,
        _outcome: &MutationOutcome,
    ) -> Result<(), ReconcileError> {
        let state = decode_profile(after)?.entitlement;
        if state.subscription_tier != Some(self.tier) {
            return Err(ReconcileError::verification(format!(
                "subscription tier is {:?}, expected {}",
                state.subscription_tier.map(|t| t.as_str()),
                self.tier
            )));
        }

        let user_id = target_id(PROFILES_TABLE, after)?;
        let active = runner
            .fetch_all(
                USAGE_TIERS_TABLE,
                &Filter::new().eq("user_id", user_id).eq("is_active", true),
            )
            .await?;
        let [row] = active.as_slice() else {
            return Err(ReconcileError::verification(format!(
                "expected one active usage tier assignment, found {}",
                active.len()
            )));
        };
        let assignment: UsageTierAssignment = decode_row("usage tier assignment", row)?;
        if assignment.tier != self.tier {
            return Err(ReconcileError::verification(format!(
                "active assignment is on tier {}, expected {}",
                assignment.tier, self.tier
            )));
        }
        Ok(())
    }
}
