use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entitlement::PlanTier;

/// Row binding a user to a feature tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTierAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: PlanTier,
    #[serde(default)]
    pub activation_reason: Option<String>,
    pub is_active: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl UsageTierAssignment {
    pub fn is_current_at(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.expires_at.is_none_or(|expires_at| expires_at > now)
    }
}
