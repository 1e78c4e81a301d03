//! Trial and subscription state attached to an identity record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

use crate::error::{CoreError, Result};

/// Longest trial an operator may start in one run.
pub const MAX_TRIAL_DAYS: i64 = 90;

/// Plan tiers known to the billing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Premium,
    ParentPlus,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Free, PlanTier::Premium, PlanTier::ParentPlus];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
            PlanTier::ParentPlus => "parent_plus",
        }
    }

    /// Whether a trial can be started on this tier.
    pub fn is_paid(&self) -> bool {
        !matches!(self, PlanTier::Free)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "free" => Ok(PlanTier::Free),
            "premium" => Ok(PlanTier::Premium),
            "parent_plus" | "parent-plus" => Ok(PlanTier::ParentPlus),
            other => Err(CoreError::UnknownTier(other.to_string())),
        }
    }
}

/// Seat status of an identity inside its organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Active,
    #[default]
    Inactive,
    Pending,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Active => "active",
            SeatStatus::Inactive => "inactive",
            SeatStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SeatStatus::Active),
            "inactive" => Ok(SeatStatus::Inactive),
            "pending" => Ok(SeatStatus::Pending),
            other => Err(CoreError::UnknownSeatStatus(other.to_string())),
        }
    }
}

/// Entitlement columns stored on a profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntitlementState {
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub trial_started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub plan_tier: Option<PlanTier>,
    #[serde(default)]
    pub seat_status: Option<SeatStatus>,
    #[serde(default)]
    pub subscription_tier: Option<PlanTier>,
}

impl EntitlementState {
    /// Checks that an active trial has an expiry later than `now`.
    pub fn validate(&self, now: OffsetDateTime) -> Result<()> {
        if !self.is_trial {
            return Ok(());
        }
        match self.trial_ends_at {
            None => Err(CoreError::entitlement(
                "is_trial is set but trial_ends_at is null",
            )),
            Some(ends_at) if ends_at <= now => Err(CoreError::entitlement(format!(
                "is_trial is set but trial_ends_at {ends_at} is not in the future"
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Returns `true` when the trial is set and has not yet expired.
    pub fn trial_active_at(&self, now: OffsetDateTime) -> bool {
        self.is_trial && self.trial_ends_at.is_some_and(|ends_at| ends_at > now)
    }
}

/// Start and end of a trial computed from the moment it was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialWindow {
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
}

impl TrialWindow {
    /// Builds a window of `days` whole days beginning at `issued_at`.
    pub fn starting_at(issued_at: OffsetDateTime, days: i64) -> Result<Self> {
        if !(1..=MAX_TRIAL_DAYS).contains(&days) {
            return Err(CoreError::invalid_value(
                "trial_days",
                format!("must be between 1 and {MAX_TRIAL_DAYS}, got {days}"),
            ));
        }
        Ok(Self {
            starts_at: issued_at,
            ends_at: issued_at + Duration::days(days),
        })
    }

    pub fn length(&self) -> Duration {
        self.ends_at - self.starts_at
    }
}
