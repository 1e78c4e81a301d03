//! Typed contracts for the remote procedures this tool is allowed to call.
//!
//! Each procedure has a request struct whose serialized field names are the
//! procedure's parameter names, a response type, and the SQL that installs
//! it. [`ProcedureCall::new`] checks the serialized argument names against
//! the declared signature before anything is sent, so a renamed field fails
//! locally instead of reaching the store as an unknown-function error.

use std::collections::BTreeSet;

use schoolbase_core::{PlanTier, Profile, UsageTierAssignment};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ReconcileError;

/// A remote procedure with a fixed signature.
pub trait Procedure: Serialize {
    /// Name under which the store exposes the procedure.
    const NAME: &'static str;
    /// Declared parameter names, in declaration order.
    const ARGUMENTS: &'static [&'static str];
    /// `CREATE OR REPLACE FUNCTION` statement that installs it.
    const INSTALL_SQL: &'static str;

    type Response: DeserializeOwned + Serialize;

    /// Local checks run before the call is sent.
    fn validate(&self) -> Result<(), ReconcileError>;
}

/// Name, arguments and request body of a call ready to be sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureCall {
    pub name: &'static str,
    pub args: Value,
}

impl ProcedureCall {
    /// Validates `request` and serializes it into named arguments.
    pub fn new<P: Procedure>(request: &P) -> Result<Self, ReconcileError> {
        request.validate()?;
        let args = serde_json::to_value(request).map_err(|e| {
            ReconcileError::validation(format!("cannot encode {} arguments: {e}", P::NAME))
        })?;
        let Some(object) = args.as_object() else {
            return Err(ReconcileError::validation(format!(
                "{} arguments must encode to an object",
                P::NAME
            )));
        };
        let sent: BTreeSet<&str> = object.keys().map(String::as_str).collect();
        let declared: BTreeSet<&str> = P::ARGUMENTS.iter().copied().collect();
        if sent != declared {
            return Err(ReconcileError::validation(format!(
                "{} arguments {:?} do not match signature {:?}",
                P::NAME,
                sent,
                declared
            )));
        }
        Ok(Self {
            name: P::NAME,
            args,
        })
    }
}

/// Decodes a procedure's result into its declared response type.
pub fn decode_response<P: Procedure>(result: Value) -> Result<P::Response, ReconcileError> {
    serde_json::from_value(result).map_err(|e| {
        ReconcileError::verification(format!("{} returned an unexpected shape: {e}", P::NAME))
    })
}

/// Listing entry for a known procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcedureInfo {
    pub name: &'static str,
    pub arguments: &'static [&'static str],
    #[serde(skip)]
    pub install_sql: &'static str,
}

impl ProcedureInfo {
    const fn of<P: Procedure>() -> Self {
        Self {
            name: P::NAME,
            arguments: P::ARGUMENTS,
            install_sql: P::INSTALL_SQL,
        }
    }
}

/// Every procedure this tool may call.
pub const KNOWN_PROCEDURES: &[ProcedureInfo] = &[
    ProcedureInfo::of::<StartTrial>(),
    ProcedureInfo::of::<AssignUsageTier>(),
];

/// Installation script for every known procedure.
pub fn install_script() -> String {
    let mut script = String::from("-- schoolbase reconciliation procedures\nbegin;\n");
    for info in KNOWN_PROCEDURES {
        script.push('\n');
        script.push_str(info.install_sql.trim());
        script.push('\n');
    }
    script.push_str("\ncommit;\n");
    script
}

/// Starts a trial: sets the trial flag, window, tiers and seat status on the
/// profile and replaces the active usage tier assignment, in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTrial {
    pub p_user_id: Uuid,
    pub p_plan_tier: PlanTier,
    #[serde(with = "time::serde::rfc3339")]
    pub p_trial_started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub p_trial_ends_at: OffsetDateTime,
}

impl Procedure for StartTrial {
    const NAME: &'static str = "start_trial";
    const ARGUMENTS: &'static [&'static str] = &[
        "p_user_id",
        "p_plan_tier",
        "p_trial_started_at",
        "p_trial_ends_at",
    ];
    const INSTALL_SQL: &'static str = r#"
create or replace function public.start_trial(
    p_user_id uuid,
    p_plan_tier text,
    p_trial_started_at timestamptz,
    p_trial_ends_at timestamptz
)
returns public.profiles
language plpgsql
security definer
set search_path = public
as $$
declare
    v_profile public.profiles;
begin
    if p_trial_ends_at <= greatest(now(), p_trial_started_at) then
        raise exception 'trial end % must be after % and in the future', p_trial_ends_at, p_trial_started_at
            using errcode = '22023';
    end if;

    update public.profiles
       set is_trial = true,
           trial_started_at = p_trial_started_at,
           trial_ends_at = p_trial_ends_at,
           plan_tier = p_plan_tier,
           subscription_tier = p_plan_tier,
           seat_status = 'active'
     where id = p_user_id
    returning * into v_profile;

    if not found then
        raise exception 'profile % does not exist', p_user_id using errcode = 'P0002';
    end if;

    update public.usage_tier_assignments
       set is_active = false
     where user_id = p_user_id and is_active;

    insert into public.usage_tier_assignments (user_id, tier, activation_reason, is_active, expires_at)
    values (p_user_id, p_plan_tier, 'trial', true, p_trial_ends_at);

    return v_profile;
end;
$$;
"#;

    type Response = Profile;

    fn validate(&self) -> Result<(), ReconcileError> {
        if !self.p_plan_tier.is_paid() {
            return Err(ReconcileError::validation(format!(
                "a trial on tier {} grants nothing",
                self.p_plan_tier
            )));
        }
        if self.p_trial_ends_at <= self.p_trial_started_at {
            return Err(ReconcileError::validation(format!(
                "trial end {} is not after trial start {}",
                self.p_trial_ends_at, self.p_trial_started_at
            )));
        }
        Ok(())
    }
}

/// Sets the profile's subscription tier and makes a new usage tier
/// assignment the only active one, in one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignUsageTier {
    pub p_user_id: Uuid,
    pub p_tier: PlanTier,
    pub p_reason: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub p_expires_at: Option<OffsetDateTime>,
}

impl Procedure for AssignUsageTier {
    const NAME: &'static str = "assign_usage_tier";
    const ARGUMENTS: &'static [&'static str] = &["p_user_id", "p_tier", "p_reason", "p_expires_at"];
    const INSTALL_SQL: &'static str = r#"
create or replace function public.assign_usage_tier(
    p_user_id uuid,
    p_tier text,
    p_reason text,
    p_expires_at timestamptz default null
)
returns public.usage_tier_assignments
language plpgsql
security definer
set search_path = public
as $$
declare
    v_assignment public.usage_tier_assignments;
begin
    if p_expires_at is not null and p_expires_at <= now() then
        raise exception 'expiry % is not in the future', p_expires_at using errcode = '22023';
    end if;

    update public.profiles
       set subscription_tier = p_tier,
           plan_tier = p_tier
     where id = p_user_id;

    if not found then
        raise exception 'profile % does not exist', p_user_id using errcode = 'P0002';
    end if;

    update public.usage_tier_assignments
       set is_active = false
     where user_id = p_user_id and is_active;

    insert into public.usage_tier_assignments (user_id, tier, activation_reason, is_active, expires_at)
    values (p_user_id, p_tier, p_reason, true, p_expires_at)
    returning * into v_assignment;

    return v_assignment;
end;
$$;
"#;

    type Response = UsageTierAssignment;

    fn validate(&self) -> Result<(), ReconcileError> {
        if self.p_reason.trim().is_empty() {
            return Err(ReconcileError::validation(
                "an activation reason is required for a tier assignment",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn user() -> Uuid {
        Uuid::parse_str("7d1f9f8e-3c2a-4a57-9a8c-2f7f5b0c1e11").unwrap()
    }

    #[test]
    fn test_start_trial_call_matches_signature() {
        let request = StartTrial {
            p_user_id: user(),
            p_plan_tier: PlanTier::Premium,
            p_trial_started_at: datetime!(2026-03-01 09:00:00 UTC),
            p_trial_ends_at: datetime!(2026-03-08 09:00:00 UTC),
        };
        let call = ProcedureCall::new(&request).unwrap();
        assert_eq!(call.name, "start_trial");
        assert_eq!(
            call.args,
            json!({
                "p_user_id": "7d1f9f8e-3c2a-4a57-9a8c-2f7f5b0c1e11",
                "p_plan_tier": "premium",
                "p_trial_started_at": "2026-03-01T09:00:00Z",
                "p_trial_ends_at": "2026-03-08T09:00:00Z"
            })
        );
    }

    #[test]
    fn test_free_trial_is_rejected_locally() {
        let request = StartTrial {
            p_user_id: user(),
            p_plan_tier: PlanTier::Free,
            p_trial_started_at: datetime!(2026-03-01 09:00:00 UTC),
            p_trial_ends_at: datetime!(2026-03-08 09:00:00 UTC),
        };
        assert!(matches!(
            ProcedureCall::new(&request),
            Err(ReconcileError::Validation(_))
        ));
    }

    #[test]
    fn test_assign_tier_requires_reason() {
        let request = AssignUsageTier {
            p_user_id: user(),
            p_tier: PlanTier::ParentPlus,
            p_reason: "  ".into(),
            p_expires_at: None,
        };
        assert!(ProcedureCall::new(&request).is_err());

        let request = AssignUsageTier {
            p_reason: "billing ticket 4411".into(),
            ..request
        };
        let call = ProcedureCall::new(&request).unwrap();
        assert_eq!(call.args["p_expires_at"], Value::Null);
    }

    #[derive(Serialize)]
    struct Misnamed {
        p_user: Uuid,
    }

    impl Procedure for Misnamed {
        const NAME: &'static str = "misnamed";
        const ARGUMENTS: &'static [&'static str] = &["p_user_id"];
        const INSTALL_SQL: &'static str = "";
        type Response = Value;

        fn validate(&self) -> Result<(), ReconcileError> {
            Ok(())
        }
    }

    #[test]
    fn test_argument_name_drift_fails_before_sending() {
        let err = ProcedureCall::new(&Misnamed { p_user: user() }).unwrap_err();
        assert!(err.to_string().contains("do not match signature"));
    }

    #[test]
    fn test_install_sql_declares_every_argument() {
        for info in KNOWN_PROCEDURES {
            assert!(
                info.install_sql
                    .contains(&format!("function public.{}(", info.name)),
                "{} sql has wrong name",
                info.name
            );
            for arg in info.arguments {
                assert!(
                    info.install_sql.contains(&format!("{arg} ")),
                    "{} sql lacks {arg}",
                    info.name
                );
            }
        }
        let script = install_script();
        assert!(script.starts_with("-- schoolbase"));
        assert!(script.trim_end().ends_with("commit;"));
    }

    #[test]
    fn test_decode_response_reports_shape_errors() {
        let err = decode_response::<AssignUsageTier>(json!({"id": 1})).unwrap_err();
        assert!(matches!(err, ReconcileError::Verification(_)));
    }
}
