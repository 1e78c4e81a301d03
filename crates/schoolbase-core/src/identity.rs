use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::entitlement::EntitlementState;

/// Role of an identity within its organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Teacher,
    Parent,
    OrgAdmin,
    /// Any role string the application added after this tool was built.
    #[serde(other)]
    Other,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Learner => write!(f, "learner"),
            Role::Teacher => write!(f, "teacher"),
            Role::Parent => write!(f, "parent"),
            Role::OrgAdmin => write!(f, "org_admin"),
            Role::Other => write!(f, "other"),
        }
    }
}

/// Canonical user/profile identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub organization_id: Option<Uuid>,
}

impl IdentityRecord {
    /// First and last name joined, or `None` when neither is set.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// A full `profiles` row: identity columns plus entitlement columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(flatten)]
    pub identity: IdentityRecord,
    #[serde(flatten)]
    pub entitlement: EntitlementState,
}
