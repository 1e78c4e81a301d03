pub mod entitlement;
pub mod error;
pub mod identity;
pub mod names;
pub mod registration;
pub mod tier;

pub use entitlement::{EntitlementState, PlanTier, SeatStatus, TrialWindow, MAX_TRIAL_DAYS};
pub use error::{CoreError, Result};
pub use identity::{IdentityRecord, Profile, Role};
pub use names::{PersonName, split_full_name};
pub use registration::RegistrationRecord;
pub use tier::UsageTierAssignment;

/// Table holding identity records and their entitlement columns.
pub const PROFILES_TABLE: &str = "profiles";
/// Table holding enrolled student records.
pub const STUDENTS_TABLE: &str = "students";
/// Table holding usage tier assignments.
pub const USAGE_TIERS_TABLE: &str = "usage_tier_assignments";
/// Registration table in the origin store.
pub const REGISTRATIONS_TABLE: &str = "registrations";
