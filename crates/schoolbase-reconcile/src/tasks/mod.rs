//! Concrete reconciliations, one per kind of repair operators run.

mod dedupe;
mod names;
mod patch;
mod tier;
mod trial;

pub use dedupe::RemoveDuplicates;
pub use names::{BackfillName, NameSource};
pub use patch::PatchFields;
pub use tier::SetTier;
pub use trial::StartTrialRun;

use std::fmt;

use schoolbase_core::Profile;
use schoolbase_storage::{Filter, Row, filter_text};
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::ReconcileError;

/// How the operator names the target row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(String),
    Email(String),
}

impl Target {
    pub fn filter(&self) -> Filter {
        match self {
            Target::Id(id) => Filter::new().eq("id", id.as_str()),
            Target::Email(email) => Filter::new().eq("email", email.trim()),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Id(id) => write!(f, "id {id}"),
            Target::Email(email) => write!(f, "email {email}"),
        }
    }
}

/// Decodes a fetched row into a typed record.
pub(crate) fn decode_row<T: DeserializeOwned>(what: &str, row: &Row) -> Result<T, ReconcileError> {
    serde_json::from_value(Value::Object(row.clone()))
        .map_err(|e| ReconcileError::validation(format!("cannot read {what} row: {e}")))
}

pub(crate) fn decode_profile(row: &Row) -> Result<Profile, ReconcileError> {
    decode_row("profile", row)
}

/// Whether a value read back from the store agrees with the value written.
///
/// Timestamps are compared as instants, since the store normalizes offsets
/// and precision when it echoes them back. A number or boolean written to a
/// text column (or the reverse) agrees when its text form matches, the same
/// rule the store applies to filter values.
pub(crate) fn values_agree(written: &Value, stored: &Value) -> bool {
    if written == stored {
        return true;
    }
    match (written, stored) {
        (Value::String(a), Value::String(b)) => match (
            OffsetDateTime::parse(a, &Rfc3339),
            OffsetDateTime::parse(b, &Rfc3339),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        },
        (Value::String(_), Value::Number(_) | Value::Bool(_))
        | (Value::Number(_) | Value::Bool(_), Value::String(_)) => {
            filter_text(written) == filter_text(stored)
        }
        _ => false,
    }
}

/// Columns of `after` that do not hold the values in `fields`.
pub(crate) fn unapplied_fields(fields: &Row, after: &Row) -> Vec<String> {
    fields
        .iter()
        .filter(|(column, value)| {
            !values_agree(value, after.get(column.as_str()).unwrap_or(&Value::Null))
        })
        .map(|(column, _)| column.clone())
        .collect()
}
