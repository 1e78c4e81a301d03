use async_trait::async_trait;
use schoolbase_core::{PersonName, split_full_name};
use schoolbase_storage::{Filter, Row};
use serde_json::Value;

use super::unapplied_fields;
use crate::error::ReconcileError;
use crate::recipe::{Mutation, MutationOutcome, Plan, Reconciliation};
use crate::runner::Runner;

/// Where the full name to split comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
    /// A name given by the operator, or read from another store beforehand.
    Explicit(String),
    /// A column of the target row itself, e.g. `full_name`.
    Column(String),
}

/// Fills `first_name` and `last_name` by splitting a full name on its first
/// whitespace run.
#[derive(Debug, Clone)]
pub struct BackfillName {
    pub table: String,
    pub target: Filter,
    pub source: NameSource,
    /// Replace names that are already set to something else.
    pub overwrite: bool,
}

impl BackfillName {
    fn full_name<'a>(&'a self, before: &'a Row) -> Result<&'a str, ReconcileError> {
        match &self.source {
            NameSource::Explicit(name) => Ok(name),
            NameSource::Column(column) => match before.get(column) {
                Some(Value::String(name)) => Ok(name),
                Some(Value::Null) | None => Err(ReconcileError::validation(format!(
                    "column {column} is empty on the target row"
                ))),
                Some(other) => Err(ReconcileError::validation(format!(
                    "column {column} holds {other}, not a name"
                ))),
            },
        }
    }
}

fn name_fields(name: &PersonName) -> Row {
    let mut fields = Row::new();
    fields.insert("first_name".into(), Value::from(name.first_name.as_str()));
    fields.insert("last_name".into(), Value::from(name.last_name.as_str()));
    fields
}

fn current(before: &Row, column: &str) -> Option<String> {
    before
        .get(column)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl Reconciliation for BackfillName {
    fn name(&self) -> &'static str {
        "backfill-name"
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn target(&self) -> Filter {
        self.target.clone()
    }

    fn plan(&self, before: &Row) -> Result<Plan, ReconcileError> {
        let name = split_full_name(self.full_name(before)?)?;
        let fields = name_fields(&name);

        let existing = (current(before, "first_name"), current(before, "last_name"));
        let mut plan = Plan::new(Mutation::Patch { fields });
        match existing {
            (None, None) => {}
            (first, last)
                if first.as_deref() == Some(name.first_name.as_str())
                    && last.as_deref() == Some(name.last_name.as_str()) =>
            {
                plan = plan.warn("names already match; the patch changes nothing");
            }
            (first, last) if !self.overwrite => {
                return Err(ReconcileError::validation(format!(
                    "row already has name {:?} {:?}; pass --overwrite to replace it",
                    first.unwrap_or_default(),
                    last.unwrap_or_default()
                )));
            }
            _ => {
                plan = plan.warn("replacing names that were already set");
            }
        }
        if name.last_name.is_empty() {
            plan = plan.warn("name has a single word; last_name will be empty");
        }
        Ok(plan)
    }

    async fn verify(
        &self,
        _runner: &Runner<'_>,
        before: &Row,
        after: &Row,
        _outcome: &MutationOutcome,
    ) -> Result<(), ReconcileError> {
        let expected = name_fields(&split_full_name(self.full_name(before)?)?);
        let unapplied = unapplied_fields(&expected, after);
        if unapplied.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::verification(format!(
                "re-fetched row does not hold the split name in {}",
                unapplied.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn task(source: NameSource, overwrite: bool) -> BackfillName {
        BackfillName {
            table: "students".into(),
            target: Filter::new().eq("id", "s1"),
            source,
            overwrite,
        }
    }

    #[test]
    fn test_plan_splits_on_first_space() {
        let plan = task(NameSource::Explicit("Jane Mary Doe".into()), false)
            .plan(&row(json!({"id": "s1", "first_name": null})))
            .unwrap();
        assert_eq!(
            plan.mutation,
            Mutation::Patch {
                fields: row(json!({"first_name": "Jane", "last_name": "Mary Doe"}))
            }
        );
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_plan_reads_source_column() {
        let plan = task(NameSource::Column("full_name".into()), false)
            .plan(&row(json!({"id": "s1", "full_name": "  Ada   Lovelace "})))
            .unwrap();
        assert_eq!(
            plan.mutation,
            Mutation::Patch {
                fields: row(json!({"first_name": "Ada", "last_name": "Lovelace"}))
            }
        );
    }

    #[test]
    fn test_plan_refuses_to_overwrite_different_name() {
        let before = row(json!({"id": "s1", "first_name": "Janet", "last_name": "Doe"}));
        assert!(
            task(NameSource::Explicit("Jane Doe".into()), false)
                .plan(&before)
                .is_err()
        );
        let plan = task(NameSource::Explicit("Jane Doe".into()), true)
            .plan(&before)
            .unwrap();
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn test_plan_single_word_name_warns() {
        let plan = task(NameSource::Explicit("Cher".into()), false)
            .plan(&row(json!({"id": "s1"})))
            .unwrap();
        assert!(plan.warnings[0].contains("single word"));
    }

    #[test]
    fn test_plan_rejects_blank_source() {
        assert!(
            task(NameSource::Column("full_name".into()), false)
                .plan(&row(json!({"id": "s1", "full_name": null})))
                .is_err()
        );
        assert!(
            task(NameSource::Explicit("   ".into()), false)
                .plan(&row(json!({"id": "s1"})))
                .is_err()
        );
    }
}
