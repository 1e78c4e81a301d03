use async_trait::async_trait;
use schoolbase_storage::{Filter, Row};

use super::unapplied_fields;
use crate::error::ReconcileError;
use crate::recipe::{Mutation, MutationOutcome, Plan, Reconciliation};
use crate::runner::Runner;

/// Sets literal column values on one row.
#[derive(Debug, Clone)]
pub struct PatchFields {
    pub table: String,
    pub target: Filter,
    pub fields: Row,
}

#[async_trait]
impl Reconciliation for PatchFields {
    fn name(&self) -> &'static str {
        "patch"
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn target(&self) -> Filter {
        self.target.clone()
    }

    fn plan(&self, before: &Row) -> Result<Plan, ReconcileError> {
        if self.fields.is_empty() {
            return Err(ReconcileError::validation("nothing to set"));
        }
        if self.fields.contains_key("id") {
            return Err(ReconcileError::validation("the id column cannot be patched"));
        }
        let mut plan = Plan::new(Mutation::Patch {
            fields: self.fields.clone(),
        });
        let unknown: Vec<&str> = self
            .fields
            .keys()
            .filter(|c| !before.contains_key(c.as_str()))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            plan = plan.warn(format!(
                "column(s) not present on the fetched row: {}",
                unknown.join(", ")
            ));
        }
        Ok(plan)
    }

    async fn verify(
        &self,
        _runner: &Runner<'_>,
        _before: &Row,
        after: &Row,
        _outcome: &MutationOutcome,
    ) -> Result<(), ReconcileError> {
        let unapplied = unapplied_fields(&self.fields, after);
        if unapplied.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::verification(format!(
                "re-fetched row does not hold the patched value of {}",
                unapplied.join(", ")
            )))
        }
    }
}
