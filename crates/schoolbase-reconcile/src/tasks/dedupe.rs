use std::collections::BTreeSet;

use async_trait::async_trait;
use schoolbase_storage::{Filter, Row, filter_text};

use crate::error::ReconcileError;
use crate::recipe::{Mutation, MutationOutcome, Plan, Reconciliation};
use crate::runner::{Runner, target_id};

/// Deletes rows already identified as duplicates of a canonical row.
///
/// The canonical row is the run's target, so a run against a canonical id
/// that does not exist deletes nothing.
#[derive(Debug, Clone)]
pub struct RemoveDuplicates {
    pub table: String,
    pub canonical_id: String,
    pub duplicate_ids: BTreeSet<String>,
}

#[async_trait]
impl Reconciliation for RemoveDuplicates {
    fn name(&self) -> &'static str {
        "dedupe"
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn target(&self) -> Filter {
        Filter::new().eq("id", self.canonical_id.as_str())
    }

    fn plan(&self, before: &Row) -> Result<Plan, ReconcileError> {
        if self.duplicate_ids.is_empty() {
            return Err(ReconcileError::validation("no duplicate ids given"));
        }
        let canonical = filter_text(&target_id(&self.table, before)?);
        if self.duplicate_ids.contains(&canonical) {
            return Err(ReconcileError::validation(format!(
                "canonical row {canonical} is listed as a duplicate"
            )));
        }
        Ok(Plan::new(Mutation::Delete {
            table: self.table.clone(),
            ids: self.duplicate_ids.clone(),
        }))
    }

    async fn verify(
        &self,
        runner: &Runner<'_>,
        _before: &Row,
        _after: &Row,
        _outcome: &MutationOutcome,
    ) -> Result<(), ReconcileError> {
        let remaining = runner
            .fetch_all(
                &self.table,
                &Filter::new().is_in("id", self.duplicate_ids.iter().map(String::as_str)),
            )
            .await?;
        if remaining.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = remaining
            .iter()
            .filter_map(|r| r.get("id").map(filter_text))
            .collect();
        Err(ReconcileError::verification(format!(
            "{} duplicate row(s) still present: {}",
            ids.len(),
            ids.join(", ")
        )))
    }
}
