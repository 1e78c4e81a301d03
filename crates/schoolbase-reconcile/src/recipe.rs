use std::collections::BTreeSet;

use async_trait::async_trait;
use schoolbase_storage::{Filter, Row};
use serde::Serialize;
use serde_json::Value;

use crate::error::ReconcileError;
use crate::procedures::ProcedureCall;
use crate::runner::Runner;

/// The single write a reconciliation performs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    /// Update the target row, scoped by its id.
    Patch { fields: Row },
    /// Invoke a remote procedure that performs its writes atomically.
    Procedure(ProcedureCall),
    /// Delete rows of `table` by id.
    Delete { table: String, ids: BTreeSet<String> },
}

impl Mutation {
    pub fn describe(&self) -> String {
        match self {
            Mutation::Patch { fields } => {
                let cols: Vec<&str> = fields.keys().map(String::as_str).collect();
                format!("patch {}", cols.join(", "))
            }
            Mutation::Procedure(call) => format!("call {}", call.name),
            Mutation::Delete { table, ids } => format!("delete {} row(s) from {table}", ids.len()),
        }
    }
}

/// Mutation plus anything the operator should know before it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub mutation: Mutation,
    pub warnings: Vec<String>,
}

impl Plan {
    pub fn new(mutation: Mutation) -> Self {
        Self {
            mutation,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn warn(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// What the store returned for the mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum MutationOutcome {
    Patched(Row),
    Procedure(Value),
    Deleted(Deletion),
}

/// Result of a delete-by-ids call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deletion {
    /// Number of ids the caller asked to delete.
    pub requested: usize,
    /// Rows the store reports as deleted.
    pub deleted: Vec<Row>,
    /// Requested ids the store did not report as deleted.
    pub missing: Vec<String>,
}

impl Deletion {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.deleted.len() == self.requested
    }
}

/// One concrete repair: which row to resolve, how to derive the write from
/// it, and what the re-fetched row must look like afterwards.
///
/// `plan` must be pure: every derived value comes from the fetched row and
/// the task's own parameters.
#[async_trait]
pub trait Reconciliation: Send + Sync {
    /// Short task name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Table holding the target row.
    fn table(&self) -> &str;

    /// Filter expected to select exactly the target row.
    fn target(&self) -> Filter;

    /// Derives the write from the fetched row.
    fn plan(&self, before: &Row) -> Result<Plan, ReconcileError>;

    /// Checks the re-fetched row against what the write should have produced.
    async fn verify(
        &self,
        _runner: &Runner<'_>,
        _before: &Row,
        _after: &Row,
        _outcome: &MutationOutcome,
    ) -> Result<(), ReconcileError> {
        Ok(())
    }
}
