//! The fetch → plan → write → re-fetch → verify runner.

use std::collections::BTreeSet;

use schoolbase_storage::{Columns, Filter, Row, TabularStore, filter_text};
use serde_json::Value;
use tracing::Instrument;

use crate::error::ReconcileError;
use crate::procedures::{Procedure, ProcedureCall, decode_response};
use crate::recipe::{Deletion, Mutation, MutationOutcome, Reconciliation};
use crate::report::{RunReport, RunState, diff_rows};

/// Whether a run may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Apply,
    /// Fetch and plan only.
    DryRun,
}

/// A failed run: the report up to the failing step, and the cause.
#[derive(Debug, thiserror::Error)]
#[error("{task} failed: {error}")]
pub struct RunFailure {
    pub task: String,
    pub report: Box<RunReport>,
    #[source]
    pub error: ReconcileError,
}

/// Executes store operations one at a time against a single store client.
///
/// There is no retry, no rollback and no locking: every call is awaited
/// before the next is issued, and the first failure ends the run.
pub struct Runner<'a> {
    store: &'a dyn TabularStore,
}

impl<'a> Runner<'a> {
    pub fn new(store: &'a dyn TabularStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a dyn TabularStore {
        self.store
    }

    /// Returns the one row of `table` matching `filter`.
    ///
    /// Zero rows is `NotFound`; more than one is `AmbiguousMatch`, never the
    /// first row.
    pub async fn fetch_single(&self, table: &str, filter: &Filter) -> Result<Row, ReconcileError> {
        let mut rows = self.fetch_all(table, filter).await?;
        match rows.len() {
            0 => Err(ReconcileError::not_found(table, filter)),
            1 => Ok(rows.remove(0)),
            n => Err(ReconcileError::ambiguous(table, filter, n)),
        }
    }

    /// Returns every row of `table` matching `filter`.
    pub async fn fetch_all(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, ReconcileError> {
        tracing::debug!(table, filter = %filter, "fetch");
        self.store
            .select(table, &Columns::All, filter)
            .await
            .map_err(|e| ReconcileError::store(format!("select {table} where {filter}"), None, e))
    }

    /// Sets `fields` on the row whose id is `target_id` and returns it.
    ///
    /// `fields` is sent as given; derived values must be computed beforehand.
    pub async fn apply_patch(
        &self,
        table: &str,
        target_id: &Value,
        fields: &Row,
    ) -> Result<Row, ReconcileError> {
        if fields.is_empty() {
            return Err(ReconcileError::validation("patch has no fields"));
        }
        if fields.contains_key("id") {
            return Err(ReconcileError::validation("patch must not change the id column"));
        }
        let filter = Filter::new().eq("id", target_id.clone());
        tracing::debug!(table, filter = %filter, columns = fields.len(), "patch");
        let mut rows = self
            .store
            .update(table, &filter, fields)
            .await
            .map_err(|e| {
                ReconcileError::store(
                    format!("update {table} where {filter}"),
                    Some(Value::Object(fields.clone())),
                    e,
                )
            })?;
        match rows.len() {
            0 => Err(ReconcileError::not_found(table, &filter)),
            1 => Ok(rows.remove(0)),
            // The store has already written every matching row.
            n => Err(ReconcileError::verification(format!(
                "update {table} where {filter} was applied to {n} rows, expected exactly one"
            ))),
        }
    }

    /// Sends a validated procedure call and returns the raw result.
    pub async fn invoke_procedure(&self, call: &ProcedureCall) -> Result<Value, ReconcileError> {
        tracing::debug!(procedure = call.name, "invoke");
        self.store
            .call(call.name, &call.args)
            .await
            .map_err(|e| ReconcileError::store(format!("call {}", call.name), Some(call.args.clone()), e))
    }

    /// Validates `request`, calls the procedure and decodes its response.
    pub async fn invoke<P: Procedure>(&self, request: &P) -> Result<P::Response, ReconcileError> {
        let call = ProcedureCall::new(request)?;
        let result = self.invoke_procedure(&call).await?;
        decode_response::<P>(result)
    }

    /// Deletes the rows of `table` whose ids are in `ids`, in one call.
    ///
    /// The returned [`Deletion`] counts only rows the store reports as
    /// deleted; ids that matched nothing are listed as missing.
    pub async fn delete_by_ids(
        &self,
        table: &str,
        ids: &BTreeSet<String>,
    ) -> Result<Deletion, ReconcileError> {
        if ids.is_empty() {
            return Err(ReconcileError::validation("no ids to delete"));
        }
        let filter = Filter::new().is_in("id", ids.iter().map(String::as_str));
        tracing::debug!(table, count = ids.len(), "delete");
        let deleted = self.store.delete(table, &filter).await.map_err(|e| {
            ReconcileError::store(
                format!("delete from {table} where {filter}"),
                Some(Value::from(ids.iter().cloned().collect::<Vec<_>>())),
                e,
            )
        })?;
        let deleted_ids: BTreeSet<String> = deleted
            .iter()
            .filter_map(|r| r.get("id").map(filter_text))
            .collect();
        let missing = ids.difference(&deleted_ids).cloned().collect();
        Ok(Deletion {
            requested: ids.len(),
            deleted,
            missing,
        })
    }

    async fn apply(&self, table: &str, before: &Row, mutation: &Mutation) -> Result<MutationOutcome, ReconcileError> {
        match mutation {
            Mutation::Patch { fields } => {
                let id = target_id(table, before)?;
                self.apply_patch(table, &id, fields)
                    .await
                    .map(MutationOutcome::Patched)
            }
            Mutation::Procedure(call) => self
                .invoke_procedure(call)
                .await
                .map(MutationOutcome::Procedure),
            Mutation::Delete { table, ids } => self
                .delete_by_ids(table, ids)
                .await
                .map(MutationOutcome::Deleted),
        }
    }

    /// Runs one reconciliation through `START → FETCHED → PATCHED → VERIFIED → DONE`.
    ///
    /// The first failing step ends the run in `FAILED`; nothing already
    /// written is undone.
    pub async fn run<R>(&self, recipe: &R, mode: RunMode) -> Result<RunReport, RunFailure>
    where
        R: Reconciliation + ?Sized,
    {
        let target = recipe.target();
        let table = recipe.table().to_string();
        let span = tracing::info_span!(
            "reconcile",
            task = recipe.name(),
            table = %table,
            target = %target,
            backend = self.store.backend_name()
        );
        let mut report = RunReport::new(recipe.name(), &table, target.to_string());
        report.dry_run = mode == RunMode::DryRun;

        let result = self
            .run_steps(recipe, &table, &target, mode, &mut report)
            .instrument(span)
            .await;
        match result {
            Ok(()) => Ok(report),
            Err(error) => {
                report.fail(&error);
                Err(RunFailure {
                    task: recipe.name().to_string(),
                    report: Box::new(report),
                    error,
                })
            }
        }
    }

    async fn run_steps<R>(
        &self,
        recipe: &R,
        table: &str,
        target: &Filter,
        mode: RunMode,
        report: &mut RunReport,
    ) -> Result<(), ReconcileError>
    where
        R: Reconciliation + ?Sized,
    {
        let before = self.fetch_single(table, target).await?;
        report.before = Some(before.clone());
        report.advance(RunState::Fetched, format!("resolved target in {table}"));

        let plan = recipe.plan(&before)?;
        report.mutation = serde_json::to_value(&plan.mutation).ok();
        for warning in plan.warnings {
            report.warn(warning);
        }

        if mode == RunMode::DryRun {
            tracing::info!(mutation = %plan.mutation.describe(), "dry run, not applying");
            report.finish_dry_run();
            return Ok(());
        }

        let outcome = self.apply(table, &before, &plan.mutation).await?;
        report.outcome = serde_json::to_value(&outcome).ok();
        if let MutationOutcome::Deleted(deletion) = &outcome {
            if !deletion.missing.is_empty() {
                report.warn(format!(
                    "{} of {} id(s) did not exist: {}",
                    deletion.missing.len(),
                    deletion.requested,
                    deletion.missing.join(", ")
                ));
            }
        }
        report.advance(RunState::Patched, plan.mutation.describe());

        let after = self.fetch_single(table, target).await?;
        report.changes = diff_rows(&before, &after);
        report.after = Some(after.clone());
        recipe.verify(self, &before, &after, &outcome).await?;
        report.advance(
            RunState::Verified,
            format!("re-fetched target, {} field(s) changed", report.changes.len()),
        );

        report.advance(RunState::Done, "done");
        Ok(())
    }
}

/// The target row's `id`, which every write is scoped by.
pub fn target_id(table: &str, row: &Row) -> Result<Value, ReconcileError> {
    match row.get("id") {
        Some(id) if !id.is_null() => Ok(id.clone()),
        _ => Err(ReconcileError::validation(format!(
            "row fetched from {table} has no id column"
        ))),
    }
}
