//! Structured record of one reconciliation run.

use std::collections::BTreeSet;
use std::fmt;

use schoolbase_storage::{Row, StoreError};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{ErrorKind, ReconcileError};

/// Where a run is in `START → FETCHED → PATCHED → VERIFIED → DONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Start,
    Fetched,
    Patched,
    Verified,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Start, RunState::Fetched)
                | (RunState::Fetched, RunState::Patched)
                | (RunState::Patched, RunState::Verified)
                | (RunState::Verified, RunState::Done)
        ) || (!self.is_terminal() && next == RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Start => "START",
            RunState::Fetched => "FETCHED",
            RunState::Patched => "PATCHED",
            RunState::Verified => "VERIFIED",
            RunState::Done => "DONE",
            RunState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state the run entered, with what happened there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub state: RunState,
    pub message: String,
}

/// A column whose value differs between the before and after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

/// Failure details in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    /// Request fields or arguments that were being sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// Error body from the store, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_payload: Option<Value>,
}

impl From<&ReconcileError> for ErrorReport {
    fn from(e: &ReconcileError) -> Self {
        let (request, store_payload) = match e {
            ReconcileError::Store {
                payload, source, ..
            } => (payload.clone(), store_payload(source)),
            _ => (None, None),
        };
        Self {
            kind: e.kind(),
            message: e.to_string(),
            request,
            store_payload,
        }
    }
}

fn store_payload(source: &StoreError) -> Option<Value> {
    source
        .payload()
        .and_then(|p| serde_json::to_value(p).ok())
}

/// Before/after record of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub task: String,
    pub table: String,
    pub target: String,
    pub state: RunState,
    pub dry_run: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    pub steps: Vec<StepRecord>,
    pub before: Option<Row>,
    pub mutation: Option<Value>,
    pub outcome: Option<Value>,
    pub after: Option<Row>,
    pub changes: Vec<FieldChange>,
    pub warnings: Vec<String>,
    pub error: Option<ErrorReport>,
}

impl RunReport {
    pub fn new(task: impl Into<String>, table: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            table: table.into(),
            target: target.into(),
            state: RunState::Start,
            dry_run: false,
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
            steps: vec![StepRecord {
                state: RunState::Start,
                message: "run started".to_string(),
            }],
            before: None,
            mutation: None,
            outcome: None,
            after: None,
            changes: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Moves to `next`, recording `message`. Illegal transitions are ignored
    /// and logged; the state never leaves a terminal state.
    pub fn advance(&mut self, next: RunState, message: impl Into<String>) {
        let message = message.into();
        if !self.state.can_advance_to(next) {
            tracing::warn!(from = %self.state, to = %next, "ignored illegal run state transition");
            return;
        }
        tracing::info!(task = %self.task, state = %next, "{message}");
        self.state = next;
        self.steps.push(StepRecord {
            state: next,
            message,
        });
        if next.is_terminal() {
            self.finished_at = Some(OffsetDateTime::now_utc());
        }
    }

    pub fn fail(&mut self, error: &ReconcileError) {
        self.error = Some(ErrorReport::from(error));
        self.advance(RunState::Failed, error.to_string());
    }

    /// Closes a dry run after planning. The state stays `FETCHED`.
    pub fn finish_dry_run(&mut self) {
        self.steps.push(StepRecord {
            state: self.state,
            message: "dry run: mutation not applied".to_string(),
        });
        self.finished_at = Some(OffsetDateTime::now_utc());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        tracing::warn!(task = %self.task, "{warning}");
        self.warnings.push(warning);
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && (self.state == RunState::Done || self.dry_run)
    }
}

/// Columns whose values differ between `before` and `after`, sorted by name.
pub fn diff_rows(before: &Row, after: &Row) -> Vec<FieldChange> {
    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let old = before.get(field).cloned().unwrap_or(Value::Null);
            let new = after.get(field).cloned().unwrap_or(Value::Null);
            (old != new).then(|| FieldChange {
                field: field.clone(),
                before: old,
                after: new,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_state_machine_transitions() {
        assert!(RunState::Start.can_advance_to(RunState::Fetched));
        assert!(RunState::Fetched.can_advance_to(RunState::Patched));
        assert!(RunState::Patched.can_advance_to(RunState::Verified));
        assert!(RunState::Verified.can_advance_to(RunState::Done));
        assert!(RunState::Start.can_advance_to(RunState::Failed));
        assert!(RunState::Patched.can_advance_to(RunState::Failed));

        assert!(!RunState::Start.can_advance_to(RunState::Patched));
        assert!(!RunState::Done.can_advance_to(RunState::Failed));
        assert!(!RunState::Failed.can_advance_to(RunState::Fetched));
    }

    #[test]
    fn test_report_ignores_illegal_transition() {
        let mut report = RunReport::new("patch", "profiles", "id=eq.u1");
        report.advance(RunState::Verified, "skipped ahead");
        assert_eq!(report.state, RunState::Start);
        report.advance(RunState::Fetched, "fetched");
        report.fail(&ReconcileError::validation("bad"));
        assert_eq!(report.state, RunState::Failed);
        assert!(report.finished_at.is_some());
        report.advance(RunState::Patched, "too late");
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.steps.len(), 3);
        assert!(!report.succeeded());
    }

    #[test]
    fn test_diff_rows() {
        let before = row(json!({"id": "u1", "first_name": null, "last_name": "Doe", "role": "parent"}));
        let after = row(json!({"id": "u1", "first_name": "Jane", "last_name": "Doe"}));
        let changes = diff_rows(&before, &after);
        assert_eq!(
            changes,
            vec![
                FieldChange {
                    field: "first_name".into(),
                    before: Value::Null,
                    after: json!("Jane"),
                },
                FieldChange {
                    field: "role".into(),
                    before: json!("parent"),
                    after: Value::Null,
                },
            ]
        );
    }

    #[test]
    fn test_report_serializes_state_names() {
        let report = RunReport::new("show", "profiles", "id=eq.u1");
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["state"], json!("START"));
        assert_eq!(value["steps"][0]["state"], json!("START"));
    }
}
