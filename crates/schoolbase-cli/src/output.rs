use std::fmt::Write as _;

use colored::Colorize;
use schoolbase_reconcile::{FieldChange, RunReport, RunState};
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_value(value: &Value, format: OutputFormat) {
    println!("{}", render_value(value, format));
}

pub fn print_report(report: &RunReport, format: OutputFormat) {
    println!("{}", render_report(report, format));
}

pub fn render_value(value: &Value, format: OutputFormat) -> String {
    match format {
        OutputFormat::Human | OutputFormat::Json => pretty(value),
        OutputFormat::Kv => kv_lines(value).join("\n"),
        OutputFormat::Table => match value {
            Value::Object(row) => {
                let mut builder = Builder::default();
                builder.push_record(["Field", "Value"]);
                for (field, v) in row {
                    builder.push_record([field.clone(), cell(v)]);
                }
                builder.build().with(Style::rounded()).to_string()
            }
            Value::Array(rows) => rows_table(rows),
            other => cell(other),
        },
    }
}

pub fn render_report(report: &RunReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => match serde_json::to_value(report) {
            Ok(value) => pretty(&value),
            Err(e) => format!("{{\"error\": \"cannot encode report: {e}\"}}"),
        },
        OutputFormat::Kv => match serde_json::to_value(report) {
            Ok(value) => kv_lines(&value).join("\n"),
            Err(e) => format!("error=cannot encode report: {e}"),
        },
        OutputFormat::Table => {
            let mut out = status_lines(report);
            if !report.changes.is_empty() {
                let _ = writeln!(out, "{}", changes_table(&report.changes));
            }
            out.trim_end().to_string()
        }
        OutputFormat::Human => render_human(report),
    }
}

fn state_icon(state: RunState) -> &'static str {
    match state {
        RunState::Start => "🚀",
        RunState::Fetched => "🔎",
        RunState::Patched => "✏️ ",
        RunState::Verified => "✅",
        RunState::Done => "🎉",
        RunState::Failed => "❌",
    }
}

fn status_lines(report: &RunReport) -> String {
    let mut out = String::new();
    for step in &report.steps {
        let label = format!("{:<8}", step.state.as_str());
        let label = match step.state {
            RunState::Failed => label.red().bold(),
            RunState::Done => label.green().bold(),
            _ => label.cyan(),
        };
        let _ = writeln!(out, "{} {} {}", state_icon(step.state), label, step.message);
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "⚠️  {}", warning.yellow());
    }
    out
}

fn render_human(report: &RunReport) -> String {
    let mut out = format!(
        "{} {} on {} ({})\n",
        "Task:".cyan(),
        report.task,
        report.table,
        report.target
    );
    out.push_str(&status_lines(report));

    if report.dry_run {
        if let Some(mutation) = &report.mutation {
            let _ = writeln!(out, "{}\n{}", "Planned mutation:".cyan(), pretty(mutation));
        }
    }
    if let Some(before) = &report.before {
        let _ = writeln!(out, "{}\n{}", "Before:".cyan(), pretty(&Value::Object(before.clone())));
    }
    if let Some(after) = &report.after {
        let _ = writeln!(out, "{}\n{}", "After:".cyan(), pretty(&Value::Object(after.clone())));
    }
    if let Some(error) = &report.error {
        if let Some(request) = &error.request {
            let _ = writeln!(out, "{}\n{}", "Request:".cyan(), pretty(request));
        }
        if let Some(payload) = &error.store_payload {
            let _ = writeln!(out, "{}\n{}", "Store payload:".red(), pretty(payload));
        }
    }
    out.trim_end().to_string()
}

fn changes_table(changes: &[FieldChange]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Before", "After"]);
    for change in changes {
        builder.push_record([change.field.clone(), cell(&change.before), cell(&change.after)]);
    }
    builder.build().with(Style::rounded()).to_string()
}

fn rows_table(rows: &[Value]) -> String {
    let Some(Value::Object(first)) = rows.first() else {
        return "No rows.".to_string();
    };
    let columns: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(columns.clone());
    for row in rows {
        builder.push_record(
            columns
                .iter()
                .map(|c| row.get(c).map(cell).unwrap_or_default()),
        );
    }
    builder.build().with(Style::rounded()).to_string()
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flattens `value` into `path=value` lines, one per scalar.
pub fn kv_lines(value: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    flatten("", value, &mut lines);
    lines
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<String>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                flatten(&join(k), v, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten(&join(&i.to_string()), v, out);
            }
        }
        scalar => out.push(format!("{prefix}={}", kv_scalar(scalar))),
    }
}

fn kv_scalar(value: &Value) -> String {
    match value {
        Value::String(s)
            if !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c == '"' || c == '=') =>
        {
            s.clone()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolbase_reconcile::ReconcileError;
    use serde_json::json;

    #[test]
    fn test_kv_lines_flatten_nested_values() {
        let value = json!({
            "state": "DONE",
            "steps": [{"state": "START", "message": "run started"}],
            "error": null,
            "warnings": [],
            "after": {"first_name": "Jane", "is_trial": true}
        });
        assert_eq!(
            kv_lines(&value),
            vec![
                "after.first_name=Jane",
                "after.is_trial=true",
                "error=null",
                "state=DONE",
                "steps.0.message=\"run started\"",
                "steps.0.state=START",
                "warnings=[]",
            ]
        );
    }

    #[test]
    fn test_json_report_is_one_document() {
        let mut report = RunReport::new("patch", "profiles", "id=eq.u1");
        report.fail(&ReconcileError::not_found("profiles", "id=eq.u1"));
        let rendered = render_report(&report, OutputFormat::Json);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["state"], json!("FAILED"));
        assert_eq!(parsed["error"]["kind"], json!("not_found"));
    }

    #[test]
    fn test_human_report_lists_steps_and_warnings() {
        colored::control::set_override(false);
        let mut report = RunReport::new("dedupe", "students", "id=eq.s1");
        report.advance(RunState::Fetched, "resolved target in students");
        report.warn("1 of 2 id(s) did not exist: s9");
        let rendered = render_report(&report, OutputFormat::Human);
        assert!(rendered.contains("🔎 FETCHED  resolved target in students"));
        assert!(rendered.contains("⚠️  1 of 2 id(s) did not exist: s9"));
    }

    #[test]
    fn test_row_table_has_field_column() {
        let rendered = render_value(&json!({"id": "u1", "last_name": null}), OutputFormat::Table);
        assert!(rendered.contains("Field"));
        assert!(rendered.contains("last_name"));
    }
}
