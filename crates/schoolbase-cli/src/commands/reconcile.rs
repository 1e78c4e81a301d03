use anyhow::{Context, Result};
use schoolbase_core::{REGISTRATIONS_TABLE, RegistrationRecord, STUDENTS_TABLE};
use schoolbase_reconcile::{
    BackfillName, NameSource, PatchFields, Reconciliation, RemoveDuplicates, RunMode, Runner,
    SetTier, StartTrialRun,
};
use schoolbase_storage::{Filter, Row, TabularStore};
use serde_json::Value;
use time::OffsetDateTime;

use crate::cli::{
    BackfillNameArgs, DedupeArgs, OutputFormat, PatchArgs, SetTierArgs, ShowArgs, StartTrialArgs,
};
use crate::output::{print_report, print_value};

/// Runs one reconciliation and prints its report, success or not.
pub async fn execute<R>(
    store: &dyn TabularStore,
    recipe: &R,
    mode: RunMode,
    format: OutputFormat,
) -> Result<()>
where
    R: Reconciliation,
{
    match Runner::new(store).run(recipe, mode).await {
        Ok(report) => {
            print_report(&report, format);
            Ok(())
        }
        Err(failure) => {
            print_report(&failure.report, format);
            Err(failure.into())
        }
    }
}

pub async fn show(store: &dyn TabularStore, args: &ShowArgs, format: OutputFormat) -> Result<()> {
    let filter = args.target.target()?.filter();
    let row = Runner::new(store).fetch_single(&args.table, &filter).await?;
    print_value(&Value::Object(row), format);
    Ok(())
}

pub async fn patch(
    store: &dyn TabularStore,
    args: &PatchArgs,
    mode: RunMode,
    format: OutputFormat,
) -> Result<()> {
    let mut fields = Row::new();
    for assignment in &args.assignments {
        let (column, value) = parse_assignment(assignment)?;
        fields.insert(column, value);
    }
    let task = PatchFields {
        table: args.table.clone(),
        target: args.target.target()?.filter(),
        fields,
    };
    execute(store, &task, mode, format).await
}

pub async fn start_trial(
    store: &dyn TabularStore,
    args: &StartTrialArgs,
    mode: RunMode,
    format: OutputFormat,
) -> Result<()> {
    let task = StartTrialRun {
        target: args.target.target()?,
        tier: args.tier,
        days: args.days,
        issued_at: OffsetDateTime::now_utc(),
    };
    execute(store, &task, mode, format).await
}

pub async fn set_tier(
    store: &dyn TabularStore,
    args: &SetTierArgs,
    mode: RunMode,
    format: OutputFormat,
) -> Result<()> {
    let task = SetTier {
        target: args.target.target()?,
        tier: args.tier,
        reason: args.reason.clone(),
        expires_at: args.expires_at,
    };
    execute(store, &task, mode, format).await
}

/// `source` is the origin store, required when the name comes from a registration.
pub async fn backfill_name(
    store: &dyn TabularStore,
    source: Option<&dyn TabularStore>,
    args: &BackfillNameArgs,
    mode: RunMode,
    format: OutputFormat,
) -> Result<()> {
    let name_source = match (&args.name, &args.from_column, &args.from_registration) {
        (Some(name), _, _) => NameSource::Explicit(name.clone()),
        (None, Some(column), _) => NameSource::Column(column.clone()),
        (None, None, Some(registration_id)) => {
            let source = source.context("--from-registration needs --source-profile")?;
            let name = registration_name(source, registration_id, args.table == STUDENTS_TABLE)
                .await?;
            NameSource::Explicit(name)
        }
        (None, None, None) => NameSource::Column("full_name".to_string()),
    };
    let task = BackfillName {
        table: args.table.clone(),
        target: args.target.target()?.filter(),
        source: name_source,
        overwrite: args.overwrite,
    };
    execute(store, &task, mode, format).await
}

async fn registration_name(
    source: &dyn TabularStore,
    registration_id: &str,
    student: bool,
) -> Result<String> {
    let row = Runner::new(source)
        .fetch_single(REGISTRATIONS_TABLE, &Filter::new().eq("id", registration_id))
        .await?;
    let registration: RegistrationRecord = serde_json::from_value(Value::Object(row))
        .context("Registration row has an unexpected shape")?;
    let role = if student { "student" } else { "guardian" };
    registration
        .name_for(student)
        .map(str::to_string)
        .with_context(|| format!("Registration {registration_id} has no {role} name"))
}

pub async fn dedupe(
    store: &dyn TabularStore,
    args: &DedupeArgs,
    mode: RunMode,
    format: OutputFormat,
) -> Result<()> {
    let task = RemoveDuplicates {
        table: args.table.clone(),
        canonical_id: args.keep.clone(),
        duplicate_ids: args.ids.iter().cloned().collect(),
    };
    execute(store, &task, mode, format).await
}

/// Parses `column=value`. The value is read as JSON when it parses as JSON
/// (`true`, `3`, `null`, `"quoted"`), otherwise taken as a plain string.
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (column, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid assignment \"{raw}\". Expected COLUMN=VALUE"))?;
    let column = column.trim();
    if column.is_empty() {
        anyhow::bail!("Invalid assignment \"{raw}\": empty column name");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((column.to_string(), value))
}
