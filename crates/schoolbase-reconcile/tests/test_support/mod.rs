//! Shared fixtures: a seeded in-memory store with the two procedures
//! emulated the way their installed SQL behaves.

#![allow(dead_code)]

use async_trait::async_trait;
use schoolbase_db_memory::{ForeignKey, InMemoryStore, Tables};
use schoolbase_reconcile::{AssignUsageTier, StartTrial};
use schoolbase_storage::{
    Columns, Filter, RemoteErrorPayload, Row, StoreError, TabularStore, filter_text,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub const JANE_ID: &str = "0b8e5f1c-37a2-4c59-9a57-7d3e2f4b9c10";
pub const SAM_ID: &str = "6f1d2a7e-98c4-4b3a-b1e0-5c2d9e8f7a61";
pub const MISSING_ID: &str = "11111111-2222-4333-8444-555555555555";

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("fixture rows are objects")
}

/// Profiles, students and tier assignments for two parents; `students`
/// holds a canonical row `s1` and duplicates `s2`, `s3`.
pub async fn school_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .seed(
            "profiles",
            vec![
                json!({
                    "id": JANE_ID,
                    "email": "jane@example.com",
                    "first_name": null,
                    "last_name": null,
                    "role": "parent",
                    "is_trial": false,
                    "trial_started_at": null,
                    "trial_ends_at": null,
                    "plan_tier": "free",
                    "seat_status": "inactive",
                    "subscription_tier": "free"
                }),
                json!({
                    "id": SAM_ID,
                    "email": "sam@example.com",
                    "first_name": "Sam",
                    "last_name": "Okafor",
                    "role": "teacher",
                    "is_trial": false,
                    "plan_tier": "premium",
                    "seat_status": "active",
                    "subscription_tier": "premium"
                }),
            ],
        )
        .await;
    store
        .seed(
            "usage_tier_assignments",
            vec![json!({
                "id": "9d4c3b2a-1e0f-4a5b-8c7d-6e5f4a3b2c1d",
                "user_id": JANE_ID,
                "tier": "free",
                "activation_reason": "signup",
                "is_active": true,
                "expires_at": null
            })],
        )
        .await;
    store
        .seed(
            "students",
            vec![
                json!({"id": "s1", "email": "kid@example.com", "full_name": "Jane Mary Doe", "first_name": null, "last_name": null}),
                json!({"id": "s2", "email": "kid@example.com", "full_name": "Jane Mary Doe", "first_name": null, "last_name": null}),
                json!({"id": "s3", "email": "kid@example.com", "full_name": "Jane Doe", "first_name": null, "last_name": null}),
            ],
        )
        .await;
    store
        .add_foreign_key(ForeignKey {
            child_table: "usage_tier_assignments".into(),
            child_column: "user_id".into(),
            parent_table: "profiles".into(),
        })
        .await;
    store.register_procedure("start_trial", start_trial).await;
    store
        .register_procedure("assign_usage_tier", assign_usage_tier)
        .await;
    store
}

fn decode_args<T: DeserializeOwned>(args: &Value) -> Result<T, StoreError> {
    serde_json::from_value(args.clone()).map_err(|e| {
        StoreError::remote(
            400,
            RemoteErrorPayload::new(e.to_string()).with_code("PGRST102"),
        )
    })
}

fn missing_profile(user_id: &str) -> StoreError {
    StoreError::remote(
        400,
        RemoteErrorPayload::new(format!("profile {user_id} does not exist")).with_code("P0002"),
    )
}

fn replace_active_assignment(
    tables: &mut Tables,
    user_id: &str,
    assignment: Value,
) -> Result<Row, StoreError> {
    tables.update(
        "usage_tier_assignments",
        &Filter::new().eq("user_id", user_id).eq("is_active", true),
        &row(json!({"is_active": false})),
    )?;
    tables.insert("usage_tier_assignments", &row(assignment))
}

/// Same writes as the installed `start_trial` function.
pub fn start_trial(tables: &mut Tables, args: &Value) -> Result<Value, StoreError> {
    let request: StartTrial = decode_args(args)?;
    let user_id = request.p_user_id.to_string();
    let mut updated = tables.update(
        "profiles",
        &Filter::new().eq("id", user_id.as_str()),
        &row(json!({
            "is_trial": true,
            "trial_started_at": args["p_trial_started_at"],
            "trial_ends_at": args["p_trial_ends_at"],
            "plan_tier": args["p_plan_tier"],
            "subscription_tier": args["p_plan_tier"],
            "seat_status": "active"
        })),
    )?;
    if updated.is_empty() {
        return Err(missing_profile(&user_id));
    }
    replace_active_assignment(
        tables,
        &user_id,
        json!({
            "user_id": user_id,
            "tier": args["p_plan_tier"],
            "activation_reason": "trial",
            "is_active": true,
            "expires_at": args["p_trial_ends_at"]
        }),
    )?;
    Ok(Value::Object(updated.remove(0)))
}

/// Same writes as the installed `assign_usage_tier` function.
pub fn assign_usage_tier(tables: &mut Tables, args: &Value) -> Result<Value, StoreError> {
    let request: AssignUsageTier = decode_args(args)?;
    let user_id = request.p_user_id.to_string();
    let updated = tables.update(
        "profiles",
        &Filter::new().eq("id", user_id.as_str()),
        &row(json!({
            "plan_tier": args["p_tier"],
            "subscription_tier": args["p_tier"]
        })),
    )?;
    if updated.is_empty() {
        return Err(missing_profile(&user_id));
    }
    let assignment = replace_active_assignment(
        tables,
        &user_id,
        json!({
            "user_id": user_id,
            "tier": args["p_tier"],
            "activation_reason": args["p_reason"],
            "is_active": true,
            "expires_at": args["p_expires_at"]
        }),
    )?;
    Ok(Value::Object(assignment))
}

/// Wraps a store so the named columns hold text, the way a `text` column
/// coerces whatever scalar it is given.
pub struct TextColumns<'a> {
    pub inner: &'a InMemoryStore,
    pub columns: &'a [&'a str],
}

impl TextColumns<'_> {
    fn coerce(&self, fields: &Row) -> Row {
        fields
            .iter()
            .map(|(column, value)| {
                let value = if self.columns.contains(&column.as_str()) && !value.is_null() {
                    Value::String(filter_text(value))
                } else {
                    value.clone()
                };
                (column.clone(), value)
            })
            .collect()
    }
}

#[async_trait]
impl TabularStore for TextColumns<'_> {
    async fn select(
        &self,
        table: &str,
        columns: &Columns,
        filter: &Filter,
    ) -> Result<Vec<Row>, StoreError> {
        self.inner.select(table, columns, filter).await
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        fields: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        self.inner.update(table, filter, &self.coerce(fields)).await
    }

    async fn insert(&self, table: &str, fields: &Row) -> Result<Row, StoreError> {
        self.inner.insert(table, &self.coerce(fields)).await
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        self.inner.delete(table, filter).await
    }

    async fn call(&self, procedure: &str, args: &Value) -> Result<Value, StoreError> {
        self.inner.call(procedure, args).await
    }

    fn backend_name(&self) -> &'static str {
        "text-columns"
    }
}
