use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use schoolbase_storage::{Columns, Filter, RemoteErrorPayload, Row, StoreError, TabularStore};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::tables::{ForeignKey, Tables};

/// Server-side logic for a named procedure.
///
/// Handlers run under the store's write lock: either all of their writes land
/// or, when they return an error, they must not have written anything.
pub type ProcedureHandler =
    Arc<dyn Fn(&mut Tables, &Value) -> Result<Value, StoreError> + Send + Sync>;

/// What kind of call reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Select,
    Update,
    Insert,
    Delete,
    Call,
}

impl OperationKind {
    pub fn is_write(&self) -> bool {
        !matches!(self, OperationKind::Select)
    }
}

/// One journaled call: kind plus table or procedure name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub target: String,
}

/// In-memory store backend.
///
/// Every call is journaled, including calls that fail, so tests can assert
/// exactly which requests a run issued.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    procedures: RwLock<HashMap<String, ProcedureHandler>>,
    journal: Mutex<Vec<Operation>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish_non_exhaustive()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
            procedures: RwLock::new(HashMap::new()),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Appends rows to `table`, creating it if needed. Seeding is not journaled.
    ///
    /// # Panics
    ///
    /// Panics if a seed value is not a JSON object or duplicates an id.
    pub async fn seed(&self, table: &str, rows: Vec<Value>) {
        let mut tables = self.tables.write().await;
        tables.create_table(table);
        for value in rows {
            let row = match value {
                Value::Object(row) => row,
                other => panic!("seed rows must be JSON objects, got {other}"),
            };
            if let Err(e) = tables.insert(table, &row) {
                panic!("invalid seed for {table}: {e}");
            }
        }
    }

    pub async fn create_table(&self, table: &str) {
        self.tables.write().await.create_table(table);
    }

    pub async fn add_foreign_key(&self, fk: ForeignKey) {
        self.tables.write().await.add_foreign_key(fk);
    }

    pub async fn register_procedure<F>(&self, name: &str, handler: F)
    where
        F: Fn(&mut Tables, &Value) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        self.procedures
            .write()
            .await
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Current contents of `table`, bypassing the journal.
    pub async fn dump(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .rows(table)
            .map(<[Row]>::to_vec)
            .unwrap_or_default()
    }

    pub fn journal(&self) -> Vec<Operation> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    /// Number of journaled calls that could have mutated data.
    pub fn write_count(&self) -> usize {
        self.journal().iter().filter(|op| op.kind.is_write()).count()
    }

    fn record(&self, kind: OperationKind, target: &str) {
        tracing::trace!(?kind, target, "memory store call");
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(Operation {
                kind,
                target: target.to_string(),
            });
        }
    }
}

#[async_trait]
impl TabularStore for InMemoryStore {
    async fn select(
        &self,
        table: &str,
        columns: &Columns,
        filter: &Filter,
    ) -> Result<Vec<Row>, StoreError> {
        self.record(OperationKind::Select, table);
        self.tables.read().await.select(table, columns, filter)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        fields: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        self.record(OperationKind::Update, table);
        self.tables.write().await.update(table, filter, fields)
    }

    async fn insert(&self, table: &str, fields: &Row) -> Result<Row, StoreError> {
        self.record(OperationKind::Insert, table);
        self.tables.write().await.insert(table, fields)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        self.record(OperationKind::Delete, table);
        self.tables.write().await.delete(table, filter)
    }

    async fn call(&self, procedure: &str, args: &Value) -> Result<Value, StoreError> {
        self.record(OperationKind::Call, procedure);
        let handler = self.procedures.read().await.get(procedure).cloned();
        let Some(handler) = handler else {
            return Err(StoreError::remote(
                404,
                RemoteErrorPayload::new(format!(
                    "Could not find the function public.{procedure} in the schema cache"
                ))
                .with_code("PGRST202"),
            ));
        };
        let mut tables = self.tables.write().await;
        handler(&mut *tables, args)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_select_update_round() {
        let store = InMemoryStore::new();
        store
            .seed("profiles", vec![json!({"id": "u1", "first_name": null})])
            .await;

        let mut fields = Row::new();
        fields.insert("first_name".into(), json!("Jane"));
        let updated = store
            .update("profiles", &Filter::new().eq("id", "u1"), &fields)
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["first_name"], json!("Jane"));

        let rows = store
            .select("profiles", &Columns::only(["first_name"]), &Filter::new().eq("id", "u1"))
            .await
            .unwrap();
        assert_eq!(Value::Object(rows[0].clone()), json!({"first_name": "Jane"}));
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_unscoped_update_is_refused() {
        let store = InMemoryStore::new();
        store.seed("profiles", vec![json!({"id": "u1"})]).await;
        let err = store
            .update("profiles", &Filter::new(), &Row::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_unknown_procedure() {
        let store = InMemoryStore::new();
        let err = store.call("start_trial", &json!({})).await.unwrap_err();
        assert_eq!(err.payload().unwrap().code.as_deref(), Some("PGRST202"));
        assert_eq!(
            store.journal(),
            vec![Operation {
                kind: OperationKind::Call,
                target: "start_trial".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_procedure_sees_tables() {
        let store = InMemoryStore::new();
        store.seed("profiles", vec![json!({"id": "u1", "is_trial": false})]).await;
        store
            .register_procedure("flip_trial", |tables, args| {
                let id = args["p_user_id"].clone();
                let mut fields = Row::new();
                fields.insert("is_trial".into(), json!(true));
                let rows = tables.update("profiles", &Filter::new().eq("id", id), &fields)?;
                Ok(json!(rows.len()))
            })
            .await;

        let result = store.call("flip_trial", &json!({"p_user_id": "u1"})).await.unwrap();
        assert_eq!(result, json!(1));
        assert_eq!(store.dump("profiles").await[0]["is_trial"], json!(true));
    }
}
