//! The store contract every backend implements.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::types::{Columns, Filter, Row};

/// Capability-scoped client for the remote tabular store.
///
/// Every call is a single request. Implementations do not retry, pool or
/// cache; callers await one call at a time. Implementations must be
/// thread-safe (`Send + Sync`) so a client can live behind an `Arc`.
///
/// # Example
///
/// ```ignore
/// use schoolbase_storage::{Filter, TabularStore, StoreError};
///
/// async fn clear_trial(store: &dyn TabularStore, id: &str) -> Result<(), StoreError> {
///     let mut fields = Row::new();
///     fields.insert("is_trial".into(), false.into());
///     store.update("profiles", &Filter::new().eq("id", id), &fields).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Returns every row of `table` matching `filter`, projected to `columns`.
    ///
    /// An empty result is not an error.
    async fn select(
        &self,
        table: &str,
        columns: &Columns,
        filter: &Filter,
    ) -> Result<Vec<Row>, StoreError>;

    /// Sets `fields` on every row matching `filter` and returns the updated rows.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRequest` when `filter` is empty; unscoped
    /// updates are never sent.
    async fn update(&self, table: &str, filter: &Filter, fields: &Row)
    -> Result<Vec<Row>, StoreError>;

    /// Inserts one row and returns it as stored.
    async fn insert(&self, table: &str, fields: &Row) -> Result<Row, StoreError>;

    /// Deletes every row matching `filter` and returns the deleted rows.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRequest` when `filter` is empty.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError>;

    /// Invokes a remote procedure with named arguments.
    ///
    /// `args` must be a JSON object whose keys match the procedure's declared
    /// parameter names.
    async fn call(&self, procedure: &str, args: &Value) -> Result<Value, StoreError>;

    /// Returns the name of this backend for logging.
    fn backend_name(&self) -> &'static str;
}

