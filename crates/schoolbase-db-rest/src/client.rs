use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use schoolbase_storage::{Columns, Filter, RemoteErrorPayload, Row, StoreError, TabularStore};
use serde_json::Value;

use crate::config::RestConfig;

/// Store client speaking the REST gateway protocol.
///
/// One instance per run; nothing is cached between calls.
pub struct RestStore {
    http: reqwest::Client,
    config: RestConfig,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.config.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl RestStore {
    pub fn new(config: RestConfig) -> Result<Self, StoreError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("schoolbase/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| StoreError::connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let key = self.config.service_key.expose();
        let mut req = self
            .http
            .request(method, url)
            .header("apikey", key)
            .bearer_auth(key)
            .header("Accept", "application/json");
        if let Some(schema) = &self.config.schema {
            req = req
                .header("Accept-Profile", schema)
                .header("Content-Profile", schema);
        }
        req
    }

    fn table_request(&self, method: Method, table: &str, filter: &Filter) -> RequestBuilder {
        let url = self.config.endpoint(table);
        self.request(method, &url).query(&filter.to_query_pairs())
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Value, StoreError> {
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::connection(format!("{what}: {e}")))?;
        handle_response(resp).await
    }
}

#[async_trait]
impl TabularStore for RestStore {
    async fn select(
        &self,
        table: &str,
        columns: &Columns,
        filter: &Filter,
    ) -> Result<Vec<Row>, StoreError> {
        tracing::debug!(table, filter = %filter, "select");
        let req = self
            .table_request(Method::GET, table, filter)
            .query(&[("select", columns.to_select())]);
        let body = self.send(req, "select").await?;
        into_rows(body)
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        fields: &Row,
    ) -> Result<Vec<Row>, StoreError> {
        filter.require_scoped("update", table)?;
        tracing::debug!(table, filter = %filter, columns = fields.len(), "update");
        let req = self
            .table_request(Method::PATCH, table, filter)
            .header("Prefer", "return=representation")
            .json(fields);
        let body = self.send(req, "update").await?;
        into_rows(body)
    }

    async fn insert(&self, table: &str, fields: &Row) -> Result<Row, StoreError> {
        tracing::debug!(table, columns = fields.len(), "insert");
        let url = self.config.endpoint(table);
        let req = self
            .request(Method::POST, &url)
            .header("Prefer", "return=representation")
            .json(fields);
        let body = self.send(req, "insert").await?;
        into_rows(body)?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::decode(format!("insert into {table} returned no row")))
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        filter.require_scoped("delete", table)?;
        tracing::debug!(table, filter = %filter, "delete");
        let req = self
            .table_request(Method::DELETE, table, filter)
            .header("Prefer", "return=representation");
        let body = self.send(req, "delete").await?;
        into_rows(body)
    }

    async fn call(&self, procedure: &str, args: &Value) -> Result<Value, StoreError> {
        if !args.is_object() {
            return Err(StoreError::invalid_request(format!(
                "arguments for {procedure} must be a JSON object"
            )));
        }
        tracing::debug!(procedure, "rpc");
        let url = self.config.endpoint(&format!("rpc/{procedure}"));
        let req = self.request(Method::POST, &url).json(args);
        self.send(req, "rpc").await
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

async fn handle_response(resp: Response) -> Result<Value, StoreError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| StoreError::connection(format!("failed to read response body: {e}")))?;

    if !status.is_success() {
        return Err(StoreError::remote(
            status.as_u16(),
            RemoteErrorPayload::from_body(&body),
        ));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| StoreError::decode(format!("response is not valid JSON: {e}")))
}

fn into_rows(body: Value) -> Result<Vec<Row>, StoreError> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(StoreError::decode(format!("expected a row object, got {other}"))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(StoreError::decode(format!("expected an array of rows, got {other}"))),
    }
}
