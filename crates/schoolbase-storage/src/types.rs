//! Row, column and filter types shared by every backend.

use serde_json::Value;
use std::fmt;

use crate::error::StoreError;

/// One table row as returned by the store: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

/// Column projection for a select.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Columns {
    #[default]
    All,
    Only(Vec<String>),
}

impl Columns {
    pub fn only<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(columns.into_iter().map(Into::into).collect())
    }

    /// The `select=` expression understood by the REST gateway.
    pub fn to_select(&self) -> String {
        match self {
            Columns::All => "*".to_string(),
            Columns::Only(cols) if cols.is_empty() => "*".to_string(),
            Columns::Only(cols) => cols.join(","),
        }
    }

    /// Keeps only the projected columns of `row`.
    pub fn project(&self, row: &Row) -> Row {
        match self {
            Columns::All => row.clone(),
            Columns::Only(cols) if cols.is_empty() => row.clone(),
            Columns::Only(cols) => cols
                .iter()
                .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                .collect(),
        }
    }
}

/// Comparison applied to a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(Value),
    In(Vec<Value>),
    IsNull,
}

/// `column op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: FilterOp,
}

impl Condition {
    /// Value in the REST gateway's `op.value` syntax.
    pub fn to_query_value(&self) -> String {
        match &self.op {
            FilterOp::Eq(v) => format!("eq.{}", filter_text(v)),
            FilterOp::In(values) => {
                let items: Vec<String> = values.iter().map(quote_list_item).collect();
                format!("in.({})", items.join(","))
            }
            FilterOp::IsNull => "is.null".to_string(),
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(&self.column).unwrap_or(&Value::Null);
        match &self.op {
            FilterOp::Eq(v) => !cell.is_null() && filter_text(cell) == filter_text(v),
            FilterOp::In(values) => {
                !cell.is_null() && values.iter().any(|v| filter_text(cell) == filter_text(v))
            }
            FilterOp::IsNull => cell.is_null(),
        }
    }
}

/// Conjunction of column conditions.
///
/// The store compares filter values as text, so `Filter::new().eq("id", 7)`
/// and `Filter::new().eq("id", "7")` select the same rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op: FilterOp::Eq(value.into()),
        });
        self
    }

    #[must_use]
    pub fn is_in<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.push(Condition {
            column: column.into(),
            op: FilterOp::In(values.into_iter().map(Into::into).collect()),
        });
        self
    }

    #[must_use]
    pub fn is_null(mut self, column: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            column: column.into(),
            op: FilterOp::IsNull,
        });
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    /// Refuses `operation` on `table` when the filter would touch every row.
    pub fn require_scoped(&self, operation: &str, table: &str) -> Result<(), StoreError> {
        if self.is_empty() {
            return Err(StoreError::invalid_request(format!(
                "refusing unscoped {operation} on table {table}"
            )));
        }
        Ok(())
    }

    /// `(column, op.value)` pairs for a query string.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.conditions
            .iter()
            .map(|c| (c.column.clone(), c.to_query_value()))
            .collect()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "<all rows>");
        }
        let parts: Vec<String> = self
            .conditions
            .iter()
            .map(|c| format!("{}={}", c.column, c.to_query_value()))
            .collect();
        write!(f, "{}", parts.join("&"))
    }
}

/// Text form of a JSON value as the store compares it in filters.
pub fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn quote_list_item(value: &Value) -> String {
    let text = filter_text(value);
    if text.contains([',', '(', ')', '"', ' ', '\\']) {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_query_values() {
        let filter = Filter::new()
            .eq("email", "jane@example.com")
            .is_in("id", ["a", "b"])
            .is_null("deleted_at");
        assert_eq!(
            filter.to_query_pairs(),
            vec![
                ("email".to_string(), "eq.jane@example.com".to_string()),
                ("id".to_string(), "in.(a,b)".to_string()),
                ("deleted_at".to_string(), "is.null".to_string()),
            ]
        );
    }

    #[test]
    fn test_in_list_quotes_reserved_characters() {
        let filter = Filter::new().is_in("name", ["Doe, Jane", "plain"]);
        assert_eq!(filter.to_query_pairs()[0].1, "in.(\"Doe, Jane\",plain)");
    }

    #[test]
    fn test_matches_compares_as_text() {
        let r = row(json!({"id": 7, "email": "a@b.c", "deleted_at": null}));
        assert!(Filter::new().eq("id", "7").matches(&r));
        assert!(Filter::new().eq("id", 7).is_null("deleted_at").matches(&r));
        assert!(!Filter::new().eq("email", "x@y.z").matches(&r));
        assert!(Filter::new().is_in("id", [1, 7]).matches(&r));
        assert!(!Filter::new().eq("missing", "null").matches(&r));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let r = row(json!({"id": 1}));
        assert!(Filter::new().matches(&r));
        assert_eq!(Filter::new().to_string(), "<all rows>");
        assert!(Filter::new().require_scoped("delete", "profiles").is_err());
        assert!(Filter::new().eq("id", 1).require_scoped("delete", "profiles").is_ok());
    }

    #[test]
    fn test_columns_projection() {
        let r = row(json!({"id": 1, "email": "a@b.c", "role": "parent"}));
        let cols = Columns::only(["id", "role"]);
        assert_eq!(cols.to_select(), "id,role");
        assert_eq!(Value::Object(cols.project(&r)), json!({"id": 1, "role": "parent"}));
        assert_eq!(Columns::All.to_select(), "*");
    }
}
