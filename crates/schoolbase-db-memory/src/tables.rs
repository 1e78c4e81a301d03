use std::collections::HashMap;

use schoolbase_storage::{Columns, Filter, RemoteErrorPayload, Row, StoreError, filter_text};
use serde_json::Value;

/// `child_table.child_column` references `parent_table.id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
}

/// Table contents plus the foreign keys enforced on delete.
///
/// Procedure handlers receive `&mut Tables` and use the same operations the
/// store exposes, so a handler sees its own writes immediately.
#[derive(Debug, Default)]
pub struct Tables {
    rows: HashMap<String, Vec<Row>>,
    foreign_keys: Vec<ForeignKey>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `table` if missing so selects return an empty set instead of 404.
    pub fn create_table(&mut self, table: &str) {
        self.rows.entry(table.to_string()).or_default();
    }

    pub fn add_foreign_key(&mut self, fk: ForeignKey) {
        self.create_table(&fk.child_table);
        self.create_table(&fk.parent_table);
        self.foreign_keys.push(fk);
    }

    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.rows.get(table).map(Vec::as_slice)
    }

    pub fn select(&self, table: &str, columns: &Columns, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        let rows = self.table(table)?;
        Ok(rows
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| columns.project(r))
            .collect())
    }

    pub fn update(&mut self, table: &str, filter: &Filter, fields: &Row) -> Result<Vec<Row>, StoreError> {
        filter.require_scoped("update", table)?;
        let rows = self.table_mut(table)?;
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|r| filter.matches(r)) {
            for (column, value) in fields {
                row.insert(column.clone(), value.clone());
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    pub fn insert(&mut self, table: &str, fields: &Row) -> Result<Row, StoreError> {
        let mut row = fields.clone();
        row.entry("id")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        let id = filter_text(&row["id"]);
        let rows = self.table_mut(table)?;
        if rows.iter().any(|r| r.get("id").map(filter_text).as_deref() == Some(id.as_str())) {
            return Err(StoreError::remote(
                409,
                RemoteErrorPayload::new(format!(
                    "duplicate key value violates unique constraint \"{table}_pkey\""
                ))
                .with_code("23505")
                .with_details(format!("Key (id)=({id}) already exists.")),
            ));
        }
        rows.push(row.clone());
        Ok(row)
    }

    pub fn delete(&mut self, table: &str, filter: &Filter) -> Result<Vec<Row>, StoreError> {
        filter.require_scoped("delete", table)?;
        let doomed: Vec<Row> = self
            .table(table)?
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        self.check_references(table, &doomed)?;

        let rows = self.table_mut(table)?;
        rows.retain(|r| !filter.matches(r));
        Ok(doomed)
    }

    fn check_references(&self, table: &str, doomed: &[Row]) -> Result<(), StoreError> {
        for fk in self.foreign_keys.iter().filter(|fk| fk.parent_table == table) {
            let children = self.rows.get(&fk.child_table).map(Vec::as_slice).unwrap_or(&[]);
            for parent in doomed {
                let Some(id) = parent.get("id").map(filter_text) else {
                    continue;
                };
                let referenced = children.iter().any(|c| {
                    c.get(&fk.child_column)
                        .is_some_and(|v| !v.is_null() && filter_text(v) == id)
                });
                if referenced {
                    return Err(StoreError::remote(
                        409,
                        RemoteErrorPayload::new(format!(
                            "update or delete on table \"{table}\" violates foreign key constraint \"{}_{}_fkey\" on table \"{}\"",
                            fk.child_table, fk.child_column, fk.child_table
                        ))
                        .with_code("23503")
                        .with_details(format!(
                            "Key (id)=({id}) is still referenced from table \"{}\".",
                            fk.child_table
                        )),
                    ));
                }
            }
        }
        Ok(())
    }

    fn table(&self, table: &str) -> Result<&Vec<Row>, StoreError> {
        self.rows.get(table).ok_or_else(|| missing_relation(table))
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut Vec<Row>, StoreError> {
        self.rows.get_mut(table).ok_or_else(|| missing_relation(table))
    }
}

fn missing_relation(table: &str) -> StoreError {
    StoreError::remote(
        404,
        RemoteErrorPayload::new(format!("relation \"public.{table}\" does not exist"))
            .with_code("42P01"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_assigns_id_and_rejects_duplicates() {
        let mut tables = Tables::new();
        tables.create_table("profiles");
        let inserted = tables.insert("profiles", &row(json!({"email": "a@b.c"}))).unwrap();
        assert!(inserted.get("id").is_some_and(Value::is_string));

        let again = row(json!({"id": inserted["id"].clone()}));
        let err = tables.insert("profiles", &again).unwrap_err();
        assert_eq!(err.payload().unwrap().code.as_deref(), Some("23505"));
    }

    #[test]
    fn test_unknown_table_is_a_remote_error() {
        let tables = Tables::new();
        let err = tables.select("nope", &Columns::All, &Filter::new()).unwrap_err();
        assert!(matches!(err, StoreError::Remote { status: 404, .. }));
    }

    #[test]
    fn test_delete_blocked_by_reference() {
        let mut tables = Tables::new();
        tables.add_foreign_key(ForeignKey {
            child_table: "students".into(),
            child_column: "guardian_id".into(),
            parent_table: "profiles".into(),
        });
        tables.insert("profiles", &row(json!({"id": "p1"}))).unwrap();
        tables.insert("profiles", &row(json!({"id": "p2"}))).unwrap();
        tables
            .insert("students", &row(json!({"id": "s1", "guardian_id": "p1"})))
            .unwrap();

        let err = tables
            .delete("profiles", &Filter::new().is_in("id", ["p1", "p2"]))
            .unwrap_err();
        assert!(err.payload().unwrap().is_constraint_violation());
        assert_eq!(tables.rows("profiles").unwrap().len(), 2);

        let deleted = tables.delete("profiles", &Filter::new().eq("id", "p2")).unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(tables.rows("profiles").unwrap().len(), 1);
    }
}
