//! In-process adapter for tests and local runs. Evaluates structured queries over JSON rows
//! and records every call so round-trip counts can be asserted.

use crate::config::Projection;
use crate::error::{AppError, StorageError};
use crate::executor::QueryExecutor;
use crate::mapper::Row;
use crate::query::{DeleteQuery, InsertQuery, OrderBy, Predicate, ScopeFilter, SelectQuery, UpdateQuery};
use crate::value::compare_directed;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Count,
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedQuery {
    pub kind: QueryKind,
    pub table: String,
}

#[derive(Debug, Default)]
pub struct MemoryExecutor {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    log: Mutex<Vec<ExecutedQuery>>,
    failing: RwLock<HashSet<String>>,
}

fn lock_err() -> AppError {
    AppError::Storage(StorageError::new("memory store lock poisoned"))
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table from JSON objects; non-object values are ignored.
    pub fn with_table(self, table: &str, rows: Vec<Value>) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            let rows = rows.into_iter().filter_map(|v| v.as_object().cloned()).collect();
            tables.insert(table.to_string(), rows);
        }
        self
    }

    /// Make every query against `table` fail with a storage error.
    pub fn fail_table(&self, table: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(table.to_string());
        }
    }

    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn clear_log(&self) {
        if let Ok(mut l) = self.log.lock() {
            l.clear();
        }
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .ok()
            .and_then(|t| t.get(table).cloned())
            .unwrap_or_default()
    }

    fn record(&self, kind: QueryKind, table: &str) -> Result<(), AppError> {
        self.log.lock().map_err(|_| lock_err())?.push(ExecutedQuery {
            kind,
            table: table.to_string(),
        });
        if self.failing.read().map_err(|_| lock_err())?.contains(table) {
            return Err(AppError::Storage(StorageError::new(format!("relation \"{}\" is unavailable", table))));
        }
        Ok(())
    }

    fn matching(&self, query: &SelectQuery) -> Result<Vec<Row>, AppError> {
        let tables = self.tables.read().map_err(|_| lock_err())?;
        let rows = tables.get(&query.table).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .filter(|r| query.all_predicates().all(|p| matches(r, p)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QueryExecutor for MemoryExecutor {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, AppError> {
        self.record(QueryKind::Select, &query.table)?;
        let mut rows = self.matching(query)?;
        rows.sort_by(|a, b| compare_rows(a, b, &query.order));
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| project(&r, &query.projection))
            .collect())
    }

    async fn count(&self, query: &SelectQuery) -> Result<u64, AppError> {
        self.record(QueryKind::Count, &query.table)?;
        Ok(self.matching(query)?.len() as u64)
    }

    async fn insert(&self, query: &InsertQuery) -> Result<Row, AppError> {
        self.record(QueryKind::Insert, &query.table)?;
        let mut row = query.values.clone();
        if row.get(&query.key_column).map_or(true, Value::is_null) {
            row.insert(query.key_column.clone(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
        let mut tables = self.tables.write().map_err(|_| lock_err())?;
        tables.entry(query.table.clone()).or_default().push(row.clone());
        Ok(project(&row, &query.returning))
    }

    async fn update(&self, query: &UpdateQuery) -> Result<Option<Row>, AppError> {
        self.record(QueryKind::Update, &query.table)?;
        let mut tables = self.tables.write().map_err(|_| lock_err())?;
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(None);
        };
        let found = rows
            .iter_mut()
            .find(|r| keyed_match(r, &query.key_column, &query.key, &query.scope));
        Ok(found.map(|row| {
            for (k, v) in &query.set {
                if *k != query.key_column {
                    row.insert(k.clone(), v.clone());
                }
            }
            project(row, &query.returning)
        }))
    }

    async fn delete(&self, query: &DeleteQuery) -> Result<Option<Row>, AppError> {
        self.record(QueryKind::Delete, &query.table)?;
        let mut tables = self.tables.write().map_err(|_| lock_err())?;
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(None);
        };
        let pos = rows
            .iter()
            .position(|r| keyed_match(r, &query.key_column, &query.key, &query.scope));
        Ok(pos.map(|i| project(&rows.remove(i), &query.returning)))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

fn keyed_match(row: &Row, key_column: &str, key: &Value, scope: &ScopeFilter) -> bool {
    loose_eq(row.get(key_column).unwrap_or(&Value::Null), key) && scope.predicates().all(|p| matches(row, p))
}

fn project(row: &Row, projection: &Projection) -> Row {
    match projection {
        Projection::All => row.clone(),
        Projection::Columns(cols) => cols
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
            .collect(),
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Equality with the implicit casts the SQL adapter gets from PostgreSQL (e.g. "7" = 7).
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(_), Value::String(_)) | (Value::Bool(_), Value::Bool(_)) => a == b,
        _ => match (text_of(a), text_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

fn matches(row: &Row, p: &Predicate) -> bool {
    match p {
        Predicate::Eq { column, value } if value.is_null() => row.get(column).map_or(true, Value::is_null),
        Predicate::Eq { column, value } => row.get(column).is_some_and(|v| loose_eq(v, value)),
        Predicate::In { column, values } => row
            .get(column)
            .is_some_and(|v| values.iter().any(|x| loose_eq(v, x))),
        Predicate::Search { columns, term } => {
            let needle = term.to_lowercase();
            columns.iter().any(|c| {
                row.get(c)
                    .and_then(text_of)
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
            })
        }
    }
}

fn compare_rows(a: &Row, b: &Row, order: &[OrderBy]) -> Ordering {
    for o in order {
        let x = a.get(&o.column).unwrap_or(&Value::Null);
        let y = b.get(&o.column).unwrap_or(&Value::Null);
        let ord = compare_directed(x, y, o.descending);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryExecutor {
        MemoryExecutor::new().with_table(
            "widgets",
            vec![
                json!({ "id": 1, "name": "Bolt", "rank": 2 }),
                json!({ "id": 2, "name": "nut", "rank": null }),
                json!({ "id": 3, "name": "Washer", "rank": 1 }),
            ],
        )
    }

    #[tokio::test]
    async fn sorts_with_nulls_last_ascending_and_first_descending() {
        let s = store();
        let q = SelectQuery::new("widgets", Projection::parse("id")).order_by("rank", false);
        let ids: Vec<Value> = s.select(&q).await.unwrap().into_iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(1), json!(2)]);
        let q = SelectQuery::new("widgets", Projection::parse("id")).order_by("rank", true);
        let ids: Vec<Value> = s.select(&q).await.unwrap().into_iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(1), json!(3)]);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_eq_casts() {
        let s = store();
        let q = SelectQuery::new("widgets", Projection::All).filter(Predicate::Search {
            columns: vec!["name".into()],
            term: "NU".into(),
        });
        assert_eq!(s.select(&q).await.unwrap().len(), 1);
        let q = SelectQuery::new("widgets", Projection::All).filter(Predicate::eq("id", json!("3")));
        assert_eq!(s.select(&q).await.unwrap()[0]["name"], json!("Washer"));
    }

    #[tokio::test]
    async fn failing_table_surfaces_storage_error() {
        let s = store();
        s.fail_table("widgets");
        let q = SelectQuery::new("widgets", Projection::All);
        assert!(matches!(s.select(&q).await, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn records_each_round_trip() {
        let s = store();
        let q = SelectQuery::new("widgets", Projection::All).limit(1);
        let (rows, total) = s.select_counted(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(total, 3);
        assert_eq!(
            s.executed(),
            vec![
                ExecutedQuery { kind: QueryKind::Select, table: "widgets".into() },
                ExecutedQuery { kind: QueryKind::Count, table: "widgets".into() },
            ]
        );
    }

    #[tokio::test]
    async fn insert_generates_the_declared_key_column() {
        let s = MemoryExecutor::new();
        let i = InsertQuery {
            table: "stock".into(),
            key_column: "sku".into(),
            values: json!({ "quantity": 4 }).as_object().cloned().unwrap(),
            returning: Projection::All,
        };
        let row = s.insert(&i).await.unwrap();
        assert!(row["sku"].is_string());
        assert!(!row.contains_key("id"));

        let i = InsertQuery {
            values: json!({ "sku": "S-1" }).as_object().cloned().unwrap(),
            ..i
        };
        assert_eq!(s.insert(&i).await.unwrap()["sku"], json!("S-1"));
    }
}
