//! Renders structured queries into parameterized PostgreSQL.

use crate::config::Projection;
use crate::mapper::Row;
use crate::query::{DeleteQuery, InsertQuery, OrderBy, Predicate, SelectQuery, UpdateQuery};
use serde_json::Value;
use std::collections::HashMap;

/// Quote identifier for PostgreSQL (safe: only from config).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Per-table column types, used to cast bound parameters (e.g. `$1::uuid`).
#[derive(Clone, Debug, Default)]
pub struct TypeHints {
    by_table: HashMap<String, HashMap<String, String>>,
}

impl TypeHints {
    pub fn new(by_table: HashMap<String, HashMap<String, String>>) -> Self {
        TypeHints { by_table }
    }

    pub fn cast(&self, table: &str, column: &str) -> Option<&str> {
        self.by_table.get(table)?.get(column).map(String::as_str)
    }

    pub fn insert(&mut self, table: &str, column: &str, pg_type: &str) {
        self.by_table
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string(), pg_type.to_string());
    }

    /// Add hints for columns not hinted yet; existing entries win.
    pub fn merge_missing(&mut self, other: TypeHints) {
        for (table, columns) in other.by_table {
            let entry = self.by_table.entry(table).or_default();
            for (column, pg_type) in columns {
                entry.entry(column).or_insert(pg_type);
            }
        }
    }

    /// Numeric and custom enum (schema.typename) columns are read as `col::text` so they decode as strings.
    pub fn reads_as_text(&self, table: &str, column: &str) -> bool {
        self.cast(table, column)
            .is_some_and(|t| t == "numeric" || t.starts_with("numeric(") || t.contains('.'))
    }
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// SQL renderer bound to an optional default schema and the type hints of one deployment.
pub struct Renderer<'a> {
    schema: Option<&'a str>,
    hints: &'a TypeHints,
}

impl<'a> Renderer<'a> {
    pub fn new(schema: Option<&'a str>, hints: &'a TypeHints) -> Self {
        Renderer { schema, hints }
    }

    /// Full qualified table name. Tables declared as `schema.table` keep their own schema.
    fn table(&self, table: &str) -> String {
        match (table.split_once('.'), self.schema) {
            (Some((schema, name)), _) => format!("{}.{}", quoted(schema), quoted(name)),
            (None, Some(schema)) => format!("{}.{}", quoted(schema), quoted(table)),
            (None, None) => quoted(table),
        }
    }

    fn projection(&self, table: &str, p: &Projection) -> String {
        match p {
            Projection::All => "*".into(),
            Projection::Columns(cols) => cols
                .iter()
                .map(|c| {
                    let q = quoted(c);
                    if self.hints.reads_as_text(table, c) {
                        format!("{}::text AS {}", q, q)
                    } else {
                        q
                    }
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Bind a value and return its placeholder; nulls are rendered inline.
    fn value(&self, q: &mut QueryBuf, table: &str, column: &str, v: &Value) -> String {
        if v.is_null() {
            return "NULL".into();
        }
        let n = q.push_param(v.clone());
        self.hints
            .cast(table, column)
            .map(|t| format!("${}::{}", n, t))
            .unwrap_or_else(|| format!("${}", n))
    }

    fn predicate(&self, q: &mut QueryBuf, table: &str, p: &Predicate) -> String {
        match p {
            Predicate::Eq { column, value } if value.is_null() => format!("{} IS NULL", quoted(column)),
            Predicate::Eq { column, value } => {
                let ph = self.value(q, table, column, value);
                format!("{} = {}", quoted(column), ph)
            }
            Predicate::In { values, .. } if values.is_empty() => "1 = 0".into(),
            Predicate::In { column, values } => {
                let placeholders: Vec<String> = values.iter().map(|v| self.value(q, table, column, v)).collect();
                format!("{} IN ({})", quoted(column), placeholders.join(", "))
            }
            Predicate::Search { columns, .. } if columns.is_empty() => "1 = 1".into(),
            Predicate::Search { columns, term } => {
                let n = q.push_param(Value::String(like_pattern(term)));
                let parts: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{}::text ILIKE ${}", quoted(c), n))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }

    fn where_clause<'p>(
        &self,
        q: &mut QueryBuf,
        table: &str,
        preds: impl Iterator<Item = &'p Predicate>,
    ) -> String {
        let parts: Vec<String> = preds.map(|p| self.predicate(q, table, p)).collect();
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    fn order_clause(order: &[OrderBy]) -> String {
        if order.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = order
            .iter()
            .map(|o| format!("{} {}", quoted(&o.column), if o.descending { "DESC" } else { "ASC" }))
            .collect();
        format!(" ORDER BY {}", parts.join(", "))
    }

    pub fn select(&self, s: &SelectQuery) -> QueryBuf {
        let mut q = QueryBuf::new();
        let where_clause = self.where_clause(&mut q, &s.table, s.all_predicates());
        let limit_clause = s.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
        let offset_clause = s.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
        q.sql = format!(
            "SELECT {} FROM {}{}{}{}{}",
            self.projection(&s.table, &s.projection),
            self.table(&s.table),
            where_clause,
            Self::order_clause(&s.order),
            limit_clause,
            offset_clause
        );
        q
    }

    /// Exact count over the same WHERE as `select`, ignoring order and paging.
    pub fn count(&self, s: &SelectQuery) -> QueryBuf {
        let mut q = QueryBuf::new();
        let where_clause = self.where_clause(&mut q, &s.table, s.all_predicates());
        q.sql = format!(
            "SELECT COUNT(*) AS {} FROM {}{}",
            quoted("total"),
            self.table(&s.table),
            where_clause
        );
        q
    }

    pub fn insert(&self, i: &InsertQuery) -> QueryBuf {
        let mut q = QueryBuf::new();
        let mut cols = Vec::with_capacity(i.values.len());
        let mut placeholders = Vec::with_capacity(i.values.len());
        for (col, v) in &i.values {
            placeholders.push(self.value(&mut q, &i.table, col, v));
            cols.push(quoted(col));
        }
        q.sql = if cols.is_empty() {
            format!(
                "INSERT INTO {} DEFAULT VALUES RETURNING {}",
                self.table(&i.table),
                self.projection(&i.table, &i.returning)
            )
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                self.table(&i.table),
                cols.join(", "),
                placeholders.join(", "),
                self.projection(&i.table, &i.returning)
            )
        };
        q
    }

    fn keyed_where(&self, q: &mut QueryBuf, table: &str, key_column: &str, key: &Value, scope: &crate::query::ScopeFilter) -> String {
        let key_pred = Predicate::eq(key_column, key.clone());
        self.where_clause(q, table, std::iter::once(&key_pred).chain(scope.predicates()))
    }

    /// UPDATE by key, narrowed by scope. With nothing to set it degrades to a keyed SELECT.
    pub fn update(&self, u: &UpdateQuery) -> QueryBuf {
        let mut q = QueryBuf::new();
        let set: Row = u.set.iter().filter(|(k, _)| **k != u.key_column).map(|(k, v)| (k.clone(), v.clone())).collect();
        if set.is_empty() {
            let where_clause = self.keyed_where(&mut q, &u.table, &u.key_column, &u.key, &u.scope);
            q.sql = format!(
                "SELECT {} FROM {}{}",
                self.projection(&u.table, &u.returning),
                self.table(&u.table),
                where_clause
            );
            return q;
        }
        let sets: Vec<String> = set
            .iter()
            .map(|(k, v)| format!("{} = {}", quoted(k), self.value(&mut q, &u.table, k, v)))
            .collect();
        let where_clause = self.keyed_where(&mut q, &u.table, &u.key_column, &u.key, &u.scope);
        q.sql = format!(
            "UPDATE {} SET {}{} RETURNING {}",
            self.table(&u.table),
            sets.join(", "),
            where_clause,
            self.projection(&u.table, &u.returning)
        );
        q
    }

    pub fn delete(&self, d: &DeleteQuery) -> QueryBuf {
        let mut q = QueryBuf::new();
        let where_clause = self.keyed_where(&mut q, &d.table, &d.key_column, &d.key, &d.scope);
        q.sql = format!(
            "DELETE FROM {}{} RETURNING {}",
            self.table(&d.table),
            where_clause,
            self.projection(&d.table, &d.returning)
        );
        q
    }
}

/// `%term%` with LIKE metacharacters escaped (backslash is PostgreSQL's default escape).
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
