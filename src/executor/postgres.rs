//! PostgreSQL adapter: renders structured queries and maps result rows to JSON.

use crate::error::{AppError, StorageError};
use crate::executor::QueryExecutor;
use crate::mapper::Row;
use crate::query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use crate::sql::{catalog_hints, CatalogColumn, PgBindValue, QueryBuf, Renderer, TypeHints};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

#[derive(Clone, Debug)]
pub struct PgExecutor {
    pool: PgPool,
    schema: Option<String>,
    hints: TypeHints,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgExecutor {
            pool,
            schema: None,
            hints: TypeHints::default(),
        }
    }

    /// Qualify unqualified table names with this schema.
    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_type_hints(mut self, hints: TypeHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Merge column types from the catalog for `tables` under the hints already set.
    /// Declared hints win over discovered ones.
    pub async fn discover_type_hints(mut self, tables: &[String]) -> Result<Self, AppError> {
        let default_schema = match &self.schema {
            Some(s) => s.clone(),
            None => sqlx::query_scalar::<_, String>("SELECT current_schema()::text")
                .fetch_one(&self.pool)
                .await
                .map_err(StorageError::from)?,
        };
        let names: Vec<String> = tables
            .iter()
            .map(|t| t.split_once('.').map_or(t.as_str(), |(_, n)| n).to_string())
            .collect();
        let rows: Vec<(String, String, String, String, String, String)> = sqlx::query_as(
            "SELECT table_schema::text, table_name::text, column_name::text, data_type::text, \
             udt_schema::text, udt_name::text FROM information_schema.columns WHERE table_name = ANY($1)",
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::from)?;
        let columns: Vec<CatalogColumn> = rows
            .into_iter()
            .map(|(table_schema, table_name, column_name, data_type, udt_schema, udt_name)| CatalogColumn {
                table_schema,
                table_name,
                column_name,
                data_type,
                udt_schema,
                udt_name,
            })
            .collect();
        self.hints.merge_missing(catalog_hints(tables, &default_schema, &columns));
        tracing::debug!(tables = tables.len(), columns = columns.len(), "type hints discovered");
        Ok(self)
    }

    fn renderer(&self) -> Renderer<'_> {
        Renderer::new(self.schema.as_deref(), &self.hints)
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await.map_err(StorageError::from)?;
        Ok(rows.iter().map(row_to_json).collect::<Result<Vec<_>, StorageError>>()?)
    }

    async fn query_optional(&self, q: &QueryBuf) -> Result<Option<Row>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&self.pool).await.map_err(StorageError::from)?;
        Ok(row.as_ref().map(row_to_json).transpose()?)
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, AppError> {
        let q = self.renderer().select(query);
        self.query_many(&q).await
    }

    async fn count(&self, query: &SelectQuery) -> Result<u64, AppError> {
        let q = self.renderer().count(query);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut scalar = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            scalar = scalar.bind(PgBindValue::from_json(p));
        }
        let n = scalar.fetch_one(&self.pool).await.map_err(StorageError::from)?;
        Ok(n.max(0) as u64)
    }

    async fn insert(&self, query: &InsertQuery) -> Result<Row, AppError> {
        let q = self.renderer().insert(query);
        self.query_optional(&q)
            .await?
            .ok_or_else(|| AppError::Storage(StorageError::new("insert returned no row")))
    }

    async fn update(&self, query: &UpdateQuery) -> Result<Option<Row>, AppError> {
        let q = self.renderer().update(query);
        self.query_optional(&q).await
    }

    async fn delete(&self, query: &DeleteQuery) -> Result<Option<Row>, AppError> {
        let q = self.renderer().delete(query);
        self.query_optional(&q).await
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Result<Row, StorageError> {
    use sqlx::Column;
    use sqlx::Row as _;
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name)?);
    }
    Ok(map)
}

/// Decode one cell. SQL NULL is JSON null; a type with no JSON decoding is an error, never null.
fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Result<Value, StorageError> {
    use sqlx::{Row as _, TypeInfo, ValueRef};
    let raw = row.try_get_raw(name).map_err(StorageError::from)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    if let Ok(n) = row.try_get::<i16, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<i32, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<i64, _>(name) {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = row.try_get::<f32, _>(name) {
        return Ok(float(f64::from(n)));
    }
    if let Ok(n) = row.try_get::<f64, _>(name) {
        return Ok(float(n));
    }
    if let Ok(b) = row.try_get::<bool, _>(name) {
        return Ok(Value::Bool(b));
    }
    if let Ok(u) = row.try_get::<uuid::Uuid, _>(name) {
        return Ok(Value::String(u.to_string()));
    }
    if let Ok(d) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(name) {
        return Ok(Value::String(d.to_rfc3339()));
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDateTime, _>(name) {
        return Ok(Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()));
    }
    if let Ok(d) = row.try_get::<chrono::NaiveDate, _>(name) {
        return Ok(Value::String(d.format("%Y-%m-%d").to_string()));
    }
    if let Ok(s) = row.try_get::<String, _>(name) {
        return Ok(Value::String(s));
    }
    if let Ok(j) = row.try_get::<serde_json::Value, _>(name) {
        return Ok(j);
    }
    if let Ok(items) = row.try_get::<Vec<String>, _>(name) {
        return Ok(Value::Array(items.into_iter().map(Value::String).collect()));
    }
    Err(StorageError::new(format!(
        "column '{}' has type {} with no JSON decoding; hint it in column_types or cast it to text",
        name, type_name
    )))
}

/// Non-finite floats have no JSON form.
fn float(n: f64) -> Value {
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}
