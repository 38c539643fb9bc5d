//! The one interface the engine talks to the backing store through.
//! A deployment wires exactly one adapter at startup.

mod memory;
mod postgres;

pub use memory::{ExecutedQuery, MemoryExecutor, QueryKind};
pub use postgres::PgExecutor;

use crate::error::AppError;
use crate::mapper::Row;
use crate::query::{DeleteQuery, InsertQuery, SelectQuery, UpdateQuery};
use async_trait::async_trait;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Row>, AppError>;

    /// Exact number of rows matching the query's predicates, ignoring order and paging.
    async fn count(&self, query: &SelectQuery) -> Result<u64, AppError>;

    /// One page of rows plus the exact total.
    async fn select_counted(&self, query: &SelectQuery) -> Result<(Vec<Row>, u64), AppError> {
        let rows = self.select(query).await?;
        let total = self.count(query).await?;
        Ok((rows, total))
    }

    async fn insert(&self, query: &InsertQuery) -> Result<Row, AppError>;

    /// Updated row, or `None` when no row matched key and scope.
    async fn update(&self, query: &UpdateQuery) -> Result<Option<Row>, AppError>;

    /// Deleted row, or `None` when no row matched key and scope.
    async fn delete(&self, query: &DeleteQuery) -> Result<Option<Row>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}
