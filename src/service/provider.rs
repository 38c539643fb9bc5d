//! Generic resource provider: scoped list/get plus privileged writes for any registered resource.

use crate::config::{is_valid_column, RelationSpec, ResourceConfig};
use crate::error::AppError;
use crate::executor::QueryExecutor;
use crate::identity::CallerIdentityContext;
use crate::mapper::Row;
use crate::query::{DeleteQuery, InsertQuery, Predicate, SelectQuery, UpdateQuery};
use crate::scope::ScopePolicy;
use crate::service::hydration::hydrate;
use crate::service::ExecutionMode;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Requested ordering: `col`, `-col` or `col:desc` (`col:asc` also accepted).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortParam {
    pub column: String,
    pub descending: bool,
}

impl SortParam {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        let s = s.trim();
        let (column, descending) = if let Some(rest) = s.strip_prefix('-') {
            (rest, true)
        } else if let Some((col, dir)) = s.split_once(':') {
            match dir.to_lowercase().as_str() {
                "desc" => (col, true),
                "asc" => (col, false),
                _ => return Err(AppError::Usage(format!("invalid sort direction: {}", dir))),
            }
        } else {
            (s, false)
        };
        if column.is_empty() {
            return Err(AppError::Usage("sort column is empty".into()));
        }
        Ok(SortParam {
            column: column.to_string(),
            descending,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListParams {
    /// 1-indexed.
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub q: Option<String>,
    /// Column → value; an array value matches any of its elements.
    pub filters: Vec<(String, Value)>,
    pub active_only: bool,
    pub sort: Option<String>,
    /// Relations to hydrate in addition to the default ones.
    pub include: Vec<String>,
}

impl ListParams {
    fn pagination(&self) -> Result<(u32, u32), AppError> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page < 1 {
            return Err(AppError::Usage("page must be >= 1".into()));
        }
        if page_size < 1 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Usage(format!("pageSize must be between 1 and {}", MAX_PAGE_SIZE)));
        }
        Ok((page, page_size))
    }
}

#[derive(Debug, Serialize)]
pub struct ListPage {
    pub rows: Vec<Value>,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    pub total: u64,
}

/// One provider serves every resource; the config is passed per call.
#[derive(Clone)]
pub struct ResourceProvider {
    executor: Arc<dyn QueryExecutor>,
    policy: ScopePolicy,
    mode: ExecutionMode,
}

impl ResourceProvider {
    pub fn new(executor: Arc<dyn QueryExecutor>, policy: ScopePolicy, mode: ExecutionMode) -> Self {
        ResourceProvider { executor, policy, mode }
    }

    pub fn policy(&self) -> ScopePolicy {
        self.policy
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub async fn list(
        &self,
        config: &ResourceConfig,
        ctx: &CallerIdentityContext,
        params: &ListParams,
    ) -> Result<ListPage, AppError> {
        let (page, page_size) = params.pagination()?;
        let relations = select_relations(config, &params.include)?;
        let mut query = SelectQuery::new(&config.table, config.read_projection());

        for (column, value) in &params.filters {
            check_column(config, column, "filter")?;
            query = query.filter(match value {
                Value::Array(values) => Predicate::any_of(column, values.clone()),
                v => Predicate::eq(column, v.clone()),
            });
        }
        if let Some(term) = params.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            if !config.search_columns.is_empty() {
                query = query.filter(Predicate::Search {
                    columns: config.search_columns.clone(),
                    term: term.to_string(),
                });
            }
        }
        if params.active_only {
            let column = config.active_flag_column.as_deref().ok_or_else(|| {
                AppError::Usage(format!("resource '{}' has no active flag column", config.key))
            })?;
            query = query.filter(Predicate::eq(column, Value::Bool(true)));
        }

        let sort = match params.sort.as_deref().filter(|s| !s.trim().is_empty()) {
            Some(s) => {
                let sort = SortParam::parse(s)?;
                check_column(config, &sort.column, "sort")?;
                Some(sort)
            }
            None => config.default_sort.as_ref().map(|s| SortParam {
                column: s.column.clone(),
                descending: s.descending,
            }),
        };
        query = match sort {
            Some(s) => query
                .order_by(&s.column, s.descending)
                .order_by(&config.primary_key, s.descending),
            None => query.order_by(&config.primary_key, false),
        };
        query = query
            .limit(u64::from(page_size))
            .offset(u64::from(page - 1) * u64::from(page_size));

        self.policy.apply(&mut query, config, ctx)?;
        let (rows, total) = self.executor.select_counted(&query).await?;
        let rows = self.finish(config, &relations, rows).await?;
        Ok(ListPage {
            rows,
            page,
            page_size,
            total,
        })
    }

    /// `Ok(None)` when no row with this key is visible to the caller.
    pub async fn get(
        &self,
        config: &ResourceConfig,
        ctx: &CallerIdentityContext,
        id: &str,
    ) -> Result<Option<Value>, AppError> {
        let relations = select_relations(config, &[])?;
        let mut query = SelectQuery::new(&config.table, config.read_projection())
            .filter(Predicate::eq(&config.primary_key, Value::String(id.to_string())))
            .limit(1);
        self.policy.apply(&mut query, config, ctx)?;
        let rows = self.executor.select(&query).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(self.finish(config, &relations, rows).await?.into_iter().next())
    }

    pub async fn create(
        &self,
        config: &ResourceConfig,
        ctx: &CallerIdentityContext,
        input: &Value,
    ) -> Result<Value, AppError> {
        self.require_privileged("create")?;
        let mut values = config.mapper.from_input(input)?;
        check_write_columns(&values)?;
        self.policy.check_insert(&mut values, config, ctx)?;
        let query = InsertQuery {
            table: config.base_table.clone(),
            key_column: config.primary_key.clone(),
            values,
            returning: config.read_projection(),
        };
        let row = self.executor.insert(&query).await?;
        let relations = select_relations(config, &[])?;
        let out = self.finish(config, &relations, vec![row]).await?;
        Ok(out.into_iter().next().unwrap_or_default())
    }

    /// `Ok(None)` when the row is missing or outside the caller's scope.
    pub async fn update(
        &self,
        config: &ResourceConfig,
        ctx: &CallerIdentityContext,
        id: &str,
        patch: &Value,
    ) -> Result<Option<Value>, AppError> {
        self.require_privileged("update")?;
        let mut set = config.mapper.from_input(patch)?;
        set.remove(&config.primary_key);
        check_write_columns(&set)?;
        self.policy.check_patch(&set, config, ctx)?;
        let mut query = UpdateQuery {
            table: config.base_table.clone(),
            key_column: config.primary_key.clone(),
            key: Value::String(id.to_string()),
            set,
            scope: Default::default(),
            returning: config.read_projection(),
        };
        self.policy.apply(&mut query, config, ctx)?;
        let Some(row) = self.executor.update(&query).await? else {
            return Ok(None);
        };
        let relations = select_relations(config, &[])?;
        Ok(self.finish(config, &relations, vec![row]).await?.into_iter().next())
    }

    /// Deletes (or deactivates, for soft-delete resources) one row. `Ok(None)` as for `update`.
    pub async fn remove(
        &self,
        config: &ResourceConfig,
        ctx: &CallerIdentityContext,
        id: &str,
    ) -> Result<Option<Value>, AppError> {
        self.require_privileged("remove")?;
        let key = Value::String(id.to_string());
        let row = match (config.soft_delete, &config.active_flag_column) {
            (true, Some(flag)) => {
                let mut set = Row::new();
                set.insert(flag.clone(), Value::Bool(false));
                let mut query = UpdateQuery {
                    table: config.base_table.clone(),
                    key_column: config.primary_key.clone(),
                    key,
                    set,
                    scope: Default::default(),
                    returning: config.read_projection(),
                };
                self.policy.apply(&mut query, config, ctx)?;
                self.executor.update(&query).await?
            }
            _ => {
                let mut query = DeleteQuery {
                    table: config.base_table.clone(),
                    key_column: config.primary_key.clone(),
                    key,
                    scope: Default::default(),
                    returning: config.read_projection(),
                };
                self.policy.apply(&mut query, config, ctx)?;
                self.executor.delete(&query).await?
            }
        };
        Ok(row.map(|r| config.mapper.to_domain(&r)))
    }

    fn require_privileged(&self, op: &str) -> Result<(), AppError> {
        if self.mode.can_write() {
            Ok(())
        } else {
            Err(AppError::Usage(format!("{} requires privileged execution mode", op)))
        }
    }

    async fn finish(
        &self,
        config: &ResourceConfig,
        relations: &[&RelationSpec],
        rows: Vec<Row>,
    ) -> Result<Vec<Value>, AppError> {
        let domains = rows.iter().map(|r| config.mapper.to_domain(r)).collect();
        hydrate(self.executor.as_ref(), config, relations, &rows, domains).await
    }
}

/// Default relations plus any explicitly requested by name.
fn select_relations<'a>(config: &'a ResourceConfig, include: &[String]) -> Result<Vec<&'a RelationSpec>, AppError> {
    for name in include {
        if config.relation(name).is_none() {
            return Err(AppError::Usage(format!(
                "resource '{}' has no relation '{}'",
                config.key, name
            )));
        }
    }
    Ok(config
        .relations
        .iter()
        .filter(|r| r.include_by_default() || include.iter().any(|n| n == r.name()))
        .collect())
}

fn check_column(config: &ResourceConfig, column: &str, what: &str) -> Result<(), AppError> {
    let known = match config.known_columns() {
        Some(cols) => cols.contains(column),
        None => is_valid_column(column),
    };
    if known {
        Ok(())
    } else {
        Err(AppError::Usage(format!("unknown {} column '{}' on '{}'", what, column, config.key)))
    }
}

fn check_write_columns(row: &Row) -> Result<(), AppError> {
    match row.keys().find(|c| !is_valid_column(c)) {
        Some(c) => Err(AppError::Validation(format!("invalid field: {}", c))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_param_forms() {
        assert_eq!(
            SortParam::parse("name").unwrap(),
            SortParam { column: "name".into(), descending: false }
        );
        assert!(SortParam::parse("-name").unwrap().descending);
        assert!(SortParam::parse("name:DESC").unwrap().descending);
        assert!(!SortParam::parse("name:asc").unwrap().descending);
        assert!(matches!(SortParam::parse("name:up"), Err(AppError::Usage(_))));
        assert!(matches!(SortParam::parse("-"), Err(AppError::Usage(_))));
    }

    #[test]
    fn pagination_bounds() {
        let p = ListParams::default();
        assert_eq!(p.pagination().unwrap(), (1, DEFAULT_PAGE_SIZE));
        let p = ListParams { page: Some(0), ..Default::default() };
        assert!(matches!(p.pagination(), Err(AppError::Usage(_))));
        let p = ListParams { page_size: Some(MAX_PAGE_SIZE + 1), ..Default::default() };
        assert!(matches!(p.pagination(), Err(AppError::Usage(_))));
        let p = ListParams { page_size: Some(MAX_PAGE_SIZE), ..Default::default() };
        assert_eq!(p.pagination().unwrap(), (1, MAX_PAGE_SIZE));
    }
}
