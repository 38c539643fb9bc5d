//! Relation hydration: attach related rows to an already-fetched batch without per-row queries.
//!
//! Each relation costs one query (two for many-to-many resolved to objects) regardless of batch
//! size. Relations are independent, so their queries run concurrently. Results are merged back by
//! row position; the batch order is never changed.

use crate::config::{
    ManyToManySpec, ManyToOneSpec, OnEmptyPolicy, OneToManySpec, Projection, RelationSpec, ResolveAs, ResourceConfig,
};
use crate::error::AppError;
use crate::executor::QueryExecutor;
use crate::mapper::Row;
use crate::query::{Predicate, SelectQuery};
use crate::value::{compare_directed, join_key};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

pub const SCOPE_ALL: &str = "ALL";
pub const SCOPE_NONE: &str = "NONE";
pub const SCOPE_RESTRICTED: &str = "RESTRICTED";

/// Fields to set on each row of the batch, by position.
type Attachments = Vec<Vec<(String, Value)>>;

/// Hydrate `domains` (the mapped form of `rows`, same order) with `relations`, then run the
/// resource's post-process hook once.
pub async fn hydrate(
    executor: &dyn QueryExecutor,
    config: &ResourceConfig,
    relations: &[&RelationSpec],
    rows: &[Row],
    mut domains: Vec<Value>,
) -> Result<Vec<Value>, AppError> {
    if !relations.is_empty() && !rows.is_empty() {
        let passes = relations.iter().map(|rel| hydrate_relation(executor, config, rel, rows));
        let results = try_join_all(passes).await?;
        for attachments in results {
            for (domain, fields) in domains.iter_mut().zip(attachments) {
                if let Value::Object(obj) = domain {
                    obj.extend(fields);
                }
            }
        }
        tracing::debug!(resource = %config.key, relations = relations.len(), rows = rows.len(), "hydrated");
    }
    Ok(match &config.post_process {
        Some(hook) => hook.apply(domains),
        None => domains,
    })
}

async fn hydrate_relation(
    executor: &dyn QueryExecutor,
    config: &ResourceConfig,
    rel: &RelationSpec,
    rows: &[Row],
) -> Result<Attachments, AppError> {
    match rel {
        RelationSpec::ManyToMany(spec) => many_to_many(executor, config, spec, rows).await,
        RelationSpec::OneToMany(spec) => one_to_many(executor, config, spec, rows).await,
        RelationSpec::ManyToOne(spec) => many_to_one(executor, config, spec, rows).await,
    }
}

/// Distinct non-null join values of `column` across the batch, in first-seen order.
fn distinct_keys<'a>(rows: impl Iterator<Item = &'a Row>, column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        if let Some(v) = row.get(column) {
            if let Some(k) = join_key(v) {
                if seen.insert(k) {
                    out.push(v.clone());
                }
            }
        }
    }
    out
}

fn row_key(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(join_key)
}

/// Related rows go through the owning resource's field naming.
fn map_related(config: &ResourceConfig, row: &Row) -> Value {
    let obj: Map<String, Value> = row
        .iter()
        .map(|(k, v)| (config.mapper.field_name(k), v.clone()))
        .collect();
    Value::Object(obj)
}

pub fn empty_scope_marker(policy: OnEmptyPolicy) -> &'static str {
    match policy {
        OnEmptyPolicy::All => SCOPE_ALL,
        OnEmptyPolicy::None => SCOPE_NONE,
    }
}

async fn many_to_many(
    executor: &dyn QueryExecutor,
    config: &ResourceConfig,
    spec: &ManyToManySpec,
    rows: &[Row],
) -> Result<Attachments, AppError> {
    let parent_keys = distinct_keys(rows.iter(), &config.primary_key);
    let mut children_by_parent: HashMap<String, Vec<Value>> = HashMap::new();
    if !parent_keys.is_empty() {
        let junction = SelectQuery::new(
            &spec.junction_table,
            Projection::Columns(vec![spec.junction_parent_column.clone(), spec.junction_child_column.clone()]),
        )
        .filter(Predicate::any_of(&spec.junction_parent_column, parent_keys));
        for j in executor.select(&junction).await? {
            let (Some(parent), Some(child)) = (
                row_key(&j, &spec.junction_parent_column),
                j.get(&spec.junction_child_column).filter(|v| !v.is_null()),
            ) else {
                continue;
            };
            children_by_parent.entry(parent).or_default().push(child.clone());
        }
    }

    let targets: Option<HashMap<String, Value>> = match (spec.resolve_as, &spec.target_table) {
        (ResolveAs::Objects, Some(target_table)) => {
            let child_ids = distinct_keys_of_values(children_by_parent.values().flatten());
            let mut by_key = HashMap::new();
            if !child_ids.is_empty() {
                let q = SelectQuery::new(target_table, spec.target_columns.clone())
                    .filter(Predicate::any_of(&spec.target_key, child_ids));
                for t in executor.select(&q).await? {
                    if let Some(k) = row_key(&t, &spec.target_key) {
                        by_key.insert(k, map_related(config, &t));
                    }
                }
            }
            Some(by_key)
        }
        _ => None,
    };

    let scope_field = format!("{}_scope", spec.name);
    Ok(rows
        .iter()
        .map(|row| {
            let children = row_key(row, &config.primary_key)
                .and_then(|k| children_by_parent.get(&k))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let marker = if children.is_empty() {
                empty_scope_marker(spec.on_empty)
            } else {
                SCOPE_RESTRICTED
            };
            let value: Vec<Value> = match &targets {
                Some(by_key) => children
                    .iter()
                    .filter_map(|c| join_key(c).and_then(|k| by_key.get(&k)).cloned())
                    .collect(),
                None => children.to_vec(),
            };
            vec![
                (spec.name.clone(), Value::Array(value)),
                (scope_field.clone(), Value::String(marker.to_string())),
            ]
        })
        .collect())
}

fn distinct_keys_of_values<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .filter(|v| join_key(v).is_some_and(|k| seen.insert(k)))
        .cloned()
        .collect()
}

async fn one_to_many(
    executor: &dyn QueryExecutor,
    config: &ResourceConfig,
    spec: &OneToManySpec,
    rows: &[Row],
) -> Result<Attachments, AppError> {
    let parent_keys = distinct_keys(rows.iter(), &spec.parent_key);
    let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
    if !parent_keys.is_empty() {
        let q = SelectQuery::new(&spec.target_table, spec.target_columns.clone())
            .filter(Predicate::any_of(&spec.foreign_key, parent_keys));
        for child in executor.select(&q).await? {
            if let Some(k) = row_key(&child, &spec.foreign_key) {
                groups.entry(k).or_default().push(child);
            }
        }
    }
    // ordering and the cap are per parent, so they are applied here rather than in the query
    for group in groups.values_mut() {
        if let Some(order) = &spec.order_by {
            group.sort_by(|a, b| {
                compare_directed(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                    order.descending,
                )
            });
        }
        if let Some(limit) = spec.limit {
            group.truncate(limit);
        }
    }

    Ok(rows
        .iter()
        .map(|row| {
            let children: Vec<Value> = row_key(row, &spec.parent_key)
                .and_then(|k| groups.get(&k))
                .map(|g| g.iter().map(|c| map_related(config, c)).collect())
                .unwrap_or_default();
            vec![(spec.name.clone(), Value::Array(children))]
        })
        .collect())
}

async fn many_to_one(
    executor: &dyn QueryExecutor,
    config: &ResourceConfig,
    spec: &ManyToOneSpec,
    rows: &[Row],
) -> Result<Attachments, AppError> {
    let local_keys = distinct_keys(rows.iter(), &spec.local_key);
    let mut parents: HashMap<String, Value> = HashMap::new();
    if !local_keys.is_empty() {
        let q = SelectQuery::new(&spec.target_table, spec.target_columns.clone())
            .filter(Predicate::any_of(&spec.target_key, local_keys));
        for parent in executor.select(&q).await? {
            if let Some(k) = row_key(&parent, &spec.target_key) {
                parents.insert(k, map_related(config, &parent));
            }
        }
    }
    Ok(rows
        .iter()
        .map(|row| {
            let parent = row_key(row, &spec.local_key)
                .and_then(|k| parents.get(&k).cloned())
                .unwrap_or(Value::Null);
            vec![(spec.name.clone(), parent)]
        })
        .collect())
}
