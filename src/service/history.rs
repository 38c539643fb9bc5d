//! History reconstruction: every stored version of one logical record, newest first.
//!
//! Steps run strictly in sequence since each needs keys found by the previous one:
//! anchor lookup on the base table, scoped version query, then at most two bulk label lookups.

use crate::config::{HistorySpec, LookupSpec, Projection, ResourceConfig, HISTORY_MAX_LIMIT};
use crate::error::AppError;
use crate::executor::QueryExecutor;
use crate::identity::CallerIdentityContext;
use crate::mapper::Row;
use crate::query::{Predicate, SelectQuery};
use crate::scope::ScopePolicy;
use crate::value::join_key;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

const DISPLAY_FORMAT: &str = "%b %d, %Y %H:%M";
const DISPLAY_TIMESTAMP_COLUMN: &str = "display_timestamp";

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub rows: Vec<Value>,
    pub total: u64,
}

#[derive(Clone)]
pub struct HistoryService {
    executor: Arc<dyn QueryExecutor>,
    policy: ScopePolicy,
}

impl HistoryService {
    pub fn new(executor: Arc<dyn QueryExecutor>, policy: ScopePolicy) -> Self {
        HistoryService { executor, policy }
    }

    pub async fn history(
        &self,
        config: &ResourceConfig,
        ctx: &CallerIdentityContext,
        id: &str,
        limit: Option<u32>,
    ) -> Result<HistoryPage, AppError> {
        let spec = config
            .history
            .as_ref()
            .filter(|h| h.enabled)
            .ok_or_else(|| AppError::Usage(format!("resource '{}' has no history", config.key)))?;
        let limit = match limit {
            Some(0) => return Err(AppError::Usage("limit must be >= 1".into())),
            Some(n) => n.min(HISTORY_MAX_LIMIT),
            None => spec.limit,
        };

        // anchor lookup; views expose only the latest version, so this reads the base table
        let mut anchor_query = SelectQuery::new(&config.base_table, anchor_projection(config, spec))
        .filter(Predicate::eq(&config.primary_key, Value::String(id.to_string())))
        .limit(1);
        self.policy.apply(&mut anchor_query, config, ctx)?;
        let current = self
            .executor
            .select(&anchor_query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::RecordNotFound(format!("{}/{}", config.key, id)))?;
        let anchor = current
            .get(&spec.anchor_column)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| AppError::MissingAnchor(format!("{}/{}", config.key, id)))?;

        let mut columns = spec.columns.clone();
        columns.extend([
            spec.id_column.clone(),
            spec.anchor_column.clone(),
            spec.order_by.clone(),
            spec.timestamp_column.clone(),
        ]);
        columns.extend(spec.actor.iter().chain(spec.location.iter()).map(|l| l.column.clone()));
        let mut projection = Projection::Columns(Vec::new());
        for c in &columns {
            projection = projection.with_column(c);
        }
        let mut version_query = SelectQuery::new(&spec.table, projection)
            .filter(Predicate::eq(&spec.anchor_column, anchor))
            .order_by(&spec.order_by, true)
            .order_by(&spec.id_column, true)
            .limit(u64::from(limit));
        self.policy.apply(&mut version_query, config, ctx)?;
        let (mut rows, total) = self.executor.select_counted(&version_query).await?;

        for lookup in spec.actor.iter().chain(spec.location.iter()) {
            self.enrich(&mut rows, lookup).await?;
        }

        let rows = rows
            .into_iter()
            .map(|mut row| {
                let display = row
                    .get(&spec.timestamp_column)
                    .map(format_display_timestamp)
                    .unwrap_or(Value::Null);
                row.insert(DISPLAY_TIMESTAMP_COLUMN.into(), display);
                let obj: Map<String, Value> = row
                    .into_iter()
                    .map(|(k, v)| (config.mapper.field_name(&k), v))
                    .collect();
                Value::Object(obj)
            })
            .collect();
        tracing::debug!(resource = %config.key, id, total, "history");
        Ok(HistoryPage { rows, total })
    }

    /// One bulk query per lookup; rows whose key has no match get a null label.
    async fn enrich(&self, rows: &mut [Row], lookup: &LookupSpec) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        let keys: Vec<Value> = rows
            .iter()
            .filter_map(|r| r.get(&lookup.column))
            .filter(|v| join_key(v).is_some_and(|k| seen.insert(k)))
            .cloned()
            .collect();
        let mut labels: HashMap<String, Value> = HashMap::new();
        if !keys.is_empty() {
            let q = SelectQuery::new(
                &lookup.table,
                Projection::Columns(vec![lookup.key_column.clone(), lookup.label_column.clone()]),
            )
            .filter(Predicate::any_of(&lookup.key_column, keys));
            for r in self.executor.select(&q).await? {
                if let Some(k) = r.get(&lookup.key_column).and_then(join_key) {
                    labels.insert(k, r.get(&lookup.label_column).cloned().unwrap_or(Value::Null));
                }
            }
        }
        for row in rows.iter_mut() {
            let label = row
                .get(&lookup.column)
                .and_then(join_key)
                .and_then(|k| labels.get(&k).cloned())
                .unwrap_or(Value::Null);
            row.insert(lookup.field.clone(), label);
        }
        Ok(())
    }
}

/// Anchor lookup columns: the key, the anchor and the location join key when one is configured.
fn anchor_projection(config: &ResourceConfig, spec: &HistorySpec) -> Projection {
    let projection = Projection::Columns(vec![config.primary_key.clone()]).with_column(&spec.anchor_column);
    match &spec.location {
        Some(location) => projection.with_column(&location.column),
        None => projection,
    }
}

fn preformatted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|\s)\d{1,2}:\d{2}$").expect("static display pattern"))
}

/// `"Mon DD, YYYY HH:MM"` in UTC. Values already ending in a bare `HH:MM` and values that do not
/// parse are returned unchanged.
pub fn format_display_timestamp(v: &Value) -> Value {
    let Value::String(s) = v else {
        return v.clone();
    };
    let s = s.trim();
    if preformatted().is_match(s) {
        return Value::String(s.to_string());
    }
    parse_timestamp(s)
        .map(|t| Value::String(t.format(DISPLAY_FORMAT).to_string()))
        .unwrap_or_else(|| v.clone())
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    // PostgreSQL text form of timestamptz, e.g. `2024-03-05 14:07:00+00`
    if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}
