//! Resource handlers: list, read, create, update, delete, history.

use crate::error::AppError;
use crate::extractors::Identity;
use crate::response::{success_one, success_one_ok};
use crate::service::ListParams;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

fn parse_u32(key: &str, v: &str) -> Result<u32, AppError> {
    v.trim()
        .parse()
        .map_err(|_| AppError::Usage(format!("{} must be a non-negative integer", key)))
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Build list params from raw query pairs. `filters[col]` may repeat; repeats become an IN list.
pub fn list_params(pairs: Vec<(String, String)>) -> Result<ListParams, AppError> {
    let mut params = ListParams::default();
    for (k, v) in pairs {
        match k.as_str() {
            "page" => params.page = Some(parse_u32("page", &v)?),
            "pageSize" | "page_size" => params.page_size = Some(parse_u32("pageSize", &v)?),
            "q" => params.q = Some(v),
            "sort" => params.sort = Some(v),
            "activeOnly" | "active_only" => params.active_only = parse_flag(&v),
            "include" => params.include.extend(
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            _ => {
                let Some(column) = k.strip_prefix("filters[").and_then(|r| r.strip_suffix(']')) else {
                    return Err(AppError::Usage(format!("unknown query parameter: {}", k)));
                };
                let value = Value::String(v);
                match params.filters.iter_mut().find(|(c, _)| c == column) {
                    Some((_, Value::Array(values))) => values.push(value),
                    Some((_, existing)) => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, value]);
                    }
                    None => params.filters.push((column.to_string(), value)),
                }
            }
        }
    }
    Ok(params)
}

pub async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Identity(identity): Identity,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let config = state.registry.resolve(&resource)?;
    let ctx = state.policy.require_identity(identity)?;
    let params = list_params(pairs)?;
    let page = state.provider.list(&config, &ctx, &params).await?;
    Ok(success_one_ok(page))
}

pub async fn read(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Identity(identity): Identity,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let config = state.registry.resolve(&resource)?;
    let ctx = state.policy.require_identity(identity)?;
    let row = state
        .provider
        .get(&config, &ctx, &id)
        .await?
        .ok_or_else(|| AppError::RecordNotFound(format!("{}/{}", config.key, id)))?;
    Ok(success_one_ok(row))
}

pub async fn create(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Identity(identity): Identity,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let config = state.registry.resolve(&resource)?;
    let ctx = state.policy.require_identity(identity)?;
    let row = state.provider.create(&config, &ctx, &body).await?;
    Ok(success_one(row))
}

pub async fn update(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Identity(identity): Identity,
    Json(body): Json<Value>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let config = state.registry.resolve(&resource)?;
    let ctx = state.policy.require_identity(identity)?;
    let row = state
        .provider
        .update(&config, &ctx, &id, &body)
        .await?
        .ok_or_else(|| AppError::RecordNotFound(format!("{}/{}", config.key, id)))?;
    Ok(success_one_ok(row))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Identity(identity): Identity,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let config = state.registry.resolve(&resource)?;
    let ctx = state.policy.require_identity(identity)?;
    let row = state
        .provider
        .remove(&config, &ctx, &id)
        .await?
        .ok_or_else(|| AppError::RecordNotFound(format!("{}/{}", config.key, id)))?;
    Ok(success_one_ok(row))
}

pub async fn history(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Identity(identity): Identity,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let config = state.registry.resolve(&resource)?;
    let ctx = state.policy.require_identity(identity)?;
    let mut limit = None;
    for (k, v) in pairs {
        match k.as_str() {
            "limit" => limit = Some(parse_u32("limit", &v)?),
            _ => return Err(AppError::Usage(format!("unknown query parameter: {}", k))),
        }
    }
    let page = state.history.history(&config, &ctx, &id, limit).await?;
    Ok(success_one_ok(page))
}
