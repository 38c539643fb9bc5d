//! Caller identity from headers set by the trusted gateway in front of this service.

use crate::identity::CallerIdentityContext;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const PERMISSIONS_HEADER: &str = "X-User-Permissions";
pub const ROLE_FAMILY_HEADER: &str = "X-Role-Family";
pub const WAREHOUSE_IDS_HEADER: &str = "X-Warehouse-Ids";
pub const WAREHOUSE_CODES_HEADER: &str = "X-Warehouse-Codes";
pub const ALL_WAREHOUSES_HEADER: &str = "X-All-Warehouses";

/// Extractor for the optional caller identity. `None` when `X-User-Id` is absent;
/// whether that is acceptable is decided by the scope policy, not here.
#[derive(Debug)]
pub struct Identity(pub Option<CallerIdentityContext>);

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v: &axum::http::HeaderValue| v.to_str().ok())
        .map(str::trim)
}

/// Comma-separated list. A present but empty header is an empty list, not a missing one.
fn header_list(headers: &HeaderMap, name: &str) -> Option<Vec<String>> {
    header(headers, name).map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    })
}

pub fn identity_from_headers(headers: &HeaderMap) -> Option<CallerIdentityContext> {
    let user_id = header(headers, USER_ID_HEADER).filter(|s| !s.is_empty())?;
    let mut ctx = CallerIdentityContext::new(user_id)
        .with_permissions(header_list(headers, PERMISSIONS_HEADER).unwrap_or_default());
    if let Some(family) = header(headers, ROLE_FAMILY_HEADER).filter(|s| !s.is_empty()) {
        ctx = ctx.with_role_family(family);
    }
    if let Some(ids) = header_list(headers, WAREHOUSE_IDS_HEADER) {
        ctx = ctx.with_warehouse_ids(ids);
    }
    if let Some(codes) = header_list(headers, WAREHOUSE_CODES_HEADER) {
        ctx = ctx.with_warehouse_codes(codes);
    }
    if header(headers, ALL_WAREHOUSES_HEADER).is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1") {
        ctx = ctx.with_all_warehouses();
    }
    Some(ctx)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Identity(identity_from_headers(&parts.headers)))
    }
}
