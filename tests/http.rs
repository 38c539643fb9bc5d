mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use scoped_resource_sdk::{app_router, AppState, ExecutionMode, MemoryExecutor, ScopePolicy};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(mode: ExecutionMode, policy: ScopePolicy) -> (Router, Arc<MemoryExecutor>) {
    let store = Arc::new(store());
    let state = AppState::new(registry(), store.clone(), policy, mode);
    (app_router(state), store)
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .uri(uri)
        .header("x-user-id", "u1")
        .header("x-warehouse-ids", "w1")
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn health_and_version() {
    let (app, _) = app(ExecutionMode::Unprivileged, ScopePolicy::Enforced);
    let (status, body) = send(app.clone(), Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, body) = send(app.clone(), Request::get("/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], json!("ok"));

    let (status, body) = send(app, Request::get("/version").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"], json!(["widgets", "roles", "tasks", "stock-levels"]));
}

#[tokio::test]
async fn list_is_scoped_and_paginated() {
    let (app, _) = app(ExecutionMode::Unprivileged, ScopePolicy::Enforced);
    let req = get("/api/v1/widgets?page=1&pageSize=10").body(Body::empty()).unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["total"], json!(2));
    assert_eq!(data["page"], json!(1));
    assert_eq!(data["pageSize"], json!(10));
    assert_eq!(ids(data["rows"].as_array().unwrap()), vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn alias_and_repeated_filters() {
    let (app, _) = app(ExecutionMode::Unprivileged, ScopePolicy::Enforced);
    let req = Request::get("/api/v1/gadgets?filters%5Bcategory_id%5D=c1&filters%5Bcategory_id%5D=c2&sort=-name")
        .header("x-user-id", "u1")
        .header("x-all-warehouses", "true")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(body["data"]["rows"].as_array().unwrap()), vec![json!("c"), json!("a")]);
}

#[tokio::test]
async fn error_statuses() {
    let (app, _) = app(ExecutionMode::Unprivileged, ScopePolicy::Enforced);

    let (status, body) = send(app.clone(), get("/api/v1/gizmos").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["code"].is_string());

    let (status, _) = send(app.clone(), get("/api/v1/widgets/c").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(app.clone(), get("/api/v1/widgets?pageSize=0").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app.clone(), get("/api/v1/widgets?color=red").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_lists = Request::get("/api/v1/widgets").header("x-user-id", "u1").body(Body::empty()).unwrap();
    let (status, _) = send(app.clone(), no_lists).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let anonymous = Request::get("/api/v1/widgets").body(Body::empty()).unwrap();
    let (status, _) = send(app.clone(), anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(app, get("/api/v1/stock-levels/9/history").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn disabled_policy_accepts_anonymous_callers() {
    let (app, _) = app(ExecutionMode::Unprivileged, ScopePolicy::Disabled);
    let req = Request::get("/api/v1/widgets").body(Body::empty()).unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(3));
}

#[tokio::test]
async fn writes_round_trip_when_privileged() {
    let (app, store) = app(ExecutionMode::Privileged, ScopePolicy::Enforced);

    let req = get("/api/v1/widgets")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "Pin", "warehouseId": "w1" }).to_string()))
        .unwrap();
    let (status, body) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let req = get(&format!("/api/v1/widgets/{}", id))
        .method("PATCH")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "Pin 2" }).to_string()))
        .unwrap();
    let (status, body) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("Pin 2"));

    let req = get("/api/v1/widgets")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "Pin", "warehouseId": "w2" }).to_string()))
        .unwrap();
    let (status, _) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = get(&format!("/api/v1/widgets/{}", id)).method("DELETE").body(Body::empty()).unwrap();
    let (status, _) = send(app.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.rows("widgets").len(), 3);

    let req = get("/api/v1/widgets/c").method("DELETE").body(Body::empty()).unwrap();
    let (status, _) = send(app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn writes_rejected_when_unprivileged() {
    let (app, store) = app(ExecutionMode::Unprivileged, ScopePolicy::Enforced);
    let req = get("/api/v1/widgets")
        .method("POST")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "Pin", "warehouseId": "w1" }).to_string()))
        .unwrap();
    let (status, _) = send(app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn history_endpoint() {
    let (app, _) = app(ExecutionMode::Unprivileged, ScopePolicy::Enforced);
    let (status, body) = send(app, get("/api/v1/stock-levels/4/history?limit=3").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(5));
    assert_eq!(ids(body["data"]["rows"].as_array().unwrap()), vec![json!(5), json!(4), json!(3)]);
}
