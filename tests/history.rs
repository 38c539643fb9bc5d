mod common;

use common::*;
use scoped_resource_sdk::executor::QueryKind;
use scoped_resource_sdk::{AppError, CallerIdentityContext};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn history_groups_by_anchor_newest_first() {
    let store = Arc::new(store());
    let history = history(store.clone());
    let stock = registry().resolve("stock-levels").unwrap();

    for id in ["1", "3", "5"] {
        let out = history.history(&stock, &w1_caller(), id, None).await.unwrap();
        assert_eq!(out.total, 5);
        assert_eq!(ids(&out.rows), vec![json!(5), json!(4), json!(3), json!(2), json!(1)]);
        assert!(out.rows.iter().all(|r| r["anchorId"] == json!("A1")));
    }
}

#[tokio::test]
async fn history_enriches_with_two_bulk_lookups() {
    let store = Arc::new(store());
    let history = history(store.clone());
    let stock = registry().resolve("stock-levels").unwrap();

    let out = history.history(&stock, &w1_caller(), "2", None).await.unwrap();
    let newest = &out.rows[0];
    assert_eq!(newest["actorName"], json!("Ada Lovelace"));
    assert_eq!(newest["locationName"], json!("Main"));
    assert_eq!(newest["displayTimestamp"], json!("Jan 04, 2024 17:45"));
    assert_eq!(out.rows[3]["actorName"], json!("Alan Turing"));
    // unknown actor keeps a null label
    assert_eq!(out.rows[1]["actorName"], json!(null));

    let executed = store.executed();
    let kinds: Vec<(QueryKind, &str)> = executed.iter().map(|q| (q.kind, q.table.as_str())).collect();
    assert_eq!(
        kinds,
        vec![
            (QueryKind::Select, "stock_levels"),
            (QueryKind::Select, "stock_levels"),
            (QueryKind::Count, "stock_levels"),
            (QueryKind::Select, "users"),
            (QueryKind::Select, "warehouses"),
        ]
    );
}

#[tokio::test]
async fn history_respects_limit() {
    let store = Arc::new(store());
    let history = history(store);
    let stock = registry().resolve("stock-levels").unwrap();

    let out = history.history(&stock, &w1_caller(), "1", Some(2)).await.unwrap();
    assert_eq!(ids(&out.rows), vec![json!(5), json!(4)]);
    assert_eq!(out.total, 5);
    assert!(matches!(
        history.history(&stock, &w1_caller(), "1", Some(0)).await,
        Err(AppError::Usage(_))
    ));
}

#[tokio::test]
async fn history_failure_states() {
    let store = Arc::new(store());
    let history = history(store);
    let registry = registry();
    let stock = registry.resolve("stock-levels").unwrap();

    assert!(matches!(
        history.history(&stock, &w1_caller(), "9", None).await,
        Err(AppError::MissingAnchor(_))
    ));
    assert!(matches!(
        history.history(&stock, &w1_caller(), "99", None).await,
        Err(AppError::RecordNotFound(_))
    ));
    // record in a warehouse the caller cannot see
    assert!(matches!(
        history.history(&stock, &w1_caller(), "10", None).await,
        Err(AppError::RecordNotFound(_))
    ));
    assert!(matches!(
        history.history(&stock, &CallerIdentityContext::new("u1"), "1", None).await,
        Err(AppError::ScopeConfiguration(_))
    ));

    let widgets = registry.resolve("widgets").unwrap();
    assert!(matches!(
        history.history(&widgets, &w1_caller(), "a", None).await,
        Err(AppError::Usage(_))
    ));
}

#[tokio::test]
async fn history_versions_outside_scope_are_hidden() {
    let mut rows = stock_history_rows();
    rows.push(json!({ "id": 11, "anchor_id": "A1", "sku": "S1", "quantity": 99, "warehouse_id": "w2", "changed_by": "u1", "updated_at": "2024-02-01T00:00:00Z" }));
    let store = Arc::new(store().with_table("stock_levels", rows));
    let history = history(store);
    let stock = registry().resolve("stock-levels").unwrap();

    let out = history.history(&stock, &w1_caller(), "1", None).await.unwrap();
    assert_eq!(out.total, 5);
    assert!(!ids(&out.rows).contains(&json!(11)));

    let everywhere = CallerIdentityContext::new("u1").with_all_warehouses();
    let out = history.history(&stock, &everywhere, "1", None).await.unwrap();
    assert_eq!(out.total, 6);
    assert_eq!(out.rows[0]["id"], json!(11));
}

#[tokio::test]
async fn preformatted_timestamps_pass_through() {
    let rows = vec![
        json!({ "id": 1, "anchor_id": "A1", "warehouse_id": "w1", "changed_by": "u1", "updated_at": "Jan 01, 2024 10:00" }),
    ];
    let store = Arc::new(store().with_table("stock_levels", rows));
    let history = history(store);
    let stock = registry().resolve("stock-levels").unwrap();

    let out = history.history(&stock, &w1_caller(), "1", None).await.unwrap();
    assert_eq!(out.rows[0]["displayTimestamp"], json!("Jan 01, 2024 10:00"));
    assert_eq!(out.rows[0]["sku"], json!(null));
}
