#![allow(dead_code)]

use scoped_resource_sdk::{
    config::PostProcess, CallerIdentityContext, ExecutionMode, FullConfig, HistoryService, MemoryExecutor,
    RegistryBuilder, ResourceProvider, ResourceRegistry, ScopePolicy,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn resources_json() -> Value {
    json!({
        "resources": [
            {
                "key": "widgets",
                "aliases": ["gadgets"],
                "table": "widgets",
                "select_columns": "id, name, warehouse_id, category_id, is_active, updated_at",
                "search_columns": ["name"],
                "default_sort": { "column": "name" },
                "active_flag_column": "is_active",
                "warehouse_scope": { "mode": "column", "column": "warehouse_id" },
                "relations": [
                    {
                        "kind": "manyToMany",
                        "name": "tags",
                        "junction_table": "widget_tags",
                        "junction_parent_column": "widget_id",
                        "junction_child_column": "tag_id",
                        "target_table": "tags",
                        "target_columns": "id, label",
                        "resolve_as": "objects"
                    },
                    {
                        "kind": "oneToMany",
                        "name": "parts",
                        "target_table": "parts",
                        "foreign_key": "widget_id",
                        "target_columns": "id, widget_id, part_no, position",
                        "order_by": { "column": "position" },
                        "limit": 2
                    },
                    {
                        "kind": "manyToOne",
                        "name": "category",
                        "local_key": "category_id",
                        "target_table": "categories",
                        "target_columns": "id, display_name"
                    }
                ]
            },
            {
                "key": "roles",
                "table": "roles",
                "select_columns": "id, name",
                "relations": [
                    {
                        "kind": "manyToMany",
                        "name": "warehouses",
                        "junction_table": "role_warehouses",
                        "junction_parent_column": "role_id",
                        "junction_child_column": "warehouse_id",
                        "on_empty": "ALL"
                    },
                    {
                        "kind": "manyToMany",
                        "name": "regions",
                        "junction_table": "role_regions",
                        "junction_parent_column": "role_id",
                        "junction_child_column": "region_id"
                    },
                    {
                        "kind": "manyToMany",
                        "name": "auditors",
                        "junction_table": "role_auditors",
                        "junction_parent_column": "role_id",
                        "junction_child_column": "user_id",
                        "include_by_default": false
                    }
                ]
            },
            {
                "key": "tasks",
                "table": "tasks",
                "select_columns": "id, title, owner_id, warehouse_code, is_active",
                "active_flag_column": "is_active",
                "soft_delete": true,
                "ownership_scope": { "mode": "self", "column": "owner_id", "bypass_permissions": ["tasks.admin"] },
                "warehouse_scope": { "mode": "column", "column": "warehouse_code" }
            },
            {
                "key": "stock-levels",
                "table": "stock_levels_current",
                "base_table": "stock_levels",
                "select_columns": "id, sku, quantity, warehouse_id, anchor_id, updated_at",
                "warehouse_scope": { "mode": "column", "column": "warehouse_id" },
                "history": {
                    "source": { "anchor_column": "anchor_id" },
                    "projection": { "columns": ["id", "sku", "quantity", "updated_at"], "order_by": "updated_at" },
                    "actor": { "column": "changed_by", "table": "users", "label_column": "full_name" },
                    "location": { "column": "warehouse_id", "table": "warehouses" }
                }
            }
        ]
    })
}

pub fn full_config() -> FullConfig {
    serde_json::from_value(resources_json()).unwrap()
}

pub fn registry() -> ResourceRegistry {
    RegistryBuilder::new(full_config()).build().unwrap()
}

/// Registry whose `roles` resource derives a flag from its hydrated relations.
pub fn registry_with_post_process() -> ResourceRegistry {
    RegistryBuilder::new(full_config())
        .with_post_process(
            "roles",
            PostProcess::new(|rows| {
                rows.into_iter()
                    .map(|mut r| {
                        let unrestricted = r["warehouses_scope"] == json!("ALL");
                        r["unrestricted"] = json!(unrestricted);
                        r
                    })
                    .collect()
            }),
        )
        .build()
        .unwrap()
}

pub fn store() -> MemoryExecutor {
    MemoryExecutor::new()
        .with_table(
            "widgets",
            vec![
                json!({ "id": "a", "name": "Bolt", "warehouse_id": "w1", "category_id": "c1", "is_active": true }),
                json!({ "id": "b", "name": "Nut", "warehouse_id": "w1", "category_id": null, "is_active": false }),
                json!({ "id": "c", "name": "Washer", "warehouse_id": "w2", "category_id": "c2", "is_active": true }),
            ],
        )
        .with_table(
            "widget_tags",
            vec![
                json!({ "widget_id": "a", "tag_id": "t1" }),
                json!({ "widget_id": "a", "tag_id": "t2" }),
                json!({ "widget_id": "c", "tag_id": "t1" }),
            ],
        )
        .with_table(
            "tags",
            vec![json!({ "id": "t1", "label": "steel" }), json!({ "id": "t2", "label": "metric" })],
        )
        .with_table(
            "parts",
            vec![
                json!({ "id": "p1", "widget_id": "a", "part_no": "A-3", "position": 3 }),
                json!({ "id": "p2", "widget_id": "a", "part_no": "A-1", "position": 1 }),
                json!({ "id": "p3", "widget_id": "a", "part_no": "A-2", "position": 2 }),
                json!({ "id": "p4", "widget_id": "c", "part_no": "C-1", "position": 1 }),
            ],
        )
        .with_table(
            "categories",
            vec![
                json!({ "id": "c1", "display_name": "Fasteners" }),
                json!({ "id": "c2", "display_name": "Spacers" }),
            ],
        )
        .with_table(
            "roles",
            vec![
                json!({ "id": "r1", "name": "Picker" }),
                json!({ "id": "r2", "name": "Supervisor" }),
            ],
        )
        .with_table(
            "role_warehouses",
            vec![json!({ "role_id": "r1", "warehouse_id": "w1" })],
        )
        .with_table(
            "role_regions",
            vec![json!({ "role_id": "r1", "region_id": "north" })],
        )
        .with_table(
            "role_auditors",
            vec![json!({ "role_id": "r2", "user_id": "u9" })],
        )
        .with_table(
            "tasks",
            vec![
                json!({ "id": "k1", "title": "Count bay 4", "owner_id": "u1", "warehouse_code": "MAIN", "is_active": true }),
                json!({ "id": "k2", "title": "Restock", "owner_id": "u2", "warehouse_code": "MAIN", "is_active": true }),
                json!({ "id": "k3", "title": "Audit", "owner_id": "u1", "warehouse_code": "EAST", "is_active": true }),
            ],
        )
        .with_table("stock_levels", stock_history_rows())
        .with_table(
            "users",
            vec![
                json!({ "id": "u1", "full_name": "Ada Lovelace" }),
                json!({ "id": "u2", "full_name": "Alan Turing" }),
            ],
        )
        .with_table(
            "warehouses",
            vec![json!({ "id": "w1", "name": "Main" }), json!({ "id": "w2", "name": "East" })],
        )
}

/// Five versions of anchor A1 (two share a timestamp) and three of A2.
pub fn stock_history_rows() -> Vec<Value> {
    vec![
        json!({ "id": 1, "anchor_id": "A1", "sku": "S1", "quantity": 10, "warehouse_id": "w1", "changed_by": "u1", "updated_at": "2024-01-01T09:00:00Z" }),
        json!({ "id": 2, "anchor_id": "A1", "sku": "S1", "quantity": 12, "warehouse_id": "w1", "changed_by": "u2", "updated_at": "2024-01-02T09:00:00Z" }),
        json!({ "id": 3, "anchor_id": "A1", "sku": "S1", "quantity": 9, "warehouse_id": "w1", "changed_by": "u1", "updated_at": "2024-01-03T09:00:00Z" }),
        json!({ "id": 4, "anchor_id": "A1", "sku": "S1", "quantity": 7, "warehouse_id": "w1", "changed_by": "u3", "updated_at": "2024-01-03T09:00:00Z" }),
        json!({ "id": 5, "anchor_id": "A1", "sku": "S1", "quantity": 15, "warehouse_id": "w1", "changed_by": "u1", "updated_at": "2024-01-04T17:45:00Z" }),
        json!({ "id": 6, "anchor_id": "A2", "sku": "S2", "quantity": 1, "warehouse_id": "w1", "changed_by": "u1", "updated_at": "2024-01-05T09:00:00Z" }),
        json!({ "id": 7, "anchor_id": "A2", "sku": "S2", "quantity": 2, "warehouse_id": "w1", "changed_by": "u1", "updated_at": "2024-01-06T09:00:00Z" }),
        json!({ "id": 8, "anchor_id": "A2", "sku": "S2", "quantity": 3, "warehouse_id": "w1", "changed_by": "u1", "updated_at": "2024-01-07T09:00:00Z" }),
        json!({ "id": 9, "anchor_id": null, "sku": "S3", "quantity": 0, "warehouse_id": "w1", "changed_by": "u1", "updated_at": "2024-01-07T09:00:00Z" }),
        json!({ "id": 10, "anchor_id": "A3", "sku": "S4", "quantity": 4, "warehouse_id": "w2", "changed_by": "u1", "updated_at": "2024-01-07T09:00:00Z" }),
    ]
}

pub fn provider(store: Arc<MemoryExecutor>, mode: ExecutionMode) -> ResourceProvider {
    ResourceProvider::new(store, ScopePolicy::Enforced, mode)
}

pub fn history(store: Arc<MemoryExecutor>) -> HistoryService {
    HistoryService::new(store, ScopePolicy::Enforced)
}

/// Caller restricted to warehouse id w1.
pub fn w1_caller() -> CallerIdentityContext {
    CallerIdentityContext::new("u1").with_warehouse_ids(["w1"])
}

pub fn ids(rows: &[Value]) -> Vec<Value> {
    rows.iter().map(|r| r["id"].clone()).collect()
}
