//! Load resource declarations from disk and resolve them into runtime configs.

use crate::config::resolved::*;
use crate::config::types::*;
use crate::config::FullConfig;
use crate::error::ConfigError;
use crate::mapper::{DomainMapper, FieldMapper};
use std::path::Path;
use std::sync::Arc;

/// Read a `FullConfig` JSON document.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

fn sort_spec(decl: &SortDecl) -> SortSpec {
    SortSpec {
        column: decl.column.clone(),
        descending: decl.descending,
    }
}

fn infer_warehouse_key(column: &str) -> WarehouseKey {
    if column.ends_with("_code") {
        WarehouseKey::Code
    } else {
        WarehouseKey::Id
    }
}

fn resolve_relation(decl: &RelationDecl, primary_key: &str) -> RelationSpec {
    match decl {
        RelationDecl::ManyToMany {
            name,
            junction_table,
            junction_parent_column,
            junction_child_column,
            target_table,
            target_key,
            target_columns,
            resolve_as,
            on_empty,
            include_by_default,
        } => RelationSpec::ManyToMany(ManyToManySpec {
            name: name.clone(),
            junction_table: junction_table.clone(),
            junction_parent_column: junction_parent_column.clone(),
            junction_child_column: junction_child_column.clone(),
            target_table: target_table.clone(),
            target_key: target_key.clone(),
            target_columns: Projection::parse(target_columns).with_column(target_key),
            resolve_as: *resolve_as,
            on_empty: on_empty.unwrap_or_default(),
            include_by_default: *include_by_default,
        }),
        RelationDecl::OneToMany {
            name,
            target_table,
            foreign_key,
            parent_key,
            target_columns,
            order_by,
            limit,
            include_by_default,
        } => {
            let mut projection = Projection::parse(target_columns).with_column(foreign_key);
            if let Some(o) = order_by {
                projection = projection.with_column(&o.column);
            }
            RelationSpec::OneToMany(OneToManySpec {
                name: name.clone(),
                target_table: target_table.clone(),
                foreign_key: foreign_key.clone(),
                parent_key: parent_key.clone().unwrap_or_else(|| primary_key.to_string()),
                target_columns: projection,
                order_by: order_by.as_ref().map(sort_spec),
                limit: *limit,
                include_by_default: *include_by_default,
            })
        }
        RelationDecl::ManyToOne {
            name,
            local_key,
            target_table,
            target_key,
            target_columns,
            include_by_default,
        } => RelationSpec::ManyToOne(ManyToOneSpec {
            name: name.clone(),
            local_key: local_key.clone(),
            target_table: target_table.clone(),
            target_key: target_key.clone(),
            target_columns: Projection::parse(target_columns).with_column(target_key),
            include_by_default: *include_by_default,
        }),
    }
}

fn resolve_lookup(decl: &LookupDecl, default_field: &str) -> LookupSpec {
    LookupSpec {
        column: decl.column.clone(),
        table: decl.table.clone(),
        key_column: decl.key_column.clone(),
        label_column: decl.label_column.clone(),
        field: decl.field.clone().unwrap_or_else(|| default_field.to_string()),
    }
}

fn resolve_history(decl: &HistoryDecl, base_table: &str, primary_key: &str) -> HistorySpec {
    HistorySpec {
        enabled: decl.enabled,
        table: decl.source.table_or_view.clone().unwrap_or_else(|| base_table.to_string()),
        id_column: decl.source.id_column.clone().unwrap_or_else(|| primary_key.to_string()),
        anchor_column: decl.source.anchor_column.clone(),
        columns: decl.projection.columns.clone(),
        order_by: decl.projection.order_by.clone(),
        timestamp_column: decl
            .timestamp_column
            .clone()
            .unwrap_or_else(|| decl.projection.order_by.clone()),
        actor: decl.actor.as_ref().map(|l| resolve_lookup(l, "actor_name")),
        location: decl.location.as_ref().map(|l| resolve_lookup(l, "location_name")),
        limit: decl.limit.unwrap_or(HISTORY_DEFAULT_LIMIT).min(HISTORY_MAX_LIMIT),
    }
}

/// Build one runtime config. Call after `validate`.
pub fn resolve_resource(
    decl: &ResourceDecl,
    mapper: Option<Arc<dyn DomainMapper>>,
    post_process: Option<PostProcess>,
) -> ResourceConfig {
    let base_table = decl.base_table.clone().unwrap_or_else(|| decl.table.clone());
    let mapper = mapper.unwrap_or_else(|| Arc::new(FieldMapper::new(&decl.mapping)));
    ResourceConfig {
        key: decl.key.clone(),
        table: decl.table.clone(),
        primary_key: decl.primary_key.clone(),
        select_columns: Projection::parse(&decl.select_columns),
        search_columns: decl.search_columns.clone(),
        default_sort: decl.default_sort.as_ref().map(sort_spec),
        active_flag_column: decl.active_flag_column.clone(),
        soft_delete: decl.soft_delete,
        mapper,
        relations: decl
            .relations
            .iter()
            .map(|r| resolve_relation(r, &decl.primary_key))
            .collect(),
        ownership_scope: decl.ownership_scope.as_ref().map(|s| OwnershipScope {
            mode: s.mode,
            column: s.column.clone(),
            bypass_permissions: s.bypass_permissions.clone(),
        }),
        warehouse_scope: decl.warehouse_scope.as_ref().map(|s| WarehouseScope {
            column: s.column.clone(),
            key: s.key.unwrap_or_else(|| infer_warehouse_key(&s.column)),
        }),
        history: decl
            .history
            .as_ref()
            .map(|h| resolve_history(h, &base_table, &decl.primary_key)),
        base_table,
        post_process,
    }
}
