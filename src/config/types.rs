//! Raw resource declarations as they appear in the JSON config file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_true() -> bool {
    true
}

fn default_id() -> String {
    "id".into()
}

fn default_star() -> String {
    "*".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortDecl {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

/// Key style of domain objects produced from rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCase {
    #[default]
    Camel,
    Snake,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MappingDecl {
    #[serde(default)]
    pub key_case: KeyCase,
    /// Column name -> domain field name, applied before key case.
    #[serde(default)]
    pub field_renames: HashMap<String, String>,
    /// Columns the store manages itself; dropped from write payloads. Defaults to created_at/updated_at.
    #[serde(default)]
    pub server_managed: Option<Vec<String>>,
}

/// How junction child ids are attached to the parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveAs {
    #[default]
    Ids,
    Objects,
}

/// Meaning of a parent with no junction rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnEmptyPolicy {
    All,
    #[default]
    None,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RelationDecl {
    ManyToMany {
        name: String,
        junction_table: String,
        junction_parent_column: String,
        junction_child_column: String,
        #[serde(default)]
        target_table: Option<String>,
        #[serde(default = "default_id")]
        target_key: String,
        #[serde(default = "default_star")]
        target_columns: String,
        #[serde(default)]
        resolve_as: ResolveAs,
        #[serde(default)]
        on_empty: Option<OnEmptyPolicy>,
        #[serde(default = "default_true")]
        include_by_default: bool,
    },
    OneToMany {
        name: String,
        target_table: String,
        foreign_key: String,
        #[serde(default)]
        parent_key: Option<String>,
        #[serde(default = "default_star")]
        target_columns: String,
        #[serde(default)]
        order_by: Option<SortDecl>,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default = "default_true")]
        include_by_default: bool,
    },
    ManyToOne {
        name: String,
        local_key: String,
        target_table: String,
        #[serde(default = "default_id")]
        target_key: String,
        #[serde(default = "default_star")]
        target_columns: String,
        #[serde(default = "default_true")]
        include_by_default: bool,
    },
}

impl RelationDecl {
    pub fn name(&self) -> &str {
        match self {
            RelationDecl::ManyToMany { name, .. }
            | RelationDecl::OneToMany { name, .. }
            | RelationDecl::ManyToOne { name, .. } => name,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnershipMode {
    #[serde(rename = "self")]
    OwnUser,
    #[serde(rename = "roleFamily")]
    RoleFamily,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OwnershipScopeDecl {
    pub mode: OwnershipMode,
    pub column: String,
    #[serde(default)]
    pub bypass_permissions: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseMode {
    Column,
}

/// Which warehouse identifier form the scoped column stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarehouseKey {
    Id,
    Code,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WarehouseScopeDecl {
    pub mode: WarehouseMode,
    pub column: String,
    #[serde(default)]
    pub key: Option<WarehouseKey>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistorySourceDecl {
    #[serde(default)]
    pub table_or_view: Option<String>,
    #[serde(default)]
    pub id_column: Option<String>,
    pub anchor_column: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryProjectionDecl {
    pub columns: Vec<String>,
    #[serde(default = "default_updated_at")]
    pub order_by: String,
}

fn default_updated_at() -> String {
    "updated_at".into()
}

fn default_name() -> String {
    "name".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupDecl {
    pub column: String,
    pub table: String,
    #[serde(default = "default_id")]
    pub key_column: String,
    #[serde(default = "default_name")]
    pub label_column: String,
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryDecl {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub source: HistorySourceDecl,
    pub projection: HistoryProjectionDecl,
    #[serde(default)]
    pub timestamp_column: Option<String>,
    #[serde(default)]
    pub actor: Option<LookupDecl>,
    #[serde(default)]
    pub location: Option<LookupDecl>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceDecl {
    pub key: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub table: String,
    /// Non-view table holding every version; defaults to `table`.
    #[serde(default)]
    pub base_table: Option<String>,
    #[serde(default = "default_id")]
    pub primary_key: String,
    pub select_columns: String,
    #[serde(default)]
    pub search_columns: Vec<String>,
    #[serde(default)]
    pub default_sort: Option<SortDecl>,
    #[serde(default)]
    pub active_flag_column: Option<String>,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default)]
    pub mapping: MappingDecl,
    #[serde(default)]
    pub relations: Vec<RelationDecl>,
    #[serde(default)]
    pub ownership_scope: Option<OwnershipScopeDecl>,
    #[serde(default)]
    pub warehouse_scope: Option<WarehouseScopeDecl>,
    #[serde(default)]
    pub history: Option<HistoryDecl>,
}

/// Everything loaded at boot.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
    /// table -> column -> PostgreSQL type; used to cast bound parameters.
    #[serde(default)]
    pub column_types: HashMap<String, HashMap<String, String>>,
}
