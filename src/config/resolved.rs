//! Resolved resource model: declarations validated and flattened for runtime use.
//! Built once at startup and never mutated afterwards.

use crate::config::{OnEmptyPolicy, OwnershipMode, ResolveAs, WarehouseKey};
use crate::mapper::DomainMapper;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Default and ceiling for history version queries.
pub const HISTORY_DEFAULT_LIMIT: u32 = 200;
pub const HISTORY_MAX_LIMIT: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub descending: bool,
}

/// Columns to read. `All` renders as `*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

impl Projection {
    /// Parse a comma-separated column list; `*` (or empty) selects everything.
    pub fn parse(s: &str) -> Self {
        let cols: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if cols.is_empty() || cols.iter().any(|c| c == "*") {
            Projection::All
        } else {
            Projection::Columns(cols)
        }
    }

    /// Add a column if the projection is explicit and does not already carry it.
    pub fn with_column(mut self, column: &str) -> Self {
        if let Projection::Columns(cols) = &mut self {
            if !cols.iter().any(|c| c == column) {
                cols.push(column.to_string());
            }
        }
        self
    }

    pub fn columns(&self) -> Option<&[String]> {
        match self {
            Projection::All => None,
            Projection::Columns(c) => Some(c),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ManyToManySpec {
    pub name: String,
    pub junction_table: String,
    pub junction_parent_column: String,
    pub junction_child_column: String,
    pub target_table: Option<String>,
    pub target_key: String,
    pub target_columns: Projection,
    pub resolve_as: ResolveAs,
    pub on_empty: OnEmptyPolicy,
    pub include_by_default: bool,
}

#[derive(Clone, Debug)]
pub struct OneToManySpec {
    pub name: String,
    pub target_table: String,
    pub foreign_key: String,
    /// Parent column the foreign key points at; the resource primary key unless declared.
    pub parent_key: String,
    pub target_columns: Projection,
    pub order_by: Option<SortSpec>,
    pub limit: Option<usize>,
    pub include_by_default: bool,
}

#[derive(Clone, Debug)]
pub struct ManyToOneSpec {
    pub name: String,
    pub local_key: String,
    pub target_table: String,
    pub target_key: String,
    pub target_columns: Projection,
    pub include_by_default: bool,
}

#[derive(Clone, Debug)]
pub enum RelationSpec {
    ManyToMany(ManyToManySpec),
    OneToMany(OneToManySpec),
    ManyToOne(ManyToOneSpec),
}

impl RelationSpec {
    pub fn name(&self) -> &str {
        match self {
            RelationSpec::ManyToMany(s) => &s.name,
            RelationSpec::OneToMany(s) => &s.name,
            RelationSpec::ManyToOne(s) => &s.name,
        }
    }

    /// Column of the owning row this relation joins on, when it is not the primary key.
    pub fn parent_column(&self) -> Option<&str> {
        match self {
            RelationSpec::ManyToMany(_) => None,
            RelationSpec::OneToMany(s) => Some(&s.parent_key),
            RelationSpec::ManyToOne(s) => Some(&s.local_key),
        }
    }

    pub fn include_by_default(&self) -> bool {
        match self {
            RelationSpec::ManyToMany(s) => s.include_by_default,
            RelationSpec::OneToMany(s) => s.include_by_default,
            RelationSpec::ManyToOne(s) => s.include_by_default,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OwnershipScope {
    pub mode: OwnershipMode,
    pub column: String,
    pub bypass_permissions: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct WarehouseScope {
    pub column: String,
    pub key: WarehouseKey,
}

#[derive(Clone, Debug)]
pub struct LookupSpec {
    /// Column on the history row holding the lookup key.
    pub column: String,
    pub table: String,
    pub key_column: String,
    pub label_column: String,
    /// Field set on each enriched row.
    pub field: String,
}

#[derive(Clone, Debug)]
pub struct HistorySpec {
    pub enabled: bool,
    pub table: String,
    pub id_column: String,
    pub anchor_column: String,
    pub columns: Vec<String>,
    pub order_by: String,
    pub timestamp_column: String,
    pub actor: Option<LookupSpec>,
    pub location: Option<LookupSpec>,
    pub limit: u32,
}

/// Cross-relation hook run once per hydration pass over the mapped domain objects.
#[derive(Clone)]
pub struct PostProcess(pub Arc<dyn Fn(Vec<Value>) -> Vec<Value> + Send + Sync>);

impl PostProcess {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Vec<Value> + Send + Sync + 'static,
    {
        PostProcess(Arc::new(f))
    }

    pub fn apply(&self, rows: Vec<Value>) -> Vec<Value> {
        (self.0)(rows)
    }
}

impl fmt::Debug for PostProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PostProcess(..)")
    }
}

#[derive(Clone, Debug)]
pub struct ResourceConfig {
    pub key: String,
    pub table: String,
    pub base_table: String,
    pub primary_key: String,
    pub select_columns: Projection,
    pub search_columns: Vec<String>,
    pub default_sort: Option<SortSpec>,
    pub active_flag_column: Option<String>,
    pub soft_delete: bool,
    pub mapper: Arc<dyn DomainMapper>,
    pub relations: Vec<RelationSpec>,
    pub ownership_scope: Option<OwnershipScope>,
    pub warehouse_scope: Option<WarehouseScope>,
    pub history: Option<HistorySpec>,
    pub post_process: Option<PostProcess>,
}

impl ResourceConfig {
    /// Projection used for reads: the configured columns plus every column hydration joins on.
    pub fn read_projection(&self) -> Projection {
        self.relations
            .iter()
            .filter_map(RelationSpec::parent_column)
            .fold(self.select_columns.clone().with_column(&self.primary_key), Projection::with_column)
    }

    /// Columns callers may filter or sort on. `None` when the projection is `*` (any identifier).
    pub fn known_columns(&self) -> Option<HashSet<&str>> {
        let cols = self.select_columns.columns()?;
        let mut set: HashSet<&str> = cols.iter().map(String::as_str).collect();
        set.insert(&self.primary_key);
        if let Some(s) = &self.ownership_scope {
            set.insert(&s.column);
        }
        if let Some(s) = &self.warehouse_scope {
            set.insert(&s.column);
        }
        if let Some(c) = &self.active_flag_column {
            set.insert(c);
        }
        Some(set)
    }

    /// Tables and views this resource reads or writes, including relation and history sources.
    pub fn tables(&self) -> Vec<&str> {
        let mut out = vec![self.table.as_str(), self.base_table.as_str()];
        for rel in &self.relations {
            match rel {
                RelationSpec::ManyToMany(s) => {
                    out.push(&s.junction_table);
                    out.extend(s.target_table.as_deref());
                }
                RelationSpec::OneToMany(s) => out.push(&s.target_table),
                RelationSpec::ManyToOne(s) => out.push(&s.target_table),
            }
        }
        if let Some(h) = &self.history {
            out.push(&h.table);
            out.extend(h.actor.iter().chain(h.location.iter()).map(|l| l.table.as_str()));
        }
        out
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name() == name)
    }
}
