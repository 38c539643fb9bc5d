//! Config validation: key shape, identifier safety, and internal consistency.

use crate::config::{FullConfig, RelationDecl, ResourceDecl};
use crate::config::resolved::HISTORY_MAX_LIMIT;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Longest accepted resource key or alias.
pub const MAX_KEY_LEN: usize = 64;

fn key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]+(?:[_\-.][A-Za-z0-9]+)*$").expect("static key pattern"))
}

fn column_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static column pattern"))
}

fn table_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("static table pattern")
    })
}

/// Basic shape check for resource keys: non-empty, bounded, alphanumeric segments joined by `_`, `-` or `.`.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= MAX_KEY_LEN && key_pattern().is_match(key)
}

pub fn is_valid_column(name: &str) -> bool {
    column_pattern().is_match(name)
}

pub fn is_valid_table(name: &str) -> bool {
    table_pattern().is_match(name)
}

struct Check<'a> {
    resource: &'a str,
}

impl Check<'_> {
    fn column(&self, name: &str) -> Result<(), ConfigError> {
        if is_valid_column(name) {
            Ok(())
        } else {
            Err(self.bad(name))
        }
    }

    fn table(&self, name: &str) -> Result<(), ConfigError> {
        if is_valid_table(name) {
            Ok(())
        } else {
            Err(self.bad(name))
        }
    }

    fn projection(&self, list: &str) -> Result<(), ConfigError> {
        for col in list.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            if col != "*" {
                self.column(col)?;
            }
        }
        Ok(())
    }

    fn bad(&self, ident: &str) -> ConfigError {
        ConfigError::InvalidIdentifier {
            resource: self.resource.to_string(),
            ident: ident.to_string(),
        }
    }

    fn invalid(&self, msg: &str) -> ConfigError {
        ConfigError::Validation(format!("resource '{}': {}", self.resource, msg))
    }
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut keys = HashSet::new();
    for r in &config.resources {
        for key in std::iter::once(&r.key).chain(r.aliases.iter()) {
            if !is_valid_key(key) {
                return Err(ConfigError::InvalidKey(key.clone()));
            }
            if !keys.insert(key.as_str()) {
                return Err(ConfigError::DuplicateKey(key.clone()));
            }
        }
        validate_resource(r)?;
    }

    for (table, columns) in &config.column_types {
        let check = Check { resource: "column_types" };
        check.table(table)?;
        for col in columns.keys() {
            check.column(col)?;
        }
    }
    Ok(())
}

fn validate_resource(r: &ResourceDecl) -> Result<(), ConfigError> {
    let check = Check { resource: &r.key };
    check.table(&r.table)?;
    if let Some(t) = &r.base_table {
        check.table(t)?;
    }
    check.column(&r.primary_key)?;
    if r.select_columns.trim().is_empty() {
        return Err(check.invalid("select_columns must not be empty"));
    }
    check.projection(&r.select_columns)?;
    for c in &r.search_columns {
        check.column(c)?;
    }
    if let Some(s) = &r.default_sort {
        check.column(&s.column)?;
    }
    if let Some(c) = &r.active_flag_column {
        check.column(c)?;
    } else if r.soft_delete {
        return Err(check.invalid("soft_delete requires active_flag_column"));
    }
    for col in r.mapping.field_renames.keys() {
        check.column(col)?;
    }
    if let Some(s) = &r.ownership_scope {
        check.column(&s.column)?;
    }
    if let Some(s) = &r.warehouse_scope {
        check.column(&s.column)?;
    }

    let mut names = HashSet::new();
    for rel in &r.relations {
        if !names.insert(rel.name()) {
            return Err(check.invalid(&format!("duplicate relation '{}'", rel.name())));
        }
        validate_relation(&check, rel)?;
    }

    if let Some(h) = &r.history {
        if let Some(t) = &h.source.table_or_view {
            check.table(t)?;
        }
        if let Some(c) = &h.source.id_column {
            check.column(c)?;
        }
        check.column(&h.source.anchor_column)?;
        if h.projection.columns.is_empty() {
            return Err(check.invalid("history projection needs at least one column"));
        }
        for c in &h.projection.columns {
            check.column(c)?;
        }
        check.column(&h.projection.order_by)?;
        if let Some(c) = &h.timestamp_column {
            check.column(c)?;
        }
        for lookup in h.actor.iter().chain(h.location.iter()) {
            check.column(&lookup.column)?;
            check.table(&lookup.table)?;
            check.column(&lookup.key_column)?;
            check.column(&lookup.label_column)?;
        }
        if let Some(limit) = h.limit {
            if limit == 0 || limit > HISTORY_MAX_LIMIT {
                return Err(check.invalid(&format!("history limit must be within 1..={}", HISTORY_MAX_LIMIT)));
            }
        }
    }
    Ok(())
}

fn validate_relation(check: &Check<'_>, rel: &RelationDecl) -> Result<(), ConfigError> {
    match rel {
        RelationDecl::ManyToMany {
            junction_table,
            junction_parent_column,
            junction_child_column,
            target_table,
            target_key,
            target_columns,
            resolve_as,
            ..
        } => {
            check.table(junction_table)?;
            check.column(junction_parent_column)?;
            check.column(junction_child_column)?;
            check.column(target_key)?;
            check.projection(target_columns)?;
            match target_table {
                Some(t) => check.table(t)?,
                None if *resolve_as == crate::config::ResolveAs::Objects => {
                    return Err(check.invalid(&format!("relation '{}' resolves objects but has no target_table", rel.name())));
                }
                None => {}
            }
        }
        RelationDecl::OneToMany {
            target_table,
            foreign_key,
            parent_key,
            target_columns,
            order_by,
            ..
        } => {
            check.table(target_table)?;
            check.column(foreign_key)?;
            if let Some(p) = parent_key {
                check.column(p)?;
            }
            check.projection(target_columns)?;
            if let Some(o) = order_by {
                check.column(&o.column)?;
            }
        }
        RelationDecl::ManyToOne {
            local_key,
            target_table,
            target_key,
            target_columns,
            ..
        } => {
            check.column(local_key)?;
            check.table(target_table)?;
            check.column(target_key)?;
            check.projection(target_columns)?;
        }
    }
    Ok(())
}
