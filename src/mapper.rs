//! Row <-> domain object mapping.

use crate::config::{KeyCase, MappingDecl};
use crate::error::AppError;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

/// One store row keyed by column name.
pub type Row = Map<String, Value>;

/// Pure mapping between store rows and the domain objects a resource exposes.
/// `to_domain` must be total: missing optional columns never fail.
pub trait DomainMapper: Send + Sync + Debug {
    fn to_domain(&self, row: &Row) -> Value;

    /// Turn a create/patch payload into the column patch written to the store.
    fn from_input(&self, input: &Value) -> Result<Row, AppError>;

    /// Domain field name used for a column (relation rows and history rows go through this).
    fn field_name(&self, column: &str) -> String;
}

/// Config-driven mapper: explicit renames, then key case; server-managed columns are never written.
#[derive(Clone, Debug)]
pub struct FieldMapper {
    key_case: KeyCase,
    renames: HashMap<String, String>,
    reverse: HashMap<String, String>,
    server_managed: HashSet<String>,
}

impl FieldMapper {
    pub fn new(decl: &MappingDecl) -> Self {
        let server_managed = decl
            .server_managed
            .clone()
            .unwrap_or_else(|| vec!["created_at".into(), "updated_at".into()])
            .into_iter()
            .collect();
        let reverse = decl
            .field_renames
            .iter()
            .map(|(col, field)| (field.clone(), col.clone()))
            .collect();
        FieldMapper {
            key_case: decl.key_case,
            renames: decl.field_renames.clone(),
            reverse,
            server_managed,
        }
    }

    fn column_name(&self, field: &str) -> String {
        self.reverse
            .get(field)
            .cloned()
            .unwrap_or_else(|| self.key_case.column_for(field))
    }
}

impl Default for FieldMapper {
    fn default() -> Self {
        FieldMapper::new(&MappingDecl::default())
    }
}

impl DomainMapper for FieldMapper {
    fn to_domain(&self, row: &Row) -> Value {
        let mut out = Map::with_capacity(row.len());
        for (col, v) in row {
            out.insert(self.field_name(col), v.clone());
        }
        Value::Object(out)
    }

    fn from_input(&self, input: &Value) -> Result<Row, AppError> {
        let obj = input
            .as_object()
            .ok_or_else(|| AppError::Validation("body must be a JSON object".into()))?;
        let mut row = Row::new();
        for (field, v) in obj {
            let col = self.column_name(field);
            if self.server_managed.contains(&col) {
                continue;
            }
            row.insert(col, v.clone());
        }
        Ok(row)
    }

    fn field_name(&self, column: &str) -> String {
        self.renames
            .get(column)
            .cloned()
            .unwrap_or_else(|| self.key_case.field_for(column))
    }
}
