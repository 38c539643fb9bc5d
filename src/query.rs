//! Structured queries handed to a `QueryExecutor`. Identifiers come from config only; values stay values.

use crate::config::Projection;
use crate::mapper::Row;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `column = value`; a JSON null means `column IS NULL`.
    Eq { column: String, value: Value },
    /// `column IN (values)`; an empty list matches nothing.
    In { column: String, values: Vec<Value> },
    /// Case-insensitive substring match of `term` against any of `columns`.
    Search { columns: Vec<String>, term: String },
}

impl Predicate {
    pub fn eq(column: &str, value: Value) -> Self {
        Predicate::Eq {
            column: column.to_string(),
            value,
        }
    }

    pub fn any_of(column: &str, values: Vec<Value>) -> Self {
        Predicate::In {
            column: column.to_string(),
            values,
        }
    }
}

/// Authorization predicates, kept apart from caller filters. Each scope owns one slot, so the order
/// in which scopes are applied cannot change the resulting query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeFilter {
    pub ownership: Option<Predicate>,
    pub warehouse: Option<Predicate>,
}

impl ScopeFilter {
    pub fn predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.ownership.iter().chain(self.warehouse.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.ownership.is_none() && self.warehouse.is_none()
    }
}

/// Queries that accept scope narrowing.
pub trait Scoped {
    fn scope_mut(&mut self) -> &mut ScopeFilter;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub projection: Projection,
    pub predicates: Vec<Predicate>,
    pub scope: ScopeFilter,
    pub order: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    pub fn new(table: &str, projection: Projection) -> Self {
        SelectQuery {
            table: table.to_string(),
            projection,
            predicates: Vec::new(),
            scope: ScopeFilter::default(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        if !self.order.iter().any(|o| o.column == column) {
            self.order.push(OrderBy {
                column: column.to_string(),
                descending,
            });
        }
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Caller predicates followed by scope predicates; all AND-ed.
    pub fn all_predicates(&self) -> impl Iterator<Item = &Predicate> {
        self.predicates.iter().chain(self.scope.predicates())
    }
}

impl Scoped for SelectQuery {
    fn scope_mut(&mut self) -> &mut ScopeFilter {
        &mut self.scope
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InsertQuery {
    pub table: String,
    /// Primary key column; stores that generate keys fill it when absent.
    pub key_column: String,
    pub values: Row,
    pub returning: Projection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateQuery {
    pub table: String,
    pub key_column: String,
    pub key: Value,
    pub set: Row,
    pub scope: ScopeFilter,
    pub returning: Projection,
}

impl Scoped for UpdateQuery {
    fn scope_mut(&mut self) -> &mut ScopeFilter {
        &mut self.scope
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteQuery {
    pub table: String,
    pub key_column: String,
    pub key: Value,
    pub scope: ScopeFilter,
    pub returning: Projection,
}

impl Scoped for DeleteQuery {
    fn scope_mut(&mut self) -> &mut ScopeFilter {
        &mut self.scope
    }
}
