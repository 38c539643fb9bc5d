//! Caller identity as resolved by the session layer. Built per request, never cached.

use std::collections::HashSet;

/// Deliberately not `Clone`: a context belongs to one request and is passed by reference.
#[derive(Debug, Default)]
pub struct CallerIdentityContext {
    pub effective_user_id: String,
    pub permissions: HashSet<String>,
    pub role_family: Option<String>,
    pub can_see_all_warehouses: bool,
    /// Legacy warehouse codes. `None` means the session layer did not resolve them.
    pub allowed_warehouse_codes: Option<Vec<String>>,
    /// Canonical warehouse ids. `None` means the session layer did not resolve them.
    pub allowed_warehouse_ids: Option<Vec<String>>,
}

impl CallerIdentityContext {
    pub fn new(effective_user_id: impl Into<String>) -> Self {
        CallerIdentityContext {
            effective_user_id: effective_user_id.into(),
            ..Default::default()
        }
    }

    /// Context used when scoping is disabled and no identity was supplied.
    pub fn anonymous() -> Self {
        CallerIdentityContext::default()
    }

    pub fn with_permissions<I, S>(mut self, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(perms.into_iter().map(Into::into));
        self
    }

    pub fn with_role_family(mut self, family: impl Into<String>) -> Self {
        self.role_family = Some(family.into());
        self
    }

    pub fn with_all_warehouses(mut self) -> Self {
        self.can_see_all_warehouses = true;
        self
    }

    pub fn with_warehouse_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_warehouse_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_warehouse_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_warehouse_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn has_any_permission(&self, perms: &[String]) -> bool {
        perms.iter().any(|p| self.permissions.contains(p))
    }
}
