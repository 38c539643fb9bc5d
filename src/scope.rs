//! Scope enforcement: ownership and warehouse narrowing of in-flight queries.
//!
//! Resources are unrestricted unless they declare a scope. A declared scope that cannot be
//! evaluated for the caller is a `ScopeConfiguration` error, never an empty or unfiltered result.

use crate::config::{OwnershipMode, OwnershipScope, ResourceConfig, WarehouseKey, WarehouseScope};
use crate::error::{AppError, ConfigError};
use crate::identity::CallerIdentityContext;
use crate::mapper::Row;
use crate::query::{Predicate, Scoped};
use serde_json::Value;
use std::str::FromStr;

/// Whether scope enforcement runs at all. Passed into each service at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScopePolicy {
    #[default]
    Enforced,
    /// Trusted background jobs only.
    Disabled,
}

impl FromStr for ScopePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enforced" => Ok(ScopePolicy::Enforced),
            "disabled" => Ok(ScopePolicy::Disabled),
            _ => Err(ConfigError::Validation(format!(
                "invalid scope enforcement: '{}' (expected enforced or disabled)",
                s
            ))),
        }
    }
}

impl ScopePolicy {
    pub fn is_enforced(self) -> bool {
        self == ScopePolicy::Enforced
    }

    /// A missing identity only degrades to anonymous when enforcement is off.
    pub fn require_identity(self, ctx: Option<CallerIdentityContext>) -> Result<CallerIdentityContext, AppError> {
        match (ctx, self) {
            (Some(ctx), _) => Ok(ctx),
            (None, ScopePolicy::Disabled) => Ok(CallerIdentityContext::anonymous()),
            (None, ScopePolicy::Enforced) => Err(AppError::Unauthenticated("no caller identity on request".into())),
        }
    }

    /// Apply every scope the resource declares to `query`.
    pub fn apply<Q: Scoped>(
        self,
        query: &mut Q,
        config: &ResourceConfig,
        ctx: &CallerIdentityContext,
    ) -> Result<(), AppError> {
        if !self.is_enforced() {
            return Ok(());
        }
        apply_ownership(query, config.ownership_scope.as_ref(), ctx)?;
        apply_warehouse(query, config.warehouse_scope.as_ref(), ctx)?;
        Ok(())
    }

    /// Stamp and check scope columns on a row about to be inserted.
    pub fn check_insert(self, row: &mut Row, config: &ResourceConfig, ctx: &CallerIdentityContext) -> Result<(), AppError> {
        if !self.is_enforced() {
            return Ok(());
        }
        if let Some(scope) = &config.ownership_scope {
            check_ownership_insert(row, scope, ctx)?;
        }
        if let Some(scope) = &config.warehouse_scope {
            check_warehouse_insert(row, scope, ctx)?;
        }
        Ok(())
    }

    /// A patch may not move a row out of the caller's scope. Columns the patch leaves alone are not checked.
    pub fn check_patch(self, patch: &Row, config: &ResourceConfig, ctx: &CallerIdentityContext) -> Result<(), AppError> {
        if !self.is_enforced() {
            return Ok(());
        }
        if let Some(scope) = &config.ownership_scope {
            if patch.contains_key(&scope.column) {
                let mut candidate = patch.clone();
                check_ownership_insert(&mut candidate, scope, ctx)?;
            }
        }
        if let Some(scope) = &config.warehouse_scope {
            if patch.contains_key(&scope.column) {
                check_warehouse_insert(patch, scope, ctx)?;
            }
        }
        Ok(())
    }
}

fn owner_value(scope: &OwnershipScope, ctx: &CallerIdentityContext) -> Result<String, AppError> {
    match scope.mode {
        OwnershipMode::OwnUser => {
            if ctx.effective_user_id.is_empty() {
                return Err(AppError::ScopeConfiguration(format!(
                    "ownership scope on '{}' needs a caller user id",
                    scope.column
                )));
            }
            Ok(ctx.effective_user_id.clone())
        }
        OwnershipMode::RoleFamily => ctx.role_family.clone().ok_or_else(|| {
            AppError::ScopeConfiguration(format!(
                "ownership scope on '{}' needs a caller role family",
                scope.column
            ))
        }),
    }
}

/// Predicate for an ownership scope, or `None` when the caller holds a bypass permission.
pub fn ownership_predicate(
    scope: &OwnershipScope,
    ctx: &CallerIdentityContext,
) -> Result<Option<Predicate>, AppError> {
    if ctx.has_any_permission(&scope.bypass_permissions) {
        return Ok(None);
    }
    let owner = owner_value(scope, ctx)?;
    Ok(Some(Predicate::eq(&scope.column, Value::String(owner))))
}

fn allowed_warehouses<'a>(scope: &WarehouseScope, ctx: &'a CallerIdentityContext) -> Result<&'a [String], AppError> {
    let list = match scope.key {
        WarehouseKey::Id => ctx.allowed_warehouse_ids.as_deref(),
        WarehouseKey::Code => ctx.allowed_warehouse_codes.as_deref(),
    };
    list.ok_or_else(|| {
        AppError::ScopeConfiguration(format!(
            "warehouse scope on '{}' expects {:?} allow-list but caller context has none",
            scope.column, scope.key
        ))
    })
}

/// Predicate for a warehouse scope, or `None` when the caller can see every warehouse.
pub fn warehouse_predicate(
    scope: &WarehouseScope,
    ctx: &CallerIdentityContext,
) -> Result<Option<Predicate>, AppError> {
    if ctx.can_see_all_warehouses {
        return Ok(None);
    }
    let allowed = allowed_warehouses(scope, ctx)?;
    let values = allowed.iter().cloned().map(Value::String).collect();
    Ok(Some(Predicate::any_of(&scope.column, values)))
}

pub fn apply_ownership<Q: Scoped>(
    query: &mut Q,
    scope: Option<&OwnershipScope>,
    ctx: &CallerIdentityContext,
) -> Result<(), AppError> {
    if let Some(scope) = scope {
        query.scope_mut().ownership = ownership_predicate(scope, ctx)?;
    }
    Ok(())
}

pub fn apply_warehouse<Q: Scoped>(
    query: &mut Q,
    scope: Option<&WarehouseScope>,
    ctx: &CallerIdentityContext,
) -> Result<(), AppError> {
    if let Some(scope) = scope {
        query.scope_mut().warehouse = warehouse_predicate(scope, ctx)?;
    }
    Ok(())
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn check_ownership_insert(row: &mut Row, scope: &OwnershipScope, ctx: &CallerIdentityContext) -> Result<(), AppError> {
    let bypass = ctx.has_any_permission(&scope.bypass_permissions);
    match row.get(&scope.column).filter(|v| !v.is_null()) {
        None => {
            let owner = owner_value(scope, ctx)?;
            row.insert(scope.column.clone(), Value::String(owner));
        }
        Some(_) if bypass => {}
        Some(v) => {
            let owner = owner_value(scope, ctx)?;
            if scalar_text(v).as_deref() != Some(owner.as_str()) {
                return Err(AppError::OutOfScope(format!("{} must be the caller's own value", scope.column)));
            }
        }
    }
    Ok(())
}

fn check_warehouse_insert(row: &Row, scope: &WarehouseScope, ctx: &CallerIdentityContext) -> Result<(), AppError> {
    if ctx.can_see_all_warehouses {
        return Ok(());
    }
    let allowed = allowed_warehouses(scope, ctx)?;
    let value = row
        .get(&scope.column)
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::Usage(format!("{} is required", scope.column)))?;
    match scalar_text(value) {
        Some(v) if allowed.iter().any(|a| *a == v) => Ok(()),
        _ => Err(AppError::OutOfScope(format!("{} is outside the caller's warehouses", scope.column))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Projection;
    use crate::query::{ScopeFilter, SelectQuery};
    use serde_json::json;

    fn own(mode: OwnershipMode) -> OwnershipScope {
        OwnershipScope {
            mode,
            column: "owner_id".into(),
            bypass_permissions: vec!["admin".into()],
        }
    }

    fn wh(key: WarehouseKey) -> WarehouseScope {
        WarehouseScope {
            column: "warehouse_id".into(),
            key,
        }
    }

    fn query() -> SelectQuery {
        SelectQuery::new("widgets", Projection::All)
    }

    #[test]
    fn self_scope_uses_user_id() {
        let ctx = CallerIdentityContext::new("u1");
        let p = ownership_predicate(&own(OwnershipMode::OwnUser), &ctx).unwrap();
        assert_eq!(p, Some(Predicate::eq("owner_id", json!("u1"))));
    }

    #[test]
    fn role_family_scope_needs_family() {
        let ctx = CallerIdentityContext::new("u1");
        assert!(matches!(
            ownership_predicate(&own(OwnershipMode::RoleFamily), &ctx),
            Err(AppError::ScopeConfiguration(_))
        ));
        let ctx = CallerIdentityContext::new("u1").with_role_family("ops");
        let p = ownership_predicate(&own(OwnershipMode::RoleFamily), &ctx).unwrap();
        assert_eq!(p, Some(Predicate::eq("owner_id", json!("ops"))));
    }

    #[test]
    fn bypass_permission_skips_ownership() {
        let ctx = CallerIdentityContext::new("u1").with_permissions(["admin"]);
        assert_eq!(ownership_predicate(&own(OwnershipMode::OwnUser), &ctx).unwrap(), None);
    }

    #[test]
    fn warehouse_scope_fails_closed_without_lists() {
        let ctx = CallerIdentityContext::new("u1");
        assert!(matches!(
            warehouse_predicate(&wh(WarehouseKey::Id), &ctx),
            Err(AppError::ScopeConfiguration(_))
        ));
        // codes alone do not satisfy an id-keyed column
        let ctx = CallerIdentityContext::new("u1").with_warehouse_codes(["MAIN"]);
        assert!(matches!(
            warehouse_predicate(&wh(WarehouseKey::Id), &ctx),
            Err(AppError::ScopeConfiguration(_))
        ));
        let p = warehouse_predicate(&wh(WarehouseKey::Code), &ctx).unwrap();
        assert_eq!(p, Some(Predicate::any_of("warehouse_id", vec![json!("MAIN")])));
    }

    #[test]
    fn see_all_skips_warehouse_even_without_lists() {
        let ctx = CallerIdentityContext::new("u1").with_all_warehouses();
        assert_eq!(warehouse_predicate(&wh(WarehouseKey::Id), &ctx).unwrap(), None);
    }

    #[test]
    fn empty_allow_list_denies_rather_than_errors() {
        let ctx = CallerIdentityContext::new("u1").with_warehouse_ids(Vec::<String>::new());
        let p = warehouse_predicate(&wh(WarehouseKey::Id), &ctx).unwrap();
        assert_eq!(p, Some(Predicate::any_of("warehouse_id", vec![])));
    }

    #[test]
    fn scopes_commute() {
        let o = own(OwnershipMode::OwnUser);
        let w = wh(WarehouseKey::Id);
        let contexts = [
            CallerIdentityContext::new("u1").with_warehouse_ids(["w1", "w2"]),
            CallerIdentityContext::new("u2").with_all_warehouses(),
            CallerIdentityContext::new("u3").with_permissions(["admin"]).with_warehouse_ids(["w9"]),
        ];
        for ctx in &contexts {
            let mut a = query();
            apply_ownership(&mut a, Some(&o), ctx).unwrap();
            apply_warehouse(&mut a, Some(&w), ctx).unwrap();
            let mut b = query();
            apply_warehouse(&mut b, Some(&w), ctx).unwrap();
            apply_ownership(&mut b, Some(&o), ctx).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn absent_scopes_leave_query_untouched() {
        let ctx = CallerIdentityContext::new("u1");
        let mut q = query();
        apply_ownership(&mut q, None, &ctx).unwrap();
        apply_warehouse(&mut q, None, &ctx).unwrap();
        assert_eq!(q.scope, ScopeFilter::default());
    }

    #[test]
    fn require_identity_follows_policy() {
        assert!(matches!(
            ScopePolicy::Enforced.require_identity(None),
            Err(AppError::Unauthenticated(_))
        ));
        let anon = ScopePolicy::Disabled.require_identity(None).unwrap();
        assert!(anon.effective_user_id.is_empty());
        let ctx = ScopePolicy::Enforced
            .require_identity(Some(CallerIdentityContext::new("u1")))
            .unwrap();
        assert_eq!(ctx.effective_user_id, "u1");
    }

    #[test]
    fn insert_stamps_owner_and_checks_warehouse() {
        let o = own(OwnershipMode::OwnUser);
        let w = wh(WarehouseKey::Id);
        let ctx = CallerIdentityContext::new("u1").with_warehouse_ids(["w1"]);

        let mut row = json!({ "warehouse_id": "w1" }).as_object().cloned().unwrap();
        check_ownership_insert(&mut row, &o, &ctx).unwrap();
        assert_eq!(row["owner_id"], json!("u1"));
        check_warehouse_insert(&row, &w, &ctx).unwrap();

        let mut row = json!({ "owner_id": "u2" }).as_object().cloned().unwrap();
        assert!(matches!(check_ownership_insert(&mut row, &o, &ctx), Err(AppError::OutOfScope(_))));

        let row = json!({ "warehouse_id": "w2" }).as_object().cloned().unwrap();
        assert!(matches!(check_warehouse_insert(&row, &w, &ctx), Err(AppError::OutOfScope(_))));

        let row = Row::new();
        assert!(matches!(check_warehouse_insert(&row, &w, &ctx), Err(AppError::Usage(_))));
    }

    #[test]
    fn bypass_allows_foreign_owner_on_insert() {
        let o = own(OwnershipMode::OwnUser);
        let ctx = CallerIdentityContext::new("u1").with_permissions(["admin"]);
        let mut row = json!({ "owner_id": "u2" }).as_object().cloned().unwrap();
        check_ownership_insert(&mut row, &o, &ctx).unwrap();
        assert_eq!(row["owner_id"], json!("u2"));
    }
}
