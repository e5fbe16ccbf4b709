//! Farm settings and herd composition

use serde_json::{Map, Value};
use tracing::info;

use crate::auth::AuthUser;
use crate::db::models::Tenant;
use crate::db::tenants::{self, TenantStats};
use crate::db::Database;
use crate::error::AppError;
use crate::sync::{apply_patch, update_versioned, SyncRecord};
use crate::validation::Validate;

pub struct TenantService {
    db: Database,
}

impl TenantService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get(&self, auth: &AuthUser) -> Result<Tenant, AppError> {
        self.db
            .with_conn(|conn| tenants::get_tenant(conn, &auth.tenant))?
            .ok_or_else(|| AppError::NotFound("Farm not found".into()))
    }

    /// Partial update, restricted to owners and admins
    pub fn update(&self, auth: &AuthUser, patch: &Map<String, Value>) -> Result<Tenant, AppError> {
        auth.require_tenant_admin()?;
        let ctx = auth.tenant;
        let tenant = self.db.transaction(|conn| {
            update_versioned(conn, &ctx, ctx.tenant_id, |conn, current: &Tenant| {
                let next = apply_patch(current, patch)?;
                next.validate()?;
                next.check_relations(conn, &ctx)?;
                Ok(next)
            })
        })?;
        info!(tenant = tenant.id, version = tenant.sync_version, "Farm updated");
        Ok(tenant)
    }

    pub fn stats(&self, auth: &AuthUser) -> Result<TenantStats, AppError> {
        self.db.with_conn(|conn| {
            let tenant = tenants::get_tenant(conn, &auth.tenant)?
                .ok_or_else(|| AppError::NotFound("Farm not found".into()))?;
            tenants::tenant_stats(conn, &tenant)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::test_support::db_with_tenant;
    use serde_json::json;

    fn caller(ctx: crate::db::TenantContext, role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            tenant: ctx,
            role,
        }
    }

    #[test]
    fn test_update_requires_admin() {
        let (db, ctx) = db_with_tenant();
        let service = TenantService::new(db);
        let patch = json!({"phone": "3001234567"});

        let err = service
            .update(&caller(ctx, Role::Operator), patch.as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let tenant = service
            .update(&caller(ctx, Role::Owner), patch.as_object().unwrap())
            .unwrap();
        assert_eq!(tenant.phone.as_deref(), Some("3001234567"));
        assert_eq!(tenant.sync_version, 2);
        assert_eq!(tenant.sync_status, "pending");
    }

    #[test]
    fn test_update_rejects_blank_name() {
        let (db, ctx) = db_with_tenant();
        let service = TenantService::new(db);
        let patch = json!({"name": "  "});
        assert!(matches!(
            service.update(&caller(ctx, Role::Admin), patch.as_object().unwrap()),
            Err(AppError::InvalidInput(_))
        ));
    }
}
