//! Tenant context for multi-tenant database operations
//!
//! Every repository function takes a `TenantContext` and filters on its
//! `tenant_id`, so one farm can never read or write another farm's rows.

/// Tenant context passed to all database operations for isolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TenantContext {
    /// Tenant (farm) identifier
    pub tenant_id: i64,
}

impl TenantContext {
    pub fn new(tenant_id: i64) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }
}

impl std::fmt::Display for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TenantContext({})", self.tenant_id)
    }
}
