//! Authentication: JWT tokens, password hashing and roles

pub mod jwt;
pub mod password;
pub mod roles;

pub use jwt::{extract_token_from_header, Claims, JwtManager, TokenInput, TokenPair, TokenType};
pub use roles::Role;

use crate::db::TenantContext;
use crate::error::AppError;

/// Caller identity resolved from an access token
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
    pub tenant: TenantContext,
    pub role: Role,
}

impl AuthUser {
    pub fn from_claims(claims: &Claims) -> Result<Self, AppError> {
        Ok(Self {
            user_id: claims.user_id()?,
            tenant: TenantContext::new(claims.tenant_id),
            role: claims.role,
        })
    }

    pub fn require_tenant_admin(&self) -> Result<(), AppError> {
        if self.role.can_manage_tenant() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only farm owners and administrators can do this".into(),
            ))
        }
    }
}
