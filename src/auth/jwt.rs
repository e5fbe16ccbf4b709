//! JWT access and refresh tokens
//!
//! - Tokens are signed with HS256 (HMAC-SHA256)
//! - Access tokens are short lived; refresh tokens only mint new pairs
//! - The `token_type` claim keeps one kind from being used as the other

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::roles::Role;
use crate::config::MIN_SECRET_LEN;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Payload stored in a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub tenant_id: i64,
    pub role: Role,
    pub token_type: TokenType,
    /// Unique token id
    pub jti: String,
    pub iat: u64,
    pub exp: u64,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Malformed token subject".into()))
    }
}

/// Identity a token is issued for
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: i64,
    pub tenant_id: i64,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Token issuer and verifier
#[derive(Clone)]
pub struct JwtManager {
    secret: String,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl JwtManager {
    pub fn new(secret: String, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::Config("JWT_SECRET is required in production mode".into()));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self {
            secret,
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    /// Manager with a fixed secret for dev mode
    pub fn new_dev(access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    fn issue(&self, input: &TokenInput, token_type: TokenType) -> Result<String, AppError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AppError::Internal(format!("System time error: {}", e)))?
            .as_secs();
        let ttl = match token_type {
            TokenType::Access => self.access_ttl_secs,
            TokenType::Refresh => self.refresh_ttl_secs,
        };

        let claims = Claims {
            sub: input.user_id.to_string(),
            tenant_id: input.tenant_id,
            role: input.role,
            token_type,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
    }

    pub fn issue_pair(&self, input: &TokenInput) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue(input, TokenType::Access)?,
            refresh_token: self.issue(input, TokenType::Refresh)?,
            token_type: "bearer",
            expires_in: self.access_ttl_secs,
        })
    }

    /// Decode a token and require the expected `token_type`
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|err| {
            use jsonwebtoken::errors::ErrorKind;
            let msg = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidSignature => "Invalid signature",
                ErrorKind::InvalidToken => "Invalid token",
                _ => "Token validation failed",
            };
            AppError::Unauthorized(msg.into())
        })?;

        if data.claims.token_type != expected {
            return Err(AppError::Unauthorized("Wrong token type".into()));
        }
        Ok(data.claims)
    }
}

/// Extract token from an `Authorization: Bearer <token>` header
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new("test-secret-that-is-at-least-32-characters-long".into(), 1800, 604_800).unwrap()
    }

    fn input() -> TokenInput {
        TokenInput {
            user_id: 42,
            tenant_id: 7,
            role: Role::Owner,
        }
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let jwt = manager();
        let pair = jwt.issue_pair(&input()).unwrap();
        assert_eq!(pair.token_type, "bearer");
        assert_eq!(pair.expires_in, 1800);

        let claims = jwt.verify(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.tenant_id, 7);
        assert_eq!(claims.role, Role::Owner);
        assert_eq!(claims.exp - claims.iat, 1800);

        let refresh = jwt.verify(&pair.refresh_token, TokenType::Refresh).unwrap();
        assert_eq!(refresh.exp - refresh.iat, 604_800);
        assert_ne!(claims.jti, refresh.jti);
    }

    #[test]
    fn test_token_types_not_interchangeable() {
        let jwt = manager();
        let pair = jwt.issue_pair(&input()).unwrap();
        assert!(jwt.verify(&pair.refresh_token, TokenType::Access).is_err());
        assert!(jwt.verify(&pair.access_token, TokenType::Refresh).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtManager::new("different-secret-that-is-at-least-32-characters".into(), 1800, 60).unwrap();
        let pair = manager().issue_pair(&input()).unwrap();
        assert!(matches!(
            other.verify(&pair.access_token, TokenType::Access),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtManager::new("short".into(), 60, 60).is_err());
        assert!(JwtManager::new("".into(), 60, 60).is_err());
        let dev = JwtManager::new_dev(60, 60);
        let pair = dev.issue_pair(&input()).unwrap();
        assert!(dev.verify(&pair.access_token, TokenType::Access).is_ok());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }
}
