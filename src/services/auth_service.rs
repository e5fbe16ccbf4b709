//! Account registration, login and token lifecycle

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::password::{check_strength, hash_password, verify_password};
use crate::auth::{AuthUser, JwtManager, Role, TokenInput, TokenType};
use crate::db::models::{current_timestamp, NewTenant, NewUser, User};
use crate::db::{tenants, users, Database};
use crate::error::AppError;
use crate::validation::{max_len, required, Validate};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    pub full_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
}

/// A new farm together with its owner account
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub tenant: NewTenant,
    pub user: RegisterUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Form logins send the email as `username`
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: User,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct AuthService {
    db: Database,
    jwt: JwtManager,
}

impl AuthService {
    pub fn new(db: Database, jwt: JwtManager) -> Self {
        Self { db, jwt }
    }

    fn tokens_for(&self, user: User) -> Result<AuthResponse, AppError> {
        let role: Role = user.role.parse().map_err(AppError::Internal)?;
        let pair = self.jwt.issue_pair(&TokenInput {
            user_id: user.id,
            tenant_id: user.tenant_id,
            role,
        })?;
        Ok(AuthResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: pair.token_type,
            expires_in: pair.expires_in,
            user,
        })
    }

    /// Create a farm and its owner in one transaction
    pub fn register(&self, mut request: RegisterRequest) -> Result<AuthResponse, AppError> {
        request.tenant.validate()?;
        let account = &request.user;
        required("full_name", &account.full_name)?;
        max_len("full_name", Some(&account.full_name), 200)?;
        let email = normalize_email(&account.email);
        if !email.contains('@') {
            return Err(AppError::InvalidInput("email is not valid".into()));
        }
        check_strength(&account.password)?;
        let password_hash = hash_password(&account.password)?;

        let now = current_timestamp();
        request.tenant.created_at = now.clone();
        request.tenant.updated_at = now.clone();

        let user = self.db.transaction(|conn| {
            if users::email_exists(conn, &email)? {
                return Err(AppError::InvalidInput("email is already registered".into()));
            }
            if let Some(ref document) = account.document {
                if users::document_exists(conn, document)? {
                    return Err(AppError::InvalidInput("document is already registered".into()));
                }
            }
            if let Some(ref tax_id) = request.tenant.tax_id {
                if tenants::tax_id_exists(conn, tax_id)? {
                    return Err(AppError::InvalidInput("tax id is already registered".into()));
                }
            }

            let tenant = tenants::create_tenant(conn, &request.tenant)?;
            users::create_user(
                conn,
                &NewUser {
                    tenant_id: tenant.id,
                    full_name: account.full_name.trim(),
                    email: &email,
                    phone: account.phone.as_deref(),
                    document: account.document.as_deref(),
                    password_hash: &password_hash,
                    role: Role::Owner.as_str(),
                    created_at: &now,
                    updated_at: &now,
                },
            )
        })?;

        info!(tenant = user.tenant_id, user = user.id, "Registered farm");
        self.tokens_for(user)
    }

    pub fn login(&self, request: &LoginRequest) -> Result<AuthResponse, AppError> {
        let email = normalize_email(&request.email);
        let user = self
            .db
            .with_conn(|conn| users::find_by_email(conn, &email))?
            .filter(|user| verify_password(&request.password, &user.password_hash))
            .ok_or_else(|| AppError::Unauthorized("Incorrect email or password".into()))?;
        if !user.active {
            return Err(AppError::Forbidden("User account is inactive".into()));
        }
        self.db.with_conn(|conn| users::touch_last_login(conn, user.id))?;
        self.tokens_for(user)
    }

    /// Exchange a refresh token for a new pair
    pub fn refresh(&self, request: &RefreshRequest) -> Result<AuthResponse, AppError> {
        let claims = self.jwt.verify(&request.refresh_token, TokenType::Refresh)?;
        let user = self.active_user(claims.user_id()?)?;
        self.tokens_for(user)
    }

    /// Resolve an access token to the caller, rejecting disabled accounts
    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AppError> {
        let claims = self.jwt.verify(token, TokenType::Access)?;
        let auth = AuthUser::from_claims(&claims)?;
        let user = self.active_user(auth.user_id)?;
        if user.tenant_id != auth.tenant.tenant_id {
            return Err(AppError::Unauthorized("Token does not match user".into()));
        }
        Ok(auth)
    }

    fn active_user(&self, user_id: i64) -> Result<User, AppError> {
        let user = self
            .db
            .with_conn(|conn| users::get_user(conn, user_id))?
            .ok_or_else(|| AppError::Unauthorized("User no longer exists".into()))?;
        if !user.active {
            return Err(AppError::Forbidden("User account is inactive".into()));
        }
        Ok(user)
    }

    pub fn me(&self, auth: &AuthUser) -> Result<User, AppError> {
        self.active_user(auth.user_id)
    }

    pub fn change_password(&self, auth: &AuthUser, request: &ChangePasswordRequest) -> Result<(), AppError> {
        let user = self.active_user(auth.user_id)?;
        if !verify_password(&request.current_password, &user.password_hash) {
            return Err(AppError::InvalidInput("current password is incorrect".into()));
        }
        check_strength(&request.new_password)?;
        let hash = hash_password(&request.new_password)?;
        self.db.with_conn(|conn| users::set_password_hash(conn, user.id, &hash))?;
        info!(user = user.id, "Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(Database::open_in_memory().unwrap(), JwtManager::new_dev(1800, 3600))
    }

    fn register_request(email: &str, tax_id: Option<&str>) -> RegisterRequest {
        serde_json::from_value(serde_json::json!({
            "tenant": {
                "name": "El Porvenir",
                "tax_id": tax_id,
                "department": "Córdoba",
                "municipality": "Montería"
            },
            "user": {
                "full_name": "Ana Pérez",
                "email": email,
                "password": "secreto1"
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_register_login_and_authenticate() {
        let auth = service();
        let registered = auth.register(register_request("Ana@Example.com", Some("900123"))).unwrap();
        assert_eq!(registered.user.email, "ana@example.com");
        assert_eq!(registered.user.role, "owner");

        let login = auth
            .login(&LoginRequest {
                email: "ana@example.com".into(),
                password: "secreto1".into(),
            })
            .unwrap();
        let caller = auth.authenticate(&login.access_token).unwrap();
        assert_eq!(caller.user_id, registered.user.id);
        assert_eq!(caller.role, Role::Owner);
        assert!(auth.authenticate(&login.refresh_token).is_err());

        let me = auth.me(&caller).unwrap();
        assert!(me.last_login_at.is_some());
    }

    #[test]
    fn test_duplicates_rejected() {
        let auth = service();
        auth.register(register_request("ana@example.com", Some("900123"))).unwrap();
        assert!(matches!(
            auth.register(register_request("ana@example.com", None)),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            auth.register(register_request("otra@example.com", Some("900123"))),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bad_credentials() {
        let auth = service();
        auth.register(register_request("ana@example.com", None)).unwrap();
        let err = auth
            .login(&LoginRequest {
                email: "ana@example.com".into(),
                password: "wrong-password".into(),
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn test_refresh_and_change_password() {
        let auth = service();
        let registered = auth.register(register_request("ana@example.com", None)).unwrap();
        let refreshed = auth
            .refresh(&RefreshRequest {
                refresh_token: registered.refresh_token.clone(),
            })
            .unwrap();
        let caller = auth.authenticate(&refreshed.access_token).unwrap();

        let wrong = ChangePasswordRequest {
            current_password: "nope".into(),
            new_password: "nuevo-secreto".into(),
        };
        assert!(auth.change_password(&caller, &wrong).is_err());

        auth.change_password(
            &caller,
            &ChangePasswordRequest {
                current_password: "secreto1".into(),
                new_password: "nuevo-secreto".into(),
            },
        )
        .unwrap();
        assert!(auth
            .login(&LoginRequest {
                email: "ana@example.com".into(),
                password: "nuevo-secreto".into(),
            })
            .is_ok());
    }
}
