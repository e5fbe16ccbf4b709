//! SQLite database module
//!
//! ## Architecture
//!
//! - Diesel query builder over an r2d2 pool of SQLite connections (WAL mode)
//! - Every tenant-owned table is filtered by `TenantContext`
//! - Repository functions take `&mut SqliteConnection` so services can
//!   compose several of them inside one transaction
//!
//! ## Tables
//!
//! - `tenants`, `users` - farms and their accounts
//! - `animals` - registry with self-referencing pedigree
//! - `health_records`, `reproduction_records`, `production_records` - per-animal logs
//! - `transactions` - sales, purchases and expenses
//! - `sync_conflicts` - log of conflicts detected during offline sync

pub mod animals;
pub mod context;
pub mod diesel_schema;
pub mod health_records;
pub mod models;
pub mod production_records;
pub mod reports;
pub mod reproduction_records;
pub mod schema;
pub mod sync_conflicts;
pub mod tenants;
pub mod transactions;
pub mod users;

pub use context::TenantContext;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Default limit for record listings
pub fn default_limit() -> i64 {
    100
}

/// Largest page any listing returns
pub const MAX_LIMIT: i64 = 100;

/// Clamp a client-supplied limit into 1..=MAX_LIMIT
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIMIT)
}

/// Offset/limit page of records
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage<T> {
    pub total: i64,
    pub items: Vec<T>,
    pub skip: i64,
    pub limit: i64,
}

impl<T> RecordPage<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> RecordPage<U> {
        RecordPage {
            total: self.total,
            items: self.items.into_iter().map(f).collect(),
            skip: self.skip,
            limit: self.limit,
        }
    }
}

/// Escape LIKE wildcards and wrap the term for a contains match
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Per-connection PRAGMAs applied when the pool hands out a connection
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = String::from("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;");
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open or create the database file and apply the schema
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(SqlitePragmas { wal: true }))
            .build(manager)
            .map_err(|e| AppError::Internal(format!("Failed to open SQLite pool: {}", e)))?;

        let db = Self { pool };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    /// Single-connection in-memory database (for tests)
    pub fn open_in_memory() -> Result<Self, AppError> {
        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(SqlitePragmas { wal: false }))
            .build(manager)
            .map_err(|e| AppError::Internal(format!("Failed to open SQLite pool: {}", e)))?;

        let db = Self { pool };
        db.with_conn(schema::init_schema)?;
        Ok(db)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Execute a closure with a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, AppError>,
    {
        let mut conn = self.pool.get()?;
        f(&mut conn)
    }

    /// Execute a closure inside an immediate (write-locked) transaction
    pub fn transaction<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, AppError>,
    {
        let mut pooled = self.pool.get()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.immediate_transaction(f)
    }

    /// Row counts reported at startup
    pub fn stats(&self) -> Result<DbStats, AppError> {
        self.with_conn(|conn| {
            Ok(DbStats {
                tenants: diesel_schema::tenants::table.count().get_result(conn)?,
                animals: diesel_schema::animals::table.count().get_result(conn)?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub tenants: i64,
    pub animals: i64,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::models::{current_timestamp, NewTenant, NewUser};
    use super::*;
    use crate::auth::{AuthUser, Role};

    /// In-memory database with one registered tenant
    pub fn db_with_tenant() -> (Database, TenantContext) {
        let db = Database::open_in_memory().unwrap();
        let ctx = db
            .with_conn(|conn| {
                let now = current_timestamp();
                let tenant = tenants::create_tenant(
                    conn,
                    &NewTenant {
                        name: "La Esperanza".into(),
                        tax_id: None,
                        department: "Antioquia".into(),
                        municipality: "Rionegro".into(),
                        district: None,
                        address: None,
                        latitude: None,
                        longitude: None,
                        area_hectares: None,
                        ranching_type: None,
                        phone: None,
                        email: None,
                        created_at: now.clone(),
                        updated_at: now,
                    },
                )?;
                Ok(TenantContext::new(tenant.id))
            })
            .unwrap();
        (db, ctx)
    }

    /// Insert a user of the tenant and return it as an authenticated caller
    pub fn add_user(db: &Database, ctx: TenantContext, role: Role) -> AuthUser {
        let user = db
            .with_conn(|conn| {
                let now = current_timestamp();
                let email = format!("{}-{}@hato.test", role.as_str(), uuid::Uuid::new_v4());
                users::create_user(
                    conn,
                    &NewUser {
                        tenant_id: ctx.tenant_id,
                        full_name: "Test User",
                        email: &email,
                        phone: None,
                        document: None,
                        password_hash: "unused",
                        role: role.as_str(),
                        created_at: &now,
                        updated_at: &now,
                    },
                )
            })
            .unwrap();
        AuthUser {
            user_id: user.id,
            tenant: ctx,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(50), 50);
        assert_eq!(clamp_limit(1000), MAX_LIMIT);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("nested").join("hato.db")).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.tenants, 0);
        assert_eq!(stats.animals, 0);
    }
}
