//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::AppError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), AppError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, AppError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| AppError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let row = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<VersionRow>(conn)
        .optional()?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), AppError> {
    conn.batch_execute(&format!(
        "DELETE FROM schema_version; INSERT INTO schema_version (version) VALUES ({});",
        version
    ))
    .map_err(|e| AppError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), AppError> {
    conn.batch_execute(TENANT_SCHEMA)
        .map_err(|e| AppError::Internal(format!("Failed to create tenant tables: {}", e)))?;

    conn.batch_execute(HERD_SCHEMA)
        .map_err(|e| AppError::Internal(format!("Failed to create herd tables: {}", e)))?;

    conn.batch_execute(LEDGER_SCHEMA)
        .map_err(|e| AppError::Internal(format!("Failed to create ledger tables: {}", e)))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| AppError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), AppError> {
    info!("No migration steps registered from v{}", from_version);
    set_schema_version(conn, SCHEMA_VERSION)
}

/// Tenants and their users
const TENANT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    tax_id TEXT UNIQUE,
    department TEXT NOT NULL,
    municipality TEXT NOT NULL,
    district TEXT,
    address TEXT,
    latitude REAL,
    longitude REAL,
    area_hectares REAL,
    ranching_type TEXT,
    phone TEXT,
    email TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    plan TEXT NOT NULL DEFAULT 'basic',
    plan_expires_on TEXT,
    uses_milk_control INTEGER NOT NULL DEFAULT 0,
    uses_reproduction_control INTEGER NOT NULL DEFAULT 1,
    uses_health_control INTEGER NOT NULL DEFAULT 1,
    uses_finance_control INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 1,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    last_sync_at TEXT,
    last_modified_device TEXT
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone TEXT,
    document TEXT UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'operator',
    active INTEGER NOT NULL DEFAULT 1,
    email_verified INTEGER NOT NULL DEFAULT 0,
    language TEXT NOT NULL DEFAULT 'es',
    receive_notifications INTEGER NOT NULL DEFAULT 1,
    last_login_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Animals and the per-animal logs
const HERD_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS animals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    tag_number TEXT NOT NULL,
    name TEXT,
    photo_url TEXT,
    sex TEXT NOT NULL,
    birth_date TEXT,
    breed TEXT,
    color TEXT,
    mother_id INTEGER REFERENCES animals(id),
    father_id INTEGER REFERENCES animals(id),
    birth_weight REAL,
    current_weight REAL,
    previous_weight REAL,
    last_weighed_on TEXT,
    acquisition_type TEXT,
    entry_date TEXT NOT NULL,
    origin_farm TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    exit_date TEXT,
    exit_reason TEXT,
    category TEXT,
    purpose TEXT,
    current_lot TEXT,
    current_paddock TEXT,
    registry_number TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 1,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    last_sync_at TEXT,
    last_modified_device TEXT,
    UNIQUE (tenant_id, tag_number)
);

CREATE TABLE IF NOT EXISTS health_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    animal_id INTEGER NOT NULL REFERENCES animals(id),
    record_type TEXT NOT NULL,
    date TEXT NOT NULL,
    next_dose_on TEXT,
    product TEXT,
    dose TEXT,
    route TEXT,
    product_lot TEXT,
    product_expires_on TEXT,
    diagnosis TEXT,
    animal_weight REAL,
    temperature REAL,
    veterinarian TEXT,
    applied_by TEXT,
    cost REAL,
    milk_withdrawal_days INTEGER,
    meat_withdrawal_days INTEGER,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    recorded_by INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 1,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    last_sync_at TEXT,
    last_modified_device TEXT
);

CREATE TABLE IF NOT EXISTS reproduction_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    animal_id INTEGER NOT NULL REFERENCES animals(id),
    event_type TEXT NOT NULL,
    event_date TEXT NOT NULL,
    service_type TEXT,
    sire_id INTEGER REFERENCES animals(id),
    semen_code TEXT,
    service_number INTEGER,
    diagnosis TEXT,
    gestation_days INTEGER,
    expected_birth_date TEXT,
    birth_date TEXT,
    offspring_count INTEGER,
    offspring_sex TEXT,
    birth_weight REAL,
    birth_ease TEXT,
    technician TEXT,
    cost REAL,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    recorded_by INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 1,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    last_sync_at TEXT,
    last_modified_device TEXT
);

CREATE TABLE IF NOT EXISTS production_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    animal_id INTEGER NOT NULL REFERENCES animals(id),
    production_type TEXT NOT NULL,
    date TEXT NOT NULL,
    liters REAL,
    shift TEXT,
    sale_weight REAL,
    quality TEXT,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    recorded_by INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 1,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    last_sync_at TEXT,
    last_modified_device TEXT
);
"#;

/// Financial transactions and the sync conflict log
const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    date TEXT NOT NULL,
    concept TEXT NOT NULL,
    amount REAL NOT NULL,
    animal_id INTEGER REFERENCES animals(id),
    animal_count INTEGER,
    total_weight REAL,
    price_per_kg REAL,
    counterparty TEXT,
    counterparty_document TEXT,
    payment_method TEXT,
    expense_category TEXT,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    recorded_by INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    sync_version INTEGER NOT NULL DEFAULT 1,
    sync_status TEXT NOT NULL DEFAULT 'pending',
    last_sync_at TEXT,
    last_modified_device TEXT
);

CREATE TABLE IF NOT EXISTS sync_conflicts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_id INTEGER NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    device_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    server_version INTEGER NOT NULL,
    client_version INTEGER NOT NULL,
    resolution TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_users_tenant ON users(tenant_id);
CREATE INDEX IF NOT EXISTS idx_animals_tenant_status ON animals(tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_animals_tenant_updated ON animals(tenant_id, updated_at);
CREATE INDEX IF NOT EXISTS idx_animals_mother ON animals(mother_id);
CREATE INDEX IF NOT EXISTS idx_animals_father ON animals(father_id);
CREATE INDEX IF NOT EXISTS idx_health_tenant_animal ON health_records(tenant_id, animal_id);
CREATE INDEX IF NOT EXISTS idx_health_tenant_date ON health_records(tenant_id, date);
CREATE INDEX IF NOT EXISTS idx_health_next_dose ON health_records(tenant_id, next_dose_on);
CREATE INDEX IF NOT EXISTS idx_repro_tenant_animal ON reproduction_records(tenant_id, animal_id);
CREATE INDEX IF NOT EXISTS idx_repro_tenant_date ON reproduction_records(tenant_id, event_date);
CREATE INDEX IF NOT EXISTS idx_production_tenant_date ON production_records(tenant_id, date);
CREATE INDEX IF NOT EXISTS idx_transactions_tenant_date ON transactions(tenant_id, date);
CREATE INDEX IF NOT EXISTS idx_conflicts_tenant ON sync_conflicts(tenant_id, created_at);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        init_schema(&mut conn).unwrap();
        init_schema(&mut conn).unwrap();
        assert_eq!(get_schema_version(&mut conn).unwrap(), SCHEMA_VERSION);
    }
}
