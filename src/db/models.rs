//! Diesel model definitions for database tables
//!
//! All tenant-owned models include `tenant_id` for isolation.
//! - Row structs: Queryable for SELECT, Insertable/AsChangeset for sync writes
//! - `New*` structs: request bodies that double as INSERT values; server-owned
//!   columns are `#[serde(skip)]` and stamped by the service layer

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps and dates as TEXT)
// ============================================================================

/// Fixed-width timestamp format; lexical order equals chronological order
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    format_timestamp(&Utc::now())
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a client or stored timestamp (RFC 3339, or naive which is taken as UTC)
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Today's date (UTC) as YYYY-MM-DD
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn default_active() -> String {
    status::ACTIVE.to_string()
}

fn default_sync_status() -> String {
    sync_status::PENDING.to_string()
}

// ============================================================================
// Vocabularies (stored as TEXT)
// ============================================================================

/// Row status values; `deleted` is the soft-delete marker for every table
pub mod status {
    pub const ACTIVE: &str = "active";
    pub const SOLD: &str = "sold";
    pub const DEAD: &str = "dead";
    pub const TRANSFERRED: &str = "transferred";
    pub const STOLEN: &str = "stolen";
    pub const DELETED: &str = "deleted";

    pub const ANIMAL: &[&str] = &[ACTIVE, SOLD, DEAD, TRANSFERRED, STOLEN, DELETED];
    pub const RECORD: &[&str] = &[ACTIVE, DELETED];
}

pub mod sync_status {
    pub const PENDING: &str = "pending";
    pub const SYNCED: &str = "synced";
    pub const CONFLICT: &str = "conflict";

    pub const ALL: &[&str] = &[PENDING, SYNCED, CONFLICT];
}

pub mod sex {
    pub const MALE: &str = "male";
    pub const FEMALE: &str = "female";

    pub const ALL: &[&str] = &[MALE, FEMALE];
}

pub mod category {
    pub const CALF: &str = "calf";
    pub const HEIFER: &str = "heifer";
    pub const STEER: &str = "steer";
    pub const COW: &str = "cow";
    pub const BULL: &str = "bull";
}

pub const HEALTH_RECORD_TYPES: &[&str] = &["vaccine", "treatment", "deworming", "surgery", "other"];
pub const HEALTH_ROUTES: &[&str] = &[
    "intramuscular",
    "subcutaneous",
    "oral",
    "topical",
    "intravenous",
    "intramammary",
];
pub const REPRODUCTION_EVENTS: &[&str] = &["service", "diagnosis", "birth", "abortion", "dry_off", "other"];
pub const SERVICE_TYPES: &[&str] = &["natural", "artificial_insemination", "embryo_transfer"];
pub const DIAGNOSES: &[&str] = &["pregnant", "open", "uncertain"];
pub const PRODUCTION_TYPES: &[&str] = &["milk", "meat", "wool", "other"];
pub const SHIFTS: &[&str] = &["morning", "afternoon", "night"];
pub const TRANSACTION_KINDS: &[&str] = &["sale", "purchase", "expense"];

// ============================================================================
// Tenant Models
// ============================================================================

/// Tenant (farm) row
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = tenants)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub tax_id: Option<String>,
    pub department: String,
    pub municipality: String,
    pub district: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub area_hectares: Option<f64>,
    pub ranching_type: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub active: bool,
    pub plan: String,
    pub plan_expires_on: Option<String>,
    pub uses_milk_control: bool,
    pub uses_reproduction_control: bool,
    pub uses_health_control: bool,
    pub uses_finance_control: bool,
    pub created_at: String,
    pub updated_at: String,
    pub sync_version: i64,
    #[serde(default = "default_sync_status")]
    pub sync_status: String,
    pub last_sync_at: Option<String>,
    pub last_modified_device: Option<String>,
}

/// Tenant fields supplied at registration
#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = tenants)]
pub struct NewTenant {
    pub name: String,
    #[serde(default)]
    pub tax_id: Option<String>,
    pub department: String,
    pub municipality: String,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub area_hectares: Option<f64>,
    #[serde(default)]
    pub ranching_type: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(skip)]
    pub created_at: String,
    #[serde(skip)]
    pub updated_at: String,
}

// ============================================================================
// User Models
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct User {
    pub id: i64,
    pub tenant_id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub document: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub active: bool,
    pub email_verified: bool,
    pub language: String,
    pub receive_notifications: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub tenant_id: i64,
    pub full_name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub document: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Animal Models
// ============================================================================

/// Animal row; `mother_id`/`father_id` form the pedigree graph
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = animals)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Animal {
    pub id: i64,
    pub tenant_id: i64,
    pub tag_number: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub sex: String,
    pub birth_date: Option<String>,
    pub breed: Option<String>,
    pub color: Option<String>,
    pub mother_id: Option<i64>,
    pub father_id: Option<i64>,
    pub birth_weight: Option<f64>,
    pub current_weight: Option<f64>,
    pub previous_weight: Option<f64>,
    pub last_weighed_on: Option<String>,
    pub acquisition_type: Option<String>,
    pub entry_date: String,
    pub origin_farm: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    pub exit_date: Option<String>,
    pub exit_reason: Option<String>,
    pub category: Option<String>,
    pub purpose: Option<String>,
    pub current_lot: Option<String>,
    pub current_paddock: Option<String>,
    pub registry_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_version: i64,
    #[serde(default = "default_sync_status")]
    pub sync_status: String,
    pub last_sync_at: Option<String>,
    pub last_modified_device: Option<String>,
}

impl Animal {
    pub fn is_deleted(&self) -> bool {
        self.status == status::DELETED
    }
}

#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = animals)]
pub struct NewAnimal {
    #[serde(skip)]
    pub tenant_id: i64,
    pub tag_number: String,
    #[serde(default)]
    pub name: Option<String>,
    pub sex: String,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub mother_id: Option<i64>,
    #[serde(default)]
    pub father_id: Option<i64>,
    #[serde(default)]
    pub birth_weight: Option<f64>,
    #[serde(default)]
    pub current_weight: Option<f64>,
    #[serde(skip)]
    pub last_weighed_on: Option<String>,
    #[serde(default)]
    pub acquisition_type: Option<String>,
    pub entry_date: String,
    #[serde(default)]
    pub origin_farm: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub current_lot: Option<String>,
    #[serde(default)]
    pub current_paddock: Option<String>,
    #[serde(default)]
    pub registry_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(skip)]
    pub created_at: String,
    #[serde(skip)]
    pub updated_at: String,
}

// ============================================================================
// Health Record Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = health_records)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HealthRecord {
    pub id: i64,
    pub tenant_id: i64,
    pub animal_id: i64,
    pub record_type: String,
    pub date: String,
    pub next_dose_on: Option<String>,
    pub product: Option<String>,
    pub dose: Option<String>,
    pub route: Option<String>,
    pub product_lot: Option<String>,
    pub product_expires_on: Option<String>,
    pub diagnosis: Option<String>,
    pub animal_weight: Option<f64>,
    pub temperature: Option<f64>,
    pub veterinarian: Option<String>,
    pub applied_by: Option<String>,
    pub cost: Option<f64>,
    pub milk_withdrawal_days: Option<i32>,
    pub meat_withdrawal_days: Option<i32>,
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    pub recorded_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_version: i64,
    #[serde(default = "default_sync_status")]
    pub sync_status: String,
    pub last_sync_at: Option<String>,
    pub last_modified_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = health_records)]
pub struct NewHealthRecord {
    #[serde(skip)]
    pub tenant_id: i64,
    pub animal_id: i64,
    pub record_type: String,
    pub date: String,
    #[serde(default)]
    pub next_dose_on: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub product_lot: Option<String>,
    #[serde(default)]
    pub product_expires_on: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub animal_weight: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub veterinarian: Option<String>,
    #[serde(default)]
    pub applied_by: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub milk_withdrawal_days: Option<i32>,
    #[serde(default)]
    pub meat_withdrawal_days: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(skip)]
    pub recorded_by: Option<i64>,
    #[serde(skip)]
    pub created_at: String,
    #[serde(skip)]
    pub updated_at: String,
}

// ============================================================================
// Reproduction Record Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = reproduction_records)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReproductionRecord {
    pub id: i64,
    pub tenant_id: i64,
    pub animal_id: i64,
    pub event_type: String,
    pub event_date: String,
    pub service_type: Option<String>,
    pub sire_id: Option<i64>,
    pub semen_code: Option<String>,
    pub service_number: Option<i32>,
    pub diagnosis: Option<String>,
    pub gestation_days: Option<i32>,
    pub expected_birth_date: Option<String>,
    pub birth_date: Option<String>,
    pub offspring_count: Option<i32>,
    pub offspring_sex: Option<String>,
    pub birth_weight: Option<f64>,
    pub birth_ease: Option<String>,
    pub technician: Option<String>,
    pub cost: Option<f64>,
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    pub recorded_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_version: i64,
    #[serde(default = "default_sync_status")]
    pub sync_status: String,
    pub last_sync_at: Option<String>,
    pub last_modified_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = reproduction_records)]
pub struct NewReproductionRecord {
    #[serde(skip)]
    pub tenant_id: i64,
    pub animal_id: i64,
    pub event_type: String,
    pub event_date: String,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub sire_id: Option<i64>,
    #[serde(default)]
    pub semen_code: Option<String>,
    #[serde(default)]
    pub service_number: Option<i32>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub gestation_days: Option<i32>,
    #[serde(default)]
    pub expected_birth_date: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub offspring_count: Option<i32>,
    #[serde(default)]
    pub offspring_sex: Option<String>,
    #[serde(default)]
    pub birth_weight: Option<f64>,
    #[serde(default)]
    pub birth_ease: Option<String>,
    #[serde(default)]
    pub technician: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(skip)]
    pub recorded_by: Option<i64>,
    #[serde(skip)]
    pub created_at: String,
    #[serde(skip)]
    pub updated_at: String,
}

// ============================================================================
// Production Record Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = production_records)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProductionRecord {
    pub id: i64,
    pub tenant_id: i64,
    pub animal_id: i64,
    pub production_type: String,
    pub date: String,
    pub liters: Option<f64>,
    pub shift: Option<String>,
    pub sale_weight: Option<f64>,
    pub quality: Option<String>,
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    pub recorded_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_version: i64,
    #[serde(default = "default_sync_status")]
    pub sync_status: String,
    pub last_sync_at: Option<String>,
    pub last_modified_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = production_records)]
pub struct NewProductionRecord {
    #[serde(skip)]
    pub tenant_id: i64,
    pub animal_id: i64,
    pub production_type: String,
    pub date: String,
    #[serde(default)]
    pub liters: Option<f64>,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub sale_weight: Option<f64>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(skip)]
    pub recorded_by: Option<i64>,
    #[serde(skip)]
    pub created_at: String,
    #[serde(skip)]
    pub updated_at: String,
}

// ============================================================================
// Transaction Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = transactions)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Transaction {
    pub id: i64,
    pub tenant_id: i64,
    pub kind: String,
    pub date: String,
    pub concept: String,
    pub amount: f64,
    pub animal_id: Option<i64>,
    pub animal_count: Option<i32>,
    pub total_weight: Option<f64>,
    pub price_per_kg: Option<f64>,
    pub counterparty: Option<String>,
    pub counterparty_document: Option<String>,
    pub payment_method: Option<String>,
    pub expense_category: Option<String>,
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub status: String,
    pub recorded_by: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub sync_version: i64,
    #[serde(default = "default_sync_status")]
    pub sync_status: String,
    pub last_sync_at: Option<String>,
    pub last_modified_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Insertable)]
#[diesel(table_name = transactions)]
pub struct NewTransaction {
    #[serde(skip)]
    pub tenant_id: i64,
    pub kind: String,
    pub date: String,
    pub concept: String,
    pub amount: f64,
    #[serde(default)]
    pub animal_id: Option<i64>,
    #[serde(default)]
    pub animal_count: Option<i32>,
    #[serde(default)]
    pub total_weight: Option<f64>,
    #[serde(default)]
    pub price_per_kg: Option<f64>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub counterparty_document: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub expense_category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(skip)]
    pub recorded_by: Option<i64>,
    #[serde(skip)]
    pub created_at: String,
    #[serde(skip)]
    pub updated_at: String,
}

// ============================================================================
// Sync Conflict Log
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = sync_conflicts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncConflictRow {
    pub id: i64,
    pub tenant_id: i64,
    pub device_id: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub server_version: i64,
    pub client_version: i64,
    pub resolution: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = sync_conflicts)]
pub struct NewSyncConflict<'a> {
    pub tenant_id: i64,
    pub device_id: &'a str,
    pub entity_type: &'a str,
    pub entity_id: i64,
    pub server_version: i64,
    pub client_version: i64,
    pub resolution: &'a str,
    pub created_at: &'a str,
}
