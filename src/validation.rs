//! Field validation shared by REST input and merged sync payloads
//!
//! Vocabulary columns are stored as TEXT, so enum membership, date formats
//! and numeric ranges are checked here before any write.

use crate::db::models::{
    parse_date, sex, status, sync_status, Animal, HealthRecord, NewAnimal, NewHealthRecord,
    NewProductionRecord, NewReproductionRecord, NewTenant, NewTransaction, ProductionRecord,
    ReproductionRecord, Tenant, Transaction, DIAGNOSES, HEALTH_RECORD_TYPES, HEALTH_ROUTES,
    PRODUCTION_TYPES, REPRODUCTION_EVENTS, SERVICE_TYPES, SHIFTS, TRANSACTION_KINDS,
};
use crate::error::AppError;

pub trait Validate {
    fn validate(&self) -> Result<(), AppError>;
}

// ============================================================================
// Field checks
// ============================================================================

fn invalid(msg: String) -> AppError {
    AppError::InvalidInput(msg)
}

pub fn one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), AppError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{} must be one of: {}", field, allowed.join(", "))))
    }
}

pub fn opt_one_of(field: &str, value: Option<&str>, allowed: &[&str]) -> Result<(), AppError> {
    value.map_or(Ok(()), |v| one_of(field, v, allowed))
}

pub fn date(field: &str, value: &str) -> Result<(), AppError> {
    parse_date(value)
        .map(|_| ())
        .ok_or_else(|| invalid(format!("{} must be a date in YYYY-MM-DD format", field)))
}

pub fn opt_date(field: &str, value: Option<&str>) -> Result<(), AppError> {
    value.map_or(Ok(()), |v| date(field, v))
}

pub fn positive(field: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(v) if !(v > 0.0) => Err(invalid(format!("{} must be greater than 0", field))),
        _ => Ok(()),
    }
}

pub fn non_negative(field: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(v) if !(v >= 0.0) => Err(invalid(format!("{} must not be negative", field))),
        _ => Ok(()),
    }
}

pub fn int_range(field: &str, value: Option<i32>, min: i32, max: i32) -> Result<(), AppError> {
    match value {
        Some(v) if v < min || v > max => Err(invalid(format!(
            "{} must be between {} and {}",
            field, min, max
        ))),
        _ => Ok(()),
    }
}

pub fn max_len(field: &str, value: Option<&str>, max: usize) -> Result<(), AppError> {
    match value {
        Some(v) if v.chars().count() > max => Err(invalid(format!(
            "{} must be at most {} characters",
            field, max
        ))),
        _ => Ok(()),
    }
}

pub fn required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(invalid(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

// ============================================================================
// Tenants
// ============================================================================

impl Validate for NewTenant {
    fn validate(&self) -> Result<(), AppError> {
        required("name", &self.name)?;
        required("department", &self.department)?;
        required("municipality", &self.municipality)?;
        non_negative("area_hectares", self.area_hectares)
    }
}

impl Validate for Tenant {
    fn validate(&self) -> Result<(), AppError> {
        required("name", &self.name)?;
        required("department", &self.department)?;
        required("municipality", &self.municipality)?;
        non_negative("area_hectares", self.area_hectares)?;
        opt_date("plan_expires_on", self.plan_expires_on.as_deref())?;
        one_of("sync_status", &self.sync_status, sync_status::ALL)
    }
}

// ============================================================================
// Animals
// ============================================================================

impl Validate for NewAnimal {
    fn validate(&self) -> Result<(), AppError> {
        required("tag_number", &self.tag_number)?;
        max_len("tag_number", Some(&self.tag_number), 50)?;
        one_of("sex", &self.sex, sex::ALL)?;
        opt_date("birth_date", self.birth_date.as_deref())?;
        date("entry_date", &self.entry_date)?;
        positive("birth_weight", self.birth_weight)?;
        positive("current_weight", self.current_weight)?;
        max_len("notes", self.notes.as_deref(), 2000)
    }
}

impl Validate for Animal {
    fn validate(&self) -> Result<(), AppError> {
        required("tag_number", &self.tag_number)?;
        max_len("tag_number", Some(&self.tag_number), 50)?;
        one_of("sex", &self.sex, sex::ALL)?;
        one_of("status", &self.status, status::ANIMAL)?;
        opt_date("birth_date", self.birth_date.as_deref())?;
        date("entry_date", &self.entry_date)?;
        opt_date("exit_date", self.exit_date.as_deref())?;
        opt_date("last_weighed_on", self.last_weighed_on.as_deref())?;
        positive("birth_weight", self.birth_weight)?;
        positive("current_weight", self.current_weight)?;
        positive("previous_weight", self.previous_weight)?;
        max_len("notes", self.notes.as_deref(), 2000)?;
        if self.mother_id == Some(self.id) || self.father_id == Some(self.id) {
            return Err(invalid("an animal cannot be its own parent".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Health records
// ============================================================================

macro_rules! validate_health {
    ($r:expr) => {{
        let r = $r;
        one_of("record_type", &r.record_type, HEALTH_RECORD_TYPES)?;
        date("date", &r.date)?;
        opt_date("next_dose_on", r.next_dose_on.as_deref())?;
        opt_date("product_expires_on", r.product_expires_on.as_deref())?;
        opt_one_of("route", r.route.as_deref(), HEALTH_ROUTES)?;
        positive("animal_weight", r.animal_weight)?;
        non_negative("cost", r.cost)?;
        int_range("milk_withdrawal_days", r.milk_withdrawal_days, 0, i32::MAX)?;
        int_range("meat_withdrawal_days", r.meat_withdrawal_days, 0, i32::MAX)?;
        max_len("notes", r.notes.as_deref(), 1000)
    }};
}

impl Validate for NewHealthRecord {
    fn validate(&self) -> Result<(), AppError> {
        validate_health!(self)
    }
}

impl Validate for HealthRecord {
    fn validate(&self) -> Result<(), AppError> {
        one_of("status", &self.status, status::RECORD)?;
        validate_health!(self)
    }
}

// ============================================================================
// Reproduction records
// ============================================================================

macro_rules! validate_reproduction {
    ($r:expr) => {{
        let r = $r;
        one_of("event_type", &r.event_type, REPRODUCTION_EVENTS)?;
        date("event_date", &r.event_date)?;
        opt_one_of("service_type", r.service_type.as_deref(), SERVICE_TYPES)?;
        opt_one_of("diagnosis", r.diagnosis.as_deref(), DIAGNOSES)?;
        opt_date("expected_birth_date", r.expected_birth_date.as_deref())?;
        opt_date("birth_date", r.birth_date.as_deref())?;
        int_range("service_number", r.service_number, 1, i32::MAX)?;
        int_range("offspring_count", r.offspring_count, 1, 5)?;
        int_range("gestation_days", r.gestation_days, 0, 400)?;
        opt_one_of("offspring_sex", r.offspring_sex.as_deref(), sex::ALL)?;
        positive("birth_weight", r.birth_weight)?;
        non_negative("cost", r.cost)?;
        max_len("notes", r.notes.as_deref(), 1000)
    }};
}

impl Validate for NewReproductionRecord {
    fn validate(&self) -> Result<(), AppError> {
        validate_reproduction!(self)
    }
}

impl Validate for ReproductionRecord {
    fn validate(&self) -> Result<(), AppError> {
        one_of("status", &self.status, status::RECORD)?;
        validate_reproduction!(self)
    }
}

// ============================================================================
// Production records
// ============================================================================

macro_rules! validate_production {
    ($r:expr) => {{
        let r = $r;
        one_of("production_type", &r.production_type, PRODUCTION_TYPES)?;
        date("date", &r.date)?;
        non_negative("liters", r.liters)?;
        opt_one_of("shift", r.shift.as_deref(), SHIFTS)?;
        positive("sale_weight", r.sale_weight)?;
        max_len("notes", r.notes.as_deref(), 500)
    }};
}

impl Validate for NewProductionRecord {
    fn validate(&self) -> Result<(), AppError> {
        validate_production!(self)
    }
}

impl Validate for ProductionRecord {
    fn validate(&self) -> Result<(), AppError> {
        one_of("status", &self.status, status::RECORD)?;
        validate_production!(self)
    }
}

// ============================================================================
// Transactions
// ============================================================================

macro_rules! validate_transaction {
    ($t:expr) => {{
        let t = $t;
        one_of("kind", &t.kind, TRANSACTION_KINDS)?;
        date("date", &t.date)?;
        required("concept", &t.concept)?;
        max_len("concept", Some(&t.concept), 200)?;
        positive("amount", Some(t.amount))?;
        int_range("animal_count", t.animal_count, 1, i32::MAX)?;
        positive("total_weight", t.total_weight)?;
        positive("price_per_kg", t.price_per_kg)?;
        max_len("counterparty", t.counterparty.as_deref(), 200)?;
        max_len("counterparty_document", t.counterparty_document.as_deref(), 50)?;
        max_len("notes", t.notes.as_deref(), 1000)
    }};
}

impl Validate for NewTransaction {
    fn validate(&self) -> Result<(), AppError> {
        validate_transaction!(self)
    }
}

impl Validate for Transaction {
    fn validate(&self) -> Result<(), AppError> {
        one_of("status", &self.status, status::RECORD)?;
        validate_transaction!(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_of() {
        assert!(one_of("sex", "female", sex::ALL).is_ok());
        let err = one_of("sex", "hembra", sex::ALL).unwrap_err();
        assert!(err.to_string().contains("sex must be one of: male, female"));
    }

    #[test]
    fn test_numeric_ranges() {
        assert!(positive("amount", Some(0.0)).is_err());
        assert!(positive("amount", Some(f64::NAN)).is_err());
        assert!(positive("amount", None).is_ok());
        assert!(non_negative("cost", Some(0.0)).is_ok());
        assert!(non_negative("cost", Some(-1.0)).is_err());
        assert!(int_range("offspring_count", Some(6), 1, 5).is_err());
        assert!(int_range("offspring_count", Some(2), 1, 5).is_ok());
    }

    #[test]
    fn test_dates_and_lengths() {
        assert!(date("date", "2024-06-30").is_ok());
        assert!(date("date", "30/06/2024").is_err());
        assert!(max_len("notes", Some(&"x".repeat(501)), 500).is_err());
        assert!(max_len("notes", Some("ñandú"), 5).is_ok());
    }
}
