//! Reproduction event operations (services, pregnancy checks, births)

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::reproduction_records;
use super::models::{status, NewReproductionRecord, ReproductionRecord};
use super::{clamp_limit, default_limit, RecordPage};
use crate::error::AppError;

/// Query parameters for listing reproduction records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReproductionQuery {
    #[serde(default)]
    pub animal_id: Option<i64>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub fn get_record(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: i64,
) -> Result<Option<ReproductionRecord>, AppError> {
    let row = reproduction_records::table
        .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
        .filter(reproduction_records::id.eq(id))
        .select(ReproductionRecord::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn list_records(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    query: &ReproductionQuery,
) -> Result<RecordPage<ReproductionRecord>, AppError> {
    let limit = clamp_limit(query.limit);
    let skip = query.skip.max(0);

    let build = || -> reproduction_records::BoxedQuery<'static, Sqlite> {
        let mut q = reproduction_records::table
            .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
            .filter(reproduction_records::status.ne(status::DELETED))
            .into_boxed();
        if let Some(animal_id) = query.animal_id {
            q = q.filter(reproduction_records::animal_id.eq(animal_id));
        }
        if let Some(ref event_type) = query.event_type {
            q = q.filter(reproduction_records::event_type.eq(event_type.to_lowercase()));
        }
        if let Some(ref from) = query.date_from {
            q = q.filter(reproduction_records::event_date.ge(from.clone()));
        }
        if let Some(ref to) = query.date_to {
            q = q.filter(reproduction_records::event_date.le(to.clone()));
        }
        q
    };

    let total: i64 = build().count().get_result(conn)?;
    let items = build()
        .order((reproduction_records::event_date.desc(), reproduction_records::id.desc()))
        .limit(limit)
        .offset(skip)
        .select(ReproductionRecord::as_select())
        .load(conn)?;

    Ok(RecordPage { total, items, skip, limit })
}

/// All diagnosis events for the tenant, oldest first, so folding keeps the latest
pub fn diagnoses(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
) -> Result<Vec<ReproductionRecord>, AppError> {
    let rows = reproduction_records::table
        .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
        .filter(reproduction_records::status.ne(status::DELETED))
        .filter(reproduction_records::event_type.eq("diagnosis"))
        .filter(reproduction_records::diagnosis.is_not_null())
        .order((reproduction_records::event_date.asc(), reproduction_records::id.asc()))
        .select(ReproductionRecord::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Count events of one type dated within `[from, to]`
pub fn count_events_between(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    event_type: &str,
    from: &str,
    to: &str,
) -> Result<i64, AppError> {
    let count = reproduction_records::table
        .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
        .filter(reproduction_records::status.ne(status::DELETED))
        .filter(reproduction_records::event_type.eq(event_type))
        .filter(reproduction_records::event_date.ge(from))
        .filter(reproduction_records::event_date.le(to))
        .count()
        .get_result(conn)?;
    Ok(count)
}

/// Records whose expected birth date falls within `[from, to]`
pub fn births_expected_between(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    from: &str,
    to: &str,
) -> Result<Vec<ReproductionRecord>, AppError> {
    let rows = reproduction_records::table
        .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
        .filter(reproduction_records::status.ne(status::DELETED))
        .filter(reproduction_records::expected_birth_date.ge(from))
        .filter(reproduction_records::expected_birth_date.le(to))
        .order(reproduction_records::expected_birth_date.asc())
        .select(ReproductionRecord::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Gestation lengths recorded on birth events
pub fn gestation_days(conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<Vec<i32>, AppError> {
    let rows: Vec<Option<i32>> = reproduction_records::table
        .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
        .filter(reproduction_records::status.ne(status::DELETED))
        .filter(reproduction_records::event_type.eq("birth"))
        .filter(reproduction_records::gestation_days.is_not_null())
        .select(reproduction_records::gestation_days)
        .load(conn)?;
    Ok(rows.into_iter().flatten().collect())
}

pub fn changed_since(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
) -> Result<Vec<ReproductionRecord>, AppError> {
    let rows = reproduction_records::table
        .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
        .filter(reproduction_records::updated_at.gt(since))
        .filter(
            reproduction_records::last_modified_device
                .is_null()
                .or(reproduction_records::last_modified_device.ne(device_id)),
        )
        .order(reproduction_records::updated_at.asc())
        .select(ReproductionRecord::as_select())
        .load(conn)?;
    Ok(rows)
}

pub fn create_record(
    conn: &mut SqliteConnection,
    input: &NewReproductionRecord,
) -> Result<ReproductionRecord, AppError> {
    let row = diesel::insert_into(reproduction_records::table)
        .values(input)
        .returning(ReproductionRecord::as_returning())
        .get_result(conn)?;
    Ok(row)
}

pub fn insert_record(conn: &mut SqliteConnection, row: &ReproductionRecord) -> Result<(), AppError> {
    diesel::insert_into(reproduction_records::table)
        .values(row)
        .execute(conn)?;
    Ok(())
}

pub fn compare_and_swap(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: &ReproductionRecord,
    expected_version: i64,
) -> Result<bool, AppError> {
    let updated = diesel::update(
        reproduction_records::table
            .filter(reproduction_records::tenant_id.eq(ctx.tenant_id))
            .filter(reproduction_records::id.eq(row.id))
            .filter(reproduction_records::sync_version.eq(expected_version)),
    )
    .set(row)
    .execute(conn)?;
    Ok(updated == 1)
}
