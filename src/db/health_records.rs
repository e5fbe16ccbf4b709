//! Health record operations (vaccines, treatments, deworming, surgery)

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::health_records;
use super::models::{status, HealthRecord, NewHealthRecord};
use super::{clamp_limit, default_limit, like_pattern, RecordPage};
use crate::error::AppError;

/// Query parameters for listing health records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    pub animal_id: Option<i64>,
    #[serde(default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub fn get_record(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: i64,
) -> Result<Option<HealthRecord>, AppError> {
    let row = health_records::table
        .filter(health_records::tenant_id.eq(ctx.tenant_id))
        .filter(health_records::id.eq(id))
        .select(HealthRecord::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn list_records(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    query: &HealthQuery,
) -> Result<RecordPage<HealthRecord>, AppError> {
    let limit = clamp_limit(query.limit);
    let skip = query.skip.max(0);

    let build = || -> health_records::BoxedQuery<'static, Sqlite> {
        let mut q = health_records::table
            .filter(health_records::tenant_id.eq(ctx.tenant_id))
            .filter(health_records::status.ne(status::DELETED))
            .into_boxed();
        if let Some(animal_id) = query.animal_id {
            q = q.filter(health_records::animal_id.eq(animal_id));
        }
        if let Some(ref record_type) = query.record_type {
            q = q.filter(health_records::record_type.eq(record_type.to_lowercase()));
        }
        if let Some(ref from) = query.date_from {
            q = q.filter(health_records::date.ge(from.clone()));
        }
        if let Some(ref to) = query.date_to {
            q = q.filter(health_records::date.le(to.clone()));
        }
        if let Some(ref product) = query.product {
            q = q.filter(health_records::product.like(like_pattern(product)).escape('\\'));
        }
        q
    };

    let total: i64 = build().count().get_result(conn)?;
    let items = build()
        .order((health_records::date.desc(), health_records::id.desc()))
        .limit(limit)
        .offset(skip)
        .select(HealthRecord::as_select())
        .load(conn)?;

    Ok(RecordPage { total, items, skip, limit })
}

/// Full history of one animal, newest first
pub fn animal_history(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    animal_id: i64,
) -> Result<Vec<HealthRecord>, AppError> {
    let rows = health_records::table
        .filter(health_records::tenant_id.eq(ctx.tenant_id))
        .filter(health_records::animal_id.eq(animal_id))
        .filter(health_records::status.ne(status::DELETED))
        .order((health_records::date.desc(), health_records::id.desc()))
        .select(HealthRecord::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Vaccines whose next dose falls within `[from, to]`
pub fn vaccines_due(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    from: &str,
    to: &str,
) -> Result<Vec<HealthRecord>, AppError> {
    let rows = health_records::table
        .filter(health_records::tenant_id.eq(ctx.tenant_id))
        .filter(health_records::status.ne(status::DELETED))
        .filter(health_records::record_type.eq("vaccine"))
        .filter(health_records::next_dose_on.ge(from))
        .filter(health_records::next_dose_on.le(to))
        .order(health_records::next_dose_on.asc())
        .select(HealthRecord::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Count records of an optional type dated within `[from, to]`
pub fn count_between(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    record_type: Option<&str>,
    from: &str,
    to: &str,
) -> Result<i64, AppError> {
    let mut q = health_records::table
        .filter(health_records::tenant_id.eq(ctx.tenant_id))
        .filter(health_records::status.ne(status::DELETED))
        .filter(health_records::date.ge(from))
        .filter(health_records::date.le(to))
        .into_boxed();
    if let Some(t) = record_type {
        q = q.filter(health_records::record_type.eq(t));
    }
    Ok(q.count().get_result(conn)?)
}

pub fn changed_since(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
) -> Result<Vec<HealthRecord>, AppError> {
    let rows = health_records::table
        .filter(health_records::tenant_id.eq(ctx.tenant_id))
        .filter(health_records::updated_at.gt(since))
        .filter(
            health_records::last_modified_device
                .is_null()
                .or(health_records::last_modified_device.ne(device_id)),
        )
        .order(health_records::updated_at.asc())
        .select(HealthRecord::as_select())
        .load(conn)?;
    Ok(rows)
}

pub fn create_record(
    conn: &mut SqliteConnection,
    input: &NewHealthRecord,
) -> Result<HealthRecord, AppError> {
    let row = diesel::insert_into(health_records::table)
        .values(input)
        .returning(HealthRecord::as_returning())
        .get_result(conn)?;
    Ok(row)
}

pub fn insert_record(conn: &mut SqliteConnection, row: &HealthRecord) -> Result<(), AppError> {
    diesel::insert_into(health_records::table).values(row).execute(conn)?;
    Ok(())
}

pub fn compare_and_swap(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: &HealthRecord,
    expected_version: i64,
) -> Result<bool, AppError> {
    let updated = diesel::update(
        health_records::table
            .filter(health_records::tenant_id.eq(ctx.tenant_id))
            .filter(health_records::id.eq(row.id))
            .filter(health_records::sync_version.eq(expected_version)),
    )
    .set(row)
    .execute(conn)?;
    Ok(updated == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::animals::{create_animal, fixtures::new_animal};
    use crate::db::models::current_timestamp;
    use crate::db::test_support::db_with_tenant;

    fn vaccine(ctx: &TenantContext, animal_id: i64, date: &str, next: Option<&str>) -> NewHealthRecord {
        let now = current_timestamp();
        NewHealthRecord {
            tenant_id: ctx.tenant_id,
            animal_id,
            record_type: "vaccine".into(),
            date: date.into(),
            next_dose_on: next.map(String::from),
            product: Some("Aftosa Bivalente".into()),
            dose: Some("2 ml".into()),
            route: Some("subcutaneous".into()),
            product_lot: None,
            product_expires_on: None,
            diagnosis: None,
            animal_weight: None,
            temperature: None,
            veterinarian: None,
            applied_by: None,
            cost: Some(12000.0),
            milk_withdrawal_days: None,
            meat_withdrawal_days: None,
            notes: None,
            recorded_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_list_filters() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let cow = create_animal(conn, &new_animal(&ctx, "CO-1", "female"))?;
            create_record(conn, &vaccine(&ctx, cow.id, "2024-03-01", Some("2024-09-01")))?;
            create_record(conn, &vaccine(&ctx, cow.id, "2024-06-01", None))?;

            let all = list_records(conn, &ctx, &HealthQuery { limit: 100, ..Default::default() })?;
            assert_eq!(all.total, 2);
            assert_eq!(all.items[0].date, "2024-06-01");

            let q = HealthQuery {
                date_from: Some("2024-05-01".into()),
                product: Some("aftosa".into()),
                limit: 100,
                ..Default::default()
            };
            assert_eq!(list_records(conn, &ctx, &q)?.total, 1);

            let due = vaccines_due(conn, &ctx, "2024-08-15", "2024-09-14")?;
            assert_eq!(due.len(), 1);
            assert_eq!(count_between(conn, &ctx, Some("vaccine"), "2024-01-01", "2024-12-31")?, 2);
            Ok(())
        })
        .unwrap();
    }
}
