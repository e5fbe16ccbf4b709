//! Production log operations (milk yields, carcass weights)

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::production_records;
use super::models::{status, NewProductionRecord, ProductionRecord};
use super::{clamp_limit, default_limit, RecordPage};
use crate::error::AppError;

/// Query parameters for listing production records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductionQuery {
    #[serde(default)]
    pub animal_id: Option<i64>,
    #[serde(default)]
    pub production_type: Option<String>,
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
) -> Result<Option<ProductionRecord>, AppError> {
    let row = production_records::table
        .filter(production_records::tenant_id.eq(ctx.tenant_id))
        .filter(production_records::id.eq(id))
        .select(ProductionRecord::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn list_records(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    query: &ProductionQuery,
) -> Result<RecordPage<ProductionRecord>, AppError> {
    let limit = clamp_limit(query.limit);
    let skip = query.skip.max(0);

    let build = || -> production_records::BoxedQuery<'static, Sqlite> {
        let mut q = production_records::table
            .filter(production_records::tenant_id.eq(ctx.tenant_id))
            .filter(production_records::status.ne(status::DELETED))
            .into_boxed();
        if let Some(animal_id) = query.animal_id {
            q = q.filter(production_records::animal_id.eq(animal_id));
        }
        if let Some(ref production_type) = query.production_type {
            q = q.filter(production_records::production_type.eq(production_type.to_lowercase()));
        }
        if let Some(ref from) = query.date_from {
            q = q.filter(production_records::date.ge(from.clone()));
        }
        if let Some(ref to) = query.date_to {
            q = q.filter(production_records::date.le(to.clone()));
        }
        q
    };

    let total: i64 = build().count().get_result(conn)?;
    let items = build()
        .order((production_records::date.desc(), production_records::id.desc()))
        .limit(limit)
        .offset(skip)
        .select(ProductionRecord::as_select())
        .load(conn)?;

    Ok(RecordPage { total, items, skip, limit })
}

/// Litres of milk recorded within `[from, to]`
pub fn milk_liters_between(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    from: &str,
    to: &str,
) -> Result<f64, AppError> {
    let total: Option<f64> = production_records::table
        .filter(production_records::tenant_id.eq(ctx.tenant_id))
        .filter(production_records::status.ne(status::DELETED))
        .filter(production_records::production_type.eq("milk"))
        .filter(production_records::date.ge(from))
        .filter(production_records::date.le(to))
        .select(diesel::dsl::sum(production_records::liters))
        .first(conn)?;
    Ok(total.unwrap_or(0.0))
}

pub fn changed_since(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
) -> Result<Vec<ProductionRecord>, AppError> {
    let rows = production_records::table
        .filter(production_records::tenant_id.eq(ctx.tenant_id))
        .filter(production_records::updated_at.gt(since))
        .filter(
            production_records::last_modified_device
                .is_null()
                .or(production_records::last_modified_device.ne(device_id)),
        )
        .order(production_records::updated_at.asc())
        .select(ProductionRecord::as_select())
        .load(conn)?;
    Ok(rows)
}

pub fn create_record(
    conn: &mut SqliteConnection,
    input: &NewProductionRecord,
) -> Result<ProductionRecord, AppError> {
    let row = diesel::insert_into(production_records::table)
        .values(input)
        .returning(ProductionRecord::as_returning())
        .get_result(conn)?;
    Ok(row)
}

pub fn insert_record(conn: &mut SqliteConnection, row: &ProductionRecord) -> Result<(), AppError> {
    diesel::insert_into(production_records::table)
        .values(row)
        .execute(conn)?;
    Ok(())
}

pub fn compare_and_swap(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: &ProductionRecord,
    expected_version: i64,
) -> Result<bool, AppError> {
    let updated = diesel::update(
        production_records::table
            .filter(production_records::tenant_id.eq(ctx.tenant_id))
            .filter(production_records::id.eq(row.id))
            .filter(production_records::sync_version.eq(expected_version)),
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

    fn milking(ctx: &TenantContext, animal_id: i64, date: &str, liters: f64) -> NewProductionRecord {
        let now = current_timestamp();
        NewProductionRecord {
            tenant_id: ctx.tenant_id,
            animal_id,
            production_type: "milk".into(),
            date: date.into(),
            liters: Some(liters),
            shift: Some("morning".into()),
            sale_weight: None,
            quality: None,
            notes: None,
            recorded_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_milk_sum() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let cow = create_animal(conn, &new_animal(&ctx, "CO-1", "female"))?;
            create_record(conn, &milking(&ctx, cow.id, "2024-04-01", 12.5))?;
            create_record(conn, &milking(&ctx, cow.id, "2024-04-02", 11.0))?;
            create_record(conn, &milking(&ctx, cow.id, "2024-05-01", 9.0))?;

            let april = milk_liters_between(conn, &ctx, "2024-04-01", "2024-04-30")?;
            assert!((april - 23.5).abs() < 1e-9);
            assert_eq!(milk_liters_between(conn, &ctx, "2023-01-01", "2023-01-31")?, 0.0);

            let page = list_records(
                conn,
                &ctx,
                &ProductionQuery { animal_id: Some(cow.id), limit: 2, ..Default::default() },
            )?;
            assert_eq!(page.total, 3);
            assert_eq!(page.items.len(), 2);
            Ok(())
        })
        .unwrap();
    }
}
