//! Tenant (farm) operations
//!
//! A tenant row is its own scope: `TenantContext::tenant_id` is the row id.

use diesel::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use super::context::TenantContext;
use super::diesel_schema::{animals, tenants};
use super::models::{status, NewTenant, Tenant};
use crate::error::AppError;

/// Insert a tenant and return the stored row
pub fn create_tenant(conn: &mut SqliteConnection, input: &NewTenant) -> Result<Tenant, AppError> {
    let row = diesel::insert_into(tenants::table)
        .values(input)
        .returning(Tenant::as_returning())
        .get_result(conn)?;
    Ok(row)
}

pub fn get_tenant(conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<Option<Tenant>, AppError> {
    let row = tenants::table
        .filter(tenants::id.eq(ctx.tenant_id))
        .select(Tenant::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn tax_id_exists(conn: &mut SqliteConnection, tax_id: &str) -> Result<bool, AppError> {
    let count: i64 = tenants::table
        .filter(tenants::tax_id.eq(tax_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Write `row` only if the stored version still equals `expected_version`
pub fn compare_and_swap(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: &Tenant,
    expected_version: i64,
) -> Result<bool, AppError> {
    let updated = diesel::update(
        tenants::table
            .filter(tenants::id.eq(ctx.tenant_id))
            .filter(tenants::id.eq(row.id))
            .filter(tenants::sync_version.eq(expected_version)),
    )
    .set(row)
    .execute(conn)?;
    Ok(updated == 1)
}

/// Tenants modified after `since` by anyone other than `device_id`
pub fn changed_since(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
) -> Result<Vec<Tenant>, AppError> {
    let rows = tenants::table
        .filter(tenants::id.eq(ctx.tenant_id))
        .filter(tenants::updated_at.gt(since))
        .filter(
            tenants::last_modified_device
                .is_null()
                .or(tenants::last_modified_device.ne(device_id)),
        )
        .select(Tenant::as_select())
        .load(conn)?;
    Ok(rows)
}

/// Active herd composition
#[derive(Debug, Clone, Serialize)]
pub struct TenantStats {
    pub tenant_id: i64,
    pub tenant_name: String,
    pub active_animals: i64,
    pub by_sex: BTreeMap<String, i64>,
    pub by_category: BTreeMap<String, i64>,
}

pub fn tenant_stats(conn: &mut SqliteConnection, tenant: &Tenant) -> Result<TenantStats, AppError> {
    let active_animals: i64 = animals::table
        .filter(animals::tenant_id.eq(tenant.id))
        .filter(animals::status.eq(status::ACTIVE))
        .count()
        .get_result(conn)?;

    let by_sex: Vec<(String, i64)> = animals::table
        .filter(animals::tenant_id.eq(tenant.id))
        .filter(animals::status.eq(status::ACTIVE))
        .group_by(animals::sex)
        .select((animals::sex, diesel::dsl::count(animals::id)))
        .load(conn)?;

    let by_category: Vec<(Option<String>, i64)> = animals::table
        .filter(animals::tenant_id.eq(tenant.id))
        .filter(animals::status.eq(status::ACTIVE))
        .filter(animals::category.is_not_null())
        .group_by(animals::category)
        .select((animals::category, diesel::dsl::count(animals::id)))
        .load(conn)?;

    Ok(TenantStats {
        tenant_id: tenant.id,
        tenant_name: tenant.name.clone(),
        active_animals,
        by_sex: by_sex.into_iter().collect(),
        by_category: by_category
            .into_iter()
            .filter_map(|(category, n)| category.map(|c| (c, n)))
            .collect(),
    })
}
