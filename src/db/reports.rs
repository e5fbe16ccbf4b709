//! Aggregate herd queries backing the dashboard and reproduction summary

use diesel::prelude::*;
use serde::Serialize;

use super::context::TenantContext;
use super::diesel_schema::animals;
use super::models::{category, sex, status};
use crate::error::AppError;

/// Herd inventory; soft-deleted animals are never counted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Inventory {
    pub total: i64,
    pub calves: i64,
    pub heifers: i64,
    pub steers: i64,
    pub cows: i64,
    pub bulls: i64,
    pub active: i64,
    pub sold: i64,
    pub dead: i64,
}

pub fn inventory(conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<Inventory, AppError> {
    let groups: Vec<(String, Option<String>, i64)> = animals::table
        .filter(animals::tenant_id.eq(ctx.tenant_id))
        .filter(animals::status.ne(status::DELETED))
        .group_by((animals::status, animals::category))
        .select((animals::status, animals::category, diesel::dsl::count(animals::id)))
        .load(conn)?;

    let mut inv = Inventory::default();
    for (row_status, row_category, n) in groups {
        inv.total += n;
        match row_status.as_str() {
            status::ACTIVE => inv.active += n,
            status::SOLD => inv.sold += n,
            status::DEAD => inv.dead += n,
            _ => {}
        }
        match row_category.as_deref() {
            Some(category::CALF) => inv.calves += n,
            Some(category::HEIFER) => inv.heifers += n,
            Some(category::STEER) => inv.steers += n,
            Some(category::COW) => inv.cows += n,
            Some(category::BULL) => inv.bulls += n,
            _ => {}
        }
    }
    Ok(inv)
}

/// Ids of active females
pub fn active_female_ids(conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<Vec<i64>, AppError> {
    let ids = animals::table
        .filter(animals::tenant_id.eq(ctx.tenant_id))
        .filter(animals::status.eq(status::ACTIVE))
        .filter(animals::sex.eq(sex::FEMALE))
        .select(animals::id)
        .load(conn)?;
    Ok(ids)
}

/// Active cows and heifers, the denominator for per-head milk averages
pub fn active_milkers(conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<i64, AppError> {
    let count = animals::table
        .filter(animals::tenant_id.eq(ctx.tenant_id))
        .filter(animals::status.eq(status::ACTIVE))
        .filter(animals::category.eq_any([category::COW, category::HEIFER]))
        .count()
        .get_result(conn)?;
    Ok(count)
}
