//! Log of conflicts detected while applying offline sync batches

use diesel::prelude::*;

use super::context::TenantContext;
use super::diesel_schema::sync_conflicts;
use super::models::NewSyncConflict;
use crate::error::AppError;

pub fn record_conflict(conn: &mut SqliteConnection, input: &NewSyncConflict<'_>) -> Result<(), AppError> {
    diesel::insert_into(sync_conflicts::table)
        .values(input)
        .execute(conn)?;
    Ok(())
}

/// Conflicts logged for the tenant, optionally for a single device
pub fn count_conflicts(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    device_id: Option<&str>,
) -> Result<i64, AppError> {
    let mut q = sync_conflicts::table
        .filter(sync_conflicts::tenant_id.eq(ctx.tenant_id))
        .into_boxed();
    if let Some(device) = device_id {
        q = q.filter(sync_conflicts::device_id.eq(device));
    }
    Ok(q.count().get_result(conn)?)
}
