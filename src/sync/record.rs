//! Uniform versioned access to every syncable table
//!
//! `SyncRecord` gives the sync engine and the REST services one way to load,
//! patch, stamp and conditionally write rows regardless of entity type.

use diesel::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::conflict::merge_fields;
use super::protocol::EntityType;
use crate::db::models::{
    current_timestamp, sex, status, sync_status, Animal, HealthRecord, ProductionRecord,
    ReproductionRecord, Tenant, Transaction,
};
use crate::db::{animals, health_records, production_records, reproduction_records, tenants, transactions};
use crate::db::TenantContext;
use crate::error::AppError;
use crate::validation::Validate;

/// Attempts at a compare-and-swap write before giving up
pub const MAX_CAS_ATTEMPTS: usize = 3;

pub trait SyncRecord: Serialize + DeserializeOwned + Validate + Clone + Sized {
    const ENTITY: EntityType;

    fn id(&self) -> i64;
    fn version(&self) -> i64;
    fn updated_at(&self) -> &str;
    fn is_deleted(&self) -> bool;

    /// Flip the soft-delete marker
    fn mark_deleted(&mut self) -> Result<(), AppError>;

    /// Set version and write metadata before a compare-and-swap
    fn stamp(&mut self, version: i64, device: Option<&str>, state: &str, now: &str);

    /// Whether sync clients may create and delete rows of this type
    fn client_lifecycle() -> bool {
        true
    }

    fn find(conn: &mut SqliteConnection, ctx: &TenantContext, id: i64) -> Result<Option<Self>, AppError>;
    fn insert(conn: &mut SqliteConnection, row: &Self) -> Result<(), AppError>;
    fn compare_and_swap(
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        row: &Self,
        expected_version: i64,
    ) -> Result<bool, AppError>;
    fn changed_since(
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        since: &str,
        device_id: &str,
    ) -> Result<Vec<Self>, AppError>;

    /// Cross-row checks: references resolve in the tenant, unique keys hold
    fn check_relations(&self, conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<(), AppError>;

    fn count_with_status(conn: &mut SqliteConnection, ctx: &TenantContext, state: &str) -> Result<i64, AppError>;
    fn mark_synced(conn: &mut SqliteConnection, ctx: &TenantContext, ids: &[i64], now: &str) -> Result<usize, AppError>;
    fn latest_sync(
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        device_id: Option<&str>,
    ) -> Result<Option<String>, AppError>;
}

fn not_found<T: SyncRecord>(id: i64) -> AppError {
    AppError::NotFound(format!("{} {} not found", T::ENTITY, id))
}

/// Serialize a row into its JSON object form
pub fn to_object<T: SyncRecord>(row: &T) -> Result<Map<String, Value>, AppError> {
    match serde_json::to_value(row)? {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::Internal(format!("{} did not serialize to an object", T::ENTITY))),
    }
}

/// Overlay a partial JSON patch onto a row
pub fn apply_patch<T: SyncRecord>(current: &T, patch: &Map<String, Value>) -> Result<T, AppError> {
    let merged = merge_fields(&to_object(current)?, patch);
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| AppError::InvalidInput(format!("invalid {} fields: {}", T::ENTITY, e)))
}

/// Read-modify-write through compare-and-swap, retrying when another
/// writer advances the row between the read and the write.
///
/// REST writes clear `last_modified_device` so every device receives them.
pub fn update_versioned<T, F>(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: i64,
    mut change: F,
) -> Result<T, AppError>
where
    T: SyncRecord,
    F: FnMut(&mut SqliteConnection, &T) -> Result<T, AppError>,
{
    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = T::find(conn, ctx, id)?.ok_or_else(|| not_found::<T>(id))?;
        let mut next = change(conn, &current)?;
        next.stamp(current.version() + 1, None, sync_status::PENDING, &current_timestamp());
        if T::compare_and_swap(conn, ctx, &next, current.version())? {
            return Ok(next);
        }
        debug!(entity = %T::ENTITY, id, attempt, "Version moved during update, retrying");
    }
    Err(AppError::Conflict(format!(
        "{} {} was modified concurrently, retry the request",
        T::ENTITY,
        id
    )))
}

/// Soft delete through `update_versioned`; deleting twice is a not-found
pub fn soft_delete<T: SyncRecord>(conn: &mut SqliteConnection, ctx: &TenantContext, id: i64) -> Result<T, AppError> {
    update_versioned(conn, ctx, id, |_, current: &T| {
        if current.is_deleted() {
            return Err(not_found::<T>(id));
        }
        let mut next = current.clone();
        next.mark_deleted()?;
        Ok(next)
    })
}

fn require_animal(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: i64,
    field: &str,
) -> Result<Animal, AppError> {
    animals::get_animal(conn, ctx, id)?
        .ok_or_else(|| AppError::NotFound(format!("{} {} not found in this farm", field, id)))
}

fn animal_relations(row: &Animal, conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<(), AppError> {
    if animals::tag_exists(conn, ctx, &row.tag_number, Some(row.id))? {
        return Err(AppError::InvalidInput(format!(
            "tag number '{}' is already registered",
            row.tag_number
        )));
    }
    if let Some(mother_id) = row.mother_id {
        require_animal(conn, ctx, mother_id, "mother")?;
    }
    if let Some(father_id) = row.father_id {
        require_animal(conn, ctx, father_id, "father")?;
    }
    Ok(())
}

fn health_relations(row: &HealthRecord, conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<(), AppError> {
    require_animal(conn, ctx, row.animal_id, "animal").map(|_| ())
}

/// The dam must be a female and the sire a male of the same farm
pub fn check_breeding_pair(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    animal_id: i64,
    sire_id: Option<i64>,
) -> Result<(), AppError> {
    let dam = require_animal(conn, ctx, animal_id, "animal")?;
    if dam.sex != sex::FEMALE {
        return Err(AppError::InvalidInput(
            "reproduction events can only be recorded for females".into(),
        ));
    }
    if let Some(sire_id) = sire_id {
        let sire = require_animal(conn, ctx, sire_id, "sire")?;
        if sire.sex != sex::MALE {
            return Err(AppError::InvalidInput("the sire must be a male".into()));
        }
    }
    Ok(())
}

fn reproduction_relations(
    row: &ReproductionRecord,
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
) -> Result<(), AppError> {
    check_breeding_pair(conn, ctx, row.animal_id, row.sire_id)
}

fn production_relations(
    row: &ProductionRecord,
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
) -> Result<(), AppError> {
    require_animal(conn, ctx, row.animal_id, "animal").map(|_| ())
}

fn transaction_relations(row: &Transaction, conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<(), AppError> {
    if let Some(animal_id) = row.animal_id {
        require_animal(conn, ctx, animal_id, "animal")?;
    }
    Ok(())
}

/// Implements `SyncRecord` for a tenant-owned table whose row carries
/// `status` plus the four sync columns.
macro_rules! tenant_owned_record {
    (
        $model:ty, $entity:expr, $table:ident,
        find = $find:path,
        insert = $insert:path,
        cas = $cas:path,
        changed = $changed:path,
        relations = $relations:path $(,)?
    ) => {
        impl SyncRecord for $model {
            const ENTITY: EntityType = $entity;

            fn id(&self) -> i64 {
                self.id
            }

            fn version(&self) -> i64 {
                self.sync_version
            }

            fn updated_at(&self) -> &str {
                &self.updated_at
            }

            fn is_deleted(&self) -> bool {
                self.status == status::DELETED
            }

            fn mark_deleted(&mut self) -> Result<(), AppError> {
                self.status = status::DELETED.to_string();
                Ok(())
            }

            fn stamp(&mut self, version: i64, device: Option<&str>, state: &str, now: &str) {
                self.sync_version = version;
                self.updated_at = now.to_string();
                self.last_modified_device = device.map(str::to_string);
                self.sync_status = state.to_string();
                if state == sync_status::SYNCED {
                    self.last_sync_at = Some(now.to_string());
                }
            }

            fn find(conn: &mut SqliteConnection, ctx: &TenantContext, id: i64) -> Result<Option<Self>, AppError> {
                $find(conn, ctx, id)
            }

            fn insert(conn: &mut SqliteConnection, row: &Self) -> Result<(), AppError> {
                $insert(conn, row)
            }

            fn compare_and_swap(
                conn: &mut SqliteConnection,
                ctx: &TenantContext,
                row: &Self,
                expected_version: i64,
            ) -> Result<bool, AppError> {
                $cas(conn, ctx, row, expected_version)
            }

            fn changed_since(
                conn: &mut SqliteConnection,
                ctx: &TenantContext,
                since: &str,
                device_id: &str,
            ) -> Result<Vec<Self>, AppError> {
                $changed(conn, ctx, since, device_id)
            }

            fn check_relations(&self, conn: &mut SqliteConnection, ctx: &TenantContext) -> Result<(), AppError> {
                $relations(self, conn, ctx)
            }

            fn count_with_status(
                conn: &mut SqliteConnection,
                ctx: &TenantContext,
                state: &str,
            ) -> Result<i64, AppError> {
                use crate::db::diesel_schema::$table;
                let count = $table::table
                    .filter($table::tenant_id.eq(ctx.tenant_id))
                    .filter($table::sync_status.eq(state))
                    .count()
                    .get_result(conn)?;
                Ok(count)
            }

            fn mark_synced(
                conn: &mut SqliteConnection,
                ctx: &TenantContext,
                ids: &[i64],
                now: &str,
            ) -> Result<usize, AppError> {
                use crate::db::diesel_schema::$table;
                let updated = diesel::update(
                    $table::table
                        .filter($table::tenant_id.eq(ctx.tenant_id))
                        .filter($table::id.eq_any(ids)),
                )
                .set((
                    $table::sync_status.eq(sync_status::SYNCED),
                    $table::last_sync_at.eq(now),
                ))
                .execute(conn)?;
                Ok(updated)
            }

            fn latest_sync(
                conn: &mut SqliteConnection,
                ctx: &TenantContext,
                device_id: Option<&str>,
            ) -> Result<Option<String>, AppError> {
                use crate::db::diesel_schema::$table;
                let mut q = $table::table
                    .filter($table::tenant_id.eq(ctx.tenant_id))
                    .into_boxed();
                if let Some(device) = device_id {
                    q = q.filter($table::last_modified_device.eq(device));
                }
                let latest: Option<String> = q
                    .select(diesel::dsl::max($table::last_sync_at))
                    .first(conn)?;
                Ok(latest)
            }
        }
    };
}

tenant_owned_record!(
    Animal, EntityType::Animal, animals,
    find = animals::get_animal,
    insert = animals::insert_animal,
    cas = animals::compare_and_swap,
    changed = animals::changed_since,
    relations = animal_relations,
);

tenant_owned_record!(
    HealthRecord, EntityType::HealthRecord, health_records,
    find = health_records::get_record,
    insert = health_records::insert_record,
    cas = health_records::compare_and_swap,
    changed = health_records::changed_since,
    relations = health_relations,
);

tenant_owned_record!(
    ReproductionRecord, EntityType::ReproductionRecord, reproduction_records,
    find = reproduction_records::get_record,
    insert = reproduction_records::insert_record,
    cas = reproduction_records::compare_and_swap,
    changed = reproduction_records::changed_since,
    relations = reproduction_relations,
);

tenant_owned_record!(
    ProductionRecord, EntityType::ProductionRecord, production_records,
    find = production_records::get_record,
    insert = production_records::insert_record,
    cas = production_records::compare_and_swap,
    changed = production_records::changed_since,
    relations = production_relations,
);

tenant_owned_record!(
    Transaction, EntityType::Transaction, transactions,
    find = transactions::get_transaction,
    insert = transactions::insert_transaction,
    cas = transactions::compare_and_swap,
    changed = transactions::changed_since,
    relations = transaction_relations,
);

// The tenant row is its own scope, so it is addressed by the context id and
// cannot be created or deleted by clients.
impl SyncRecord for Tenant {
    const ENTITY: EntityType = EntityType::Tenant;

    fn id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i64 {
        self.sync_version
    }

    fn updated_at(&self) -> &str {
        &self.updated_at
    }

    fn is_deleted(&self) -> bool {
        false
    }

    fn mark_deleted(&mut self) -> Result<(), AppError> {
        Err(AppError::Forbidden("tenants cannot be deleted".into()))
    }

    fn stamp(&mut self, version: i64, device: Option<&str>, state: &str, now: &str) {
        self.sync_version = version;
        self.updated_at = now.to_string();
        self.last_modified_device = device.map(str::to_string);
        self.sync_status = state.to_string();
        if state == sync_status::SYNCED {
            self.last_sync_at = Some(now.to_string());
        }
    }

    fn client_lifecycle() -> bool {
        false
    }

    fn find(conn: &mut SqliteConnection, ctx: &TenantContext, id: i64) -> Result<Option<Self>, AppError> {
        if id != ctx.tenant_id {
            return Ok(None);
        }
        tenants::get_tenant(conn, ctx)
    }

    fn insert(_conn: &mut SqliteConnection, _row: &Self) -> Result<(), AppError> {
        Err(AppError::Forbidden("tenants cannot be created through sync".into()))
    }

    fn compare_and_swap(
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        row: &Self,
        expected_version: i64,
    ) -> Result<bool, AppError> {
        tenants::compare_and_swap(conn, ctx, row, expected_version)
    }

    fn changed_since(
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        since: &str,
        device_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        tenants::changed_since(conn, ctx, since, device_id)
    }

    fn check_relations(&self, conn: &mut SqliteConnection, _ctx: &TenantContext) -> Result<(), AppError> {
        use crate::db::diesel_schema::tenants as t;
        if let Some(ref tax_id) = self.tax_id {
            let taken: i64 = t::table
                .filter(t::tax_id.eq(tax_id))
                .filter(t::id.ne(self.id))
                .count()
                .get_result(conn)?;
            if taken > 0 {
                return Err(AppError::InvalidInput(format!("tax id '{}' is already registered", tax_id)));
            }
        }
        Ok(())
    }

    fn count_with_status(conn: &mut SqliteConnection, ctx: &TenantContext, state: &str) -> Result<i64, AppError> {
        use crate::db::diesel_schema::tenants as t;
        let count = t::table
            .filter(t::id.eq(ctx.tenant_id))
            .filter(t::sync_status.eq(state))
            .count()
            .get_result(conn)?;
        Ok(count)
    }

    fn mark_synced(conn: &mut SqliteConnection, ctx: &TenantContext, ids: &[i64], now: &str) -> Result<usize, AppError> {
        use crate::db::diesel_schema::tenants as t;
        if !ids.contains(&ctx.tenant_id) {
            return Ok(0);
        }
        let updated = diesel::update(t::table.filter(t::id.eq(ctx.tenant_id)))
            .set((t::sync_status.eq(sync_status::SYNCED), t::last_sync_at.eq(now)))
            .execute(conn)?;
        Ok(updated)
    }

    fn latest_sync(
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        device_id: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        use crate::db::diesel_schema::tenants as t;
        let mut q = t::table.filter(t::id.eq(ctx.tenant_id)).into_boxed();
        if let Some(device) = device_id {
            q = q.filter(t::last_modified_device.eq(device));
        }
        let latest: Option<String> = q.select(diesel::dsl::max(t::last_sync_at)).first(conn)?;
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::animals::{create_animal, fixtures::new_animal};
    use crate::db::test_support::db_with_tenant;
    use serde_json::json;

    #[test]
    fn test_update_versioned_bumps_version_and_clears_device() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let cow = create_animal(conn, &new_animal(&ctx, "CO-7", "female"))?;
            let patch = json!({"name": "Pinta", "sync_version": 40});
            let updated: Animal = update_versioned(conn, &ctx, cow.id, |_, current: &Animal| {
                apply_patch(current, patch.as_object().unwrap())
            })?;
            assert_eq!(updated.name.as_deref(), Some("Pinta"));
            assert_eq!(updated.sync_version, 2);
            assert_eq!(updated.sync_status, sync_status::PENDING);
            assert!(updated.last_modified_device.is_none());

            let stored = animals::get_animal(conn, &ctx, cow.id)?.unwrap();
            assert_eq!(stored, updated);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_soft_delete_keeps_row() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let cow = create_animal(conn, &new_animal(&ctx, "CO-8", "female"))?;
            let deleted: Animal = soft_delete(conn, &ctx, cow.id)?;
            assert!(deleted.is_deleted());
            assert_eq!(deleted.sync_version, 2);
            assert!(animals::get_animal(conn, &ctx, cow.id)?.is_some());

            let again = soft_delete::<Animal>(conn, &ctx, cow.id);
            assert!(matches!(again, Err(AppError::NotFound(_))));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_mark_synced_is_tenant_scoped() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let a = create_animal(conn, &new_animal(&ctx, "A-1", "male"))?;
            let b = create_animal(conn, &new_animal(&ctx, "A-2", "male"))?;
            let other = TenantContext::new(ctx.tenant_id + 1);

            assert_eq!(Animal::mark_synced(conn, &other, &[a.id, b.id], "2024-05-01T00:00:00.000000Z")?, 0);
            assert_eq!(Animal::count_with_status(conn, &ctx, sync_status::PENDING)?, 2);

            assert_eq!(Animal::mark_synced(conn, &ctx, &[a.id], "2024-05-01T00:00:00.000000Z")?, 1);
            assert_eq!(Animal::count_with_status(conn, &ctx, sync_status::SYNCED)?, 1);
            assert_eq!(
                Animal::latest_sync(conn, &ctx, None)?.as_deref(),
                Some("2024-05-01T00:00:00.000000Z")
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_relations_require_same_tenant() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let cow = create_animal(conn, &new_animal(&ctx, "CO-9", "female"))?;
            let mut calf = cow.clone();
            calf.id = cow.id + 100;
            calf.tag_number = "CA-1".into();
            calf.mother_id = Some(cow.id);
            assert!(calf.check_relations(conn, &ctx).is_ok());

            calf.father_id = Some(9_999);
            assert!(matches!(calf.check_relations(conn, &ctx), Err(AppError::NotFound(_))));

            calf.father_id = None;
            calf.tag_number = "CO-9".into();
            assert!(matches!(calf.check_relations(conn, &ctx), Err(AppError::InvalidInput(_))));
            Ok(())
        })
        .unwrap();
    }
}
