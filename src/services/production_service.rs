//! Milk and weight-at-sale production log

use diesel::SqliteConnection;
use serde_json::{Map, Value};
use tracing::info;

use super::animal_service::live_animal;
use crate::auth::AuthUser;
use crate::db::models::{current_timestamp, status, NewProductionRecord, ProductionRecord};
use crate::db::production_records::{self, ProductionQuery};
use crate::db::{animals, Database, RecordPage, TenantContext};
use crate::error::AppError;
use crate::sync::{apply_patch, soft_delete, update_versioned, SyncRecord};
use crate::validation::Validate;
use crate::views::ProductionRecordView;

fn record_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Production record {} not found", id))
}

fn decorate(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    records: Vec<ProductionRecord>,
) -> Result<Vec<ProductionRecordView>, AppError> {
    let ids: Vec<i64> = records.iter().map(|r| r.animal_id).collect();
    let animals = animals::get_animals_by_ids(conn, ctx, &ids)?;
    Ok(records
        .into_iter()
        .map(|r| ProductionRecordView::new(r, &animals))
        .collect())
}

fn view_one(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    record: ProductionRecord,
) -> Result<ProductionRecordView, AppError> {
    decorate(conn, ctx, vec![record])?
        .pop()
        .ok_or_else(|| AppError::Internal("record view lost".into()))
}

pub struct ProductionService {
    db: Database,
}

impl ProductionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(
        &self,
        ctx: &TenantContext,
        query: &ProductionQuery,
    ) -> Result<RecordPage<ProductionRecordView>, AppError> {
        self.db.with_conn(|conn| {
            let page = production_records::list_records(conn, ctx, query)?;
            let items = decorate(conn, ctx, page.items)?;
            Ok(RecordPage {
                total: page.total,
                items,
                skip: page.skip,
                limit: page.limit,
            })
        })
    }

    pub fn get(&self, ctx: &TenantContext, id: i64) -> Result<ProductionRecordView, AppError> {
        self.db.with_conn(|conn| {
            let record = production_records::get_record(conn, ctx, id)?
                .filter(|r| r.status != status::DELETED)
                .ok_or_else(|| record_not_found(id))?;
            view_one(conn, ctx, record)
        })
    }

    pub fn create(&self, auth: &AuthUser, mut input: NewProductionRecord) -> Result<ProductionRecordView, AppError> {
        let ctx = auth.tenant;
        input.tenant_id = ctx.tenant_id;
        input.production_type = input.production_type.to_lowercase();
        input.validate()?;
        input.recorded_by = Some(auth.user_id);
        let now = current_timestamp();
        input.created_at = now.clone();
        input.updated_at = now;

        let view = self.db.transaction(|conn| {
            live_animal(conn, &ctx, input.animal_id)?;
            let record = production_records::create_record(conn, &input)?;
            view_one(conn, &ctx, record)
        })?;
        info!(tenant = ctx.tenant_id, id = view.record.id, "Production recorded");
        Ok(view)
    }

    pub fn update(
        &self,
        ctx: &TenantContext,
        id: i64,
        patch: &Map<String, Value>,
    ) -> Result<ProductionRecordView, AppError> {
        self.db.transaction(|conn| {
            let record = update_versioned(conn, ctx, id, |conn, current: &ProductionRecord| {
                if current.is_deleted() {
                    return Err(record_not_found(id));
                }
                let next = apply_patch(current, patch)?;
                next.validate()?;
                next.check_relations(conn, ctx)?;
                Ok(next)
            })?;
            view_one(conn, ctx, record)
        })
    }

    pub fn delete(&self, ctx: &TenantContext, id: i64) -> Result<(), AppError> {
        self.db
            .transaction(|conn| soft_delete::<ProductionRecord>(conn, ctx, id))
            .map(|_| ())
            .map_err(|e| match e {
                AppError::NotFound(_) => record_not_found(id),
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::animals::{create_animal, fixtures::new_animal};
    use crate::db::test_support::{add_user, db_with_tenant};
    use serde_json::json;

    fn milking(animal_id: i64, liters: f64) -> NewProductionRecord {
        serde_json::from_value(json!({
            "animal_id": animal_id,
            "production_type": "milk",
            "date": "2024-05-02",
            "liters": liters,
            "shift": "morning"
        }))
        .unwrap()
    }

    #[test]
    fn test_create_update_delete() {
        let (db, ctx) = db_with_tenant();
        let cow = db.with_conn(|conn| create_animal(conn, &new_animal(&ctx, "CO-7", "female"))).unwrap();
        let service = ProductionService::new(db.clone());
        let auth = add_user(&db, ctx, Role::Operator);

        let record = service.create(&auth, milking(cow.id, 11.5)).unwrap();
        assert_eq!(record.animal_tag.as_deref(), Some("CO-7"));

        let updated = service
            .update(&ctx, record.record.id, json!({"liters": 12.0}).as_object().unwrap())
            .unwrap();
        assert_eq!(updated.record.liters, Some(12.0));
        assert_eq!(updated.record.sync_version, 2);

        let bad = service.update(&ctx, record.record.id, json!({"liters": -3.0}).as_object().unwrap());
        assert!(matches!(bad, Err(AppError::InvalidInput(_))));

        service.delete(&ctx, record.record.id).unwrap();
        let page = service
            .list(&ctx, &ProductionQuery { limit: 100, ..Default::default() })
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[test]
    fn test_rejects_unknown_shift_and_deleted_animal() {
        let (db, ctx) = db_with_tenant();
        let cow = db.with_conn(|conn| create_animal(conn, &new_animal(&ctx, "CO-8", "female"))).unwrap();
        let service = ProductionService::new(db.clone());
        let auth = add_user(&db, ctx, Role::Operator);

        let mut bad = milking(cow.id, 8.0);
        bad.shift = Some("midnight".into());
        assert!(matches!(service.create(&auth, bad), Err(AppError::InvalidInput(_))));

        db.transaction(|conn| soft_delete::<crate::db::models::Animal>(conn, &ctx, cow.id))
            .unwrap();
        assert!(matches!(service.create(&auth, milking(cow.id, 8.0)), Err(AppError::NotFound(_))));
    }
}
