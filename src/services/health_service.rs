//! Health log: vaccines, treatments, dewormings and surgeries

use diesel::SqliteConnection;
use serde_json::{Map, Value};
use tracing::info;

use super::animal_service::live_animal;
use crate::auth::AuthUser;
use crate::db::health_records::{self, HealthQuery};
use crate::db::models::{current_timestamp, status, HealthRecord, NewHealthRecord};
use crate::db::{animals, Database, RecordPage, TenantContext};
use crate::error::AppError;
use crate::sync::{apply_patch, soft_delete, update_versioned, SyncRecord};
use crate::validation::Validate;
use crate::views::HealthRecordView;

fn record_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Health record {} not found", id))
}

fn decorate(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    records: Vec<HealthRecord>,
) -> Result<Vec<HealthRecordView>, AppError> {
    let ids: Vec<i64> = records.iter().map(|r| r.animal_id).collect();
    let animals = animals::get_animals_by_ids(conn, ctx, &ids)?;
    Ok(records
        .into_iter()
        .map(|r| HealthRecordView::new(r, &animals))
        .collect())
}

fn view_one(conn: &mut SqliteConnection, ctx: &TenantContext, record: HealthRecord) -> Result<HealthRecordView, AppError> {
    let mut views = decorate(conn, ctx, vec![record])?;
    views
        .pop()
        .ok_or_else(|| AppError::Internal("record view lost".into()))
}

pub struct HealthService {
    db: Database,
}

impl HealthService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(&self, ctx: &TenantContext, query: &HealthQuery) -> Result<RecordPage<HealthRecordView>, AppError> {
        self.db.with_conn(|conn| {
            let page = health_records::list_records(conn, ctx, query)?;
            let items = decorate(conn, ctx, page.items)?;
            Ok(RecordPage {
                total: page.total,
                items,
                skip: page.skip,
                limit: page.limit,
            })
        })
    }

    pub fn get(&self, ctx: &TenantContext, id: i64) -> Result<HealthRecordView, AppError> {
        self.db.with_conn(|conn| {
            let record = health_records::get_record(conn, ctx, id)?
                .filter(|r| r.status != status::DELETED)
                .ok_or_else(|| record_not_found(id))?;
            view_one(conn, ctx, record)
        })
    }

    /// Full history of one animal, newest first
    pub fn animal_history(&self, ctx: &TenantContext, animal_id: i64) -> Result<Vec<HealthRecordView>, AppError> {
        self.db.with_conn(|conn| {
            animals::get_animal(conn, ctx, animal_id)?
                .ok_or_else(|| AppError::NotFound(format!("Animal {} not found", animal_id)))?;
            let records = health_records::animal_history(conn, ctx, animal_id)?;
            decorate(conn, ctx, records)
        })
    }

    pub fn create(&self, auth: &AuthUser, mut input: NewHealthRecord) -> Result<HealthRecordView, AppError> {
        let ctx = auth.tenant;
        input.tenant_id = ctx.tenant_id;
        input.record_type = input.record_type.to_lowercase();
        input.validate()?;
        input.recorded_by = Some(auth.user_id);
        let now = current_timestamp();
        input.created_at = now.clone();
        input.updated_at = now;

        let view = self.db.transaction(|conn| {
            live_animal(conn, &ctx, input.animal_id)?;
            let record = health_records::create_record(conn, &input)?;
            view_one(conn, &ctx, record)
        })?;
        info!(tenant = ctx.tenant_id, id = view.record.id, kind = %view.record.record_type, "Health record created");
        Ok(view)
    }

    pub fn update(&self, ctx: &TenantContext, id: i64, patch: &Map<String, Value>) -> Result<HealthRecordView, AppError> {
        self.db.transaction(|conn| {
            let record = update_versioned(conn, ctx, id, |conn, current: &HealthRecord| {
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
            .transaction(|conn| soft_delete::<HealthRecord>(conn, ctx, id))
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

    fn vaccine(animal_id: i64, date: &str) -> NewHealthRecord {
        serde_json::from_value(json!({
            "animal_id": animal_id,
            "record_type": "Vaccine",
            "date": date,
            "product": "Aftosa",
            "route": "subcutaneous",
            "cost": 4500.0
        }))
        .unwrap()
    }

    #[test]
    fn test_create_decorates_and_history_orders() {
        let (db, ctx) = db_with_tenant();
        let mut input = new_animal(&ctx, "CO-1", "female");
        input.name = Some("Mariposa".into());
        let cow = db.with_conn(|conn| create_animal(conn, &input)).unwrap();
        let service = HealthService::new(db.clone());
        let auth = add_user(&db, ctx, Role::Veterinarian);

        let first = service.create(&auth, vaccine(cow.id, "2024-03-01")).unwrap();
        assert_eq!(first.animal_tag.as_deref(), Some("CO-1"));
        assert_eq!(first.animal_name.as_deref(), Some("Mariposa"));
        assert_eq!(first.record.record_type, "vaccine");
        assert_eq!(first.record.recorded_by, Some(9));
        service.create(&auth, vaccine(cow.id, "2024-06-01")).unwrap();

        let history = service.animal_history(&ctx, cow.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].record.date, "2024-06-01");

        service.delete(&ctx, first.record.id).unwrap();
        assert_eq!(service.animal_history(&ctx, cow.id).unwrap().len(), 1);
        assert!(matches!(service.get(&ctx, first.record.id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_validation() {
        let (db, ctx) = db_with_tenant();
        let cow = db.with_conn(|conn| create_animal(conn, &new_animal(&ctx, "CO-1", "female"))).unwrap();
        let service = HealthService::new(db.clone());
        let auth = add_user(&db, ctx, Role::Operator);

        let mut bad = vaccine(cow.id, "2024-03-01");
        bad.cost = Some(-1.0);
        assert!(matches!(service.create(&auth, bad), Err(AppError::InvalidInput(_))));

        let mut bad = vaccine(cow.id, "2024-03-01");
        bad.route = Some("nasal".into());
        assert!(matches!(service.create(&auth, bad), Err(AppError::InvalidInput(_))));

        assert!(matches!(
            service.create(&auth, vaccine(cow.id + 50, "2024-03-01")),
            Err(AppError::NotFound(_))
        ));

        let created = service.create(&auth, vaccine(cow.id, "2024-03-01")).unwrap();
        let err = service
            .update(&ctx, created.record.id, json!({"animal_weight": 0}).as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
