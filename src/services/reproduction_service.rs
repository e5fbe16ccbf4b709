//! Reproduction log and herd fertility summary

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use diesel::SqliteConnection;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use super::animal_service::live_animal;
use crate::auth::AuthUser;
use crate::db::models::{current_timestamp, status, NewReproductionRecord, ReproductionRecord};
use crate::db::reproduction_records::{self, ReproductionQuery};
use crate::db::{animals, reports, Database, RecordPage, TenantContext};
use crate::error::AppError;
use crate::sync::record::check_breeding_pair;
use crate::sync::{apply_patch, soft_delete, update_versioned, SyncRecord};
use crate::validation::Validate;
use crate::views::ReproductionRecordView;

#[derive(Debug, Clone, Serialize)]
pub struct ReproductionStats {
    pub active_females: i64,
    pub pregnant: i64,
    pub open: i64,
    pub services_last_30_days: i64,
    pub births_last_30_days: i64,
    /// Percentage of active females whose latest diagnosis is pregnant
    pub pregnancy_rate: f64,
    pub average_gestation_days: Option<f64>,
    pub births_expected_next_30_days: i64,
}

fn record_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Reproduction record {} not found", id))
}

fn decorate(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    records: Vec<ReproductionRecord>,
) -> Result<Vec<ReproductionRecordView>, AppError> {
    let ids: Vec<i64> = records
        .iter()
        .flat_map(|r| std::iter::once(r.animal_id).chain(r.sire_id))
        .collect();
    let animals = animals::get_animals_by_ids(conn, ctx, &ids)?;
    Ok(records
        .into_iter()
        .map(|r| ReproductionRecordView::new(r, &animals))
        .collect())
}

fn view_one(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    record: ReproductionRecord,
) -> Result<ReproductionRecordView, AppError> {
    decorate(conn, ctx, vec![record])?
        .pop()
        .ok_or_else(|| AppError::Internal("record view lost".into()))
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Latest diagnosis per animal among `females`, counted as (pregnant, open)
pub(crate) fn diagnosis_counts(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    females: &HashSet<i64>,
) -> Result<(i64, i64), AppError> {
    let mut latest: HashMap<i64, String> = HashMap::new();
    for record in reproduction_records::diagnoses(conn, ctx)? {
        if let Some(diagnosis) = record.diagnosis {
            latest.insert(record.animal_id, diagnosis);
        }
    }
    let (mut pregnant, mut open) = (0, 0);
    for (animal_id, diagnosis) in latest {
        if !females.contains(&animal_id) {
            continue;
        }
        match diagnosis.as_str() {
            "pregnant" => pregnant += 1,
            "open" => open += 1,
            _ => {}
        }
    }
    Ok((pregnant, open))
}

pub struct ReproductionService {
    db: Database,
}

impl ReproductionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(
        &self,
        ctx: &TenantContext,
        query: &ReproductionQuery,
    ) -> Result<RecordPage<ReproductionRecordView>, AppError> {
        self.db.with_conn(|conn| {
            let page = reproduction_records::list_records(conn, ctx, query)?;
            let items = decorate(conn, ctx, page.items)?;
            Ok(RecordPage {
                total: page.total,
                items,
                skip: page.skip,
                limit: page.limit,
            })
        })
    }

    pub fn get(&self, ctx: &TenantContext, id: i64) -> Result<ReproductionRecordView, AppError> {
        self.db.with_conn(|conn| {
            let record = reproduction_records::get_record(conn, ctx, id)?
                .filter(|r| r.status != status::DELETED)
                .ok_or_else(|| record_not_found(id))?;
            view_one(conn, ctx, record)
        })
    }

    pub fn create(&self, auth: &AuthUser, mut input: NewReproductionRecord) -> Result<ReproductionRecordView, AppError> {
        let ctx = auth.tenant;
        input.tenant_id = ctx.tenant_id;
        input.event_type = input.event_type.to_lowercase();
        input.validate()?;
        input.recorded_by = Some(auth.user_id);
        let now = current_timestamp();
        input.created_at = now.clone();
        input.updated_at = now;

        let view = self.db.transaction(|conn| {
            live_animal(conn, &ctx, input.animal_id)?;
            check_breeding_pair(conn, &ctx, input.animal_id, input.sire_id)?;
            let record = reproduction_records::create_record(conn, &input)?;
            view_one(conn, &ctx, record)
        })?;
        info!(
            tenant = ctx.tenant_id,
            id = view.record.id,
            event = %view.record.event_type,
            "Reproduction event recorded"
        );
        Ok(view)
    }

    pub fn update(
        &self,
        ctx: &TenantContext,
        id: i64,
        patch: &Map<String, Value>,
    ) -> Result<ReproductionRecordView, AppError> {
        self.db.transaction(|conn| {
            let record = update_versioned(conn, ctx, id, |conn, current: &ReproductionRecord| {
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
            .transaction(|conn| soft_delete::<ReproductionRecord>(conn, ctx, id))
            .map(|_| ())
            .map_err(|e| match e {
                AppError::NotFound(_) => record_not_found(id),
                other => other,
            })
    }

    pub fn stats(&self, ctx: &TenantContext, today: NaiveDate) -> Result<ReproductionStats, AppError> {
        let month_ago = day(today - Duration::days(30));
        let in_a_month = day(today + Duration::days(30));
        let today_s = day(today);

        self.db.with_conn(|conn| {
            let females: HashSet<i64> = reports::active_female_ids(conn, ctx)?.into_iter().collect();
            let active_females = females.len() as i64;
            let (pregnant, open) = diagnosis_counts(conn, ctx, &females)?;

            let gestations = reproduction_records::gestation_days(conn, ctx)?;
            let average_gestation_days = if gestations.is_empty() {
                None
            } else {
                let sum: i64 = gestations.iter().map(|&d| d as i64).sum();
                Some((sum as f64 / gestations.len() as f64 * 10.0).round() / 10.0)
            };

            let pregnancy_rate = if active_females > 0 {
                (pregnant as f64 / active_females as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            };

            Ok(ReproductionStats {
                active_females,
                pregnant,
                open,
                services_last_30_days: reproduction_records::count_events_between(
                    conn, ctx, "service", &month_ago, &today_s,
                )?,
                births_last_30_days: reproduction_records::count_events_between(
                    conn, ctx, "birth", &month_ago, &today_s,
                )?,
                pregnancy_rate,
                average_gestation_days,
                births_expected_next_30_days: reproduction_records::births_expected_between(
                    conn, ctx, &today_s, &in_a_month,
                )?
                .len() as i64,
            })
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

    fn event(animal_id: i64, event_type: &str, date: &str, extra: Value) -> NewReproductionRecord {
        let mut body = json!({
            "animal_id": animal_id,
            "event_type": event_type,
            "event_date": date,
        });
        if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), extra) {
            obj.extend(extra);
        }
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_sex_checks() {
        let (db, ctx) = db_with_tenant();
        let (cow, bull) = db
            .with_conn(|conn| {
                Ok((
                    create_animal(conn, &new_animal(&ctx, "CO-1", "female"))?,
                    create_animal(conn, &new_animal(&ctx, "TO-1", "male"))?,
                ))
            })
            .unwrap();
        let service = ReproductionService::new(db.clone());
        let auth = add_user(&db, ctx, Role::Operator);

        let on_bull = service.create(&auth, event(bull.id, "service", "2024-02-01", json!({})));
        assert!(matches!(on_bull, Err(AppError::InvalidInput(_))));

        let cow_as_sire = service.create(&auth, event(cow.id, "service", "2024-02-01", json!({"sire_id": cow.id})));
        assert!(matches!(cow_as_sire, Err(AppError::InvalidInput(_))));

        let ok = service
            .create(&auth, event(cow.id, "service", "2024-02-01", json!({"sire_id": bull.id, "service_number": 1})))
            .unwrap();
        assert_eq!(ok.sire_tag.as_deref(), Some("TO-1"));
        assert_eq!(ok.animal_tag.as_deref(), Some("CO-1"));
    }

    #[test]
    fn test_stats_use_latest_diagnosis() {
        let (db, ctx) = db_with_tenant();
        let (a, b) = db
            .with_conn(|conn| {
                Ok((
                    create_animal(conn, &new_animal(&ctx, "CO-1", "female"))?,
                    create_animal(conn, &new_animal(&ctx, "CO-2", "female"))?,
                ))
            })
            .unwrap();
        let service = ReproductionService::new(db.clone());
        let auth = add_user(&db, ctx, Role::Veterinarian);
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        service.create(&auth, event(a.id, "diagnosis", "2024-04-01", json!({"diagnosis": "open"}))).unwrap();
        service
            .create(
                &auth,
                event(a.id, "diagnosis", "2024-05-20", json!({"diagnosis": "pregnant", "expected_birth_date": "2024-07-01"})),
            )
            .unwrap();
        service.create(&auth, event(b.id, "diagnosis", "2024-05-01", json!({"diagnosis": "open"}))).unwrap();
        service.create(&auth, event(b.id, "service", "2024-06-01", json!({}))).unwrap();
        service.create(&auth, event(b.id, "birth", "2024-01-10", json!({"gestation_days": 280}))).unwrap();
        service.create(&auth, event(b.id, "birth", "2023-01-10", json!({"gestation_days": 285}))).unwrap();

        let stats = service.stats(&ctx, today).unwrap();
        assert_eq!(stats.active_females, 2);
        assert_eq!(stats.pregnant, 1);
        assert_eq!(stats.open, 1);
        assert_eq!(stats.services_last_30_days, 1);
        assert_eq!(stats.births_last_30_days, 0);
        assert_eq!(stats.pregnancy_rate, 50.0);
        assert_eq!(stats.average_gestation_days, Some(282.5));
        assert_eq!(stats.births_expected_next_30_days, 1);
    }
}
