//! Farm dashboard and upcoming-event alerts

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::reproduction_service::diagnosis_counts;
use super::transaction_service::{month_bounds, EXPENSE, PURCHASE, SALE};
use crate::db::models::{current_timestamp, parse_date, Animal};
use crate::db::reports::{self, Inventory};
use crate::db::{animals, health_records, production_records, reproduction_records, transactions};
use crate::db::{Database, TenantContext};
use crate::error::AppError;

const ALERT_WINDOW_DAYS: i64 = 15;
const VACCINE_URGENT_DAYS: i64 = 3;
const BIRTH_URGENT_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub records_this_month: i64,
    pub vaccines_due_30_days: i64,
    pub treatments_this_month: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReproductionSummary {
    pub pregnant: i64,
    pub open: i64,
    pub services_this_month: i64,
    pub births_this_month: i64,
    pub births_due_30_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductionSummary {
    pub milk_today: f64,
    pub milk_this_month: f64,
    /// Month litres per active cow or heifer
    pub average_per_cow: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinanceSummary {
    pub sales_this_month: f64,
    pub purchases_this_month: f64,
    pub expenses_this_month: f64,
    pub month_balance: f64,
    pub total_balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub inventory: Inventory,
    pub health: HealthSummary,
    pub reproduction: ReproductionSummary,
    pub production: ProductionSummary,
    pub finance: FinanceSummary,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Vaccine,
    Birth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub priority: Priority,
    pub animal_id: i64,
    pub animal_tag: String,
    pub animal_name: Option<String>,
    pub message: String,
    pub due_date: String,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertList {
    pub total: usize,
    pub alerts: Vec<Alert>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub struct DashboardService {
    db: Database,
}

impl DashboardService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn dashboard(&self, ctx: &TenantContext, today: NaiveDate) -> Result<Dashboard, AppError> {
        let today_s = today.to_string();
        let in_30 = (today + Duration::days(30)).to_string();
        let (month_start, month_end) = month_bounds(today);
        let (ms, me) = (month_start.as_str(), month_end.as_str());

        self.db.with_conn(|conn| {
            let inventory = reports::inventory(conn, ctx)?;

            let health = HealthSummary {
                records_this_month: health_records::count_between(conn, ctx, None, ms, me)?,
                vaccines_due_30_days: health_records::vaccines_due(conn, ctx, &today_s, &in_30)?.len() as i64,
                treatments_this_month: health_records::count_between(conn, ctx, Some("treatment"), ms, me)?,
            };

            let females: HashSet<i64> = reports::active_female_ids(conn, ctx)?.into_iter().collect();
            let (pregnant, open) = diagnosis_counts(conn, ctx, &females)?;
            let reproduction = ReproductionSummary {
                pregnant,
                open,
                services_this_month: reproduction_records::count_events_between(conn, ctx, "service", ms, me)?,
                births_this_month: reproduction_records::count_events_between(conn, ctx, "birth", ms, me)?,
                births_due_30_days: reproduction_records::births_expected_between(conn, ctx, &today_s, &in_30)?
                    .len() as i64,
            };

            let milk_today = production_records::milk_liters_between(conn, ctx, &today_s, &today_s)?;
            let milk_this_month = production_records::milk_liters_between(conn, ctx, ms, me)?;
            let milkers = reports::active_milkers(conn, ctx)?;
            let production = ProductionSummary {
                milk_today: round2(milk_today),
                milk_this_month: round2(milk_this_month),
                average_per_cow: if milkers > 0 {
                    round2(milk_this_month / milkers as f64)
                } else {
                    0.0
                },
            };

            let month = Some((ms, me));
            let sales = transactions::total_amount(conn, ctx, SALE, month)?;
            let purchases = transactions::total_amount(conn, ctx, PURCHASE, month)?;
            let expenses = transactions::total_amount(conn, ctx, EXPENSE, month)?;
            let total_balance = transactions::total_amount(conn, ctx, SALE, None)?
                - transactions::total_amount(conn, ctx, PURCHASE, None)?
                - transactions::total_amount(conn, ctx, EXPENSE, None)?;
            let finance = FinanceSummary {
                sales_this_month: round2(sales),
                purchases_this_month: round2(purchases),
                expenses_this_month: round2(expenses),
                month_balance: round2(sales - purchases - expenses),
                total_balance: round2(total_balance),
            };

            Ok(Dashboard {
                inventory,
                health,
                reproduction,
                production,
                finance,
                updated_at: current_timestamp(),
            })
        })
    }

    /// Vaccines and births coming up in the next fortnight, soonest first
    pub fn alerts(&self, ctx: &TenantContext, today: NaiveDate) -> Result<AlertList, AppError> {
        let from = today.to_string();
        let to = (today + Duration::days(ALERT_WINDOW_DAYS)).to_string();

        let mut alerts = self.db.with_conn(|conn| {
            let vaccines = health_records::vaccines_due(conn, ctx, &from, &to)?;
            let births = reproduction_records::births_expected_between(conn, ctx, &from, &to)?;
            let ids: Vec<i64> = vaccines
                .iter()
                .map(|v| v.animal_id)
                .chain(births.iter().map(|b| b.animal_id))
                .collect();
            let herd = animals::get_animals_by_ids(conn, ctx, &ids)?;
            let live = |id: i64| herd.get(&id).filter(|a| !a.is_deleted());

            let mut alerts = Vec::new();
            for vaccine in &vaccines {
                let (Some(animal), Some(due)) = (live(vaccine.animal_id), vaccine.next_dose_on.as_deref()) else {
                    continue;
                };
                let days = days_until(today, due)?;
                alerts.push(alert(
                    AlertKind::Vaccine,
                    animal,
                    due,
                    days,
                    days <= VACCINE_URGENT_DAYS,
                    format!(
                        "Vaccine or booster due: {}",
                        vaccine.product.as_deref().unwrap_or("N/A")
                    ),
                ));
            }
            for birth in &births {
                let (Some(animal), Some(due)) = (live(birth.animal_id), birth.expected_birth_date.as_deref()) else {
                    continue;
                };
                let days = days_until(today, due)?;
                alerts.push(alert(
                    AlertKind::Birth,
                    animal,
                    due,
                    days,
                    days <= BIRTH_URGENT_DAYS,
                    format!("Birth expected in {} days", days),
                ));
            }
            Ok(alerts)
        })?;

        alerts.sort_by_key(|a| a.days_remaining);
        Ok(AlertList {
            total: alerts.len(),
            alerts,
        })
    }
}

fn days_until(today: NaiveDate, due: &str) -> Result<i64, AppError> {
    let due = parse_date(due).ok_or_else(|| AppError::Internal(format!("stored date '{}' is malformed", due)))?;
    Ok((due - today).num_days())
}

fn alert(kind: AlertKind, animal: &Animal, due: &str, days: i64, urgent: bool, message: String) -> Alert {
    Alert {
        kind,
        priority: if urgent { Priority::High } else { Priority::Medium },
        animal_id: animal.id,
        animal_tag: animal.tag_number.clone(),
        animal_name: animal.name.clone(),
        message,
        due_date: due.to_string(),
        days_remaining: days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::db::animals::{create_animal, fixtures::new_animal};
    use crate::db::models::{NewHealthRecord, NewReproductionRecord, NewTransaction};
    use crate::db::test_support::{add_user, db_with_tenant};
    use crate::services::health_service::HealthService;
    use crate::services::reproduction_service::ReproductionService;
    use crate::services::transaction_service::TransactionService;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 10).unwrap()
    }

    #[test]
    fn test_alerts_priorities_and_order() {
        let (db, ctx) = db_with_tenant();
        let (cow, heifer) = db
            .with_conn(|conn| {
                Ok((
                    create_animal(conn, &new_animal(&ctx, "VA-1", "female"))?,
                    create_animal(conn, &new_animal(&ctx, "NO-2", "female"))?,
                ))
            })
            .unwrap();
        let auth = add_user(&db, ctx, Role::Veterinarian);
        let health = HealthService::new(db.clone());
        let repro = ReproductionService::new(db.clone());

        let vaccine = |animal_id: i64, next: &str| -> NewHealthRecord {
            serde_json::from_value(json!({
                "animal_id": animal_id, "record_type": "vaccine", "date": "2024-07-01",
                "next_dose_on": next, "product": "Carbon"
            }))
            .unwrap()
        };
        health.create(&auth, vaccine(cow.id, "2024-08-12")).unwrap();
        health.create(&auth, vaccine(heifer.id, "2024-08-20")).unwrap();
        health.create(&auth, vaccine(heifer.id, "2024-09-30")).unwrap();

        let diagnosis: NewReproductionRecord = serde_json::from_value(json!({
            "animal_id": cow.id, "event_type": "diagnosis", "event_date": "2024-02-01",
            "diagnosis": "pregnant", "expected_birth_date": "2024-08-16"
        }))
        .unwrap();
        repro.create(&auth, diagnosis).unwrap();

        let list = DashboardService::new(db).alerts(&ctx, today()).unwrap();
        assert_eq!(list.total, 3);
        let summary: Vec<(AlertKind, Priority, i64)> =
            list.alerts.iter().map(|a| (a.kind, a.priority, a.days_remaining)).collect();
        assert_eq!(
            summary,
            vec![
                (AlertKind::Vaccine, Priority::High, 2),
                (AlertKind::Birth, Priority::High, 6),
                (AlertKind::Vaccine, Priority::Medium, 10),
            ]
        );
        assert_eq!(list.alerts[0].animal_tag, "VA-1");
    }

    #[test]
    fn test_dashboard_finance_and_inventory() {
        let (db, ctx) = db_with_tenant();
        let mut cow = new_animal(&ctx, "VA-1", "female");
        cow.category = Some("cow".into());
        let steer = new_animal(&ctx, "NO-1", "male");
        let (_cow, steer) = db
            .with_conn(|conn| Ok((create_animal(conn, &cow)?, create_animal(conn, &steer)?)))
            .unwrap();
        let auth = add_user(&db, ctx, Role::Owner);
        let money = TransactionService::new(db.clone());
        let txn = |kind: &str, date: &str, amount: f64, animal_id: Option<i64>| -> NewTransaction {
            serde_json::from_value(json!({
                "kind": kind, "date": date, "concept": "Lote", "amount": amount, "animal_id": animal_id
            }))
            .unwrap()
        };
        money.create(&auth, txn("sale", "2024-08-02", 2000.0, Some(steer.id))).unwrap();
        money.create(&auth, txn("expense", "2024-08-03", 150.0, None)).unwrap();
        money.create(&auth, txn("purchase", "2024-07-03", 400.0, None)).unwrap();

        let dash = DashboardService::new(db).dashboard(&ctx, today()).unwrap();
        assert_eq!(dash.inventory.total, 2);
        assert_eq!(dash.inventory.sold, 1);
        assert_eq!(dash.inventory.cows, 1);
        assert_eq!(dash.finance.sales_this_month, 2000.0);
        assert_eq!(dash.finance.purchases_this_month, 0.0);
        assert_eq!(dash.finance.month_balance, 1850.0);
        assert_eq!(dash.finance.total_balance, 1450.0);
        assert_eq!(dash.production.average_per_cow, 0.0);
    }
}
