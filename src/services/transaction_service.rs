//! Farm finances: sales, purchases and expenses
//!
//! Sales and purchases linked to an animal move that animal's status. A sale
//! marks it sold (undone when the sale is deleted), a purchase marks it active.

use chrono::{Datelike, NaiveDate};
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use super::animal_service::{insert_new_animal, live_animal};
use crate::auth::AuthUser;
use crate::db::models::{current_timestamp, status, Animal, NewAnimal, NewTransaction, Transaction};
use crate::db::transactions::{self, TransactionQuery};
use crate::db::{animals, Database, RecordPage, TenantContext};
use crate::error::AppError;
use crate::sync::{apply_patch, soft_delete, update_versioned, SyncRecord};
use crate::validation::Validate;
use crate::views::TransactionView;

pub const SALE: &str = "sale";
pub const PURCHASE: &str = "purchase";
pub const EXPENSE: &str = "expense";

/// Animal bought together with its purchase transaction
#[derive(Debug, Clone, Deserialize)]
pub struct PurchasedAnimal {
    pub tag_number: String,
    #[serde(default)]
    pub name: Option<String>,
    pub sex: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub current_weight: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub origin_farm: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseDetails {
    pub date: String,
    pub amount: f64,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub counterparty_document: Option<String>,
    #[serde(default)]
    pub total_weight: Option<f64>,
    #[serde(default)]
    pub price_per_kg: Option<f64>,
    #[serde(default)]
    pub animal_count: Option<i32>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseAnimalRequest {
    pub animal: PurchasedAnimal,
    pub transaction: PurchaseDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseAnimalResponse {
    pub animal_id: i64,
    pub tag_number: String,
    pub transaction_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub total_sales: f64,
    pub total_purchases: f64,
    pub total_expenses: f64,
    /// sales - purchases - expenses
    pub net_balance: f64,
    pub month_sales: f64,
    pub month_expenses: f64,
    pub expenses_by_category: Vec<CategoryTotal>,
}

fn transaction_not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Transaction {} not found", id))
}

/// First and last day of the month containing `day`
pub(crate) fn month_bounds(day: NaiveDate) -> (String, String) {
    let first = day.with_day(1).unwrap_or(day);
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month.and_then(|d| d.pred_opt()).unwrap_or(day);
    (first.to_string(), last.to_string())
}

fn decorate(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    rows: Vec<Transaction>,
) -> Result<Vec<TransactionView>, AppError> {
    let ids: Vec<i64> = rows.iter().filter_map(|t| t.animal_id).collect();
    let animals = animals::get_animals_by_ids(conn, ctx, &ids)?;
    Ok(rows
        .into_iter()
        .map(|t| TransactionView::new(t, &animals))
        .collect())
}

fn view_one(conn: &mut SqliteConnection, ctx: &TenantContext, row: Transaction) -> Result<TransactionView, AppError> {
    decorate(conn, ctx, vec![row])?
        .pop()
        .ok_or_else(|| AppError::Internal("transaction view lost".into()))
}

/// Move the linked animal's status to match a sale or purchase
fn apply_to_animal(conn: &mut SqliteConnection, ctx: &TenantContext, txn: &Transaction) -> Result<(), AppError> {
    let Some(animal_id) = txn.animal_id else {
        return Ok(());
    };
    if txn.kind != SALE && txn.kind != PURCHASE {
        return Ok(());
    }
    update_versioned(conn, ctx, animal_id, |_, current: &Animal| {
        if current.is_deleted() {
            return Err(AppError::NotFound(format!("Animal {} not found", animal_id)));
        }
        let mut next = current.clone();
        if txn.kind == SALE {
            next.status = status::SOLD.to_string();
            next.exit_date = Some(txn.date.clone());
            next.exit_reason = Some(format!("Sale - {}", txn.concept));
        } else {
            next.status = status::ACTIVE.to_string();
        }
        Ok(next)
    })?;
    Ok(())
}

/// Undo a sale: the animal goes back to the herd
fn restore_sold_animal(conn: &mut SqliteConnection, ctx: &TenantContext, animal_id: i64) -> Result<(), AppError> {
    match animals::get_animal(conn, ctx, animal_id)? {
        Some(animal) if animal.status == status::SOLD => {
            update_versioned(conn, ctx, animal_id, |_, current: &Animal| {
                let mut next = current.clone();
                next.status = status::ACTIVE.to_string();
                next.exit_date = None;
                next.exit_reason = None;
                Ok(next)
            })?;
            Ok(())
        }
        _ => Ok(()),
    }
}

pub struct TransactionService {
    db: Database,
}

impl TransactionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn list(&self, ctx: &TenantContext, query: &TransactionQuery) -> Result<RecordPage<TransactionView>, AppError> {
        self.db.with_conn(|conn| {
            let page = transactions::list_transactions(conn, ctx, query)?;
            let items = decorate(conn, ctx, page.items)?;
            Ok(RecordPage {
                total: page.total,
                items,
                skip: page.skip,
                limit: page.limit,
            })
        })
    }

    pub fn get(&self, ctx: &TenantContext, id: i64) -> Result<TransactionView, AppError> {
        self.db.with_conn(|conn| {
            let row = transactions::get_transaction(conn, ctx, id)?
                .filter(|t| t.status != status::DELETED)
                .ok_or_else(|| transaction_not_found(id))?;
            view_one(conn, ctx, row)
        })
    }

    pub fn create(&self, auth: &AuthUser, mut input: NewTransaction) -> Result<TransactionView, AppError> {
        let ctx = auth.tenant;
        input.tenant_id = ctx.tenant_id;
        input.kind = input.kind.to_lowercase();
        input.validate()?;
        input.recorded_by = Some(auth.user_id);
        let now = current_timestamp();
        input.created_at = now.clone();
        input.updated_at = now;

        let view = self.db.transaction(|conn| {
            if let Some(animal_id) = input.animal_id {
                live_animal(conn, &ctx, animal_id)?;
            }
            let row = transactions::create_transaction(conn, &input)?;
            apply_to_animal(conn, &ctx, &row)?;
            view_one(conn, &ctx, row)
        })?;
        info!(
            tenant = ctx.tenant_id,
            id = view.transaction.id,
            kind = %view.transaction.kind,
            amount = view.transaction.amount,
            "Transaction recorded"
        );
        Ok(view)
    }

    pub fn update(&self, ctx: &TenantContext, id: i64, patch: &Map<String, Value>) -> Result<TransactionView, AppError> {
        self.db.transaction(|conn| {
            let mut previous: Option<Transaction> = None;
            let row = update_versioned(conn, ctx, id, |conn, current: &Transaction| {
                if current.is_deleted() {
                    return Err(transaction_not_found(id));
                }
                previous = Some(current.clone());
                let mut next = apply_patch(current, patch)?;
                next.kind = next.kind.to_lowercase();
                next.validate()?;
                next.check_relations(conn, ctx)?;
                Ok(next)
            })?;

            // A sale that no longer points at the same animal releases it
            if let Some(prev) = previous {
                if prev.kind == SALE && (row.kind != SALE || row.animal_id != prev.animal_id) {
                    if let Some(animal_id) = prev.animal_id {
                        restore_sold_animal(conn, ctx, animal_id)?;
                    }
                }
            }
            apply_to_animal(conn, ctx, &row)?;
            view_one(conn, ctx, row)
        })
    }

    pub fn delete(&self, ctx: &TenantContext, id: i64) -> Result<(), AppError> {
        self.db
            .transaction(|conn| {
                let row = soft_delete::<Transaction>(conn, ctx, id)?;
                if row.kind == SALE {
                    if let Some(animal_id) = row.animal_id {
                        restore_sold_animal(conn, ctx, animal_id)?;
                    }
                }
                Ok(())
            })
            .map_err(|e| match e {
                AppError::NotFound(_) => transaction_not_found(id),
                other => other,
            })?;
        info!(tenant = ctx.tenant_id, id, "Transaction deleted");
        Ok(())
    }

    /// Register a bought animal and its purchase in one transaction
    pub fn purchase_animal(
        &self,
        auth: &AuthUser,
        request: PurchaseAnimalRequest,
    ) -> Result<PurchaseAnimalResponse, AppError> {
        let ctx = auth.tenant;
        let PurchaseAnimalRequest { animal, transaction } = request;
        let now = current_timestamp();

        let new_animal = NewAnimal {
            tenant_id: ctx.tenant_id,
            tag_number: animal.tag_number,
            name: animal.name,
            sex: animal.sex.to_lowercase(),
            birth_date: animal.birth_date,
            breed: animal.breed,
            color: animal.color,
            mother_id: None,
            father_id: None,
            birth_weight: None,
            current_weight: animal.current_weight,
            last_weighed_on: None,
            acquisition_type: Some(PURCHASE.to_string()),
            entry_date: transaction.date.clone(),
            origin_farm: animal.origin_farm,
            category: animal.category,
            purpose: animal.purpose,
            current_lot: None,
            current_paddock: None,
            registry_number: None,
            notes: animal.notes,
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        let (animal, txn) = self.db.transaction(|conn| {
            let animal = insert_new_animal(conn, &ctx, new_animal)?;
            let input = NewTransaction {
                tenant_id: ctx.tenant_id,
                kind: PURCHASE.to_string(),
                date: transaction.date.clone(),
                concept: format!("Purchase - {}", animal.tag_number),
                amount: transaction.amount,
                animal_id: Some(animal.id),
                animal_count: Some(transaction.animal_count.unwrap_or(1)),
                total_weight: transaction.total_weight,
                price_per_kg: transaction.price_per_kg,
                counterparty: transaction.counterparty.clone(),
                counterparty_document: transaction.counterparty_document.clone(),
                payment_method: transaction.payment_method.clone(),
                expense_category: None,
                notes: transaction.notes.clone(),
                recorded_by: Some(auth.user_id),
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            input.validate()?;
            let txn = transactions::create_transaction(conn, &input)?;
            Ok((animal, txn))
        })?;

        info!(
            tenant = ctx.tenant_id,
            animal = animal.id,
            transaction = txn.id,
            "Purchased animal registered"
        );
        Ok(PurchaseAnimalResponse {
            animal_id: animal.id,
            message: format!("Animal {} purchased and registered", animal.tag_number),
            tag_number: animal.tag_number,
            transaction_id: txn.id,
        })
    }

    pub fn summary(&self, ctx: &TenantContext, today: NaiveDate) -> Result<TransactionSummary, AppError> {
        let (month_start, month_end) = month_bounds(today);
        let month = Some((month_start.as_str(), month_end.as_str()));

        self.db.with_conn(|conn| {
            let total_sales = transactions::total_amount(conn, ctx, SALE, None)?;
            let total_purchases = transactions::total_amount(conn, ctx, PURCHASE, None)?;
            let total_expenses = transactions::total_amount(conn, ctx, EXPENSE, None)?;
            let month_sales = transactions::total_amount(conn, ctx, SALE, month)?;
            let month_expenses = transactions::total_amount(conn, ctx, EXPENSE, month)?;

            let mut expenses_by_category: Vec<CategoryTotal> = transactions::expenses_by_category(conn, ctx)?
                .into_iter()
                .map(|(category, total)| CategoryTotal {
                    category: category.unwrap_or_else(|| "uncategorized".to_string()),
                    total,
                })
                .collect();
            expenses_by_category.sort_by(|a, b| b.total.total_cmp(&a.total));

            Ok(TransactionSummary {
                total_sales,
                total_purchases,
                total_expenses,
                net_balance: total_sales - total_purchases - total_expenses,
                month_sales,
                month_expenses,
                expenses_by_category,
            })
        })
    }
}
