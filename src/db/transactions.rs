//! Financial transaction operations (sales, purchases, expenses)

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde::Deserialize;

use super::context::TenantContext;
use super::diesel_schema::transactions;
use super::models::{status, NewTransaction, Transaction};
use super::{clamp_limit, default_limit, RecordPage};
use crate::error::AppError;

/// Query parameters for listing transactions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub animal_id: Option<i64>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

pub fn get_transaction(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: i64,
) -> Result<Option<Transaction>, AppError> {
    let row = transactions::table
        .filter(transactions::tenant_id.eq(ctx.tenant_id))
        .filter(transactions::id.eq(id))
        .select(Transaction::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn list_transactions(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    query: &TransactionQuery,
) -> Result<RecordPage<Transaction>, AppError> {
    let limit = clamp_limit(query.limit);
    let skip = query.skip.max(0);

    let build = || -> transactions::BoxedQuery<'static, Sqlite> {
        let mut q = transactions::table
            .filter(transactions::tenant_id.eq(ctx.tenant_id))
            .filter(transactions::status.ne(status::DELETED))
            .into_boxed();
        if let Some(ref kind) = query.kind {
            q = q.filter(transactions::kind.eq(kind.to_lowercase()));
        }
        if let Some(animal_id) = query.animal_id {
            q = q.filter(transactions::animal_id.eq(animal_id));
        }
        if let Some(ref from) = query.date_from {
            q = q.filter(transactions::date.ge(from.clone()));
        }
        if let Some(ref to) = query.date_to {
            q = q.filter(transactions::date.le(to.clone()));
        }
        q
    };

    let total: i64 = build().count().get_result(conn)?;
    let items = build()
        .order((transactions::date.desc(), transactions::id.desc()))
        .limit(limit)
        .offset(skip)
        .select(Transaction::as_select())
        .load(conn)?;

    Ok(RecordPage { total, items, skip, limit })
}

/// Sum of amounts of one kind, optionally bounded to `[from, to]`
pub fn total_amount(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    kind: &str,
    range: Option<(&str, &str)>,
) -> Result<f64, AppError> {
    let mut q = transactions::table
        .filter(transactions::tenant_id.eq(ctx.tenant_id))
        .filter(transactions::status.ne(status::DELETED))
        .filter(transactions::kind.eq(kind))
        .into_boxed();
    if let Some((from, to)) = range {
        q = q
            .filter(transactions::date.ge(from))
            .filter(transactions::date.le(to));
    }
    let total: Option<f64> = q
        .select(diesel::dsl::sum(transactions::amount))
        .first(conn)?;
    Ok(total.unwrap_or(0.0))
}

/// Expense totals grouped by category (uncategorised rows under `None`)
pub fn expenses_by_category(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
) -> Result<Vec<(Option<String>, f64)>, AppError> {
    let rows: Vec<(Option<String>, Option<f64>)> = transactions::table
        .filter(transactions::tenant_id.eq(ctx.tenant_id))
        .filter(transactions::status.ne(status::DELETED))
        .filter(transactions::kind.eq("expense"))
        .group_by(transactions::expense_category)
        .select((
            transactions::expense_category,
            diesel::dsl::sum(transactions::amount),
        ))
        .load(conn)?;
    Ok(rows
        .into_iter()
        .map(|(category, total)| (category, total.unwrap_or(0.0)))
        .collect())
}

pub fn changed_since(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
) -> Result<Vec<Transaction>, AppError> {
    let rows = transactions::table
        .filter(transactions::tenant_id.eq(ctx.tenant_id))
        .filter(transactions::updated_at.gt(since))
        .filter(
            transactions::last_modified_device
                .is_null()
                .or(transactions::last_modified_device.ne(device_id)),
        )
        .order(transactions::updated_at.asc())
        .select(Transaction::as_select())
        .load(conn)?;
    Ok(rows)
}

pub fn create_transaction(
    conn: &mut SqliteConnection,
    input: &NewTransaction,
) -> Result<Transaction, AppError> {
    let row = diesel::insert_into(transactions::table)
        .values(input)
        .returning(Transaction::as_returning())
        .get_result(conn)?;
    Ok(row)
}

pub fn insert_transaction(conn: &mut SqliteConnection, row: &Transaction) -> Result<(), AppError> {
    diesel::insert_into(transactions::table).values(row).execute(conn)?;
    Ok(())
}

pub fn compare_and_swap(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: &Transaction,
    expected_version: i64,
) -> Result<bool, AppError> {
    let updated = diesel::update(
        transactions::table
            .filter(transactions::tenant_id.eq(ctx.tenant_id))
            .filter(transactions::id.eq(row.id))
            .filter(transactions::sync_version.eq(expected_version)),
    )
    .set(row)
    .execute(conn)?;
    Ok(updated == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::current_timestamp;
    use crate::db::test_support::db_with_tenant;

    fn tx(ctx: &TenantContext, kind: &str, date: &str, amount: f64, category: Option<&str>) -> NewTransaction {
        let now = current_timestamp();
        NewTransaction {
            tenant_id: ctx.tenant_id,
            kind: kind.into(),
            date: date.into(),
            concept: format!("{} {}", kind, date),
            amount,
            animal_id: None,
            animal_count: None,
            total_weight: None,
            price_per_kg: None,
            counterparty: None,
            counterparty_document: None,
            payment_method: None,
            expense_category: category.map(String::from),
            notes: None,
            recorded_by: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_totals_and_categories() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            create_transaction(conn, &tx(&ctx, "sale", "2024-04-02", 3_000_000.0, None))?;
            create_transaction(conn, &tx(&ctx, "expense", "2024-04-05", 200_000.0, Some("feed")))?;
            create_transaction(conn, &tx(&ctx, "expense", "2024-03-05", 50_000.0, Some("feed")))?;
            create_transaction(conn, &tx(&ctx, "expense", "2024-04-09", 80_000.0, None))?;

            assert_eq!(total_amount(conn, &ctx, "sale", None)?, 3_000_000.0);
            assert_eq!(total_amount(conn, &ctx, "expense", Some(("2024-04-01", "2024-04-30")))?, 280_000.0);
            assert_eq!(total_amount(conn, &ctx, "purchase", None)?, 0.0);

            let categories = expenses_by_category(conn, &ctx)?;
            let feed = categories
                .iter()
                .find(|(c, _)| c.as_deref() == Some("feed"))
                .map(|(_, total)| *total);
            assert_eq!(feed, Some(250_000.0));
            Ok(())
        })
        .unwrap();
    }
}
