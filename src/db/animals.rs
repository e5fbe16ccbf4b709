//! Animal registry operations using Diesel with tenant scoping
//!
//! All operations require a TenantContext for isolation. Soft-deleted
//! animals (status `deleted`) stay in the table so pedigree and sale
//! history keep resolving; listings hide them unless asked for.

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::context::TenantContext;
use super::diesel_schema::animals;
use super::like_pattern;
use super::models::{status, Animal, NewAnimal};
use crate::error::AppError;

// ============================================================================
// Query Types
// ============================================================================

/// Query parameters for listing animals
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnimalQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

/// One page of animals
#[derive(Debug, Clone, Serialize)]
pub struct AnimalPage {
    pub items: Vec<Animal>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub pages: i64,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_animal(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    id: i64,
) -> Result<Option<Animal>, AppError> {
    let row = animals::table
        .filter(animals::tenant_id.eq(ctx.tenant_id))
        .filter(animals::id.eq(id))
        .select(Animal::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

/// Fetch several animals at once, keyed by id
pub fn get_animals_by_ids(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    ids: &[i64],
) -> Result<HashMap<i64, Animal>, AppError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = animals::table
        .filter(animals::tenant_id.eq(ctx.tenant_id))
        .filter(animals::id.eq_any(ids))
        .select(Animal::as_select())
        .load(conn)?;
    Ok(rows.into_iter().map(|a| (a.id, a)).collect())
}

pub fn list_animals(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    query: &AnimalQuery,
) -> Result<AnimalPage, AppError> {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, super::MAX_LIMIT);

    let build = || -> animals::BoxedQuery<'static, Sqlite> {
        let mut q = animals::table
            .filter(animals::tenant_id.eq(ctx.tenant_id))
            .into_boxed();

        match &query.status {
            Some(s) => q = q.filter(animals::status.eq(s.clone())),
            None => q = q.filter(animals::status.ne(status::DELETED)),
        }
        if let Some(ref sex) = query.sex {
            q = q.filter(animals::sex.eq(sex.clone()));
        }
        if let Some(ref category) = query.category {
            q = q.filter(animals::category.eq(category.clone()));
        }
        if let Some(ref search) = query.search {
            let pattern = like_pattern(search.trim());
            q = q.filter(
                animals::tag_number
                    .like(pattern.clone())
                    .escape('\\')
                    .or(animals::name.like(pattern).escape('\\')),
            );
        }
        q
    };

    let total: i64 = build().count().get_result(conn)?;
    let items = build()
        .order((animals::created_at.desc(), animals::id.desc()))
        .limit(page_size)
        .offset(page.saturating_sub(1).saturating_mul(page_size))
        .select(Animal::as_select())
        .load(conn)?;

    Ok(AnimalPage {
        items,
        total,
        page,
        page_size,
        pages: (total + page_size - 1) / page_size,
    })
}

/// Check whether a tag number is taken, optionally ignoring one animal
pub fn tag_exists(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    tag_number: &str,
    exclude_id: Option<i64>,
) -> Result<bool, AppError> {
    let mut q = animals::table
        .filter(animals::tenant_id.eq(ctx.tenant_id))
        .filter(animals::tag_number.eq(tag_number))
        .into_boxed();
    if let Some(id) = exclude_id {
        q = q.filter(animals::id.ne(id));
    }
    let count: i64 = q.count().get_result(conn)?;
    Ok(count > 0)
}

/// Animals modified after `since` by anyone other than `device_id`
pub fn changed_since(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    since: &str,
    device_id: &str,
) -> Result<Vec<Animal>, AppError> {
    let rows = animals::table
        .filter(animals::tenant_id.eq(ctx.tenant_id))
        .filter(animals::updated_at.gt(since))
        .filter(
            animals::last_modified_device
                .is_null()
                .or(animals::last_modified_device.ne(device_id)),
        )
        .order(animals::updated_at.asc())
        .select(Animal::as_select())
        .load(conn)?;
    Ok(rows)
}

// ============================================================================
// Write Operations
// ============================================================================

pub fn create_animal(conn: &mut SqliteConnection, input: &NewAnimal) -> Result<Animal, AppError> {
    let row = diesel::insert_into(animals::table)
        .values(input)
        .returning(Animal::as_returning())
        .get_result(conn)?;
    Ok(row)
}

/// Insert a fully formed row, keeping its id (offline-created animals)
pub fn insert_animal(conn: &mut SqliteConnection, row: &Animal) -> Result<(), AppError> {
    diesel::insert_into(animals::table).values(row).execute(conn)?;
    Ok(())
}

/// Write `row` only if the stored version still equals `expected_version`
pub fn compare_and_swap(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    row: &Animal,
    expected_version: i64,
) -> Result<bool, AppError> {
    let updated = diesel::update(
        animals::table
            .filter(animals::tenant_id.eq(ctx.tenant_id))
            .filter(animals::id.eq(row.id))
            .filter(animals::sync_version.eq(expected_version)),
    )
    .set(row)
    .execute(conn)?;
    Ok(updated == 1)
}


#[cfg(test)]
mod tests {
    use super::fixtures::new_animal;
    use super::*;
    use crate::db::test_support::db_with_tenant;

    #[test]
    fn test_create_get_and_scope() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let animal = create_animal(conn, &new_animal(&ctx, "CO-001", "female"))?;
            assert_eq!(animal.status, status::ACTIVE);
            assert_eq!(animal.sync_version, 1);

            assert!(get_animal(conn, &ctx, animal.id)?.is_some());
            let other = TenantContext::new(ctx.tenant_id + 1);
            assert!(get_animal(conn, &other, animal.id)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_tag_unique_per_tenant() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let animal = create_animal(conn, &new_animal(&ctx, "CO-001", "female"))?;
            assert!(tag_exists(conn, &ctx, "CO-001", None)?);
            assert!(!tag_exists(conn, &ctx, "CO-001", Some(animal.id))?);
            assert!(create_animal(conn, &new_animal(&ctx, "CO-001", "male")).is_err());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_filters_and_hides_deleted() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let mut lola = new_animal(&ctx, "CO-001", "female");
            lola.name = Some("Lola".into());
            create_animal(conn, &lola)?;
            create_animal(conn, &new_animal(&ctx, "TO-002", "male"))?;
            let gone = create_animal(conn, &new_animal(&ctx, "CO-003", "female"))?;

            let mut deleted = gone.clone();
            deleted.status = status::DELETED.into();
            deleted.sync_version = 2;
            assert!(compare_and_swap(conn, &ctx, &deleted, 1)?);

            let page = list_animals(conn, &ctx, &AnimalQuery { page: 1, page_size: 50, ..Default::default() })?;
            assert_eq!(page.total, 2);

            let page = list_animals(
                conn,
                &ctx,
                &AnimalQuery { search: Some("lol".into()), page: 1, page_size: 50, ..Default::default() },
            )?;
            assert_eq!(page.total, 1);
            assert_eq!(page.items[0].tag_number, "CO-001");

            let page = list_animals(
                conn,
                &ctx,
                &AnimalQuery { sex: Some("male".into()), page: 1, page_size: 50, ..Default::default() },
            )?;
            assert_eq!(page.total, 1);

            let page = list_animals(
                conn,
                &ctx,
                &AnimalQuery { status: Some("deleted".into()), page: 1, page_size: 50, ..Default::default() },
            )?;
            assert_eq!(page.total, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_pagination() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            for i in 0..5 {
                create_animal(conn, &new_animal(&ctx, &format!("A-{}", i), "female"))?;
            }
            let page = list_animals(conn, &ctx, &AnimalQuery { page: 2, page_size: 2, ..Default::default() })?;
            assert_eq!(page.total, 5);
            assert_eq!(page.pages, 3);
            assert_eq!(page.items.len(), 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_huge_page_is_empty() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            create_animal(conn, &new_animal(&ctx, "A-1", "female"))?;
            let page = list_animals(conn, &ctx, &AnimalQuery { page: i64::MAX, page_size: 100, ..Default::default() })?;
            assert_eq!(page.total, 1);
            assert!(page.items.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
