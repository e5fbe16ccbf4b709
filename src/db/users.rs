//! User account operations

use diesel::prelude::*;

use super::diesel_schema::users;
use super::models::{current_timestamp, NewUser, User};
use crate::error::AppError;

pub fn create_user(conn: &mut SqliteConnection, input: &NewUser<'_>) -> Result<User, AppError> {
    let row = diesel::insert_into(users::table)
        .values(input)
        .returning(User::as_returning())
        .get_result(conn)?;
    Ok(row)
}

/// Look up a user by id. Not tenant-scoped: token subjects are global ids.
pub fn get_user(conn: &mut SqliteConnection, id: i64) -> Result<Option<User>, AppError> {
    let row = users::table
        .filter(users::id.eq(id))
        .select(User::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn find_by_email(conn: &mut SqliteConnection, email: &str) -> Result<Option<User>, AppError> {
    let row = users::table
        .filter(users::email.eq(email))
        .select(User::as_select())
        .first(conn)
        .optional()?;
    Ok(row)
}

pub fn email_exists(conn: &mut SqliteConnection, email: &str) -> Result<bool, AppError> {
    let count: i64 = users::table
        .filter(users::email.eq(email))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn document_exists(conn: &mut SqliteConnection, document: &str) -> Result<bool, AppError> {
    let count: i64 = users::table
        .filter(users::document.eq(document))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn touch_last_login(conn: &mut SqliteConnection, id: i64) -> Result<(), AppError> {
    diesel::update(users::table.filter(users::id.eq(id)))
        .set(users::last_login_at.eq(current_timestamp()))
        .execute(conn)?;
    Ok(())
}

pub fn set_password_hash(conn: &mut SqliteConnection, id: i64, hash: &str) -> Result<(), AppError> {
    let now = current_timestamp();
    diesel::update(users::table.filter(users::id.eq(id)))
        .set((users::password_hash.eq(hash), users::updated_at.eq(&now)))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::db_with_tenant;

    #[test]
    fn test_create_and_find() {
        let (db, ctx) = db_with_tenant();
        db.with_conn(|conn| {
            let now = current_timestamp();
            let user = create_user(
                conn,
                &NewUser {
                    tenant_id: ctx.tenant_id,
                    full_name: "Ana Gómez",
                    email: "ana@example.com",
                    phone: None,
                    document: Some("1037"),
                    password_hash: "hash",
                    role: "owner",
                    created_at: &now,
                    updated_at: &now,
                },
            )?;
            assert!(user.active);
            assert!(email_exists(conn, "ana@example.com")?);
            assert!(document_exists(conn, "1037")?);
            assert!(!email_exists(conn, "nobody@example.com")?);

            touch_last_login(conn, user.id)?;
            let found = find_by_email(conn, "ana@example.com")?.unwrap();
            assert!(found.last_login_at.is_some());
            Ok(())
        })
        .unwrap();
    }
}
