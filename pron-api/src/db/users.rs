//! User directory
//!
//! Users are keyed by the client-supplied external id. Lookups are read-only;
//! creation only happens inside the assessment transaction.

use chrono::Utc;
use pron_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::models::User;

const SELECT_USER: &str =
    "SELECT id, external_id, email, full_name, is_active, created_at FROM users";

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        user_id: row.get("external_id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    }
}

pub async fn find_by_external_id(pool: &SqlitePool, external_id: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE external_id = ?", SELECT_USER))
        .bind(external_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(user_from_row))
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_USER))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(user_from_row))
}

/// Return the internal id for `external_id`, inserting the user if absent
///
/// Runs on the caller's connection so it joins the caller's transaction.
/// Concurrent first submissions for the same id converge on one row.
pub async fn find_or_create(conn: &mut SqliteConnection, external_id: &str) -> Result<i64> {
    sqlx::query(
        r#"
        INSERT INTO users (external_id, is_active, created_at)
        VALUES (?, 1, ?)
        ON CONFLICT(external_id) DO NOTHING
        "#,
    )
    .bind(external_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE external_id = ?")
        .bind(external_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}
