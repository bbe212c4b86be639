//! Category persistence

use chrono::Utc;
use pron_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{Category, CategoryCreate, CategoryUpdate};

const SELECT_CATEGORY: &str = r#"
    SELECT c.id, c.name, c.description, c.created_at, c.updated_at,
           (SELECT COUNT(*) FROM dialogs d WHERE d.category_id = c.id) AS dialog_count
    FROM categories c
"#;

/// What a cascading category delete removed
#[derive(Debug, Clone, Default)]
pub struct CategoryDeletion {
    pub name: String,
    pub dialog_count: i64,
    /// Audio blobs of the assessments removed by the cascade
    pub audio_locators: Vec<String>,
}

fn category_from_row(row: &SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        dialog_count: row.get("dialog_count"),
    }
}

/// All categories ordered by name, each with its dialog count
pub async fn list_categories(pool: &SqlitePool) -> Result<Vec<Category>> {
    let rows = sqlx::query(&format!("{} ORDER BY c.name", SELECT_CATEGORY))
        .fetch_all(pool)
        .await?;

    Ok(rows.iter().map(category_from_row).collect())
}

pub async fn get_category(pool: &SqlitePool, id: i64) -> Result<Option<Category>> {
    let row = sqlx::query(&format!("{} WHERE c.id = ?", SELECT_CATEGORY))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(category_from_row))
}

/// Insert a category; a duplicate name surfaces as a unique violation
pub async fn create_category(pool: &SqlitePool, create: &CategoryCreate) -> Result<Category> {
    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO categories (name, description, created_at, updated_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&create.name)
    .bind(&create.description)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(Category {
        id,
        name: create.name.clone(),
        description: create.description.clone(),
        created_at: now,
        updated_at: Some(now),
        dialog_count: 0,
    })
}

/// Apply the provided fields; `Ok(None)` when the category does not exist
pub async fn update_category(
    pool: &SqlitePool,
    id: i64,
    update: &CategoryUpdate,
) -> Result<Option<Category>> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query("SELECT name, description FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(existing) = existing else {
        return Ok(None);
    };

    let name: String = update
        .name
        .clone()
        .unwrap_or_else(|| existing.get("name"));
    let description: Option<String> = match &update.description {
        Some(value) => value.clone(),
        None => existing.get("description"),
    };

    sqlx::query("UPDATE categories SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&name)
        .bind(&description)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    get_category(pool, id).await
}

/// Delete a category and, through the foreign keys, its dialogs, phrases and assessments
pub async fn delete_category(pool: &SqlitePool, id: i64) -> Result<Option<CategoryDeletion>> {
    let mut tx = pool.begin().await?;

    let name: Option<String> = sqlx::query_scalar("SELECT name FROM categories WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(name) = name else {
        return Ok(None);
    };

    let dialog_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dialogs WHERE category_id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    let audio_locators: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT a.audio_locator
        FROM assessments a
        JOIN phrases p ON a.phrase_id = p.id
        JOIN dialogs d ON p.dialog_id = d.id
        WHERE d.category_id = ?
        "#,
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(CategoryDeletion {
        name,
        dialog_count,
        audio_locators,
    }))
}
