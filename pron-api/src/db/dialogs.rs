//! Dialog persistence
//!
//! Dialogs are always returned with their category name and their phrases,
//! ordered by `"order"` then id.

use chrono::Utc;
use pron_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use crate::models::{Dialog, DialogCreate, DialogUpdate, Phrase};

const SELECT_DIALOG: &str = r#"
    SELECT d.id, d.title, d.description, d.difficulty_level, d.category_id,
           d.created_at, d.updated_at, c.name AS category_name,
           (SELECT COUNT(*) FROM phrases p WHERE p.dialog_id = d.id) AS phrase_count
    FROM dialogs d
    JOIN categories c ON c.id = d.category_id
"#;

/// Optional list filter; `category_id` takes precedence over `category_name`
#[derive(Debug, Clone, Default)]
pub struct DialogFilter {
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
}

/// What a cascading dialog delete removed
#[derive(Debug, Clone, Default)]
pub struct DialogDeletion {
    pub title: String,
    pub audio_locators: Vec<String>,
}

fn dialog_from_row(row: &SqliteRow) -> Dialog {
    Dialog {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        difficulty_level: row.get("difficulty_level"),
        category_id: row.get("category_id"),
        category_name: row.get("category_name"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        phrase_count: row.get("phrase_count"),
        phrases: Vec::new(),
    }
}

/// Load phrases for all given dialogs in one query and attach them
async fn attach_phrases(pool: &SqlitePool, dialogs: &mut [Dialog]) -> Result<()> {
    if dialogs.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"SELECT id, dialog_id, reference_text, "order", phonetic_transcription, difficulty
           FROM phrases WHERE dialog_id IN ("#,
    );
    let mut separated = builder.separated(", ");
    for dialog in dialogs.iter() {
        separated.push_bind(dialog.id);
    }
    separated.push_unseparated(r#") ORDER BY dialog_id, "order", id"#);

    let phrases: Vec<Phrase> = builder.build_query_as().fetch_all(pool).await?;

    let mut by_dialog: HashMap<i64, Vec<Phrase>> = HashMap::new();
    for phrase in phrases {
        by_dialog.entry(phrase.dialog_id).or_default().push(phrase);
    }
    for dialog in dialogs.iter_mut() {
        dialog.phrases = by_dialog.remove(&dialog.id).unwrap_or_default();
    }

    Ok(())
}

pub async fn list_dialogs(pool: &SqlitePool, filter: &DialogFilter) -> Result<Vec<Dialog>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_DIALOG);
    builder.push(" WHERE 1 = 1");
    if let Some(category_id) = filter.category_id {
        builder.push(" AND d.category_id = ").push_bind(category_id);
    } else if let Some(name) = &filter.category_name {
        builder.push(" AND c.name = ").push_bind(name.clone());
    }
    builder.push(" ORDER BY d.id");

    let rows = builder.build().fetch_all(pool).await?;
    let mut dialogs: Vec<Dialog> = rows.iter().map(dialog_from_row).collect();
    attach_phrases(pool, &mut dialogs).await?;

    Ok(dialogs)
}

pub async fn get_dialog(pool: &SqlitePool, id: i64) -> Result<Option<Dialog>> {
    let row = sqlx::query(&format!("{} WHERE d.id = ?", SELECT_DIALOG))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut dialogs = vec![dialog_from_row(&row)];
    attach_phrases(pool, &mut dialogs).await?;
    Ok(dialogs.pop())
}

async fn category_exists(conn: &mut sqlx::SqliteConnection, category_id: i64) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_optional(conn)
        .await?;
    Ok(found.is_some())
}

/// Insert a dialog under an existing category
pub async fn create_dialog(pool: &SqlitePool, create: &DialogCreate) -> Result<Dialog> {
    let mut tx = pool.begin().await?;

    if !category_exists(&mut *tx, create.category_id).await? {
        return Err(Error::NotFound(format!(
            "Category {} not found",
            create.category_id
        )));
    }

    let now = Utc::now();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO dialogs (title, description, difficulty_level, category_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&create.title)
    .bind(&create.description)
    .bind(&create.difficulty_level)
    .bind(create.category_id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    get_dialog(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Dialog {} vanished after insert", id)))
}

/// Apply the provided fields; `Ok(None)` when the dialog does not exist
pub async fn update_dialog(
    pool: &SqlitePool,
    id: i64,
    update: &DialogUpdate,
) -> Result<Option<Dialog>> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query(
        "SELECT title, description, difficulty_level, category_id FROM dialogs WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(existing) = existing else {
        return Ok(None);
    };

    if let Some(category_id) = update.category_id {
        if !category_exists(&mut *tx, category_id).await? {
            return Err(Error::NotFound(format!("Category {} not found", category_id)));
        }
    }

    let title: String = update.title.clone().unwrap_or_else(|| existing.get("title"));
    let description: Option<String> = match &update.description {
        Some(value) => value.clone(),
        None => existing.get("description"),
    };
    let difficulty_level: String = update
        .difficulty_level
        .clone()
        .unwrap_or_else(|| existing.get("difficulty_level"));
    let category_id: i64 = update
        .category_id
        .unwrap_or_else(|| existing.get("category_id"));

    sqlx::query(
        r#"
        UPDATE dialogs
        SET title = ?, description = ?, difficulty_level = ?, category_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(&difficulty_level)
    .bind(category_id)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_dialog(pool, id).await
}

/// Delete a dialog with its phrases and their assessments
pub async fn delete_dialog(pool: &SqlitePool, id: i64) -> Result<Option<DialogDeletion>> {
    let mut tx = pool.begin().await?;

    let title: Option<String> = sqlx::query_scalar("SELECT title FROM dialogs WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(title) = title else {
        return Ok(None);
    };

    let audio_locators: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT a.audio_locator
        FROM assessments a
        JOIN phrases p ON a.phrase_id = p.id
        WHERE p.dialog_id = ?
        "#,
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM dialogs WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(DialogDeletion {
        title,
        audio_locators,
    }))
}
