//! Phrase persistence

use pron_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use crate::models::{Phrase, PhraseCreate, PhraseUpdate};

const SELECT_PHRASE: &str = r#"
    SELECT id, dialog_id, reference_text, "order", phonetic_transcription, difficulty
    FROM phrases
"#;

/// What a phrase delete removed
#[derive(Debug, Clone, Default)]
pub struct PhraseDeletion {
    pub audio_locators: Vec<String>,
}

/// Phrases ordered by dialog, then `"order"`, then id
pub async fn list_phrases(pool: &SqlitePool, dialog_id: Option<i64>) -> Result<Vec<Phrase>> {
    let phrases = match dialog_id {
        Some(dialog_id) => {
            sqlx::query_as::<_, Phrase>(&format!(
                r#"{} WHERE dialog_id = ? ORDER BY "order", id"#,
                SELECT_PHRASE
            ))
            .bind(dialog_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Phrase>(&format!(
                r#"{} ORDER BY dialog_id, "order", id"#,
                SELECT_PHRASE
            ))
            .fetch_all(pool)
            .await?
        }
    };

    Ok(phrases)
}

pub async fn get_phrase(pool: &SqlitePool, id: i64) -> Result<Option<Phrase>> {
    let phrase = sqlx::query_as::<_, Phrase>(&format!("{} WHERE id = ?", SELECT_PHRASE))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(phrase)
}

/// Insert a phrase under an existing dialog
pub async fn create_phrase(pool: &SqlitePool, create: &PhraseCreate) -> Result<Phrase> {
    let mut tx = pool.begin().await?;

    let dialog: Option<i64> = sqlx::query_scalar("SELECT id FROM dialogs WHERE id = ?")
        .bind(create.dialog_id)
        .fetch_optional(&mut *tx)
        .await?;
    if dialog.is_none() {
        return Err(Error::NotFound(format!("Dialog {} not found", create.dialog_id)));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO phrases (dialog_id, reference_text, "order", phonetic_transcription, difficulty)
        VALUES (?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(create.dialog_id)
    .bind(&create.reference_text)
    .bind(create.order)
    .bind(&create.phonetic_transcription)
    .bind(&create.difficulty)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Phrase {
        id,
        dialog_id: create.dialog_id,
        reference_text: create.reference_text.clone(),
        order: create.order,
        phonetic_transcription: create.phonetic_transcription.clone(),
        difficulty: create.difficulty.clone(),
    })
}

/// Apply the provided fields; `Ok(None)` when the phrase does not exist
pub async fn update_phrase(
    pool: &SqlitePool,
    id: i64,
    update: &PhraseUpdate,
) -> Result<Option<Phrase>> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query(
        r#"SELECT reference_text, "order", phonetic_transcription, difficulty FROM phrases WHERE id = ?"#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(existing) = existing else {
        return Ok(None);
    };

    let reference_text: String = update
        .reference_text
        .clone()
        .unwrap_or_else(|| existing.get("reference_text"));
    let order: i64 = update.order.unwrap_or_else(|| existing.get("order"));
    let phonetic_transcription: Option<String> = match &update.phonetic_transcription {
        Some(value) => value.clone(),
        None => existing.get("phonetic_transcription"),
    };
    let difficulty: String = update
        .difficulty
        .clone()
        .unwrap_or_else(|| existing.get("difficulty"));

    sqlx::query(
        r#"
        UPDATE phrases
        SET reference_text = ?, "order" = ?, phonetic_transcription = ?, difficulty = ?
        WHERE id = ?
        "#,
    )
    .bind(&reference_text)
    .bind(order)
    .bind(&phonetic_transcription)
    .bind(&difficulty)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_phrase(pool, id).await
}

/// Delete a phrase and its assessments
pub async fn delete_phrase(pool: &SqlitePool, id: i64) -> Result<Option<PhraseDeletion>> {
    let mut tx = pool.begin().await?;

    let found: Option<i64> = sqlx::query_scalar("SELECT id FROM phrases WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    if found.is_none() {
        return Ok(None);
    }

    let audio_locators: Vec<String> =
        sqlx::query_scalar("SELECT audio_locator FROM assessments WHERE phrase_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

    sqlx::query("DELETE FROM phrases WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(PhraseDeletion { audio_locators }))
}
