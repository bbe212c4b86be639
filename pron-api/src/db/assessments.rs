//! Assessment persistence

use chrono::{DateTime, Utc};
use pron_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::models::{Assessment, AssessmentListItem, AssessmentScores, WordScores};

/// Fields of an assessment about to be stored
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub user_id: i64,
    pub phrase_id: i64,
    pub scores: AssessmentScores,
    pub recognized_text: Option<String>,
    pub word_level_scores: WordScores,
    pub audio_locator: String,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// Stored audio reference, as needed by key rotation
#[derive(Debug, Clone)]
pub struct StoredAudio {
    pub assessment_id: i64,
    pub external_user_id: String,
    pub audio_locator: String,
}

fn assessment_from_row(row: &SqliteRow) -> Result<Assessment> {
    let word_json: String = row.get("word_level_scores");
    let word_level_scores: WordScores = serde_json::from_str(&word_json)
        .map_err(|e| Error::Internal(format!("Corrupt word_level_scores: {}", e)))?;

    Ok(Assessment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        phrase_id: row.get("phrase_id"),
        scores: AssessmentScores::from_components(
            row.get("accuracy_score"),
            row.get("prosody_score"),
            row.get("fluency_score"),
            row.get("completeness_score"),
        ),
        recognized_text: row.get("recognized_text"),
        word_level_scores,
        audio_locator: row.get("audio_locator"),
        duration_seconds: row.get("duration_seconds"),
        created_at: row.get("created_at"),
    })
}

/// Insert on the caller's connection (normally inside the submission transaction)
pub async fn insert_assessment(conn: &mut SqliteConnection, new: &NewAssessment) -> Result<i64> {
    let word_json = serde_json::to_string(&new.word_level_scores)
        .map_err(|e| Error::Internal(format!("Cannot encode word scores: {}", e)))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO assessments (
            user_id, phrase_id, accuracy_score, prosody_score, fluency_score,
            completeness_score, overall_score, word_level_scores, recognized_text,
            audio_locator, duration_seconds, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(new.user_id)
    .bind(new.phrase_id)
    .bind(new.scores.accuracy())
    .bind(new.scores.prosody())
    .bind(new.scores.fluency())
    .bind(new.scores.completeness())
    .bind(new.scores.overall())
    .bind(word_json)
    .bind(&new.recognized_text)
    .bind(&new.audio_locator)
    .bind(new.duration_seconds)
    .bind(new.created_at)
    .fetch_one(conn)
    .await?;

    Ok(id)
}

pub async fn get_assessment(pool: &SqlitePool, id: i64) -> Result<Option<Assessment>> {
    let row = sqlx::query("SELECT * FROM assessments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(assessment_from_row).transpose()
}

/// One page of a user's history, newest first
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<AssessmentListItem>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.phrase_id, p.reference_text AS phrase_text,
               a.overall_score, a.accuracy_score, a.prosody_score,
               a.fluency_score, a.completeness_score, a.created_at
        FROM assessments a
        JOIN phrases p ON p.id = a.phrase_id
        WHERE a.user_id = ?
        ORDER BY a.created_at DESC, a.id DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| AssessmentListItem {
            id: row.get("id"),
            phrase_id: row.get("phrase_id"),
            phrase_text: row.get("phrase_text"),
            overall_score: row.get("overall_score"),
            accuracy_score: row.get("accuracy_score"),
            prosody_score: row.get("prosody_score"),
            fluency_score: row.get("fluency_score"),
            completeness_score: row.get("completeness_score"),
            created_at: row.get("created_at"),
        })
        .collect())
}

/// Every stored recording, oldest first
pub async fn list_stored_audio(pool: &SqlitePool) -> Result<Vec<StoredAudio>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, u.external_id, a.audio_locator
        FROM assessments a
        JOIN users u ON u.id = a.user_id
        ORDER BY a.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| StoredAudio {
            assessment_id: row.get("id"),
            external_user_id: row.get("external_id"),
            audio_locator: row.get("audio_locator"),
        })
        .collect())
}

pub async fn update_audio_locator(pool: &SqlitePool, id: i64, locator: &str) -> Result<()> {
    sqlx::query("UPDATE assessments SET audio_locator = ? WHERE id = ?")
        .bind(locator)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
