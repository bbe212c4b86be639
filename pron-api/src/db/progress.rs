//! Per-user progress aggregation

use pron_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::models::UserProgress;

/// Aggregate a user's assessments; all zeros when the user has none
pub async fn user_progress(pool: &SqlitePool, user_id: i64) -> Result<UserProgress> {
    let totals = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(AVG(overall_score), 0.0) AS avg_overall,
               COALESCE(AVG(accuracy_score), 0.0) AS avg_accuracy,
               COALESCE(AVG(prosody_score), 0.0) AS avg_prosody,
               COALESCE(AVG(fluency_score), 0.0) AS avg_fluency,
               COALESCE(AVG(completeness_score), 0.0) AS avg_completeness,
               COALESCE(MAX(overall_score), 0.0) AS best,
               COALESCE(MIN(overall_score), 0.0) AS worst
        FROM assessments
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let category_rows = sqlx::query(
        r#"
        SELECT c.name AS category, COUNT(*) AS practiced
        FROM assessments a
        JOIN phrases p ON p.id = a.phrase_id
        JOIN dialogs d ON d.id = p.dialog_id
        JOIN categories c ON c.id = d.category_id
        WHERE a.user_id = ?
        GROUP BY c.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let categories_practiced: BTreeMap<String, i64> = category_rows
        .iter()
        .map(|row| (row.get("category"), row.get("practiced")))
        .collect();

    Ok(UserProgress {
        user_id,
        total_assessments: totals.get("total"),
        average_overall_score: totals.get("avg_overall"),
        average_accuracy: totals.get("avg_accuracy"),
        average_prosody: totals.get("avg_prosody"),
        average_fluency: totals.get("avg_fluency"),
        average_completeness: totals.get("avg_completeness"),
        best_score: totals.get("best"),
        worst_score: totals.get("worst"),
        categories_practiced,
        improvement_rate: None,
    })
}
