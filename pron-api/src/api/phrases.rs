//! Phrase CRUD endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::db::phrases;
use crate::error::{ApiError, ApiResult};
use crate::models::{Phrase, PhraseCreate, PhraseUpdate};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PhraseListParams {
    pub dialog_id: Option<i64>,
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Phrase {} not found", id))
}

/// GET /phrases?dialog_id=
pub async fn list_phrases(
    State(state): State<AppState>,
    params: Result<Query<PhraseListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Phrase>>> {
    let Query(params) = params?;
    let phrases = phrases::list_phrases(&state.db, params.dialog_id).await?;
    Ok(Json(phrases))
}

/// GET /phrases/:id
pub async fn get_phrase(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Phrase>> {
    phrases::get_phrase(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// POST /phrases
pub async fn create_phrase(
    State(state): State<AppState>,
    payload: Result<Json<PhraseCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Phrase>)> {
    let Json(create) = payload?;
    create.validate().map_err(ApiError::Validation)?;

    let phrase = phrases::create_phrase(&state.db, &create).await?;
    info!(phrase_id = phrase.id, dialog_id = phrase.dialog_id, "Created phrase");
    Ok((StatusCode::CREATED, Json(phrase)))
}

/// PUT /phrases/:id
pub async fn update_phrase(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<PhraseUpdate>, JsonRejection>,
) -> ApiResult<Json<Phrase>> {
    let Json(update) = payload?;
    update.validate().map_err(ApiError::Validation)?;

    let phrase = phrases::update_phrase(&state.db, id, &update)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(phrase))
}

/// DELETE /phrases/:id
pub async fn delete_phrase(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let deleted = phrases::delete_phrase(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    let blobs = state.storage.delete_best_effort(&deleted.audio_locators).await;
    info!(phrase_id = id, blobs, "Deleted phrase");
    Ok(StatusCode::NO_CONTENT)
}

pub fn phrase_routes() -> Router<AppState> {
    Router::new()
        .route("/phrases", get(list_phrases).post(create_phrase))
        .route(
            "/phrases/:id",
            get(get_phrase).put(update_phrase).delete(delete_phrase),
        )
}
