//! Category CRUD endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;

use crate::db::categories;
use crate::error::{ApiError, ApiResult};
use crate::models::{Category, CategoryCreate, CategoryUpdate};
use crate::AppState;

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Category {} not found", id))
}

fn conflict_on_duplicate(err: pron_common::Error, name: &str) -> ApiError {
    if err.is_unique_violation() {
        ApiError::Conflict(format!("Category '{}' already exists", name))
    } else {
        err.into()
    }
}

/// GET /categories
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    let categories = categories::list_categories(&state.db).await?;
    info!("Retrieved {} categories", categories.len());
    Ok(Json(categories))
}

/// GET /categories/:id
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Category>> {
    categories::get_category(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// POST /categories
pub async fn create_category(
    State(state): State<AppState>,
    payload: Result<Json<CategoryCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let Json(create) = payload?;
    create.validate().map_err(ApiError::Validation)?;

    let category = categories::create_category(&state.db, &create)
        .await
        .map_err(|e| conflict_on_duplicate(e, &create.name))?;

    info!(category_id = category.id, "Created category '{}'", category.name);
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /categories/:id
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<CategoryUpdate>, JsonRejection>,
) -> ApiResult<Json<Category>> {
    let Json(update) = payload?;
    update.validate().map_err(ApiError::Validation)?;

    let name = update.name.clone().unwrap_or_default();
    let category = categories::update_category(&state.db, id, &update)
        .await
        .map_err(|e| conflict_on_duplicate(e, &name))?
        .ok_or_else(|| not_found(id))?;

    info!(category_id = id, "Updated category");
    Ok(Json(category))
}

/// DELETE /categories/:id
///
/// Cascades to dialogs, phrases and assessments; stored audio of removed
/// assessments is deleted afterwards.
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let deleted = categories::delete_category(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    let blobs = state.storage.delete_best_effort(&deleted.audio_locators).await;
    info!(
        category_id = id,
        dialogs = deleted.dialog_count,
        blobs,
        "Deleted category '{}'",
        deleted.name
    );
    Ok(StatusCode::NO_CONTENT)
}

pub fn category_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            get(get_category).put(update_category).delete(delete_category),
        )
}
