//! Dialog CRUD endpoints

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::db::dialogs::{self, DialogFilter};
use crate::error::{ApiError, ApiResult};
use crate::models::{Dialog, DialogCreate, DialogUpdate};
use crate::AppState;

/// `category` filters by name and is ignored when `category_id` is present
#[derive(Debug, Default, Deserialize)]
pub struct DialogListParams {
    pub category_id: Option<i64>,
    pub category: Option<String>,
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Dialog {} not found", id))
}

/// GET /dialogs?category_id=&category=
pub async fn list_dialogs(
    State(state): State<AppState>,
    params: Result<Query<DialogListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<Dialog>>> {
    let Query(params) = params?;
    let filter = DialogFilter {
        category_id: params.category_id,
        category_name: params.category.filter(|name| !name.is_empty()),
    };

    let dialogs = dialogs::list_dialogs(&state.db, &filter).await?;
    info!(
        "Retrieved {} dialogs (category_id={:?}, category={:?})",
        dialogs.len(),
        filter.category_id,
        filter.category_name
    );
    Ok(Json(dialogs))
}

/// GET /dialogs/:id
pub async fn get_dialog(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Dialog>> {
    dialogs::get_dialog(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(id))
}

/// POST /dialogs
pub async fn create_dialog(
    State(state): State<AppState>,
    payload: Result<Json<DialogCreate>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Dialog>)> {
    let Json(create) = payload?;
    create.validate().map_err(ApiError::Validation)?;

    let dialog = dialogs::create_dialog(&state.db, &create).await?;
    info!(dialog_id = dialog.id, category_id = dialog.category_id, "Created dialog");
    Ok((StatusCode::CREATED, Json(dialog)))
}

/// PUT /dialogs/:id
pub async fn update_dialog(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<DialogUpdate>, JsonRejection>,
) -> ApiResult<Json<Dialog>> {
    let Json(update) = payload?;
    update.validate().map_err(ApiError::Validation)?;

    let dialog = dialogs::update_dialog(&state.db, id, &update)
        .await?
        .ok_or_else(|| not_found(id))?;

    info!(dialog_id = id, "Updated dialog");
    Ok(Json(dialog))
}

/// DELETE /dialogs/:id
pub async fn delete_dialog(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let deleted = dialogs::delete_dialog(&state.db, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    let blobs = state.storage.delete_best_effort(&deleted.audio_locators).await;
    info!(dialog_id = id, blobs, "Deleted dialog '{}'", deleted.title);
    Ok(StatusCode::NO_CONTENT)
}

pub fn dialog_routes() -> Router<AppState> {
    Router::new()
        .route("/dialogs", get(list_dialogs).post(create_dialog))
        .route(
            "/dialogs/:id",
            get(get_dialog).put(update_dialog).delete(delete_dialog),
        )
}
