//! User lookup, assessment history and progress endpoints

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::db::{assessments, progress, users};
use crate::error::{ApiError, ApiResult};
use crate::models::{AssessmentListItem, User, UserProgress};
use crate::AppState;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl HistoryParams {
    /// `(limit, offset)` after range checks
    fn resolve(&self) -> ApiResult<(i64, i64)> {
        let limit = self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::Validation("offset must be 0 or greater".into()));
        }
        Ok((limit, offset))
    }
}

async fn require_user(state: &AppState, id: i64) -> ApiResult<User> {
    users::get_user(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))
}

/// GET /users/:id
pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<User>> {
    Ok(Json(require_user(&state, id).await?))
}

/// GET /users/:id/assessments?limit=&offset= - newest first
pub async fn get_user_assessments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Json<Vec<AssessmentListItem>>> {
    let Query(params) = params?;
    let (limit, offset) = params.resolve()?;
    require_user(&state, id).await?;

    let items = assessments::list_for_user(&state.db, id, limit, offset).await?;
    info!(user_id = id, "Retrieved {} assessments", items.len());
    Ok(Json(items))
}

/// GET /users/:id/progress
pub async fn get_user_progress(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserProgress>> {
    require_user(&state, id).await?;
    let progress = progress::user_progress(&state.db, id).await?;
    Ok(Json(progress))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id", get(get_user))
        .route("/users/:id/assessments", get(get_user_assessments))
        .route("/users/:id/progress", get(get_user_progress))
}
