//! Assessment endpoints
//!
//! POST /assessments/assess takes a multipart form with `audio` (file),
//! `phrase_id` (integer) and `user_id` (external identifier).

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::db::assessments;
use crate::error::{ApiError, ApiResult};
use crate::models::Assessment;
use crate::services::assessment_workflow::Submission;
use crate::AppState;

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::BadRequest("Audio file too large".to_string())
    } else {
        ApiError::Validation(err.body_text())
    }
}

/// Pull the three form fields out of the multipart body
async fn read_submission(mut multipart: Multipart) -> ApiResult<Submission> {
    let mut audio = None;
    let mut content_type = None;
    let mut phrase_id = None;
    let mut user_id = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                audio = Some(bytes.to_vec());
            }
            "phrase_id" => phrase_id = Some(field.text().await.map_err(multipart_error)?),
            "user_id" => user_id = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let audio = audio.ok_or_else(|| ApiError::Validation("Field 'audio' is required".into()))?;

    let phrase_id = phrase_id
        .ok_or_else(|| ApiError::Validation("Field 'phrase_id' is required".into()))?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::Validation("Field 'phrase_id' must be a positive integer".into()))?;

    let external_user_id = user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("Field 'user_id' is required".into()))?;

    Ok(Submission {
        audio,
        content_type,
        phrase_id,
        external_user_id,
    })
}

/// POST /assessments/assess
pub async fn create_assessment(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Assessment>> {
    let submission = read_submission(multipart?).await?;
    let assessment = state.workflow().submit(submission).await?;
    Ok(Json(assessment))
}

/// GET /assessments/:id
pub async fn get_assessment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Assessment>> {
    assessments::get_assessment(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Assessment {} not found", id)))
}

/// GET /assessments/:id/audio - decrypted recording
pub async fn get_assessment_audio(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let audio = state.workflow().recording(id).await?;
    info!(assessment_id = id, bytes = audio.len(), "Serving recording");
    Ok(([(header::CONTENT_TYPE, "audio/wav")], audio))
}

/// `body_limit` caps the whole multipart request body
pub fn assessment_routes(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/assessments/assess",
            post(create_assessment).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/assessments/:id", get(get_assessment))
        .route("/assessments/:id/audio", get(get_assessment_audio))
}
