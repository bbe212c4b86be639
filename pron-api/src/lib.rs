//! pron-api library - pronunciation practice backend
//!
//! Practice content (categories, dialogs, phrases), assessment submission
//! with encrypted audio storage, and per-user progress over HTTP.

use axum::http::HeaderValue;
use axum::Router;
use pron_common::Settings;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use services::assessment_workflow::AssessmentWorkflow;
use services::scoring::{scorer_from_settings, PronunciationScorer};
use services::vault::{AudioCipher, StorageRouter};

/// Room for multipart boundaries and the text fields on top of the audio
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub scorer: Arc<dyn PronunciationScorer>,
    pub cipher: Arc<AudioCipher>,
    pub storage: Arc<StorageRouter>,
    /// Process start, for `uptime_seconds` in /health
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        settings: Settings,
        scorer: Arc<dyn PronunciationScorer>,
        cipher: AudioCipher,
        storage: StorageRouter,
    ) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
            scorer,
            cipher: Arc::new(cipher),
            storage: Arc::new(storage),
            startup_time: Instant::now(),
        }
    }

    /// Build every component from validated settings
    pub async fn initialize(db: SqlitePool, settings: Settings) -> pron_common::Result<Self> {
        let scorer = scorer_from_settings(&settings)
            .map_err(|e| pron_common::Error::Config(format!("Scoring provider: {}", e)))?;
        let cipher = AudioCipher::from_key_str(&settings.encryption_key)
            .map_err(|e| pron_common::Error::Config(e.to_string()))?;
        let storage = StorageRouter::from_settings(&settings)
            .await
            .map_err(|e| pron_common::Error::Config(format!("Blob storage: {}", e)))?;

        Ok(Self::new(db, settings, scorer, cipher, storage))
    }

    pub fn workflow(&self) -> AssessmentWorkflow<'_> {
        AssessmentWorkflow::new(
            &self.db,
            self.scorer.as_ref(),
            &self.cipher,
            &self.storage,
            self.settings.max_audio_bytes,
        )
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Build application router
///
/// Resource routes live under `/api/v1`; `/health` stays at the root.
pub fn build_router(state: AppState) -> Router {
    let audio_body_limit = state.settings.max_audio_bytes + MULTIPART_OVERHEAD_BYTES;

    let v1 = Router::new()
        .merge(api::category_routes())
        .merge(api::dialog_routes())
        .merge(api::phrase_routes())
        .merge(api::assessment_routes(audio_body_limit))
        .merge(api::user_routes());

    Router::new()
        .nest("/api/v1", v1)
        .merge(api::health_routes())
        .layer(cors_layer(&state.settings.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
