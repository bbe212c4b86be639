//! Test helper utilities shared by pron-api integration tests

#![allow(dead_code)]

pub mod audio_generator;

pub use audio_generator::{one_second_wav, silent_wav};

use axum::{
    body::Body,
    http::{header, Request},
    Router,
};
use pron_api::db::{categories, dialogs, phrases};
use pron_api::models::{CategoryCreate, DialogCreate, PhraseCreate};
use pron_api::services::scoring::{MockScorer, PronunciationScorer};
use pron_api::services::vault::{generate_key, AudioCipher, StorageRouter};
use pron_api::services::vault::storage::LocalBlobStore;
use pron_api::{build_router, AppState};
use pron_common::Settings;
use serde_json::Value;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "pronapitestboundary";

/// Router plus the handles tests need to inspect side effects
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub blob_dir: TempDir,
}

impl TestApp {
    pub fn db(&self) -> &SqlitePool {
        &self.state.db
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(self.db())
            .await
            .unwrap()
    }

    /// Number of files stored below the blob directory
    pub fn blob_count(&self) -> usize {
        count_files(self.blob_dir.path())
    }
}

fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

pub fn test_settings(blob_dir: &Path) -> Settings {
    Settings {
        database_url: "sqlite::memory:".to_string(),
        encryption_key: generate_key(),
        secret_key: "test-secret".to_string(),
        mock_blob_dir: blob_dir.to_path_buf(),
        ..Settings::default()
    }
}

pub async fn test_pool() -> SqlitePool {
    pron_common::db::init_database("sqlite::memory:", 1)
        .await
        .expect("Should create in-memory database")
}

/// App in mock mode with in-memory SQLite and a temporary blob directory
pub async fn setup_app() -> TestApp {
    setup_app_with(Arc::new(MockScorer::with_seed(1234)), |_| {}).await
}

/// App with a custom scorer and settings tweaks
pub async fn setup_app_with<F>(scorer: Arc<dyn PronunciationScorer>, tweak: F) -> TestApp
where
    F: FnOnce(&mut Settings),
{
    let blob_dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(blob_dir.path());
    tweak(&mut settings);

    let cipher = AudioCipher::from_key_str(&settings.encryption_key).unwrap();
    let storage = StorageRouter::new(Arc::new(LocalBlobStore::new(blob_dir.path())));
    let state = AppState::new(test_pool().await, settings, scorer, cipher, storage);

    TestApp {
        router: build_router(state.clone()),
        state,
        blob_dir,
    }
}

/// Request with an empty body
pub fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// multipart/form-data request with text fields and an optional audio file
pub fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    audio: Option<(&[u8], &str)>,
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }

    if let Some((bytes, content_type)) = audio {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"recording.wav\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Standard assessment submission
pub fn assess_request(phrase_id: i64, user_id: &str, audio: &[u8]) -> Request<Body> {
    let phrase_id = phrase_id.to_string();
    multipart_request(
        "/api/v1/assessments/assess",
        &[("phrase_id", &phrase_id), ("user_id", user_id)],
        Some((audio, "audio/wav")),
    )
}

pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

pub async fn extract_bytes(body: Body) -> Vec<u8> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body")
        .to_vec()
}

/// Ids of a seeded category -> dialog -> phrase chain
pub struct Seeded {
    pub category_id: i64,
    pub dialog_id: i64,
    pub phrase_id: i64,
}

/// Seed "Travel" / "Airport" / "Where is gate 12?"
pub async fn seed_phrase(db: &SqlitePool) -> Seeded {
    seed_named(db, "Travel", "Airport", "Where is gate 12?").await
}

pub async fn seed_named(db: &SqlitePool, category: &str, dialog: &str, text: &str) -> Seeded {
    let category = categories::create_category(
        db,
        &CategoryCreate {
            name: category.to_string(),
            description: None,
        },
    )
    .await
    .unwrap();

    let dialog = dialogs::create_dialog(
        db,
        &DialogCreate {
            title: dialog.to_string(),
            category_id: category.id,
            description: None,
            difficulty_level: "Intermediate".to_string(),
        },
    )
    .await
    .unwrap();

    let phrase = phrases::create_phrase(
        db,
        &PhraseCreate {
            dialog_id: dialog.id,
            reference_text: text.to_string(),
            order: 0,
            phonetic_transcription: None,
            difficulty: "Intermediate".to_string(),
        },
    )
    .await
    .unwrap();

    Seeded {
        category_id: category.id,
        dialog_id: dialog.id,
        phrase_id: phrase.id,
    }
}
