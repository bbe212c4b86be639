//! Failure-path and consistency tests for assessment submission
//!
//! Tests cover:
//! - No user or assessment rows survive a failed submission
//! - Uploaded blobs are removed when the final transaction fails
//! - Repeated and concurrent submissions share one user row, including
//!   parallel transactions on a multi-connection file database
//! - Decryption failures surface as INVALID_TOKEN
//! - Key rotation re-encrypts every stored recording

mod helpers;

use async_trait::async_trait;
use axum::http::StatusCode;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::util::ServiceExt;

use helpers::*;
use pron_api::models::{AssessmentScores, WordScores};
use pron_api::services::assessment_workflow::{Submission, WorkflowError};
use pron_api::services::key_rotation::{rotate_all, RotationReport};
use pron_api::services::scoring::{
    MockScorer, PronunciationResult, PronunciationScorer, ScoringError,
};
use pron_api::services::vault::storage::LocalBlobStore;
use pron_api::services::vault::{generate_key, AudioCipher, BlobStore, StorageError, StorageRouter};
use pron_api::{build_router, AppState};

/// Scorer whose provider is always unavailable
struct UnavailableScorer;

#[async_trait]
impl PronunciationScorer for UnavailableScorer {
    async fn assess(&self, _audio: &[u8], _text: &str) -> Result<PronunciationResult, ScoringError> {
        Err(ScoringError::Provider(503, "Service Unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Scorer that removes the phrase while the submission is in flight
struct PhraseRemovingScorer {
    db: SqlitePool,
    phrase_id: i64,
}

#[async_trait]
impl PronunciationScorer for PhraseRemovingScorer {
    async fn assess(&self, _audio: &[u8], text: &str) -> Result<PronunciationResult, ScoringError> {
        sqlx::query("DELETE FROM phrases WHERE id = ?")
            .bind(self.phrase_id)
            .execute(&self.db)
            .await
            .unwrap();

        Ok(PronunciationResult {
            scores: AssessmentScores::from_components(80.0, 4.0, 80.0, 80.0),
            recognized_text: text.to_string(),
            word_level_scores: WordScores::new(),
        })
    }

    fn name(&self) -> &'static str {
        "phrase-removing"
    }
}

/// Blob store that rejects every upload
struct UnreachableStore;

#[async_trait]
impl BlobStore for UnreachableStore {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn handles(&self, locator: &str) -> bool {
        locator.starts_with("unreachable://")
    }

    async fn upload(
        &self,
        _data: &[u8],
        _extension: &str,
        _owner: Option<&str>,
    ) -> Result<String, StorageError> {
        Err(StorageError::Network("connection refused".to_string()))
    }

    async fn download(&self, locator: &str) -> Result<Vec<u8>, StorageError> {
        Err(StorageError::NotFound(locator.to_string()))
    }

    async fn delete(&self, _locator: &str) -> Result<bool, StorageError> {
        Ok(false)
    }
}

fn submission(phrase_id: i64, user: &str) -> Submission {
    Submission {
        audio: one_second_wav(),
        content_type: Some("audio/wav".to_string()),
        phrase_id,
        external_user_id: user.to_string(),
    }
}

/// State sharing `app`'s database and blob directory but with its own cipher
fn state_with_cipher(app: &TestApp, cipher: AudioCipher) -> AppState {
    AppState::new(
        app.db().clone(),
        test_settings(app.blob_dir.path()),
        Arc::new(MockScorer::with_seed(7)),
        cipher,
        StorageRouter::new(Arc::new(LocalBlobStore::new(app.blob_dir.path()))),
    )
}

#[tokio::test]
async fn test_scoring_failure_leaves_no_trace() {
    let app = setup_app_with(Arc::new(UnavailableScorer), |_| {}).await;
    let seeded = seed_phrase(app.db()).await;

    let response = app
        .router
        .clone()
        .oneshot(assess_request(seeded.phrase_id, "u1", &one_second_wav()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Assessment failed"));

    assert_eq!(app.count("users").await, 0);
    assert_eq!(app.count("assessments").await, 0);
    assert_eq!(app.blob_count(), 0);
}

#[tokio::test]
async fn test_upload_failure_leaves_no_user() {
    let app = setup_app().await;
    let seeded = seed_phrase(app.db()).await;

    let cipher = AudioCipher::from_key_str(&app.state.settings.encryption_key).unwrap();
    let state = AppState::new(
        app.db().clone(),
        test_settings(app.blob_dir.path()),
        Arc::new(MockScorer::with_seed(3)),
        cipher,
        StorageRouter::new(Arc::new(UnreachableStore)),
    );

    let result = state.workflow().submit(submission(seeded.phrase_id, "u1")).await;

    assert!(matches!(result, Err(WorkflowError::Storage(StorageError::Network(_)))));
    assert_eq!(app.count("users").await, 0);
    assert_eq!(app.count("assessments").await, 0);
}

#[tokio::test]
async fn test_failed_insert_removes_uploaded_blob() {
    let blob_dir = tempfile::tempdir().unwrap();
    let db = test_pool().await;
    let seeded = seed_phrase(&db).await;

    let settings = test_settings(blob_dir.path());
    let cipher = AudioCipher::from_key_str(&settings.encryption_key).unwrap();
    let scorer = PhraseRemovingScorer {
        db: db.clone(),
        phrase_id: seeded.phrase_id,
    };
    let state = AppState::new(
        db.clone(),
        settings,
        Arc::new(scorer),
        cipher,
        StorageRouter::new(Arc::new(LocalBlobStore::new(blob_dir.path()))),
    );

    let result = state.workflow().submit(submission(seeded.phrase_id, "u1")).await;

    assert!(matches!(result, Err(WorkflowError::Database(_))));
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(users, 0);

    let leftover = std::fs::read_dir(blob_dir.path().join("u1"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_oversized_payload_rejected_before_lookup() {
    let app = setup_app_with(Arc::new(UnavailableScorer), |s| s.max_audio_bytes = 10).await;

    // Phrase does not exist, but the size check runs first
    let result = app.state.workflow().submit(submission(12345, "u1")).await;

    assert!(matches!(result, Err(WorkflowError::PayloadTooLarge { max: 10, .. })));
}

#[tokio::test]
async fn test_concurrent_first_submissions_share_one_user() {
    let app = setup_app().await;
    let seeded = seed_phrase(app.db()).await;
    let workflow = app.state.workflow();

    let (first, second) = tokio::join!(
        workflow.submit(submission(seeded.phrase_id, "twin")),
        workflow.submit(submission(seeded.phrase_id, "twin")),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.user_id, second.user_id);
    assert_ne!(first.id, second.id);
    assert_eq!(app.count("users").await, 1);
    assert_eq!(app.count("assessments").await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_first_submissions_on_file_database_share_one_user() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("race.db").display());
    let db = pron_common::db::init_database(&url, 8).await.unwrap();
    let seeded = seed_phrase(&db).await;

    let blob_dir = dir.path().join("blobs");
    let settings = test_settings(&blob_dir);
    let cipher = AudioCipher::from_key_str(&settings.encryption_key).unwrap();
    let state = AppState::new(
        db.clone(),
        settings,
        Arc::new(MockScorer::with_seed(11)),
        cipher,
        StorageRouter::new(Arc::new(LocalBlobStore::new(&blob_dir))),
    );

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let state = state.clone();
            let phrase_id = seeded.phrase_id;
            tokio::spawn(async move {
                state
                    .workflow()
                    .submit(submission(phrase_id, "first-timer"))
                    .await
            })
        })
        .collect();

    let mut user_ids = Vec::new();
    for handle in handles {
        let assessment = handle.await.unwrap().unwrap();
        user_ids.push(assessment.user_id);
    }
    user_ids.dedup();
    assert_eq!(user_ids.len(), 1);

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE external_id = ?")
        .bind("first-timer")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(users, 1);

    let assessments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assessments")
        .fetch_one(&db)
        .await
        .unwrap();
    assert_eq!(assessments, 16);
}

#[tokio::test]
async fn test_recording_round_trips() {
    let app = setup_app().await;
    let seeded = seed_phrase(app.db()).await;
    let sent = submission(seeded.phrase_id, "u1");
    let audio = sent.audio.clone();

    let assessment = app.state.workflow().submit(sent).await.unwrap();
    assert!(assessment.audio_locator.starts_with("local://"));

    let recording = app.state.workflow().recording(assessment.id).await.unwrap();
    assert_eq!(recording, audio);
}

#[tokio::test]
async fn test_wrong_key_reports_invalid_token() {
    let app = setup_app().await;
    let seeded = seed_phrase(app.db()).await;
    let assessment = app
        .state
        .workflow()
        .submit(submission(seeded.phrase_id, "u1"))
        .await
        .unwrap();

    let other_key = AudioCipher::from_key_str(&generate_key()).unwrap();
    let router = build_router(state_with_cipher(&app, other_key));

    let response = router
        .oneshot(test_request(
            "GET",
            &format!("/api/v1/assessments/{}/audio", assessment.id),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_missing_blob_is_internal_error() {
    let app = setup_app().await;
    let seeded = seed_phrase(app.db()).await;
    let assessment = app
        .state
        .workflow()
        .submit(submission(seeded.phrase_id, "u1"))
        .await
        .unwrap();

    std::fs::remove_file(assessment.audio_locator.trim_start_matches("local://")).unwrap();

    let result = app.state.workflow().recording(assessment.id).await;
    assert!(matches!(result, Err(WorkflowError::Storage(StorageError::NotFound(_)))));
}

#[tokio::test]
async fn test_key_rotation_reencrypts_all_recordings() {
    let app = setup_app().await;
    let travel = seed_phrase(app.db()).await;
    let work = seed_named(app.db(), "Work", "Interview", "Tell me about yourself").await;

    let first = app.state.workflow().submit(submission(travel.phrase_id, "u1")).await.unwrap();
    let second = app.state.workflow().submit(submission(work.phrase_id, "u2")).await.unwrap();

    let new_cipher = AudioCipher::from_key_str(&generate_key()).unwrap();
    let report = rotate_all(app.db(), &app.state.storage, &app.state.cipher, &new_cipher)
        .await
        .unwrap();
    assert_eq!(
        report,
        RotationReport {
            rotated: 2,
            already_current: 0,
            failed: 0
        }
    );
    // Old blobs removed, new ones written
    assert_eq!(app.blob_count(), 2);

    let rotated_state = state_with_cipher(&app, new_cipher);
    for id in [first.id, second.id] {
        let audio = rotated_state.workflow().recording(id).await.unwrap();
        assert_eq!(audio, one_second_wav());
    }

    // The old key no longer opens anything
    assert!(app.state.workflow().recording(first.id).await.is_err());

    // A second pass finds everything already under the new key
    let again = rotate_all(
        app.db(),
        &rotated_state.storage,
        &app.state.cipher,
        &rotated_state.cipher,
    )
    .await
    .unwrap();
    assert_eq!(again.already_current, 2);
    assert_eq!(again.rotated, 0);
}
