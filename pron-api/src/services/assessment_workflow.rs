//! Assessment submission workflow
//!
//! Steps run strictly in order: validate payload, resolve user, resolve
//! phrase, score, encrypt, upload, persist. Nothing is written to the
//! database before the final transaction, so a failure in any earlier step
//! leaves no user or assessment row behind. If the final transaction fails
//! after the upload, the uploaded blob is removed again.

use chrono::Utc;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::assessments::{self, NewAssessment};
use crate::db::{phrases, users};
use crate::error::ApiError;
use crate::models::Assessment;
use crate::services::audio_info;
use crate::services::scoring::{PronunciationScorer, ScoringError};
use crate::services::vault::{AudioCipher, CipherError, StorageError, StorageRouter};

const AUDIO_EXTENSION: &str = "wav";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Audio file too large ({size} bytes, maximum {max} bytes)")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Phrase with ID {0} not found")]
    PhraseNotFound(i64),

    #[error("Assessment with ID {0} not found")]
    AssessmentNotFound(i64),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Encryption(#[from] CipherError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] pron_common::Error),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::PayloadTooLarge { .. } => ApiError::BadRequest(err.to_string()),
            WorkflowError::PhraseNotFound(_) | WorkflowError::AssessmentNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            WorkflowError::Encryption(CipherError::InvalidToken) => {
                ApiError::InvalidToken(err.to_string())
            }
            other => ApiError::Internal(format!("Assessment failed: {}", other)),
        }
    }
}

/// One incoming recording
#[derive(Debug, Clone)]
pub struct Submission {
    pub audio: Vec<u8>,
    pub content_type: Option<String>,
    pub phrase_id: i64,
    pub external_user_id: String,
}

/// Borrowed view of the components a submission touches
pub struct AssessmentWorkflow<'a> {
    db: &'a SqlitePool,
    scorer: &'a dyn PronunciationScorer,
    cipher: &'a AudioCipher,
    storage: &'a StorageRouter,
    max_audio_bytes: usize,
}

impl<'a> AssessmentWorkflow<'a> {
    pub fn new(
        db: &'a SqlitePool,
        scorer: &'a dyn PronunciationScorer,
        cipher: &'a AudioCipher,
        storage: &'a StorageRouter,
        max_audio_bytes: usize,
    ) -> Self {
        Self {
            db,
            scorer,
            cipher,
            storage,
            max_audio_bytes,
        }
    }

    /// Run one submission end to end
    pub async fn submit(&self, submission: Submission) -> Result<Assessment, WorkflowError> {
        let Submission {
            audio,
            content_type,
            phrase_id,
            external_user_id,
        } = submission;

        // 1. Payload
        if audio.len() > self.max_audio_bytes {
            return Err(WorkflowError::PayloadTooLarge {
                size: audio.len(),
                max: self.max_audio_bytes,
            });
        }
        if !audio_info::is_wav_content_type(content_type.as_deref()) {
            warn!(
                content_type = content_type.as_deref().unwrap_or("<none>"),
                "Unexpected content type, proceeding anyway"
            );
        }

        // 2. User (created in step 7 if absent)
        if users::find_by_external_id(self.db, &external_user_id)
            .await?
            .is_none()
        {
            info!(user = %external_user_id, "New user, will be created with the assessment");
        }

        // 3. Phrase
        let phrase = phrases::get_phrase(self.db, phrase_id)
            .await?
            .ok_or(WorkflowError::PhraseNotFound(phrase_id))?;

        info!(phrase_id, bytes = audio.len(), "Received audio");

        // 4. Score
        let result = self
            .scorer
            .assess(&audio, &phrase.reference_text)
            .await
            .map_err(|e| {
                error!(phrase_id, scorer = self.scorer.name(), "Scoring failed: {}", e);
                e
            })?;

        info!(
            accuracy = result.scores.accuracy(),
            prosody = result.scores.prosody(),
            overall = result.scores.overall(),
            "Assessment scored"
        );

        // 5. Encrypt
        let token = self.cipher.encrypt(&audio)?;

        // 6. Upload
        let locator = self
            .storage
            .upload(&token, AUDIO_EXTENSION, Some(&external_user_id))
            .await
            .map_err(|e| {
                error!(phrase_id, "Audio upload failed: {}", e);
                e
            })?;

        // 7. Persist
        let uploaded = locator.clone();
        let new = NewAssessment {
            // assigned inside the transaction
            user_id: 0,
            phrase_id,
            scores: result.scores,
            recognized_text: Some(result.recognized_text),
            word_level_scores: result.word_level_scores,
            audio_locator: locator,
            duration_seconds: audio_info::duration_seconds(&audio),
            created_at: Utc::now(),
        };

        match self.persist(&external_user_id, new).await {
            Ok(assessment) => {
                info!(
                    assessment_id = assessment.id,
                    user_id = assessment.user_id,
                    "Assessment saved"
                );
                Ok(assessment)
            }
            Err(e) => {
                error!(phrase_id, "Persisting assessment failed: {}", e);
                self.storage
                    .delete_best_effort(std::slice::from_ref(&uploaded))
                    .await;
                Err(e.into())
            }
        }
    }

    /// User upsert and assessment insert in one transaction
    async fn persist(
        &self,
        external_user_id: &str,
        mut new: NewAssessment,
    ) -> Result<Assessment, pron_common::Error> {
        let mut tx = self.db.begin().await?;

        new.user_id = users::find_or_create(&mut *tx, external_user_id).await?;
        let id = assessments::insert_assessment(&mut *tx, &new).await?;

        tx.commit().await?;

        Ok(Assessment {
            id,
            user_id: new.user_id,
            phrase_id: new.phrase_id,
            scores: new.scores,
            recognized_text: new.recognized_text,
            word_level_scores: new.word_level_scores,
            audio_locator: new.audio_locator,
            duration_seconds: new.duration_seconds,
            created_at: new.created_at,
        })
    }

    /// Download and decrypt the recording of a stored assessment
    pub async fn recording(&self, assessment_id: i64) -> Result<Vec<u8>, WorkflowError> {
        let assessment = assessments::get_assessment(self.db, assessment_id)
            .await?
            .ok_or(WorkflowError::AssessmentNotFound(assessment_id))?;

        let token = self.storage.download(&assessment.audio_locator).await?;
        let audio = self.cipher.decrypt(&token).map_err(|e| {
            error!(assessment_id, "Stored audio could not be decrypted: {}", e);
            e
        })?;

        Ok(audio)
    }
}
