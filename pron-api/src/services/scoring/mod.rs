//! Pronunciation scoring provider
//!
//! One trait, two implementations. Which one runs is decided once at startup
//! from `MOCK_MODE`; request handlers only ever see `dyn PronunciationScorer`.

pub mod azure;
pub mod mock;

pub use azure::AzureSpeechScorer;
pub use mock::MockScorer;

use async_trait::async_trait;
use pron_common::Settings;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{AssessmentScores, WordScores};

/// Scoring failures; all of them abort the submission
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("No speech could be recognized from the audio")]
    NoSpeech,

    #[error("Speech recognition canceled: {0}")]
    Canceled(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Speech provider returned {0}: {1}")]
    Provider(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Scores plus recognition details for one recording
#[derive(Debug, Clone, PartialEq)]
pub struct PronunciationResult {
    pub scores: AssessmentScores,
    pub recognized_text: String,
    pub word_level_scores: WordScores,
}

#[async_trait]
pub trait PronunciationScorer: Send + Sync {
    /// Score `audio` (WAV bytes) against the text the speaker was asked to read
    async fn assess(
        &self,
        audio: &[u8],
        reference_text: &str,
    ) -> Result<PronunciationResult, ScoringError>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

/// Build the scorer selected by configuration
pub fn scorer_from_settings(
    settings: &Settings,
) -> Result<Arc<dyn PronunciationScorer>, ScoringError> {
    if settings.mock_mode {
        return Ok(Arc::new(MockScorer::new()));
    }

    let key = settings.speech_key.clone().unwrap_or_default();
    let scorer = AzureSpeechScorer::new(
        key,
        settings.speech_region.clone(),
        settings.speech_language.clone(),
    )?;
    Ok(Arc::new(scorer))
}
