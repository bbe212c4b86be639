//! Azure Speech pronunciation assessment client
//!
//! Uses the short-audio REST endpoint with a `Pronunciation-Assessment`
//! header, so no native SDK is needed. Azure reports prosody on 0-100; it is
//! scaled down to 0-5 before the overall score is derived.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{PronunciationResult, PronunciationScorer, ScoringError};
use crate::models::assessment::PROSODY_SCALE;
use crate::models::{AssessmentScores, ErrorType, WordScore, WordScores};

const USER_AGENT: &str = concat!("pron-api/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;
const WAV_CONTENT_TYPE: &str = "audio/wav; codecs=audio/pcm; samplerate=16000";

/// Assessment parameters sent base64-encoded in the request header
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AssessmentParams<'a> {
    reference_text: &'a str,
    grading_system: &'static str,
    granularity: &'static str,
    dimension: &'static str,
    enable_miscue: bool,
    enable_prosody_assessment: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
    #[serde(default, rename = "NBest")]
    n_best: Vec<NBestEntry>,
}

/// Score fields appear either flat on the entry or nested under
/// `PronunciationAssessment`, depending on API version
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ScoreFields {
    accuracy_score: Option<f64>,
    fluency_score: Option<f64>,
    completeness_score: Option<f64>,
    prosody_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NBestEntry {
    #[serde(default)]
    display: Option<String>,
    #[serde(flatten)]
    flat: ScoreFields,
    #[serde(default)]
    pronunciation_assessment: Option<ScoreFields>,
    #[serde(default)]
    words: Vec<WordEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WordAssessment {
    accuracy_score: Option<f64>,
    error_type: Option<ErrorType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WordEntry {
    word: String,
    #[serde(default)]
    accuracy_score: Option<f64>,
    #[serde(default)]
    error_type: Option<ErrorType>,
    #[serde(default)]
    pronunciation_assessment: Option<WordAssessment>,
}

impl NBestEntry {
    fn score(&self, pick: impl Fn(&ScoreFields) -> Option<f64>) -> f64 {
        self.pronunciation_assessment
            .as_ref()
            .and_then(&pick)
            .or_else(|| pick(&self.flat))
            .unwrap_or(0.0)
    }
}

/// Azure Speech REST client
pub struct AzureSpeechScorer {
    http_client: reqwest::Client,
    subscription_key: String,
    endpoint: String,
    language: String,
}

impl AzureSpeechScorer {
    pub fn new(
        subscription_key: String,
        region: String,
        language: String,
    ) -> Result<Self, ScoringError> {
        let endpoint = format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1",
            region
        );
        Self::with_endpoint(subscription_key, endpoint, language)
    }

    /// Client against an explicit endpoint URL (regional or private)
    pub fn with_endpoint(
        subscription_key: String,
        endpoint: String,
        language: String,
    ) -> Result<Self, ScoringError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScoringError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            subscription_key,
            endpoint,
            language,
        })
    }

    fn assessment_header(reference_text: &str) -> Result<String, ScoringError> {
        let params = AssessmentParams {
            reference_text,
            grading_system: "HundredMark",
            granularity: "Phoneme",
            dimension: "Comprehensive",
            enable_miscue: true,
            enable_prosody_assessment: true,
        };
        let json = serde_json::to_vec(&params).map_err(|e| ScoringError::Parse(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }
}

/// Map a parsed recognition response onto the scoring contract
fn interpret_response(response: RecognitionResponse) -> Result<PronunciationResult, ScoringError> {
    match response.recognition_status.as_str() {
        "Success" => {}
        "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => {
            return Err(ScoringError::NoSpeech);
        }
        other => return Err(ScoringError::Canceled(other.to_string())),
    }

    let best = response
        .n_best
        .into_iter()
        .next()
        .ok_or_else(|| ScoringError::Parse("Response has no NBest entries".to_string()))?;

    let accuracy = best.score(|s| s.accuracy_score);
    let fluency = best.score(|s| s.fluency_score);
    let completeness = best.score(|s| s.completeness_score);
    let prosody = best.score(|s| s.prosody_score) / PROSODY_SCALE;

    let mut word_level_scores = WordScores::new();
    for word in &best.words {
        let nested = word.pronunciation_assessment.as_ref();
        let accuracy = nested
            .and_then(|n| n.accuracy_score)
            .or(word.accuracy_score)
            .unwrap_or(0.0);
        let error_type = nested
            .and_then(|n| n.error_type)
            .or(word.error_type)
            .unwrap_or(ErrorType::None);

        word_level_scores.insert(word.word.clone(), WordScore { accuracy, error_type });
    }

    let recognized_text = best
        .display
        .or(response.display_text)
        .unwrap_or_default();

    Ok(PronunciationResult {
        scores: AssessmentScores::from_components(accuracy, prosody, fluency, completeness),
        recognized_text,
        word_level_scores,
    })
}

#[async_trait]
impl PronunciationScorer for AzureSpeechScorer {
    async fn assess(
        &self,
        audio: &[u8],
        reference_text: &str,
    ) -> Result<PronunciationResult, ScoringError> {
        let header = Self::assessment_header(reference_text)?;

        debug!(
            audio_bytes = audio.len(),
            language = %self.language,
            "Requesting Azure pronunciation assessment"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .query(&[("language", self.language.as_str()), ("format", "detailed")])
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header("Pronunciation-Assessment", header)
            .header(reqwest::header::CONTENT_TYPE, WAV_CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, "application/json")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| ScoringError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Azure speech assessment failed");
            return Err(ScoringError::Provider(status.as_u16(), error_text));
        }

        let parsed: RecognitionResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::Parse(e.to_string()))?;

        let result = interpret_response(parsed);
        match &result {
            Ok(r) => info!(
                overall = r.scores.overall(),
                words = r.word_level_scores.len(),
                "Azure pronunciation assessment complete"
            ),
            Err(e) => warn!("Azure pronunciation assessment rejected: {}", e),
        }
        result
    }

    fn name(&self) -> &'static str {
        "azure"
    }
}
