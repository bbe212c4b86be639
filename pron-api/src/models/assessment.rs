//! Assessment results and per-user progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weight that lifts the 0-5 prosody scale onto 0-100 before averaging
pub const PROSODY_SCALE: f64 = 20.0;

/// The five pronunciation scores
///
/// `overall_score` is derived from the four component scores and cannot be
/// set independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AssessmentScores {
    accuracy_score: f64,
    prosody_score: f64,
    fluency_score: f64,
    completeness_score: f64,
    overall_score: f64,
}

impl AssessmentScores {
    /// Build scores from components: accuracy/fluency/completeness in 0-100, prosody in 0-5
    pub fn from_components(accuracy: f64, prosody: f64, fluency: f64, completeness: f64) -> Self {
        Self {
            accuracy_score: accuracy,
            prosody_score: prosody,
            fluency_score: fluency,
            completeness_score: completeness,
            overall_score: overall_score(accuracy, prosody, fluency, completeness),
        }
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy_score
    }

    pub fn prosody(&self) -> f64 {
        self.prosody_score
    }

    pub fn fluency(&self) -> f64 {
        self.fluency_score
    }

    pub fn completeness(&self) -> f64 {
        self.completeness_score
    }

    pub fn overall(&self) -> f64 {
        self.overall_score
    }
}

/// `(accuracy + prosody*20 + fluency + completeness) / 4`, evaluated left to right
pub fn overall_score(accuracy: f64, prosody: f64, fluency: f64, completeness: f64) -> f64 {
    (accuracy + (prosody * PROSODY_SCALE) + fluency + completeness) / 4.0
}

/// Per-word error classification reported by the scoring provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    None,
    Mispronunciation,
    Omission,
    Insertion,
    UnexpectedBreak,
    MissingBreak,
    Monotone,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordScore {
    pub accuracy: f64,
    pub error_type: ErrorType,
}

/// Word token -> score; repeated tokens keep the last reported entry
pub type WordScores = BTreeMap<String, WordScore>;

/// A stored assessment (immutable after creation)
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub id: i64,
    pub user_id: i64,
    pub phrase_id: i64,
    pub scores: AssessmentScores,
    pub recognized_text: Option<String>,
    pub word_level_scores: WordScores,
    #[serde(skip_serializing)]
    pub audio_locator: String,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// Assessment history row, joined with the phrase text
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentListItem {
    pub id: i64,
    pub phrase_id: i64,
    pub phrase_text: String,
    pub overall_score: f64,
    pub accuracy_score: f64,
    pub prosody_score: f64,
    pub fluency_score: f64,
    pub completeness_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over one user's assessments
#[derive(Debug, Clone, Serialize)]
pub struct UserProgress {
    pub user_id: i64,
    pub total_assessments: i64,
    pub average_overall_score: f64,
    pub average_accuracy: f64,
    pub average_prosody: f64,
    pub average_fluency: f64,
    pub average_completeness: f64,
    pub best_score: f64,
    pub worst_score: f64,
    pub categories_practiced: BTreeMap<String, i64>,
    pub improvement_rate: Option<f64>,
}
