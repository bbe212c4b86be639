//! Deterministic-shape mock scorer for local development and tests
//!
//! Scores are random but always inside realistic ranges, and the reference
//! text is echoed back as the recognized text.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::debug;

use super::{PronunciationResult, PronunciationScorer, ScoringError};
use crate::models::{AssessmentScores, ErrorType, WordScore, WordScores};

/// Error classification draw; "None" carries 3/5 of the weight
const ERROR_CHOICES: [ErrorType; 5] = [
    ErrorType::None,
    ErrorType::None,
    ErrorType::None,
    ErrorType::Mispronunciation,
    ErrorType::Omission,
];

pub struct MockScorer {
    rng: Mutex<StdRng>,
}

impl MockScorer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible scorer for tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn generate(&self, reference_text: &str) -> PronunciationResult {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut word_level_scores = WordScores::new();
        for word in reference_text.split_whitespace() {
            let accuracy: f64 = rng.gen_range(70.0..=100.0);
            let error_type = ERROR_CHOICES
                .choose(&mut *rng)
                .copied()
                .unwrap_or(ErrorType::None);

            word_level_scores.insert(
                word.to_string(),
                WordScore {
                    accuracy: (accuracy * 10.0).round() / 10.0,
                    error_type,
                },
            );
        }

        let accuracy = rng.gen_range(75.0..=95.0);
        let prosody = rng.gen_range(3.5..=5.0);
        let fluency = rng.gen_range(70.0..=90.0);
        let completeness = rng.gen_range(80.0..=100.0);

        PronunciationResult {
            scores: AssessmentScores::from_components(accuracy, prosody, fluency, completeness),
            recognized_text: reference_text.to_string(),
            word_level_scores,
        }
    }
}

impl Default for MockScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PronunciationScorer for MockScorer {
    async fn assess(
        &self,
        audio: &[u8],
        reference_text: &str,
    ) -> Result<PronunciationResult, ScoringError> {
        debug!(audio_bytes = audio.len(), "Using mock pronunciation assessment");
        Ok(self.generate(reference_text))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
