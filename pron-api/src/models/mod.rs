//! Domain models and request/response shapes

pub mod assessment;
pub mod catalog;
pub mod user;

pub use assessment::{
    Assessment, AssessmentListItem, AssessmentScores, ErrorType, UserProgress, WordScore,
    WordScores,
};
pub use catalog::{
    Category, CategoryCreate, CategoryUpdate, Dialog, DialogCreate, DialogUpdate, Phrase,
    PhraseCreate, PhraseUpdate,
};
pub use user::User;

use serde::{Deserialize, Deserializer};

/// Default difficulty tag for dialogs and phrases
pub const DEFAULT_DIFFICULTY: &str = "Intermediate";

pub(crate) fn default_difficulty() -> String {
    DEFAULT_DIFFICULTY.to_string()
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Check a text field's character length against inclusive bounds
pub(crate) fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min {
        return Err(format!("{} must be at least {} character(s)", field, min));
    }
    if len > max {
        return Err(format!("{} must be at most {} characters", field, max));
    }
    Ok(())
}
