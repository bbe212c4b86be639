//! Practice content: categories, dialogs and phrases

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{check_length, default_difficulty, double_option};

pub const CATEGORY_NAME_MAX: usize = 100;
pub const DIALOG_TITLE_MAX: usize = 255;
pub const REFERENCE_TEXT_MAX: usize = 1000;

/// Category with its dialog count
#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub dialog_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CategoryCreate {
    pub fn validate(&self) -> Result<(), String> {
        check_length("name", &self.name, 1, CATEGORY_NAME_MAX)
    }
}

/// Partial category update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

impl CategoryUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            check_length("name", name, 1, CATEGORY_NAME_MAX)?;
        }
        Ok(())
    }
}

/// Dialog with its category name and ordered phrases
#[derive(Debug, Clone, Serialize)]
pub struct Dialog {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub difficulty_level: String,
    pub category_id: i64,
    pub category_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub phrase_count: i64,
    pub phrases: Vec<Phrase>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DialogCreate {
    pub title: String,
    pub category_id: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: String,
}

impl DialogCreate {
    pub fn validate(&self) -> Result<(), String> {
        check_length("title", &self.title, 1, DIALOG_TITLE_MAX)?;
        if self.category_id <= 0 {
            return Err("category_id must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialogUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub difficulty_level: Option<String>,
}

impl DialogUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            check_length("title", title, 1, DIALOG_TITLE_MAX)?;
        }
        if matches!(self.category_id, Some(id) if id <= 0) {
            return Err("category_id must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Phrase {
    pub id: i64,
    pub dialog_id: i64,
    pub reference_text: String,
    pub order: i64,
    pub phonetic_transcription: Option<String>,
    pub difficulty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhraseCreate {
    pub dialog_id: i64,
    pub reference_text: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub phonetic_transcription: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

impl PhraseCreate {
    pub fn validate(&self) -> Result<(), String> {
        if self.dialog_id <= 0 {
            return Err("dialog_id must be greater than 0".to_string());
        }
        check_length("reference_text", &self.reference_text, 1, REFERENCE_TEXT_MAX)?;
        if self.order < 0 {
            return Err("order must be 0 or greater".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhraseUpdate {
    #[serde(default)]
    pub reference_text: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    pub phonetic_transcription: Option<Option<String>>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl PhraseUpdate {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(text) = &self.reference_text {
            check_length("reference_text", text, 1, REFERENCE_TEXT_MAX)?;
        }
        if matches!(self.order, Some(order) if order < 0) {
            return Err("order must be 0 or greater".to_string());
        }
        Ok(())
    }
}
