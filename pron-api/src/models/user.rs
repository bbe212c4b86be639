//! Anonymous learner records

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A learner, created lazily on first assessment submission
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    /// Client-supplied external identifier (the upsert key)
    pub user_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
