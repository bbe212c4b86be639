//! HTTP API handlers for pron-api

pub mod assessments;
pub mod categories;
pub mod dialogs;
pub mod health;
pub mod phrases;
pub mod users;

pub use assessments::assessment_routes;
pub use categories::category_routes;
pub use dialogs::dialog_routes;
pub use health::health_routes;
pub use phrases::phrase_routes;
pub use users::user_routes;

use axum::extract::rejection::{JsonRejection, QueryRejection};

use crate::error::ApiError;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
