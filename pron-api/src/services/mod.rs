//! Service layer: scoring provider, audio vault and the assessment workflow

pub mod assessment_workflow;
pub mod audio_info;
pub mod key_rotation;
pub mod scoring;
pub mod vault;
