//! # PronIELTS Common Library
//!
//! Shared code for the pronunciation-practice service:
//! - Error types shared by every crate in the workspace
//! - Configuration loading and startup validation
//! - Database bootstrap (pool construction, schema creation)

pub mod config;
pub mod db;
pub mod error;

pub use config::Settings;
pub use error::{Error, Result};
