//! Database access for pron-api
//!
//! Each module owns the SQL for one table family. Mutations run in a single
//! transaction; lookups run directly against the pool.

pub mod assessments;
pub mod categories;
pub mod dialogs;
pub mod phrases;
pub mod progress;
pub mod users;

pub use pron_common::db::init_database;
