//! Data persistence layer.
//!
//! SQLite-backed stores for evaluation results, binary availability, and
//! in-flight claims, plus the connection wrapper and schema migrations.

mod availability;
mod claims;
mod database;
mod migrations;
mod results;

use thiserror::Error;

use crate::eval::RecordError;
use crate::state::StateError;

/// Errors surfaced by the stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Malformed stored payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

pub use availability::{AvailabilityCache, AvailabilityRecord, AvailabilityStore};
pub use claims::{ClaimOutcome, ClaimStore};
pub use database::{Database, DatabaseError};
pub use migrations::run_migrations;
pub use results::{EvaluatedState, RangeFilter, ResultStore};
