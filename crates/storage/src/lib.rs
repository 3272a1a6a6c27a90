//! Storage Layer
//!
//! Persists one summary row per finished learning session in SQLite and
//! answers the aggregate queries behind the reporting endpoints.

mod repository;

pub use repository::{AttentionReport, EmotionTotals, QuizReport, Repository, StoredSummary, SummaryRecord};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}
