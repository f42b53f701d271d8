use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Collector '{collector}' failed: {message}")]
    Collector {
        collector: &'static str,
        message: String,
    },

    #[error("Upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
