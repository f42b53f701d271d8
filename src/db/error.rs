use thiserror::Error;

/// Errors surfaced by the repository layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// The addressed row does not exist (or no longer matches the update guard).
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data violates an invariant, such as an unparseable UUID.
    #[error("Corrupt row: {0}")]
    Internal(String),
}

pub type DbResult<T> = Result<T, DbError>;
