use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("clause file not found: {0}")]
    ClausesNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("clause source is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("clause source must be a JSON object keyed by clause id, got {0}")]
    NotAnObject(&'static str),

    /// Bad caller input. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed clause {id}: {reason}")]
    MalformedClause { id: String, reason: String },
}
