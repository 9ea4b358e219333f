use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Bad caller input. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown clause category: {0}")]
    UnknownCategory(String),

    #[error("unknown gender value: {0}")]
    UnknownGender(String),
}
