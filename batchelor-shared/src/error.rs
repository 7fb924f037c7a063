//! Shared error type for Batchelor crates.

use thiserror::Error;

use crate::condition::ConditionError;

pub type BatchelorResult<T> = Result<T, BatchelorError>;

#[derive(Debug, Error)]
pub enum BatchelorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("condition error: {0}")]
    Condition(#[from] ConditionError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl BatchelorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_found() {
        let err = BatchelorError::not_found("task abc");
        assert_eq!(format!("{err}"), "not found: task abc");
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: BatchelorError = json_err.into();
        assert!(matches!(err, BatchelorError::Serialization(_)));
    }
}
