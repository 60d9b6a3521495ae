//! Error taxonomy surfaced by the repository layer.
//!
//! Store failures of every kind collapse into `Remote`; missing or malformed
//! input is caught before dispatch as `Validation`; single-row lookups that
//! match nothing become `NotFound`.

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Remote(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl DataError {
    pub fn validation(message: impl Into<String>) -> Self {
        DataError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        DataError::NotFound(what.into())
    }
}

impl From<StoreError> for DataError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(column) => {
                DataError::Remote(format!("A record with this {} already exists", column))
            }
            other => DataError::Remote(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Remote(format!("Unexpected row shape: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_becomes_remote_error() {
        let err: DataError = StoreError::UniqueViolation("slug".to_string()).into();
        match err {
            DataError::Remote(msg) => assert!(msg.contains("slug")),
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn not_found_message_names_the_subject() {
        assert_eq!(DataError::not_found("blog post").to_string(), "blog post not found");
    }
}
