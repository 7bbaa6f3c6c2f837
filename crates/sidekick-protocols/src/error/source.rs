//! Referenced content source errors.

use thiserror::Error;

use super::ErrorCode;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Referenced source {0} is unavailable")]
    SourceUnavailable(i64),

    #[error("Unable to capture content of source {0}")]
    ContentUnavailable(i64),

    #[error("Failed to enumerate sources: {0}")]
    Enumeration(String),
}

impl SourceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SourceError::SourceUnavailable(_) => ErrorCode::SourceUnavailable,
            SourceError::ContentUnavailable(_) => ErrorCode::ContentUnavailable,
            SourceError::Enumeration(_) => ErrorCode::InternalError,
        }
    }
}
