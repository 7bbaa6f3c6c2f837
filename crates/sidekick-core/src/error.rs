//! Coordinator-side request errors.

use thiserror::Error;

use sidekick_protocols::{ChannelError, ErrorCode, HostError, SourceError};

/// Failure to start or relay one chat request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("Stream disconnected: {0}")]
    Channel(#[from] ChannelError),
}

impl ChatError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ChatError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            ChatError::Source(err) => err.code(),
            ChatError::Host(err) => err.code(),
            ChatError::Channel(err) => err.code(),
        }
    }
}
