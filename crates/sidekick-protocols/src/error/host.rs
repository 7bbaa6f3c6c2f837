//! Host lifecycle errors.

use thiserror::Error;

use super::ErrorCode;

/// Failure to make the hidden DOM host ready, or to reach it.
///
/// `Clone` so that every caller awaiting a shared creation attempt observes
/// the same outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("Host creation failed: {0}")]
    CreationFailed(String),

    #[error("Host creation timed out after {0} ms")]
    CreationTimeout(u64),

    #[error("Host health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Host is not running")]
    NotRunning,

    #[error("Host request failed: {0}")]
    RequestFailed(String),
}

impl HostError {
    /// All host failures reach the caller as a retryable `context_error`.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ContextError
    }
}
