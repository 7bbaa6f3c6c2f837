//! On-device capability provider errors.

use thiserror::Error;

use super::ErrorCode;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Capability not available: {0}")]
    NotAvailable(String),

    #[error("Model unavailable on this device: {0}")]
    ModelUnavailable(String),

    #[error("A fresh user action is required before the model can be downloaded")]
    UserActivationRequired,

    #[error("Model download timed out after {0} seconds")]
    DownloadTimeout(u64),

    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("AI call failed: {0}")]
    Failed(String),
}

impl CapabilityError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CapabilityError::UserActivationRequired => ErrorCode::UserActivationRequired,
            CapabilityError::ModelUnavailable(_) => ErrorCode::ModelUnavailable,
            CapabilityError::DownloadTimeout(_) => ErrorCode::DownloadTimeout,
            CapabilityError::Timeout { .. } => ErrorCode::PromptTimeout,
            CapabilityError::NotAvailable(_)
            | CapabilityError::Stream(_)
            | CapabilityError::Failed(_) => ErrorCode::AiError,
        }
    }

    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        CapabilityError::Timeout {
            operation: operation.into(),
            seconds: duration.as_secs(),
        }
    }
}
