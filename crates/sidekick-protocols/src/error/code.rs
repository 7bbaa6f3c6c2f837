//! Stable caller-facing error codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Machine-readable code carried by every `error` event sent to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    ContextError,
    SourceUnavailable,
    ContentUnavailable,
    UserActivationRequired,
    ModelUnavailable,
    DownloadTimeout,
    PromptTimeout,
    StreamDisconnected,
    AiError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::ContextError => "context_error",
            ErrorCode::SourceUnavailable => "source_unavailable",
            ErrorCode::ContentUnavailable => "content_unavailable",
            ErrorCode::UserActivationRequired => "user_activation_required",
            ErrorCode::ModelUnavailable => "model_unavailable",
            ErrorCode::DownloadTimeout => "download_timeout",
            ErrorCode::PromptTimeout => "prompt_timeout",
            ErrorCode::StreamDisconnected => "stream_disconnected",
            ErrorCode::AiError => "ai_error",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
