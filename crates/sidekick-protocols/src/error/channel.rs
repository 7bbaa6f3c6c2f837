//! Transport errors for duplex ports.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel disconnected")]
    Disconnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl ChannelError {
    /// Transport failures only ever surface to a still-live caller as a lost stream.
    pub fn code(&self) -> super::ErrorCode {
        super::ErrorCode::StreamDisconnected
    }
}
