//! Relay errors.

use thiserror::Error;

use sidekick_protocols::{CapabilityError, ChannelError, ErrorCode};

/// Failure while relaying one chat request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The caller-facing port is gone. Only used for local cleanup; it is
    /// never reported over the port that just closed.
    #[error("Port disconnected")]
    ChannelClosed,

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

impl RelayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::ChannelClosed => ErrorCode::StreamDisconnected,
            RelayError::Capability(err) => err.code(),
        }
    }

    pub fn is_channel_closed(&self) -> bool {
        matches!(self, RelayError::ChannelClosed)
    }
}

impl From<ChannelError> for RelayError {
    fn from(_: ChannelError) -> Self {
        RelayError::ChannelClosed
    }
}
