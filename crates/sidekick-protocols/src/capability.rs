//! On-device capability provider protocol.
//!
//! The provider exposes translation, summarization, language detection and a
//! stateful conversational model. It is only reachable from inside the DOM
//! host; everything here is an interface.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::CapabilityError;
use crate::types::{Availability, SessionOptions, SummaryOptions};

/// One value yielded by an incremental model stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamValue {
    Text(String),
    Delta(String),
    Parts(Vec<StreamValue>),
    Empty,
}

/// Stream of structured fragments.
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<StreamValue, CapabilityError>> + Send>>;

/// Stream of raw response-body bytes (UTF-8, arbitrarily split).
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CapabilityError>> + Send>>;

/// Every shape an incremental prompt call may produce.
pub enum StreamOutput {
    /// The call succeeded without any observable output.
    Empty,
    /// The whole answer at once.
    Text(String),
    /// Incremental structured fragments.
    Fragments(FragmentStream),
    /// A nested response body.
    Body(ByteStream),
}

impl std::fmt::Debug for StreamOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamOutput::Empty => f.write_str("Empty"),
            StreamOutput::Text(text) => f.debug_tuple("Text").field(text).finish(),
            StreamOutput::Fragments(_) => f.write_str("Fragments(..)"),
            StreamOutput::Body(_) => f.write_str("Body(..)"),
        }
    }
}

/// A stateful conversational session bound to one system prompt.
///
/// Sessions hold model memory until [`LanguageSession::release`] is called.
#[async_trait]
pub trait LanguageSession: Send + Sync {
    /// Opaque handle identifier.
    fn id(&self) -> &str;

    /// Whether [`LanguageSession::prompt_streaming`] is supported.
    fn supports_streaming(&self) -> bool {
        true
    }

    /// Single-shot prompt.
    async fn prompt(&self, text: &str) -> Result<String, CapabilityError>;

    /// Incremental prompt.
    async fn prompt_streaming(&self, text: &str) -> Result<StreamOutput, CapabilityError>;

    /// Free the underlying model resources.
    fn release(&self);
}

/// Shared handle to a live session.
pub type SessionHandle = Arc<dyn LanguageSession>;

/// The on-device capability provider.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Availability of the conversational model.
    async fn model_availability(&self) -> Result<Availability, CapabilityError>;

    /// Create a conversational session. May require a recent user action when
    /// `options.download` starts a resource download.
    async fn create_session(&self, options: SessionOptions)
        -> Result<SessionHandle, CapabilityError>;

    /// Detect the dominant language of `text`, if a detector is present.
    async fn detect_language(&self, text: &str) -> Result<Option<String>, CapabilityError>;

    async fn translator_availability(
        &self,
        source: &str,
        target: &str,
    ) -> Result<Availability, CapabilityError>;

    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, CapabilityError>;

    async fn summarizer_availability(&self) -> Result<Availability, CapabilityError>;

    async fn summarize(
        &self,
        text: &str,
        options: &SummaryOptions,
    ) -> Result<String, CapabilityError>;
}
