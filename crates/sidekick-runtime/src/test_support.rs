//! Hand-written capability doubles shared by the runtime's unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::Mutex;

use sidekick_protocols::{
    Availability, CapabilityError, CapabilityProvider, LanguageSession, SessionHandle,
    SessionOptions, StreamOutput, StreamValue, SummaryOptions,
};

/// How sessions produced by [`MockProvider`] answer.
#[derive(Debug, Clone)]
pub enum SessionMode {
    /// Structured fragments, then end of stream.
    Fragments(Vec<StreamValue>),
    /// Raw body bytes, split as given.
    Body(Vec<Vec<u8>>),
    /// Whole reply as `StreamOutput::Text`.
    Text,
    /// Streaming yields nothing; `prompt` returns the reply.
    EmptyStream,
    /// Streaming unsupported; `prompt` returns the reply.
    NoStreaming,
    /// `prompt_streaming` fails; `prompt` returns the reply.
    StreamFails,
    /// Emits the fragments, then the stream errors.
    FailAfter(Vec<String>),
    /// Every call fails.
    AlwaysFails,
    /// Calls never complete.
    Hang,
}

pub struct MockSession {
    id: String,
    reply: String,
    mode: SessionMode,
    log: Arc<Mutex<Vec<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LanguageSession for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_streaming(&self) -> bool {
        !matches!(self.mode, SessionMode::NoStreaming)
    }

    async fn prompt(&self, text: &str) -> Result<String, CapabilityError> {
        self.prompts.lock().push(text.to_string());
        self.log.lock().push(format!("prompt:{}", self.id));
        match self.mode {
            SessionMode::AlwaysFails => Err(CapabilityError::Failed("model crashed".to_string())),
            SessionMode::Hang => futures::future::pending().await,
            _ => Ok(self.reply.clone()),
        }
    }

    async fn prompt_streaming(&self, text: &str) -> Result<StreamOutput, CapabilityError> {
        self.prompts.lock().push(text.to_string());
        self.log.lock().push(format!("stream:{}", self.id));
        match &self.mode {
            SessionMode::Fragments(values) => {
                let items: Vec<Result<StreamValue, CapabilityError>> =
                    values.iter().cloned().map(Ok).collect();
                Ok(StreamOutput::Fragments(Box::pin(stream::iter(items))))
            }
            SessionMode::Body(parts) => {
                let items: Vec<Result<Bytes, CapabilityError>> = parts
                    .iter()
                    .map(|part| Ok(Bytes::from(part.clone())))
                    .collect();
                Ok(StreamOutput::Body(Box::pin(stream::iter(items))))
            }
            SessionMode::Text => Ok(StreamOutput::Text(self.reply.clone())),
            SessionMode::Hang => futures::future::pending().await,
            SessionMode::EmptyStream => Ok(StreamOutput::Empty),
            SessionMode::NoStreaming | SessionMode::StreamFails | SessionMode::AlwaysFails => {
                Err(CapabilityError::Stream("streaming broke".to_string()))
            }
            SessionMode::FailAfter(chunks) => {
                let mut items: Vec<Result<StreamValue, CapabilityError>> = chunks
                    .iter()
                    .map(|chunk| Ok(StreamValue::Text(chunk.clone())))
                    .collect();
                items.push(Err(CapabilityError::Stream("reader aborted".to_string())));
                Ok(StreamOutput::Fragments(Box::pin(stream::iter(items))))
            }
        }
    }

    fn release(&self) {
        self.log.lock().push(format!("release:{}", self.id));
    }
}

pub struct MockProvider {
    pub availability: Mutex<Availability>,
    pub mode: Mutex<SessionMode>,
    pub reply: Mutex<String>,
    pub detected: Mutex<Option<String>>,
    pub translate_fails: AtomicBool,
    pub creates: AtomicUsize,
    pub translations: AtomicUsize,
    /// The next this-many sessions are created in [`SessionMode::AlwaysFails`].
    pub failing_sessions: AtomicUsize,
    pub log: Arc<Mutex<Vec<String>>>,
    pub options: Mutex<Vec<SessionOptions>>,
}

impl MockProvider {
    pub fn new(mode: SessionMode, reply: &str) -> Self {
        Self {
            availability: Mutex::new(Availability::Available),
            mode: Mutex::new(mode),
            reply: Mutex::new(reply.to_string()),
            detected: Mutex::new(Some("en".to_string())),
            translate_fails: AtomicBool::new(false),
            creates: AtomicUsize::new(0),
            translations: AtomicUsize::new(0),
            failing_sessions: AtomicUsize::new(0),
            log: Arc::new(Mutex::new(Vec::new())),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn arc(mode: SessionMode, reply: &str) -> Arc<Self> {
        Arc::new(Self::new(mode, reply))
    }

    pub fn set_mode(&self, mode: SessionMode) {
        *self.mode.lock() = mode;
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProvider for MockProvider {
    async fn model_availability(&self) -> Result<Availability, CapabilityError> {
        Ok(*self.availability.lock())
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<SessionHandle, CapabilityError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("session-{}", n);
        self.log.lock().push(format!("create:{}", id));
        self.options.lock().push(options);
        let failing = self
            .failing_sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let mode = if failing {
            SessionMode::AlwaysFails
        } else {
            self.mode.lock().clone()
        };
        Ok(Arc::new(MockSession {
            id,
            reply: self.reply.lock().clone(),
            mode,
            log: self.log.clone(),
            prompts: Mutex::new(Vec::new()),
        }))
    }

    async fn detect_language(&self, _text: &str) -> Result<Option<String>, CapabilityError> {
        Ok(self.detected.lock().clone())
    }

    async fn translator_availability(
        &self,
        _source: &str,
        _target: &str,
    ) -> Result<Availability, CapabilityError> {
        Ok(Availability::Available)
    }

    async fn translate(
        &self,
        text: &str,
        _source: &str,
        target: &str,
    ) -> Result<String, CapabilityError> {
        self.translations.fetch_add(1, Ordering::SeqCst);
        if self.translate_fails.load(Ordering::SeqCst) {
            return Err(CapabilityError::Failed("translator crashed".to_string()));
        }
        Ok(format!("[{}] {}", target, text))
    }

    async fn summarizer_availability(&self) -> Result<Availability, CapabilityError> {
        Ok(*self.availability.lock())
    }

    async fn summarize(
        &self,
        text: &str,
        options: &SummaryOptions,
    ) -> Result<String, CapabilityError> {
        Ok(format!("{} summary of: {}", options.kind, text))
    }
}
