//! Streaming relay.
//!
//! Drives a session to produce an answer and delivers it as `chunk*`
//! followed by exactly one `done`. Each [`StreamOutput`] shape has its own
//! normalization into text fragments. When no real incremental output is
//! observed, or the answer must be translated afterwards, the final text is
//! replayed through the [`SyntheticChunker`].

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::timeout;
use tracing::{debug, warn};

use sidekick_config::{SessionConfig, StreamConfig};
use sidekick_protocols::{
    ByteStream, CapabilityError, CapabilityProvider, FragmentStream, SessionHandle, StreamOutput,
    StreamValue,
};

use crate::chunking::SyntheticChunker;
use crate::emitter::EventEmitter;
use crate::error::RelayError;
use crate::language::ensure_result_language;

#[cfg(test)]
#[path = "streaming_tests.rs"]
mod tests;

/// Per-call relay switches.
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Hold chunks back and translate the whole answer at the end.
    pub needs_translation: bool,
    /// Target language for post-hoc translation.
    pub desired_language: Option<String>,
    /// Go straight to the single-shot prompt path.
    pub skip_streaming: bool,
}

/// Flatten one stream value into text.
pub fn fragment_text(value: &StreamValue) -> String {
    match value {
        StreamValue::Text(text) | StreamValue::Delta(text) => text.clone(),
        StreamValue::Parts(parts) => parts.iter().map(fragment_text).collect(),
        StreamValue::Empty => String::new(),
    }
}

/// Incremental UTF-8 decoder for body streams split at arbitrary bytes.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of the buffered input as forms complete characters.
    /// Invalid sequences become U+FFFD; a trailing partial character is kept.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever remains at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Aggregates fragments and forwards them unless translation is pending.
struct FragmentSink<'a> {
    emitter: &'a EventEmitter,
    forward: bool,
    aggregated: String,
    count: usize,
}

impl FragmentSink<'_> {
    fn push(&mut self, fragment: &str) -> Result<(), RelayError> {
        if fragment.is_empty() {
            return Ok(());
        }
        self.count += 1;
        self.aggregated.push_str(fragment);
        if self.forward {
            self.emitter.chunk(fragment)?;
        }
        Ok(())
    }
}

/// Normalizes capability output into relay events.
pub struct StreamRelay {
    provider: Arc<dyn CapabilityProvider>,
    prompt_timeout: Duration,
    chunker: SyntheticChunker,
}

impl StreamRelay {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        prompt_timeout: Duration,
        chunker: SyntheticChunker,
    ) -> Self {
        Self {
            provider,
            prompt_timeout,
            chunker,
        }
    }

    pub fn from_config(
        provider: Arc<dyn CapabilityProvider>,
        session: &SessionConfig,
        stream: &StreamConfig,
    ) -> Self {
        Self::new(
            provider,
            session.prompt_timeout(),
            SyntheticChunker::from_config(stream),
        )
    }

    /// Produce the answer to `prompt` and deliver it through `emitter`.
    ///
    /// On success exactly one `done` has been posted and its text is
    /// returned. On error no terminal event has been posted; the caller
    /// decides whether to retry or report.
    pub async fn stream_result(
        &self,
        session: &SessionHandle,
        prompt: &str,
        emitter: &EventEmitter,
        options: &RelayOptions,
    ) -> Result<String, RelayError> {
        let mut sink = FragmentSink {
            emitter,
            forward: !options.needs_translation,
            aggregated: String::new(),
            count: 0,
        };

        if !options.skip_streaming && session.supports_streaming() {
            match self.consume_streaming(session, prompt, &mut sink).await {
                Ok(true) => {}
                Ok(false) => {
                    if sink.count == 0 {
                        debug!("Stream produced no output, falling back to single prompt");
                        sink.aggregated = self.prompt_once(session, prompt).await?;
                    }
                }
                Err(RelayError::ChannelClosed) => return Err(RelayError::ChannelClosed),
                Err(RelayError::Capability(e)) => {
                    if sink.count > 0 {
                        return Err(e.into());
                    }
                    warn!("Prompt streaming failed, falling back to single response: {}", e);
                    sink.aggregated = self.prompt_once(session, prompt).await?;
                }
            }
        } else {
            debug!("Using single prompt (streaming not available or skipped)");
            sink.aggregated = self.prompt_once(session, prompt).await?;
        }

        let FragmentSink {
            aggregated, count, ..
        } = sink;

        if options.needs_translation {
            let translated = self
                .translate_or_keep(&aggregated, options.desired_language.as_deref())
                .await;
            self.chunker.emit(&translated, emitter).await?;
            return Ok(translated);
        }

        if count == 0 {
            self.chunker.emit(&aggregated, emitter).await?;
            return Ok(aggregated);
        }

        emitter.done(aggregated.clone())?;
        Ok(aggregated)
    }

    /// Returns `Ok(false)` when the stream completed without any output.
    async fn consume_streaming(
        &self,
        session: &SessionHandle,
        prompt: &str,
        sink: &mut FragmentSink<'_>,
    ) -> Result<bool, RelayError> {
        let output = timeout(self.prompt_timeout, session.prompt_streaming(prompt))
            .await
            .map_err(|_| CapabilityError::timeout("Prompt streaming", self.prompt_timeout))??;

        match output {
            StreamOutput::Empty => Ok(false),
            StreamOutput::Text(text) => {
                sink.push(&text)?;
                Ok(!text.is_empty())
            }
            StreamOutput::Fragments(stream) => {
                self.drain_fragments(stream, sink).await?;
                Ok(sink.count > 0)
            }
            StreamOutput::Body(stream) => {
                self.drain_body(stream, sink).await?;
                Ok(sink.count > 0)
            }
        }
    }

    async fn drain_fragments(
        &self,
        mut stream: FragmentStream,
        sink: &mut FragmentSink<'_>,
    ) -> Result<(), RelayError> {
        while let Some(item) = self.next_item(&mut stream).await? {
            sink.push(&fragment_text(&item?))?;
        }
        Ok(())
    }

    async fn drain_body(
        &self,
        mut stream: ByteStream,
        sink: &mut FragmentSink<'_>,
    ) -> Result<(), RelayError> {
        let mut decoder = Utf8Decoder::new();
        while let Some(item) = self.next_item(&mut stream).await? {
            sink.push(&decoder.push(&item?))?;
        }
        sink.push(&decoder.finish())
    }

    /// Next stream item, bounded by the prompt timeout between reads.
    async fn next_item<S>(&self, stream: &mut S) -> Result<Option<S::Item>, CapabilityError>
    where
        S: futures::Stream + Unpin,
    {
        timeout(self.prompt_timeout, stream.next())
            .await
            .map_err(|_| CapabilityError::timeout("Prompt streaming", self.prompt_timeout))
    }

    async fn prompt_once(
        &self,
        session: &SessionHandle,
        prompt: &str,
    ) -> Result<String, CapabilityError> {
        timeout(self.prompt_timeout, session.prompt(prompt))
            .await
            .map_err(|_| CapabilityError::timeout("Prompt call", self.prompt_timeout))?
    }

    async fn translate_or_keep(&self, text: &str, desired: Option<&str>) -> String {
        let translation = timeout(
            self.prompt_timeout,
            ensure_result_language(self.provider.as_ref(), text, desired),
        )
        .await;

        match translation {
            Ok(Ok(translated)) => translated,
            Ok(Err(e)) => {
                warn!("Post-translation failed, falling back to original text: {}", e);
                text.to_string()
            }
            Err(_) => {
                warn!("Post-translation timed out, falling back to original text");
                text.to_string()
            }
        }
    }
}
