//! Deterministic [`CapabilityProvider`] used by the stdio harness.
//!
//! It has no model behind it: sessions echo the last line of the prompt back
//! word by word, translation tags text with the target code and summaries
//! keep the first sentence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use tracing::debug;

use sidekick_protocols::{
    Availability, CapabilityError, CapabilityProvider, LanguageSession, SessionHandle,
    SessionOptions, StreamOutput, StreamValue, SummaryOptions,
};

/// Echo provider. `word_delay` paces streamed words.
#[derive(Debug, Default)]
pub struct EchoProvider {
    word_delay: Duration,
    sessions: AtomicU64,
}

impl EchoProvider {
    pub fn new(word_delay: Duration) -> Self {
        Self {
            word_delay,
            sessions: AtomicU64::new(0),
        }
    }
}

fn echo_reply(prompt: &str) -> String {
    let last = prompt
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    format!("You said: {}", last)
}

fn looks_chinese(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

struct EchoSession {
    id: String,
    word_delay: Duration,
}

#[async_trait]
impl LanguageSession for EchoSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn prompt(&self, text: &str) -> Result<String, CapabilityError> {
        Ok(echo_reply(text))
    }

    async fn prompt_streaming(&self, text: &str) -> Result<StreamOutput, CapabilityError> {
        let reply = echo_reply(text);
        let words: Vec<String> = reply
            .split_inclusive(' ')
            .map(str::to_string)
            .collect();
        let delay = self.word_delay;
        let fragments = stream::iter(words).then(move |word| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(StreamValue::Delta(word))
        });
        Ok(StreamOutput::Fragments(Box::pin(fragments)))
    }

    fn release(&self) {
        debug!(session_id = %self.id, "Echo session released");
    }
}

#[async_trait]
impl CapabilityProvider for EchoProvider {
    async fn model_availability(&self) -> Result<Availability, CapabilityError> {
        Ok(Availability::Available)
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<SessionHandle, CapabilityError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("echo-{}", n);
        debug!(session_id = %id, output_language = %options.output_language, "Echo session created");
        Ok(Arc::new(EchoSession {
            id,
            word_delay: self.word_delay,
        }))
    }

    async fn detect_language(&self, text: &str) -> Result<Option<String>, CapabilityError> {
        Ok(Some(if looks_chinese(text) { "zh" } else { "en" }.to_string()))
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
        Ok(format!("[{}] {}", target, text))
    }

    async fn summarizer_availability(&self) -> Result<Availability, CapabilityError> {
        Ok(Availability::Available)
    }

    async fn summarize(
        &self,
        text: &str,
        _options: &SummaryOptions,
    ) -> Result<String, CapabilityError> {
        let first = text
            .split_inclusive(['.', '!', '?', '。'])
            .next()
            .unwrap_or_default()
            .trim();
        Ok(first.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streams_last_prompt_line() {
        let provider = EchoProvider::default();
        let session = provider
            .create_session(SessionOptions::default())
            .await
            .unwrap();

        let output = session
            .prompt_streaming("User message:\nhello there")
            .await
            .unwrap();
        let StreamOutput::Fragments(stream) = output else {
            panic!("expected fragments");
        };
        let words: Vec<StreamValue> = stream.map(|item| item.unwrap()).collect().await;

        assert_eq!(
            words,
            vec![
                StreamValue::Delta("You ".to_string()),
                StreamValue::Delta("said: ".to_string()),
                StreamValue::Delta("hello ".to_string()),
                StreamValue::Delta("there".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_detects_chinese() {
        let provider = EchoProvider::default();
        assert_eq!(
            provider.detect_language("你好").await.unwrap().as_deref(),
            Some("zh")
        );
        assert_eq!(
            provider.detect_language("hi").await.unwrap().as_deref(),
            Some("en")
        );
    }

    #[tokio::test]
    async fn test_summary_keeps_first_sentence() {
        let provider = EchoProvider::default();
        let summary = provider
            .summarize("First point. Second point.", &SummaryOptions::default())
            .await
            .unwrap();
        assert_eq!(summary, "First point.");
    }
}
