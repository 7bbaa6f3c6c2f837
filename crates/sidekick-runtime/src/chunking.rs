//! Synthetic chunking.
//!
//! When no real incremental output was observed (single-shot fallback or
//! post-hoc translation) the final text is replayed as sentence-sized chunks
//! so callers always see `chunk+` followed by `done`.

use std::time::Duration;

use sidekick_config::StreamConfig;

use crate::emitter::EventEmitter;
use crate::error::RelayError;

const SENTENCE_TERMINATORS: [char; 7] = ['。', '！', '？', '.', '!', '?', '\n'];

/// Split `text` after sentence terminators and coalesce short sentences into
/// segments of at most `budget` characters. A single sentence longer than the
/// budget stays whole. Returns `[text]` if nothing survives trimming.
pub fn split_text_for_streaming(text: &str, budget: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut buffer = String::new();

    for sentence in text.split_inclusive(SENTENCE_TERMINATORS) {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }

        let joined_len = if buffer.is_empty() {
            trimmed.chars().count()
        } else {
            buffer.chars().count() + 1 + trimmed.chars().count()
        };

        if joined_len > budget {
            if !buffer.is_empty() {
                parts.push(std::mem::take(&mut buffer));
            }
            buffer.push_str(trimmed);
        } else {
            if !buffer.is_empty() {
                buffer.push(' ');
            }
            buffer.push_str(trimmed);
        }
    }

    if !buffer.is_empty() {
        parts.push(buffer);
    }

    if parts.is_empty() {
        vec![text.to_string()]
    } else {
        parts
    }
}

/// Replays finished text as paced chunks followed by `done`.
#[derive(Debug, Clone)]
pub struct SyntheticChunker {
    budget: usize,
    delay: Duration,
}

impl SyntheticChunker {
    pub fn new(budget: usize, delay: Duration) -> Self {
        Self { budget, delay }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.chunk_budget, config.chunk_delay())
    }

    /// Emit `text` as chunks, pausing between them, then `done(text)`.
    /// Empty text produces a bare `done("")`.
    pub async fn emit(&self, text: &str, emitter: &EventEmitter) -> Result<(), RelayError> {
        if text.is_empty() {
            return emitter.done("");
        }

        for segment in split_text_for_streaming(text, self.budget) {
            emitter.chunk(segment)?;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        emitter.done(text)
    }
}

impl Default for SyntheticChunker {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_protocols::{port_pair, WorkerCommand, WorkerEvent};

    #[test]
    fn test_split_coalesces_short_sentences() {
        let parts = split_text_for_streaming("One. Two. Three.", 120);
        assert_eq!(parts, vec!["One. Two. Three.".to_string()]);
    }

    #[test]
    fn test_split_respects_budget() {
        let parts = split_text_for_streaming("Alpha beta. Gamma delta. Epsilon.", 12);
        assert_eq!(
            parts,
            vec![
                "Alpha beta.".to_string(),
                "Gamma delta.".to_string(),
                "Epsilon.".to_string()
            ]
        );
    }

    #[test]
    fn test_split_handles_cjk_punctuation() {
        let parts = split_text_for_streaming("你好。今天怎么样？很好！", 3);
        assert_eq!(parts, vec!["你好。", "今天怎么样？", "很好！"]);
    }

    #[test]
    fn test_split_on_newlines() {
        let parts = split_text_for_streaming("line one\nline two", 8);
        assert_eq!(parts, vec!["line one", "line two"]);
    }

    #[test]
    fn test_split_long_sentence_kept_whole() {
        let sentence = "x".repeat(300);
        let parts = split_text_for_streaming(&sentence, 120);
        assert_eq!(parts, vec![sentence]);
    }

    #[test]
    fn test_split_whitespace_only_returns_input() {
        assert_eq!(split_text_for_streaming("   ", 120), vec!["   ".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_chunks_then_done() {
        let (mut coordinator, host) = port_pair::<WorkerCommand, WorkerEvent>("ai-chat-stream");
        let emitter = EventEmitter::new("r1", host.sender.clone());
        let chunker = SyntheticChunker::new(12, Duration::from_millis(40));

        chunker
            .emit("Alpha beta. Gamma delta.", &emitter)
            .await
            .unwrap();

        let mut chunks = Vec::new();
        let final_text = loop {
            match coordinator.recv().await.unwrap() {
                WorkerEvent::Chunk { chunk, .. } => chunks.push(chunk),
                WorkerEvent::Done { final_text, .. } => break final_text,
                other => panic!("unexpected event: {:?}", other),
            }
        };
        assert_eq!(chunks, vec!["Alpha beta.", "Gamma delta."]);
        assert_eq!(final_text, "Alpha beta. Gamma delta.");
    }

    #[tokio::test]
    async fn test_emit_empty_is_bare_done() {
        let (mut coordinator, host) = port_pair::<WorkerCommand, WorkerEvent>("ai-chat-stream");
        let emitter = EventEmitter::new("r1", host.sender.clone());

        SyntheticChunker::default().emit("", &emitter).await.unwrap();

        assert_eq!(
            coordinator.recv().await,
            Some(WorkerEvent::Done {
                request_id: "r1".to_string(),
                final_text: String::new()
            })
        );
        assert_eq!(emitter.chunks_sent(), 0);
    }
}
