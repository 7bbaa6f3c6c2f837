//! Shared data types exchanged between callers, the coordinator and the host.

use serde::{Deserialize, Serialize};

/// Speaker of a previous conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One previous turn of the sidebar conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Page text the user quoted into the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRef {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// A reference to an external content source (a browser tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub tab_id: i64,
}

/// Chat payload as submitted by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default)]
    pub quotes: Vec<QuoteRef>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub force_download: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Captured content of a mentioned source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub source_id: i64,
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Chat payload forwarded to the host once mentions are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostChatPayload {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default)]
    pub contexts: Vec<PageContext>,
    #[serde(default)]
    pub quotes: Vec<QuoteRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_language: Option<String>,
    pub system_prompt: String,
    #[serde(default)]
    pub force_download: bool,
}

/// A browser tab that can be mentioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: i64,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub favicon: String,
    pub window_id: i64,
    #[serde(default)]
    pub active: bool,
}

/// Origin of a quote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSource {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Quoted page text destined for the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotePayload {
    pub quote_id: String,
    pub text: String,
    pub source: QuoteSource,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Options for creating a conversational session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    pub system_prompt: String,
    /// Language the model is instructed to emit.
    pub output_language: String,
    /// Whether a one-time resource download may be started.
    #[serde(default)]
    pub download: bool,
}

/// Availability of an on-device capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Downloadable,
    Downloading,
    Unavailable,
}

impl Availability {
    pub fn needs_download(&self) -> bool {
        matches!(self, Availability::Downloadable | Availability::Downloading)
    }
}

/// Summarizer options read from settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryOptions {
    pub kind: String,
    pub length: String,
    pub format: String,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            kind: "key-points".to_string(),
            length: "medium".to_string(),
            format: "markdown".to_string(),
        }
    }
}
