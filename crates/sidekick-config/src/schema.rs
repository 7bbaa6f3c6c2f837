//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    /// Seed values for the read-only settings store.
    #[serde(default)]
    pub settings: HashMap<String, Value>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Settings table with built-in defaults filled in for missing keys.
    pub fn settings_with_defaults(&self) -> HashMap<String, Value> {
        let mut merged = default_settings();
        for (key, value) in &self.settings {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

fn default_settings() -> HashMap<String, Value> {
    [
        ("responseLanguage", "auto"),
        ("inputTranslationTargetLanguage", "en"),
        ("summaryType", "key-points"),
        ("summaryLength", "medium"),
        ("summaryFormat", "markdown"),
        (
            "rewritePrompt",
            "Please rewrite the following text to make it clearer and more concise:",
        ),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
    .collect()
}

/// Hidden host lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Age after which the host is torn down and recreated.
    #[serde(default = "default_host_max_age_secs")]
    pub max_age_secs: u64,

    #[serde(default = "default_create_timeout_ms")]
    pub create_timeout_ms: u64,

    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
}

impl HostConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_millis(self.create_timeout_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_host_max_age_secs(),
            create_timeout_ms: default_create_timeout_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
        }
    }
}

fn default_host_max_age_secs() -> u64 {
    180
}

fn default_create_timeout_ms() -> u64 {
    10_000
}

fn default_health_check_timeout_ms() -> u64 {
    2_500
}

/// Conversational session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Age after which a cached session is released and replaced.
    #[serde(default = "default_session_max_age_secs")]
    pub max_age_secs: u64,

    #[serde(default = "default_prompt_timeout_secs")]
    pub prompt_timeout_secs: u64,

    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_session_max_age_secs(),
            prompt_timeout_secs: default_prompt_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_session_max_age_secs() -> u64 {
    120
}

fn default_prompt_timeout_secs() -> u64 {
    60
}

fn default_download_timeout_secs() -> u64 {
    300
}

/// Synthetic chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Maximum characters coalesced into one synthetic chunk.
    #[serde(default = "default_chunk_budget")]
    pub chunk_budget: usize,

    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl StreamConfig {
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_budget: default_chunk_budget(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_chunk_budget() -> usize {
    120
}

fn default_chunk_delay_ms() -> u64 {
    40
}

/// Chat routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum characters kept from one mentioned source.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    #[serde(default = "default_system_prompt")]
    pub default_system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
            default_system_prompt: default_system_prompt(),
        }
    }
}

fn default_max_context_chars() -> usize {
    12_000
}

fn default_system_prompt() -> String {
    [
        "# Role: Helpful Browser Companion",
        "",
        "You live inside a browser sidebar and help users with research, reading, and writing tasks.",
        "Provide concise, well-structured answers and use bullet points or paragraphs when appropriate.",
        "When website context is supplied, ground your response in that information and mention the source naturally.",
        "If the context does not contain an answer, say so and offer useful guidance.",
        "Avoid fabricating details and keep a friendly, professional tone.",
    ]
    .join("\n")
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rotating log files; console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Emit JSON lines into the log file.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
