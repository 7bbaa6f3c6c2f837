//! Browser-side collaborators: content sources, tab listing and settings.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SourceError;
use crate::types::{PageContext, TabInfo};

/// Fetches the text content of a referenced source.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_context(&self, source_id: i64) -> Result<PageContext, SourceError>;
}

/// Enumerates mentionable tabs.
#[async_trait]
pub trait TabDirectory: Send + Sync {
    /// List tabs of `window_id`, or of the current window when `None`.
    async fn list_tabs(&self, window_id: Option<i64>) -> Result<Vec<TabInfo>, SourceError>;
}

/// Read-only view of user preferences.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_values(&self, keys: &[&str]) -> HashMap<String, Value>;

    async fn get_string(&self, key: &str) -> Option<String> {
        self.get_values(&[key])
            .await
            .remove(key)
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|value| !value.is_empty())
    }
}
