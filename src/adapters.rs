//! Browser collaborators for the stdio harness.

use async_trait::async_trait;

use sidekick_protocols::{ContentSource, PageContext, SourceError, TabDirectory, TabInfo};

/// No browser is attached: every mention fails and no tabs exist.
pub(crate) struct DetachedBrowser;

#[async_trait]
impl ContentSource for DetachedBrowser {
    async fn fetch_context(&self, source_id: i64) -> Result<PageContext, SourceError> {
        Err(SourceError::SourceUnavailable(source_id))
    }
}

#[async_trait]
impl TabDirectory for DetachedBrowser {
    async fn list_tabs(&self, _window_id: Option<i64>) -> Result<Vec<TabInfo>, SourceError> {
        Ok(Vec::new())
    }
}
