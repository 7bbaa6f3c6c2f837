//! Mention context collection and tab listing helpers.

use tracing::{debug, warn};

use sidekick_protocols::{ContentSource, Mention, PageContext, SourceError, TabInfo};

const INTERNAL_URL_PREFIXES: &[&str] = &["chrome://", "chrome-extension://"];

/// Cut `text` to at most `max_chars` characters, marking the cut with `\n…`.
pub fn truncate_context(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Fetch every mentioned source in order. The first failure aborts.
pub async fn collect_mention_contexts(
    source: &dyn ContentSource,
    mentions: &[Mention],
    max_chars: usize,
) -> Result<Vec<PageContext>, SourceError> {
    let mut contexts = Vec::with_capacity(mentions.len());
    for mention in mentions {
        let mut context = source.fetch_context(mention.tab_id).await.map_err(|e| {
            warn!(tab_id = mention.tab_id, "Failed to fetch mention context: {}", e);
            e
        })?;
        context.content = truncate_context(&context.content, max_chars);
        debug!(tab_id = mention.tab_id, chars = context.content.chars().count(), "Collected mention context");
        contexts.push(context);
    }
    Ok(contexts)
}

/// Whether a tab may be offered for mentioning.
pub fn is_mentionable(url: &str) -> bool {
    !INTERNAL_URL_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
}

/// Drop browser-internal tabs and fill in missing titles.
pub fn mentionable_tabs(tabs: Vec<TabInfo>) -> Vec<TabInfo> {
    tabs.into_iter()
        .filter(|tab| is_mentionable(&tab.url))
        .map(|mut tab| {
            if tab.title.is_empty() {
                tab.title = if tab.url.is_empty() {
                    "Untitled".to_string()
                } else {
                    tab.url.clone()
                };
            }
            tab
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Pages;

    #[async_trait]
    impl ContentSource for Pages {
        async fn fetch_context(&self, source_id: i64) -> Result<PageContext, SourceError> {
            match source_id {
                1 => Ok(PageContext {
                    source_id,
                    title: "Docs".to_string(),
                    url: "https://docs.test".to_string(),
                    content: "abcdefghij".to_string(),
                }),
                2 => Err(SourceError::ContentUnavailable(2)),
                _ => Err(SourceError::SourceUnavailable(source_id)),
            }
        }
    }

    fn tab(id: i64, title: &str, url: &str) -> TabInfo {
        TabInfo {
            id,
            title: title.to_string(),
            url: url.to_string(),
            favicon: String::new(),
            window_id: 1,
            active: false,
        }
    }

    #[test]
    fn test_truncate_context() {
        assert_eq!(truncate_context("short", 10), "short");
        assert_eq!(truncate_context("exactly", 7), "exactly");
        assert_eq!(truncate_context("你好世界", 2), "你好\n…");
    }

    #[tokio::test]
    async fn test_collect_truncates_content() {
        let contexts = collect_mention_contexts(&Pages, &[Mention { tab_id: 1 }], 4)
            .await
            .unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].content, "abcd\n…");
    }

    #[tokio::test]
    async fn test_collect_stops_at_first_failure() {
        let err = collect_mention_contexts(
            &Pages,
            &[Mention { tab_id: 1 }, Mention { tab_id: 2 }, Mention { tab_id: 9 }],
            100,
        )
        .await
        .unwrap_err();
        assert_eq!(err, SourceError::ContentUnavailable(2));
    }

    #[test]
    fn test_mentionable_tabs() {
        let tabs = mentionable_tabs(vec![
            tab(1, "News", "https://news.test"),
            tab(2, "Settings", "chrome://settings"),
            tab(3, "", "chrome-extension://abc/sidebar.html"),
            tab(4, "", "https://blank.test"),
            tab(5, "", ""),
        ]);

        let titles: Vec<&str> = tabs.iter().map(|tab| tab.title.as_str()).collect();
        assert_eq!(titles, vec!["News", "https://blank.test", "Untitled"]);
    }
}
