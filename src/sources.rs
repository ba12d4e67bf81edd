use crate::types::{NewsItem, PipelineError, ProcessingState, Result};
use chrono::{DateTime, Utc};
use feed_rs::parser;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// One feed to poll. The referer is sent by sites that gate their
/// feeds behind a same-site check.
#[derive(Debug, Clone)]
pub struct FeedSource {
    pub url: String,
    pub referer: Option<String>,
}

impl FeedSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referer: None,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// Static registry of the feeds a pass polls.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<FeedSource>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<FeedSource>) -> Self {
        Self { sources }
    }

    /// Read one feed URL per line, ignoring blanks and `#` comments.
    pub fn from_lines(text: &str) -> Self {
        let sources = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(FeedSource::new)
            .collect();
        Self { sources }
    }

    pub fn add(&mut self, source: FeedSource) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Parse raw feed content and normalize its entries into news items.
///
/// Entries older than `cutoff` are dropped here so the backlog stays
/// bounded; entries without a timestamp are stamped with the fetch
/// time. The entry link is the external identity, so entries without
/// one are skipped.
pub fn normalize_feed(
    content: &str,
    fetched_at: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<NewsItem>> {
    let feed = parser::parse(content.as_bytes())
        .map_err(|e| PipelineError::Feed(format!("failed to parse feed: {}", e)))?;

    let mut items = Vec::new();

    for entry in feed.entries {
        let url = match entry.links.first() {
            Some(link) => link.href.clone(),
            None => {
                debug!("skipping feed entry without a link");
                continue;
            }
        };

        match Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                debug!("skipping entry with unusable link: {}", url);
                continue;
            }
        }

        let title = entry
            .title
            .map(|t| t.content)
            .unwrap_or_else(|| "Untitled".to_string());

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(fetched_at);

        if published_at < cutoff {
            debug!("skipping stale entry: {}", url);
            continue;
        }

        let summary = entry.summary.map(|s| s.content);
        let tags = entry
            .categories
            .into_iter()
            .map(|c| c.term)
            .collect::<Vec<_>>()
            .join(", ");

        items.push(NewsItem {
            id: Uuid::new_v4(),
            source_url: url,
            title,
            summary,
            published_at,
            tags,
            state: ProcessingState::Unprocessed,
            created_at: fetched_at,
        });
    }

    Ok(items)
}
