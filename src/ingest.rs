use crate::fetcher::HttpFetcher;
use crate::sources::{normalize_feed, FeedSource, SourceRegistry};
use crate::store::ContentStore;
use crate::types::{IngestSummary, Result};
use chrono::{Duration, Utc};
use tracing::{error, info};

/// Ingestion pass: polls every registered feed and records unseen
/// entries as unprocessed news items.
pub struct Ingestor {
    store: ContentStore,
    fetcher: HttpFetcher,
    recency_window_days: i64,
}

impl Ingestor {
    pub fn new(store: ContentStore, fetcher: HttpFetcher, recency_window_days: i64) -> Self {
        Self {
            store,
            fetcher,
            recency_window_days,
        }
    }

    /// Poll every source. A failing source is reported and skipped;
    /// the rest of the pass continues.
    pub async fn ingest_all(&self, registry: &SourceRegistry) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for source in registry.sources() {
            summary.sources_polled += 1;
            match self.ingest_source(source).await {
                Ok(new_items) => {
                    info!("source {}: {} new items", source.url, new_items);
                    summary.new_items += new_items;
                }
                Err(e) => {
                    error!("source {} failed: {}", source.url, e);
                    summary.sources_failed += 1;
                }
            }
        }

        info!(
            "ingestion pass done: {} new items from {} sources ({} failed)",
            summary.new_items, summary.sources_polled, summary.sources_failed
        );
        summary
    }

    /// Fetch one feed and ingest its entries. Returns the number of
    /// items that were actually new.
    pub async fn ingest_source(&self, source: &FeedSource) -> Result<usize> {
        let content = self
            .fetcher
            .fetch_text_with_referer(&source.url, source.referer.as_deref())
            .await?;
        self.ingest_content(&content).await
    }

    /// Ingest already-fetched feed content. Entries outside the
    /// recency window never enter the store; entries whose URL is
    /// already known are no-ops under the store's uniqueness
    /// constraint.
    pub async fn ingest_content(&self, content: &str) -> Result<usize> {
        let now = Utc::now();
        let cutoff = now - Duration::days(self.recency_window_days);
        let items = normalize_feed(content, now, cutoff)?;

        let mut new_items = 0;
        for item in &items {
            if self.store.insert_news_item(item).await? {
                new_items += 1;
            }
        }

        Ok(new_items)
    }
}
