use crate::config::PipelineConfig;
use crate::generator::{
    news_article_prompt, theme_article_prompt, TextGenerator, OFF_TOPIC_MARKER,
};
use crate::scrape::{PageScraper, ScrapedPage};
use crate::sections::{parse_article, ParsedArticle};
use crate::store::ContentStore;
use crate::types::{
    GenerationSummary, NewsItem, Outcome, Post, PostSource, ProcessingState, PublicationState,
    Result, Theme,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Generation pass: drives every eligible candidate through one
/// attempt and records the resulting state transition.
pub struct GenerationPass {
    store: ContentStore,
    scraper: Arc<dyn PageScraper>,
    generator: Arc<dyn TextGenerator>,
    config: PipelineConfig,
}

impl GenerationPass {
    pub fn new(
        store: ContentStore,
        scraper: Arc<dyn PageScraper>,
        generator: Arc<dyn TextGenerator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            scraper,
            generator,
            config,
        }
    }

    /// Run one pass over news candidates, then theme candidates.
    /// Every item commits its own transition; a failure on one item
    /// never aborts the batch.
    pub async fn run(&self) -> Result<GenerationSummary> {
        let mut summary = GenerationSummary::default();

        let cutoff = Utc::now() - Duration::days(self.config.recency_window_days);
        let candidates = self.store.news_candidates(cutoff).await?;
        info!("generation pass: {} news candidates", candidates.len());

        for item in candidates {
            summary.attempted += 1;
            if let Err(e) = self.process_news_item(&item, &mut summary).await {
                error!("item {} failed: {}", item.source_url, e);
            }
        }

        let themes = self.store.theme_candidates().await?;
        info!("generation pass: {} theme candidates", themes.len());

        for theme in themes {
            summary.attempted += 1;
            if let Err(e) = self.process_theme(&theme, &mut summary).await {
                error!("theme '{}' failed: {}", theme.title, e);
            }
        }

        info!(
            "generation pass done: {} attempted, {} drafts, {} quality-rejected, {} rejected, {} parse failures",
            summary.attempted,
            summary.drafts,
            summary.quality_rejected,
            summary.rejected,
            summary.parse_failures
        );
        Ok(summary)
    }

    async fn process_news_item(
        &self,
        item: &NewsItem,
        summary: &mut GenerationSummary,
    ) -> Result<()> {
        let (outcome, page) = self.attempt_news(item).await;

        match outcome {
            Outcome::Success(parsed) => {
                let post = self.build_post(
                    PostSource::News(item.id),
                    parsed,
                    self.config.default_category.id,
                    &self.config.default_category.name,
                    item.published_at,
                );
                self.count_post(&post, summary);
                let images = page.map(|p| p.images).unwrap_or_default();
                self.store.record_success(&post, &images).await?;
            }
            Outcome::Unavailable | Outcome::OutOfDomain => {
                summary.rejected += 1;
                self.store
                    .set_news_state(item.id, ProcessingState::Rejected)
                    .await?;
            }
            Outcome::ParseFailure => {
                // Deliberately no state change: the item stays
                // eligible until the recency window drops it.
                summary.parse_failures += 1;
            }
        }

        Ok(())
    }

    async fn process_theme(&self, theme: &Theme, summary: &mut GenerationSummary) -> Result<()> {
        let outcome = self.attempt_theme(theme).await;

        match outcome {
            Outcome::Success(parsed) => {
                let category_name = self
                    .config
                    .blog_categories
                    .iter()
                    .find(|c| c.id == theme.category_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| self.config.default_category.name.clone());
                let post = self.build_post(
                    PostSource::Theme(theme.id),
                    parsed,
                    theme.category_id,
                    &category_name,
                    Utc::now(),
                );
                self.count_post(&post, summary);
                self.store.record_success(&post, &[]).await?;
            }
            Outcome::Unavailable | Outcome::OutOfDomain => {
                summary.rejected += 1;
                self.store
                    .set_theme_state(theme.id, ProcessingState::Rejected)
                    .await?;
            }
            Outcome::ParseFailure => {
                summary.parse_failures += 1;
            }
        }

        Ok(())
    }

    /// One attempt against a news item: scrape, generate, classify.
    /// The scraped page rides along so media rows can be recorded on
    /// success.
    async fn attempt_news(&self, item: &NewsItem) -> (Outcome, Option<ScrapedPage>) {
        let page = match self.scraper.fetch(&item.source_url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("scrape unavailable for {}: {}", item.source_url, e);
                return (Outcome::Unavailable, None);
            }
        };

        let request = news_article_prompt(item, &page);
        let reply = match self.generator.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("generation unavailable for {}: {}", item.source_url, e);
                return (Outcome::Unavailable, Some(page));
            }
        };

        (classify_reply(&reply), Some(page))
    }

    /// One attempt against a theme. Themes have no source page, so
    /// the scraping step is skipped.
    async fn attempt_theme(&self, theme: &Theme) -> Outcome {
        let category_name = self
            .config
            .blog_categories
            .iter()
            .find(|c| c.id == theme.category_id)
            .map(|c| c.name.as_str())
            .unwrap_or("Blog");

        let request = theme_article_prompt(theme, category_name);
        let reply = match self.generator.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("generation unavailable for theme '{}': {}", theme.title, e);
                return Outcome::Unavailable;
            }
        };

        classify_reply(&reply)
    }

    /// Apply the quality gate and defaults to a parsed reply.
    fn build_post(
        &self,
        source: PostSource,
        parsed: ParsedArticle,
        category_id: i64,
        category_name: &str,
        published_at: chrono::DateTime<Utc>,
    ) -> Post {
        let state = if parsed.title.chars().count() < self.config.min_title_len
            || parsed.body.chars().count() < self.config.min_body_len
        {
            PublicationState::RejectedQuality
        } else {
            PublicationState::Draft
        };

        let mut tags: Vec<String> = self.config.baseline_tags.clone();
        if let Some(generated) = &parsed.tags {
            tags.extend(
                generated
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            );
        }

        Post {
            id: Uuid::new_v4(),
            source,
            title: parsed.title,
            body: parsed.body,
            tags: tags.join(", "),
            category_id,
            category_name: category_name.to_string(),
            seo: parsed.seo,
            state,
            remote_id: None,
            published_at,
            created_at: Utc::now(),
        }
    }

    fn count_post(&self, post: &Post, summary: &mut GenerationSummary) {
        match post.state {
            PublicationState::Draft => summary.drafts += 1,
            PublicationState::RejectedQuality => summary.quality_rejected += 1,
            PublicationState::Published => {}
        }
    }
}

/// Classify a reply that actually arrived: the off-topic marker is a
/// terminal domain rejection, an unparsable reply is transient.
pub fn classify_reply(reply: &str) -> Outcome {
    if reply.contains(OFF_TOPIC_MARKER) {
        return Outcome::OutOfDomain;
    }

    match parse_article(reply) {
        Ok(parsed) => Outcome::Success(parsed),
        Err(missing) => {
            debug!("reply not parsable: {}", missing);
            Outcome::ParseFailure
        }
    }
}
