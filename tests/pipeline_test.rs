use autopress::config::{CategorySpec, PipelineConfig};
use autopress::fetcher::HttpFetcher;
use autopress::generator::ScriptedGenerator;
use autopress::ingest::Ingestor;
use autopress::scrape::{ScrapedPage, ScriptedScraper};
use autopress::store::ContentStore;
use autopress::themes::{parse_theme_ideas, StaticSuggester, ThemePlanner};
use autopress::types::*;
use autopress::GenerationPass;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

async fn mem_store() -> ContentStore {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    ContentStore::connect("sqlite::memory:")
        .await
        .expect("in-memory store")
}

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.blog_categories = vec![CategorySpec {
        id: 20,
        name: "Personal Blog".to_string(),
        quota: 2,
    }];
    config
}

fn rss_feed(items: &[(&str, &str, chrono::DateTime<Utc>)]) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Test Feed</title>",
    );
    for (title, link, published) in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>{}</link><pubDate>{}</pubDate><category>tennis</category></item>",
            title,
            link,
            published.to_rfc2822()
        ));
    }
    body.push_str("</channel></rss>");
    body
}

fn news_item(url: &str, title: &str, age_hours: i64) -> NewsItem {
    NewsItem {
        id: Uuid::new_v4(),
        source_url: url.to_string(),
        title: title.to_string(),
        summary: Some("summary".to_string()),
        published_at: Utc::now() - Duration::hours(age_hours),
        tags: String::new(),
        state: ProcessingState::Unprocessed,
        created_at: Utc::now(),
    }
}

fn valid_reply() -> String {
    "Title: Match recap: final sets decide the night\n\
     Content: The match swung on a handful of points in the final set, and the crowd stayed loud through every change of ends.\n\
     Tags: recap, finals\n\
     SEO Title: Match recap and analysis\n\
     Focus Keyphrase: match recap\n\
     Slug: match-recap-final-sets\n\
     Meta Description: A recap of the final sets."
        .to_string()
}

fn page_with_image() -> ScrapedPage {
    ScrapedPage {
        text: "Full article text scraped from the source page.".to_string(),
        images: vec![ImageRef {
            url: "https://example.com/court.jpg".to_string(),
            alt: "Court view".to_string(),
        }],
    }
}

async fn ingestor(store: &ContentStore, window_days: i64) -> Ingestor {
    let fetcher = HttpFetcher::new(FetchConfig::default()).expect("fetcher");
    Ingestor::new(store.clone(), fetcher, window_days)
}

// ---- ingestion ----

#[tokio::test]
async fn ingesting_the_same_feed_twice_adds_nothing_new() {
    let store = mem_store().await;
    let ingestor = ingestor(&store, 2).await;

    let feed = rss_feed(&[
        ("First article", "https://example.com/a1", Utc::now() - Duration::hours(1)),
        ("Second article", "https://example.com/a2", Utc::now() - Duration::hours(2)),
    ]);

    let first = ingestor.ingest_content(&feed).await.unwrap();
    assert_eq!(first, 2);

    let second = ingestor.ingest_content(&feed).await.unwrap();
    assert_eq!(second, 0);

    let candidates = store
        .news_candidates(Utc::now() - Duration::days(2))
        .await
        .unwrap();
    assert_eq!(candidates.len(), 2);
}

#[tokio::test]
async fn stale_entries_are_never_ingested() {
    let store = mem_store().await;
    let ingestor = ingestor(&store, 2).await;

    let feed = rss_feed(&[
        ("Old news", "https://example.com/old", Utc::now() - Duration::days(10)),
        ("Fresh news", "https://example.com/fresh", Utc::now() - Duration::hours(3)),
    ]);

    let ingested = ingestor.ingest_content(&feed).await.unwrap();
    assert_eq!(ingested, 1);
    assert!(store
        .get_news_item_by_url("https://example.com/old")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn candidate_selection_respects_the_recency_window() {
    let store = mem_store().await;

    // Even a never-attempted item falls out of the candidate set once
    // it is older than the window.
    let old = news_item("https://example.com/stale", "An old unseen story", 24 * 10);
    store.insert_news_item(&old).await.unwrap();

    let cutoff = Utc::now() - Duration::days(2);
    let candidates = store.news_candidates(cutoff).await.unwrap();
    assert!(candidates.is_empty());
}

// ---- generation state machine ----

#[tokio::test]
async fn successful_generation_creates_a_draft_and_media_rows() {
    let store = mem_store().await;
    let item = news_item("https://example.com/a1", "Match recap: final sets", 1);
    store.insert_news_item(&item).await.unwrap();

    let scraper = Arc::new(
        ScriptedScraper::new().with_page("https://example.com/a1", page_with_image()),
    );
    let generator = Arc::new(ScriptedGenerator::new().with_reply(valid_reply()));

    let pass = GenerationPass::new(store.clone(), scraper, generator.clone(), test_config());
    let summary = pass.run().await.unwrap();

    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.drafts, 1);
    assert_eq!(summary.rejected, 0);

    let stored = store.get_news_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Succeeded);

    let post = store.post_for_news(item.id).await.unwrap().unwrap();
    assert_eq!(post.state, PublicationState::Draft);
    assert_eq!(post.title, "Match recap: final sets decide the night");
    assert_eq!(post.seo.slug.as_deref(), Some("match-recap-final-sets"));

    let media = store.media_for_post(post.id).await.unwrap();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].url, "https://example.com/court.jpg");
    assert!(media[0].remote_id.is_none());
}

#[tokio::test]
async fn short_title_fails_the_quality_gate() {
    let store = mem_store().await;
    let item = news_item("https://example.com/short", "Short one", 1);
    store.insert_news_item(&item).await.unwrap();

    // Title of 19 characters, body well past the minimum.
    let reply = format!("Title: {}\nContent: {}", "a".repeat(19), "b".repeat(100));
    let scraper = Arc::new(
        ScriptedScraper::new().with_page("https://example.com/short", page_with_image()),
    );
    let generator = Arc::new(ScriptedGenerator::new().with_reply(reply));

    let pass = GenerationPass::new(store.clone(), scraper, generator, test_config());
    let summary = pass.run().await.unwrap();
    assert_eq!(summary.quality_rejected, 1);
    assert_eq!(summary.drafts, 0);

    let post = store.post_for_news(item.id).await.unwrap().unwrap();
    assert_eq!(post.state, PublicationState::RejectedQuality);

    // The source item still counts as succeeded; only the post is
    // kept away from publishing.
    let stored = store.get_news_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Succeeded);
}

#[tokio::test]
async fn boundary_lengths_pass_the_quality_gate() {
    let store = mem_store().await;
    let item = news_item("https://example.com/boundary", "Boundary case item", 1);
    store.insert_news_item(&item).await.unwrap();

    // Exactly 20 title characters and 50 body characters.
    let reply = format!("Title: {}\nContent: {}", "a".repeat(20), "b".repeat(50));
    let scraper = Arc::new(
        ScriptedScraper::new().with_page("https://example.com/boundary", page_with_image()),
    );
    let generator = Arc::new(ScriptedGenerator::new().with_reply(reply));

    let pass = GenerationPass::new(store.clone(), scraper, generator, test_config());
    let summary = pass.run().await.unwrap();
    assert_eq!(summary.drafts, 1);

    let post = store.post_for_news(item.id).await.unwrap().unwrap();
    assert_eq!(post.state, PublicationState::Draft);
}

#[tokio::test]
async fn off_topic_marker_rejects_permanently() {
    let store = mem_store().await;
    let item = news_item("https://example.com/offtopic", "Not about the sport", 1);
    store.insert_news_item(&item).await.unwrap();

    let scraper = Arc::new(
        ScriptedScraper::new().with_page("https://example.com/offtopic", page_with_image()),
    );
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_reply("$$off_topic$$")
            .with_reply(valid_reply()),
    );

    let pass = GenerationPass::new(store.clone(), scraper, generator.clone(), test_config());
    pass.run().await.unwrap();

    let stored = store.get_news_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Rejected);
    assert_eq!(generator.calls(), 1);

    // A second pass must not attempt the item again.
    pass.run().await.unwrap();
    assert_eq!(generator.calls(), 1);
    assert!(store.post_for_news(item.id).await.unwrap().is_none());
}

#[tokio::test]
async fn unparsable_reply_stays_eligible_for_the_next_pass() {
    let store = mem_store().await;
    let item = news_item("https://example.com/garbled", "A recoverable reply", 1);
    store.insert_news_item(&item).await.unwrap();

    let scraper = Arc::new(
        ScriptedScraper::new().with_page("https://example.com/garbled", page_with_image()),
    );
    // First reply has no Title section; the second is well-formed.
    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_reply("Content: body text without a headline, twice over.")
            .with_reply(valid_reply()),
    );

    let pass = GenerationPass::new(store.clone(), scraper, generator.clone(), test_config());

    let summary = pass.run().await.unwrap();
    assert_eq!(summary.parse_failures, 1);
    let stored = store.get_news_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Unprocessed);

    let summary = pass.run().await.unwrap();
    assert_eq!(summary.drafts, 1);
    assert_eq!(generator.calls(), 2);
    let stored = store.get_news_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Succeeded);
}

#[tokio::test]
async fn scrape_failure_rejects_without_calling_the_generator() {
    let store = mem_store().await;
    let item = news_item("https://example.com/unreachable", "Page that went away", 1);
    store.insert_news_item(&item).await.unwrap();

    let scraper = Arc::new(ScriptedScraper::new());
    let generator = Arc::new(ScriptedGenerator::new().with_reply(valid_reply()));

    let pass = GenerationPass::new(store.clone(), scraper, generator.clone(), test_config());
    let summary = pass.run().await.unwrap();

    assert_eq!(summary.rejected, 1);
    assert_eq!(generator.calls(), 0);
    let stored = store.get_news_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Rejected);
}

#[tokio::test]
async fn generation_transport_failure_rejects_the_item() {
    let store = mem_store().await;
    let item = news_item("https://example.com/timeout", "A flaky upstream call", 1);
    store.insert_news_item(&item).await.unwrap();

    let scraper = Arc::new(
        ScriptedScraper::new().with_page("https://example.com/timeout", page_with_image()),
    );
    let generator = Arc::new(ScriptedGenerator::new().with_failure("connection reset"));

    let pass = GenerationPass::new(store.clone(), scraper, generator, test_config());
    let summary = pass.run().await.unwrap();

    assert_eq!(summary.rejected, 1);
    let stored = store.get_news_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.state, ProcessingState::Rejected);
}

// ---- themes ----

#[tokio::test]
async fn theme_generation_creates_a_post_in_its_category() {
    let store = mem_store().await;
    let theme = Theme {
        id: Uuid::new_v4(),
        category_id: 20,
        title: "String tension and control".to_string(),
        description: "How tension changes feel".to_string(),
        keywords: "tension, control".to_string(),
        state: ProcessingState::Unprocessed,
        created_at: Utc::now(),
    };
    store.insert_theme(&theme).await.unwrap();

    let scraper = Arc::new(ScriptedScraper::new());
    let generator = Arc::new(ScriptedGenerator::new().with_reply(valid_reply()));

    let pass = GenerationPass::new(store.clone(), scraper, generator, test_config());
    let summary = pass.run().await.unwrap();
    assert_eq!(summary.drafts, 1);

    let post = store.post_for_theme(theme.id).await.unwrap().unwrap();
    assert_eq!(post.category_id, 20);
    assert_eq!(post.category_name, "Personal Blog");
    assert_eq!(post.state, PublicationState::Draft);
}

#[tokio::test]
async fn theme_planner_fills_the_quota_and_deduplicates() {
    let store = mem_store().await;
    let ideas = "1. Grip sizes explained: Finding the right fit\n\
                 2. Footwork drills: Five minutes that matter";

    let generator = Arc::new(
        ScriptedGenerator::new()
            .with_reply(ideas)
            .with_reply(ideas)
            .with_reply(ideas)
            .with_reply(ideas)
            .with_reply(ideas)
            .with_reply(ideas),
    );
    let suggester = Arc::new(StaticSuggester(vec![
        "tennis grips".to_string(),
        "footwork".to_string(),
    ]));

    let categories = vec![CategorySpec {
        id: 20,
        name: "Tennis Tips".to_string(),
        quota: 2,
    }];
    let planner = ThemePlanner::new(store.clone(), generator, suggester, categories.clone());

    let added = planner.refill().await.unwrap();
    assert_eq!(added, 2);
    assert_eq!(store.theme_titles(20).await.unwrap().len(), 2);

    // The same ideas again must not create duplicates.
    let added = planner.refill().await.unwrap();
    assert_eq!(added, 0);
    assert_eq!(store.theme_titles(20).await.unwrap().len(), 2);
}

#[test]
fn idea_parser_handles_model_formats() {
    let ideas = parse_theme_ideas(
        "Some preamble line\n\
         1. **Bold Title** - With a dash description\n\
         2. Plain title: With a colon description",
    );
    assert_eq!(ideas.len(), 2);
    assert_eq!(ideas[0].title, "Bold Title");
    assert_eq!(ideas[1].description, "With a colon description");
}
