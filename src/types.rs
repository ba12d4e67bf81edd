use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of an ingested candidate (news item or theme).
///
/// `Rejected` is terminal: the item is never offered to the generation
/// pass again. `Unprocessed` items stay eligible every pass until they
/// either succeed or are rejected; the recency window, not a retry
/// counter, bounds how long they can keep coming back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingState {
    Unprocessed,
    Succeeded,
    Rejected,
}

impl ProcessingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Unprocessed => "unprocessed",
            ProcessingState::Succeeded => "succeeded",
            ProcessingState::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "unprocessed" => Ok(ProcessingState::Unprocessed),
            "succeeded" => Ok(ProcessingState::Succeeded),
            "rejected" => Ok(ProcessingState::Rejected),
            other => Err(PipelineError::General(format!(
                "unknown processing state: {}",
                other
            ))),
        }
    }
}

/// Publication state of a generated post.
///
/// `RejectedQuality` posts failed the length gate and are never
/// selected for publishing. A post moves Draft -> Published at most
/// once; published rows are immutable apart from remote identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicationState {
    RejectedQuality,
    Draft,
    Published,
}

impl PublicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationState::RejectedQuality => "rejected_quality",
            PublicationState::Draft => "draft",
            PublicationState::Published => "published",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "rejected_quality" => Ok(PublicationState::RejectedQuality),
            "draft" => Ok(PublicationState::Draft),
            "published" => Ok(PublicationState::Published),
            other => Err(PipelineError::General(format!(
                "unknown publication state: {}",
                other
            ))),
        }
    }
}

/// A deduplicated news candidate pulled from a feed. The source URL is
/// the external identity; the store enforces its uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: Uuid,
    pub source_url: String,
    pub title: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
    pub tags: String,
    pub state: ProcessingState,
    pub created_at: DateTime<Utc>,
}

/// A blog topic idea, unique per (category, title). Consumed by the
/// generation pass the same way a news item is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub id: Uuid,
    pub category_id: i64,
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub state: ProcessingState,
    pub created_at: DateTime<Utc>,
}

/// SEO metadata carried verbatim from the generated output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeoMeta {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub focus_keyphrase: Option<String>,
    pub slug: Option<String>,
}

/// Which ingested record a post was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostSource {
    News(Uuid),
    Theme(Uuid),
}

/// A generated article, created once per succeeded candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub source: PostSource,
    pub title: String,
    pub body: String,
    pub tags: String,
    pub category_id: i64,
    pub category_name: String,
    pub seo: SeoMeta,
    pub state: PublicationState,
    pub remote_id: Option<i64>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// An image discovered while scraping the source page, linked to the
/// post it was generated with. Immutable once the remote id is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub post_id: Uuid,
    pub url: String,
    pub alt_text: String,
    pub remote_id: Option<i64>,
    pub remote_url: Option<String>,
}

/// Image reference harvested from a scraped page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
}

/// Classification of a single generation attempt.
///
/// `Unavailable` and `OutOfDomain` retire the item permanently.
/// `ParseFailure` does not: a reply that arrived but could not be
/// split into the required sections is treated as transient and the
/// item is offered again on the next pass.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(crate::sections::ParsedArticle),
    Unavailable,
    OutOfDomain,
    ParseFailure,
}

/// HTTP fetch settings shared by the feed and page fetchers.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "autopress/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 5,
        }
    }
}

/// Per-pass aggregate counters. These are the only cross-item signal a
/// pass produces; individual failures are logged and never abort the
/// batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub sources_polled: usize,
    pub sources_failed: usize,
    pub new_items: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationSummary {
    pub attempted: usize,
    pub drafts: usize,
    pub quality_rejected: usize,
    pub rejected: usize,
    pub parse_failures: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishSummary {
    pub selected: usize,
    pub published: usize,
    pub repaired: usize,
    pub failed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("feed parse error: {0}")]
    Feed(String),

    #[error("scrape failed for {url}: {reason}")]
    Scrape { url: String, reason: String },

    #[error("generation request failed: {0}")]
    Generation(String),

    #[error("CMS error ({status}): {message}")]
    Cms { status: u16, message: String },

    #[error("CMS credential expired")]
    AuthExpired,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
