pub mod config;
pub mod fetcher;
pub mod generate;
pub mod generator;
pub mod ingest;
pub mod publish;
pub mod scrape;
pub mod sections;
pub mod sources;
pub mod store;
pub mod themes;
pub mod types;

pub use config::PipelineConfig;
pub use fetcher::HttpFetcher;
pub use generate::GenerationPass;
pub use generator::{ChatCompletionsGenerator, GenerationRequest, ScriptedGenerator, TextGenerator};
pub use ingest::Ingestor;
pub use publish::{CmsClient, PublishPass, WpClient};
pub use scrape::{HttpScraper, PageScraper, ScrapeSession, ScrapedPage};
pub use sources::{FeedSource, SourceRegistry};
pub use store::ContentStore;
pub use themes::{KeywordSuggester, ThemePlanner};
pub use types::*;
