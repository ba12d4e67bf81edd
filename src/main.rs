use anyhow::Result;
use autopress::fetcher::HttpFetcher;
use autopress::generator::ChatCompletionsGenerator;
use autopress::publish::WpClient;
use autopress::scrape::HttpScraper;
use autopress::sources::SourceRegistry;
use autopress::store::ContentStore;
use autopress::themes::{HttpSuggester, ThemePlanner};
use autopress::{GenerationPass, Ingestor, PipelineConfig, PublishPass};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "autopress",
    about = "Content pipeline: ingest feeds, generate articles, publish drafts"
)]
struct Cli {
    /// File with one feed URL per line (# for comments). Falls back
    /// to the FEED_URLS environment variable.
    #[arg(long)]
    feeds: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll feeds and record unseen items
    Ingest,
    /// Top up blog topic ideas per category
    Themes,
    /// Run generation attempts over eligible candidates
    Generate,
    /// Push drafts to the CMS
    Publish,
    /// Run every pass in pipeline order
    Run,
    /// Print store counters
    Stats,
}

fn load_registry(cli: &Cli) -> Result<SourceRegistry> {
    if let Some(path) = &cli.feeds {
        let text = std::fs::read_to_string(path)?;
        return Ok(SourceRegistry::from_lines(&text));
    }

    if let Ok(urls) = std::env::var("FEED_URLS") {
        return Ok(SourceRegistry::from_lines(&urls.replace(',', "\n")));
    }

    Ok(SourceRegistry::default())
}

async fn run_ingest(store: &ContentStore, config: &PipelineConfig, cli: &Cli) -> Result<()> {
    let registry = load_registry(cli)?;
    if registry.is_empty() {
        warn!("no feed sources configured; set --feeds or FEED_URLS");
        return Ok(());
    }

    let fetcher = HttpFetcher::new(config.fetch.clone())?;
    let ingestor = Ingestor::new(store.clone(), fetcher, config.recency_window_days);
    let summary = ingestor.ingest_all(&registry).await;
    info!(
        "ingested {} new items ({}/{} sources ok)",
        summary.new_items,
        summary.sources_polled - summary.sources_failed,
        summary.sources_polled
    );
    Ok(())
}

async fn run_themes(store: &ContentStore, config: &PipelineConfig) -> Result<()> {
    if config.blog_categories.is_empty() {
        warn!("no blog categories configured; skipping theme ideation");
        return Ok(());
    }

    let generator = Arc::new(ChatCompletionsGenerator::new(config.generation.clone()));
    let suggester = Arc::new(HttpSuggester::new(config.suggest_endpoint.clone()));
    let planner = ThemePlanner::new(
        store.clone(),
        generator,
        suggester,
        config.blog_categories.clone(),
    );
    let added = planner.refill().await?;
    info!("theme ideation added {} themes", added);
    Ok(())
}

async fn run_generate(store: &ContentStore, config: &PipelineConfig) -> Result<()> {
    let scraper = Arc::new(HttpScraper::new(config.fetch.clone()));
    let generator = Arc::new(ChatCompletionsGenerator::new(config.generation.clone()));
    let pass = GenerationPass::new(
        store.clone(),
        scraper.clone(),
        generator,
        config.clone(),
    );
    let result = pass.run().await;
    scraper.close().await;
    let summary = result?;
    info!(
        "generation: {} attempted, {} drafts, {} quality-rejected, {} rejected, {} parse failures",
        summary.attempted,
        summary.drafts,
        summary.quality_rejected,
        summary.rejected,
        summary.parse_failures
    );
    Ok(())
}

async fn run_publish(store: &ContentStore, config: &PipelineConfig) -> Result<()> {
    let cms = Arc::new(WpClient::new(config.cms.clone()));
    let media = Arc::new(HttpFetcher::new(config.fetch.clone())?);
    let pass = PublishPass::new(store.clone(), cms, media, config.clone());
    let summary = pass.sync().await?;
    info!(
        "publish: {} pushed, {} repaired, {} failed of {} selected",
        summary.published, summary.repaired, summary.failed, summary.selected
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    info!("connecting to store: {}", config.database_url);
    let store = ContentStore::connect(&config.database_url).await?;

    match &cli.command {
        Command::Ingest => run_ingest(&store, &config, &cli).await?,
        Command::Themes => run_themes(&store, &config).await?,
        Command::Generate => run_generate(&store, &config).await?,
        Command::Publish => run_publish(&store, &config).await?,
        Command::Run => {
            run_ingest(&store, &config, &cli).await?;
            run_themes(&store, &config).await?;
            run_generate(&store, &config).await?;
            run_publish(&store, &config).await?;
        }
        Command::Stats => {
            let stats = store.stats().await?;
            let mut keys: Vec<_> = stats.keys().collect();
            keys.sort();
            for key in keys {
                info!("  {}: {}", key, stats[key]);
            }
        }
    }

    Ok(())
}
