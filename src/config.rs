use crate::types::FetchConfig;
use std::env;

/// A CMS category articles are generated for. The quota is how many
/// fresh themes the ideation pass keeps on hand per category.
#[derive(Debug, Clone)]
pub struct CategorySpec {
    pub id: i64,
    pub name: String,
    pub quota: u32,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.perplexity.ai/chat/completions".to_string(),
            api_key: String::new(),
            model: "llama-3.1-sonar-small-128k-online".to_string(),
            max_tokens: 2500,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmsConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Pipeline-wide settings. Everything has a usable default; secrets
/// and endpoints come from the environment.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub fetch: FetchConfig,
    /// Items older than this many days are never ingested or retried.
    pub recency_window_days: i64,
    pub min_title_len: usize,
    pub min_body_len: usize,
    /// Category assigned to news posts when the reply names none.
    pub default_category: CategorySpec,
    /// Only drafts in this category are pushed by the publish pass.
    pub publish_category_id: i64,
    /// Tags prepended to every generated post ahead of model output.
    pub baseline_tags: Vec<String>,
    /// Categories the theme ideation pass keeps stocked.
    pub blog_categories: Vec<CategorySpec>,
    pub suggest_endpoint: String,
    pub generation: GenerationConfig,
    pub cms: CmsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://autopress.db?mode=rwc".to_string(),
            fetch: FetchConfig::default(),
            recency_window_days: 2,
            min_title_len: 20,
            min_body_len: 50,
            default_category: CategorySpec {
                id: 8,
                name: "News".to_string(),
                quota: 0,
            },
            publish_category_id: 8,
            baseline_tags: Vec::new(),
            blog_categories: Vec::new(),
            suggest_endpoint: "https://suggestqueries.google.com/complete/search".to_string(),
            generation: GenerationConfig::default(),
            cms: CmsConfig {
                base_url: String::new(),
                username: String::new(),
                password: String::new(),
            },
        }
    }
}

impl PipelineConfig {
    /// Build a config from the environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(days) = env::var("RECENCY_WINDOW_DAYS") {
            if let Ok(days) = days.parse() {
                config.recency_window_days = days;
            }
        }
        if let Ok(tags) = env::var("BASELINE_TAGS") {
            config.baseline_tags = tags
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Ok(url) = env::var("GENERATION_API_URL") {
            config.generation.api_url = url;
        }
        if let Ok(key) = env::var("GENERATION_API_KEY") {
            config.generation.api_key = key;
        }
        if let Ok(model) = env::var("GENERATION_MODEL") {
            config.generation.model = model;
        }
        if let Ok(url) = env::var("CMS_BASE_URL") {
            config.cms.base_url = url;
        }
        if let Ok(user) = env::var("CMS_USERNAME") {
            config.cms.username = user;
        }
        if let Ok(pass) = env::var("CMS_PASSWORD") {
            config.cms.password = pass;
        }

        config
    }
}
