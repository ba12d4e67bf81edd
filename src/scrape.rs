use crate::types::{FetchConfig, ImageRef, PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Full text and image references pulled from a source page.
#[derive(Debug, Clone, Default)]
pub struct ScrapedPage {
    pub text: String,
    pub images: Vec<ImageRef>,
}

/// Collaborator that turns a source URL into page text plus image
/// references.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage>;
}

/// Shared scraping session, reused across the items of a pass.
///
/// The underlying client is built on first acquire and torn down by an
/// explicit `close` at the end of the pass; the mutex makes both safe
/// if items are ever processed concurrently.
pub struct ScrapeSession {
    config: FetchConfig,
    client: Mutex<Option<Client>>,
}

impl ScrapeSession {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) -> Result<Client> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(&self.config.user_agent)
            .timeout(Duration::from_secs(self.config.timeout_seconds))
            .gzip(true)
            .build()?;
        info!("scrape session initialized");
        *slot = Some(client.clone());
        Ok(client)
    }

    pub async fn close(&self) {
        let mut slot = self.client.lock().await;
        if slot.take().is_some() {
            info!("scrape session closed");
        }
    }
}

/// HTTP implementation of the scrape collaborator.
pub struct HttpScraper {
    session: ScrapeSession,
}

impl HttpScraper {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            session: ScrapeSession::new(config),
        }
    }

    pub async fn close(&self) {
        self.session.close().await;
    }
}

#[async_trait]
impl PageScraper for HttpScraper {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage> {
        let client = self.session.acquire().await?;

        let response = client.get(url).send().await.map_err(|e| PipelineError::Scrape {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Scrape {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let html = response.text().await.map_err(|e| PipelineError::Scrape {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let page = extract_page(&html);
        debug!(
            "scraped {}: {} chars, {} images",
            url,
            page.text.len(),
            page.images.len()
        );

        if page.text.trim().is_empty() {
            return Err(PipelineError::Scrape {
                url: url.to_string(),
                reason: "no text content".to_string(),
            });
        }

        Ok(page)
    }
}

/// Extract article text and image references from an HTML document.
/// Prefers the `<article>` element when present, falling back to the
/// whole body.
pub fn extract_page(html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let article_selector = Selector::parse("article").expect("invalid selector");
    let body_selector = Selector::parse("body").expect("invalid selector");
    let img_selector = Selector::parse("img").expect("invalid selector");

    let text = match document.select(&article_selector).next() {
        Some(article) => collect_text(article),
        None => document
            .select(&body_selector)
            .next()
            .map(collect_text)
            .unwrap_or_default(),
    };

    let mut images = Vec::new();
    for img in document.select(&img_selector) {
        if let Some(src) = img.value().attr("src") {
            if src.trim().is_empty() {
                continue;
            }
            images.push(ImageRef {
                url: src.to_string(),
                alt: img.value().attr("alt").unwrap_or_default().to_string(),
            });
        }
    }

    ScrapedPage { text, images }
}

fn collect_text(element: scraper::ElementRef<'_>) -> String {
    let fragments: Vec<&str> = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    fragments.join("\n")
}

/// Scraper stub backed by a fixed page map, for development and tests.
pub struct ScriptedScraper {
    pages: HashMap<String, ScrapedPage>,
}

impl ScriptedScraper {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    pub fn with_page(mut self, url: impl Into<String>, page: ScrapedPage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }
}

impl Default for ScriptedScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageScraper for ScriptedScraper {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| PipelineError::Scrape {
                url: url.to_string(),
                reason: "page unavailable".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_article_element() {
        let html = r#"
            <html><body>
            <nav>Site navigation</nav>
            <article><p>Match report text.</p></article>
            </body></html>
        "#;
        let page = extract_page(html);
        assert!(page.text.contains("Match report text."));
        assert!(!page.text.contains("Site navigation"));
    }

    #[test]
    fn collects_images_with_alt_text() {
        let html = r#"
            <html><body><article>
            <img src="https://example.com/a.jpg" alt="Court view">
            <img src="" alt="ignored">
            <img alt="no source">
            </article></body></html>
        "#;
        let page = extract_page(html);
        assert_eq!(
            page.images,
            vec![ImageRef {
                url: "https://example.com/a.jpg".to_string(),
                alt: "Court view".to_string(),
            }]
        );
    }
}
