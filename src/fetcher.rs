use crate::types::{FetchConfig, PipelineError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// Seam for downloading raw bytes (media files) so the publish pass
/// can be driven without a network.
#[async_trait]
pub trait MediaFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)>;
}

/// HTTP fetcher with a small fixed retry budget. Only transport
/// failures (timeouts, connection errors) are retried; any HTTP status
/// the server actually produced is returned as-is.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    fn retry_schedule(&self) -> ExponentialBackoff<backoff::SystemClock> {
        // Fixed interval between attempts; the budget, not the curve,
        // bounds total work.
        ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            multiplier: 1.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn get_with_retry(&self, url: &str, referer: Option<&str>) -> Result<Response> {
        let mut backoff = self.retry_schedule();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let mut request = self.client.get(url);
            if let Some(referer) = referer {
                request = request.header("Referer", referer);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(PipelineError::General(format!(
                            "HTTP {} fetching {}",
                            status, url
                        )));
                    }
                    return Ok(response);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        if let Some(delay) = backoff.next_backoff() {
                            warn!(
                                "attempt {} failed for {}, retrying in {:?}",
                                attempt + 1,
                                url,
                                delay
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => PipelineError::Http(e),
            None => PipelineError::General(format!("failed to fetch {}", url)),
        })
    }

    /// Fetch a URL as text. Non-2xx responses are not retried.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetch_text_with_referer(url, None).await
    }

    /// Fetch a URL as text, sending a referer for sites that gate
    /// their feeds behind a same-site check.
    pub async fn fetch_text_with_referer(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<String> {
        let response = self.get_with_retry(url, referer).await?;
        let text = response.text().await?;
        debug!("fetched {} ({} bytes)", url, text.len());
        Ok(text)
    }

    /// Fetch a URL as raw bytes plus its content type, for media
    /// downloads.
    pub async fn fetch_bytes(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        let response = self.get_with_retry(url, None).await?;
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await?.to_vec();
        Ok((bytes, content_type))
    }
}

#[async_trait]
impl MediaFetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<(Vec<u8>, Option<String>)> {
        self.fetch_bytes(url).await
    }
}
