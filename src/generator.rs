use crate::config::GenerationConfig;
use crate::scrape::ScrapedPage;
use crate::sections::SectionLabel;
use crate::types::{NewsItem, PipelineError, Result, Theme};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Reserved marker a reply carries when the source material is out of
/// scope for the site. Checked verbatim, never retried.
pub const OFF_TOPIC_MARKER: &str = "$$off_topic$$";

/// One generation call: a system instruction plus a user message.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
}

/// Collaborator that produces article text from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn generator_name(&self) -> String;

    async fn complete(&self, request: &GenerationRequest) -> Result<String>;
}

// ---- HTTP implementation (chat-completions style) ----

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// Client for a chat-completions generation endpoint.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    config: GenerationConfig,
}

impl ChatCompletionsGenerator {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    fn generator_name(&self) -> String {
        format!("chat-completions ({})", self.config.model)
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let payload = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user.clone(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;

        if !status.is_success() {
            return Err(PipelineError::Generation(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::Generation(format!("bad response shape: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Generation("empty choices in response".to_string()))?;

        debug!("generation reply: {} chars", content.len());
        Ok(content)
    }
}

// ---- prompt construction ----

fn section_format_block() -> String {
    let mut block = String::from(
        "Respond with exactly the following sections, each introduced by its label and a colon, with no extra commentary:\n",
    );
    for label in SectionLabel::ALL {
        block.push_str(&format!("{}: <{}>\n", label.name(), label.name().to_lowercase()));
    }
    block
}

/// Prompt for rewriting a scraped news page into an article.
pub fn news_article_prompt(item: &NewsItem, page: &ScrapedPage) -> GenerationRequest {
    let images_info = page
        .images
        .iter()
        .map(|img| format!("- {} (alt: {})", img.url, img.alt))
        .collect::<Vec<_>>()
        .join("\n");

    let system = format!(
        "You are a sports journalist. You are given the full text of a news page. \
If the material is not about the site's sport, reply with only the marker {marker}. \
Otherwise write an original article based on it, keeping any referenced images as \
![alt](url) in the content.\n\n{format}\nSource title: {title}\nPublished: {published}\n\n\
Full content:\n{content}\n\nImages:\n{images}",
        marker = OFF_TOPIC_MARKER,
        format = section_format_block(),
        title = item.title,
        published = item.published_at.to_rfc3339(),
        content = page.text,
        images = images_info,
    );

    let user = format!(
        "Write a single, comprehensive article based on the material above. \
Follow the section structure exactly. End the content with a link back to the source: [source]({}).",
        item.source_url
    );

    GenerationRequest { system, user }
}

/// Prompt for writing an article from a stored topic idea.
pub fn theme_article_prompt(theme: &Theme, category_name: &str) -> GenerationRequest {
    let system = format!(
        "You are a professional content writer producing SEO-optimized articles for the \
'{category}' section of a blog. Write a comprehensive article on the given topic, \
naturally incorporating the provided keywords.\n\n{format}",
        category = category_name,
        format = section_format_block(),
    );

    let user = format!(
        "Topic: {title}\nDescription: {description}\nKeywords: {keywords}\n\n\
Write the article now, following the section structure exactly.",
        title = theme.title,
        description = theme.description,
        keywords = theme.keywords,
    );

    GenerationRequest { system, user }
}

/// Prompt for proposing fresh topic ideas for a category.
pub fn theme_ideas_prompt(
    category_name: &str,
    existing: &[String],
    keywords: &[String],
    count: u32,
) -> GenerationRequest {
    let system = format!(
        "You are an SEO expert generating high-traffic blog topics. Propose {count} unique \
blog post ideas for the category '{category}'. Use these keywords where sensible: {keywords}. \
Do not repeat any of these existing topics: {existing}.",
        count = count,
        category = category_name,
        keywords = keywords.join(", "),
        existing = existing.join("; "),
    );

    let user = "Reply as a numbered list, one idea per line, in the form \
'1. Title: Description'. No markdown formatting, no extra commentary."
        .to_string();

    GenerationRequest { system, user }
}

// ---- scripted implementation for development and tests ----

/// Generator that replays a queue of canned replies and counts calls.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push_failure(message);
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .push_back(Ok(reply.into()));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .push_back(Err(PipelineError::Generation(message.into())));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn generator_name(&self) -> String {
        "scripted".to_string()
    }

    async fn complete(&self, _request: &GenerationRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .expect("replies lock poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Err(PipelineError::Generation(
                    "no scripted reply queued".to_string(),
                ))
            })
    }
}
