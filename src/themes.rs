use crate::config::CategorySpec;
use crate::generator::{theme_ideas_prompt, TextGenerator};
use crate::store::ContentStore;
use crate::types::{PipelineError, ProcessingState, Result, Theme};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Collaborator returning search keyword suggestions for a term.
#[async_trait]
pub trait KeywordSuggester: Send + Sync {
    async fn suggest(&self, term: &str) -> Result<Vec<String>>;
}

/// Suggestion-endpoint client. The endpoint answers with a JSON array
/// of the form `[term, [suggestion, ...]]`.
pub struct HttpSuggester {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSuggester {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl KeywordSuggester for HttpSuggester {
    async fn suggest(&self, term: &str) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("client", "firefox"), ("q", term)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::General(format!(
                "suggestion endpoint returned HTTP {}",
                status
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let suggestions = body
            .get(1)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(suggestions)
    }
}

/// Fixed suggestion list, for development and tests.
pub struct StaticSuggester(pub Vec<String>);

#[async_trait]
impl KeywordSuggester for StaticSuggester {
    async fn suggest(&self, _term: &str) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// One proposed blog topic parsed from an ideation reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeIdea {
    pub title: String,
    pub description: String,
}

/// Parse a numbered or bulleted idea list. Accepts `1. Title: desc`,
/// `1. **Title** - desc` and a bare `1. **Title**` followed by an
/// indented description line.
pub fn parse_theme_ideas(text: &str) -> Vec<ThemeIdea> {
    let mut ideas = Vec::new();
    let mut pending_title: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // A bulleted continuation line finishes the idea opened above
        // it; any other line drops the dangling title.
        if let Some(title) = pending_title.take() {
            if line.starts_with('-') || line.starts_with('*') {
                let description = line.trim_start_matches(['-', '*']).trim().to_string();
                if !description.is_empty() {
                    ideas.push(ThemeIdea { title, description });
                    continue;
                }
            }
        }

        let Some(rest) = strip_list_marker(line) else {
            continue;
        };

        match split_title_description(rest) {
            (title, Some(description)) if !title.is_empty() => {
                ideas.push(ThemeIdea { title, description });
            }
            (title, None) if !title.is_empty() => {
                pending_title = Some(title);
            }
            _ => {}
        }
    }

    ideas
}

fn strip_list_marker(line: &str) -> Option<&str> {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && line[digits..].starts_with('.') {
        return Some(line[digits + 1..].trim_start());
    }
    line.strip_prefix('-').map(str::trim_start)
}

fn split_title_description(rest: &str) -> (String, Option<String>) {
    // Bold-wrapped title: **Title** - description
    if let Some(after_open) = rest.strip_prefix("**") {
        if let Some(close) = after_open.find("**") {
            let title = after_open[..close].trim().to_string();
            let remainder = after_open[close + 2..]
                .trim_start()
                .trim_start_matches([':', '-'])
                .trim();
            let description = if remainder.is_empty() {
                None
            } else {
                Some(remainder.to_string())
            };
            return (title, description);
        }
    }

    // Plain form: Title: description
    if let Some(colon) = rest.find(':') {
        let title = rest[..colon].trim().to_string();
        let description = rest[colon + 1..].trim().to_string();
        if !description.is_empty() {
            return (title, Some(description));
        }
        return (title, None);
    }

    (rest.trim().to_string(), None)
}

/// Theme ideation pass: keeps every configured category stocked with
/// fresh, deduplicated topic ideas.
pub struct ThemePlanner {
    store: ContentStore,
    generator: Arc<dyn TextGenerator>,
    suggester: Arc<dyn KeywordSuggester>,
    categories: Vec<CategorySpec>,
    max_attempts: u32,
}

impl ThemePlanner {
    pub fn new(
        store: ContentStore,
        generator: Arc<dyn TextGenerator>,
        suggester: Arc<dyn KeywordSuggester>,
        categories: Vec<CategorySpec>,
    ) -> Self {
        Self {
            store,
            generator,
            suggester,
            categories,
            max_attempts: 5,
        }
    }

    /// Refill every category up to its quota. A failing category is
    /// reported and skipped.
    pub async fn refill(&self) -> Result<usize> {
        let mut total = 0;

        for category in &self.categories {
            match self.refill_category(category).await {
                Ok(added) => {
                    info!("category '{}': {} new themes", category.name, added);
                    total += added;
                }
                Err(e) => {
                    error!("category '{}' failed: {}", category.name, e);
                }
            }
        }

        Ok(total)
    }

    async fn refill_category(&self, category: &CategorySpec) -> Result<usize> {
        let mut added: u32 = 0;
        let mut attempts = 0;

        while added < category.quota && attempts < self.max_attempts {
            attempts += 1;

            let existing = self.store.theme_titles(category.id).await?;
            let keywords = match self.suggester.suggest(&category.name).await {
                Ok(keywords) => keywords,
                Err(e) => {
                    warn!("keyword suggestion failed for '{}': {}", category.name, e);
                    Vec::new()
                }
            };

            let request =
                theme_ideas_prompt(&category.name, &existing, &keywords, category.quota);
            let reply = self.generator.complete(&request).await?;
            let ideas = parse_theme_ideas(&reply);

            if ideas.is_empty() {
                warn!(
                    "no usable ideas in reply for '{}' (attempt {})",
                    category.name, attempts
                );
                continue;
            }

            for idea in ideas {
                let theme = Theme {
                    id: Uuid::new_v4(),
                    category_id: category.id,
                    title: idea.title,
                    description: idea.description,
                    keywords: keywords.join(", "),
                    state: ProcessingState::Unprocessed,
                    created_at: Utc::now(),
                };

                if self.store.insert_theme(&theme).await? {
                    added += 1;
                    if added >= category.quota {
                        break;
                    }
                }
            }
        }

        Ok(added as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_numbered_ideas() {
        let ideas = parse_theme_ideas(
            "1. Choosing a racket: How to weigh head size against control\n\
             2. Footwork basics: Drills for faster court coverage",
        );
        assert_eq!(ideas.len(), 2);
        assert_eq!(ideas[0].title, "Choosing a racket");
        assert!(ideas[1].description.contains("Drills"));
    }

    #[test]
    fn parses_bold_titles_with_dash() {
        let ideas = parse_theme_ideas("1. **String Tension Guide** - What tension suits your game");
        assert_eq!(
            ideas,
            vec![ThemeIdea {
                title: "String Tension Guide".to_string(),
                description: "What tension suits your game".to_string(),
            }]
        );
    }

    #[test]
    fn parses_title_with_description_on_next_line() {
        let ideas = parse_theme_ideas("1. **Grip Sizes Explained**\n- Finding the right fit");
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].title, "Grip Sizes Explained");
        assert_eq!(ideas[0].description, "Finding the right fit");
    }

    #[test]
    fn ignores_unrecognized_lines() {
        let ideas = parse_theme_ideas("Here are some ideas:\n1. Warmups: Five minutes that matter");
        assert_eq!(ideas.len(), 1);
        assert_eq!(ideas[0].title, "Warmups");
    }
}
