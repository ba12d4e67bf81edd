use crate::config::{CmsConfig, PipelineConfig};
use crate::fetcher::MediaFetch;
use crate::store::ContentStore;
use crate::types::{MediaAsset, PipelineError, Post, PublishSummary, Result, SeoMeta};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Fields sent to the CMS when creating a post.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub status: String,
    pub date: String,
    pub categories: Vec<i64>,
    pub tags: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub id: i64,
    pub url: String,
}

/// CMS collaborator. An expired credential surfaces as
/// `PipelineError::AuthExpired` so callers can refresh exactly once.
#[async_trait]
pub trait CmsClient: Send + Sync {
    async fn authenticate(&self) -> Result<String>;

    /// Look a tag up by name, creating it on miss.
    async fn get_or_create_tag(&self, token: &str, name: &str) -> Result<i64>;

    async fn upload_media(
        &self,
        token: &str,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<MediaUpload>;

    async fn create_post(&self, token: &str, post: &NewPost) -> Result<i64>;

    async fn update_post_meta(
        &self,
        token: &str,
        remote_id: i64,
        key: &str,
        value: &str,
    ) -> Result<()>;
}

// ---- WordPress-style REST implementation ----

#[derive(Debug, Deserialize)]
struct TokenReply {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TagReply {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct MediaReply {
    id: i64,
    source_url: String,
}

#[derive(Debug, Deserialize)]
struct PostReply {
    id: i64,
}

pub struct WpClient {
    client: reqwest::Client,
    config: CmsConfig,
}

impl WpClient {
    pub fn new(config: CmsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/wp-json/wp/v2/{}", self.config.base_url, path)
    }

    fn cms_error(status: reqwest::StatusCode, body: String) -> PipelineError {
        if status.as_u16() == 403 && body.contains("jwt_auth_invalid_token") {
            PipelineError::AuthExpired
        } else {
            PipelineError::Cms {
                status: status.as_u16(),
                message: body,
            }
        }
    }
}

#[async_trait]
impl CmsClient for WpClient {
    async fn authenticate(&self) -> Result<String> {
        let url = format!("{}/wp-json/jwt-auth/v1/token", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Cms {
                status: status.as_u16(),
                message: format!("token request failed: {}", body),
            });
        }

        let reply: TokenReply = response.json().await?;
        info!("obtained fresh CMS credential");
        Ok(reply.token)
    }

    async fn get_or_create_tag(&self, token: &str, name: &str) -> Result<i64> {
        let response = self
            .client
            .get(self.api("tags"))
            .bearer_auth(token)
            .query(&[("search", name)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::cms_error(status, body));
        }

        let matches: Vec<TagReply> = response.json().await?;
        if let Some(tag) = matches.first() {
            return Ok(tag.id);
        }

        let response = self
            .client
            .post(self.api("tags"))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::cms_error(status, body));
        }

        let created: TagReply = response.json().await?;
        Ok(created.id)
    }

    async fn upload_media(
        &self,
        token: &str,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<MediaUpload> {
        let response = self
            .client
            .post(self.api("media"))
            .bearer_auth(token)
            .header(
                "Content-Disposition",
                format!("attachment; filename={}", filename),
            )
            .header("Content-Type", mime.to_string())
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::cms_error(status, body));
        }

        let reply: MediaReply = response.json().await?;
        Ok(MediaUpload {
            id: reply.id,
            url: reply.source_url,
        })
    }

    async fn create_post(&self, token: &str, post: &NewPost) -> Result<i64> {
        let response = self
            .client
            .post(self.api("posts"))
            .bearer_auth(token)
            .json(post)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::cms_error(status, body));
        }

        let reply: PostReply = response.json().await?;
        Ok(reply.id)
    }

    async fn update_post_meta(
        &self,
        token: &str,
        remote_id: i64,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let response = self
            .client
            .put(format!("{}/{}", self.api("posts"), remote_id))
            .bearer_auth(token)
            .json(&json!({ "meta": { key: value } }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::cms_error(status, body));
        }

        Ok(())
    }
}

/// Append schema.org NewsArticle markup to outgoing content.
pub fn add_structured_data(title: &str, body: &str, published_at: DateTime<Utc>) -> String {
    let structured = json!({
        "@context": "https://schema.org",
        "@type": "NewsArticle",
        "headline": title,
        "datePublished": published_at.to_rfc3339(),
        "articleBody": body,
    });

    format!(
        "{}<script type=\"application/ld+json\">{}</script>",
        body, structured
    )
}

enum Pushed {
    Created,
    Repaired,
}

/// Publish pass: pushes drafts in the publish-eligible category to
/// the CMS and records remote identifiers.
pub struct PublishPass {
    store: ContentStore,
    cms: Arc<dyn CmsClient>,
    media: Arc<dyn MediaFetch>,
    config: PipelineConfig,
}

impl PublishPass {
    pub fn new(
        store: ContentStore,
        cms: Arc<dyn CmsClient>,
        media: Arc<dyn MediaFetch>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            cms,
            media,
            config,
        }
    }

    /// Push every eligible draft. One record's failure never aborts
    /// the batch; it stays Draft and is retried next pass.
    pub async fn sync(&self) -> Result<PublishSummary> {
        let mut summary = PublishSummary::default();

        let drafts = self
            .store
            .drafts_for_category(self.config.publish_category_id)
            .await?;
        summary.selected = drafts.len();

        if drafts.is_empty() {
            info!("publish pass: nothing to push");
            return Ok(summary);
        }

        let mut token = self.cms.authenticate().await?;

        for post in drafts {
            match self.publish_one(&post, &mut token).await {
                Ok(Pushed::Created) => summary.published += 1,
                Ok(Pushed::Repaired) => summary.repaired += 1,
                Err(e) => {
                    error!("publish failed for '{}': {}", post.title, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "publish pass done: {} pushed, {} repaired, {} failed of {} selected",
            summary.published, summary.repaired, summary.failed, summary.selected
        );
        Ok(summary)
    }

    async fn publish_one(&self, post: &Post, token: &mut String) -> Result<Pushed> {
        // A draft that already carries a remote id was accepted by the
        // CMS on a pass that died before the state commit. Finish the
        // transition without a second create call.
        if let Some(remote_id) = post.remote_id {
            warn!(
                "draft '{}' already has remote id {}, repairing state",
                post.title, remote_id
            );
            self.store.mark_published(post.id).await?;
            return Ok(Pushed::Repaired);
        }

        // Media first: upload assets, rewrite in-body references, and
        // persist the rewritten body so a later retry reuses the
        // already-uploaded files.
        let mut body = post.body.clone();
        let assets = self.store.media_for_post(post.id).await?;
        let mut featured_media = None;

        for asset in &assets {
            match self.push_media(token, asset).await {
                Ok(upload) => {
                    body = body.replace(&asset.url, &upload.url);
                    if featured_media.is_none() {
                        featured_media = Some(upload.id);
                    }
                    self.store
                        .set_media_remote(asset.id, upload.id, &upload.url)
                        .await?;
                }
                Err(e) => {
                    warn!("media {} failed for '{}': {}", asset.url, post.title, e);
                }
            }
        }

        if body != post.body {
            self.store.update_post_body(post.id, &body).await?;
        }

        let mut tag_ids = Vec::new();
        for name in post.tags.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match self.cms.get_or_create_tag(token, name).await {
                Ok(id) => tag_ids.push(id),
                Err(e) => warn!("tag '{}' failed for '{}': {}", name, post.title, e),
            }
        }

        let outgoing = NewPost {
            title: post.title.clone(),
            content: add_structured_data(&post.title, &body, post.published_at),
            status: "publish".to_string(),
            date: post.published_at.to_rfc3339(),
            categories: vec![post.category_id],
            tags: tag_ids,
            featured_media,
        };

        let remote_id = match self.cms.create_post(token, &outgoing).await {
            Ok(id) => id,
            Err(PipelineError::AuthExpired) => {
                info!("CMS credential expired, refreshing once");
                *token = self.cms.authenticate().await?;
                self.cms.create_post(token, &outgoing).await?
            }
            Err(e) => return Err(e),
        };

        // Remote id lands in its own commit before the state flip, so
        // a crash in between is recoverable instead of re-publishable.
        self.store.record_remote_id(post.id, remote_id).await?;
        self.store.mark_published(post.id).await?;
        info!("published '{}' as remote post {}", post.title, remote_id);

        // SEO meta is pushed per field; a failed field leaves a
        // partially annotated post, which is accepted.
        for (key, value) in seo_meta_fields(&post.seo) {
            if let Err(e) = self
                .cms
                .update_post_meta(token, remote_id, key, &value)
                .await
            {
                warn!("meta {} failed for remote post {}: {}", key, remote_id, e);
            }
        }

        Ok(Pushed::Created)
    }

    async fn push_media(&self, token: &str, asset: &MediaAsset) -> Result<MediaUpload> {
        // Already uploaded on an earlier attempt.
        if let (Some(id), Some(url)) = (asset.remote_id, asset.remote_url.as_ref()) {
            return Ok(MediaUpload {
                id,
                url: url.clone(),
            });
        }

        let (bytes, content_type) = self.media.fetch(&asset.url).await?;
        let filename = asset
            .url
            .rsplit('/')
            .next()
            .filter(|f| !f.is_empty())
            .unwrap_or("image");
        let mime = content_type.unwrap_or_else(|| "image/jpeg".to_string());

        self.cms.upload_media(token, filename, &mime, bytes).await
    }
}

fn seo_meta_fields(seo: &SeoMeta) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(title) = &seo.title {
        fields.push(("_yoast_wpseo_title", title.clone()));
    }
    if let Some(desc) = &seo.meta_description {
        fields.push(("_yoast_wpseo_metadesc", desc.clone()));
    }
    if let Some(focus) = &seo.focus_keyphrase {
        fields.push(("_yoast_wpseo_focuskw", focus.clone()));
    }
    if let Some(slug) = &seo.slug {
        fields.push(("_yoast_wpseo_slug", slug.clone()));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_data_is_appended_as_script() {
        let out = add_structured_data("Headline here", "Body text.", Utc::now());
        assert!(out.starts_with("Body text."));
        assert!(out.contains("application/ld+json"));
        assert!(out.contains("\"headline\":\"Headline here\""));
    }

    #[test]
    fn seo_fields_skip_absent_values() {
        let seo = SeoMeta {
            title: Some("T".to_string()),
            meta_description: None,
            focus_keyphrase: Some("kw".to_string()),
            slug: None,
        };
        let fields = seo_meta_fields(&seo);
        let keys: Vec<_> = fields.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["_yoast_wpseo_title", "_yoast_wpseo_focuskw"]);
    }
}
