use crate::types::{
    ImageRef, MediaAsset, NewsItem, PipelineError, Post, PostSource, ProcessingState,
    PublicationState, Result, SeoMeta, Theme,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS news_items (
        id BLOB PRIMARY KEY,
        source_url TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        summary TEXT,
        published_at TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '',
        state TEXT NOT NULL DEFAULT 'unprocessed',
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS themes (
        id BLOB PRIMARY KEY,
        category_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        keywords TEXT NOT NULL DEFAULT '',
        state TEXT NOT NULL DEFAULT 'unprocessed',
        created_at TEXT NOT NULL,
        UNIQUE (category_id, title)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id BLOB PRIMARY KEY,
        news_id BLOB REFERENCES news_items (id),
        theme_id BLOB REFERENCES themes (id),
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '',
        category_id INTEGER NOT NULL,
        category_name TEXT NOT NULL,
        seo_title TEXT,
        seo_metadesc TEXT,
        seo_focuskw TEXT,
        seo_slug TEXT,
        state TEXT NOT NULL,
        remote_id INTEGER,
        published_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_news ON posts (news_id) WHERE news_id IS NOT NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_theme ON posts (theme_id) WHERE theme_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_posts_state ON posts (state, category_id)",
    r#"
    CREATE TABLE IF NOT EXISTS media_assets (
        id BLOB PRIMARY KEY,
        post_id BLOB NOT NULL REFERENCES posts (id),
        url TEXT NOT NULL,
        alt_text TEXT NOT NULL DEFAULT '',
        remote_id INTEGER,
        remote_url TEXT,
        UNIQUE (post_id, url)
    )
    "#,
];

/// Persistent store for candidates, generated posts and media. All
/// dedup guarantees live here as uniqueness constraints so that
/// overlapping passes cannot race a check-then-insert.
#[derive(Clone)]
pub struct ContentStore {
    db: SqlitePool,
}

impl ContentStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // A single connection keeps in-memory databases alive and
        // matches the batch-sequential execution model.
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await?;

        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.db).await?;
        }
        debug!("store schema ready");
        Ok(())
    }

    // ---- news items ----

    /// Insert a news item unless its source URL was already seen.
    /// Returns true when the row is new.
    pub async fn insert_news_item(&self, item: &NewsItem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO news_items (id, source_url, title, summary, published_at, tags, state, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (source_url) DO NOTHING
            "#,
        )
        .bind(item.id)
        .bind(&item.source_url)
        .bind(&item.title)
        .bind(&item.summary)
        .bind(item.published_at)
        .bind(&item.tags)
        .bind(item.state.as_str())
        .bind(item.created_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_news_item(&self, id: Uuid) -> Result<Option<NewsItem>> {
        let row = sqlx::query("SELECT * FROM news_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| news_from_row(&r)).transpose()
    }

    pub async fn get_news_item_by_url(&self, source_url: &str) -> Result<Option<NewsItem>> {
        let row = sqlx::query("SELECT * FROM news_items WHERE source_url = ?1")
            .bind(source_url)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| news_from_row(&r)).transpose()
    }

    /// News items eligible for a generation attempt: no post yet, not
    /// rejected, and published inside the recency window.
    pub async fn news_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<NewsItem>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM news_items
            WHERE state != 'rejected'
              AND published_at >= ?1
              AND id NOT IN (SELECT news_id FROM posts WHERE news_id IS NOT NULL)
            ORDER BY published_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(news_from_row).collect()
    }

    pub async fn set_news_state(&self, id: Uuid, state: ProcessingState) -> Result<()> {
        sqlx::query("UPDATE news_items SET state = ?1 WHERE id = ?2")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ---- themes ----

    /// Insert a theme unless (category, title) was already seen.
    pub async fn insert_theme(&self, theme: &Theme) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO themes (id, category_id, title, description, keywords, state, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (category_id, title) DO NOTHING
            "#,
        )
        .bind(theme.id)
        .bind(theme.category_id)
        .bind(&theme.title)
        .bind(&theme.description)
        .bind(&theme.keywords)
        .bind(theme.state.as_str())
        .bind(theme.created_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn theme_titles(&self, category_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT title FROM themes WHERE category_id = ?1 ORDER BY created_at")
            .bind(category_id)
            .fetch_all(&self.db)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("title").map_err(PipelineError::from))
            .collect()
    }

    /// Themes with no generated article yet. Themes carry no source
    /// timestamp; the per-category quota bounds their backlog instead.
    pub async fn theme_candidates(&self) -> Result<Vec<Theme>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM themes
            WHERE state != 'rejected'
              AND id NOT IN (SELECT theme_id FROM posts WHERE theme_id IS NOT NULL)
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(theme_from_row).collect()
    }

    pub async fn set_theme_state(&self, id: Uuid, state: ProcessingState) -> Result<()> {
        sqlx::query("UPDATE themes SET state = ?1 WHERE id = ?2")
            .bind(state.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ---- posts & media ----

    /// Persist a generated post with its media rows and flip the
    /// source record to succeeded, all in one transaction so a crash
    /// between items never leaves a half-recorded attempt.
    pub async fn record_success(&self, post: &Post, images: &[ImageRef]) -> Result<()> {
        let (news_id, theme_id) = match post.source {
            PostSource::News(id) => (Some(id), None),
            PostSource::Theme(id) => (None, Some(id)),
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, news_id, theme_id, title, body, tags, category_id, category_name,
                seo_title, seo_metadesc, seo_focuskw, seo_slug,
                state, remote_id, published_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(post.id)
        .bind(news_id)
        .bind(theme_id)
        .bind(&post.title)
        .bind(&post.body)
        .bind(&post.tags)
        .bind(post.category_id)
        .bind(&post.category_name)
        .bind(&post.seo.title)
        .bind(&post.seo.meta_description)
        .bind(&post.seo.focus_keyphrase)
        .bind(&post.seo.slug)
        .bind(post.state.as_str())
        .bind(post.remote_id)
        .bind(post.published_at)
        .bind(post.created_at)
        .execute(&mut *tx)
        .await?;

        for image in images {
            sqlx::query(
                r#"
                INSERT INTO media_assets (id, post_id, url, alt_text)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (post_id, url) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(post.id)
            .bind(&image.url)
            .bind(&image.alt)
            .execute(&mut *tx)
            .await?;
        }

        match post.source {
            PostSource::News(id) => {
                sqlx::query("UPDATE news_items SET state = 'succeeded' WHERE id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            PostSource::Theme(id) => {
                sqlx::query("UPDATE themes SET state = 'succeeded' WHERE id = ?1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        info!(
            "recorded post '{}' ({}) with {} media rows",
            post.title,
            post.state.as_str(),
            images.len()
        );
        Ok(())
    }

    pub async fn post_for_news(&self, news_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE news_id = ?1")
            .bind(news_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    pub async fn post_for_theme(&self, theme_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE theme_id = ?1")
            .bind(theme_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// Drafts waiting to be pushed, limited to the publish-eligible
    /// category.
    pub async fn drafts_for_category(&self, category_id: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            "SELECT * FROM posts WHERE state = 'draft' AND category_id = ?1 ORDER BY created_at ASC",
        )
        .bind(category_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(post_from_row).collect()
    }

    pub async fn update_post_body(&self, id: Uuid, body: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET body = ?1 WHERE id = ?2")
            .bind(body)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Record the remote post id the moment the CMS accepts the post.
    /// Committed separately from `mark_published` so a crash between
    /// the two leaves a resumable trace instead of a double publish.
    pub async fn record_remote_id(&self, id: Uuid, remote_id: i64) -> Result<()> {
        sqlx::query("UPDATE posts SET remote_id = ?1 WHERE id = ?2")
            .bind(remote_id)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn mark_published(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE posts SET state = 'published' WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn media_for_post(&self, post_id: Uuid) -> Result<Vec<MediaAsset>> {
        let rows = sqlx::query("SELECT * FROM media_assets WHERE post_id = ?1")
            .bind(post_id)
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(media_from_row).collect()
    }

    pub async fn set_media_remote(&self, id: Uuid, remote_id: i64, remote_url: &str) -> Result<()> {
        sqlx::query("UPDATE media_assets SET remote_id = ?1, remote_url = ?2 WHERE id = ?3")
            .bind(remote_id)
            .bind(remote_url)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    // ---- stats ----

    pub async fn stats(&self) -> Result<HashMap<String, i64>> {
        let mut stats = HashMap::new();

        let queries = [
            ("news_items", "SELECT COUNT(*) FROM news_items"),
            (
                "news_unprocessed",
                "SELECT COUNT(*) FROM news_items WHERE state = 'unprocessed'",
            ),
            (
                "news_rejected",
                "SELECT COUNT(*) FROM news_items WHERE state = 'rejected'",
            ),
            ("themes", "SELECT COUNT(*) FROM themes"),
            ("posts", "SELECT COUNT(*) FROM posts"),
            (
                "posts_draft",
                "SELECT COUNT(*) FROM posts WHERE state = 'draft'",
            ),
            (
                "posts_published",
                "SELECT COUNT(*) FROM posts WHERE state = 'published'",
            ),
        ];

        for (key, query) in queries {
            let count: i64 = sqlx::query_scalar(query).fetch_one(&self.db).await?;
            stats.insert(key.to_string(), count);
        }

        Ok(stats)
    }
}

fn news_from_row(row: &SqliteRow) -> Result<NewsItem> {
    let state: String = row.try_get("state")?;
    Ok(NewsItem {
        id: row.try_get("id")?,
        source_url: row.try_get("source_url")?,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        published_at: row.try_get("published_at")?,
        tags: row.try_get("tags")?,
        state: ProcessingState::parse(&state)?,
        created_at: row.try_get("created_at")?,
    })
}

fn theme_from_row(row: &SqliteRow) -> Result<Theme> {
    let state: String = row.try_get("state")?;
    Ok(Theme {
        id: row.try_get("id")?,
        category_id: row.try_get("category_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        keywords: row.try_get("keywords")?,
        state: ProcessingState::parse(&state)?,
        created_at: row.try_get("created_at")?,
    })
}

fn post_from_row(row: &SqliteRow) -> Result<Post> {
    let news_id: Option<Uuid> = row.try_get("news_id")?;
    let theme_id: Option<Uuid> = row.try_get("theme_id")?;
    let source = match (news_id, theme_id) {
        (Some(id), None) => PostSource::News(id),
        (None, Some(id)) => PostSource::Theme(id),
        _ => {
            return Err(PipelineError::General(
                "post row references neither a news item nor a theme".to_string(),
            ))
        }
    };

    let state: String = row.try_get("state")?;
    Ok(Post {
        id: row.try_get("id")?,
        source,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        tags: row.try_get("tags")?,
        category_id: row.try_get("category_id")?,
        category_name: row.try_get("category_name")?,
        seo: SeoMeta {
            title: row.try_get("seo_title")?,
            meta_description: row.try_get("seo_metadesc")?,
            focus_keyphrase: row.try_get("seo_focuskw")?,
            slug: row.try_get("seo_slug")?,
        },
        state: PublicationState::parse(&state)?,
        remote_id: row.try_get("remote_id")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn media_from_row(row: &SqliteRow) -> Result<MediaAsset> {
    Ok(MediaAsset {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        url: row.try_get("url")?,
        alt_text: row.try_get("alt_text")?,
        remote_id: row.try_get("remote_id")?,
        remote_url: row.try_get("remote_url")?,
    })
}
