//! `PostStore` over SQLite.

use std::{collections::BTreeMap, path::Path, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use tgm_core::{
    domain::{Channel, ChannelId, MediaKind, Post, PostId, StoredPost},
    store::PostStore,
    Error, Result,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS channels (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        last_updated TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        post_id INTEGER NOT NULL,
        channel_id INTEGER NOT NULL REFERENCES channels(id),
        post_url TEXT NOT NULL,
        post_date TEXT NOT NULL,
        views INTEGER NOT NULL DEFAULT 0,
        reactions TEXT NOT NULL DEFAULT '{}',
        post_type TEXT NOT NULL,
        content TEXT,
        PRIMARY KEY (post_id, channel_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_channel_date ON posts (channel_id, post_date DESC)",
];

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    username: String,
    title: String,
    last_updated: DateTime<Utc>,
}

impl From<ChannelRow> for Channel {
    fn from(r: ChannelRow) -> Self {
        Channel {
            id: ChannelId(r.id),
            username: r.username,
            title: r.title,
            last_updated: r.last_updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    post_id: i64,
    channel_id: i64,
    post_url: String,
    post_date: DateTime<Utc>,
    views: i64,
    reactions: String,
    post_type: String,
    content: Option<String>,
}

impl PostRow {
    fn into_stored(self) -> Result<StoredPost> {
        let reactions: BTreeMap<String, u64> = serde_json::from_str(&self.reactions)?;
        Ok(StoredPost {
            post_id: PostId(self.post_id),
            channel_id: ChannelId(self.channel_id),
            post_url: self.post_url,
            post_date: self.post_date,
            views: u64::try_from(self.views).unwrap_or(0),
            reactions,
            post_type: MediaKind::parse(&self.post_type),
            content: self.content,
        })
    }
}

fn storage(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file and ensure the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.display(), "Database ready");
        Ok(store)
    }

    /// Private in-memory database, for tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage)?
            .foreign_keys(true);
        // A second connection would see a different, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await
            .map_err(storage)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    pub async fn post_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.0)
    }
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // A username reassigned to another channel id: park the old row's
        // handle so the unique constraint does not reject the new one.
        let moved = sqlx::query(
            r#"
            UPDATE channels SET username = username || '#' || id
            WHERE username = ?1 COLLATE NOCASE AND id <> ?2
            "#,
        )
        .bind(&channel.username)
        .bind(channel.id.0)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        if moved.rows_affected() > 0 {
            info!(
                channel = %channel.username,
                id = channel.id.0,
                "Username moved to a new channel id"
            );
        }

        sqlx::query(
            r#"
            INSERT INTO channels (id, username, title, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (id) DO UPDATE SET
                username = excluded.username,
                title = excluded.title,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(channel.id.0)
        .bind(&channel.username)
        .bind(&channel.title)
        .bind(channel.last_updated)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn upsert_post(&self, post: &Post) -> Result<()> {
        let reactions = serde_json::to_string(&post.engagement.reactions)?;
        let content = (!post.text.is_empty()).then_some(post.text.as_str());
        let views = i64::try_from(post.engagement.views).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO posts (post_id, channel_id, post_url, post_date, views, reactions, post_type, content)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (post_id, channel_id) DO UPDATE SET
                post_url = excluded.post_url,
                post_date = excluded.post_date,
                views = excluded.views,
                reactions = excluded.reactions,
                post_type = excluded.post_type,
                content = excluded.content
            "#,
        )
        .bind(post.post_id.0)
        .bind(post.channel_id.0)
        .bind(&post.post_url)
        .bind(post.posted_at)
        .bind(views)
        .bind(reactions)
        .bind(post.media_kind.as_str())
        .bind(content)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, username, title, last_updated FROM channels ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(Channel::from).collect())
    }

    async fn channel_by_username(&self, username: &str) -> Result<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, username, title, last_updated FROM channels WHERE username = ?1 COLLATE NOCASE",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(Channel::from))
    }

    async fn recent_posts(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<StoredPost>> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT post_id, channel_id, post_url, post_date, views, reactions, post_type, content
            FROM posts
            WHERE channel_id = ?1
            ORDER BY post_date DESC, post_id DESC
            LIMIT ?2
            "#,
        )
        .bind(channel_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(PostRow::into_stored).collect()
    }
}
