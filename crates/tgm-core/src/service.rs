//! Application facade used by the HTTP surface, the poller and the CLI.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    domain::{Channel, Post, StoredPost},
    normalize::normalize_channel_name,
    pipeline::{BatchReport, ChannelFetch, ChannelFetcher},
    store::PostStore,
    supervisor::{ClientSupervisor, SupervisorStatus},
    Error, Result,
};

pub const POSTS_DEFAULT_LIMIT: usize = 10;
pub const POSTS_MAX_LIMIT: usize = 50;
pub const CHANNEL_DEFAULT_LIMIT: usize = 50;
pub const CHANNEL_MAX_LIMIT: usize = 200;

/// Requested limit, defaulted and clamped into `1..=max`.
pub fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    requested.unwrap_or(default).clamp(1, max)
}

#[derive(Clone, Debug, Serialize)]
pub struct PostsMeta {
    pub channels_processed: usize,
    pub channels_with_posts: usize,
    pub total_posts: usize,
    pub retrieved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PostsResponse {
    pub posts: Vec<Post>,
    pub meta: PostsMeta,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChannelPosts {
    pub channel: Channel,
    pub posts: Vec<StoredPost>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefreshOutcome {
    pub channel: Channel,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub posts_saved: usize,
    pub posts: Vec<Post>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AccessCheck {
    pub channel: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceStatus {
    #[serde(flatten)]
    pub client: SupervisorStatus,
    pub started_at: DateTime<Utc>,
    pub channels_stored: usize,
}

pub struct MonitorService {
    supervisor: Arc<ClientSupervisor>,
    fetcher: ChannelFetcher,
    store: Arc<dyn PostStore>,
    started_at: DateTime<Utc>,
}

impl MonitorService {
    pub fn new(
        supervisor: Arc<ClientSupervisor>,
        fetcher: ChannelFetcher,
        store: Arc<dyn PostStore>,
    ) -> Self {
        Self {
            supervisor,
            fetcher,
            store,
            started_at: Utc::now(),
        }
    }

    pub fn supervisor(&self) -> &Arc<ClientSupervisor> {
        &self.supervisor
    }

    /// Live fetch across channels, nothing persisted. `limit` is clamped to
    /// `POSTS_MAX_LIMIT`.
    pub async fn fetch_posts(
        &self,
        channels: &[String],
        limit: Option<usize>,
        days_back: Option<i64>,
    ) -> Result<PostsResponse> {
        self.supervisor.ensure_connected().await?;

        let limit = clamp_limit(limit, POSTS_DEFAULT_LIMIT, POSTS_MAX_LIMIT);
        let since = days_back
            .filter(|d| *d >= 0)
            .map(|d| Utc::now() - ChronoDuration::days(d));

        let report = self.fetcher.fetch_channels(channels, limit, since).await;
        let meta = PostsMeta {
            channels_processed: report.channels_attempted(),
            channels_with_posts: report.channels_with_posts(),
            total_posts: report.total_posts(),
            retrieved_at: Utc::now(),
        };
        Ok(PostsResponse {
            posts: report.into_posts(),
            meta,
        })
    }

    /// Synchronous re-fetch of one channel, persisted.
    pub async fn refresh_channel(&self, username: &str, limit: Option<usize>) -> Result<RefreshOutcome> {
        self.supervisor.ensure_connected().await?;

        let limit = clamp_limit(limit, CHANNEL_DEFAULT_LIMIT, CHANNEL_MAX_LIMIT);
        let fetch = self.fetcher.fetch_channel(username, limit, None).await;
        if let Some(err) = fetch.error() {
            return Err(err);
        }

        let posts_saved = self.persist(&fetch).await?;
        let ChannelFetch {
            channel,
            posts,
            status,
            ..
        } = fetch;
        let channel = channel.ok_or_else(|| Error::NotFound(username.to_string()))?;

        Ok(RefreshOutcome {
            channel,
            status: status.as_str(),
            detail: status.detail().map(str::to_string),
            posts_saved,
            posts,
        })
    }

    /// Stored posts of a channel. Unknown channels are fetched live (and
    /// persisted) first.
    pub async fn channel_posts(&self, username: &str, limit: Option<usize>) -> Result<ChannelPosts> {
        let name = normalize_channel_name(username);
        let limit = clamp_limit(limit, CHANNEL_DEFAULT_LIMIT, CHANNEL_MAX_LIMIT);

        let channel = match self.store.channel_by_username(&name).await? {
            Some(c) => c,
            None => {
                info!(channel = %name, "Unknown channel, fetching live");
                self.refresh_channel(&name, Some(limit)).await?.channel
            }
        };

        let posts = self.store.recent_posts(channel.id, limit).await?;
        Ok(ChannelPosts { channel, posts })
    }

    pub async fn list_channels(&self) -> Result<Vec<Channel>> {
        self.store.list_channels().await
    }

    /// Start a background refresh and return immediately.
    pub fn spawn_refresh(self: &Arc<Self>, username: String, limit: Option<usize>) -> JoinHandle<()> {
        let svc = self.clone();
        tokio::spawn(async move {
            match svc.refresh_channel(&username, limit).await {
                Ok(out) => info!(
                    channel = %username,
                    saved = out.posts_saved,
                    status = out.status,
                    "Background refresh finished"
                ),
                Err(e) => warn!(channel = %username, error = %e, "Background refresh failed"),
            }
        })
    }

    /// Sequential refresh of many channels, persisting every fetched page.
    pub async fn refresh_all(&self, names: &[String], limit: usize) -> Result<BatchReport> {
        self.supervisor.ensure_connected().await?;

        let report = self.fetcher.fetch_channels(names, limit, None).await;
        for fetch in &report.fetches {
            if let Err(e) = self.persist(fetch).await {
                error!(channel = %fetch.requested, error = %e, "Failed to persist channel");
            }
        }
        Ok(report)
    }

    /// Resolve each channel and read one message, reporting access per channel.
    pub async fn verify_access(&self, names: &[String]) -> Result<Vec<AccessCheck>> {
        self.supervisor.ensure_connected().await?;

        let report = self.fetcher.fetch_channels(names, 1, None).await;
        Ok(report
            .fetches
            .into_iter()
            .map(|f| AccessCheck {
                ok: f.channel.is_some(),
                title: f.channel.as_ref().map(|c| c.title.clone()),
                detail: f.status.detail().map(str::to_string),
                channel: f.requested,
            })
            .collect())
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        Ok(ServiceStatus {
            client: self.supervisor.status(),
            started_at: self.started_at,
            channels_stored: self.store.list_channels().await?.len(),
        })
    }

    /// Channel first (posts reference it), then each post.
    async fn persist(&self, fetch: &ChannelFetch) -> Result<usize> {
        let Some(channel) = &fetch.channel else {
            return Ok(0);
        };
        self.store.upsert_channel(channel).await?;
        for post in &fetch.posts {
            self.store.upsert_post(post).await?;
        }
        Ok(fetch.posts.len())
    }
}
