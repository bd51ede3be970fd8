//! Channel fetch pipeline: resolve -> page -> filter -> normalize -> engagement.
//!
//! Channels are processed strictly one after another. A failing channel never
//! aborts the batch; its outcome is recorded in its `ChannelFetch` instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    client::{port::RemoteClient, types::ChannelRef},
    domain::{Channel, Post},
    engagement,
    normalize::{build_post, normalize_channel_name},
    pacing::Pacing,
    retry::{page_size_for_attempt, RetryPolicy},
    Error,
};

/// How a single channel fetch ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchStatus {
    Complete,
    /// Stopped mid-page; posts collected before the error are kept.
    Partial { error: String },
    /// Flood-control wait too long to sit out.
    Skipped { reason: String, wait_secs: u64 },
    Failed { error: String },
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Complete => "complete",
            FetchStatus::Partial { .. } => "partial",
            FetchStatus::Skipped { .. } => "skipped",
            FetchStatus::Failed { .. } => "failed",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            FetchStatus::Complete => None,
            FetchStatus::Partial { error } | FetchStatus::Failed { error } => Some(error),
            FetchStatus::Skipped { reason, .. } => Some(reason),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChannelFetch {
    /// Name as requested (after trimming / `@` stripping).
    pub requested: String,
    /// Set whenever the message page was fetched, even if it yielded no posts.
    pub channel: Option<Channel>,
    pub posts: Vec<Post>,
    pub status: FetchStatus,
}

impl ChannelFetch {
    /// The error to surface when a caller needs this channel specifically.
    /// `None` once the page was fetched.
    pub fn error(&self) -> Option<Error> {
        if self.channel.is_some() {
            return None;
        }
        Some(match &self.status {
            FetchStatus::Skipped { wait_secs, .. } => Error::FloodWaitTooLong {
                seconds: *wait_secs,
            },
            other => Error::ChannelUnavailable {
                channel: self.requested.clone(),
                reason: other.detail().unwrap_or("not fetched").to_string(),
            },
        })
    }

    fn failed(requested: String, status: FetchStatus) -> Self {
        Self {
            requested,
            channel: None,
            posts: Vec::new(),
            status,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BatchReport {
    pub fetches: Vec<ChannelFetch>,
}

impl BatchReport {
    pub fn channels_attempted(&self) -> usize {
        self.fetches.len()
    }

    pub fn channels_with_posts(&self) -> usize {
        self.fetches.iter().filter(|f| !f.posts.is_empty()).count()
    }

    pub fn total_posts(&self) -> usize {
        self.fetches.iter().map(|f| f.posts.len()).sum()
    }

    /// All posts, channel by channel, each channel newest first.
    pub fn into_posts(self) -> Vec<Post> {
        self.fetches.into_iter().flat_map(|f| f.posts).collect()
    }
}

pub struct ChannelFetcher {
    client: Arc<dyn RemoteClient>,
    retry: RetryPolicy,
    pacing: Pacing,
}

impl ChannelFetcher {
    pub fn new(client: Arc<dyn RemoteClient>, retry: RetryPolicy, pacing: Pacing) -> Self {
        Self {
            client,
            retry,
            pacing,
        }
    }

    /// Fetch up to `page_limit` newest messages of one channel, dropping those
    /// posted before `since`.
    pub async fn fetch_channel(
        &self,
        name: &str,
        page_limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> ChannelFetch {
        let requested = normalize_channel_name(name);

        let entity = match self
            .retry
            .run("resolve", |_| self.client.resolve_entity(&requested))
            .await
        {
            Ok(e) => e,
            Err(e) => {
                warn!(channel = %requested, error = %e, "Could not resolve channel");
                return ChannelFetch::failed(requested, status_for(&e));
            }
        };

        let messages = match self
            .retry
            .run("messages", |attempt| {
                self.client
                    .fetch_messages(&entity, page_size_for_attempt(page_limit, attempt))
            })
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(channel = %requested, error = %e, "Could not fetch messages");
                return ChannelFetch::failed(requested, status_for(&e));
            }
        };

        let channel = channel_record(&entity, Utc::now());
        let mut posts = Vec::with_capacity(messages.len());
        let mut status = FetchStatus::Complete;

        for message in &messages {
            if since.is_some_and(|s| message.date < s) {
                debug!(channel = %requested, post_id = message.id.0, "Older than cutoff, skipped");
                continue;
            }
            if !posts.is_empty() {
                self.pacing.message_gap().await;
            }

            let engagement = engagement::collect(self.client.as_ref(), &entity, message).await;
            match build_post(&entity, message, engagement) {
                Ok(post) => posts.push(post),
                Err(e) => {
                    warn!(
                        channel = %requested,
                        post_id = message.id.0,
                        kept = posts.len(),
                        error = %e,
                        "Stopping channel early"
                    );
                    status = FetchStatus::Partial {
                        error: e.to_string(),
                    };
                    break;
                }
            }
        }

        info!(
            channel = %requested,
            fetched = messages.len(),
            kept = posts.len(),
            status = status.as_str(),
            "Channel processed"
        );

        ChannelFetch {
            requested,
            channel: Some(channel),
            posts,
            status,
        }
    }

    /// Fetch several channels sequentially with a randomized gap between them.
    pub async fn fetch_channels(
        &self,
        names: &[String],
        page_limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.pacing.channel_gap().await;
            }
            report
                .fetches
                .push(self.fetch_channel(name, page_limit, since).await);
        }

        info!(
            attempted = report.channels_attempted(),
            with_posts = report.channels_with_posts(),
            posts = report.total_posts(),
            "Batch finished"
        );
        report
    }
}

fn status_for(err: &Error) -> FetchStatus {
    match err {
        Error::FloodWaitTooLong { seconds } => FetchStatus::Skipped {
            reason: err.to_string(),
            wait_secs: *seconds,
        },
        _ => FetchStatus::Failed {
            error: err.to_string(),
        },
    }
}

fn channel_record(entity: &ChannelRef, now: DateTime<Utc>) -> Channel {
    Channel {
        id: entity.id,
        username: entity.username.clone(),
        title: entity
            .title
            .clone()
            .unwrap_or_else(|| entity.username.clone()),
        last_updated: now,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::{
        client::types::RawMessage,
        domain::{ChannelId, PostId},
        testing::{t0, FakeClient},
    };

    fn fetcher(client: FakeClient) -> (Arc<FakeClient>, ChannelFetcher) {
        let client = Arc::new(client);
        let f = ChannelFetcher::new(client.clone(), RetryPolicy::flood_control(), Pacing::none());
        (client, f)
    }

    fn msgs(ids: &[i64]) -> Vec<RawMessage> {
        ids.iter()
            .map(|&id| {
                let mut m = RawMessage::text(id, t0(), &format!("post {id}"));
                m.reactions = Some(vec![]);
                m
            })
            .collect()
    }

    #[tokio::test]
    async fn unresolvable_channel_does_not_abort_the_batch() {
        let (_, f) = fetcher(FakeClient::new().with_channel("good", 1, msgs(&[3, 2, 1])));

        let report = f
            .fetch_channels(&["good".to_string(), "@missing".to_string()], 10, None)
            .await;

        assert_eq!(report.channels_attempted(), 2);
        assert_eq!(report.channels_with_posts(), 1);
        assert!(matches!(report.fetches[1].status, FetchStatus::Failed { .. }));
        assert_eq!(report.fetches[1].requested, "missing");

        let posts = report.into_posts();
        assert_eq!(posts.len(), 3);
        assert!(posts.iter().all(|p| p.channel_id == ChannelId(1)));
        assert_eq!(
            posts.iter().map(|p| p.post_id).collect::<Vec<_>>(),
            vec![PostId(3), PostId(2), PostId(1)]
        );
    }

    #[tokio::test]
    async fn since_cutoff_checks_every_message() {
        let t = t0();
        let mut page = msgs(&[1, 2, 3]);
        page[0].date = t - ChronoDuration::days(10);
        page[1].date = t;
        page[2].date = t - ChronoDuration::days(1);
        let (_, f) = fetcher(FakeClient::new().with_channel("c", 1, page));

        let out = f
            .fetch_channel("c", 10, Some(t - ChronoDuration::days(5)))
            .await;

        let ids: Vec<i64> = out.posts.iter().map(|p| p.post_id.0).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(out.status, FetchStatus::Complete);
    }

    #[tokio::test]
    async fn page_limit_bounds_the_fetch() {
        let (client, f) = fetcher(FakeClient::new().with_channel("c", 1, msgs(&[5, 4, 3, 2, 1])));
        let out = f.fetch_channel("c", 2, None).await;
        assert_eq!(out.posts.len(), 2);
        assert_eq!(client.fetch_limits(), vec![("c".to_string(), 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn short_flood_wait_retries_with_half_page() {
        let (client, f) = fetcher(
            FakeClient::new()
                .with_channel("c", 1, msgs(&[4, 3, 2, 1]))
                .with_fetch_error("c", Error::FloodWait { seconds: 20 }),
        );
        let start = tokio::time::Instant::now();

        let out = f.fetch_channel("c", 4, None).await;

        assert_eq!(out.status, FetchStatus::Complete);
        assert_eq!(out.posts.len(), 2);
        assert_eq!(
            client.fetch_limits(),
            vec![("c".to_string(), 4), ("c".to_string(), 2)]
        );
        assert!(tokio::time::Instant::now() - start >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn long_flood_wait_skips_the_channel() {
        let (client, f) = fetcher(
            FakeClient::new()
                .with_channel("c", 1, msgs(&[1]))
                .with_fetch_error("c", Error::FloodWait { seconds: 900 }),
        );

        let out = f.fetch_channel("c", 10, None).await;

        assert!(matches!(
            out.status,
            FetchStatus::Skipped { wait_secs: 900, .. }
        ));
        assert!(out.posts.is_empty());
        assert!(out.channel.is_none());
        assert!(matches!(out.error(), Some(Error::FloodWaitTooLong { seconds: 900 })));
        assert_eq!(client.fetch_limits().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_flood_signal_fails_the_channel() {
        let (_, f) = fetcher(
            FakeClient::new()
                .with_channel("c", 1, msgs(&[1]))
                .with_fetch_error("c", Error::FloodWait { seconds: 3 })
                .with_fetch_error("c", Error::FloodWait { seconds: 3 }),
        );

        let out = f.fetch_channel("c", 10, None).await;
        assert!(matches!(out.status, FetchStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn bad_message_stops_channel_but_keeps_collected_posts() {
        let (_, f) = fetcher(FakeClient::new().with_channel("c", 1, msgs(&[9, 0, 7])));

        let out = f.fetch_channel("c", 10, None).await;

        assert_eq!(out.posts.len(), 1);
        assert_eq!(out.posts[0].post_id, PostId(9));
        assert!(matches!(out.status, FetchStatus::Partial { .. }));
        assert_eq!(out.channel.as_ref().map(|c| c.id), Some(ChannelId(1)));
    }

    #[tokio::test]
    async fn channel_record_carries_title() {
        let (_, f) = fetcher(FakeClient::new().with_channel("c", 42, vec![]));
        let out = f.fetch_channel("c", 10, None).await;
        let ch = out.channel.unwrap();
        assert_eq!(ch.id, ChannelId(42));
        assert_eq!(ch.title, "c title");
        assert!(out.posts.is_empty());
    }
}
