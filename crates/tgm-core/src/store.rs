use async_trait::async_trait;

use crate::{
    domain::{Channel, ChannelId, Post, StoredPost},
    Result,
};

/// Persistence port.
///
/// Both upserts are idempotent replace-on-conflict writes: channels keyed by
/// `id`, posts by `(post_id, channel_id)`. Re-writing a key overwrites every
/// column with the newer values.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn upsert_channel(&self, channel: &Channel) -> Result<()>;
    async fn upsert_post(&self, post: &Post) -> Result<()>;

    async fn list_channels(&self) -> Result<Vec<Channel>>;
    async fn channel_by_username(&self, username: &str) -> Result<Option<Channel>>;

    /// Most recent posts of a channel, newest first.
    async fn recent_posts(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<StoredPost>>;
}
