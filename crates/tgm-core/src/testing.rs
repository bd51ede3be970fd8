//! In-memory fakes of the ports, for unit tests here and in adapter crates
//! (enable the `test-support` feature).

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    client::{
        port::RemoteClient,
        types::{
            ChannelRef, MessageReactions, RawMessage, ReactionCount, RpcRequest, RpcResponse,
        },
    },
    domain::{Channel, ChannelId, Post, StoredPost},
    store::PostStore,
    Error, Result,
};

/// Fixed reference instant for deterministic fixtures.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

struct FakeChannel {
    entity: ChannelRef,
    messages: Vec<RawMessage>,
    fetch_errors: VecDeque<Error>,
}

/// Scriptable `RemoteClient`.
pub struct FakeClient {
    channels: Mutex<HashMap<String, FakeChannel>>,
    reactions: Mutex<HashMap<i64, Vec<ReactionCount>>>,
    fail_reactions: AtomicBool,
    authorized: AtomicBool,
    connected: AtomicBool,
    connects: AtomicU32,
    rpc_calls: AtomicU32,
    fetch_limits: Mutex<Vec<(String, usize)>>,
    token: Option<String>,
}

impl Default for FakeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            reactions: Mutex::new(HashMap::new()),
            fail_reactions: AtomicBool::new(false),
            authorized: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            connects: AtomicU32::new(0),
            rpc_calls: AtomicU32::new(0),
            fetch_limits: Mutex::new(Vec::new()),
            token: None,
        }
    }

    pub fn with_channel(mut self, username: &str, id: i64, messages: Vec<RawMessage>) -> Self {
        self.channels.get_mut().unwrap().insert(
            username.to_string(),
            FakeChannel {
                entity: ChannelRef {
                    id: ChannelId(id),
                    username: username.to_string(),
                    title: Some(format!("{username} title")),
                    access_hash: Some(id * 7),
                },
                messages,
                fetch_errors: VecDeque::new(),
            },
        );
        self
    }

    /// Queue an error returned by the next `fetch_messages` for `username`.
    pub fn with_fetch_error(mut self, username: &str, err: Error) -> Self {
        if let Some(ch) = self.channels.get_mut().unwrap().get_mut(username) {
            ch.fetch_errors.push_back(err);
        }
        self
    }

    pub fn with_reactions(mut self, message_id: i64, results: Vec<ReactionCount>) -> Self {
        self.reactions.get_mut().unwrap().insert(message_id, results);
        self
    }

    pub fn failing_reactions(self) -> Self {
        self.fail_reactions.store(true, Ordering::SeqCst);
        self
    }

    pub fn unauthorized(self) -> Self {
        self.authorized.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_session_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn rpc_calls(&self) -> u32 {
        self.rpc_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_limits(&self) -> Vec<(String, usize)> {
        self.fetch_limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteClient for FakeClient {
    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_authorized(&self) -> Result<bool> {
        Ok(self.authorized.load(Ordering::SeqCst))
    }

    fn session_token(&self) -> Option<String> {
        self.token.clone()
    }

    async fn resolve_entity(&self, name: &str) -> Result<ChannelRef> {
        self.channels
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.entity.clone())
            .ok_or_else(|| Error::ChannelUnavailable {
                channel: name.to_string(),
                reason: "USERNAME_NOT_OCCUPIED".to_string(),
            })
    }

    async fn fetch_messages(&self, channel: &ChannelRef, limit: usize) -> Result<Vec<RawMessage>> {
        self.fetch_limits
            .lock()
            .unwrap()
            .push((channel.username.clone(), limit));

        let mut channels = self.channels.lock().unwrap();
        let ch = channels
            .get_mut(&channel.username)
            .ok_or_else(|| Error::Rpc("CHANNEL_INVALID".to_string()))?;
        if let Some(err) = ch.fetch_errors.pop_front() {
            return Err(err);
        }
        Ok(ch.messages.iter().take(limit).cloned().collect())
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse> {
        self.rpc_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reactions.load(Ordering::SeqCst) {
            return Err(Error::Rpc("MSG_ID_INVALID".to_string()));
        }
        match request {
            RpcRequest::MessageReactions { message_ids, .. } => {
                let reactions = self.reactions.lock().unwrap();
                let out = message_ids
                    .into_iter()
                    .map(|id| MessageReactions {
                        message_id: id,
                        results: reactions.get(&id.0).cloned().unwrap_or_default(),
                    })
                    .collect();
                Ok(RpcResponse::Reactions(out))
            }
        }
    }
}

/// `PostStore` backed by ordered maps.
#[derive(Default)]
pub struct MemoryStore {
    channels: Mutex<BTreeMap<i64, Channel>>,
    posts: Mutex<BTreeMap<(i64, i64), Post>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().unwrap().len()
    }

    pub fn post(&self, channel_id: i64, post_id: i64) -> Option<Post> {
        self.posts
            .lock()
            .unwrap()
            .get(&(channel_id, post_id))
            .cloned()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn upsert_channel(&self, channel: &Channel) -> Result<()> {
        let mut channels = self.channels.lock().unwrap();
        for stale in channels.values_mut().filter(|c| {
            c.id != channel.id && c.username.eq_ignore_ascii_case(&channel.username)
        }) {
            stale.username = format!("{}#{}", stale.username, stale.id.0);
        }
        channels.insert(channel.id.0, channel.clone());
        Ok(())
    }

    async fn upsert_post(&self, post: &Post) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .insert((post.channel_id.0, post.post_id.0), post.clone());
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(self.channels.lock().unwrap().values().cloned().collect())
    }

    async fn channel_by_username(&self, username: &str) -> Result<Option<Channel>> {
        Ok(self
            .channels
            .lock()
            .unwrap()
            .values()
            .find(|c| c.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn recent_posts(&self, channel_id: ChannelId, limit: usize) -> Result<Vec<StoredPost>> {
        let posts = self.posts.lock().unwrap();
        let mut out: Vec<StoredPost> = posts
            .values()
            .filter(|p| p.channel_id == channel_id)
            .map(|p| StoredPost {
                post_id: p.post_id,
                channel_id: p.channel_id,
                post_url: p.post_url.clone(),
                post_date: p.posted_at,
                views: p.engagement.views,
                reactions: p.engagement.reactions.clone(),
                post_type: p.media_kind,
                content: (!p.text.is_empty()).then(|| p.text.clone()),
            })
            .collect();
        out.sort_by(|a, b| b.post_date.cmp(&a.post_date));
        out.truncate(limit);
        Ok(out)
    }
}
