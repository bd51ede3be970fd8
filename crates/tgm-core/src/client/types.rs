use chrono::{DateTime, Utc};

use crate::domain::{ChannelId, PostId};

/// A resolved channel entity, as returned by `resolve_entity`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: ChannelId,
    pub username: String,
    pub title: Option<String>,
    /// Opaque peer credential the gateway needs to address the channel again.
    pub access_hash: Option<i64>,
}

/// Incoming message, decoded from the remote response.
///
/// Counters are optional because the platform omits them for some message
/// kinds and for channels with hidden statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMessage {
    pub id: PostId,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    pub views: Option<u64>,
    pub forwards: Option<u64>,
    pub replies: Option<u64>,
    pub media: Option<RawMedia>,
    /// Inline reaction summary (`None` when the page did not carry one).
    pub reactions: Option<Vec<ReactionCount>>,
    pub entities: Vec<MessageEntity>,
}

impl RawMessage {
    /// Minimal text message, convenient for fakes and tests.
    pub fn text(id: i64, date: DateTime<Utc>, text: &str) -> Self {
        Self {
            id: PostId(id),
            date,
            text: Some(text.to_string()),
            views: None,
            forwards: None,
            replies: None,
            media: None,
            reactions: None,
            entities: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawMedia {
    Photo,
    Document { mime_type: Option<String> },
    Poll,
    WebPage { kind: Option<String> },
    /// Anything else (geo, contact, dice, ...), kept by type name.
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageEntity {
    Url,
    TextUrl { url: String },
    Hashtag,
    Mention,
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ReactionKey {
    Emoji(String),
    CustomEmoji(i64),
    Paid,
    Unknown(String),
}

impl ReactionKey {
    /// Key used in the reactions map.
    pub fn as_key(&self) -> String {
        match self {
            ReactionKey::Emoji(e) => e.clone(),
            ReactionKey::CustomEmoji(id) => format!("custom:{id}"),
            ReactionKey::Paid => "paid".to_string(),
            ReactionKey::Unknown(raw) => raw.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionCount {
    pub reaction: ReactionKey,
    pub count: u64,
}

/// Raw RPC requests routed through `RemoteClient::call`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcRequest {
    /// Reaction details for specific messages of a channel.
    MessageReactions {
        channel: ChannelRef,
        message_ids: Vec<PostId>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcResponse {
    Reactions(Vec<MessageReactions>),
    /// Response shape the client did not recognize.
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageReactions {
    pub message_id: PostId,
    pub results: Vec<ReactionCount>,
}
