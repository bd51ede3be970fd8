//! JSON shapes spoken by the session gateway.
//!
//! The gateway serializes MTProto objects the way the common Python client
//! does (`to_dict()`): every object carries its constructor name under `"_"`.
//! Unknown constructors decode into `Other` variants instead of failing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tgm_core::{
    client::types::{
        ChannelRef, MessageEntity, MessageReactions, RawMedia, RawMessage, ReactionCount,
        ReactionKey,
    },
    domain::{ChannelId, PostId},
};

// Requests

#[derive(Debug, Serialize)]
pub struct ConnectRequest<'a> {
    pub api_id: i32,
    pub api_hash: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct ResolveRequest<'a> {
    pub username: &'a str,
}

#[derive(Debug, Serialize)]
pub struct InputPeer {
    #[serde(rename = "_")]
    pub kind: &'static str,
    pub channel_id: i64,
    pub access_hash: i64,
}

impl InputPeer {
    pub fn channel(c: &ChannelRef) -> Self {
        Self {
            kind: "InputPeerChannel",
            channel_id: c.id.0,
            access_hash: c.access_hash.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub peer: InputPeer,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "_")]
pub enum InvokeRequest {
    #[serde(rename = "messages.GetMessagesReactionsRequest")]
    GetMessagesReactions { peer: InputPeer, id: Vec<i64> },
}

#[derive(Debug, Serialize)]
pub struct InvokeEnvelope {
    pub request: InvokeRequest,
}

// Responses

#[derive(Debug, Deserialize)]
pub struct ConnectResponse {
    #[serde(default)]
    pub authorized: bool,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizedResponse {
    pub authorized: bool,
}

/// Error body of non-2xx gateway responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Some gateways already split `FLOOD_WAIT_X` into code + seconds.
    #[serde(default)]
    pub seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
pub enum Entity {
    Channel {
        id: i64,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        access_hash: Option<i64>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
pub enum Message {
    Message(MessageBody),
    MessageService { id: i64 },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub forwards: Option<u64>,
    #[serde(default)]
    pub replies: Option<Replies>,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub reactions: Option<MessageReactionsBody>,
    #[serde(default)]
    pub entities: Option<Vec<TextEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct Replies {
    #[serde(default)]
    pub replies: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
pub enum Media {
    MessageMediaPhoto {},
    MessageMediaDocument {
        #[serde(default)]
        document: Option<Document>,
    },
    MessageMediaPoll {},
    MessageMediaWebPage {
        #[serde(default)]
        webpage: Option<WebPage>,
    },
    MessageMediaGeo {},
    MessageMediaContact {},
    MessageMediaDice {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebPage {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Formatting entities inside message text.
#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
pub enum TextEntity {
    MessageEntityUrl {},
    MessageEntityTextUrl { url: String },
    MessageEntityHashtag {},
    MessageEntityMention {},
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct MessageReactionsBody {
    #[serde(default)]
    pub results: Vec<ReactionCountBody>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionCountBody {
    pub reaction: AnyReaction,
    pub count: u64,
}

/// Known reaction constructors, or any other one kept by its `_` name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AnyReaction {
    Known(Reaction),
    Unknown {
        #[serde(rename = "_")]
        constructor: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
pub enum Reaction {
    ReactionEmoji { emoticon: String },
    ReactionCustomEmoji { document_id: i64 },
    ReactionPaid,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
pub enum InvokeResult {
    Updates {
        #[serde(default)]
        updates: Vec<Update>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "_")]
pub enum Update {
    UpdateMessageReactions {
        msg_id: i64,
        reactions: MessageReactionsBody,
    },
    #[serde(other)]
    Other,
}

// Conversions into core types

impl Entity {
    /// `None` for anything that is not a channel.
    pub fn into_channel_ref(self, requested: &str) -> Option<ChannelRef> {
        match self {
            Entity::Channel {
                id,
                username,
                title,
                access_hash,
            } => Some(ChannelRef {
                id: ChannelId(id),
                username: username.unwrap_or_else(|| requested.to_string()),
                title,
                access_hash,
            }),
            Entity::Other => None,
        }
    }
}

impl MessageBody {
    pub fn into_raw(self) -> RawMessage {
        RawMessage {
            id: PostId(self.id),
            date: self.date,
            text: self.message,
            views: self.views,
            forwards: self.forwards,
            replies: self.replies.map(|r| r.replies),
            media: self.media.map(Media::into_raw),
            reactions: self.reactions.map(MessageReactionsBody::into_counts),
            entities: self
                .entities
                .unwrap_or_default()
                .into_iter()
                .map(TextEntity::into_raw)
                .collect(),
        }
    }
}

impl Media {
    fn into_raw(self) -> RawMedia {
        match self {
            Media::MessageMediaPhoto {} => RawMedia::Photo,
            Media::MessageMediaDocument { document } => RawMedia::Document {
                mime_type: document.and_then(|d| d.mime_type),
            },
            Media::MessageMediaPoll {} => RawMedia::Poll,
            Media::MessageMediaWebPage { webpage } => RawMedia::WebPage {
                kind: webpage.and_then(|w| w.kind),
            },
            Media::MessageMediaGeo {} => RawMedia::Other("geo".to_string()),
            Media::MessageMediaContact {} => RawMedia::Other("contact".to_string()),
            Media::MessageMediaDice {} => RawMedia::Other("dice".to_string()),
            Media::Other => RawMedia::Other("unknown".to_string()),
        }
    }
}

impl TextEntity {
    fn into_raw(self) -> MessageEntity {
        match self {
            TextEntity::MessageEntityUrl {} => MessageEntity::Url,
            TextEntity::MessageEntityTextUrl { url } => MessageEntity::TextUrl { url },
            TextEntity::MessageEntityHashtag {} => MessageEntity::Hashtag,
            TextEntity::MessageEntityMention {} => MessageEntity::Mention,
            TextEntity::Other => MessageEntity::Other("unknown".to_string()),
        }
    }
}

impl MessageReactionsBody {
    pub fn into_counts(self) -> Vec<ReactionCount> {
        self.results
            .into_iter()
            .map(|r| ReactionCount {
                reaction: match r.reaction {
                    AnyReaction::Known(Reaction::ReactionEmoji { emoticon }) => {
                        ReactionKey::Emoji(emoticon)
                    }
                    AnyReaction::Known(Reaction::ReactionCustomEmoji { document_id }) => {
                        ReactionKey::CustomEmoji(document_id)
                    }
                    AnyReaction::Known(Reaction::ReactionPaid) => ReactionKey::Paid,
                    AnyReaction::Unknown { constructor } => ReactionKey::Unknown(constructor),
                },
                count: r.count,
            })
            .collect()
    }
}

impl InvokeResult {
    pub fn into_reactions(self) -> Option<Vec<MessageReactions>> {
        match self {
            InvokeResult::Updates { updates } => Some(
                updates
                    .into_iter()
                    .filter_map(|u| match u {
                        Update::UpdateMessageReactions { msg_id, reactions } => {
                            Some(MessageReactions {
                                message_id: PostId(msg_id),
                                results: reactions.into_counts(),
                            })
                        }
                        Update::Other => None,
                    })
                    .collect(),
            ),
            InvokeResult::Other => None,
        }
    }
}
