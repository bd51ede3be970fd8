use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};

/// Platform channel id (peer id, numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

/// Message id, unique within a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

/// Attached media, reduced to the kinds downstream consumers care about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    None,
    Photo,
    File,
    Poll,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::None => "none",
            MediaKind::Photo => "photo",
            MediaKind::File => "file",
            MediaKind::Poll => "poll",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "photo" => MediaKind::Photo,
            "file" => MediaKind::File,
            "poll" => MediaKind::Poll,
            "video" => MediaKind::Video,
            _ => MediaKind::None,
        }
    }
}

/// Serialized with the derived `total` alongside the counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Engagement {
    pub views: u64,
    pub forwards: u64,
    pub replies: u64,
    pub reactions: BTreeMap<String, u64>,
}

impl Engagement {
    pub fn reaction_total(&self) -> u64 {
        self.reactions.values().sum()
    }

    /// Views + forwards + all reactions.
    pub fn total(&self) -> u64 {
        self.views + self.forwards + self.reaction_total()
    }
}

impl Serialize for Engagement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("Engagement", 5)?;
        st.serialize_field("views", &self.views)?;
        st.serialize_field("forwards", &self.forwards)?;
        st.serialize_field("replies", &self.replies)?;
        st.serialize_field("reactions", &self.reactions)?;
        st.serialize_field("total", &self.total())?;
        st.end()
    }
}

/// One message pulled from a channel at fetch time, fully normalized.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Post {
    pub channel_id: ChannelId,
    pub channel_username: String,
    pub channel_title: String,
    pub post_id: PostId,
    pub post_url: String,
    pub posted_at: DateTime<Utc>,
    pub text: String,
    pub hashtags: Vec<String>,
    pub urls: Vec<String>,
    pub link_domains: Vec<String>,
    pub media_kind: MediaKind,
    pub engagement: Engagement,
    pub has_link: bool,
}

/// Channel record as persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub username: String,
    pub title: String,
    pub last_updated: DateTime<Utc>,
}

/// A post row read back from storage.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredPost {
    pub post_id: PostId,
    pub channel_id: ChannelId,
    pub post_url: String,
    pub post_date: DateTime<Utc>,
    pub views: u64,
    pub reactions: BTreeMap<String, u64>,
    pub post_type: MediaKind,
    pub content: Option<String>,
}

pub fn post_url(channel_username: &str, post_id: PostId) -> String {
    format!("https://t.me/{channel_username}/{}", post_id.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_total_sums_all_counters() {
        let mut e = Engagement {
            views: 100,
            forwards: 3,
            replies: 9,
            reactions: BTreeMap::new(),
        };
        e.reactions.insert("👍".to_string(), 5);
        e.reactions.insert("🔥".to_string(), 2);
        assert_eq!(e.reaction_total(), 7);
        assert_eq!(e.total(), 110);
    }

    #[test]
    fn engagement_json_carries_total() {
        let mut e = Engagement {
            views: 40,
            forwards: 2,
            ..Engagement::default()
        };
        e.reactions.insert("paid".to_string(), 3);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["total"], 45);
        assert_eq!(v["reactions"]["paid"], 3);

        let back: Engagement = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn media_kind_round_trips_through_storage_tag() {
        for kind in [
            MediaKind::None,
            MediaKind::Photo,
            MediaKind::File,
            MediaKind::Poll,
            MediaKind::Video,
        ] {
            assert_eq!(MediaKind::parse(kind.as_str()), kind);
        }
        assert_eq!(MediaKind::parse("text"), MediaKind::None);
    }

    #[test]
    fn post_url_uses_public_link_format() {
        assert_eq!(post_url("durov", PostId(42)), "https://t.me/durov/42");
    }
}
