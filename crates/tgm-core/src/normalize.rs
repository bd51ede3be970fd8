//! Raw message -> `Post` normalization.
//!
//! Everything here is pure: no I/O, no clock, same input same output.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::{
    client::types::{ChannelRef, MessageEntity, RawMedia, RawMessage},
    domain::{post_url, Engagement, MediaKind, Post},
    Error, Result,
};

fn newline_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n+").expect("valid regex"))
}

fn hashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#(\w+)").expect("valid regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"))
}

/// Collapse runs of newlines into one and trim. Absent text becomes `""`.
pub fn clean_text(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    newline_runs().replace_all(raw, "\n").trim().to_string()
}

/// Hashtag names (without `#`) in order of appearance, duplicates kept.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    hashtag_re()
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `http://` / `https://` tokens in order of appearance, up to the next
/// whitespace.
pub fn extract_urls(text: &str) -> Vec<String> {
    url_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn classify_media(message: &RawMessage) -> MediaKind {
    match &message.media {
        Some(RawMedia::Photo) => MediaKind::Photo,
        Some(RawMedia::Document { .. }) => MediaKind::File,
        Some(RawMedia::Poll) => MediaKind::Poll,
        Some(RawMedia::WebPage { kind: Some(kind) }) if kind == "video" => MediaKind::Video,
        _ => MediaKind::None,
    }
}

/// Whether the message carries a link entity. Decided from entities only,
/// independent of what `extract_urls` finds in the text.
pub fn has_link(message: &RawMessage) -> bool {
    message
        .entities
        .iter()
        .any(|e| matches!(e, MessageEntity::Url | MessageEntity::TextUrl { .. }))
}

/// Lowercased hosts of `urls` followed by text-link entity targets,
/// deduplicated, first occurrence wins. Unparseable URLs are skipped.
pub fn link_domains(urls: &[String], entities: &[MessageEntity]) -> Vec<String> {
    let entity_urls = entities.iter().filter_map(|e| match e {
        MessageEntity::TextUrl { url } => Some(url.as_str()),
        _ => None,
    });

    let mut out: Vec<String> = Vec::new();
    for raw in urls.iter().map(String::as_str).chain(entity_urls) {
        let Some(host) = Url::parse(raw).ok().and_then(|u| u.host_str().map(str::to_lowercase))
        else {
            continue;
        };
        if !out.contains(&host) {
            out.push(host);
        }
    }
    out
}

/// Trim and strip one leading `@`.
pub fn normalize_channel_name(raw: &str) -> String {
    let name = raw.trim();
    name.strip_prefix('@').unwrap_or(name).trim().to_string()
}

/// Split a comma-separated channel list, normalizing each entry and dropping
/// empty ones.
pub fn parse_channel_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(normalize_channel_name)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Assemble the normalized record for one message.
pub fn build_post(channel: &ChannelRef, message: &RawMessage, engagement: Engagement) -> Result<Post> {
    if message.id.0 <= 0 {
        return Err(Error::Rpc(format!(
            "message with invalid id {} in {}",
            message.id.0, channel.username
        )));
    }

    let text = clean_text(message.text.as_deref());
    let hashtags = extract_hashtags(&text);
    let urls = extract_urls(&text);
    let link_domains = link_domains(&urls, &message.entities);

    Ok(Post {
        channel_id: channel.id,
        channel_username: channel.username.clone(),
        channel_title: channel
            .title
            .clone()
            .unwrap_or_else(|| channel.username.clone()),
        post_id: message.id,
        post_url: post_url(&channel.username, message.id),
        posted_at: message.date,
        text,
        hashtags,
        urls,
        link_domains,
        media_kind: classify_media(message),
        engagement,
        has_link: has_link(message),
    })
}
