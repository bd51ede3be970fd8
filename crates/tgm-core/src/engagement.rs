use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    client::{
        port::RemoteClient,
        types::{ChannelRef, RawMessage, ReactionCount, RpcRequest, RpcResponse},
    },
    domain::Engagement,
    retry::RetryPolicy,
    Result,
};

/// Engagement counters for one message.
///
/// Inline reaction summaries are used when the page carried them; otherwise a
/// single reactions call is made. That call is best-effort: any failure yields
/// an empty reactions map and is only logged at debug level.
pub async fn collect(client: &dyn RemoteClient, channel: &ChannelRef, message: &RawMessage) -> Engagement {
    let reactions = match &message.reactions {
        Some(inline) => reaction_map(inline),
        None => match fetch_reactions(client, channel, message).await {
            Ok(map) => map,
            Err(e) => {
                debug!(
                    channel = %channel.username,
                    post_id = message.id.0,
                    error = %e,
                    "Reaction details unavailable"
                );
                BTreeMap::new()
            }
        },
    };

    Engagement {
        views: message.views.unwrap_or(0),
        forwards: message.forwards.unwrap_or(0),
        replies: message.replies.unwrap_or(0),
        reactions,
    }
}

/// Later entries with the same key overwrite earlier ones.
pub fn reaction_map(counts: &[ReactionCount]) -> BTreeMap<String, u64> {
    counts
        .iter()
        .map(|c| (c.reaction.as_key(), c.count))
        .collect()
}

async fn fetch_reactions(
    client: &dyn RemoteClient,
    channel: &ChannelRef,
    message: &RawMessage,
) -> Result<BTreeMap<String, u64>> {
    let response = RetryPolicy::no_retry()
        .run("reactions", |_| {
            client.call(RpcRequest::MessageReactions {
                channel: channel.clone(),
                message_ids: vec![message.id],
            })
        })
        .await?;

    match response {
        RpcResponse::Reactions(all) => Ok(all
            .iter()
            .filter(|r| r.message_id == message.id)
            .flat_map(|r| r.results.iter())
            .map(|c| (c.reaction.as_key(), c.count))
            .collect()),
        RpcResponse::Unknown(kind) => {
            debug!(post_id = message.id.0, kind = %kind, "Unexpected reactions response");
            Ok(BTreeMap::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::types::ReactionKey,
        domain::ChannelId,
        testing::{t0, FakeClient},
    };

    fn channel() -> ChannelRef {
        ChannelRef {
            id: ChannelId(1),
            username: "news".into(),
            title: None,
            access_hash: None,
        }
    }

    fn count(reaction: ReactionKey, count: u64) -> ReactionCount {
        ReactionCount { reaction, count }
    }

    #[tokio::test]
    async fn inline_reactions_need_no_extra_call() {
        let client = FakeClient::new();
        let mut m = RawMessage::text(3, t0(), "x");
        m.views = Some(120);
        m.forwards = Some(4);
        m.reactions = Some(vec![
            count(ReactionKey::Emoji("👍".into()), 7),
            count(ReactionKey::CustomEmoji(55), 2),
            count(ReactionKey::Paid, 1),
        ]);

        let e = collect(&client, &channel(), &m).await;
        assert_eq!(e.views, 120);
        assert_eq!(e.forwards, 4);
        assert_eq!(e.reactions.get("👍"), Some(&7));
        assert_eq!(e.reactions.get("custom:55"), Some(&2));
        assert_eq!(e.reactions.get("paid"), Some(&1));
        assert_eq!(client.rpc_calls(), 0);
    }

    #[tokio::test]
    async fn missing_inline_reactions_trigger_one_call() {
        let client =
            FakeClient::new().with_reactions(3, vec![count(ReactionKey::Emoji("🔥".into()), 9)]);
        let m = RawMessage::text(3, t0(), "x");

        let e = collect(&client, &channel(), &m).await;
        assert_eq!(e.views, 0);
        assert_eq!(e.reactions.get("🔥"), Some(&9));
        assert_eq!(client.rpc_calls(), 1);
    }

    #[tokio::test]
    async fn failed_reaction_call_degrades_to_empty_map() {
        let client = FakeClient::new().failing_reactions();
        let m = RawMessage::text(3, t0(), "x");

        let e = collect(&client, &channel(), &m).await;
        assert!(e.reactions.is_empty());
        assert_eq!(client.rpc_calls(), 1, "never retried");
    }

    #[test]
    fn duplicate_keys_keep_the_last_count() {
        let map = reaction_map(&[
            count(ReactionKey::Emoji("👍".into()), 1),
            count(ReactionKey::Emoji("👍".into()), 5),
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(map["👍"], 5);
    }
}
