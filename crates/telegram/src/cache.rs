//! Update-fed cache of recent channel posts.
//!
//! The Bot API has no "fetch channel history" call, so "the most recent N
//! messages" is served from a getUpdates feed: a background poller collects
//! channel posts into per-chat ring buffers, newest first on read.

use std::{
    collections::{HashMap, VecDeque},
    sync::RwLock,
};

use {
    teloxide::{
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use courier_engine::types::{RemoteDocument, RemoteMessage};

/// Messages retained per channel.
const CACHE_CAPACITY: usize = 100;

/// Wait after a failed getUpdates call before polling again.
const POLL_ERROR_BACKOFF_SECS: u64 = 5;

#[derive(Default)]
pub(crate) struct UpdateCache {
    by_chat: RwLock<HashMap<i64, VecDeque<RemoteMessage>>>,
}

impl UpdateCache {
    pub(crate) fn insert(&self, message: RemoteMessage) {
        let mut map = self.by_chat.write().unwrap_or_else(|e| e.into_inner());
        let ring = map.entry(message.chat_id).or_default();
        ring.push_front(message);
        ring.truncate(CACHE_CAPACITY);
    }

    /// Newest-first snapshot, at most `limit` messages.
    pub(crate) fn recent(&self, chat_id: i64, limit: usize) -> Vec<RemoteMessage> {
        let map = self.by_chat.read().unwrap_or_else(|e| e.into_inner());
        map.get(&chat_id)
            .map(|ring| ring.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

/// Convert a channel post into the engine's message shape.
pub(crate) fn to_remote_message(message: &Message) -> RemoteMessage {
    let document = message.document().map(|doc| RemoteDocument {
        remote_id: doc.file.id.clone(),
        size: u64::from(doc.file.size),
        timestamp: Some(message.date.timestamp()),
        file_name: doc.file_name.clone(),
    });
    RemoteMessage {
        id: i64::from(message.id.0),
        chat_id: message.chat.id.0,
        document,
    }
}

/// Poll getUpdates for channel posts until cancelled, feeding the cache.
pub(crate) async fn run_update_poller(
    bot: Bot,
    cache: std::sync::Arc<UpdateCache>,
    cancel: CancellationToken,
) {
    info!("telegram update poller started");
    let mut offset: i32 = 0;

    loop {
        if cancel.is_cancelled() {
            info!("telegram update poller stopped");
            break;
        }

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = bot
                .get_updates()
                .offset(offset)
                .timeout(30)
                .allowed_updates(vec![AllowedUpdate::ChannelPost])
                .send() => result,
        };

        match result {
            Ok(updates) => {
                for update in updates {
                    offset = update.id.as_offset();
                    if let UpdateKind::ChannelPost(message) = update.kind {
                        debug!(chat_id = message.chat.id.0, "cached channel post");
                        cache.insert(to_remote_message(&message));
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(std::time::Duration::from_secs(POLL_ERROR_BACKOFF_SECS)) => {},
                }
            },
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn msg(chat_id: i64, id: i64) -> RemoteMessage {
        RemoteMessage {
            id,
            chat_id,
            document: None,
        }
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let cache = UpdateCache::default();
        for id in 1..=5 {
            cache.insert(msg(7, id));
        }

        let recent = cache.recent(7, 3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, 5);
        assert_eq!(recent[2].id, 3);
    }

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let cache = UpdateCache::default();
        for id in 0..(CACHE_CAPACITY as i64 + 10) {
            cache.insert(msg(7, id));
        }

        let all = cache.recent(7, CACHE_CAPACITY + 10);
        assert_eq!(all.len(), CACHE_CAPACITY);
        assert_eq!(all[0].id, CACHE_CAPACITY as i64 + 9);
    }

    #[test]
    fn channels_are_isolated() {
        let cache = UpdateCache::default();
        cache.insert(msg(1, 10));
        cache.insert(msg(2, 20));

        assert_eq!(cache.recent(1, 10).len(), 1);
        assert_eq!(cache.recent(2, 10)[0].id, 20);
        assert!(cache.recent(3, 10).is_empty());
    }
}
