//! Per-channel candidate discovery.

use std::sync::Arc;

use tracing::debug;

use crate::{
    transport::{Result, Transport},
    types::{ChannelRef, RemoteMessage},
};

/// Fetches the most recent messages of one source channel.
///
/// `NotFound` and `Unavailable` pass through untouched so the caller can
/// skip the channel and continue with the rest of the cycle.
pub struct ChannelScanner {
    transport: Arc<dyn Transport>,
}

impl ChannelScanner {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Resolve the channel and return its newest messages, newest first,
    /// at most `limit`.
    pub async fn scan(
        &self,
        identifier: &str,
        limit: usize,
    ) -> Result<(ChannelRef, Vec<RemoteMessage>)> {
        let channel = self.transport.resolve_channel(identifier).await?;
        let mut messages = self.transport.recent_messages(&channel, limit).await?;
        messages.truncate(limit);

        debug!(
            channel = channel.display_name(),
            count = messages.len(),
            "scanned channel"
        );
        Ok((channel, messages))
    }
}
