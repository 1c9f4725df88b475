//! The transport seam: everything the engine needs from the remote
//! messaging service, and nothing else.

use std::{io, path::Path, time::Duration};

use {async_trait::async_trait, tempfile::NamedTempFile, thiserror::Error};

use crate::types::{ChannelRef, RemoteMessage};

/// Errors surfaced by a transport implementation.
///
/// `NotFound` and `Unavailable` are per-channel signals: the caller skips the
/// channel and continues the cycle. `RateLimited` is the remote service's
/// authoritative backpressure signal and is honored by sleeping for exactly
/// the reported duration before retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel not found: {channel}")]
    NotFound { channel: String },

    #[error("channel is private or inaccessible: {channel}")]
    Unavailable { channel: String },

    #[error("rate limited, retry after {seconds}s")]
    RateLimited { seconds: u64 },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl TransportError {
    #[must_use]
    pub fn not_found(channel: impl Into<String>) -> Self {
        Self::NotFound {
            channel: channel.into(),
        }
    }

    #[must_use]
    pub fn unavailable(channel: impl Into<String>) -> Self {
        Self::Unavailable {
            channel: channel.into(),
        }
    }

    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Wait duration when the error is a rate-limit signal.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { seconds } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }

    /// True iff the channel should be skipped rather than treated as a
    /// transport failure.
    #[must_use]
    pub fn is_channel_skip(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Unavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// The authenticated identity behind a connected transport.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub username: Option<String>,
    pub display_name: String,
}

/// A downloaded document in a scoped temporary buffer.
///
/// The backing file is removed when this value is dropped, on every exit
/// path including cancellation.
#[derive(Debug)]
pub struct DownloadedDocument {
    file: NamedTempFile,
    size: u64,
}

impl DownloadedDocument {
    #[must_use]
    pub fn new(file: NamedTempFile, size: u64) -> Self {
        Self { file, size }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read the whole buffer into memory for publishing.
    pub async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.file.path()).await
    }
}

/// Narrow interface to the remote messaging service.
///
/// Whatever session or credential exchange the platform needs happens inside
/// `connect`; the engine treats it as an opaque call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a usable session and return the authenticated identity.
    async fn connect(&self) -> Result<SessionInfo>;

    /// Resolve a channel identifier, distinguishing "not found" from
    /// "private or inaccessible".
    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelRef>;

    /// The most recent messages in a channel, newest first, at most `limit`.
    async fn recent_messages(&self, channel: &ChannelRef, limit: usize)
    -> Result<Vec<RemoteMessage>>;

    /// Download the message's document into a scoped temporary buffer.
    async fn download(&self, message: &RemoteMessage) -> Result<DownloadedDocument>;

    /// Publish a document to the destination under the given filename.
    async fn publish_document(
        &self,
        destination: &ChannelRef,
        bytes: &[u8],
        filename: &str,
        caption: &str,
    ) -> Result<()>;

    /// Forward the original message to the destination unchanged.
    async fn forward_message(&self, destination: &ChannelRef, message: &RemoteMessage)
    -> Result<()>;

    /// Release the connection. Idempotent.
    async fn disconnect(&self);
}
