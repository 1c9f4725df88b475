//! Messages, documents, and fingerprints as seen through the transport.

use std::fmt;

/// A resolved source or destination channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    /// The identifier the channel was resolved from (e.g. `@updates`).
    pub input: String,
    /// Platform chat id.
    pub chat_id: i64,
    /// Channel title, when the platform reports one.
    pub title: Option<String>,
}

impl ChannelRef {
    /// Best display name for logs: title, else the configured identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.input)
    }
}

/// A document attached to a message. The filename attribute is optional on
/// the wire; messages without one are filtered out before any dedup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    /// Platform file id, stable for the same physical file.
    pub remote_id: String,
    /// Size in bytes.
    pub size: u64,
    /// Unix timestamp of the document, when available.
    pub timestamp: Option<i64>,
    /// Original filename attribute.
    pub file_name: Option<String>,
}

/// One message fetched from a source channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub id: i64,
    pub chat_id: i64,
    pub document: Option<RemoteDocument>,
}

/// Identifier for a physical file, independent of which message or channel
/// referenced it. Two documents with the same remote id and size (and
/// timestamp, when present) are the same file and are relayed at most once.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileFingerprint(String);

impl FileFingerprint {
    #[must_use]
    pub fn of(document: &RemoteDocument) -> Self {
        match document.timestamp {
            Some(ts) => Self(format!("{}_{}_{}", document.remote_id, document.size, ts)),
            None => Self(format!("{}_{}", document.remote_id, document.size)),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
