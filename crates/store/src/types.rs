//! Row types for the relay ledger and its statistics views.

use serde::{Deserialize, Serialize};

/// Name of the default sequence counter.
pub const FILE_COUNTER: &str = "file_counter";

/// One successfully relayed file, keyed by its fingerprint.
///
/// Created exactly once, at the moment a relay succeeds, and never mutated
/// afterward. Re-recording the same fingerprint is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Fingerprint of the physical file (`{id}_{size}` or `{id}_{size}_{ts}`).
    pub fingerprint: String,
    /// Filename as it appeared on the source document.
    pub original_filename: String,
    /// Filename the file was published under.
    pub new_filename: String,
    /// Sequence number allocated for this relay.
    pub sequence: u64,
    /// Source channel the file was seen in.
    pub channel: String,
    /// Size of the document in bytes.
    pub file_size: u64,
}

/// Audit log entry. Diagnostic only, never load-bearing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub action: String,
    pub details: String,
    pub timestamp: String,
}

/// Per-channel relay count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCount {
    pub channel: String,
    pub count: u64,
}

/// A recently relayed file, for summary reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentFile {
    pub new_filename: String,
    pub sequence: u64,
    pub processed_at: String,
}

/// Aggregate ledger statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileStats {
    pub total_files: u64,
    pub by_channel: Vec<ChannelCount>,
    pub recent: Vec<RecentFile>,
    pub current_sequence: u64,
}
