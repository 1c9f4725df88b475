//! Persistence trait for the relay ledger.

use async_trait::async_trait;

use crate::{
    Result,
    types::{FileStats, LedgerEntry},
};

/// Durable state backing the relay engine: the dedup ledger, named sequence
/// counters, and the activity log.
///
/// `record` must be idempotent on fingerprint conflicts (first write wins,
/// no error to the caller). `next_sequence` must persist the increment
/// atomically so two callers never observe the same value and a crash never
/// skips one.
#[async_trait]
pub trait RelayStore: Send + Sync {
    /// True iff a ledger entry with this fingerprint exists.
    async fn has(&self, fingerprint: &str) -> Result<bool>;

    /// Insert a ledger entry. A duplicate fingerprint is a no-op.
    async fn record(&self, entry: &LedgerEntry) -> Result<()>;

    /// Atomically increment and return the named counter. First call on a
    /// fresh counter returns 1.
    async fn next_sequence(&self, counter: &str) -> Result<u64>;

    /// Read the named counter without incrementing. 0 if never used.
    async fn current_sequence(&self, counter: &str) -> Result<u64>;

    /// Append an audit record.
    async fn log_activity(&self, action: &str, details: &str) -> Result<()>;

    /// Aggregate statistics over the ledger.
    async fn file_statistics(&self) -> Result<FileStats>;
}
