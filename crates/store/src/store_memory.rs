//! In-memory store for testing.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    Result,
    store::RelayStore,
    types::{ChannelCount, FileStats, LedgerEntry, RecentFile},
};

/// In-memory store backed by `HashMap`. No persistence; tests only.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<Vec<LedgerEntry>>,
    counters: Mutex<HashMap<String, u64>>,
    activity: Mutex<Vec<(String, String)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded ledger entries, in recording order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Snapshot of the audit log.
    pub fn activity(&self) -> Vec<(String, String)> {
        self.activity.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl RelayStore for InMemoryStore {
    async fn has(&self, fingerprint: &str) -> Result<bool> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().any(|e| e.fingerprint == fingerprint))
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.iter().any(|e| e.fingerprint == entry.fingerprint) {
            entries.push(entry.clone());
        }
        Ok(())
    }

    async fn next_sequence(&self, counter: &str) -> Result<u64> {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let value = counters.entry(counter.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn current_sequence(&self, counter: &str) -> Result<u64> {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        Ok(counters.get(counter).copied().unwrap_or(0))
    }

    async fn log_activity(&self, action: &str, details: &str) -> Result<()> {
        let mut activity = self.activity.lock().unwrap_or_else(|e| e.into_inner());
        activity.push((action.to_string(), details.to_string()));
        Ok(())
    }

    async fn file_statistics(&self) -> Result<FileStats> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in entries.iter() {
            *counts.entry(entry.channel.clone()).or_insert(0) += 1;
        }
        let mut by_channel: Vec<ChannelCount> = counts
            .into_iter()
            .map(|(channel, count)| ChannelCount { channel, count })
            .collect();
        by_channel.sort_by(|a, b| b.count.cmp(&a.count));

        let mut recent: Vec<&LedgerEntry> = entries.iter().collect();
        recent.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        let recent = recent
            .into_iter()
            .take(5)
            .map(|e| RecentFile {
                new_filename: e.new_filename.clone(),
                sequence: e.sequence,
                processed_at: String::new(),
            })
            .collect();

        let current_sequence = {
            let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            counters.get(crate::types::FILE_COUNTER).copied().unwrap_or(0)
        };

        Ok(FileStats {
            total_files: entries.len() as u64,
            by_channel,
            recent,
            current_sequence,
        })
    }
}
