//! SQLite-backed relay store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    store::RelayStore,
    types::{ChannelCount, FileStats, LedgerEntry, RecentFile},
};

/// SQLite-backed persistence for the dedup ledger, counters, and audit log.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with its own connection pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    ///
    /// Call [`crate::run_migrations`] before using this constructor.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Close the underlying pool. Part of orderly shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RelayStore for SqliteStore {
    async fn has(&self, fingerprint: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM processed_files WHERE file_hash = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        // First write wins: a duplicate fingerprint leaves the existing row
        // untouched and reports success to the caller.
        sqlx::query(
            "INSERT INTO processed_files
             (file_hash, original_filename, new_filename, sequence_number, channel, file_size)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(file_hash) DO NOTHING",
        )
        .bind(&entry.fingerprint)
        .bind(&entry.original_filename)
        .bind(&entry.new_filename)
        .bind(entry.sequence as i64)
        .bind(&entry.channel)
        .bind(entry.file_size as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn next_sequence(&self, counter: &str) -> Result<u64> {
        // Lazy init + increment in one transaction so the persisted value and
        // the returned value can never diverge.
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO counters (counter_name, counter_value) VALUES (?, 0)")
            .bind(counter)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query(
            "UPDATE counters
             SET counter_value = counter_value + 1, last_updated = CURRENT_TIMESTAMP
             WHERE counter_name = ?
             RETURNING counter_value",
        )
        .bind(counter)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row.get::<i64, _>("counter_value") as u64)
    }

    async fn current_sequence(&self, counter: &str) -> Result<u64> {
        let row = sqlx::query("SELECT counter_value FROM counters WHERE counter_name = ?")
            .bind(counter)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("counter_value") as u64).unwrap_or(0))
    }

    async fn log_activity(&self, action: &str, details: &str) -> Result<()> {
        sqlx::query("INSERT INTO activity_log (action, details) VALUES (?, ?)")
            .bind(action)
            .bind(details)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn file_statistics(&self) -> Result<FileStats> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS n FROM processed_files")
            .fetch_one(&self.pool)
            .await?
            .get("n");

        let by_channel = sqlx::query(
            "SELECT channel, COUNT(*) AS n FROM processed_files GROUP BY channel ORDER BY n DESC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| ChannelCount {
            channel: row.get("channel"),
            count: row.get::<i64, _>("n") as u64,
        })
        .collect();

        let recent = sqlx::query(
            "SELECT new_filename, sequence_number, processed_at
             FROM processed_files
             ORDER BY sequence_number DESC
             LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| RecentFile {
            new_filename: row.get("new_filename"),
            sequence: row.get::<i64, _>("sequence_number") as u64,
            processed_at: row.get("processed_at"),
        })
        .collect();

        let current_sequence = self.current_sequence(crate::types::FILE_COUNTER).await?;

        Ok(FileStats {
            total_files: total as u64,
            by_channel,
            recent,
            current_sequence,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::FILE_COUNTER};

    async fn make_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn make_entry(fingerprint: &str, seq: u64) -> LedgerEntry {
        LedgerEntry {
            fingerprint: fingerprint.into(),
            original_filename: "report.npvt".into(),
            new_filename: format!("Rel_{seq:04}_archive_report.npvt"),
            sequence: seq,
            channel: "@source".into(),
            file_size: 1024,
        }
    }

    #[tokio::test]
    async fn test_record_and_has() {
        let store = make_store().await;
        assert!(!store.has("f1").await.unwrap());
        store.record(&make_entry("f1", 1)).await.unwrap();
        assert!(store.has("f1").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_is_idempotent_first_write_wins() {
        let store = make_store().await;
        store.record(&make_entry("f1", 1)).await.unwrap();

        let mut second = make_entry("f1", 2);
        second.new_filename = "other.npvt".into();
        // Must not error, must not overwrite.
        store.record(&second).await.unwrap();

        let stats = store.file_statistics().await.unwrap();
        assert_eq!(stats.total_files, 1);
        assert_eq!(stats.recent[0].sequence, 1);
        assert_eq!(stats.recent[0].new_filename, "Rel_0001_archive_report.npvt");
    }

    #[tokio::test]
    async fn test_sequence_starts_at_one_and_is_gapless() {
        let store = make_store().await;
        assert_eq!(store.current_sequence(FILE_COUNTER).await.unwrap(), 0);

        for expected in 1..=5u64 {
            assert_eq!(store.next_sequence(FILE_COUNTER).await.unwrap(), expected);
        }
        assert_eq!(store.current_sequence(FILE_COUNTER).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_independent_counters() {
        let store = make_store().await;
        assert_eq!(store.next_sequence("a").await.unwrap(), 1);
        assert_eq!(store.next_sequence("b").await.unwrap(), 1);
        assert_eq!(store.next_sequence("a").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = make_store().await;
        for seq in 1..=7u64 {
            let mut entry = make_entry(&format!("f{seq}"), seq);
            entry.channel = if seq % 2 == 0 { "@even".into() } else { "@odd".into() };
            store.record(&entry).await.unwrap();
            store.next_sequence(FILE_COUNTER).await.unwrap();
        }

        let stats = store.file_statistics().await.unwrap();
        assert_eq!(stats.total_files, 7);
        assert_eq!(stats.current_sequence, 7);
        assert_eq!(stats.recent.len(), 5);
        assert_eq!(stats.recent[0].sequence, 7);

        let odd = stats.by_channel.iter().find(|c| c.channel == "@odd").unwrap();
        assert_eq!(odd.count, 4);
    }

    #[tokio::test]
    async fn test_activity_log_append() {
        let store = make_store().await;
        store.log_activity("FILE_SENT", "report.npvt - #1").await.unwrap();
        store.log_activity("CYCLE_COMPLETE", "sent: 1").await.unwrap();
    }

    #[tokio::test]
    async fn test_persists_across_pools_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("relay.db").display());

        {
            let store = SqliteStore::new(&url).await.unwrap();
            store.record(&make_entry("f1", 1)).await.unwrap();
            store.next_sequence(FILE_COUNTER).await.unwrap();
            store.close().await;
        }

        let store = SqliteStore::new(&url).await.unwrap();
        assert!(store.has("f1").await.unwrap());
        assert_eq!(store.current_sequence(FILE_COUNTER).await.unwrap(), 1);
    }
}
