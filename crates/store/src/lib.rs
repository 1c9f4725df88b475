//! Durable state for the relay engine: the dedup ledger, sequence counters,
//! and the append-only activity log, persisted in SQLite.

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    store::RelayStore,
    store_memory::InMemoryStore,
    store_sqlite::SqliteStore,
};

/// Run database migrations for the relay store.
///
/// Creates the `processed_files`, `counters`, and `activity_log` tables.
/// Called automatically by [`SqliteStore::new`]; call this yourself when
/// constructing a store from a shared pool via [`SqliteStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
