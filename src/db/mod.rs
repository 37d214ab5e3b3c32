pub mod models;
pub mod store;
pub mod writer;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::error::Result;

pub use store::{ListingFilter, ListingStore, StoreStats};
pub use writer::ListingWriter;

/// Open (creating if needed) the database file and bring the schema up to date.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn test_store() -> ListingStore {
    // One connection that never recycles: each in-memory connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    ListingStore::new(pool)
}

/// Store on a WAL database file through [`connect`], so several pooled
/// connections contend the way they do in the running service. Keep the
/// returned directory alive for the duration of the test.
#[cfg(test)]
pub(crate) async fn file_store() -> (ListingStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("listings.db");
    let pool = connect(path.to_str().unwrap()).await.unwrap();
    (ListingStore::new(pool), dir)
}
