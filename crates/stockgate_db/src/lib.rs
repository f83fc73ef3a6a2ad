//! Persistence layer for Stockgate.
//!
//! Every table the mediation pipeline touches lives behind [`StockDb`]:
//! the action ledger and its audit log, the company catalog and stock
//! levels, purchase orders, BOM drafts and conversations.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stockgate_db::{StockDb, Result};
//!
//! let db = StockDb::open("~/.stockgate/stockgate.sqlite3").await?;
//!
//! let catalog = db.catalog_snapshot(&company, None).await?;
//! let action = db.action_insert(&proposed).await?;
//! ```
//!
//! Ledger transitions are compare-and-swap updates
//! (`UPDATE ... WHERE status = ?`), so two processes sharing one database
//! file cannot both move the same row out of `PROPOSED`.

mod error;
mod ids;
mod schema;
mod types;

// Method implementations organized by domain
mod actions;
mod bom;
mod catalog;
mod conversations;
mod inventory;

pub use actions::Transition;
pub use error::{DbError, Result};
pub use ids::*;
pub use types::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the Stockgate database. Cheap to clone (pooled).
#[derive(Clone)]
pub struct StockDb {
    pool: SqlitePool,
}

impl StockDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");

        Ok(db)
    }

    /// Private in-memory database (single connection).
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

// Timestamp utilities
impl StockDb {
    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Convert milliseconds to DateTime.
    pub fn millis_to_datetime(millis: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(millis).unwrap_or_else(chrono::Utc::now)
    }
}

pub(crate) fn opt_millis_to_datetime(millis: Option<i64>) -> Option<chrono::DateTime<chrono::Utc>> {
    millis.map(StockDb::millis_to_datetime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("test.db");

        let db = StockDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_schema() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");

        StockDb::open(&db_path).await.unwrap().close().await;
        let db = StockDb::open(&db_path).await.unwrap();
        let rows = db
            .action_list(&CompanyId::from_string("acme"), &ActionFilter::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
