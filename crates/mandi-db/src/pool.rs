//! # Database Handle
//!
//! Opens the SQLite store and prepares its schema.
//!
//! ```text
//! Database::new(DbConfig)
//!   ├── pool: WAL, synchronous = NORMAL, busy_timeout, create if missing
//!   ├── embedded migrations (migrations/sqlite)
//!   └── legacy import: crop_market_data[_backup] → price_records
//! ```
//!
//! Under WAL a sync cycle reading pending records does not stall a form
//! submission writing a new one.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::legacy::{self, LegacyMigration, LegacyReject};
use crate::migrations;
use crate::repository::price_record::PriceRecordRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Pool and startup settings.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/data/mandi.db")
///     .max_connections(4)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// Pool size. Default 5.
    pub max_connections: u32,

    /// Connections kept open. Default 1.
    pub min_connections: u32,

    /// Wait for a free pooled connection. Default 30 s.
    pub connect_timeout: Duration,

    /// Wait on SQLite's write lock. Default 5 s.
    pub busy_timeout: Duration,

    /// Default 10 min.
    pub idle_timeout: Duration,

    /// Run schema migrations and the legacy import in `Database::new`.
    pub run_migrations: bool,
}

impl DbConfig {
    /// Settings for a file-backed store. The file is created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Private store that lives as long as the pool. Used by tests.
    ///
    /// One connection only: every new SQLite connection to `:memory:` opens
    /// a separate, empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Handle to the record store. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the store and, unless disabled, migrates it.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::new("./mandi.db")).await?;
    /// let pending = db.price_records().count_unsynced().await?;
    /// ```
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening database");

        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());
        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(max_connections = config.max_connections, "Pool ready");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Applies pending schema migrations, then imports legacy tables.
    ///
    /// `Database::new` calls this unless `run_migrations(false)` was set.
    pub async fn run_migrations(&self) -> DbResult<LegacyMigration> {
        migrations::run_migrations(&self.pool).await?;
        let (total, applied) = migrations::migration_status(&self.pool).await?;

        let report = legacy::migrate_legacy_schema(&self.pool).await?;
        if report.is_noop() {
            info!(applied, total, "Schema up to date");
        } else {
            info!(
                applied,
                total,
                legacy_tables = ?report.tables,
                rejected = report.collapsed + report.skipped,
                "Schema up to date, legacy tables imported"
            );
        }
        Ok(report)
    }

    /// Raw pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn price_records(&self) -> PriceRecordRepository {
        PriceRecordRepository::new(self.pool.clone())
    }

    /// Legacy rows the import set aside instead of turning into records.
    pub async fn legacy_rejects(&self) -> DbResult<Vec<LegacyReject>> {
        legacy::legacy_rejects(&self.pool).await
    }

    /// Closes the pool. Later repository calls fail with `ConnectionFailed`.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// True when a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert_eq!(db.price_records().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_reports_connection_failure() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        assert!(!db.health_check().await);
        assert!(matches!(
            db.price_records().get_all().await,
            Err(DbError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_secs(1))
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert!(!config.run_migrations);
    }
}
