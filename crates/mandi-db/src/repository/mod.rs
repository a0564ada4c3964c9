//! # Repository Module
//!
//! Database repository implementations for Mandi Prices.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Form submit / sync coordinator                                        │
//! │       │                                                                 │
//! │       │  db.price_records().insert("Wheat", "Pune", 2500.0)            │
//! │       ▼                                                                 │
//! │  PriceRecordRepository                                                 │
//! │  ├── insert / insert_with_hook / update / delete                       │
//! │  ├── get_all / get_unsynced / get_by_id                                │
//! │  └── mark_synced / clear_sync_state / count_unsynced / next_id         │
//! │       │                                                                 │
//! │       │  SQL (BEGIN IMMEDIATE for check-then-write)                    │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PriceRecordRepository`](price_record::PriceRecordRepository) - price records and their sync flags

pub mod price_record;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::SqliteConnection;
use tracing::warn;

use crate::error::{DbError, DbResult};

// =============================================================================
// Transactions
// =============================================================================

/// Starts a write transaction that takes the database write lock up front.
///
/// `BEGIN IMMEDIATE` makes a read-then-write body atomic against other
/// writers: a second writer waits at BEGIN instead of failing at COMMIT.
pub(crate) async fn begin_immediate(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
    Ok(())
}

/// Commits on `Ok`, rolls back on `Err`, and hands the body's result back.
///
/// A failed COMMIT can leave SQLite's transaction open, so it is rolled back
/// too; the connection always returns to the pool outside a transaction.
pub(crate) async fn finish<T>(conn: &mut SqliteConnection, result: DbResult<T>) -> DbResult<T> {
    match result {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(value),
            Err(commit_err) => {
                rollback(conn).await;
                Err(DbError::TransactionFailed(commit_err.to_string()))
            }
        },
        Err(err) => {
            rollback(conn).await;
            Err(err)
        }
    }
}

async fn rollback(conn: &mut SqliteConnection) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        // "no transaction is active" after SQLite already rolled back itself
        warn!(error = %e, "Rollback failed");
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Current time at the precision stored in `created_at`.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 text (`2024-05-01T10:00:00.000000Z`).
///
/// Every stored timestamp uses this form, so `ORDER BY created_at` on the
/// text column is chronological.
pub(crate) fn timestamp_text(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
