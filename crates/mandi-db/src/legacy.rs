//! # Legacy Schema Import
//!
//! Earlier app versions stored prices in `crop_market_data`, with a TEXT or
//! INTEGER id, a REAL price and case-sensitive uniqueness. An interrupted
//! upgrade of that table could also leave `crop_market_data_backup` behind.
//!
//! ## Copy-Then-Replace
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN IMMEDIATE                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for table in [crop_market_data, crop_market_data_backup]:             │
//! │       for row in table (insertion order):                              │
//! │           invalid name/price?      → skipped, copied to rejects      │
//! │           normalized triple taken? → collapsed, copied to rejects      │
//! │           otherwise                → INSERT INTO price_records         │
//! │       DROP TABLE table                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT (any storage error → ROLLBACK, legacy tables untouched)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No legacy row is lost: rows that do not become price records are copied
//! verbatim into `legacy_price_rejects` with the reason, and collapsed rows
//! also name the record they were merged into. See [`legacy_rejects`].
//!
//! Integer ids are kept when free; TEXT ids get fresh ones. Prices are
//! rounded to paise. Timestamps in RFC 3339 or SQLite's
//! `YYYY-MM-DD HH:MM:SS` form are read as UTC; anything else becomes the
//! migration time.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use mandi_core::NewPriceRecord;
use sqlx::{FromRow, Row, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::DbResult;
use crate::repository::{begin_immediate, finish, now, timestamp_text};

/// Legacy tables, in import order.
const LEGACY_TABLES: [&str; 2] = ["crop_market_data", "crop_market_data_backup"];

/// What the legacy import did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyMigration {
    /// Legacy tables that were found, imported and dropped.
    pub tables: Vec<String>,
    /// Rows written to `price_records`.
    pub imported: u64,
    /// Rows merged into an earlier row with the same normalized triple.
    pub collapsed: u64,
    /// Rows dropped for an empty name or a non-positive price.
    pub skipped: u64,
}

impl LegacyMigration {
    /// True when no legacy table was present.
    pub fn is_noop(&self) -> bool {
        self.tables.is_empty()
    }
}

/// A legacy row kept aside by the import.
///
/// Value columns are read back as text or REAL; `None` means the legacy
/// row held NULL.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LegacyReject {
    pub source_table: String,
    pub legacy_id: Option<String>,
    pub crop_name: Option<String>,
    pub district_name: Option<String>,
    pub market_selling_price: Option<f64>,
    pub is_synced: Option<i64>,
    pub created_at: Option<String>,
    pub reason: String,
    /// Price record the row was collapsed into.
    pub merged_into: Option<i64>,
    pub rejected_at: String,
}

/// Lists every rejected legacy row, oldest first.
pub async fn legacy_rejects(pool: &SqlitePool) -> DbResult<Vec<LegacyReject>> {
    let rejects = sqlx::query_as::<_, LegacyReject>(
        "SELECT
             source_table,
             CAST(legacy_id AS TEXT) AS legacy_id,
             CAST(crop_name AS TEXT) AS crop_name,
             CAST(district_name AS TEXT) AS district_name,
             CAST(market_selling_price AS REAL) AS market_selling_price,
             CAST(is_synced AS INTEGER) AS is_synced,
             CAST(created_at AS TEXT) AS created_at,
             reason,
             merged_into,
             rejected_at
         FROM legacy_price_rejects
         ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rejects)
}

/// Imports and drops any legacy price tables.
///
/// Safe to call on every startup; without legacy tables it only runs one
/// `sqlite_master` lookup.
pub async fn migrate_legacy_schema(pool: &SqlitePool) -> DbResult<LegacyMigration> {
    let present: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name IN ('crop_market_data', 'crop_market_data_backup')",
    )
    .fetch_all(pool)
    .await?;

    if present.is_empty() {
        debug!("No legacy tables found");
        return Ok(LegacyMigration::default());
    }

    info!(tables = ?present, "Importing legacy price tables");

    let mut conn = pool.acquire().await?;
    begin_immediate(&mut conn).await?;
    let result = import_locked(&mut conn, &present).await;
    let report = finish(&mut conn, result).await?;

    info!(
        imported = report.imported,
        collapsed = report.collapsed,
        skipped = report.skipped,
        "Legacy import complete"
    );

    Ok(report)
}

async fn import_locked(conn: &mut SqliteConnection, present: &[String]) -> DbResult<LegacyMigration> {
    let mut report = LegacyMigration::default();
    let migrated_at = now();
    let rejected_at = timestamp_text(&migrated_at);

    for table in LEGACY_TABLES {
        if !present.iter().any(|name| name == table) {
            continue;
        }

        // `table` comes from LEGACY_TABLES, never from input.
        let rows = sqlx::query(&format!(
            "SELECT
                 rowid AS legacy_rowid,
                 CASE WHEN typeof(id) = 'integer' THEN id END AS int_id,
                 CAST(crop_name AS TEXT) AS crop_name,
                 CAST(district_name AS TEXT) AS district_name,
                 CAST(market_selling_price AS REAL) AS price,
                 CAST(COALESCE(is_synced, 0) AS INTEGER) AS is_synced,
                 CAST(created_at AS TEXT) AS created_at
             FROM {table}
             ORDER BY rowid"
        ))
        .fetch_all(&mut *conn)
        .await?;

        for row in rows {
            let rowid: i64 = row.try_get("legacy_rowid")?;
            let int_id: Option<i64> = row.try_get("int_id")?;
            let crop_name: Option<String> = row.try_get("crop_name")?;
            let district_name: Option<String> = row.try_get("district_name")?;
            let price: Option<f64> = row.try_get("price")?;
            let is_synced: i64 = row.try_get("is_synced")?;
            let created_at: Option<String> = row.try_get("created_at")?;

            let parsed = NewPriceRecord::parse(
                crop_name.as_deref().unwrap_or_default(),
                district_name.as_deref().unwrap_or_default(),
                price.unwrap_or_default(),
            );
            let new = match parsed {
                Ok(new) => new,
                Err(e) => {
                    warn!(table, id = ?int_id, error = %e, "Skipping invalid legacy row");
                    let reject = Reject {
                        table,
                        rowid,
                        reason: e.to_string(),
                        merged_into: None,
                    };
                    set_aside(conn, &reject, &rejected_at).await?;
                    report.skipped += 1;
                    continue;
                }
            };

            let taken: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM price_records
                 WHERE crop_key = ?1 AND district_key = ?2 AND price_paise = ?3",
            )
            .bind(new.crop_key())
            .bind(new.district_key())
            .bind(new.selling_price.paise())
            .fetch_optional(&mut *conn)
            .await?;

            if let Some(existing) = taken {
                debug!(table, existing, "Collapsing duplicate legacy row");
                let reject = Reject {
                    table,
                    rowid,
                    reason: format!("duplicate of price record {existing}"),
                    merged_into: Some(existing),
                };
                set_aside(conn, &reject, &rejected_at).await?;
                report.collapsed += 1;
                continue;
            }

            let keep_id = match int_id {
                Some(id) => id_is_free(conn, id).await?.then_some(id),
                None => None,
            };
            let created_at = created_at
                .as_deref()
                .and_then(parse_legacy_timestamp)
                .unwrap_or(migrated_at);

            sqlx::query(
                "INSERT INTO price_records
                     (id, crop_name, district_name, crop_key, district_key,
                      price_paise, is_synced, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(keep_id)
            .bind(&new.crop_name)
            .bind(&new.district_name)
            .bind(new.crop_key())
            .bind(new.district_key())
            .bind(new.selling_price.paise())
            .bind(is_synced != 0)
            .bind(timestamp_text(&created_at))
            .execute(&mut *conn)
            .await?;

            report.imported += 1;
        }

        sqlx::query(&format!("DROP TABLE {table}"))
            .execute(&mut *conn)
            .await?;
        report.tables.push(table.to_string());
    }

    Ok(report)
}

struct Reject<'a> {
    table: &'a str,
    rowid: i64,
    reason: String,
    merged_into: Option<i64>,
}

/// Copies one legacy row, untouched, into `legacy_price_rejects`.
async fn set_aside(
    conn: &mut SqliteConnection,
    reject: &Reject<'_>,
    rejected_at: &str,
) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO legacy_price_rejects
             (source_table, legacy_id, crop_name, district_name, market_selling_price,
              is_synced, created_at, reason, merged_into, rejected_at)
         SELECT ?1, id, crop_name, district_name, market_selling_price,
                is_synced, created_at, ?2, ?3, ?4
         FROM {} WHERE rowid = ?5",
        reject.table
    ))
    .bind(reject.table)
    .bind(&reject.reason)
    .bind(reject.merged_into)
    .bind(rejected_at)
    .bind(reject.rowid)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn id_is_free(conn: &mut SqliteConnection, id: i64) -> DbResult<bool> {
    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM price_records WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(taken.is_none())
}

/// Reads `2024-05-01T10:00:00.000Z` or `2024-05-01 10:00:00` as UTC.
fn parse_legacy_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|naive| naive.and_utc())
        })
        .ok()?;
    Some(parsed.trunc_subsecs(6))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;
    use mandi_core::Price;

    async fn bare_database() -> Database {
        Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_legacy_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        assert_eq!(parse_legacy_timestamp("2024-05-01 10:00:00"), Some(expected));
        assert_eq!(parse_legacy_timestamp("2024-05-01T10:00:00.000Z"), Some(expected));
        assert_eq!(parse_legacy_timestamp("2024-05-01T15:30:00+05:30"), Some(expected));
        assert_eq!(parse_legacy_timestamp("yesterday"), None);
    }

    #[tokio::test]
    async fn test_no_legacy_tables_is_noop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let report = migrate_legacy_schema(db.pool()).await.unwrap();
        assert!(report.is_noop());
    }

    #[tokio::test]
    async fn test_text_id_table_migrates_without_loss() {
        let db = bare_database().await;
        sqlx::query(
            "CREATE TABLE crop_market_data (
                 id TEXT PRIMARY KEY,
                 crop_name TEXT NOT NULL,
                 district_name TEXT NOT NULL,
                 market_selling_price REAL NOT NULL,
                 is_synced BOOLEAN DEFAULT 0,
                 created_at DATETIME DEFAULT CURRENT_TIMESTAMP
             )",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO crop_market_data VALUES
                 ('a1b2', 'Wheat', 'Pune', 2500.5, 1, '2024-05-01 10:00:00'),
                 ('c3d4', 'Onion', 'Nashik', 1800, 0, '2024-05-02T08:30:00.000Z'),
                 ('e5f6', 'Rice', 'Pune', 3000, 0, 'not a date')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        db.run_migrations().await.unwrap();

        let repo = db.price_records();
        let records = repo.get_unsynced().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 3);
        assert_eq!(records.len(), 2);

        let all = repo.get_all().await.unwrap();
        let wheat = all.iter().find(|r| r.crop_name == "Wheat").unwrap();
        assert_eq!(wheat.selling_price, Price::from_paise(250_050));
        assert!(wheat.synced);
        assert_eq!(
            wheat.created_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );

        let remaining: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE name = 'crop_market_data'")
                .fetch_all(db.pool())
                .await
                .unwrap();
        assert!(remaining.is_empty());

        // The imported rows keep the uniqueness rule
        assert!(repo.insert("wheat", "PUNE", 2500.5).await.is_err());
    }

    #[tokio::test]
    async fn test_integer_ids_kept_and_duplicates_collapsed() {
        let db = bare_database().await;
        sqlx::query(
            "CREATE TABLE crop_market_data (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 crop_name TEXT NOT NULL,
                 district_name TEXT NOT NULL,
                 market_selling_price REAL NOT NULL,
                 is_synced BOOLEAN DEFAULT 0,
                 created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                 UNIQUE(crop_name, district_name, market_selling_price)
             )",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO crop_market_data (id, crop_name, district_name, market_selling_price) VALUES
                 (4, 'Wheat', 'Pune', 2500),
                 (9, 'wheat ', 'PUNE', 2500),
                 (12, '', 'Pune', 1000),
                 (15, 'Maize', 'Latur', -3)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        db.run_migrations().await.unwrap();
        let report = migrate_legacy_schema(db.pool()).await.unwrap();
        assert!(report.is_noop());

        let repo = db.price_records();
        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 4);
        assert_eq!(all[0].crop_name, "Wheat");
        assert_eq!(repo.next_id().await.unwrap(), 5);

        let rejects = legacy_rejects(db.pool()).await.unwrap();
        let ids: Vec<_> = rejects.iter().map(|r| r.legacy_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("9"), Some("12"), Some("15")]);

        assert_eq!(rejects[0].crop_name.as_deref(), Some("wheat "));
        assert_eq!(rejects[0].merged_into, Some(4));
        assert_eq!(rejects[1].merged_into, None);
        assert_eq!(rejects[2].market_selling_price, Some(-3.0));
    }

    #[tokio::test]
    async fn test_rejected_rows_are_kept_verbatim() {
        let db = bare_database().await;
        sqlx::query(
            "CREATE TABLE crop_market_data (
                 id TEXT PRIMARY KEY,
                 crop_name TEXT NOT NULL,
                 district_name TEXT NOT NULL,
                 market_selling_price REAL NOT NULL,
                 is_synced BOOLEAN DEFAULT 0,
                 created_at DATETIME DEFAULT CURRENT_TIMESTAMP
             )",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO crop_market_data VALUES
                 ('a1b2', 'Wheat', 'Pune', 2500, 0, '2024-05-01 10:00:00'),
                 ('c3d4', 'Onion', 'Nashik', 0, 1, '2024-05-02 09:00:00'),
                 ('e5f6', 'Rice', '', 3000, 0, '2024-05-03 11:15:00')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        db.run_migrations().await.unwrap();

        assert_eq!(db.price_records().count().await.unwrap(), 1);

        let rejects = db.legacy_rejects().await.unwrap();
        assert_eq!(rejects.len(), 2);

        let onion = &rejects[0];
        assert_eq!(onion.source_table, "crop_market_data");
        assert_eq!(onion.legacy_id.as_deref(), Some("c3d4"));
        assert_eq!(onion.crop_name.as_deref(), Some("Onion"));
        assert_eq!(onion.district_name.as_deref(), Some("Nashik"));
        assert_eq!(onion.market_selling_price, Some(0.0));
        assert_eq!(onion.is_synced, Some(1));
        assert_eq!(onion.created_at.as_deref(), Some("2024-05-02 09:00:00"));
        assert_eq!(onion.merged_into, None);
        assert!(!onion.reason.is_empty());

        let rice = &rejects[1];
        assert_eq!(rice.legacy_id.as_deref(), Some("e5f6"));
        assert_eq!(rice.district_name.as_deref(), Some(""));
        assert_ne!(rice.reason, onion.reason);

        // Every legacy row is either a price record or a reject
        let legacy_rows = 3;
        let kept = db.price_records().count().await.unwrap() as usize;
        assert_eq!(kept + rejects.len(), legacy_rows);
    }

    #[tokio::test]
    async fn test_report_counts_and_backup_table() {
        let db = bare_database().await;
        for table in LEGACY_TABLES {
            sqlx::query(&format!(
                "CREATE TABLE {table} (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     crop_name TEXT NOT NULL,
                     district_name TEXT NOT NULL,
                     market_selling_price REAL NOT NULL,
                     is_synced BOOLEAN DEFAULT 0,
                     created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                 )"
            ))
            .execute(db.pool())
            .await
            .unwrap();
        }
        sqlx::query(
            "INSERT INTO crop_market_data (id, crop_name, district_name, market_selling_price)
             VALUES (1, 'Wheat', 'Pune', 2500), (2, ' ', 'Pune', 100)",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO crop_market_data_backup (id, crop_name, district_name, market_selling_price)
             VALUES (1, 'Soybean', 'Latur', 4500), (2, 'WHEAT', 'pune', 2500)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        crate::migrations::run_migrations(db.pool()).await.unwrap();
        let report = migrate_legacy_schema(db.pool()).await.unwrap();

        assert_eq!(
            report.tables,
            vec!["crop_market_data".to_string(), "crop_market_data_backup".to_string()]
        );
        assert_eq!(report.imported, 2);
        assert_eq!(report.collapsed, 1);
        assert_eq!(report.skipped, 1);

        // Backup id 1 was taken by the main table's Wheat row
        let soybean = db
            .price_records()
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.crop_name == "Soybean")
            .unwrap();
        assert_ne!(soybean.id, 1);
    }
}
