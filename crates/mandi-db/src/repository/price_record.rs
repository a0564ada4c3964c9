//! # Price Record Repository
//!
//! Database operations for market price records.
//!
//! ## Record Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Price Record Lifecycle                            │
//! │                                                                         │
//! │  1. INSERT                                                             │
//! │     └── insert() → PriceRecord { synced: false }                       │
//! │     └── duplicate check + INSERT in one BEGIN IMMEDIATE transaction    │
//! │     └── insert_with_hook() → post-commit hook may push it right away   │
//! │                                                                         │
//! │  2. SYNC                                                               │
//! │     └── get_unsynced() → oldest first                                  │
//! │     └── mark_synced(ids) → synced: true (idempotent)                   │
//! │                                                                         │
//! │  3. (OPTIONAL) EDIT                                                    │
//! │     └── update() → same id and created_at, synced: false again         │
//! │                                                                         │
//! │  4. (OPTIONAL) DELETE                                                  │
//! │     └── delete() → removed regardless of sync state                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Uniqueness
//! Two submissions are the same record when their trimmed, lowercased crop
//! and district names and their price in paise all match. The check inside
//! the transaction produces a [`DbError::DuplicatePrice`] naming the stored
//! record; the table's UNIQUE constraint backs it up.

use futures_util::future::BoxFuture;
use mandi_core::{NewPriceRecord, PriceRecord};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use super::{begin_immediate, finish, now, timestamp_text};
use crate::error::{DbError, DbResult};

/// Column list matching [`PriceRecord`]'s `FromRow` mapping.
const RECORD_COLUMNS: &str =
    "id, crop_name, district_name, price_paise, is_synced, created_at";

/// SQLite's default limit on bound parameters is 999 on older builds.
const MARK_SYNCED_CHUNK: usize = 500;

// =============================================================================
// Post-Commit Hook
// =============================================================================

/// Work that runs after an insert has been committed.
///
/// The sync coordinator implements this to push a freshly stored record
/// straight away when the device is online. Returning `true` means the
/// record reached the remote endpoint and should be marked synced.
///
/// The hook runs with no database connection held.
pub trait PostCommitHook: Send + Sync {
    fn on_committed<'a>(&'a self, record: &'a PriceRecord) -> BoxFuture<'a, bool>;
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for price record operations.
#[derive(Debug, Clone)]
pub struct PriceRecordRepository {
    pool: SqlitePool,
}

impl PriceRecordRepository {
    /// Creates a new PriceRecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PriceRecordRepository { pool }
    }

    /// Validates and stores a new price record.
    ///
    /// ## Flow
    /// ```text
    /// validate (no I/O) ──► BEGIN IMMEDIATE ──► duplicate? ──► INSERT ──► COMMIT
    ///        │                                     │
    ///        ▼                                     ▼
    ///  DbError::Validation               DbError::DuplicatePrice (ROLLBACK)
    /// ```
    ///
    /// ## Example
    /// ```rust,ignore
    /// let record = db.price_records().insert("Wheat", "Pune", 2500.0).await?;
    /// assert!(!record.synced);
    /// ```
    pub async fn insert(
        &self,
        crop_name: &str,
        district_name: &str,
        selling_price: f64,
    ) -> DbResult<PriceRecord> {
        let new = NewPriceRecord::parse(crop_name, district_name, selling_price)?;

        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = insert_locked(&mut conn, &new).await;
        let record = finish(&mut conn, result).await?;

        info!(
            id = record.id,
            crop = %record.crop_name,
            district = %record.district_name,
            price = %record.selling_price,
            "Price record stored"
        );

        Ok(record)
    }

    /// Stores a record, then lets `hook` try to push it.
    ///
    /// The hook never fails the insert. If it reports success the record is
    /// marked synced; if marking fails the record is returned unsynced and
    /// the next sync cycle uploads it again. A hook may mark the record
    /// itself first, since marking twice changes nothing.
    pub async fn insert_with_hook(
        &self,
        crop_name: &str,
        district_name: &str,
        selling_price: f64,
        hook: &dyn PostCommitHook,
    ) -> DbResult<PriceRecord> {
        let mut record = self.insert(crop_name, district_name, selling_price).await?;

        if hook.on_committed(&record).await {
            match self.mark_synced(&[record.id]).await {
                Ok(_) => record.synced = true,
                Err(e) => {
                    warn!(id = record.id, error = %e, "Pushed record could not be marked synced");
                }
            }
        }

        Ok(record)
    }

    /// Edits a record in place.
    ///
    /// Keeps `id` and `created_at`, resets `synced` so the new values are
    /// uploaded. The duplicate check ignores the record being edited.
    pub async fn update(
        &self,
        id: i64,
        crop_name: &str,
        district_name: &str,
        selling_price: f64,
    ) -> DbResult<PriceRecord> {
        let new = NewPriceRecord::parse(crop_name, district_name, selling_price)?;

        let mut conn = self.pool.acquire().await?;
        begin_immediate(&mut conn).await?;
        let result = update_locked(&mut conn, id, &new).await;
        let record = finish(&mut conn, result).await?;

        info!(id, price = %record.selling_price, "Price record updated");
        Ok(record)
    }

    /// Gets all records, newest first.
    pub async fn get_all(&self) -> DbResult<Vec<PriceRecord>> {
        let records = sqlx::query_as::<_, PriceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM price_records ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Gets records not yet accepted by the remote endpoint, oldest first.
    pub async fn get_unsynced(&self) -> DbResult<Vec<PriceRecord>> {
        let records = sqlx::query_as::<_, PriceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM price_records
             WHERE is_synced = 0
             ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = records.len(), "Fetched unsynced records");
        Ok(records)
    }

    /// Gets a record by ID.
    ///
    /// ## Returns
    /// * `Ok(PriceRecord)` - Record found
    /// * `Err(DbError::NotFound)` - No record with this ID
    pub async fn get_by_id(&self, id: i64) -> DbResult<PriceRecord> {
        sqlx::query_as::<_, PriceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM price_records WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("PriceRecord", id))
    }

    /// Marks records as synced.
    ///
    /// Already-synced and unknown IDs are ignored, so repeating a call
    /// changes nothing. An empty slice does not touch the database.
    ///
    /// ## Returns
    /// Number of records that flipped from unsynced to synced.
    pub async fn mark_synced(&self, ids: &[i64]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut flipped = 0;
        for chunk in ids.chunks(MARK_SYNCED_CHUNK) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                "UPDATE price_records SET is_synced = 1 WHERE is_synced = 0 AND id IN (",
            );
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            flipped += query.build().execute(&self.pool).await?.rows_affected();
        }

        debug!(requested = ids.len(), flipped, "Marked records synced");
        Ok(flipped)
    }

    /// Resets every record to unsynced.
    ///
    /// ## Returns
    /// Number of records that were synced before the call.
    pub async fn clear_sync_state(&self) -> DbResult<u64> {
        let result = sqlx::query("UPDATE price_records SET is_synced = 0 WHERE is_synced = 1")
            .execute(&self.pool)
            .await?;

        info!(cleared = result.rows_affected(), "Sync state cleared");
        Ok(result.rows_affected())
    }

    /// Deletes a record whatever its sync state.
    ///
    /// Deleting an ID that does not exist is not an error.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM price_records WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(id, removed = result.rows_affected(), "Delete price record");
        Ok(())
    }

    /// Predicted ID of the next record (`MAX(id) + 1`, or 1 when empty).
    ///
    /// Display hint only; IDs of deleted records are never reassigned, so
    /// the actual ID may be higher.
    pub async fn next_id(&self) -> DbResult<i64> {
        let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM price_records")
            .fetch_one(&self.pool)
            .await?;

        Ok(next)
    }

    /// Counts records waiting to be uploaded.
    pub async fn count_unsynced(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM price_records WHERE is_synced = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts all records.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM price_records")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction Bodies
// =============================================================================
// These run between begin_immediate() and finish() on one connection.

/// Finds a stored record with the same normalized triple.
async fn find_duplicate(
    conn: &mut SqliteConnection,
    new: &NewPriceRecord,
    exclude_id: Option<i64>,
) -> DbResult<Option<PriceRecord>> {
    let existing = sqlx::query_as::<_, PriceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM price_records
         WHERE crop_key = ?1 AND district_key = ?2 AND price_paise = ?3
           AND (?4 IS NULL OR id != ?4)
         LIMIT 1"
    ))
    .bind(new.crop_key())
    .bind(new.district_key())
    .bind(new.selling_price.paise())
    .bind(exclude_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(existing)
}

fn duplicate_error(existing: PriceRecord) -> DbError {
    DbError::DuplicatePrice {
        id: existing.id,
        crop_name: existing.crop_name,
        district_name: existing.district_name,
        price: existing.selling_price,
    }
}

async fn insert_locked(conn: &mut SqliteConnection, new: &NewPriceRecord) -> DbResult<PriceRecord> {
    if let Some(existing) = find_duplicate(conn, new, None).await? {
        debug!(existing_id = existing.id, "Duplicate price record rejected");
        return Err(duplicate_error(existing));
    }

    let created_at = now();
    let result = sqlx::query(
        "INSERT INTO price_records
             (crop_name, district_name, crop_key, district_key, price_paise, is_synced, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
    )
    .bind(&new.crop_name)
    .bind(&new.district_name)
    .bind(new.crop_key())
    .bind(new.district_key())
    .bind(new.selling_price.paise())
    .bind(timestamp_text(&created_at))
    .execute(&mut *conn)
    .await?;

    Ok(PriceRecord {
        id: result.last_insert_rowid(),
        crop_name: new.crop_name.clone(),
        district_name: new.district_name.clone(),
        selling_price: new.selling_price,
        synced: false,
        created_at,
    })
}

async fn update_locked(
    conn: &mut SqliteConnection,
    id: i64,
    new: &NewPriceRecord,
) -> DbResult<PriceRecord> {
    let current = sqlx::query_as::<_, PriceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM price_records WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| DbError::not_found("PriceRecord", id))?;

    if let Some(existing) = find_duplicate(conn, new, Some(id)).await? {
        return Err(duplicate_error(existing));
    }

    sqlx::query(
        "UPDATE price_records
         SET crop_name = ?1, district_name = ?2, crop_key = ?3, district_key = ?4,
             price_paise = ?5, is_synced = 0
         WHERE id = ?6",
    )
    .bind(&new.crop_name)
    .bind(&new.district_name)
    .bind(new.crop_key())
    .bind(new.district_key())
    .bind(new.selling_price.paise())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(PriceRecord {
        id,
        crop_name: new.crop_name.clone(),
        district_name: new.district_name.clone(),
        selling_price: new.selling_price,
        synced: false,
        created_at: current.created_at,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use mandi_core::{Price, ValidationError};

    async fn repo() -> PriceRecordRepository {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.price_records()
    }

    struct FixedHook(bool);

    impl PostCommitHook for FixedHook {
        fn on_committed<'a>(&'a self, _record: &'a PriceRecord) -> BoxFuture<'a, bool> {
            let pushed = self.0;
            Box::pin(async move { pushed })
        }
    }

    #[tokio::test]
    async fn test_insert_returns_stored_record() {
        let repo = repo().await;

        let record = repo.insert("  Wheat ", "Pune", 2500.5).await.unwrap();
        assert_eq!(record.crop_name, "Wheat");
        assert_eq!(record.selling_price, Price::from_paise(250_050));
        assert!(!record.synced);

        let stored = repo.get_by_id(record.id).await.unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid_input_without_writing() {
        let repo = repo().await;

        let err = repo.insert("", "Pune", 2500.0).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(ValidationError::Required { .. })));

        let err = repo.insert("Wheat", "Pune", 0.0).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        let err = repo.insert("Wheat", "Pune", f64::NAN).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));

        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_case_and_spacing_variant_is_duplicate() {
        let repo = repo().await;
        let first = repo.insert("Wheat", "Pune", 2500.0).await.unwrap();

        let err = repo.insert(" wheat", "PUNE ", 2500.0).await.unwrap_err();
        match err {
            DbError::DuplicatePrice {
                id,
                crop_name,
                district_name,
                price,
            } => {
                assert_eq!(id, first.id);
                assert_eq!(crop_name, "Wheat");
                assert_eq!(district_name, "Pune");
                assert_eq!(price, Price::from_paise(250_000));
            }
            other => panic!("expected DuplicatePrice, got {other:?}"),
        }

        assert_eq!(repo.count().await.unwrap(), 1);

        // A different price is a different record
        repo.insert("wheat", "pune", 2600.0).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_inserts_store_one() {
        let repo = repo().await;

        let (a, b) = tokio::join!(
            repo.insert("Onion", "Nashik", 1800.0),
            repo.insert("onion", "nashik", 1800.0)
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_all_newest_first_and_unsynced_oldest_first() {
        let repo = repo().await;
        let a = repo.insert("Wheat", "Pune", 2500.0).await.unwrap();
        let b = repo.insert("Rice", "Pune", 3000.0).await.unwrap();
        let c = repo.insert("Onion", "Nashik", 1800.0).await.unwrap();

        let all: Vec<i64> = repo.get_all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(all, vec![c.id, b.id, a.id]);

        repo.mark_synced(&[b.id]).await.unwrap();
        let unsynced: Vec<i64> = repo
            .get_unsynced()
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(unsynced, vec![a.id, c.id]);
    }

    #[tokio::test]
    async fn test_mark_synced_is_idempotent() {
        let repo = repo().await;
        let a = repo.insert("Wheat", "Pune", 2500.0).await.unwrap();
        let b = repo.insert("Rice", "Pune", 3000.0).await.unwrap();

        assert_eq!(repo.mark_synced(&[a.id, b.id]).await.unwrap(), 2);
        assert_eq!(repo.mark_synced(&[a.id, b.id]).await.unwrap(), 0);
        assert_eq!(repo.mark_synced(&[]).await.unwrap(), 0);
        assert_eq!(repo.mark_synced(&[9999]).await.unwrap(), 0);

        assert!(repo.get_by_id(a.id).await.unwrap().synced);
        assert_eq!(repo.count_unsynced().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_id_after_inserts() {
        let repo = repo().await;
        assert_eq!(repo.next_id().await.unwrap(), 1);

        for i in 0..3 {
            repo.insert("Wheat", "Pune", 2500.0 + i as f64).await.unwrap();
        }
        assert_eq!(repo.next_id().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_delete_ignores_sync_state_and_missing_ids() {
        let repo = repo().await;
        let record = repo.insert("Wheat", "Pune", 2500.0).await.unwrap();
        repo.mark_synced(&[record.id]).await.unwrap();

        repo.delete(record.id).await.unwrap();
        repo.delete(record.id).await.unwrap();

        assert!(matches!(
            repo.get_by_id(record.id).await,
            Err(DbError::NotFound { .. })
        ));

        // Deleted IDs are not reused
        let next = repo.insert("Rice", "Pune", 3000.0).await.unwrap();
        assert!(next.id > record.id);
    }

    #[tokio::test]
    async fn test_update_resets_synced_and_keeps_created_at() {
        let repo = repo().await;
        let record = repo.insert("Wheat", "Pune", 2500.0).await.unwrap();
        repo.mark_synced(&[record.id]).await.unwrap();

        let updated = repo.update(record.id, "Wheat", "Pune", 2550.0).await.unwrap();
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.created_at, record.created_at);
        assert_eq!(updated.selling_price, Price::from_paise(255_000));
        assert!(!updated.synced);
        assert_eq!(repo.get_by_id(record.id).await.unwrap(), updated);

        // Re-saving the same values is not a duplicate of itself
        repo.update(record.id, "wheat", "pune", 2550.0).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_rejects_duplicate_and_missing() {
        let repo = repo().await;
        let wheat = repo.insert("Wheat", "Pune", 2500.0).await.unwrap();
        let rice = repo.insert("Rice", "Pune", 3000.0).await.unwrap();

        let err = repo.update(rice.id, "WHEAT", "pune", 2500.0).await.unwrap_err();
        assert!(matches!(err, DbError::DuplicatePrice { id, .. } if id == wheat.id));

        let err = repo.update(9999, "Maize", "Pune", 1900.0).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_clear_sync_state() {
        let repo = repo().await;
        let a = repo.insert("Wheat", "Pune", 2500.0).await.unwrap();
        repo.insert("Rice", "Pune", 3000.0).await.unwrap();
        repo.mark_synced(&[a.id]).await.unwrap();

        assert_eq!(repo.clear_sync_state().await.unwrap(), 1);
        assert_eq!(repo.count_unsynced().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_with_hook_marks_pushed_record() {
        let repo = repo().await;

        let pushed = repo
            .insert_with_hook("Wheat", "Pune", 2500.0, &FixedHook(true))
            .await
            .unwrap();
        assert!(pushed.synced);
        assert!(repo.get_by_id(pushed.id).await.unwrap().synced);

        let kept = repo
            .insert_with_hook("Rice", "Pune", 3000.0, &FixedHook(false))
            .await
            .unwrap();
        assert!(!kept.synced);
        assert_eq!(repo.count_unsynced().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_with_hook_skips_hook_on_duplicate() {
        let repo = repo().await;
        repo.insert("Wheat", "Pune", 2500.0).await.unwrap();

        let err = repo
            .insert_with_hook("wheat", "pune", 2500.0, &FixedHook(true))
            .await
            .unwrap_err();
        assert!(err.is_user_error());
    }
}
