//! # Database Error Types
//!
//! Error types for record store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  ValidationError (mandi-core)      SQLite Error (sqlx::Error)          │
//! │       │                                  │                              │
//! │       └──────────────┬───────────────────┘                              │
//! │                      ▼                                                  │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ├── user errors (Validation, DuplicatePrice) → shown to the user │
//! │       │                                                                 │
//! │       └── storage errors → propagated unmasked, never retried          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use mandi_core::{Price, ValidationError};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Input failed validation; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The normalized (crop, district, price) triple is already stored.
    ///
    /// ## User Workflow
    /// ```text
    /// Stored: { id: 7, "Wheat", "Pune", ₹2500 }
    ///      │
    ///      ▼
    /// insert(" wheat", "PUNE", 2500.0)
    ///      │
    ///      ▼
    /// DuplicatePrice { id: 7, crop_name: "Wheat", district_name: "Pune", price: ₹2500 }
    ///      │
    ///      ▼
    /// UI shows the message below, pointing at the stored record
    /// ```
    #[error(
        "A crop with the name \"{crop_name}\" in \"{district_name}\" with price {price} already exists. \
         Please update the existing entry or use a different crop/district/price combination."
    )]
    DuplicatePrice {
        id: i64,
        crop_name: String,
        district_name: String,
        price: Price,
    },

    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation reported by SQLite itself.
    ///
    /// ## When This Occurs
    /// - A write raced past the duplicate check (should not happen under
    ///   `BEGIN IMMEDIATE`, but the constraint is the last line)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction could not be started, committed, or rolled back.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns true for errors caused by the caller's input.
    ///
    /// These are shown to the user as-is. Everything else is a storage
    /// failure and should propagate.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DbError::Validation(_) | DbError::DuplicatePrice { .. } | DbError::NotFound { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: price_records.crop_key, price_records.district_key, ..."
                if let Some(fields) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: fields.to_string(),
                        value: "unknown".to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_existing_record() {
        let err = DbError::DuplicatePrice {
            id: 7,
            crop_name: "Wheat".to_string(),
            district_name: "Pune".to_string(),
            price: Price::from_paise(250_000),
        };
        assert_eq!(
            err.to_string(),
            "A crop with the name \"Wheat\" in \"Pune\" with price ₹2500 already exists. \
             Please update the existing entry or use a different crop/district/price combination."
        );
        assert!(err.is_user_error());
    }

    #[test]
    fn test_validation_passes_through() {
        let err: DbError = ValidationError::Required {
            field: "crop_name".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "crop_name is required");
        assert!(err.is_user_error());
        assert!(!DbError::PoolExhausted.is_user_error());
    }
}
