//! # mandi-db: Record Store for Mandi Prices
//!
//! Local-first persistence for market price records, on SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Mandi Prices Data Flow                              │
//! │                                                                         │
//! │  Form submit                       Sync coordinator (mandi-sync)       │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mandi-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────────┐  ┌───────────┐ │   │
//! │  │   │   Database    │    │ PriceRecordRepository│  │Migrations │ │   │
//! │  │   │   (pool.rs)   │◄───│ insert / update      │  │ embedded  │ │   │
//! │  │   │   SqlitePool  │    │ get_unsynced         │  │ + legacy  │ │   │
//! │  │   │               │    │ mark_synced          │  │  import   │ │   │
//! │  │   └───────────────┘    └─────────────────────┘  └───────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`legacy`] - Import of the old `crop_market_data` tables
//! - [`error`] - Database error types
//! - [`repository`] - Price record repository and the post-commit hook
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mandi_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/mandi.db")).await?;
//!
//! let record = db.price_records().insert("Wheat", "Pune", 2500.0).await?;
//! let pending = db.price_records().get_unsynced().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod legacy;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use legacy::{LegacyMigration, LegacyReject};
pub use pool::{Database, DbConfig};

pub use repository::price_record::{PostCommitHook, PriceRecordRepository};
