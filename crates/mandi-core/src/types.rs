//! # Domain Types
//!
//! Core domain types used throughout Mandi Prices.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────────────┐          ┌───────────────────────┐          │
//! │  │    NewPriceRecord     │  insert  │      PriceRecord      │          │
//! │  │  ───────────────────  │ ───────► │  ───────────────────  │          │
//! │  │  crop_name (trimmed)  │          │  id (i64, SQLite PK)  │          │
//! │  │  district_name        │          │  crop_name            │          │
//! │  │  selling_price        │          │  district_name        │          │
//! │  │                       │          │  selling_price        │          │
//! │  │  Only constructible   │          │  synced               │          │
//! │  │  through parse()      │          │  created_at           │          │
//! │  └───────────────────────┘          └───────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - `id`: assigned by storage, never reused after deletion
//! - Normalized triple `(crop_key, district_key, price)`: the uniqueness key

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::price::Price;
use crate::validation::{
    normalize_key, validate_crop_name, validate_district_name, validate_selling_price,
    ValidationResult,
};

// =============================================================================
// Price Record
// =============================================================================

/// A stored market price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PriceRecord {
    /// Local identifier, assigned by SQLite.
    pub id: i64,

    /// Crop name as entered (trimmed).
    pub crop_name: String,

    /// District name as entered (trimmed).
    pub district_name: String,

    /// Market selling price.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "price_paise"))]
    pub selling_price: Price,

    /// Whether the remote endpoint has accepted this record.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "is_synced"))]
    pub synced: bool,

    /// When the record was first stored.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PriceRecord {
    /// Returns the normalized crop key used for uniqueness.
    pub fn crop_key(&self) -> String {
        normalize_key(&self.crop_name)
    }

    /// Returns the normalized district key used for uniqueness.
    pub fn district_key(&self) -> String {
        normalize_key(&self.district_name)
    }
}

// =============================================================================
// New Price Record
// =============================================================================

/// A validated submission, ready to be stored.
///
/// Fields are public for reading; construct through [`NewPriceRecord::parse`]
/// so that every instance holds trimmed names and a positive price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct NewPriceRecord {
    pub crop_name: String,
    pub district_name: String,
    pub selling_price: Price,
}

impl NewPriceRecord {
    /// Validates raw form input.
    ///
    /// ## Example
    /// ```rust
    /// use mandi_core::NewPriceRecord;
    ///
    /// assert!(NewPriceRecord::parse("Onion", "Nashik", 1800.0).is_ok());
    /// assert!(NewPriceRecord::parse("", "Nashik", 1800.0).is_err());
    /// assert!(NewPriceRecord::parse("Onion", "Nashik", 0.0).is_err());
    /// ```
    pub fn parse(
        crop_name: &str,
        district_name: &str,
        selling_price: f64,
    ) -> ValidationResult<Self> {
        Ok(NewPriceRecord {
            crop_name: validate_crop_name(crop_name)?,
            district_name: validate_district_name(district_name)?,
            selling_price: validate_selling_price(selling_price)?,
        })
    }

    /// Returns the normalized crop key used for uniqueness.
    pub fn crop_key(&self) -> String {
        normalize_key(&self.crop_name)
    }

    /// Returns the normalized district key used for uniqueness.
    pub fn district_key(&self) -> String {
        normalize_key(&self.district_name)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
