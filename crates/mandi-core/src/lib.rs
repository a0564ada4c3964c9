//! # mandi-core: Pure Domain Logic for Mandi Prices
//!
//! This crate holds the domain model for agricultural market price records:
//! what a record is, how prices are represented, and which inputs are valid.
//! It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Mandi Prices Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Mobile UI (external collaborator)               │   │
//! │  │     Price Form ──► Record List ──► Record Detail ──► Sync Now   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               mandi-sync (coordinator, client, agent)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               mandi-db (record store, migrations)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mandi-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────────┐   ┌─────────────┐   ┌─────────────────────┐   │   │
//! │  │   │    types    │   │    price    │   │     validation      │   │   │
//! │  │   │ PriceRecord │   │ Price(paise)│   │ names, price, keys  │   │   │
//! │  │   │ NewPrice... │   │  ₹ display  │   │                     │   │   │
//! │  │   └─────────────┘   └─────────────┘   └─────────────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (PriceRecord, NewPriceRecord)
//! - [`price`] - Price type with integer paise (no floating point storage)
//! - [`error`] - Validation error types
//! - [`validation`] - Input validation and key normalization
//!
//! ## Example Usage
//!
//! ```rust
//! use mandi_core::NewPriceRecord;
//!
//! let record = NewPriceRecord::parse("  Wheat ", "Pune", 2500.0).unwrap();
//! assert_eq!(record.crop_name, "Wheat");
//! assert_eq!(record.crop_key(), "wheat");
//! assert_eq!(record.selling_price.paise(), 250_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod price;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::ValidationError;
pub use price::Price;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a crop or district name, in characters.
pub const MAX_NAME_LEN: usize = 100;

/// Upper bound for a selling price, in paise (₹10,00,00,000).
///
/// ## Business Reason
/// Catches typos such as an extra row of zeros in a per-quintal price.
pub const MAX_PRICE_PAISE: i64 = 10_000_000_000;
