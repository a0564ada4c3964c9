//! # Price Module
//!
//! Provides the `Price` type for market selling prices.
//!
//! ## Why Integer Paise?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Forms hand us decimals: 2500.1 + 0.2 = 2500.2999999999997              │
//! │                                                                         │
//! │  Uniqueness is checked on (crop, district, price). Two float prices    │
//! │  that print the same but differ in the last bit would both be stored.  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise                                            │
//! │    ₹2500.10 → 250010 paise, compared and indexed as an integer         │
//! │    Rupees (f64) only exist at the edges: form input, wire payload      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use mandi_core::price::Price;
//!
//! let price = Price::from_rupees(2500.5).unwrap();
//! assert_eq!(price.paise(), 250_050);
//! assert_eq!(price.to_string(), "₹2500.50");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

// =============================================================================
// Price Type
// =============================================================================

/// A selling price in paise (1/100 of a rupee).
///
/// ## Where Price is Used
/// ```text
/// Form input (f64 rupees)
///      │
///      ▼
/// validate_selling_price() ──► Price ──► price_records.price_paise (INTEGER)
///                                │
///                                ├──► UNIQUE(crop_key, district_key, price_paise)
///                                │
///                                └──► Upload payload: market_selling_price (f64 rupees)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Price(i64);

impl Price {
    /// Creates a Price from paise.
    ///
    /// ## Example
    /// ```rust
    /// use mandi_core::price::Price;
    ///
    /// let price = Price::from_paise(250_000); // ₹2500
    /// assert_eq!(price.paise(), 250_000);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Price(paise)
    }

    /// Converts a decimal rupee amount into paise, rounding to the nearest paisa.
    ///
    /// Returns `None` for NaN, infinities, and amounts that do not fit in i64 paise.
    /// Sign and range are not checked here; see
    /// [`validate_selling_price`](crate::validation::validate_selling_price).
    pub fn from_rupees(rupees: f64) -> Option<Self> {
        if !rupees.is_finite() {
            return None;
        }

        let paise = (rupees * 100.0).round();
        if paise < i64::MIN as f64 || paise > i64::MAX as f64 {
            return None;
        }

        Some(Price(paise as i64))
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion.
    #[inline]
    pub const fn rupees_part(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns the price as decimal rupees, for the wire and for display widgets.
    #[inline]
    pub fn as_rupees(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checks if the price is greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the price the way a vendor writes it: `₹2500`, or `₹2500.50`
/// when there are paise.
impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        if self.paise_part() == 0 {
            write!(f, "{}₹{}", sign, self.rupees_part().abs())
        } else {
            write!(
                f,
                "{}₹{}.{:02}",
                sign,
                self.rupees_part().abs(),
                self.paise_part()
            )
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rupees_rounds_to_nearest_paisa() {
        assert_eq!(Price::from_rupees(2500.0).unwrap().paise(), 250_000);
        assert_eq!(Price::from_rupees(19.999).unwrap().paise(), 2000);
        assert_eq!(Price::from_rupees(0.004).unwrap().paise(), 0);
        // 0.1 + 0.2 style noise collapses to one value
        assert_eq!(
            Price::from_rupees(2500.1 + 0.2).unwrap(),
            Price::from_rupees(2500.3).unwrap()
        );
    }

    #[test]
    fn test_from_rupees_rejects_non_finite() {
        assert!(Price::from_rupees(f64::NAN).is_none());
        assert!(Price::from_rupees(f64::INFINITY).is_none());
        assert!(Price::from_rupees(1e30).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_paise(250_000).to_string(), "₹2500");
        assert_eq!(Price::from_paise(250_050).to_string(), "₹2500.50");
        assert_eq!(Price::from_paise(5).to_string(), "₹0.05");
        assert_eq!(Price::from_paise(-150).to_string(), "-₹1.50");
    }

    #[test]
    fn test_as_rupees() {
        let price = Price::from_paise(250_050);
        assert!((price.as_rupees() - 2500.5).abs() < f64::EPSILON);
        assert_eq!(price.rupees_part(), 2500);
        assert_eq!(price.paise_part(), 50);
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&Price::from_paise(1234)).unwrap();
        assert_eq!(json, "1234");
    }
}
