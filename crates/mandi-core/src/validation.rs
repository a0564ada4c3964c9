//! # Validation Module
//!
//! Input validation for price record submissions.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Mobile form                                                  │
//! │  ├── Basic format checks (empty fields, numeric keyboard)              │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any storage access)                      │
//! │  ├── Trimmed names must be non-empty and ≤ 100 chars                   │
//! │  └── Price must be finite, positive, and within range                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── Duplicate check inside the insert transaction                     │
//! │  ├── UNIQUE(crop_key, district_key, price_paise)                       │
//! │  └── CHECK (price_paise > 0)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::price::Price;
use crate::{MAX_NAME_LEN, MAX_PRICE_PAISE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a crop name and returns it trimmed.
///
/// ## Example
/// ```rust
/// use mandi_core::validation::validate_crop_name;
///
/// assert_eq!(validate_crop_name("  Wheat ").unwrap(), "Wheat");
/// assert!(validate_crop_name("   ").is_err());
/// ```
pub fn validate_crop_name(name: &str) -> ValidationResult<String> {
    validate_name("crop_name", name)
}

/// Validates a district name and returns it trimmed.
pub fn validate_district_name(name: &str) -> ValidationResult<String> {
    validate_name("district_name", name)
}

fn validate_name(field: &str, value: &str) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(value.to_string())
}

/// Builds the uniqueness key for a crop or district name.
///
/// Names are compared trimmed and case-folded, so `" Wheat"` and `"wheat "`
/// map to the same key.
///
/// ## Example
/// ```rust
/// use mandi_core::validation::normalize_key;
///
/// assert_eq!(normalize_key("  PUNE "), "pune");
/// ```
pub fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a selling price given in rupees and converts it to paise.
///
/// ## Rules
/// - Must be a finite number
/// - Must be positive after rounding to the nearest paisa
/// - Must not exceed MAX_PRICE_PAISE
///
/// ## Example
/// ```rust
/// use mandi_core::validation::validate_selling_price;
///
/// assert_eq!(validate_selling_price(2500.0).unwrap().paise(), 250_000);
/// assert!(validate_selling_price(0.0).is_err());
/// assert!(validate_selling_price(-10.0).is_err());
/// assert!(validate_selling_price(f64::NAN).is_err());
/// ```
pub fn validate_selling_price(rupees: f64) -> ValidationResult<Price> {
    let price = Price::from_rupees(rupees).ok_or_else(|| ValidationError::InvalidFormat {
        field: "selling_price".to_string(),
        reason: "must be a finite number".to_string(),
    })?;

    if !price.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "selling_price".to_string(),
        });
    }

    if price.paise() > MAX_PRICE_PAISE {
        return Err(ValidationError::OutOfRange {
            field: "selling_price".to_string(),
            min: 1,
            max: MAX_PRICE_PAISE / 100,
        });
    }

    Ok(price)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_names() {
        assert_eq!(validate_crop_name("Wheat").unwrap(), "Wheat");
        assert_eq!(validate_district_name("  Pune\t").unwrap(), "Pune");

        assert!(matches!(
            validate_crop_name(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_district_name(&"x".repeat(101)),
            Err(ValidationError::TooLong { max: 100, .. })
        ));
        // Multi-byte names count characters, not bytes
        assert!(validate_crop_name(&"गेहूं".repeat(20)).is_ok());
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("Wheat"), "wheat");
        assert_eq!(normalize_key("  wHeAt  "), "wheat");
        assert_eq!(normalize_key("Pune"), normalize_key(" pune "));
    }

    #[test]
    fn test_validate_selling_price() {
        assert_eq!(validate_selling_price(2500.0).unwrap().paise(), 250_000);
        assert_eq!(validate_selling_price(0.01).unwrap().paise(), 1);

        assert!(matches!(
            validate_selling_price(0.0),
            Err(ValidationError::MustBePositive { .. })
        ));
        // Rounds to zero paise
        assert!(matches!(
            validate_selling_price(0.004),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_selling_price(-1.0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_selling_price(f64::INFINITY),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_selling_price(200_000_000.0),
            Err(ValidationError::OutOfRange { .. })
        ));
    }
}
