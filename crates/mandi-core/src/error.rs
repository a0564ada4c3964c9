//! # Error Types
//!
//! Domain-specific error types for mandi-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mandi-core errors (this file)                                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  mandi-db errors (separate crate)                                      │
//! │  └── DbError          - Duplicate, not found, storage failures         │
//! │                                                                         │
//! │  mandi-sync errors (separate crate)                                    │
//! │  └── SyncError        - Config, transport, remote rejection            │
//! │                                                                         │
//! │  Flow: ValidationError → DbError → SyncError → caller (UI)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any storage is touched. The message is meant to be shown
/// to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., NaN price, unparseable number).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Returns the name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field,
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
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "crop_name".to_string(),
        };
        assert_eq!(err.to_string(), "crop_name is required");

        let err = ValidationError::MustBePositive {
            field: "selling_price".to_string(),
        };
        assert_eq!(err.to_string(), "selling_price must be positive");
    }

    #[test]
    fn test_field_accessor() {
        let err = ValidationError::TooLong {
            field: "district_name".to_string(),
            max: 100,
        };
        assert_eq!(err.field(), "district_name");
    }
}
