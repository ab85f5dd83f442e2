//! # Validation Module
//!
//! Input validation utilities for the scan protocol.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Protocol entry points (loyalty-scan)                         │
//! │  ├── Required ids, TTL sign, selection size                            │
//! │  └── THIS MODULE: fails fast with InvalidArgument, no I/O yet          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger planning (ledger.rs)                                  │
//! │  └── Balance, tier status, self-redemption rules                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── UNIQUE (business_id, user_id), UNIQUE token                       │
//! │  ├── CHECK points_spent > 0, completed ⇔ resulting transaction         │
//! │  └── Append-only triggers on ledger tables                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use loyalty_core::validation::{validate_required, validate_currency};
//!
//! validate_required("user_id", "user-42").unwrap();
//! validate_currency("USD").unwrap();
//! ```

use chrono::Duration;

use crate::error::ValidationError;
use crate::MAX_TIERS_PER_REDEMPTION;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest identifier accepted from a caller.
const MAX_ID_LENGTH: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required identifier.
///
/// ## Rules
/// - Must not be empty or whitespace
/// - At most 64 characters
///
/// ## Example
/// ```rust
/// use loyalty_core::validation::validate_required;
///
/// assert!(validate_required("business_id", "biz-1").is_ok());
/// assert!(validate_required("business_id", "  ").is_err());
/// ```
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_ID_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LENGTH,
        });
    }

    Ok(())
}

/// Validates an optional identifier: absent is fine, present must be valid.
pub fn validate_optional(field: &str, value: Option<&str>) -> ValidationResult<()> {
    match value {
        Some(v) => validate_required(field, v),
        None => Ok(()),
    }
}

/// Validates an ISO 4217-shaped currency code.
///
/// ## Rules
/// - Exactly three ASCII letters (case-insensitive)
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a three-letter ISO 4217 code".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a time-to-live.
///
/// ## Rules
/// - Must be strictly positive
///
/// ## Example
/// ```rust
/// use chrono::Duration;
/// use loyalty_core::validation::validate_ttl;
///
/// assert!(validate_ttl("ttl", Duration::minutes(5)).is_ok());
/// assert!(validate_ttl("ttl", Duration::zero()).is_err());
/// ```
pub fn validate_ttl(field: &str, ttl: Duration) -> ValidationResult<()> {
    if ttl <= Duration::zero() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of reward tiers in one redemption.
///
/// ## Rules
/// - At least one tier
/// - At most MAX_TIERS_PER_REDEMPTION (10)
pub fn validate_tier_selection(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::Required {
            field: "reward tiers".to_string(),
        });
    }

    if count > MAX_TIERS_PER_REDEMPTION {
        return Err(ValidationError::OutOfRange {
            field: "reward tiers".to_string(),
            min: 1,
            max: MAX_TIERS_PER_REDEMPTION as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
