//! # Error Types
//!
//! Domain-specific error types for loyalty-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  loyalty-core errors (this file)                                       │
//! │  ├── CoreError        - Protocol rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── OutcomeCode      - What the business device is told               │
//! │                                                                         │
//! │  loyalty-db errors (separate crate)                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  loyalty-scan errors                                                   │
//! │  └── ScanError        - Everything above + protocol lookups            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ScanError → OutcomeCode           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Outcome Code
// =============================================================================

/// The small, enumerable set of results a business device can receive.
///
/// Stored on the session row when it reaches a terminal state, and returned
/// alongside a human-readable reason for every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeCode {
    Success,
    NotFound,
    Expired,
    AlreadyConsumed,
    Forbidden,
    AccountInactive,
    InsufficientBalance,
    InvalidState,
    Conflict,
    UnsupportedPurpose,
    InvalidArgument,
    Internal,
}

impl OutcomeCode {
    /// Returns true for the single success code.
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, OutcomeCode::Success)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Protocol rule violations.
///
/// These are expected business conditions, not bugs. Every variant maps to
/// exactly one [`OutcomeCode`].
#[derive(Debug, Error)]
pub enum CoreError {
    /// Token was already claimed by a scanner.
    ///
    /// ## When This Occurs
    /// - The token was resolved earlier
    /// - Two scanners raced and this caller lost the conditional write
    #[error("Token has already been used")]
    TokenAlreadyConsumed,

    /// Token is past its `expires_at`.
    #[error("Token expired at {expires_at}")]
    TokenExpired { expires_at: String },

    /// Token carries a purpose this resolver does not understand.
    #[error("Unsupported token purpose: {0}")]
    UnsupportedPurpose(String),

    /// Session is past its `expires_at`.
    #[error("Session {session_id} expired")]
    SessionExpired { session_id: String },

    /// Session is no longer `Pending`.
    ///
    /// ## When This Occurs
    /// - A second finalize call for the same session
    /// - Finalize after the session failed or expired
    #[error("Session {session_id} is {status}, cannot finalize")]
    InvalidSessionState { session_id: String, status: String },

    /// Account exists but is not `Active`.
    #[error("Loyalty account {account_id} is {status}")]
    AccountInactive { account_id: String, status: String },

    /// Not enough points for the selected reward.
    ///
    /// ## User Workflow
    /// ```text
    /// Balance: 50 points
    ///      │
    ///      ▼
    /// Redeem "Free Coffee" (60 points)
    ///      │
    ///      ▼
    /// InsufficientBalance { available: 50, required: 60 }
    ///      │
    ///      ▼
    /// Session → Failed, balance untouched
    /// ```
    #[error("Insufficient balance for reward {reward_tier_id}: available {available}, required {required}")]
    InsufficientBalance {
        reward_tier_id: String,
        available: i64,
        required: i64,
    },

    /// Reward tier does not exist for this business or is inactive.
    #[error("Reward tier not available: {0}")]
    RewardUnavailable(String),

    /// Consumer tried to confirm a reward that requires staff.
    #[error("Reward {reward_tier_id} must be confirmed by staff")]
    SelfRedemptionNotAllowed { reward_tier_id: String },

    /// Decision does not match the session mode.
    #[error("Session is in {expected} mode, decision was {actual}")]
    ModeMismatch { expected: String, actual: String },

    /// No accrual rate applies to the spend currency.
    #[error("No accrual rate configured for currency {0}")]
    UnknownCurrency(String),

    /// Point arithmetic left the `i64` range.
    #[error("Point calculation overflowed")]
    PointsOverflow,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Maps the error to the code the business device receives.
    pub fn outcome_code(&self) -> OutcomeCode {
        match self {
            CoreError::TokenAlreadyConsumed => OutcomeCode::AlreadyConsumed,
            CoreError::TokenExpired { .. } | CoreError::SessionExpired { .. } => {
                OutcomeCode::Expired
            }
            CoreError::UnsupportedPurpose(_) => OutcomeCode::UnsupportedPurpose,
            CoreError::InvalidSessionState { .. } => OutcomeCode::InvalidState,
            CoreError::AccountInactive { .. } => OutcomeCode::AccountInactive,
            CoreError::InsufficientBalance { .. } => OutcomeCode::InsufficientBalance,
            CoreError::RewardUnavailable(_) => OutcomeCode::NotFound,
            CoreError::SelfRedemptionNotAllowed { .. } => OutcomeCode::Forbidden,
            CoreError::ModeMismatch { .. }
            | CoreError::UnknownCurrency(_)
            | CoreError::PointsOverflow
            | CoreError::Validation(_) => OutcomeCode::InvalidArgument,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any I/O when a caller passes malformed arguments.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid currency code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Field is not allowed in this context.
    #[error("{field} is not allowed: {reason}")]
    NotAllowed { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
