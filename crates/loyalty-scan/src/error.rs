//! # Scan Error Types
//!
//! Every protocol call returns `ScanResult<T>`. Each error maps to exactly
//! one [`OutcomeCode`]; the business device only ever sees a
//! [`ScanFailure`], never a raw storage error.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Scan Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Protocol rules │  │   Lookup/Auth   │  │   Infrastructure        │ │
//! │  │  (CoreError)    │  │                 │  │                         │ │
//! │  │  Expired        │  │  TokenNotFound  │  │  Store(DbError)         │ │
//! │  │  AlreadyConsumed│  │  NotFound       │  │  Config                 │ │
//! │  │  Insufficient.. │  │  Forbidden      │  │                         │ │
//! │  │  InvalidState   │  │  Conflict       │  │  → INTERNAL, detail     │ │
//! │  │  ...            │  │  InvalidArgument│  │    logged, not returned │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use loyalty_core::{CoreError, OutcomeCode, ValidationError};
use loyalty_db::DbError;

/// Result type alias for protocol operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Protocol error.
#[derive(Debug, Error)]
pub enum ScanError {
    // =========================================================================
    // Protocol Rules
    // =========================================================================
    /// A domain rule rejected the operation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    // =========================================================================
    // Lookup & Authorization
    // =========================================================================
    /// No token with the scanned string. The string itself is never echoed.
    #[error("Token not recognized")]
    TokenNotFound,

    /// A session, account, program or tier is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the session or account.
    ///
    /// ## When This Occurs
    /// - Business B presents or finalizes a session claimed by business A
    /// - A token bound to one account is scanned for another
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The account kept changing underneath the finalize.
    ///
    /// ## User Workflow
    /// ```text
    /// read stamp S ──► plan ──► write WHERE stamp = S ──► 0 rows
    ///      ▲                                               │
    ///      └──────────── retry (bounded) ◄─────────────────┘
    ///                          │ exhausted
    ///                          ▼
    ///                 session Failed (CONFLICT)
    /// ```
    #[error("Account {account_id} changed concurrently; gave up after {attempts} attempts")]
    Conflict { account_id: String, attempts: u32 },

    /// Malformed input detected by the protocol layer.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // =========================================================================
    // Infrastructure
    // =========================================================================
    /// Ledger store failure.
    #[error("Storage error: {0}")]
    Store(#[from] DbError),

    /// Invalid or unreadable configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ScanError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ScanError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Maps the error to the code the business device receives.
    pub fn outcome_code(&self) -> OutcomeCode {
        match self {
            ScanError::Domain(e) => e.outcome_code(),
            ScanError::TokenNotFound | ScanError::NotFound { .. } => OutcomeCode::NotFound,
            ScanError::Forbidden(_) => OutcomeCode::Forbidden,
            ScanError::Conflict { .. } => OutcomeCode::Conflict,
            ScanError::InvalidArgument(_) => OutcomeCode::InvalidArgument,
            ScanError::Store(_) | ScanError::Config(_) => OutcomeCode::Internal,
        }
    }

    /// True for errors that finalize a consumed session as `Failed`.
    ///
    /// Storage faults are not: the session stays `Pending` and lapses into
    /// `Expired`. A session that already left `Pending` is not touched again.
    pub fn fails_session(&self) -> bool {
        match self {
            ScanError::Domain(CoreError::InvalidSessionState { .. }) => false,
            ScanError::Domain(_)
            | ScanError::NotFound { .. }
            | ScanError::Forbidden(_)
            | ScanError::Conflict { .. }
            | ScanError::InvalidArgument(_) => true,
            ScanError::TokenNotFound | ScanError::Store(_) | ScanError::Config(_) => false,
        }
    }
}

impl From<ValidationError> for ScanError {
    fn from(err: ValidationError) -> Self {
        ScanError::Domain(CoreError::Validation(err))
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(err: toml::de::Error) -> Self {
        ScanError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Config(err.to_string())
    }
}

// =============================================================================
// Device-Facing Failure
// =============================================================================

/// What the business device receives when a call fails.
///
/// ```json
/// { "code": "INSUFFICIENT_BALANCE",
///   "message": "Insufficient balance for reward t1: available 50, required 60" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ScanFailure {
    pub code: OutcomeCode,
    pub message: String,
}

impl From<ScanError> for ScanFailure {
    fn from(err: ScanError) -> Self {
        let code = err.outcome_code();
        let message = match &err {
            ScanError::Store(e) => {
                // Log the actual error but return a generic message
                tracing::error!(error = %e, "Ledger store failure");
                "Temporary storage problem, please retry".to_string()
            }
            ScanError::Config(e) => {
                tracing::error!(error = %e, "Scan configuration problem");
                "Service misconfigured".to_string()
            }
            other => other.to_string(),
        };

        ScanFailure { code, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_codes() {
        assert_eq!(
            ScanError::from(CoreError::TokenAlreadyConsumed).outcome_code(),
            OutcomeCode::AlreadyConsumed
        );
        assert_eq!(ScanError::TokenNotFound.outcome_code(), OutcomeCode::NotFound);
        assert_eq!(
            ScanError::Forbidden("x".into()).outcome_code(),
            OutcomeCode::Forbidden
        );
        assert_eq!(
            ScanError::from(ValidationError::Required {
                field: "user_id".into()
            })
            .outcome_code(),
            OutcomeCode::InvalidArgument
        );
        assert_eq!(
            ScanError::Store(DbError::PoolExhausted).outcome_code(),
            OutcomeCode::Internal
        );
    }

    #[test]
    fn test_store_errors_are_hidden() {
        let failure = ScanFailure::from(ScanError::Store(DbError::QueryFailed(
            "no such table: loyalty_accounts".into(),
        )));
        assert_eq!(failure.code, OutcomeCode::Internal);
        assert!(!failure.message.contains("loyalty_accounts"));

        let failure = ScanFailure::from(ScanError::from(CoreError::InsufficientBalance {
            reward_tier_id: "t1".into(),
            available: 50,
            required: 60,
        }));
        assert_eq!(failure.code, OutcomeCode::InsufficientBalance);
        assert!(failure.message.contains("60"));
    }

    #[test]
    fn test_which_errors_fail_a_session() {
        assert!(ScanError::from(CoreError::PointsOverflow).fails_session());
        assert!(ScanError::Conflict {
            account_id: "a".into(),
            attempts: 3
        }
        .fails_session());
        assert!(!ScanError::Store(DbError::PoolExhausted).fails_session());
        assert!(!ScanError::from(CoreError::InvalidSessionState {
            session_id: "s".into(),
            status: "completed".into()
        })
        .fails_session());
    }

    #[test]
    fn test_failure_serialization() {
        let failure = ScanFailure {
            code: OutcomeCode::AlreadyConsumed,
            message: "Token has already been used".into(),
        };
        let json = serde_json::to_string(&failure).unwrap();
        assert_eq!(
            json,
            r#"{"code":"ALREADY_CONSUMED","message":"Token has already been used"}"#
        );
    }
}
