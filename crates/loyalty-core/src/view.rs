//! # Views
//!
//! What the business device sees after a scan, and what a finalize returns.
//! Both are serialized to the device, so they derive `TS` for the frontend
//! bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::OutcomeCode;
use crate::ledger::LedgerPlan;
use crate::rewards::{parse_selected_rewards, SelectedReward};
use crate::types::{LoyaltyAccount, ScanSession, SessionStatus, TokenPurpose};

// =============================================================================
// Session View
// =============================================================================

/// A scan session as presented to the business.
///
/// `points_balance` is read at presentation time and is informational; the
/// finalize re-reads the account under its concurrency stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub account_id: String,
    pub business_id: String,
    pub location_id: Option<String>,
    pub mode: TokenPurpose,
    pub status: SessionStatus,
    pub points_balance: i64,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    pub selected_rewards: Vec<SelectedReward>,
}

impl SessionView {
    pub fn new(session: &ScanSession, account: &LoyaltyAccount) -> Self {
        SessionView {
            session_id: session.id.clone(),
            account_id: account.id.clone(),
            business_id: session.business_id.clone(),
            location_id: session.location_id.clone(),
            mode: session.mode,
            status: session.status,
            points_balance: account.points_balance,
            expires_at: session.expires_at,
            selected_rewards: parse_selected_rewards(session.selected_rewards.as_deref()),
        }
    }
}

// =============================================================================
// Finalize Outcome
// =============================================================================

/// Terminal result of finalizing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// The ledger was written and the session is `Completed`.
    Completed {
        session_id: String,
        transaction_id: String,
        points_delta: i64,
        points_balance: i64,
    },
    /// A business rule rejected the decision; nothing was written to the
    /// ledger and the session is `Failed`.
    Failed {
        session_id: String,
        code: OutcomeCode,
        reason: String,
    },
    /// The session window had passed; the session is `Expired`.
    Expired { session_id: String },
}

impl FinalizeOutcome {
    pub fn completed(plan: &LedgerPlan) -> Self {
        FinalizeOutcome::Completed {
            session_id: plan.session_id.clone(),
            transaction_id: plan.resulting_transaction_id().to_string(),
            points_delta: plan.points_delta(),
            points_balance: plan.points_balance,
        }
    }

    pub fn code(&self) -> OutcomeCode {
        match self {
            FinalizeOutcome::Completed { .. } => OutcomeCode::Success,
            FinalizeOutcome::Failed { code, .. } => *code,
            FinalizeOutcome::Expired { .. } => OutcomeCode::Expired,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            FinalizeOutcome::Completed { session_id, .. }
            | FinalizeOutcome::Failed { session_id, .. }
            | FinalizeOutcome::Expired { session_id } => session_id,
        }
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, FinalizeOutcome::Completed { .. })
    }
}
