//! # Ledger Planning
//!
//! Turns a business decision into the exact rows and account update a
//! finalize will write. Planning is pure: it reads an account snapshot and
//! produces a [`LedgerPlan`]; the store applies the plan atomically, guarded
//! by the snapshot's concurrency stamp.
//!
//! ## Finalize Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  read account (stamp S)                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  plan_accrual / plan_redemption   ← THIS MODULE (pure)                 │
//! │       │                                                                 │
//! │       ├── rule violated? → CoreError → session Failed, nothing written │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerPlan { rows, new balance, expected_stamp: S, new_stamp: S' }    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  store: one transaction, UPDATE ... WHERE stamp = S                    │
//! │       │                                                                 │
//! │       ├── 0 rows → someone else wrote first → re-read, re-plan         │
//! │       └── 1 row  → commit                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Spend;
use crate::types::{
    new_concurrency_stamp, LoyaltyAccount, LoyaltyPointsTransaction, LoyaltyRewardRedemption,
    LoyaltyRewardTier, RedemptionStatus, ScanSession, TokenPurpose, TransactionType,
};
use crate::validation::{validate_required, validate_tier_selection};

// =============================================================================
// Decisions
// =============================================================================

/// Who confirmed a redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Confirmation {
    /// A staff member on the business device.
    Staff { user_id: String },
    /// The consumer confirmed on their own (self-service).
    Consumer,
}

impl Confirmation {
    pub fn performed_by(&self) -> Option<&str> {
        match self {
            Confirmation::Staff { user_id } => Some(user_id.as_str()),
            Confirmation::Consumer => None,
        }
    }
}

/// What the business decided to do with a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Credit points for a purchase.
    Accrue {
        spend: Spend,
        /// Staff member ringing up the sale, if known.
        #[serde(default)]
        performed_by: Option<String>,
    },
    /// Debit points for rewards. An empty list means "the rewards the
    /// consumer pre-selected".
    Redeem {
        #[serde(default)]
        reward_tier_ids: Vec<String>,
        confirmed_by: Confirmation,
    },
}

impl Decision {
    /// The session mode this decision applies to.
    pub const fn mode(&self) -> TokenPurpose {
        match self {
            Decision::Accrue { .. } => TokenPurpose::Accrual,
            Decision::Redeem { .. } => TokenPurpose::Redemption,
        }
    }

    /// Fails with `ModeMismatch` when the decision does not fit the session.
    pub fn ensure_matches(&self, session: &ScanSession) -> CoreResult<()> {
        if self.mode() != session.mode {
            return Err(CoreError::ModeMismatch {
                expected: session.mode.to_string(),
                actual: self.mode().to_string(),
            });
        }
        Ok(())
    }
}

/// A finalize call: the confirming business plus its decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub business_id: String,
    pub decision: Decision,
}

impl FinalizeRequest {
    /// Programmer-error checks that run before any I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_required("business_id", &self.business_id)?;

        match &self.decision {
            Decision::Accrue { spend, performed_by } => {
                crate::validation::validate_currency(&spend.currency)?;
                crate::validation::validate_optional("performed_by", performed_by.as_deref())?;
            }
            Decision::Redeem {
                reward_tier_ids,
                confirmed_by,
            } => {
                for id in reward_tier_ids {
                    validate_required("reward_tier_id", id)?;
                }
                if let Confirmation::Staff { user_id } = confirmed_by {
                    validate_required("staff user_id", user_id)?;
                }
            }
        }

        Ok(())
    }
}

// =============================================================================
// Ledger Plan
// =============================================================================

/// Everything a successful finalize writes, computed from one account
/// snapshot.
#[derive(Debug, Clone)]
pub struct LedgerPlan {
    pub session_id: String,
    pub account_id: String,
    /// Stamp read with the snapshot; the write succeeds only if unchanged.
    pub expected_stamp: String,
    pub new_stamp: String,
    pub points_balance: i64,
    pub lifetime_points: i64,
    pub last_accrual_at: Option<DateTime<Utc>>,
    /// Written before `transactions` (ledger rows reference them).
    pub redemptions: Vec<LoyaltyRewardRedemption>,
    pub transactions: Vec<LoyaltyPointsTransaction>,
    pub completed_at: DateTime<Utc>,
}

impl LedgerPlan {
    /// The id recorded on the completed session: the last ledger row.
    pub fn resulting_transaction_id(&self) -> &str {
        self.transactions
            .last()
            .map(|t| t.id.as_str())
            .unwrap_or_default()
    }

    /// Net change to the balance.
    pub fn points_delta(&self) -> i64 {
        self.transactions.iter().map(|t| t.points_delta).sum()
    }
}

/// Plans an accrual of `points` onto `account`.
///
/// ## Effects
/// - one `Accrual` row with `delta = +points`
/// - `points_balance += points`, `lifetime_points += points`
/// - `last_accrual_at = now`
///
/// A zero-point accrual (small spend) still writes its row so every
/// completed session has a resulting transaction.
pub fn plan_accrual(
    account: &LoyaltyAccount,
    session: &ScanSession,
    points: i64,
    performed_by: Option<&str>,
    now: DateTime<Utc>,
) -> CoreResult<LedgerPlan> {
    if points < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "points".to_string(),
        }
        .into());
    }

    let points_balance = account
        .points_balance
        .checked_add(points)
        .ok_or(CoreError::PointsOverflow)?;
    let lifetime_points = account
        .lifetime_points
        .checked_add(points)
        .ok_or(CoreError::PointsOverflow)?;

    let transaction = LoyaltyPointsTransaction {
        id: Uuid::new_v4().to_string(),
        account_id: account.id.clone(),
        business_id: session.business_id.clone(),
        transaction_type: TransactionType::Accrual,
        points_delta: points,
        reward_redemption_id: None,
        location_id: session.location_id.clone(),
        performed_by_user_id: performed_by.map(str::to_string),
        reference: Some(session.id.clone()),
        notes: None,
        created_at: now,
    };

    Ok(LedgerPlan {
        session_id: session.id.clone(),
        account_id: account.id.clone(),
        expected_stamp: account.concurrency_stamp.clone(),
        new_stamp: new_concurrency_stamp(),
        points_balance,
        lifetime_points,
        last_accrual_at: Some(now),
        redemptions: Vec::new(),
        transactions: vec![transaction],
        completed_at: now,
    })
}

/// Plans redeeming `tiers` (in order) from `account`.
///
/// ## Rules (checked for every tier before anything is planned)
/// - tier belongs to the session's business and is active
/// - a consumer-confirmed redemption needs `allow_self_redemption`
/// - the running balance covers `points_required`
///
/// Any violation rejects the whole batch.
pub fn plan_redemption(
    account: &LoyaltyAccount,
    session: &ScanSession,
    tiers: &[LoyaltyRewardTier],
    confirmed_by: &Confirmation,
    now: DateTime<Utc>,
) -> CoreResult<LedgerPlan> {
    validate_tier_selection(tiers.len())?;

    let mut balance = account.points_balance;
    for tier in tiers {
        if tier.business_id != session.business_id || !tier.is_active || tier.points_required <= 0
        {
            return Err(CoreError::RewardUnavailable(tier.id.clone()));
        }

        if matches!(confirmed_by, Confirmation::Consumer) && !tier.allow_self_redemption {
            return Err(CoreError::SelfRedemptionNotAllowed {
                reward_tier_id: tier.id.clone(),
            });
        }

        if balance < tier.points_required {
            return Err(CoreError::InsufficientBalance {
                reward_tier_id: tier.id.clone(),
                available: balance,
                required: tier.points_required,
            });
        }
        balance -= tier.points_required;
    }

    let performed_by = confirmed_by.performed_by().map(str::to_string);
    let mut redemptions = Vec::with_capacity(tiers.len());
    let mut transactions = Vec::with_capacity(tiers.len());

    for tier in tiers {
        let redemption = LoyaltyRewardRedemption {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            business_id: session.business_id.clone(),
            reward_tier_id: tier.id.clone(),
            points_spent: tier.points_required,
            status: RedemptionStatus::Completed,
            location_id: session.location_id.clone(),
            metadata: redemption_metadata(tier, session),
            created_at: now,
        };

        transactions.push(LoyaltyPointsTransaction {
            id: Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            business_id: session.business_id.clone(),
            transaction_type: TransactionType::Redemption,
            points_delta: -tier.points_required,
            reward_redemption_id: Some(redemption.id.clone()),
            location_id: session.location_id.clone(),
            performed_by_user_id: performed_by.clone(),
            reference: Some(session.id.clone()),
            notes: Some(format!("Redeemed {}", tier.name)),
            created_at: now,
        });
        redemptions.push(redemption);
    }

    Ok(LedgerPlan {
        session_id: session.id.clone(),
        account_id: account.id.clone(),
        expected_stamp: account.concurrency_stamp.clone(),
        new_stamp: new_concurrency_stamp(),
        points_balance: balance,
        lifetime_points: account.lifetime_points,
        last_accrual_at: account.last_accrual_at,
        redemptions,
        transactions,
        completed_at: now,
    })
}

fn redemption_metadata(tier: &LoyaltyRewardTier, session: &ScanSession) -> String {
    serde_json::json!({
        "sessionId": session.id,
        "tierName": tier.name,
        "description": tier.description,
        "rewardType": tier.reward_type,
        "rewardValue": tier.reward_value,
    })
    .to_string()
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Stored balance next to what the ledger says it should be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AccountReconciliation {
    pub account_id: String,
    pub points_balance: i64,
    pub lifetime_points: i64,
    /// Signed sum of every ledger delta.
    pub ledger_sum: i64,
    /// Sum of `Accrual` deltas.
    pub accrued: i64,
    /// Sum of `points_spent` over redemptions.
    pub redeemed: i64,
}

impl AccountReconciliation {
    /// `balance == Σ deltas` and `lifetime == Σ accruals`, and, when no
    /// manual adjustments exist, `balance == accrued - redeemed`.
    pub fn is_consistent(&self) -> bool {
        self.points_balance == self.ledger_sum && self.lifetime_points == self.accrued
    }

    /// Difference between the ledger and the stored balance.
    pub fn drift(&self) -> i64 {
        self.ledger_sum - self.points_balance
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
