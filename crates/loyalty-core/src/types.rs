//! # Domain Types
//!
//! Persistent entities of the scan-session protocol.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  QrCodeToken    │──►│  ScanSession    │──►│ LoyaltyAccount  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  token (secret) │   │  status         │   │  points_balance │       │
//! │  │  purpose        │   │  mode           │   │  lifetime_points│       │
//! │  │  consumed_at    │   │  expires_at     │   │  stamp          │       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │                                                        │                │
//! │                          ┌─────────────────────────────┴──────┐        │
//! │                          ▼                                    ▼        │
//! │              ┌──────────────────────┐        ┌───────────────────────┐ │
//! │              │ LoyaltyPointsTx      │◄───────│ LoyaltyRewardRedemption│ │
//! │              │ (append-only ledger) │  1:1   │ (append-only)          │ │
//! │              └──────────────────────┘        └───────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity is keyed by a UUID v4 string. Tokens additionally carry an
//! opaque `token` string that is the capability handed to the consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, OutcomeCode};
use crate::points::AccrualConfig;

// =============================================================================
// Token Purpose
// =============================================================================

/// What a token (and the session it opens) is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Credit points from a purchase.
    Accrual,
    /// Debit points for one or more rewards.
    Redemption,
}

impl TokenPurpose {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Accrual => "accrual",
            TokenPurpose::Redemption => "redemption",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenPurpose {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accrual" => Ok(TokenPurpose::Accrual),
            "redemption" => Ok(TokenPurpose::Redemption),
            other => Err(CoreError::UnsupportedPurpose(other.to_string())),
        }
    }
}

// =============================================================================
// QR Code Token
// =============================================================================

/// A single-use capability rendered as a QR code on the consumer device.
///
/// ## Lifecycle
/// ```text
/// issued ──(resolve wins CAS)──► consumed      (never reopened)
///   │
///   └──(now > expires_at)──────► unresolvable  (lazily observed)
/// ```
///
/// `purpose` is kept as stored text: a row written by a newer issuer with a
/// purpose this build does not know must surface as `UnsupportedPurpose`,
/// not as a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QrCodeToken {
    pub id: String,
    pub user_id: String,
    pub loyalty_account_id: Option<String>,
    /// The opaque secret. Never log this.
    pub token: String,
    pub purpose: String,
    /// Serialized rewards the consumer pre-selected (redemption only).
    pub selected_rewards: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub consumed_by_business_id: Option<String>,
    pub consumed_at_location_id: Option<String>,
}

impl QrCodeToken {
    /// Parses the stored purpose.
    pub fn purpose_kind(&self) -> CoreResult<TokenPurpose> {
        self.purpose.parse()
    }

    #[inline]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Checks that the token may still be claimed.
    ///
    /// ## Order
    /// 1. consumed → `TokenAlreadyConsumed`
    /// 2. expired → `TokenExpired`
    /// 3. unknown purpose → `UnsupportedPurpose`
    ///
    /// This is a pre-check; the claim itself is the conditional write in the
    /// store.
    pub fn ensure_resolvable(&self, now: DateTime<Utc>) -> CoreResult<TokenPurpose> {
        if self.is_consumed() {
            return Err(CoreError::TokenAlreadyConsumed);
        }

        if self.is_expired_at(now) {
            return Err(CoreError::TokenExpired {
                expires_at: self.expires_at.to_rfc3339(),
            });
        }

        self.purpose_kind()
    }
}

// =============================================================================
// Session Status
// =============================================================================

/// The status of a scan session.
///
/// Monotonic: `Pending` is the only non-terminal state and each session
/// leaves it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl SessionStatus {
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Pending)
    }

    /// Only `Pending → terminal` is legal.
    pub const fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(self, SessionStatus::Pending) && next.is_terminal()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Expired => "expired",
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Pending
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Scan Session
// =============================================================================

/// One scan-to-finalize interaction between a consumer token and a business.
///
/// `resulting_transaction_id` is set if and only if `status` is `Completed`;
/// the database enforces this with a CHECK constraint as well.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ScanSession {
    pub id: String,
    pub token_id: String,
    pub loyalty_account_id: String,
    pub business_id: String,
    pub location_id: Option<String>,
    pub mode: TokenPurpose,
    pub status: SessionStatus,
    pub selected_rewards: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    pub outcome_code: Option<OutcomeCode>,
    pub failure_reason: Option<String>,
    pub resulting_transaction_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanSession {
    /// Builds the `Pending` session created when a token is claimed.
    pub fn open(
        token: &QrCodeToken,
        mode: TokenPurpose,
        account_id: &str,
        business_id: &str,
        location_id: Option<&str>,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        ScanSession {
            id: uuid::Uuid::new_v4().to_string(),
            token_id: token.id.clone(),
            loyalty_account_id: account_id.to_string(),
            business_id: business_id.to_string(),
            location_id: location_id.map(str::to_string),
            mode,
            status: SessionStatus::Pending,
            selected_rewards: token.selected_rewards.clone(),
            created_at: now,
            expires_at: now + ttl,
            outcome_code: None,
            failure_reason: None,
            resulting_transaction_id: None,
            completed_at: None,
        }
    }

    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Fails with `InvalidSessionState` unless the session is `Pending`.
    pub fn ensure_pending(&self) -> CoreResult<()> {
        if self.status != SessionStatus::Pending {
            return Err(CoreError::InvalidSessionState {
                session_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn belongs_to(&self, business_id: &str) -> bool {
        self.business_id == business_id
    }
}

// =============================================================================
// Loyalty Account
// =============================================================================

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A consumer's point balance with one business.
///
/// ## Invariant
/// `points_balance` equals the signed sum of every ledger delta for this
/// account. `concurrency_stamp` changes on every write; writers must present
/// the stamp they read.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyAccount {
    pub id: String,
    pub business_id: String,
    pub user_id: String,
    pub status: AccountStatus,
    pub points_balance: i64,
    pub lifetime_points: i64,
    #[ts(as = "Option<String>")]
    pub last_accrual_at: Option<DateTime<Utc>>,
    pub concurrency_stamp: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl LoyaltyAccount {
    /// A fresh zero-balance account.
    pub fn new(business_id: &str, user_id: &str, now: DateTime<Utc>) -> Self {
        LoyaltyAccount {
            id: uuid::Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            user_id: user_id.to_string(),
            status: AccountStatus::Active,
            points_balance: 0,
            lifetime_points: 0,
            last_accrual_at: None,
            concurrency_stamp: new_concurrency_stamp(),
            created_at: now,
            updated_at: now,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Fails with `AccountInactive` unless the account is `Active`.
    pub fn ensure_active(&self) -> CoreResult<()> {
        if !self.is_active() {
            return Err(CoreError::AccountInactive {
                account_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }
}

/// Generates a new opaque concurrency stamp.
pub fn new_concurrency_stamp() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Ledger Rows
// =============================================================================

/// Ledger row type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Accrual,
    Redemption,
    /// Manual correction written by administration tooling.
    Adjustment,
}

/// Append-only ledger row. Never updated or deleted after creation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyPointsTransaction {
    pub id: String,
    pub account_id: String,
    pub business_id: String,
    pub transaction_type: TransactionType,
    /// Signed: positive credits, negative debits.
    pub points_delta: i64,
    pub reward_redemption_id: Option<String>,
    pub location_id: Option<String>,
    pub performed_by_user_id: Option<String>,
    /// Free-text reference; the scan session id for protocol writes.
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Redemption status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    Completed,
}

/// Append-only record of a reward consumption, paired 1:1 with a
/// `Redemption` ledger row whose delta is `-points_spent`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyRewardRedemption {
    pub id: String,
    pub account_id: String,
    pub business_id: String,
    pub reward_tier_id: String,
    /// Always positive.
    pub points_spent: i64,
    pub status: RedemptionStatus,
    pub location_id: Option<String>,
    /// JSON snapshot of the tier at redemption time.
    pub metadata: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Program & Reward Tiers (read-only here)
// =============================================================================

/// What a reward tier grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    FreeItem,
    /// `reward_value` in basis points.
    PercentDiscount,
    /// `reward_value` in minor currency units.
    AmountDiscount,
    Custom,
}

/// A reward a business offers for a number of points.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyRewardTier {
    pub id: String,
    pub program_id: String,
    pub business_id: String,
    pub name: String,
    pub description: Option<String>,
    pub points_required: i64,
    pub reward_type: RewardType,
    pub reward_value: i64,
    pub allow_self_redemption: bool,
    pub is_active: bool,
}

/// A business's loyalty program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltyProgram {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub accrual: AccrualConfig,
    pub is_active: bool,
}

// =============================================================================
// Unit Tests
// =============================================================================
