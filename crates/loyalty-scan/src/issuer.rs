//! # Token Issuer
//!
//! Mints the single-use capability a consumer device renders as a QR code.
//!
//! ## Token Anatomy
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  id       uuid v4 (logged, used as a reference)                  │
//! │  token    token_bytes from the OS RNG, hex encoded (never logged)│
//! │  purpose  accrual | redemption                                   │
//! │  expires  issued_at + ttl                                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A random collision with an existing token is absorbed by regenerating
//! the string; the UNIQUE index on `qr_code_tokens.token` is the arbiter.

use chrono::Duration;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use loyalty_core::rewards::{serialize_selected_rewards, SelectedReward};
use loyalty_core::validation::{
    validate_optional, validate_required, validate_tier_selection, validate_ttl,
};
use loyalty_core::{Clock, QrCodeToken, TokenPurpose};
use loyalty_db::Database;

use crate::collaborators::CurrentUser;
use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};

/// Insert attempts before a string collision is treated as a fault.
const MAX_INSERT_ATTEMPTS: u32 = 3;

// =============================================================================
// Request / Response
// =============================================================================

/// Parameters for issuing a token.
#[derive(Debug, Clone)]
pub struct IssueTokenRequest {
    pub user_id: String,
    pub purpose: TokenPurpose,
    /// Binds the token to one account; resolution at another business fails.
    pub loyalty_account_id: Option<String>,
    /// Falls back to `tokens.ttl_secs` when absent.
    pub ttl: Option<Duration>,
    /// Rewards picked on the consumer device (redemption only).
    pub selected_rewards: Vec<SelectedReward>,
}

impl IssueTokenRequest {
    pub fn new(user_id: impl Into<String>, purpose: TokenPurpose) -> Self {
        IssueTokenRequest {
            user_id: user_id.into(),
            purpose,
            loyalty_account_id: None,
            ttl: None,
            selected_rewards: Vec::new(),
        }
    }

    pub fn for_account(mut self, account_id: impl Into<String>) -> Self {
        self.loyalty_account_id = Some(account_id.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_selected_rewards(mut self, rewards: Vec<SelectedReward>) -> Self {
        self.selected_rewards = rewards;
        self
    }

    fn validate(&self) -> ScanResult<()> {
        validate_required("user_id", &self.user_id)?;
        validate_optional("loyalty_account_id", self.loyalty_account_id.as_deref())?;

        if let Some(ttl) = self.ttl {
            validate_ttl("ttl", ttl)?;
        }

        if !self.selected_rewards.is_empty() {
            if self.purpose != TokenPurpose::Redemption {
                return Err(ScanError::InvalidArgument(
                    "selected rewards are only allowed on redemption tokens".into(),
                ));
            }
            validate_tier_selection(self.selected_rewards.len())?;
            for reward in &self.selected_rewards {
                validate_required("reward_tier_id", &reward.reward_tier_id)?;
            }
        }

        Ok(())
    }
}

/// What the consumer device needs to render the code.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token_id: String,
    /// The string to encode in the QR code.
    pub token: String,
    pub purpose: TokenPurpose,
    #[ts(as = "String")]
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

// =============================================================================
// Issuer
// =============================================================================

/// Creates tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    db: Database,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    token_bytes: usize,
}

impl TokenIssuer {
    pub fn new(db: Database, clock: Arc<dyn Clock>, config: &ScanConfig) -> Self {
        TokenIssuer {
            db,
            clock,
            default_ttl: config.token_ttl(),
            token_bytes: config.tokens.token_bytes,
        }
    }

    /// Issues a token.
    ///
    /// ## Errors
    /// - `InvalidArgument`: empty user id, non-positive TTL, a TTL whose
    ///   expiry does not fit a timestamp, rewards on an accrual token
    /// - `Store`: the insert failed
    pub async fn issue(&self, request: IssueTokenRequest) -> ScanResult<IssuedToken> {
        request.validate()?;

        let now = self.clock.now();
        let ttl = request.ttl.unwrap_or(self.default_ttl);
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| ScanError::InvalidArgument("ttl is out of range".into()))?;

        let mut token = QrCodeToken {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.trim().to_string(),
            loyalty_account_id: request.loyalty_account_id,
            token: String::new(),
            purpose: request.purpose.as_str().to_string(),
            selected_rewards: serialize_selected_rewards(&request.selected_rewards),
            issued_at: now,
            expires_at,
            consumed_at: None,
            consumed_by_business_id: None,
            consumed_at_location_id: None,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            token.token = self.generate();

            match self.db.tokens().insert(&token).await {
                Ok(()) => break,
                Err(e) if e.is_unique_violation_on("qr_code_tokens.token")
                    && attempt < MAX_INSERT_ATTEMPTS =>
                {
                    warn!(token_id = %token.id, attempt, "Token string collision, regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            token_id = %token.id,
            user_id = %token.user_id,
            purpose = %request.purpose,
            expires_at = %token.expires_at,
            "Token issued"
        );

        Ok(IssuedToken {
            token_id: token.id.clone(),
            token: token.token,
            purpose: request.purpose,
            expires_at: token.expires_at,
        })
    }

    /// Issues a token for whoever is signed in on the consumer device.
    ///
    /// The request's `user_id` is replaced by the current user's.
    pub async fn issue_for_current_user(
        &self,
        user: &dyn CurrentUser,
        mut request: IssueTokenRequest,
    ) -> ScanResult<IssuedToken> {
        let user_id = user
            .user_id()
            .ok_or_else(|| ScanError::InvalidArgument("no signed-in user".into()))?;
        debug!(user_id = %user_id, "Issuing token for current user");

        request.user_id = user_id.to_string();
        self.issue(request).await
    }

    fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.token_bytes];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{Anonymous, AuthenticatedUser};
    use crate::test_support::harness;
    use loyalty_core::rewards::parse_selected_rewards;
    use loyalty_core::OutcomeCode;

    #[tokio::test]
    async fn test_issue_defaults() {
        let h = harness().await;
        let issued = h
            .service
            .issuer()
            .issue(IssueTokenRequest::new("user-1", TokenPurpose::Accrual))
            .await
            .unwrap();

        assert_eq!(issued.token.len(), 64);
        assert!(issued.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(issued.expires_at - h.clock.now(), Duration::seconds(300));

        let stored = h.db.tokens().get_by_id(&issued.token_id).await.unwrap();
        assert_eq!(stored.token, issued.token);
        assert!(stored.consumed_at.is_none());
        assert!(stored.selected_rewards.is_none());
    }

    #[tokio::test]
    async fn test_tokens_are_distinct() {
        let h = harness().await;
        let issuer = h.service.issuer();
        let a = issuer.issue(IssueTokenRequest::new("u", TokenPurpose::Accrual)).await.unwrap();
        let b = issuer.issue(IssueTokenRequest::new("u", TokenPurpose::Accrual)).await.unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(a.token_id, b.token_id);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let h = harness().await;
        let issuer = h.service.issuer();

        let err = issuer
            .issue(IssueTokenRequest::new("  ", TokenPurpose::Accrual))
            .await
            .unwrap_err();
        assert_eq!(err.outcome_code(), OutcomeCode::InvalidArgument);

        let err = issuer
            .issue(IssueTokenRequest::new("u", TokenPurpose::Accrual).with_ttl(Duration::zero()))
            .await
            .unwrap_err();
        assert_eq!(err.outcome_code(), OutcomeCode::InvalidArgument);

        let err = issuer
            .issue(
                IssueTokenRequest::new("u", TokenPurpose::Accrual)
                    .with_ttl(Duration::days(365 * 400_000)),
            )
            .await
            .unwrap_err();
        assert_eq!(err.outcome_code(), OutcomeCode::InvalidArgument);

        let err = issuer
            .issue(
                IssueTokenRequest::new("u", TokenPurpose::Accrual)
                    .with_selected_rewards(vec![SelectedReward::new("t1")]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.outcome_code(), OutcomeCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_selected_rewards_are_stored() {
        let h = harness().await;
        let issued = h
            .service
            .issuer()
            .issue(
                IssueTokenRequest::new("u", TokenPurpose::Redemption)
                    .with_ttl(Duration::minutes(10))
                    .with_selected_rewards(vec![SelectedReward::new("t1"), SelectedReward::new("t2")]),
            )
            .await
            .unwrap();

        let stored = h.db.tokens().get_by_id(&issued.token_id).await.unwrap();
        let rewards = parse_selected_rewards(stored.selected_rewards.as_deref());
        assert_eq!(rewards.len(), 2);
        assert_eq!(rewards[1].reward_tier_id, "t2");
        assert_eq!(stored.expires_at - stored.issued_at, Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_current_user() {
        let h = harness().await;
        let issuer = h.service.issuer();

        let issued = issuer
            .issue_for_current_user(
                &AuthenticatedUser("user-7".into()),
                IssueTokenRequest::new("", TokenPurpose::Accrual),
            )
            .await
            .unwrap();
        let stored = h.db.tokens().get_by_id(&issued.token_id).await.unwrap();
        assert_eq!(stored.user_id, "user-7");

        let err = issuer
            .issue_for_current_user(&Anonymous, IssueTokenRequest::new("", TokenPurpose::Accrual))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidArgument(_)));
    }
}
