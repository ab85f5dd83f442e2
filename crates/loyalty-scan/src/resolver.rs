//! # Token Resolver
//!
//! Turns a scanned token into a pending scan session for the claiming
//! business. At most one caller ever wins a given token.
//!
//! ## Resolution Flow
//! ```text
//! scan ──► find token ──► consumed? expired? purpose? ──► account ──► active?
//!               │                   │                        │           │
//!           NOT_FOUND     ALREADY_CONSUMED / EXPIRED /   NOT_FOUND   ACCOUNT_INACTIVE
//!                         UNSUPPORTED_PURPOSE            FORBIDDEN
//!                                                                        │
//!           ┌────────────────────────────────────────────────────────────┘
//!           ▼
//!   ┌────────────────────── one transaction ───────────────────────┐
//!   │ UPDATE qr_code_tokens ... WHERE consumed_at IS NULL          │
//!   │   0 rows ──► ALREADY_CONSUMED (no session)                   │
//!   │   1 row  ──► INSERT scan_sessions (pending) ──► COMMIT       │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything before the conditional write is a pre-check; losing the
//! race after passing it is still reported as `ALREADY_CONSUMED`.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info};

use loyalty_core::validation::{validate_optional, validate_required};
use loyalty_core::view::SessionView;
use loyalty_core::{Clock, CoreError, LoyaltyAccount, QrCodeToken, ScanSession, TokenPurpose};
use loyalty_db::{ClaimOutcome, Database};

use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};

/// Claims tokens for businesses.
#[derive(Clone)]
pub struct TokenResolver {
    db: Database,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl TokenResolver {
    pub fn new(db: Database, clock: Arc<dyn Clock>, config: &ScanConfig) -> Self {
        TokenResolver {
            db,
            clock,
            session_ttl: config.session_ttl(),
        }
    }

    /// Consumes `token` for `business_id` and opens a pending session.
    ///
    /// ## Errors
    /// - `TokenNotFound`: no such token string
    /// - `TokenAlreadyConsumed`: consumed earlier, or lost the race
    /// - `TokenExpired`, `UnsupportedPurpose`
    /// - `NotFound`: redemption for a user with no account at this business
    /// - `Forbidden`: token bound to an account of another business or user
    /// - `AccountInactive`
    ///
    /// None of these consume the token.
    pub async fn resolve_for_business(
        &self,
        token: &str,
        business_id: &str,
        location_id: Option<&str>,
    ) -> ScanResult<SessionView> {
        if token.trim().is_empty() {
            return Err(ScanError::InvalidArgument("token is required".into()));
        }
        validate_required("business_id", business_id)?;
        validate_optional("location_id", location_id)?;

        let now = self.clock.now();

        let token = self
            .db
            .tokens()
            .find_by_token(token.trim())
            .await?
            .ok_or(ScanError::TokenNotFound)?;

        let purpose = token.ensure_resolvable(now)?;
        debug!(token_id = %token.id, purpose = %purpose, business_id = %business_id, "Token passed pre-checks");

        let account = self.account_for(&token, purpose, business_id).await?;
        account.ensure_active()?;

        let session = ScanSession::open(
            &token,
            purpose,
            &account.id,
            business_id,
            location_id,
            now,
            self.session_ttl,
        );

        match self.db.scans().claim_token_and_open_session(&session, now).await? {
            ClaimOutcome::Claimed => {
                info!(
                    token_id = %token.id,
                    session_id = %session.id,
                    account_id = %account.id,
                    mode = %purpose,
                    "Scan session opened"
                );
                Ok(SessionView::new(&session, &account))
            }
            ClaimOutcome::AlreadyConsumed => {
                debug!(token_id = %token.id, business_id = %business_id, "Lost token claim race");
                Err(CoreError::TokenAlreadyConsumed.into())
            }
        }
    }

    /// Finds the account the session will run against.
    ///
    /// A token bound to an account must name one of this business and this
    /// user. Otherwise the account is found by (business, user); accrual
    /// creates it on first use.
    async fn account_for(
        &self,
        token: &QrCodeToken,
        purpose: TokenPurpose,
        business_id: &str,
    ) -> ScanResult<LoyaltyAccount> {
        let accounts = self.db.accounts();

        if let Some(bound) = token.loyalty_account_id.as_deref() {
            let account = accounts
                .get_by_id(bound)
                .await?
                .ok_or_else(|| ScanError::not_found("LoyaltyAccount", bound))?;

            if account.business_id != business_id || account.user_id != token.user_id {
                return Err(ScanError::Forbidden(format!(
                    "token is bound to account {} of another business or user",
                    bound
                )));
            }
            return Ok(account);
        }

        match purpose {
            TokenPurpose::Accrual => Ok(accounts
                .get_or_create(business_id, &token.user_id, self.clock.now())
                .await?),
            TokenPurpose::Redemption => accounts
                .find_by_business_user(business_id, &token.user_id)
                .await?
                .ok_or_else(|| {
                    ScanError::not_found("LoyaltyAccount", format!("{}/{}", business_id, token.user_id))
                }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
