//! # Session Presenter
//!
//! Read-only view of a claimed session for the business device: whose
//! account, its balance, the mode and whatever rewards the consumer
//! pre-selected. Nothing here writes.
//!
//! Expiry is lazy, so a `pending` session past its deadline is shown as
//! `expired` even though the stored row still says `pending`.

use std::sync::Arc;
use tracing::debug;

use loyalty_core::rewards::SelectedReward;
use loyalty_core::validation::validate_required;
use loyalty_core::view::SessionView;
use loyalty_core::{Clock, LoyaltyRewardTier, ScanSession, SessionStatus};
use loyalty_db::Database;

use crate::collaborators::ProgramLookup;
use crate::error::{ScanError, ScanResult};

/// Builds session views.
#[derive(Clone)]
pub struct SessionPresenter {
    db: Database,
    clock: Arc<dyn Clock>,
    programs: Arc<dyn ProgramLookup>,
}

impl SessionPresenter {
    pub fn new(db: Database, clock: Arc<dyn Clock>, programs: Arc<dyn ProgramLookup>) -> Self {
        SessionPresenter { db, clock, programs }
    }

    /// Presents the session a scanned token opened.
    ///
    /// ## Errors
    /// - `TokenNotFound`, or `NotFound` if the token was never claimed
    /// - `Forbidden`: the session belongs to another business
    pub async fn present_for_business(
        &self,
        token: &str,
        business_id: &str,
    ) -> ScanResult<SessionView> {
        if token.trim().is_empty() {
            return Err(ScanError::InvalidArgument("token is required".into()));
        }
        validate_required("business_id", business_id)?;

        let token = self
            .db
            .tokens()
            .find_by_token(token.trim())
            .await?
            .ok_or(ScanError::TokenNotFound)?;

        let session = self
            .db
            .sessions()
            .find_by_token_id(&token.id)
            .await?
            .ok_or_else(|| ScanError::not_found("ScanSession", format!("for token {}", token.id)))?;

        self.present(session, business_id).await
    }

    /// Presents a session by id.
    pub async fn present_session(
        &self,
        session_id: &str,
        business_id: &str,
    ) -> ScanResult<SessionView> {
        validate_required("session_id", session_id)?;
        validate_required("business_id", business_id)?;

        let session = self
            .db
            .sessions()
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| ScanError::not_found("ScanSession", session_id))?;

        self.present(session, business_id).await
    }

    async fn present(&self, session: ScanSession, business_id: &str) -> ScanResult<SessionView> {
        if !session.belongs_to(business_id) {
            return Err(ScanError::Forbidden(format!(
                "session {} belongs to another business",
                session.id
            )));
        }

        let account = self
            .db
            .accounts()
            .get_by_id(&session.loyalty_account_id)
            .await?
            .ok_or_else(|| ScanError::not_found("LoyaltyAccount", &session.loyalty_account_id))?;

        let mut view = SessionView::new(&session, &account);

        if view.status == SessionStatus::Pending && session.is_expired_at(self.clock.now()) {
            view.status = SessionStatus::Expired;
        }

        if !view.selected_rewards.is_empty() {
            let catalog = self.programs.active_tiers(business_id).await?;
            fill_from_catalog(&mut view.selected_rewards, &catalog);
        }

        debug!(
            session_id = %view.session_id,
            status = %view.status,
            selected = view.selected_rewards.len(),
            "Session presented"
        );
        Ok(view)
    }
}

/// Replaces what the consumer device claimed about a reward with the
/// business's current catalog entry. Rewards no longer in the catalog keep
/// their consumer-side values.
fn fill_from_catalog(rewards: &mut [SelectedReward], catalog: &[LoyaltyRewardTier]) {
    for reward in rewards.iter_mut() {
        if let Some(tier) = catalog.iter().find(|t| t.id == reward.reward_tier_id) {
            reward.name = Some(tier.name.clone());
            reward.points_required = Some(tier.points_required);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
