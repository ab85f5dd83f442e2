//! # Session Finalizer
//!
//! Commits the business's decision on a pending session into the ledger,
//! exactly once.
//!
//! ## State Machine
//! ```text
//!                    ┌───────────────► Completed   (ledger written)
//!                    │
//!   Pending ─────────┼───────────────► Failed      (rule violated, nothing written)
//!                    │
//!                    └───────────────► Expired     (now > expires_at, checked first)
//!
//!   anything else ──► INVALID_STATE, no mutation
//! ```
//!
//! ## Commit Cycle
//! ```text
//! ┌─► read account (stamp S) ──► load program / tiers ──► plan (pure)
//! │                                                          │
//! │   ┌──────────────────── one transaction ─────────────────▼──────────┐
//! │   │ UPDATE loyalty_accounts ... WHERE concurrency_stamp = S         │
//! │   │ UPDATE scan_sessions SET completed ... WHERE status = 'pending' │
//! │   │ INSERT redemptions, INSERT ledger rows                          │
//! │   └─────────────────────────────────────────────────────────────────┘
//! │            │ stamp changed
//! └────────────┘ (at most max_stamp_retries times, then CONFLICT)
//! ```
//!
//! Rule violations after the token was consumed end the session as `Failed`
//! and come back as `Ok(FinalizeOutcome::Failed { .. })`. Calls that must not
//! touch the session (wrong business, not pending, storage faults) come back
//! as `Err`.

use std::sync::Arc;
use tracing::{debug, info, warn};

use loyalty_core::ledger::{plan_accrual, plan_redemption, Decision, FinalizeRequest, LedgerPlan};
use loyalty_core::rewards::parse_selected_rewards;
use loyalty_core::validation::{validate_required, validate_tier_selection};
use loyalty_core::view::FinalizeOutcome;
use loyalty_core::{Clock, CoreError, LoyaltyAccount, LoyaltyRewardTier, ScanSession};
use loyalty_db::{CommitOutcome, Database};

use crate::collaborators::ProgramLookup;
use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};

/// Finalizes sessions.
#[derive(Clone)]
pub struct SessionFinalizer {
    db: Database,
    clock: Arc<dyn Clock>,
    programs: Arc<dyn ProgramLookup>,
    max_attempts: u32,
}

impl SessionFinalizer {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        programs: Arc<dyn ProgramLookup>,
        config: &ScanConfig,
    ) -> Self {
        SessionFinalizer {
            db,
            clock,
            programs,
            max_attempts: config.finalize.max_stamp_retries,
        }
    }

    /// Applies `request` to the session.
    ///
    /// ## Returns
    /// * `Ok(Completed)` - ledger written, session completed
    /// * `Ok(Failed)` - session failed with the rule that rejected it
    /// * `Ok(Expired)` - the session window had closed
    ///
    /// ## Errors
    /// - `InvalidArgument`: malformed request (session untouched)
    /// - `NotFound`: no such session
    /// - `Forbidden`: session belongs to another business (untouched)
    /// - `InvalidSessionState`: session already left `Pending`
    /// - `Store`: storage fault (session stays `Pending`)
    pub async fn finalize(
        &self,
        session_id: &str,
        request: &FinalizeRequest,
    ) -> ScanResult<FinalizeOutcome> {
        validate_required("session_id", session_id)?;
        request.validate()?;

        let now = self.clock.now();
        let sessions = self.db.sessions();

        let session = sessions
            .get_by_id(session_id)
            .await?
            .ok_or_else(|| ScanError::not_found("ScanSession", session_id))?;

        if !session.belongs_to(&request.business_id) {
            warn!(
                session_id = %session.id,
                business_id = %request.business_id,
                "Finalize attempted by another business"
            );
            return Err(ScanError::Forbidden(format!(
                "session {} belongs to another business",
                session.id
            )));
        }

        session.ensure_pending()?;

        if session.is_expired_at(now) {
            if !sessions.mark_expired(&session.id, now).await? {
                return Err(self.state_error(&session.id).await);
            }
            warn!(session_id = %session.id, expires_at = %session.expires_at, "Session expired before finalize");
            return Ok(FinalizeOutcome::Expired {
                session_id: session.id,
            });
        }

        let result = match request.decision.ensure_matches(&session) {
            Ok(()) => self.commit(&session, &request.decision).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(plan) => {
                let outcome = FinalizeOutcome::completed(&plan);
                info!(
                    session_id = %session.id,
                    account_id = %plan.account_id,
                    points_delta = plan.points_delta(),
                    points_balance = plan.points_balance,
                    "Session completed"
                );
                Ok(outcome)
            }
            Err(e) if e.fails_session() => self.fail(&session, e).await,
            Err(e) => Err(e),
        }
    }

    /// The read-plan-write cycle, retried while the account stamp moves.
    async fn commit(&self, session: &ScanSession, decision: &Decision) -> ScanResult<LedgerPlan> {
        let ledger = self.db.ledger();

        for attempt in 1..=self.max_attempts {
            let now = self.clock.now();
            let account = self
                .db
                .accounts()
                .get_by_id(&session.loyalty_account_id)
                .await?
                .ok_or_else(|| ScanError::not_found("LoyaltyAccount", &session.loyalty_account_id))?;
            account.ensure_active()?;

            let plan = self.plan(&account, session, decision, now).await?;

            match ledger.commit_plan(&plan).await? {
                CommitOutcome::Committed => return Ok(plan),
                CommitOutcome::StampMismatch => {
                    warn!(
                        session_id = %session.id,
                        account_id = %account.id,
                        attempt,
                        "Account changed during finalize, retrying"
                    );
                }
                CommitOutcome::SessionNotPending => {
                    return Err(self.state_error(&session.id).await);
                }
            }
        }

        Err(ScanError::Conflict {
            account_id: session.loyalty_account_id.clone(),
            attempts: self.max_attempts,
        })
    }

    async fn plan(
        &self,
        account: &LoyaltyAccount,
        session: &ScanSession,
        decision: &Decision,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ScanResult<LedgerPlan> {
        match decision {
            Decision::Accrue { spend, performed_by } => {
                let program = self
                    .programs
                    .active_program(&session.business_id)
                    .await?
                    .ok_or_else(|| ScanError::not_found("LoyaltyProgram", &session.business_id))?;
                let points = program.accrual.points_for(spend)?;
                debug!(session_id = %session.id, points, currency = %spend.currency, "Accrual computed");

                Ok(plan_accrual(account, session, points, performed_by.as_deref(), now)?)
            }
            Decision::Redeem {
                reward_tier_ids,
                confirmed_by,
            } => {
                let tiers = self.tiers_for(session, reward_tier_ids).await?;
                Ok(plan_redemption(account, session, &tiers, confirmed_by, now)?)
            }
        }
    }

    /// Loads the tiers to redeem, in order. An empty request falls back to
    /// what the consumer pre-selected.
    async fn tiers_for(
        &self,
        session: &ScanSession,
        requested: &[String],
    ) -> ScanResult<Vec<LoyaltyRewardTier>> {
        let ids: Vec<String> = if requested.is_empty() {
            parse_selected_rewards(session.selected_rewards.as_deref())
                .into_iter()
                .map(|r| r.reward_tier_id)
                .collect()
        } else {
            requested.to_vec()
        };

        if ids.is_empty() {
            return Err(ScanError::InvalidArgument(
                "no reward tiers selected for redemption".into(),
            ));
        }
        validate_tier_selection(ids.len())?;

        let mut tiers = Vec::with_capacity(ids.len());
        for id in &ids {
            let tier = self
                .programs
                .find_tier(&session.business_id, id)
                .await?
                .ok_or_else(|| CoreError::RewardUnavailable(id.clone()))?;
            tiers.push(tier);
        }
        Ok(tiers)
    }

    /// Ends the session as `Failed` with the error's code.
    async fn fail(&self, session: &ScanSession, err: ScanError) -> ScanResult<FinalizeOutcome> {
        let code = err.outcome_code();
        let reason = err.to_string();

        let changed = self
            .db
            .sessions()
            .mark_failed(&session.id, code, &reason, self.clock.now())
            .await?;
        if !changed {
            return Err(self.state_error(&session.id).await);
        }

        warn!(session_id = %session.id, code = ?code, reason = %reason, "Session failed");
        Ok(FinalizeOutcome::Failed {
            session_id: session.id.clone(),
            code,
            reason,
        })
    }

    /// `InvalidSessionState` carrying whatever status the session has now.
    async fn state_error(&self, session_id: &str) -> ScanError {
        match self.db.sessions().get_by_id(session_id).await {
            Ok(Some(current)) => CoreError::InvalidSessionState {
                session_id: current.id,
                status: current.status.to_string(),
            }
            .into(),
            Ok(None) => ScanError::not_found("ScanSession", session_id),
            Err(e) => e.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
