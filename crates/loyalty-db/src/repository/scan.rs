//! # Scan Repository
//!
//! The token claim: one conditional write on the token plus the session
//! insert, in a single transaction.
//!
//! ## Claim Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    UPDATE qr_code_tokens SET consumed_at = now, ...                    │
//! │     WHERE id = ? AND consumed_at IS NULL                               │
//! │       │                                                                 │
//! │       ├── 0 rows → ROLLBACK → AlreadyConsumed (another scanner won)    │
//! │       │                                                                 │
//! │       ▼ 1 row                                                           │
//! │    INSERT INTO scan_sessions (..., status = 'pending')                 │
//! │       │                                                                 │
//! │       ├── error → ROLLBACK, then burn the token in a separate write    │
//! │       │           (consumption is irreversible) → Err                  │
//! │       ▼                                                                 │
//! │  COMMIT → Claimed                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The UPDATE is the first statement so the transaction takes the write lock
//! immediately; concurrent claimers queue on the busy timeout and then see
//! `consumed_at` already set.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{error, info};

use crate::error::DbResult;
use crate::repository::session::insert_session;
use crate::repository::token::TokenRepository;
use loyalty_core::ScanSession;

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller consumed the token and the session exists.
    Claimed,
    /// The token was already consumed; nothing was written.
    AlreadyConsumed,
}

/// Repository for the multi-table scan writes.
#[derive(Debug, Clone)]
pub struct ScanRepository {
    pool: SqlitePool,
}

impl ScanRepository {
    /// Creates a new ScanRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ScanRepository { pool }
    }

    /// Consumes `session.token_id` for `session.business_id` and inserts the
    /// pending session, atomically.
    ///
    /// ## Returns
    /// * `Ok(Claimed)` - token consumed, session committed
    /// * `Ok(AlreadyConsumed)` - lost the race; no session
    /// * `Err(_)` - storage failure; the token is left consumed
    pub async fn claim_token_and_open_session(
        &self,
        session: &ScanSession,
        now: DateTime<Utc>,
    ) -> DbResult<ClaimOutcome> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE qr_code_tokens SET
                consumed_at = ?2,
                consumed_by_business_id = ?3,
                consumed_at_location_id = ?4
            WHERE id = ?1 AND consumed_at IS NULL
            "#,
        )
        .bind(&session.token_id)
        .bind(now)
        .bind(&session.business_id)
        .bind(&session.location_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ClaimOutcome::AlreadyConsumed);
        }

        if let Err(e) = open_session(tx, session).await {
            error!(
                token_id = %session.token_id,
                error = %e,
                "Opening scan session failed after claim, burning token"
            );
            TokenRepository::new(self.pool.clone())
                .burn(
                    &session.token_id,
                    &session.business_id,
                    session.location_id.as_deref(),
                    now,
                )
                .await?;
            return Err(e);
        }

        info!(
            token_id = %session.token_id,
            session_id = %session.id,
            business_id = %session.business_id,
            "Token consumed, session opened"
        );
        Ok(ClaimOutcome::Claimed)
    }
}

/// Inserts the session and commits. Dropping `tx` on error rolls it back.
async fn open_session(mut tx: Transaction<'_, Sqlite>, session: &ScanSession) -> DbResult<()> {
    insert_session(&mut tx, session).await?;
    tx.commit().await?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
