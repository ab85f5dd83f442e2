//! # Scan Session Repository
//!
//! Sessions are created by the token claim (see `scan.rs`) and leave
//! `Pending` exactly once. Every transition here is conditional on
//! `status = 'pending'`; a database trigger rejects any update to a terminal
//! row as a second line of defense.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use loyalty_core::{OutcomeCode, ScanSession};

/// Repository for scan session operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Gets a session by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ScanSession>> {
        let session = sqlx::query_as::<_, ScanSession>(
            r#"
            SELECT
                id, token_id, loyalty_account_id, business_id, location_id,
                mode, status, selected_rewards, created_at, expires_at,
                outcome_code, failure_reason, resulting_transaction_id, completed_at
            FROM scan_sessions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Gets the session opened by a token, if any.
    pub async fn find_by_token_id(&self, token_id: &str) -> DbResult<Option<ScanSession>> {
        let session = sqlx::query_as::<_, ScanSession>(
            r#"
            SELECT
                id, token_id, loyalty_account_id, business_id, location_id,
                mode, status, selected_rewards, created_at, expires_at,
                outcome_code, failure_reason, resulting_transaction_id, completed_at
            FROM scan_sessions
            WHERE token_id = ?1
            "#,
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Number of sessions opened by a token (0 or 1).
    pub async fn count_for_token(&self, token_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scan_sessions WHERE token_id = ?1")
            .bind(token_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// `Pending → Failed` with an outcome code and reason.
    ///
    /// ## Returns
    /// `false` if the session was no longer pending.
    pub async fn mark_failed(
        &self,
        id: &str,
        code: OutcomeCode,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scan_sessions SET
                status = 'failed',
                outcome_code = ?2,
                failure_reason = ?3,
                completed_at = ?4
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(reason)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() == 1;
        if changed {
            info!(session_id = %id, code = ?code, "Session failed");
        }
        Ok(changed)
    }

    /// `Pending → Expired`.
    ///
    /// ## Returns
    /// `false` if the session was no longer pending.
    pub async fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scan_sessions SET
                status = 'expired',
                outcome_code = ?2,
                failure_reason = 'session expired before finalize',
                completed_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(OutcomeCode::Expired)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() == 1;
        if changed {
            info!(session_id = %id, "Session expired");
        }
        Ok(changed)
    }
}

/// Inserts a session on an existing connection or transaction.
pub(crate) async fn insert_session(
    conn: &mut SqliteConnection,
    session: &ScanSession,
) -> DbResult<()> {
    debug!(session_id = %session.id, token_id = %session.token_id, "Inserting session");

    sqlx::query(
        r#"
        INSERT INTO scan_sessions (
            id, token_id, loyalty_account_id, business_id, location_id,
            mode, status, selected_rewards, created_at, expires_at,
            outcome_code, failure_reason, resulting_transaction_id, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&session.id)
    .bind(&session.token_id)
    .bind(&session.loyalty_account_id)
    .bind(&session.business_id)
    .bind(&session.location_id)
    .bind(session.mode)
    .bind(session.status)
    .bind(&session.selected_rewards)
    .bind(session.created_at)
    .bind(session.expires_at)
    .bind(session.outcome_code)
    .bind(&session.failure_reason)
    .bind(&session.resulting_transaction_id)
    .bind(session.completed_at)
    .execute(&mut *conn)
    .await
    .map_err(DbError::from)?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
