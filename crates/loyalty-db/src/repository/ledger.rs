//! # Ledger Repository
//!
//! Applies a [`LedgerPlan`] atomically and reads the append-only ledger.
//!
//! ## Commit Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION                                    │
//! │                                                                         │
//! │  1. UPDATE loyalty_accounts SET balance, lifetime, stamp = new         │
//! │      WHERE id = ? AND concurrency_stamp = expected                     │
//! │      └── 0 rows → ROLLBACK → StampMismatch (caller re-reads, retries)  │
//! │                                                                         │
//! │  2. UPDATE scan_sessions SET status = 'completed', resulting tx        │
//! │      WHERE id = ? AND status = 'pending'                               │
//! │      └── 0 rows → ROLLBACK → SessionNotPending                         │
//! │                                                                         │
//! │  3. INSERT loyalty_reward_redemptions (redemption plans only)          │
//! │  4. INSERT loyalty_points_transactions                                 │
//! │                                                                         │
//! │  COMMIT ← balance, ledger and session move together or not at all     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use loyalty_core::ledger::{AccountReconciliation, LedgerPlan};
use loyalty_core::{LoyaltyPointsTransaction, LoyaltyRewardRedemption, OutcomeCode};

/// Result of applying a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The account changed since the plan's snapshot; nothing was written.
    StampMismatch,
    /// The session left `Pending` concurrently; nothing was written.
    SessionNotPending,
}

/// Repository for ledger rows.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Applies a plan: account update, session completion and ledger rows.
    pub async fn commit_plan(&self, plan: &LedgerPlan) -> DbResult<CommitOutcome> {
        debug!(
            session_id = %plan.session_id,
            account_id = %plan.account_id,
            rows = plan.transactions.len(),
            "Committing ledger plan"
        );

        let mut tx = self.pool.begin().await?;

        let account = sqlx::query(
            r#"
            UPDATE loyalty_accounts SET
                points_balance = ?3,
                lifetime_points = ?4,
                last_accrual_at = ?5,
                concurrency_stamp = ?6,
                updated_at = ?7
            WHERE id = ?1 AND concurrency_stamp = ?2
            "#,
        )
        .bind(&plan.account_id)
        .bind(&plan.expected_stamp)
        .bind(plan.points_balance)
        .bind(plan.lifetime_points)
        .bind(plan.last_accrual_at)
        .bind(&plan.new_stamp)
        .bind(plan.completed_at)
        .execute(&mut *tx)
        .await?;

        if account.rows_affected() == 0 {
            tx.rollback().await?;
            warn!(account_id = %plan.account_id, "Concurrency stamp mismatch");
            return Ok(CommitOutcome::StampMismatch);
        }

        let session = sqlx::query(
            r#"
            UPDATE scan_sessions SET
                status = 'completed',
                outcome_code = ?2,
                resulting_transaction_id = ?3,
                completed_at = ?4
            WHERE id = ?1 AND status = 'pending'
            "#,
        )
        .bind(&plan.session_id)
        .bind(OutcomeCode::Success)
        .bind(plan.resulting_transaction_id())
        .bind(plan.completed_at)
        .execute(&mut *tx)
        .await?;

        if session.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::SessionNotPending);
        }

        for redemption in &plan.redemptions {
            sqlx::query(
                r#"
                INSERT INTO loyalty_reward_redemptions (
                    id, account_id, business_id, reward_tier_id, points_spent,
                    status, location_id, metadata, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&redemption.id)
            .bind(&redemption.account_id)
            .bind(&redemption.business_id)
            .bind(&redemption.reward_tier_id)
            .bind(redemption.points_spent)
            .bind(redemption.status)
            .bind(&redemption.location_id)
            .bind(&redemption.metadata)
            .bind(redemption.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for row in &plan.transactions {
            sqlx::query(
                r#"
                INSERT INTO loyalty_points_transactions (
                    id, account_id, business_id, transaction_type, points_delta,
                    reward_redemption_id, location_id, performed_by_user_id,
                    reference, notes, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&row.id)
            .bind(&row.account_id)
            .bind(&row.business_id)
            .bind(row.transaction_type)
            .bind(row.points_delta)
            .bind(&row.reward_redemption_id)
            .bind(&row.location_id)
            .bind(&row.performed_by_user_id)
            .bind(&row.reference)
            .bind(&row.notes)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            session_id = %plan.session_id,
            account_id = %plan.account_id,
            points_delta = plan.points_delta(),
            points_balance = plan.points_balance,
            "Ledger plan committed"
        );
        Ok(CommitOutcome::Committed)
    }

    /// Ledger rows of an account, oldest first.
    pub async fn transactions_for_account(
        &self,
        account_id: &str,
    ) -> DbResult<Vec<LoyaltyPointsTransaction>> {
        let rows = sqlx::query_as::<_, LoyaltyPointsTransaction>(
            r#"
            SELECT
                id, account_id, business_id, transaction_type, points_delta,
                reward_redemption_id, location_id, performed_by_user_id,
                reference, notes, created_at
            FROM loyalty_points_transactions
            WHERE account_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Ledger rows written by one scan session.
    pub async fn transactions_for_session(
        &self,
        session_id: &str,
    ) -> DbResult<Vec<LoyaltyPointsTransaction>> {
        let rows = sqlx::query_as::<_, LoyaltyPointsTransaction>(
            r#"
            SELECT
                id, account_id, business_id, transaction_type, points_delta,
                reward_redemption_id, location_id, performed_by_user_id,
                reference, notes, created_at
            FROM loyalty_points_transactions
            WHERE reference = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Redemptions of an account, oldest first.
    pub async fn redemptions_for_account(
        &self,
        account_id: &str,
    ) -> DbResult<Vec<LoyaltyRewardRedemption>> {
        let rows = sqlx::query_as::<_, LoyaltyRewardRedemption>(
            r#"
            SELECT
                id, account_id, business_id, reward_tier_id, points_spent,
                status, location_id, metadata, created_at
            FROM loyalty_reward_redemptions
            WHERE account_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Compares the stored balance with the ledger sums.
    pub async fn reconcile(&self, account_id: &str) -> DbResult<AccountReconciliation> {
        let (points_balance, lifetime_points): (i64, i64) = sqlx::query_as(
            "SELECT points_balance, lifetime_points FROM loyalty_accounts WHERE id = ?1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("LoyaltyAccount", account_id))?;

        let (ledger_sum, accrued): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(points_delta), 0),
                COALESCE(SUM(CASE WHEN transaction_type = 'accrual' THEN points_delta ELSE 0 END), 0)
            FROM loyalty_points_transactions
            WHERE account_id = ?1
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let redeemed: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(points_spent), 0) FROM loyalty_reward_redemptions WHERE account_id = ?1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(AccountReconciliation {
            account_id: account_id.to_string(),
            points_balance,
            lifetime_points,
            ledger_sum,
            accrued,
            redeemed,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{account, open_session, seed_program, test_db};
    use chrono::Utc;
    use loyalty_core::ledger::{plan_accrual, plan_redemption, Confirmation};
    use loyalty_core::{SessionStatus, TokenPurpose};

    #[tokio::test]
    async fn test_commit_accrual() {
        let db = test_db().await;
        let acct = account(&db, "user-1").await;
        let session = open_session(&db, &acct, TokenPurpose::Accrual).await;

        let plan = plan_accrual(&acct, &session, 12, None, Utc::now()).unwrap();
        assert_eq!(
            db.ledger().commit_plan(&plan).await.unwrap(),
            CommitOutcome::Committed
        );

        let stored = db.accounts().get_by_id(&acct.id).await.unwrap().unwrap();
        assert_eq!(stored.points_balance, 12);
        assert_eq!(stored.lifetime_points, 12);
        assert_eq!(stored.concurrency_stamp, plan.new_stamp);
        assert!(stored.last_accrual_at.is_some());

        let session = db.sessions().get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.outcome_code, Some(OutcomeCode::Success));
        assert_eq!(
            session.resulting_transaction_id.as_deref(),
            Some(plan.resulting_transaction_id())
        );

        let rows = db.ledger().transactions_for_session(&session.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].points_delta, 12);
    }

    #[tokio::test]
    async fn test_stale_stamp_writes_nothing() {
        let db = test_db().await;
        let acct = account(&db, "user-1").await;
        let first = open_session(&db, &acct, TokenPurpose::Accrual).await;
        let second = open_session(&db, &acct, TokenPurpose::Accrual).await;

        // Both plans read the same snapshot.
        let winner = plan_accrual(&acct, &first, 5, None, Utc::now()).unwrap();
        let loser = plan_accrual(&acct, &second, 7, None, Utc::now()).unwrap();

        assert_eq!(db.ledger().commit_plan(&winner).await.unwrap(), CommitOutcome::Committed);
        assert_eq!(
            db.ledger().commit_plan(&loser).await.unwrap(),
            CommitOutcome::StampMismatch
        );

        let stored = db.accounts().get_by_id(&acct.id).await.unwrap().unwrap();
        assert_eq!(stored.points_balance, 5);
        let pending = db.sessions().get_by_id(&second.id).await.unwrap().unwrap();
        assert_eq!(pending.status, SessionStatus::Pending);
        assert!(db.ledger().transactions_for_session(&second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_not_pending_writes_nothing() {
        let db = test_db().await;
        let acct = account(&db, "user-1").await;
        let session = open_session(&db, &acct, TokenPurpose::Accrual).await;
        db.sessions().mark_expired(&session.id, Utc::now()).await.unwrap();

        let plan = plan_accrual(&acct, &session, 5, None, Utc::now()).unwrap();
        assert_eq!(
            db.ledger().commit_plan(&plan).await.unwrap(),
            CommitOutcome::SessionNotPending
        );

        let stored = db.accounts().get_by_id(&acct.id).await.unwrap().unwrap();
        assert_eq!(stored.points_balance, 0);
        assert_eq!(stored.concurrency_stamp, acct.concurrency_stamp);
    }

    #[tokio::test]
    async fn test_redemption_and_reconcile() {
        let db = test_db().await;
        let (_, tiers) = seed_program(&db).await;
        let acct = account(&db, "user-1").await;

        let accrual = open_session(&db, &acct, TokenPurpose::Accrual).await;
        let plan = plan_accrual(&acct, &accrual, 100, None, Utc::now()).unwrap();
        db.ledger().commit_plan(&plan).await.unwrap();

        let acct = db.accounts().get_by_id(&acct.id).await.unwrap().unwrap();
        let redemption = open_session(&db, &acct, TokenPurpose::Redemption).await;
        let plan = plan_redemption(
            &acct,
            &redemption,
            &tiers,
            &Confirmation::Staff {
                user_id: "staff-1".into(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(db.ledger().commit_plan(&plan).await.unwrap(), CommitOutcome::Committed);

        let redemptions = db.ledger().redemptions_for_account(&acct.id).await.unwrap();
        assert_eq!(redemptions.len(), 2);
        let metadata: serde_json::Value = serde_json::from_str(&redemptions[0].metadata).unwrap();
        assert_eq!(metadata["sessionId"], redemption.id.as_str());

        let rec = db.ledger().reconcile(&acct.id).await.unwrap();
        assert_eq!(rec.points_balance, 10);
        assert_eq!(rec.ledger_sum, 10);
        assert_eq!(rec.accrued, 100);
        assert_eq!(rec.redeemed, 90);
        assert_eq!(rec.lifetime_points, 100);
        assert!(rec.is_consistent());
    }

    #[tokio::test]
    async fn test_ledger_is_append_only() {
        let db = test_db().await;
        let acct = account(&db, "user-1").await;
        let session = open_session(&db, &acct, TokenPurpose::Accrual).await;
        let plan = plan_accrual(&acct, &session, 3, None, Utc::now()).unwrap();
        db.ledger().commit_plan(&plan).await.unwrap();

        let update = sqlx::query("UPDATE loyalty_points_transactions SET points_delta = 300")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(update, Err(DbError::ConstraintViolation { .. })));

        let delete = sqlx::query("DELETE FROM loyalty_points_transactions")
            .execute(db.pool())
            .await
            .map_err(DbError::from);
        assert!(matches!(delete, Err(DbError::ConstraintViolation { .. })));
    }

    #[tokio::test]
    async fn test_reconcile_missing_account() {
        let db = test_db().await;
        assert!(matches!(
            db.ledger().reconcile("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }
}
