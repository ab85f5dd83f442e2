//! # Loyalty Account Repository
//!
//! Lookup and lazy creation of accounts. Balance updates do NOT live here:
//! they are part of the atomic ledger commit in `ledger.rs`, guarded by the
//! account's concurrency stamp.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use loyalty_core::{new_concurrency_stamp, AccountStatus, LoyaltyAccount};

/// Repository for loyalty account operations.
#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    /// Creates a new AccountRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AccountRepository { pool }
    }

    /// Gets an account by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            SELECT
                id, business_id, user_id, status, points_balance, lifetime_points,
                last_accrual_at, concurrency_stamp, created_at, updated_at
            FROM loyalty_accounts
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Gets the account a user holds with a business.
    pub async fn find_by_business_user(
        &self,
        business_id: &str,
        user_id: &str,
    ) -> DbResult<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            SELECT
                id, business_id, user_id, status, points_balance, lifetime_points,
                last_accrual_at, concurrency_stamp, created_at, updated_at
            FROM loyalty_accounts
            WHERE business_id = ?1 AND user_id = ?2
            "#,
        )
        .bind(business_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    /// Inserts an account row as given.
    pub async fn insert(&self, account: &LoyaltyAccount) -> DbResult<()> {
        debug!(account_id = %account.id, business_id = %account.business_id, "Inserting account");

        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (
                id, business_id, user_id, status, points_balance, lifetime_points,
                last_accrual_at, concurrency_stamp, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&account.id)
        .bind(&account.business_id)
        .bind(&account.user_id)
        .bind(account.status)
        .bind(account.points_balance)
        .bind(account.lifetime_points)
        .bind(account.last_accrual_at)
        .bind(&account.concurrency_stamp)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the user's account with the business, creating a zero-balance
    /// one if none exists.
    ///
    /// ## Concurrency
    /// Two first scans for the same user may race; `ON CONFLICT DO NOTHING`
    /// on `(business_id, user_id)` lets both converge on the same row.
    pub async fn get_or_create(
        &self,
        business_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<LoyaltyAccount> {
        let fresh = LoyaltyAccount::new(business_id, user_id, now);

        let result = sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (
                id, business_id, user_id, status, points_balance, lifetime_points,
                last_accrual_at, concurrency_stamp, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 0, 0, NULL, ?5, ?6, ?6)
            ON CONFLICT (business_id, user_id) DO NOTHING
            "#,
        )
        .bind(&fresh.id)
        .bind(business_id)
        .bind(user_id)
        .bind(fresh.status)
        .bind(&fresh.concurrency_stamp)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(account_id = %fresh.id, business_id = %business_id, "Loyalty account created");
        }

        self.find_by_business_user(business_id, user_id)
            .await?
            .ok_or_else(|| DbError::not_found("LoyaltyAccount", format!("{business_id}/{user_id}")))
    }

    /// Changes an account's status, rotating its stamp so in-flight
    /// finalizes re-read it.
    pub async fn set_status(
        &self,
        id: &str,
        status: AccountStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE loyalty_accounts SET
                status = ?2,
                concurrency_stamp = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(new_concurrency_stamp())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LoyaltyAccount", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
