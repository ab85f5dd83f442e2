//! # Token Repository
//!
//! Storage for single-use QR code tokens.
//!
//! ## Token Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. ISSUE                                                              │
//! │     └── insert() → consumed_at NULL                                    │
//! │                                                                         │
//! │  2. CLAIM (ScanRepository, same transaction as the session insert)     │
//! │     └── UPDATE ... WHERE id = ? AND consumed_at IS NULL                │
//! │                                                                         │
//! │  3. BURN (only if opening the session failed after the claim)          │
//! │     └── burn() → same predicate, separate write                        │
//! │                                                                         │
//! │  Rows are never deleted; consumed tokens stay for audit.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use loyalty_core::QrCodeToken;

/// Repository for token operations.
#[derive(Debug, Clone)]
pub struct TokenRepository {
    pool: SqlitePool,
}

impl TokenRepository {
    /// Creates a new TokenRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TokenRepository { pool }
    }

    /// Inserts a freshly issued token.
    ///
    /// ## Errors
    /// `UniqueViolation` on `qr_code_tokens.token` if the random string
    /// collides; the issuer regenerates and retries.
    pub async fn insert(&self, token: &QrCodeToken) -> DbResult<()> {
        debug!(token_id = %token.id, purpose = %token.purpose, "Inserting token");

        sqlx::query(
            r#"
            INSERT INTO qr_code_tokens (
                id, user_id, loyalty_account_id, token, purpose, selected_rewards,
                issued_at, expires_at,
                consumed_at, consumed_by_business_id, consumed_at_location_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&token.id)
        .bind(&token.user_id)
        .bind(&token.loyalty_account_id)
        .bind(&token.token)
        .bind(&token.purpose)
        .bind(&token.selected_rewards)
        .bind(token.issued_at)
        .bind(token.expires_at)
        .bind(token.consumed_at)
        .bind(&token.consumed_by_business_id)
        .bind(&token.consumed_at_location_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Looks a token up by its opaque string.
    pub async fn find_by_token(&self, token: &str) -> DbResult<Option<QrCodeToken>> {
        let row = sqlx::query_as::<_, QrCodeToken>(
            r#"
            SELECT
                id, user_id, loyalty_account_id, token, purpose, selected_rewards,
                issued_at, expires_at,
                consumed_at, consumed_by_business_id, consumed_at_location_id
            FROM qr_code_tokens
            WHERE token = ?1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Gets a token by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<QrCodeToken> {
        sqlx::query_as::<_, QrCodeToken>(
            r#"
            SELECT
                id, user_id, loyalty_account_id, token, purpose, selected_rewards,
                issued_at, expires_at,
                consumed_at, consumed_by_business_id, consumed_at_location_id
            FROM qr_code_tokens
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Token", id))
    }

    /// Marks a token consumed outside the claim transaction.
    ///
    /// Used when the claim committed nothing (session insert failed): the
    /// token must still never be resolvable again.
    ///
    /// ## Returns
    /// `true` if this call stamped it, `false` if it was already consumed.
    pub async fn burn(
        &self,
        id: &str,
        business_id: &str,
        location_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE qr_code_tokens SET
                consumed_at = ?2,
                consumed_by_business_id = ?3,
                consumed_at_location_id = ?4
            WHERE id = ?1 AND consumed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(business_id)
        .bind(location_id)
        .execute(&self.pool)
        .await?;

        let burned = result.rows_affected() == 1;
        if burned {
            warn!(token_id = %id, business_id = %business_id, "Token burned without a session");
        }
        Ok(burned)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
