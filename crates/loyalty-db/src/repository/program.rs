//! # Program Repository
//!
//! Read access to a business's loyalty program and reward catalog. Catalog
//! administration is owned elsewhere; the insert methods exist for seeding
//! and tests.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use loyalty_core::points::AccrualConfig;
use loyalty_core::{LoyaltyProgram, LoyaltyRewardTier};

/// Program row with the accrual configuration still as JSON text.
#[derive(Debug, sqlx::FromRow)]
struct ProgramRow {
    id: String,
    business_id: String,
    name: String,
    accrual_config: String,
    is_active: bool,
}

impl TryFrom<ProgramRow> for LoyaltyProgram {
    type Error = DbError;

    fn try_from(row: ProgramRow) -> Result<Self, Self::Error> {
        let accrual = AccrualConfig::from_json(&row.accrual_config)
            .map_err(|e| DbError::InvalidData(format!("program {}: {e}", row.id)))?;

        Ok(LoyaltyProgram {
            id: row.id,
            business_id: row.business_id,
            name: row.name,
            accrual,
            is_active: row.is_active,
        })
    }
}

/// Repository for programs and reward tiers.
#[derive(Debug, Clone)]
pub struct ProgramRepository {
    pool: SqlitePool,
}

impl ProgramRepository {
    /// Creates a new ProgramRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProgramRepository { pool }
    }

    /// The business's active program, newest first if several exist.
    pub async fn active_program(&self, business_id: &str) -> DbResult<Option<LoyaltyProgram>> {
        let row = sqlx::query_as::<_, ProgramRow>(
            r#"
            SELECT id, business_id, name, accrual_config, is_active
            FROM loyalty_programs
            WHERE business_id = ?1 AND is_active = 1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LoyaltyProgram::try_from).transpose()
    }

    /// The business's active tiers, cheapest first.
    pub async fn active_tiers(&self, business_id: &str) -> DbResult<Vec<LoyaltyRewardTier>> {
        let tiers = sqlx::query_as::<_, LoyaltyRewardTier>(
            r#"
            SELECT
                id, program_id, business_id, name, description, points_required,
                reward_type, reward_value, allow_self_redemption, is_active
            FROM loyalty_reward_tiers
            WHERE business_id = ?1 AND is_active = 1
            ORDER BY points_required, name
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tiers)
    }

    /// A tier of the business by id, active or not.
    pub async fn find_tier(
        &self,
        business_id: &str,
        tier_id: &str,
    ) -> DbResult<Option<LoyaltyRewardTier>> {
        let tier = sqlx::query_as::<_, LoyaltyRewardTier>(
            r#"
            SELECT
                id, program_id, business_id, name, description, points_required,
                reward_type, reward_value, allow_self_redemption, is_active
            FROM loyalty_reward_tiers
            WHERE business_id = ?1 AND id = ?2
            "#,
        )
        .bind(business_id)
        .bind(tier_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tier)
    }

    pub async fn insert_program(&self, program: &LoyaltyProgram, now: DateTime<Utc>) -> DbResult<()> {
        debug!(program_id = %program.id, business_id = %program.business_id, "Inserting program");

        sqlx::query(
            r#"
            INSERT INTO loyalty_programs (id, business_id, name, accrual_config, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&program.id)
        .bind(&program.business_id)
        .bind(&program.name)
        .bind(program.accrual.to_json())
        .bind(program.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_tier(&self, tier: &LoyaltyRewardTier) -> DbResult<()> {
        debug!(tier_id = %tier.id, points_required = tier.points_required, "Inserting reward tier");

        sqlx::query(
            r#"
            INSERT INTO loyalty_reward_tiers (
                id, program_id, business_id, name, description, points_required,
                reward_type, reward_value, allow_self_redemption, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&tier.id)
        .bind(&tier.program_id)
        .bind(&tier.business_id)
        .bind(&tier.name)
        .bind(&tier.description)
        .bind(tier.points_required)
        .bind(tier.reward_type)
        .bind(tier.reward_value)
        .bind(tier.allow_self_redemption)
        .bind(tier.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
