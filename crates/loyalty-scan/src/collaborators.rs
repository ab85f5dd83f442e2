//! # Collaborators
//!
//! Seams to the parts of the platform the scan protocol only consumes: the
//! business's loyalty catalog and the signed-in consumer.
//!
//! ```text
//! ┌───────────────────┐      ┌──────────────────────┐
//! │  SessionFinalizer │─────►│  ProgramLookup       │──► DbProgramLookup
//! │  SessionPresenter │      │  (program, tiers)    │    (loyalty_programs,
//! └───────────────────┘      └──────────────────────┘     loyalty_reward_tiers)
//!
//! ┌───────────────────┐      ┌──────────────────────┐
//! │  TokenIssuer      │─────►│  CurrentUser         │──► AuthenticatedUser
//! └───────────────────┘      └──────────────────────┘
//! ```

use async_trait::async_trait;

use loyalty_core::{LoyaltyProgram, LoyaltyRewardTier};
use loyalty_db::{Database, ProgramRepository};

use crate::error::ScanResult;

// =============================================================================
// Program Lookup
// =============================================================================

/// Read access to a business's loyalty catalog.
#[async_trait]
pub trait ProgramLookup: Send + Sync {
    /// The business's active program, if it runs one.
    async fn active_program(&self, business_id: &str) -> ScanResult<Option<LoyaltyProgram>>;

    /// Active reward tiers, cheapest first.
    async fn active_tiers(&self, business_id: &str) -> ScanResult<Vec<LoyaltyRewardTier>>;

    /// A tier of this business by id, active or not.
    async fn find_tier(
        &self,
        business_id: &str,
        tier_id: &str,
    ) -> ScanResult<Option<LoyaltyRewardTier>>;
}

/// Catalog backed by the ledger database.
#[derive(Debug, Clone)]
pub struct DbProgramLookup {
    programs: ProgramRepository,
}

impl DbProgramLookup {
    pub fn new(db: &Database) -> Self {
        DbProgramLookup {
            programs: db.programs(),
        }
    }
}

#[async_trait]
impl ProgramLookup for DbProgramLookup {
    async fn active_program(&self, business_id: &str) -> ScanResult<Option<LoyaltyProgram>> {
        Ok(self.programs.active_program(business_id).await?)
    }

    async fn active_tiers(&self, business_id: &str) -> ScanResult<Vec<LoyaltyRewardTier>> {
        Ok(self.programs.active_tiers(business_id).await?)
    }

    async fn find_tier(
        &self,
        business_id: &str,
        tier_id: &str,
    ) -> ScanResult<Option<LoyaltyRewardTier>> {
        Ok(self.programs.find_tier(business_id, tier_id).await?)
    }
}

// =============================================================================
// Current User
// =============================================================================

/// The authenticated consumer on the issuing device.
pub trait CurrentUser: Send + Sync {
    /// `None` when nobody is signed in.
    fn user_id(&self) -> Option<&str>;
}

/// A user resolved by the host's authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl CurrentUser for AuthenticatedUser {
    fn user_id(&self) -> Option<&str> {
        Some(self.0.as_str())
    }
}

/// Nobody signed in.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CurrentUser for Anonymous {
    fn user_id(&self) -> Option<&str> {
        None
    }
}
