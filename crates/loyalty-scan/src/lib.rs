//! # loyalty-scan: Scan-Session Redemption Protocol
//!
//! A consumer shows a single-use QR code, a business scans it, sees the
//! consumer's balance and finalizes an accrual or a redemption. Each token
//! opens at most one session and each session writes the ledger at most
//! once.
//!
//! ## Protocol Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Consumer device                    Business device                    │
//! │  ───────────────                    ───────────────                    │
//! │  issue_token ──► QR code ──scan──► resolve_for_business                │
//! │                                          │  token CAS + pending session │
//! │                                          ▼                              │
//! │                                    present_for_business                 │
//! │                                          │  balance, selected rewards   │
//! │                                          ▼                              │
//! │                                    finalize                             │
//! │                                          │  stamp CAS + ledger rows     │
//! │                                          ▼                              │
//! │                                    Completed | Failed | Expired        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loyalty_scan::{IssueTokenRequest, ScanConfig, ScanService};
//! use loyalty_core::TokenPurpose;
//! use loyalty_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./loyalty.db")).await?;
//! let service = ScanService::new(db, ScanConfig::load_or_default(None));
//!
//! let issued = service
//!     .issue_token(IssueTokenRequest::new("user-1", TokenPurpose::Accrual))
//!     .await?;
//! let view = service.resolve_for_business(&issued.token, "cafe-42", None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod config;
pub mod error;
pub mod finalizer;
pub mod issuer;
pub mod presenter;
pub mod resolver;

// =============================================================================
// Re-exports
// =============================================================================

pub use collaborators::{Anonymous, AuthenticatedUser, CurrentUser, DbProgramLookup, ProgramLookup};
pub use config::ScanConfig;
pub use error::{ScanError, ScanFailure, ScanResult};
pub use finalizer::SessionFinalizer;
pub use issuer::{IssueTokenRequest, IssuedToken, TokenIssuer};
pub use presenter::SessionPresenter;
pub use resolver::TokenResolver;

pub use loyalty_core::ledger::{AccountReconciliation, Confirmation, Decision, FinalizeRequest};
pub use loyalty_core::view::{FinalizeOutcome, SessionView};

use std::sync::Arc;
use tracing::warn;

use loyalty_core::validation::validate_required;
use loyalty_core::{Clock, SystemClock};
use loyalty_db::{Database, DbError};

// =============================================================================
// Service Facade
// =============================================================================

/// Entry point for hosts: one value holding the store, clock, catalog and
/// configuration, handing out the four protocol components.
#[derive(Clone)]
pub struct ScanService {
    db: Database,
    clock: Arc<dyn Clock>,
    programs: Arc<dyn ProgramLookup>,
    config: ScanConfig,
}

impl ScanService {
    /// Wall clock, catalog from the same database.
    pub fn new(db: Database, config: ScanConfig) -> Self {
        let programs = Arc::new(DbProgramLookup::new(&db));
        ScanService {
            db,
            clock: Arc::new(SystemClock),
            programs,
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_program_lookup(mut self, programs: Arc<dyn ProgramLookup>) -> Self {
        self.programs = programs;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Components
    // =========================================================================

    pub fn issuer(&self) -> TokenIssuer {
        TokenIssuer::new(self.db.clone(), self.clock.clone(), &self.config)
    }

    pub fn resolver(&self) -> TokenResolver {
        TokenResolver::new(self.db.clone(), self.clock.clone(), &self.config)
    }

    pub fn presenter(&self) -> SessionPresenter {
        SessionPresenter::new(self.db.clone(), self.clock.clone(), self.programs.clone())
    }

    pub fn finalizer(&self) -> SessionFinalizer {
        SessionFinalizer::new(
            self.db.clone(),
            self.clock.clone(),
            self.programs.clone(),
            &self.config,
        )
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// See [`TokenIssuer::issue`].
    pub async fn issue_token(&self, request: IssueTokenRequest) -> ScanResult<IssuedToken> {
        self.issuer().issue(request).await
    }

    /// See [`TokenIssuer::issue_for_current_user`].
    pub async fn issue_for_current_user(
        &self,
        user: &dyn CurrentUser,
        request: IssueTokenRequest,
    ) -> ScanResult<IssuedToken> {
        self.issuer().issue_for_current_user(user, request).await
    }

    /// See [`TokenResolver::resolve_for_business`].
    pub async fn resolve_for_business(
        &self,
        token: &str,
        business_id: &str,
        location_id: Option<&str>,
    ) -> ScanResult<SessionView> {
        self.resolver()
            .resolve_for_business(token, business_id, location_id)
            .await
    }

    /// See [`SessionPresenter::present_for_business`].
    pub async fn present_for_business(
        &self,
        token: &str,
        business_id: &str,
    ) -> ScanResult<SessionView> {
        self.presenter().present_for_business(token, business_id).await
    }

    /// See [`SessionPresenter::present_session`].
    pub async fn present_session(
        &self,
        session_id: &str,
        business_id: &str,
    ) -> ScanResult<SessionView> {
        self.presenter().present_session(session_id, business_id).await
    }

    /// See [`SessionFinalizer::finalize`].
    pub async fn finalize(
        &self,
        session_id: &str,
        request: &FinalizeRequest,
    ) -> ScanResult<FinalizeOutcome> {
        self.finalizer().finalize(session_id, request).await
    }

    /// Recomputes an account's balance from its ledger.
    ///
    /// A drift is logged; the stored balance is never rewritten here.
    pub async fn reconcile_account(&self, account_id: &str) -> ScanResult<AccountReconciliation> {
        validate_required("account_id", account_id)?;

        let report = match self.db.ledger().reconcile(account_id).await {
            Ok(report) => report,
            Err(DbError::NotFound { .. }) => {
                return Err(ScanError::not_found("LoyaltyAccount", account_id))
            }
            Err(e) => return Err(e.into()),
        };

        if !report.is_consistent() {
            warn!(
                account_id = %account_id,
                points_balance = report.points_balance,
                ledger_sum = report.ledger_sum,
                drift = report.drift(),
                "Account balance does not match its ledger"
            );
        }
        Ok(report)
    }
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::{TimeZone, Utc};
    use loyalty_core::money::Spend;
    use loyalty_core::points::{AccrualConfig, CurrencyRate};
    use loyalty_core::{
        LoyaltyAccount, LoyaltyProgram, LoyaltyRewardTier, ManualClock, Money, RewardType,
        TokenPurpose,
    };
    use loyalty_db::DbConfig;
    use uuid::Uuid;

    pub const BUSINESS: &str = "biz-1";
    pub const OTHER_BUSINESS: &str = "biz-2";

    pub struct Harness {
        pub service: ScanService,
        pub db: Database,
        pub clock: Arc<ManualClock>,
        pub tiers: Vec<LoyaltyRewardTier>,
    }

    /// In-memory store, a frozen clock and a program for `BUSINESS`:
    /// USD at one point per unit, tiers Free Coffee (60), Pastry (30) and a
    /// staff-only Gift Card (40).
    pub async fn harness() -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let service = ScanService::new(db.clone(), ScanConfig::default()).with_clock(clock.clone());

        let program = LoyaltyProgram {
            id: Uuid::new_v4().to_string(),
            business_id: BUSINESS.to_string(),
            name: "Coffee Club".to_string(),
            accrual: AccrualConfig::RateTable {
                rates: vec![CurrencyRate {
                    currency: "USD".to_string(),
                    rate_bps: 10_000,
                    exponent: None,
                }],
            },
            is_active: true,
        };
        db.programs().insert_program(&program, clock.now()).await.unwrap();

        let mut tiers = Vec::new();
        for (name, points, self_service) in [
            ("Free Coffee", 60, true),
            ("Pastry", 30, true),
            ("Gift Card", 40, false),
        ] {
            let tier = LoyaltyRewardTier {
                id: Uuid::new_v4().to_string(),
                program_id: program.id.clone(),
                business_id: BUSINESS.to_string(),
                name: name.to_string(),
                description: None,
                points_required: points,
                reward_type: RewardType::FreeItem,
                reward_value: 0,
                allow_self_redemption: self_service,
                is_active: true,
            };
            db.programs().insert_tier(&tier).await.unwrap();
            tiers.push(tier);
        }

        Harness {
            service,
            db,
            clock,
            tiers,
        }
    }

    impl Harness {
        pub fn tier(&self, name: &str) -> LoyaltyRewardTier {
            self.tiers.iter().find(|t| t.name == name).cloned().unwrap()
        }

        pub async fn issue(&self, user_id: &str, purpose: TokenPurpose) -> IssuedToken {
            self.service
                .issue_token(IssueTokenRequest::new(user_id, purpose))
                .await
                .unwrap()
        }

        pub async fn resolve(&self, user_id: &str, purpose: TokenPurpose) -> SessionView {
            let issued = self.issue(user_id, purpose).await;
            self.service
                .resolve_for_business(&issued.token, BUSINESS, None)
                .await
                .unwrap()
        }

        /// Earns `points` through the protocol so the ledger backs the balance.
        pub async fn account_with_balance(&self, user_id: &str, points: i64) -> LoyaltyAccount {
            let account = self
                .db
                .accounts()
                .get_or_create(BUSINESS, user_id, self.clock.now())
                .await
                .unwrap();
            if points > 0 {
                let view = self.resolve(user_id, TokenPurpose::Accrual).await;
                let outcome = self
                    .service
                    .finalize(&view.session_id, &accrue(BUSINESS, points * 100))
                    .await
                    .unwrap();
                assert!(outcome.is_completed());
            }
            self.db.accounts().get_by_id(&account.id).await.unwrap().unwrap()
        }
    }

    /// Accrual of `cents` USD.
    pub fn accrue(business_id: &str, cents: i64) -> FinalizeRequest {
        FinalizeRequest {
            business_id: business_id.to_string(),
            decision: Decision::Accrue {
                spend: Spend::new(Money::from_minor(cents), "USD"),
                performed_by: None,
            },
        }
    }

    pub fn redeem_by_consumer(business_id: &str, tier_ids: &[&str]) -> FinalizeRequest {
        FinalizeRequest {
            business_id: business_id.to_string(),
            decision: Decision::Redeem {
                reward_tier_ids: tier_ids.iter().map(|s| s.to_string()).collect(),
                confirmed_by: Confirmation::Consumer,
            },
        }
    }
}
