//! End-to-end scan protocol scenarios against a file-backed SQLite store,
//! so concurrent callers really do hold separate connections.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;
use tokio::task::JoinSet;
use uuid::Uuid;

use loyalty_core::money::Spend;
use loyalty_core::points::{AccrualConfig, CurrencyRate};
use loyalty_core::rewards::SelectedReward;
use loyalty_core::{
    AccountStatus, Clock, LoyaltyAccount, LoyaltyProgram, LoyaltyRewardTier, ManualClock, Money,
    OutcomeCode, RewardType, SessionStatus, TokenPurpose, TransactionType,
};
use loyalty_db::{Database, DbConfig};
use loyalty_scan::{
    Confirmation, DbProgramLookup, Decision, FinalizeOutcome, FinalizeRequest, IssueTokenRequest,
    ProgramLookup, ScanConfig, ScanFailure, ScanResult, ScanService, SessionView,
};

const BUSINESS: &str = "cafe-42";

// =============================================================================
// Fixture
// =============================================================================

struct Fixture {
    service: ScanService,
    db: Database,
    clock: Arc<ManualClock>,
    tiers: Vec<LoyaltyRewardTier>,
    _dir: TempDir,
}

async fn fixture() -> Fixture {
    fixture_with(ScanConfig::default()).await
}

/// Program for `BUSINESS`: USD and EUR at one point per unit. Tiers: Free
/// Coffee (60), Pastry (30), Gift Card (40, staff only).
async fn fixture_with(config: ScanConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(
        DbConfig::new(dir.path().join("loyalty.db"))
            .max_connections(8)
            .min_connections(1),
    )
    .await
    .unwrap();

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
    ));
    let service = ScanService::new(db.clone(), config).with_clock(clock.clone());

    let program = LoyaltyProgram {
        id: Uuid::new_v4().to_string(),
        business_id: BUSINESS.to_string(),
        name: "Cafe Rewards".to_string(),
        accrual: AccrualConfig::RateTable {
            rates: ["USD", "EUR"]
                .into_iter()
                .map(|c| CurrencyRate {
                    currency: c.to_string(),
                    rate_bps: 10_000,
                    exponent: None,
                })
                .collect(),
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
            description: Some(format!("{} for a loyal customer", name)),
            points_required: points,
            reward_type: RewardType::FreeItem,
            reward_value: 0,
            allow_self_redemption: self_service,
            is_active: true,
        };
        db.programs().insert_tier(&tier).await.unwrap();
        tiers.push(tier);
    }

    Fixture {
        service,
        db,
        clock,
        tiers,
        _dir: dir,
    }
}

impl Fixture {
    fn tier_id(&self, name: &str) -> String {
        self.tiers.iter().find(|t| t.name == name).unwrap().id.clone()
    }

    async fn resolve(&self, user_id: &str, purpose: TokenPurpose) -> SessionView {
        let issued = self
            .service
            .issue_token(IssueTokenRequest::new(user_id, purpose))
            .await
            .unwrap();
        self.service
            .resolve_for_business(&issued.token, BUSINESS, None)
            .await
            .unwrap()
    }

    async fn accrue(&self, user_id: &str, cents: i64) -> FinalizeOutcome {
        let view = self.resolve(user_id, TokenPurpose::Accrual).await;
        self.service
            .finalize(&view.session_id, &accrual(cents))
            .await
            .unwrap()
    }

    async fn account(&self, user_id: &str) -> LoyaltyAccount {
        self.db
            .accounts()
            .find_by_business_user(BUSINESS, user_id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn ledger_len(&self, account_id: &str) -> usize {
        self.db
            .ledger()
            .transactions_for_account(account_id)
            .await
            .unwrap()
            .len()
    }
}

fn accrual(cents: i64) -> FinalizeRequest {
    FinalizeRequest {
        business_id: BUSINESS.to_string(),
        decision: Decision::Accrue {
            spend: Spend::new(Money::from_minor(cents), "USD"),
            performed_by: Some("cashier-1".to_string()),
        },
    }
}

fn redemption(tier_ids: Vec<String>, confirmed_by: Confirmation) -> FinalizeRequest {
    FinalizeRequest {
        business_id: BUSINESS.to_string(),
        decision: Decision::Redeem {
            reward_tier_ids: tier_ids,
            confirmed_by,
        },
    }
}

// =============================================================================
// Token Consumption
// =============================================================================

#[tokio::test]
async fn concurrent_resolves_have_exactly_one_winner() {
    let f = fixture().await;
    let issued = f
        .service
        .issue_token(IssueTokenRequest::new("user-1", TokenPurpose::Accrual))
        .await
        .unwrap();

    let mut set = JoinSet::new();
    for lane in 0..8 {
        let service = f.service.clone();
        let token = issued.token.clone();
        set.spawn(async move {
            let location = format!("till-{}", lane);
            service
                .resolve_for_business(&token, BUSINESS, Some(&location))
                .await
        });
    }

    let mut won = 0;
    let mut lost = 0;
    while let Some(joined) = set.join_next().await {
        match joined.unwrap() {
            Ok(_) => won += 1,
            Err(e) => {
                assert_eq!(e.outcome_code(), OutcomeCode::AlreadyConsumed, "{}", e);
                lost += 1;
            }
        }
    }

    assert_eq!(won, 1);
    assert_eq!(lost, 7);
    assert_eq!(
        f.db.sessions().count_for_token(&issued.token_id).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn expired_token_resolves_to_expired() {
    let f = fixture().await;
    let issued = f
        .service
        .issue_token(
            IssueTokenRequest::new("user-1", TokenPurpose::Accrual).with_ttl(Duration::seconds(30)),
        )
        .await
        .unwrap();
    f.clock.advance(Duration::seconds(31));

    let err = f
        .service
        .resolve_for_business(&issued.token, BUSINESS, None)
        .await
        .unwrap_err();
    assert_eq!(err.outcome_code(), OutcomeCode::Expired);
    assert_eq!(
        f.db.sessions().count_for_token(&issued.token_id).await.unwrap(),
        0
    );
}

// =============================================================================
// Accrual
// =============================================================================

#[tokio::test]
async fn accrual_floors_points() {
    let f = fixture().await;
    f.accrue("user-1", 10_000).await;
    let account = f.account("user-1").await;
    assert_eq!(account.points_balance, 100);

    let outcome = f.accrue("user-1", 1_249).await;
    match outcome {
        FinalizeOutcome::Completed {
            points_delta,
            points_balance,
            ..
        } => {
            assert_eq!(points_delta, 12);
            assert_eq!(points_balance, 112);
        }
        other => panic!("expected completion, got {:?}", other),
    }

    let after = f.account("user-1").await;
    assert_eq!(after.points_balance, 112);
    assert_eq!(after.lifetime_points, account.lifetime_points + 12);
    assert_eq!(after.last_accrual_at, Some(f.clock.now()));

    let rows = f.db.ledger().transactions_for_account(&after.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    let last = rows.last().unwrap();
    assert_eq!(last.transaction_type, TransactionType::Accrual);
    assert_eq!(last.points_delta, 12);
    assert_eq!(last.performed_by_user_id.as_deref(), Some("cashier-1"));
}

#[tokio::test]
async fn small_spend_still_completes_with_zero_points() {
    let f = fixture().await;
    let outcome = f.accrue("user-1", 99).await;
    assert!(outcome.is_completed());

    let account = f.account("user-1").await;
    assert_eq!(account.points_balance, 0);
    assert_eq!(f.ledger_len(&account.id).await, 1);
}

// =============================================================================
// Redemption
// =============================================================================

#[tokio::test]
async fn insufficient_balance_fails_without_ledger_rows() {
    let f = fixture().await;
    f.accrue("user-1", 5_000).await;
    let before = f.account("user-1").await;
    assert_eq!(before.points_balance, 50);

    let view = f.resolve("user-1", TokenPurpose::Redemption).await;
    let outcome = f
        .service
        .finalize(
            &view.session_id,
            &redemption(vec![f.tier_id("Free Coffee")], Confirmation::Consumer),
        )
        .await
        .unwrap();
    assert_eq!(outcome.code(), OutcomeCode::InsufficientBalance);

    let after = f.account("user-1").await;
    assert_eq!(after.points_balance, 50);
    assert_eq!(after.concurrency_stamp, before.concurrency_stamp);
    assert_eq!(f.ledger_len(&after.id).await, 1);

    let session = f.db.sessions().get_by_id(&view.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.outcome_code, Some(OutcomeCode::InsufficientBalance));
    assert!(session.failure_reason.is_some());
}

#[tokio::test]
async fn second_tier_failing_redeems_nothing() {
    let f = fixture().await;
    f.accrue("user-1", 7_000).await;

    let view = f.resolve("user-1", TokenPurpose::Redemption).await;
    let outcome = f
        .service
        .finalize(
            &view.session_id,
            &redemption(
                vec![f.tier_id("Pastry"), f.tier_id("Free Coffee")],
                Confirmation::Consumer,
            ),
        )
        .await
        .unwrap();
    assert_eq!(outcome.code(), OutcomeCode::InsufficientBalance);

    let account = f.account("user-1").await;
    assert_eq!(account.points_balance, 70);
    assert_eq!(f.ledger_len(&account.id).await, 1);
    assert!(f
        .db
        .ledger()
        .redemptions_for_account(&account.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn multi_tier_redemption_writes_paired_rows() {
    let f = fixture().await;
    f.accrue("user-1", 10_000).await;

    let view = f.resolve("user-1", TokenPurpose::Redemption).await;
    let outcome = f
        .service
        .finalize(
            &view.session_id,
            &redemption(
                vec![f.tier_id("Pastry"), f.tier_id("Free Coffee")],
                Confirmation::Consumer,
            ),
        )
        .await
        .unwrap();

    let transaction_id = match &outcome {
        FinalizeOutcome::Completed {
            points_delta,
            points_balance,
            transaction_id,
            ..
        } => {
            assert_eq!(*points_delta, -90);
            assert_eq!(*points_balance, 10);
            transaction_id.clone()
        }
        other => panic!("expected completion, got {:?}", other),
    };

    let rows = f.db.ledger().transactions_for_session(&view.session_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.last().unwrap().id, transaction_id);

    let redemptions = f
        .db
        .ledger()
        .redemptions_for_account(&view.account_id)
        .await
        .unwrap();
    assert_eq!(redemptions.len(), 2);
    for row in &rows {
        assert_eq!(row.transaction_type, TransactionType::Redemption);
        let redemption = redemptions
            .iter()
            .find(|r| Some(&r.id) == row.reward_redemption_id.as_ref())
            .unwrap();
        assert_eq!(row.points_delta, -redemption.points_spent);

        let metadata: serde_json::Value = serde_json::from_str(&redemption.metadata).unwrap();
        assert_eq!(metadata["sessionId"], view.session_id.as_str());
    }
}

#[tokio::test]
async fn empty_decision_redeems_preselected_rewards() {
    let f = fixture().await;
    f.accrue("user-1", 10_000).await;

    let issued = f
        .service
        .issue_token(
            IssueTokenRequest::new("user-1", TokenPurpose::Redemption)
                .with_selected_rewards(vec![SelectedReward::new(f.tier_id("Pastry"))]),
        )
        .await
        .unwrap();
    let view = f
        .service
        .resolve_for_business(&issued.token, BUSINESS, None)
        .await
        .unwrap();
    assert_eq!(view.selected_rewards.len(), 1);

    let presented = f
        .service
        .present_for_business(&issued.token, BUSINESS)
        .await
        .unwrap();
    assert_eq!(presented.selected_rewards[0].name.as_deref(), Some("Pastry"));

    let outcome = f
        .service
        .finalize(&view.session_id, &redemption(vec![], Confirmation::Consumer))
        .await
        .unwrap();
    assert!(outcome.is_completed());
    assert_eq!(f.account("user-1").await.points_balance, 70);
}

#[tokio::test]
async fn staff_can_redeem_staff_only_tier() {
    let f = fixture().await;
    f.accrue("user-1", 10_000).await;

    let by_consumer = f.resolve("user-1", TokenPurpose::Redemption).await;
    let outcome = f
        .service
        .finalize(
            &by_consumer.session_id,
            &redemption(vec![f.tier_id("Gift Card")], Confirmation::Consumer),
        )
        .await
        .unwrap();
    assert_eq!(outcome.code(), OutcomeCode::Forbidden);

    let by_staff = f.resolve("user-1", TokenPurpose::Redemption).await;
    let outcome = f
        .service
        .finalize(
            &by_staff.session_id,
            &redemption(
                vec![f.tier_id("Gift Card")],
                Confirmation::Staff {
                    user_id: "manager-3".to_string(),
                },
            ),
        )
        .await
        .unwrap();
    assert!(outcome.is_completed());

    let rows = f
        .db
        .ledger()
        .transactions_for_session(&by_staff.session_id)
        .await
        .unwrap();
    assert_eq!(rows[0].performed_by_user_id.as_deref(), Some("manager-3"));
}

// =============================================================================
// Session Lifecycle
// =============================================================================

#[tokio::test]
async fn second_finalize_is_invalid_state() {
    let f = fixture().await;
    let view = f.resolve("user-1", TokenPurpose::Accrual).await;

    let first = f.service.finalize(&view.session_id, &accrual(1_000)).await.unwrap();
    assert!(first.is_completed());

    let err = f
        .service
        .finalize(&view.session_id, &accrual(1_000))
        .await
        .unwrap_err();
    assert_eq!(err.outcome_code(), OutcomeCode::InvalidState);

    let account = f.account("user-1").await;
    assert_eq!(account.points_balance, 10);
    assert_eq!(f.ledger_len(&account.id).await, 1);
}

#[tokio::test]
async fn session_expiry_wins_over_late_decision() {
    let f = fixture().await;
    let view = f.resolve("user-1", TokenPurpose::Accrual).await;
    f.clock.advance(Duration::minutes(3));

    let outcome = f.service.finalize(&view.session_id, &accrual(5_000)).await.unwrap();
    assert!(matches!(outcome, FinalizeOutcome::Expired { .. }));
    assert_eq!(f.account("user-1").await.points_balance, 0);

    let err = f
        .service
        .finalize(&view.session_id, &accrual(5_000))
        .await
        .unwrap_err();
    assert_eq!(err.outcome_code(), OutcomeCode::InvalidState);
}

#[tokio::test]
async fn suspended_account_fails_pending_session() {
    let f = fixture().await;
    let view = f.resolve("user-1", TokenPurpose::Accrual).await;
    f.db.accounts()
        .set_status(&view.account_id, AccountStatus::Suspended, f.clock.now())
        .await
        .unwrap();

    let outcome = f.service.finalize(&view.session_id, &accrual(1_000)).await.unwrap();
    assert_eq!(outcome.code(), OutcomeCode::AccountInactive);
}

#[tokio::test]
async fn other_business_cannot_see_or_finalize() {
    let f = fixture().await;
    let view = f.resolve("user-1", TokenPurpose::Accrual).await;

    let err = f
        .service
        .present_session(&view.session_id, "rival-7")
        .await
        .unwrap_err();
    assert_eq!(err.outcome_code(), OutcomeCode::Forbidden);

    let mut request = accrual(1_000);
    request.business_id = "rival-7".to_string();
    let err = f.service.finalize(&view.session_id, &request).await.unwrap_err();

    let failure = ScanFailure::from(err);
    assert_eq!(failure.code, OutcomeCode::Forbidden);

    let session = f.db.sessions().get_by_id(&view.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
}

// =============================================================================
// Balance Concurrency
// =============================================================================

#[tokio::test]
async fn concurrent_finalizes_keep_balance_equal_to_ledger() {
    let mut config = ScanConfig::default();
    config.finalize.max_stamp_retries = 10;
    let f = fixture_with(config).await;
    f.accrue("user-1", 10_000).await;

    let mut requests = Vec::new();
    for _ in 0..3 {
        let view = f.resolve("user-1", TokenPurpose::Accrual).await;
        requests.push((view.session_id, accrual(2_000)));
        let view = f.resolve("user-1", TokenPurpose::Redemption).await;
        requests.push((
            view.session_id,
            redemption(vec![f.tier_id("Pastry")], Confirmation::Consumer),
        ));
    }

    let mut set = JoinSet::new();
    for (session_id, request) in requests {
        let service = f.service.clone();
        set.spawn(async move { service.finalize(&session_id, &request).await });
    }

    let mut expected = 100;
    while let Some(joined) = set.join_next().await {
        let outcome = joined.unwrap().unwrap();
        if let FinalizeOutcome::Completed { points_delta, .. } = outcome {
            expected += points_delta;
        }
    }

    let account = f.account("user-1").await;
    assert_eq!(account.points_balance, expected);
    assert!(account.points_balance >= 0);

    let report = f.service.reconcile_account(&account.id).await.unwrap();
    assert!(report.is_consistent(), "{:?}", report);
    assert_eq!(report.points_balance, report.accrued - report.redeemed);
}

/// Catalog that touches the account every time it is consulted, so the
/// stamp read at the start of each finalize cycle is always stale.
struct ChurningLookup {
    inner: DbProgramLookup,
    db: Database,
    account_id: String,
    clock: Arc<ManualClock>,
}

#[async_trait]
impl ProgramLookup for ChurningLookup {
    async fn active_program(&self, business_id: &str) -> ScanResult<Option<LoyaltyProgram>> {
        self.db
            .accounts()
            .set_status(&self.account_id, AccountStatus::Active, self.clock.now())
            .await?;
        self.inner.active_program(business_id).await
    }

    async fn active_tiers(&self, business_id: &str) -> ScanResult<Vec<LoyaltyRewardTier>> {
        self.inner.active_tiers(business_id).await
    }

    async fn find_tier(
        &self,
        business_id: &str,
        tier_id: &str,
    ) -> ScanResult<Option<LoyaltyRewardTier>> {
        self.inner.find_tier(business_id, tier_id).await
    }
}

#[tokio::test]
async fn stamp_race_exhaustion_fails_with_conflict() {
    let f = fixture().await;
    let view = f.resolve("user-1", TokenPurpose::Accrual).await;

    let churning = f.service.clone().with_program_lookup(Arc::new(ChurningLookup {
        inner: DbProgramLookup::new(&f.db),
        db: f.db.clone(),
        account_id: view.account_id.clone(),
        clock: f.clock.clone(),
    }));

    let outcome = churning.finalize(&view.session_id, &accrual(1_000)).await.unwrap();
    assert_eq!(outcome.code(), OutcomeCode::Conflict);

    let account = f.account("user-1").await;
    assert_eq!(account.points_balance, 0);
    assert_eq!(f.ledger_len(&account.id).await, 0);

    let session = f.db.sessions().get_by_id(&view.session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.outcome_code, Some(OutcomeCode::Conflict));
}
