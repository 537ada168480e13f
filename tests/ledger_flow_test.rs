use binarynet::db::{init_db, CommissionFilter, Repository};
use binarynet::domain::{CommissionStatus, Decimal, Leg, Position, TimeMs, UserId, MS_PER_DAY};
use binarynet::engine::{evaluate_member, MatchDecision, ReactivationPolicy, SettlementRules};
use binarynet::orchestration::{place_member, MemberOutcome, PvPropagator, SettlementRunner};
use chrono::{FixedOffset, TimeZone, Utc};
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

struct Ledger {
    repo: Arc<Repository>,
    propagator: PvPropagator,
    _temp: TempDir,
}

async fn setup() -> Ledger {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let propagator = PvPropagator::new(repo.clone(), 10_000);

    Ledger {
        repo,
        propagator,
        _temp: temp_dir,
    }
}

fn runner(ledger: &Ledger, reactivation: ReactivationPolicy) -> SettlementRunner {
    SettlementRunner::new(
        ledger.repo.clone(),
        SettlementRules {
            inactivity_days: 90,
            reactivation,
        },
        FixedOffset::east_opt(0).unwrap(),
    )
}

fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn uid(s: &str) -> UserId {
    UserId::new(s)
}

/// Monday 2026-10-12 09:00 UTC, start of ISO week 2026-W42.
fn monday() -> TimeMs {
    TimeMs::from(Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap())
}

fn days_after(start: TimeMs, days: i64) -> TimeMs {
    TimeMs::new(start.as_ms() + days * MS_PER_DAY)
}

async fn place(ledger: &Ledger, user: &str, sponsor: Option<&str>, position: Position) {
    place_member(&ledger.repo, &uid(user), Some((sponsor.map(uid), position)))
        .await
        .unwrap();
}

async fn credit(ledger: &Ledger, event: &str, user: &str, leg: Leg, pv: &str, at: TimeMs) {
    ledger
        .propagator
        .credit_pv_at(event, &uid(user), leg, d(pv), at)
        .await
        .unwrap();
}

/// Root "a" with left child "b" and right children "c", "d"; one purchase
/// each (b on left, c and d on right) activates "a" with 94.5 / 189 PV.
async fn activated_root(ledger: &Ledger, at: TimeMs) {
    place(ledger, "a", None, Position::Main).await;
    place(ledger, "b", Some("a"), Position::Left).await;
    place(ledger, "c", Some("a"), Position::Right).await;
    place(ledger, "d", Some("a"), Position::Right).await;
    ledger.repo.set_active_affiliates(&uid("a"), 3).await.unwrap();

    credit(ledger, "evt-b", "b", Leg::Left, "94.5", at).await;
    credit(ledger, "evt-c", "c", Leg::Right, "94.5", at).await;
    credit(ledger, "evt-d", "d", Leg::Right, "94.5", at).await;
}

#[tokio::test]
async fn test_propagation_reaches_root_on_single_leg() {
    let ledger = setup().await;
    place(&ledger, "a", None, Position::Main).await;
    place(&ledger, "b", Some("a"), Position::Left).await;
    place(&ledger, "c", Some("b"), Position::Left).await;

    let outcome = ledger
        .propagator
        .credit_pv("evt-1", &uid("c"), Leg::Left, d("94.5"))
        .await
        .unwrap();
    assert_eq!(outcome.ancestors_credited, 2);
    assert!(outcome.halt.is_none());

    for id in ["a", "b", "c"] {
        let m = ledger.repo.get_member(&uid(id)).await.unwrap().unwrap();
        assert_eq!(m.left_leg_pv, d("94.5"), "{} left pv", id);
        assert!(m.right_leg_pv.is_zero(), "{} right pv", id);
        assert_eq!((m.left_leg_count, m.right_leg_count), (1, 0));
        assert!(!m.binary_activated);
    }
}

#[tokio::test]
async fn test_origin_leg_label_is_forwarded_unchanged() {
    let ledger = setup().await;
    place(&ledger, "a", None, Position::Main).await;
    place(&ledger, "b", Some("a"), Position::Left).await;
    place(&ledger, "c", Some("b"), Position::Right).await;

    // c sits on b's right, b on a's left: both still see the "right" label.
    credit(&ledger, "evt-1", "c", Leg::Right, "94.5", monday()).await;

    for id in ["a", "b", "c"] {
        let m = ledger.repo.get_member(&uid(id)).await.unwrap().unwrap();
        assert_eq!(m.right_leg_pv, d("94.5"), "{} right pv", id);
        assert!(m.left_leg_pv.is_zero());
    }
}

#[tokio::test]
async fn test_end_to_end_single_leg_chain_matches_nothing() {
    let ledger = setup().await;
    place(&ledger, "a", None, Position::Main).await;
    place(&ledger, "b", Some("a"), Position::Left).await;
    place(&ledger, "c", Some("b"), Position::Right).await;

    let outcome = ledger
        .propagator
        .credit_pv_at("evt-c", &uid("c"), Leg::Right, d("94.5"), monday())
        .await
        .unwrap();
    assert_eq!(outcome.right_leg_pv, d("94.5"));
    assert!(!outcome.activated);

    let report = runner(&ledger, ReactivationPolicy::Keep)
        .run_settlement(days_after(monday(), 4), None)
        .await
        .unwrap();
    assert_eq!(report.members_processed, 0);
    assert!(report.total_income.is_zero());

    let rules = SettlementRules::default();
    for id in ["a", "b", "c"] {
        let m = ledger.repo.get_member(&uid(id)).await.unwrap().unwrap();
        assert_eq!(m.right_leg_pv, d("94.5"));
        assert!(!m.binary_activated);
        match evaluate_member(&m, days_after(monday(), 4), &rules).unwrap() {
            MatchDecision::NoMatch { total_left, .. } => assert!(total_left.is_zero()),
            other => panic!("{} expected no match, got {:?}", id, other),
        }
    }
}

#[tokio::test]
async fn test_activation_then_weekly_match_pays_bonus() {
    let ledger = setup().await;
    activated_root(&ledger, monday()).await;

    let a = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();
    assert!(a.binary_activated);
    assert_eq!((a.left_leg_count, a.right_leg_count), (1, 2));
    assert_eq!(a.right_leg_pv, d("189"));

    let friday = days_after(monday(), 4);
    let report = runner(&ledger, ReactivationPolicy::Keep)
        .run_settlement(friday, None)
        .await
        .unwrap();
    assert_eq!(report.period_key, "2026-W42");
    assert_eq!(report.members_processed, 1);
    assert_eq!(report.total_income, d("9.45"));

    match report.outcome_for(&uid("a")) {
        Some(MemberOutcome::Matched {
            matched_volume,
            rank_name,
            income,
            carry_forward_left,
            carry_forward_right,
            ..
        }) => {
            assert_eq!(*matched_volume, d("94.5"));
            assert_eq!(rank_name, "IGNITOR");
            assert_eq!(*income, d("9.45"));
            assert!(carry_forward_left.is_zero());
            assert_eq!(*carry_forward_right, d("94.5"));
        }
        other => panic!("expected match, got {:?}", other),
    }

    let a = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();
    assert!(a.left_leg_pv.is_zero());
    assert!(a.right_leg_pv.is_zero());
    assert_eq!(a.carry_forward_right_pv, d("94.5"));
    assert_eq!(a.total_matched_pv, d("94.5"));
    assert_eq!(a.total_binary_income, d("9.45"));
    assert_eq!(a.weekly_binary_income, d("9.45"));
    assert_eq!(a.total_earnings, d("9.45"));
    assert_eq!(a.last_binary_match_date, Some(friday));

    let entries = ledger
        .repo
        .query_commissions(&CommissionFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, uid("a"));
    assert_eq!(entries[0].net_amount, d("9.45"));
    assert_eq!(entries[0].status, CommissionStatus::Pending);
    assert_eq!(entries[0].period.week_key, "2026-W42");
}

#[tokio::test]
async fn test_rerun_in_same_week_does_not_pay_twice() {
    let ledger = setup().await;
    activated_root(&ledger, monday()).await;
    let settle = runner(&ledger, ReactivationPolicy::Keep);

    settle
        .run_settlement(days_after(monday(), 4), None)
        .await
        .unwrap();

    // New left volume arrives after the run, in the same week.
    place(&ledger, "e", Some("a"), Position::Left).await;
    credit(&ledger, "evt-e", "e", Leg::Left, "94.5", days_after(monday(), 5)).await;

    let rerun = settle
        .run_settlement(days_after(monday(), 6), None)
        .await
        .unwrap();
    assert_eq!(rerun.outcome_for(&uid("a")), Some(&MemberOutcome::AlreadySettled));
    assert!(rerun.total_income.is_zero());

    let a = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();
    assert_eq!(a.left_leg_pv, d("94.5"), "unsettled volume is kept");
    assert_eq!(a.total_binary_income, d("9.45"));
    let entries = ledger
        .repo
        .query_commissions(&CommissionFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);

    // Next week the pending volume matches against the carry-forward.
    let next_week = settle
        .run_settlement(days_after(monday(), 11), None)
        .await
        .unwrap();
    assert_eq!(next_week.period_key, "2026-W43");
    assert!(matches!(
        next_week.outcome_for(&uid("a")),
        Some(MemberOutcome::Matched { .. })
    ));
    let a = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();
    assert_eq!(a.total_binary_income, d("18.9"));
    assert!(a.carry_forward_left_pv.is_zero());
    assert!(a.carry_forward_right_pv.is_zero());

    let runs = ledger.repo.list_settlement_runs(10).await.unwrap();
    assert_eq!(runs.len(), 3);
}

#[tokio::test]
async fn test_no_match_is_idempotent() {
    let ledger = setup().await;
    activated_root(&ledger, monday()).await;
    let settle = runner(&ledger, ReactivationPolicy::Keep);
    settle
        .run_settlement(days_after(monday(), 4), None)
        .await
        .unwrap();
    let before = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();

    // Only right carry-forward remains: nothing to match on the left.
    for day in [11, 18] {
        let report = settle
            .run_settlement(days_after(monday(), day), None)
            .await
            .unwrap();
        assert!(matches!(
            report.outcome_for(&uid("a")),
            Some(MemberOutcome::NoMatch { .. })
        ));
    }

    let after = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();
    assert_eq!(after.carry_forward_right_pv, before.carry_forward_right_pv);
    assert_eq!(after.left_leg_pv, before.left_leg_pv);
    assert_eq!(after.total_binary_income, before.total_binary_income);
    assert_eq!(after.last_binary_match_date, before.last_binary_match_date);
    assert_eq!(
        ledger
            .repo
            .query_commissions(&CommissionFilter::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_inactivity_reset_after_91_days() {
    let ledger = setup().await;
    activated_root(&ledger, monday()).await;

    let later = days_after(monday(), 91);
    let report = runner(&ledger, ReactivationPolicy::Keep)
        .run_settlement(later, None)
        .await
        .unwrap();
    assert_eq!(
        report.outcome_for(&uid("a")),
        Some(&MemberOutcome::Reset { days_inactive: 91 })
    );
    assert!(report.total_income.is_zero());

    let a = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();
    assert!(a.left_leg_pv.is_zero());
    assert!(a.right_leg_pv.is_zero());
    assert!(a.carry_forward_left_pv.is_zero());
    assert!(a.carry_forward_right_pv.is_zero());
    assert_eq!(a.inactivity_reset_date, Some(later));
    assert!(a.binary_activated, "keep policy leaves activation alone");
    assert!(ledger
        .repo
        .query_commissions(&CommissionFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_requalify_policy_clears_activation_on_reset() {
    let ledger = setup().await;
    activated_root(&ledger, monday()).await;

    runner(&ledger, ReactivationPolicy::Requalify)
        .run_settlement(days_after(monday(), 91), None)
        .await
        .unwrap();

    let a = ledger.repo.get_member(&uid("a")).await.unwrap().unwrap();
    assert!(!a.binary_activated);
    assert_eq!(a.binary_activation_date, None);
    assert_eq!((a.left_leg_count, a.right_leg_count), (0, 0));

    // Dropped from the batch until the 1:2 rule is met again.
    let report = runner(&ledger, ReactivationPolicy::Requalify)
        .run_settlement(days_after(monday(), 98), None)
        .await
        .unwrap();
    assert_eq!(report.members_processed, 0);
}

#[tokio::test]
async fn test_unreadable_member_does_not_block_batch() {
    let ledger = setup().await;
    activated_root(&ledger, monday()).await;

    place(&ledger, "z", None, Position::Main).await;
    place(&ledger, "y", Some("z"), Position::Left).await;
    place(&ledger, "x", Some("z"), Position::Right).await;
    place(&ledger, "w", Some("z"), Position::Right).await;
    credit(&ledger, "evt-y", "y", Leg::Left, "94.5", monday()).await;
    credit(&ledger, "evt-x", "x", Leg::Right, "94.5", monday()).await;
    credit(&ledger, "evt-w", "w", Leg::Right, "94.5", monday()).await;

    sqlx::query("UPDATE members SET left_leg_pv = 'garbage' WHERE user_id = 'a'")
        .execute(ledger.repo.pool())
        .await
        .unwrap();

    let report = runner(&ledger, ReactivationPolicy::Keep)
        .run_settlement(days_after(monday(), 4), None)
        .await
        .unwrap();
    assert_eq!(report.members_processed, 2);
    assert!(matches!(
        report.outcome_for(&uid("a")),
        Some(MemberOutcome::Error { .. })
    ));
    assert!(matches!(
        report.outcome_for(&uid("z")),
        Some(MemberOutcome::Matched { .. })
    ));
    assert_eq!(report.error_count(), 1);

    let runs = ledger.repo.list_settlement_runs(5).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].error_count, 1);
    assert_eq!(runs[0].matched_count, 1);

    let entries = ledger
        .repo
        .query_commissions(&CommissionFilter::default())
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, uid("z"));
}

#[tokio::test]
async fn test_concurrent_purchases_do_not_lose_updates() {
    let ledger = setup().await;
    place(&ledger, "a", None, Position::Main).await;
    place(&ledger, "b", Some("a"), Position::Left).await;
    place(&ledger, "c", Some("b"), Position::Left).await;

    let propagator = Arc::new(ledger.propagator.clone());
    let mut handles = Vec::new();
    for i in 0..10 {
        let propagator = propagator.clone();
        handles.push(tokio::spawn(async move {
            propagator
                .credit_pv(&format!("evt-{}", i), &uid("c"), Leg::Left, d("94.5"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for id in ["a", "b", "c"] {
        let m = ledger.repo.get_member(&uid(id)).await.unwrap().unwrap();
        assert_eq!(m.left_leg_pv, d("945"), "{} left pv", id);
        assert_eq!(m.left_leg_count, 10);
    }
}
