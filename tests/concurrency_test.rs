//! Concurrent invocation: racing runs must converge to single-run ledger state.

use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;
use yieldcore::db::init_db;
use yieldcore::domain::{Decimal, Plan, PlanId, Position, PositionKind, TimeMs, UserId};
use yieldcore::engine::{CompletionHandler, DistributionEngine};
use yieldcore::Repository;

const HOUR_MS: i64 = 3_600_000;

async fn setup() -> (Arc<Repository>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    (Arc::new(Repository::new(pool)), temp_dir)
}

fn hourly_plan(duration: u32) -> Plan {
    Plan {
        id: PlanId::new("live".to_string()),
        name: "Live".to_string(),
        kind: PositionKind::HourlyLiveTrade,
        min_principal: Decimal::from_str("10").unwrap(),
        max_principal: Decimal::from_str("1000").unwrap(),
        rate: Decimal::from_str("0.002").unwrap(),
        duration_periods: duration,
        is_active: true,
    }
}

async fn seed(repo: &Repository, plan: &Plan, started_at: TimeMs) -> Position {
    repo.insert_plan(plan).await.unwrap();
    let position = Position::open(
        UserId::new("u1".to_string()),
        plan,
        Decimal::from_str("100").unwrap(),
        started_at,
    );
    repo.insert_position(&position).await.unwrap();
    position
}

#[tokio::test]
async fn test_concurrent_distribution_credits_once() {
    let (repo, _temp) = setup().await;
    let plan = hourly_plan(10);
    let position = seed(&repo, &plan, TimeMs::new(0)).await;
    let now = TimeMs::new(3 * HOUR_MS);

    let e1 = DistributionEngine::new(repo.clone());
    let e2 = DistributionEngine::new(repo.clone());

    let (a, b) = tokio::join!(
        e1.distribute_position(&position, Some(&plan), now),
        e2.distribute_position(&position, Some(&plan), now)
    );
    let a = a.unwrap();
    let b = b.unwrap();

    // Between the two runs every period was handled exactly once.
    assert_eq!(a.periods_distributed + b.periods_distributed, 3);
    assert_eq!(
        repo.recorded_periods(&position.id).await.unwrap(),
        vec![1, 2, 3]
    );
    assert_eq!(
        repo.get_balance(&position.user_id).await.unwrap(),
        Decimal::from_str("0.60").unwrap()
    );
    assert_eq!(
        repo.sum_transactions(&position.user_id).await.unwrap(),
        Decimal::from_str("0.60").unwrap()
    );

    let fetched = repo.get_position(&position.id).await.unwrap().unwrap();
    assert_eq!(fetched.accrued_profit, Decimal::from_str("0.60").unwrap());
}

#[tokio::test]
async fn test_concurrent_completion_returns_capital_once() {
    let (repo, _temp) = setup().await;
    let plan = hourly_plan(4);
    let position = seed(&repo, &plan, TimeMs::new(0)).await;
    let now = TimeMs::new(5 * HOUR_MS);

    let h1 = CompletionHandler::new(repo.clone());
    let h2 = CompletionHandler::new(repo.clone());

    let (a, b) = tokio::join!(
        h1.complete_if_due(&position, Some(&plan), now),
        h2.complete_if_due(&position, Some(&plan), now)
    );
    let a = a.unwrap();
    let b = b.unwrap();

    // Exactly one of the two racing attempts performed the transition.
    assert!(a.completed ^ b.completed);
    let returned = a.capital_returned + b.capital_returned;
    assert_eq!(returned, Decimal::from_str("100").unwrap());

    // 4 periods of 0.20 plus principal, credited once.
    assert_eq!(
        repo.get_balance(&position.user_id).await.unwrap(),
        Decimal::from_str("100.80").unwrap()
    );
}

#[tokio::test]
async fn test_two_positions_same_user_complete_simultaneously() {
    let (repo, _temp) = setup().await;
    let plan = hourly_plan(2);
    repo.insert_plan(&plan).await.unwrap();

    let user = UserId::new("u1".to_string());
    let p1 = Position::open(
        user.clone(),
        &plan,
        Decimal::from_str("100").unwrap(),
        TimeMs::new(0),
    );
    let p2 = Position::open(
        user.clone(),
        &plan,
        Decimal::from_str("50").unwrap(),
        TimeMs::new(0),
    );
    repo.insert_position(&p1).await.unwrap();
    repo.insert_position(&p2).await.unwrap();

    let now = TimeMs::new(3 * HOUR_MS);
    let h1 = CompletionHandler::new(repo.clone());
    let h2 = CompletionHandler::new(repo.clone());

    let (a, b) = tokio::join!(
        h1.complete_if_due(&p1, Some(&plan), now),
        h2.complete_if_due(&p2, Some(&plan), now)
    );
    assert!(a.unwrap().completed);
    assert!(b.unwrap().completed);

    // No lost update on the shared balance row:
    // 100 + 50 principal, plus 2*0.20 + 2*0.10 profit.
    assert_eq!(
        repo.get_balance(&user).await.unwrap(),
        Decimal::from_str("150.60").unwrap()
    );
    assert_eq!(
        repo.sum_transactions(&user).await.unwrap(),
        Decimal::from_str("150.60").unwrap()
    );
}
