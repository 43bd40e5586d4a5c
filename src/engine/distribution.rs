//! Distribution engine: credit all missing periods for one position.

use crate::db::repo::PeriodCredit;
use crate::db::Repository;
use crate::domain::{Decimal, Plan, Position, TimeMs};
use crate::engine::{elapsed_periods, missing_periods, EngineError};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of distributing one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DistributionOutcome {
    /// Periods credited by this call.
    pub periods_distributed: u32,
    /// Periods found already recorded by a concurrent run.
    pub periods_skipped: u32,
    /// Total profit credited by this call.
    pub amount_distributed: Decimal,
    /// True when the store reported the position no longer active mid-run;
    /// remaining periods were abandoned.
    pub halted: bool,
}

/// Distributes profit for missing periods, oldest first, one atomic
/// transaction per period so a partial failure leaves a resumable prefix.
pub struct DistributionEngine {
    repo: Arc<Repository>,
}

impl DistributionEngine {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Validate the position/plan pair before any write. Integrity failures
    /// leave the position untouched for manual investigation.
    pub(crate) fn check_integrity<'a>(
        position: &Position,
        plan: Option<&'a Plan>,
    ) -> Result<&'a Plan, EngineError> {
        let plan = plan.ok_or_else(|| {
            EngineError::integrity(&position.id, format!("plan {} not found", position.plan_id))
        })?;

        if !plan.is_active {
            return Err(EngineError::integrity(
                &position.id,
                format!("plan {} is inactive", plan.id),
            ));
        }
        if plan.kind != position.kind {
            return Err(EngineError::integrity(
                &position.id,
                format!(
                    "plan kind {} does not match position kind {}",
                    plan.kind, position.kind
                ),
            ));
        }
        if !position.principal.is_positive() {
            return Err(EngineError::integrity(
                &position.id,
                format!("non-positive principal {}", position.principal),
            ));
        }

        Ok(plan)
    }

    /// Distribute all missing periods for one position up to `now`.
    ///
    /// Precondition: the position is active. Each period commits (insert
    /// record, credit balance, append transaction, bump accrual cache) or
    /// rolls back as a unit; a uniqueness collision is counted as skipped,
    /// never credited twice.
    pub async fn distribute_position(
        &self,
        position: &Position,
        plan: Option<&Plan>,
        now: TimeMs,
    ) -> Result<DistributionOutcome, EngineError> {
        let plan = Self::check_integrity(position, plan)?;

        if !position.is_active() {
            return Err(EngineError::integrity(
                &position.id,
                format!("position is {}, not active", position.status),
            ));
        }

        let elapsed = elapsed_periods(
            position.started_at_ms,
            position.kind,
            plan.duration_periods,
            now,
        );
        let recorded = self
            .repo
            .recorded_periods(&position.id)
            .await?
            .into_iter()
            .collect();
        let missing = missing_periods(elapsed, &recorded);

        let profit = plan.period_profit(position.principal);
        let mut outcome = DistributionOutcome::default();

        for period in missing {
            match self
                .repo
                .distribute_period(position, period, profit, now)
                .await?
            {
                PeriodCredit::Credited => {
                    outcome.periods_distributed += 1;
                    outcome.amount_distributed = outcome.amount_distributed + profit;
                }
                PeriodCredit::AlreadyRecorded => {
                    debug!(
                        position_id = %position.id,
                        period,
                        "period already distributed by a concurrent run"
                    );
                    outcome.periods_skipped += 1;
                }
                PeriodCredit::NotActive => {
                    // The snapshot went stale; a cancellation or completion
                    // landed after the fetch.
                    info!(
                        position_id = %position.id,
                        period,
                        "position left the active state mid-run; stopping distribution"
                    );
                    outcome.halted = true;
                    break;
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{PlanId, PositionKind, PositionStatus, UserId};
    use std::str::FromStr;
    use tempfile::TempDir;

    const DAY_MS: i64 = 86_400_000;

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

    fn daily_plan() -> Plan {
        Plan {
            id: PlanId::new("p1".to_string()),
            name: "Starter".to_string(),
            kind: PositionKind::DailyInvestment,
            min_principal: Decimal::from_str("100").unwrap(),
            max_principal: Decimal::from_str("10000").unwrap(),
            rate: Decimal::from_str("0.015").unwrap(),
            duration_periods: 30,
            is_active: true,
        }
    }

    async fn seed(repo: &Repository, plan: &Plan, principal: &str) -> Position {
        repo.insert_plan(plan).await.unwrap();
        let position = Position::open(
            UserId::new("u1".to_string()),
            plan,
            Decimal::from_str(principal).unwrap(),
            TimeMs::new(0),
        );
        repo.insert_position(&position).await.unwrap();
        position
    }

    #[tokio::test]
    async fn test_distributes_three_elapsed_days() {
        let (repo, _temp) = setup().await;
        let plan = daily_plan();
        let position = seed(&repo, &plan, "1000").await;
        let engine = DistributionEngine::new(repo.clone());

        let outcome = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(3 * DAY_MS))
            .await
            .unwrap();

        assert_eq!(outcome.periods_distributed, 3);
        assert_eq!(outcome.periods_skipped, 0);
        assert_eq!(
            outcome.amount_distributed,
            Decimal::from_str("45").unwrap()
        );
        assert_eq!(
            repo.recorded_periods(&position.id).await.unwrap(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_second_run_distributes_nothing() {
        let (repo, _temp) = setup().await;
        let plan = daily_plan();
        let position = seed(&repo, &plan, "1000").await;
        let engine = DistributionEngine::new(repo.clone());

        engine
            .distribute_position(&position, Some(&plan), TimeMs::new(3 * DAY_MS))
            .await
            .unwrap();
        let balance_after_first = repo.get_balance(&position.user_id).await.unwrap();

        let outcome = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(3 * DAY_MS))
            .await
            .unwrap();

        assert_eq!(outcome.periods_distributed, 0);
        assert!(outcome.amount_distributed.is_zero());
        assert_eq!(
            repo.get_balance(&position.user_id).await.unwrap(),
            balance_after_first
        );
    }

    #[tokio::test]
    async fn test_resumes_from_oldest_missing_period() {
        let (repo, _temp) = setup().await;
        let plan = daily_plan();
        let position = seed(&repo, &plan, "1000").await;
        let engine = DistributionEngine::new(repo.clone());

        // Period 2 already recorded, as if an earlier partial run stopped there.
        repo.distribute_period(&position, 2, Decimal::from_str("15").unwrap(), TimeMs::new(0))
            .await
            .unwrap();

        let outcome = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(3 * DAY_MS))
            .await
            .unwrap();

        assert_eq!(outcome.periods_distributed, 2);
        assert_eq!(
            repo.recorded_periods(&position.id).await.unwrap(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_missing_plan_is_integrity_error() {
        let (repo, _temp) = setup().await;
        let plan = daily_plan();
        let position = seed(&repo, &plan, "1000").await;
        let engine = DistributionEngine::new(repo.clone());

        let err = engine
            .distribute_position(&position, None, TimeMs::new(3 * DAY_MS))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Integrity { .. }));
        assert!(repo.recorded_periods(&position.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_plan_is_integrity_error() {
        let (repo, _temp) = setup().await;
        let mut plan = daily_plan();
        plan.is_active = false;
        let position = seed(&repo, &plan, "1000").await;
        let engine = DistributionEngine::new(repo.clone());

        let err = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(3 * DAY_MS))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_non_active_position_is_rejected() {
        let (repo, _temp) = setup().await;
        let plan = daily_plan();
        let mut position = seed(&repo, &plan, "1000").await;
        position.status = PositionStatus::Completed;
        let engine = DistributionEngine::new(repo.clone());

        let err = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(3 * DAY_MS))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_after_fetch_credits_nothing() {
        let (repo, _temp) = setup().await;
        let plan = daily_plan();
        let position = seed(&repo, &plan, "1000").await;
        let engine = DistributionEngine::new(repo.clone());

        // Admin cancellation lands after the batch fetched its snapshot;
        // the engine still holds the position with status active.
        repo.cancel_position(&position.id, TimeMs::new(DAY_MS)).await.unwrap();

        let outcome = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(3 * DAY_MS))
            .await
            .unwrap();

        assert_eq!(outcome.periods_distributed, 0);
        assert!(outcome.halted);
        assert!(outcome.amount_distributed.is_zero());
        assert!(repo.recorded_periods(&position.id).await.unwrap().is_empty());
        assert!(repo.get_balance(&position.user_id).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_clock_skew_distributes_nothing() {
        let (repo, _temp) = setup().await;
        let plan = daily_plan();
        repo.insert_plan(&plan).await.unwrap();
        let position = Position::open(
            UserId::new("u1".to_string()),
            &plan,
            Decimal::from_str("1000").unwrap(),
            TimeMs::new(10 * DAY_MS),
        );
        repo.insert_position(&position).await.unwrap();
        let engine = DistributionEngine::new(repo.clone());

        let outcome = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(DAY_MS))
            .await
            .unwrap();
        assert_eq!(outcome.periods_distributed, 0);
    }

    #[tokio::test]
    async fn test_elapsed_capped_at_duration() {
        let (repo, _temp) = setup().await;
        let mut plan = daily_plan();
        plan.duration_periods = 5;
        let position = seed(&repo, &plan, "1000").await;
        let engine = DistributionEngine::new(repo.clone());

        let outcome = engine
            .distribute_position(&position, Some(&plan), TimeMs::new(100 * DAY_MS))
            .await
            .unwrap();
        assert_eq!(outcome.periods_distributed, 5);
        assert_eq!(
            repo.recorded_periods(&position.id).await.unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }
}
