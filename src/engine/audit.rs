//! Reconciliation audit: verify derived totals against their ledgers.
//!
//! The audit reports discrepancies and fixes nothing; a mismatch means a bug
//! or manual tampering and needs a human.

use crate::db::Repository;
use crate::domain::{Decimal, PositionId, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Audit of one position's accrued-profit cache against its distributions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionAudit {
    pub position_id: PositionId,
    pub accrued_profit: Decimal,
    pub distribution_sum: Decimal,
    pub consistent: bool,
}

/// Audit of one user's balance against the signed sum of their transactions,
/// plus per-position cache checks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub user_id: UserId,
    pub balance_total: Decimal,
    pub transaction_sum: Decimal,
    pub balanced: bool,
    pub positions: Vec<PositionAudit>,
}

pub struct Auditor {
    repo: Arc<Repository>,
}

impl Auditor {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Recompute and compare a user's conservation and cache invariants.
    pub async fn audit_user(&self, user: &UserId) -> Result<AuditReport, sqlx::Error> {
        let balance_total = self.repo.get_balance(user).await?;
        let transaction_sum = self.repo.sum_transactions(user).await?;
        let balanced = balance_total == transaction_sum;

        if !balanced {
            warn!(
                user_id = %user,
                balance = %balance_total,
                transaction_sum = %transaction_sum,
                "balance does not reconcile with transaction log"
            );
        }

        let mut positions = Vec::new();
        for position in self.repo.positions_for_user(user).await? {
            let distribution_sum = self.repo.sum_distributions(&position.id).await?;
            let consistent = distribution_sum == position.accrued_profit;

            if !consistent {
                warn!(
                    position_id = %position.id,
                    accrued = %position.accrued_profit,
                    distributed = %distribution_sum,
                    "accrued-profit cache does not match distribution ledger"
                );
            }

            positions.push(PositionAudit {
                position_id: position.id,
                accrued_profit: position.accrued_profit,
                distribution_sum,
                consistent,
            });
        }

        Ok(AuditReport {
            user_id: user.clone(),
            balance_total,
            transaction_sum,
            balanced,
            positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{Plan, PlanId, Position, PositionKind, TimeMs, Transaction, TxType};
    use std::str::FromStr;
    use tempfile::TempDir;

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

    fn plan() -> Plan {
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

    #[tokio::test]
    async fn test_audit_clean_ledger_balances() {
        let (repo, _temp) = setup().await;
        let user = UserId::new("u1".to_string());
        let plan = plan();
        repo.insert_plan(&plan).await.unwrap();

        let position = Position::open(
            user.clone(),
            &plan,
            Decimal::from_str("1000").unwrap(),
            TimeMs::new(0),
        );
        repo.insert_position(&position).await.unwrap();

        let deposit = Transaction::new(
            user.clone(),
            Decimal::from_str("1000").unwrap(),
            TxType::Deposit,
            "Deposit".to_string(),
            None,
            TimeMs::new(0),
        );
        repo.record_external_transaction(&deposit).await.unwrap();
        repo.distribute_period(&position, 1, Decimal::from_str("15").unwrap(), TimeMs::new(10))
            .await
            .unwrap();

        let report = Auditor::new(repo).audit_user(&user).await.unwrap();
        assert!(report.balanced);
        assert_eq!(report.balance_total, Decimal::from_str("1015").unwrap());
        assert_eq!(report.positions.len(), 1);
        assert!(report.positions[0].consistent);
    }

    #[tokio::test]
    async fn test_audit_detects_tampered_cache() {
        let (repo, _temp) = setup().await;
        let user = UserId::new("u1".to_string());
        let plan = plan();
        repo.insert_plan(&plan).await.unwrap();

        let position = Position::open(
            user.clone(),
            &plan,
            Decimal::from_str("1000").unwrap(),
            TimeMs::new(0),
        );
        repo.insert_position(&position).await.unwrap();
        repo.distribute_period(&position, 1, Decimal::from_str("15").unwrap(), TimeMs::new(10))
            .await
            .unwrap();

        // Tamper with the cache behind the ledger's back.
        sqlx::query("UPDATE positions SET accrued_profit = '999' WHERE id = ?")
            .bind(position.id.as_str())
            .execute(repo.pool())
            .await
            .unwrap();

        let report = Auditor::new(repo).audit_user(&user).await.unwrap();
        assert!(!report.positions[0].consistent);
        assert_eq!(
            report.positions[0].distribution_sum,
            Decimal::from_str("15").unwrap()
        );
    }

    #[tokio::test]
    async fn test_audit_detects_tampered_balance() {
        let (repo, _temp) = setup().await;
        let user = UserId::new("u1".to_string());

        let deposit = Transaction::new(
            user.clone(),
            Decimal::from_str("100").unwrap(),
            TxType::Deposit,
            "Deposit".to_string(),
            None,
            TimeMs::new(0),
        );
        repo.record_external_transaction(&deposit).await.unwrap();

        sqlx::query("UPDATE balances SET total = '150' WHERE user_id = ?")
            .bind(user.as_str())
            .execute(repo.pool())
            .await
            .unwrap();

        let report = Auditor::new(repo).audit_user(&user).await.unwrap();
        assert!(!report.balanced);
    }
}
