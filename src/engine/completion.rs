//! Completion handler: close a position once its full duration has been paid.

use crate::db::Repository;
use crate::domain::{Decimal, Plan, Position, TimeMs};
use crate::engine::{elapsed_periods, DistributionEngine, EngineError};
use std::sync::Arc;
use tracing::info;

/// Result of a completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionOutcome {
    /// True when this call performed the active -> completed transition.
    pub completed: bool,
    /// Principal credited back by this call; zero when nothing was returned.
    pub capital_returned: Decimal,
}

impl CompletionOutcome {
    fn not_due() -> Self {
        CompletionOutcome {
            completed: false,
            capital_returned: Decimal::zero(),
        }
    }
}

/// Transitions positions past their duration to completed, after the
/// distribution engine has confirmed every period is recorded. There is no
/// final-period special case: completion strictly follows full distribution.
pub struct CompletionHandler {
    repo: Arc<Repository>,
    engine: DistributionEngine,
}

impl CompletionHandler {
    pub fn new(repo: Arc<Repository>) -> Self {
        let engine = DistributionEngine::new(repo.clone());
        Self { repo, engine }
    }

    /// Complete the position if its duration has elapsed.
    ///
    /// Flushes any missing periods first; if some period still fails to
    /// distribute, the position stays active and an error is surfaced rather
    /// than returning capital before all profit obligations are met.
    pub async fn complete_if_due(
        &self,
        position: &Position,
        plan: Option<&Plan>,
        now: TimeMs,
    ) -> Result<CompletionOutcome, EngineError> {
        let plan = DistributionEngine::check_integrity(position, plan)?;

        if !position.is_active() {
            return Ok(CompletionOutcome::not_due());
        }

        let elapsed = elapsed_periods(
            position.started_at_ms,
            position.kind,
            plan.duration_periods,
            now,
        );
        if elapsed < plan.duration_periods {
            return Ok(CompletionOutcome::not_due());
        }

        // Flush remaining periods so the position never completes with
        // unpaid accrued profit.
        let flush = self
            .engine
            .distribute_position(position, Some(plan), now)
            .await?;
        if flush.halted {
            // The stored row left the active state after our snapshot; the
            // status guard in the store would refuse the transition anyway.
            return Ok(CompletionOutcome::not_due());
        }

        let recorded = self.repo.recorded_periods(&position.id).await?;
        if recorded.len() < plan.duration_periods as usize {
            return Err(EngineError::IncompleteDistribution {
                position_id: position.id.clone(),
            });
        }

        let row = self.repo.complete_position(position, now).await?;
        if row.transitioned {
            info!(
                position_id = %position.id,
                user_id = %position.user_id,
                principal = %position.principal,
                "position completed, capital returned"
            );
        }

        Ok(CompletionOutcome {
            completed: row.transitioned,
            capital_returned: if row.capital_returned {
                position.principal
            } else {
                Decimal::zero()
            },
        })
    }
}
