//! Batch runner: drive distribution and completion across all open positions
//! of one kind.
//!
//! Safe to invoke repeatedly and concurrently; the cron trigger and a manual
//! admin trigger are expected to race. Idempotency lives in the ledger's
//! uniqueness constraints, not in any coordination between runs.

use crate::db::repo::PositionWithPlan;
use crate::db::Repository;
use crate::domain::{PositionKind, TimeMs};
use crate::engine::{CompletionHandler, DistributionEngine, EngineError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Aggregate counters for one batch run, for monitoring and the admin UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Positions that had at least one period distributed or were completed.
    pub processed: u32,
    /// Positions with nothing due this run.
    pub skipped: u32,
    /// Positions transitioned to completed this run.
    pub completed: u32,
    /// Positions whose processing failed; the batch continued past them.
    pub errors: u32,
}

struct PositionResult {
    periods_distributed: u32,
    completed: bool,
}

pub struct BatchRunner {
    repo: Arc<Repository>,
    engine: DistributionEngine,
    completion: CompletionHandler,
    position_timeout: Duration,
}

impl BatchRunner {
    pub fn new(repo: Arc<Repository>, position_timeout: Duration) -> Self {
        let engine = DistributionEngine::new(repo.clone());
        let completion = CompletionHandler::new(repo.clone());
        Self {
            repo,
            engine,
            completion,
            position_timeout,
        }
    }

    /// Run one batch over all active positions of `kind`.
    ///
    /// Each position is processed inside its own error boundary with a
    /// bounded time budget; one malformed or stuck position is counted and
    /// skipped, never aborting the batch. Only a failure of the initial
    /// position fetch propagates to the caller.
    pub async fn run_batch(&self, kind: PositionKind) -> Result<BatchReport, sqlx::Error> {
        let now = TimeMs::now();
        let batch = self.repo.fetch_active_positions(kind).await?;
        info!(kind = %kind, positions = batch.len(), "starting batch run");

        let mut report = BatchReport::default();

        for entry in &batch {
            let position_id = entry.position.id.clone();
            let result = match tokio::time::timeout(
                self.position_timeout,
                self.process_position(entry, now),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout {
                    position_id: position_id.clone(),
                }),
            };

            match result {
                Ok(outcome) => {
                    if outcome.completed {
                        report.completed += 1;
                        report.processed += 1;
                    } else if outcome.periods_distributed > 0 {
                        report.processed += 1;
                    } else {
                        report.skipped += 1;
                    }
                }
                Err(e) => {
                    error!(position_id = %position_id, error = %e, "position processing failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            kind = %kind,
            processed = report.processed,
            skipped = report.skipped,
            completed = report.completed,
            errors = report.errors,
            "batch run finished"
        );
        Ok(report)
    }

    async fn process_position(
        &self,
        entry: &PositionWithPlan,
        now: TimeMs,
    ) -> Result<PositionResult, EngineError> {
        let plan = entry.plan.as_ref();

        let distribution = self
            .engine
            .distribute_position(&entry.position, plan, now)
            .await?;
        let completion = self
            .completion
            .complete_if_due(&entry.position, plan, now)
            .await?;

        Ok(PositionResult {
            periods_distributed: distribution.periods_distributed,
            completed: completion.completed,
        })
    }
}
