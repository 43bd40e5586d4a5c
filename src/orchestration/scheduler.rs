//! Interval scheduler: the cron half of the dual-trigger pattern.
//!
//! Each kind gets its own tokio interval loop calling the same `run_batch`
//! entry point the admin endpoint uses; correctness under the resulting
//! races is guaranteed by the ledger, not by trigger coordination.

use crate::config::Config;
use crate::domain::PositionKind;
use crate::orchestration::BatchRunner;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Spawn one batch loop per position kind. Returns the task handles; the
/// loops run until the process exits.
pub fn spawn_batch_loops(runner: Arc<BatchRunner>, config: &Config) -> Vec<JoinHandle<()>> {
    let schedule = [
        (
            PositionKind::DailyInvestment,
            config.daily_batch_interval_secs,
        ),
        (
            PositionKind::HourlyLiveTrade,
            config.hourly_batch_interval_secs,
        ),
    ];

    schedule
        .into_iter()
        .map(|(kind, interval_secs)| {
            let runner = runner.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
                // The first tick fires immediately; skip it so startup does
                // not race service readiness.
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    match runner.run_batch(kind).await {
                        Ok(report) => {
                            info!(
                                kind = %kind,
                                processed = report.processed,
                                skipped = report.skipped,
                                completed = report.completed,
                                errors = report.errors,
                                "scheduled batch run finished"
                            );
                        }
                        Err(e) => {
                            // Position store unreachable; surface and let the
                            // next tick retry.
                            error!(kind = %kind, error = %e, "scheduled batch run failed");
                        }
                    }
                }
            })
        })
        .collect()
}
