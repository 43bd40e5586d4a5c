//! Profit accrual engine: period calculation, distribution, completion, audit.

pub mod audit;
pub mod completion;
pub mod distribution;
pub mod periods;

pub use audit::{AuditReport, Auditor, PositionAudit};
pub use completion::{CompletionHandler, CompletionOutcome};
pub use distribution::{DistributionEngine, DistributionOutcome};
pub use periods::{elapsed_periods, missing_periods};

use crate::domain::PositionId;
use thiserror::Error;

/// Errors raised while processing a single position.
///
/// All variants are caught at the batch-runner boundary, logged with the
/// position id, and counted; none of them aborts a batch.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transient store failure; the next run retries naturally.
    #[error(transparent)]
    Db(#[from] sqlx::Error),

    /// The position's data is inconsistent (missing/inactive plan, bad
    /// principal). Left untouched for manual investigation.
    #[error("integrity error for position {position_id}: {reason}")]
    Integrity {
        position_id: PositionId,
        reason: String,
    },

    /// Completion was due but some period is still undistributed; the
    /// position stays active until every period up to duration is recorded.
    #[error("position {position_id} has undistributed periods; completion withheld")]
    IncompleteDistribution { position_id: PositionId },

    /// The position's unit of work exceeded its time budget.
    #[error("processing position {position_id} timed out")]
    Timeout { position_id: PositionId },
}

impl EngineError {
    pub fn integrity(position_id: &PositionId, reason: impl Into<String>) -> Self {
        EngineError::Integrity {
            position_id: position_id.clone(),
            reason: reason.into(),
        }
    }
}
