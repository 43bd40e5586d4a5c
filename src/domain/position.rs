//! A user's committed principal under a plan.

use crate::domain::{Decimal, Plan, PlanId, PositionId, PositionKind, PositionStatus, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// One user commitment of principal under a plan.
///
/// `accrued_profit` is a denormalized cache; the authoritative value is the
/// sum of the position's distribution records and the audit routine checks
/// the two against each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub kind: PositionKind,
    pub principal: Decimal,
    pub status: PositionStatus,
    pub started_at_ms: TimeMs,
    pub ended_at_ms: Option<TimeMs>,
    pub accrued_profit: Decimal,
}

impl Position {
    /// Open a new active position against a plan.
    pub fn open(user_id: UserId, plan: &Plan, principal: Decimal, started_at_ms: TimeMs) -> Self {
        Position {
            id: PositionId::generate(),
            user_id,
            plan_id: plan.id.clone(),
            kind: plan.kind,
            principal,
            status: PositionStatus::Active,
            started_at_ms,
            ended_at_ms: None,
            accrued_profit: Decimal::zero(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }
}
