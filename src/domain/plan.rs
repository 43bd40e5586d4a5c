//! Investment plan definition.

use crate::domain::{Decimal, PlanId, PositionKind};
use serde::{Deserialize, Serialize};

/// An investment plan. Immutable once referenced by a position; created by
/// administrators outside this core and read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub kind: PositionKind,
    pub min_principal: Decimal,
    pub max_principal: Decimal,
    /// Profit per period as a fraction of principal (0.015 = 1.5%).
    pub rate: Decimal,
    /// Total number of accrual periods before completion.
    pub duration_periods: u32,
    pub is_active: bool,
}

impl Plan {
    /// Profit owed for one period on the given principal, rounded to
    /// currency precision.
    pub fn period_profit(&self, principal: Decimal) -> Decimal {
        (principal * self.rate).round_currency()
    }
}
