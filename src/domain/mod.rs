//! Domain types for the profit accrual and distribution core.
//!
//! This module provides:
//! - Lossless monetary amounts via the Decimal wrapper
//! - Domain primitives: TimeMs, UserId, PositionId, PlanId, kinds and statuses
//! - Plan and Position aggregates
//! - Ledger records: Distribution, CapitalReturn, Transaction

pub mod decimal;
pub mod ledger;
pub mod plan;
pub mod position;
pub mod primitives;

pub use decimal::Decimal;
pub use ledger::{CapitalReturn, Distribution, Transaction, TxType};
pub use plan::Plan;
pub use position::Position;
pub use primitives::{PlanId, PositionId, PositionKind, PositionStatus, TimeMs, UserId};
