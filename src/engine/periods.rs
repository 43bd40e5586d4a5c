//! Period calculator: pure accrual-period arithmetic.
//!
//! Deterministic and side-effect free so it is testable with synthetic
//! clocks; the distribution engine supplies `now`.

use crate::domain::{PositionKind, TimeMs};
use std::collections::HashSet;

/// Number of whole periods elapsed since `started_at`, capped at `duration`.
///
/// Clock skew (`now` before `started_at`) yields 0, never a negative value.
pub fn elapsed_periods(
    started_at: TimeMs,
    kind: PositionKind,
    duration: u32,
    now: TimeMs,
) -> u32 {
    if now < started_at {
        return 0;
    }

    let whole = (now.as_i64() - started_at.as_i64()) / kind.period_len_ms();
    whole.min(duration as i64) as u32
}

/// Ordered list of period indices in `[1, elapsed]` not yet recorded.
pub fn missing_periods(elapsed: u32, recorded: &HashSet<u32>) -> Vec<u32> {
    (1..=elapsed).filter(|p| !recorded.contains(p)).collect()
}
