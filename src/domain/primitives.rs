//! Domain primitives: TimeMs, UserId, PositionId, PlanId, PositionKind, PositionStatus.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

/// User identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: String) -> Self {
        UserId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: String) -> Self {
        PositionId(id)
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        PositionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plan identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn new(id: String) -> Self {
        PlanId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position kind: daily-period investments or hourly-period live trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PositionKind {
    /// Daily accrual periods.
    DailyInvestment,
    /// Hourly accrual periods.
    HourlyLiveTrade,
}

impl PositionKind {
    /// Length of one accrual period in milliseconds.
    pub fn period_len_ms(&self) -> i64 {
        match self {
            PositionKind::DailyInvestment => 86_400_000,
            PositionKind::HourlyLiveTrade => 3_600_000,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PositionKind::DailyInvestment => "daily-investment",
            PositionKind::HourlyLiveTrade => "hourly-live-trade",
        }
    }
}

impl FromStr for PositionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily-investment" => Ok(PositionKind::DailyInvestment),
            "hourly-live-trade" => Ok(PositionKind::HourlyLiveTrade),
            other => Err(format!("unknown position kind: {}", other)),
        }
    }
}

impl std::fmt::Display for PositionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Position lifecycle status. Completed and cancelled are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Completed,
    Cancelled,
}

impl PositionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PositionStatus::Active => "active",
            PositionStatus::Completed => "completed",
            PositionStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PositionStatus::Active),
            "completed" => Ok(PositionStatus::Completed),
            "cancelled" => Ok(PositionStatus::Cancelled),
            other => Err(format!("unknown position status: {}", other)),
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
