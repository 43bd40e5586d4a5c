//! Ledger records: distribution proofs, capital-return markers, transactions.

use crate::domain::{Decimal, PositionId, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Append-only proof that one period's profit was credited for one position.
///
/// The (position_id, period) pair is unique in the store; that uniqueness is
/// the idempotency mechanism for profit distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: String,
    pub position_id: PositionId,
    /// 1-based period index within the plan's duration.
    pub period: u32,
    pub amount: Decimal,
    pub created_at_ms: TimeMs,
}

impl Distribution {
    pub fn new(position_id: PositionId, period: u32, amount: Decimal, now: TimeMs) -> Self {
        Distribution {
            id: uuid::Uuid::new_v4().to_string(),
            position_id,
            period,
            amount,
            created_at_ms: now,
        }
    }
}

/// One-row-per-position marker proving principal was returned on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalReturn {
    pub position_id: PositionId,
    pub amount: Decimal,
    pub created_at_ms: TimeMs,
}

/// Closed set of transaction types. This core writes only `ProfitCredit` and
/// `CapitalReturn`; the remaining variants are written by the surrounding
/// platform and participate in the conservation audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxType {
    ProfitCredit,
    CapitalReturn,
    Deposit,
    Withdrawal,
    InvestmentDebit,
}

impl TxType {
    pub fn as_str(&self) -> &str {
        match self {
            TxType::ProfitCredit => "profit-credit",
            TxType::CapitalReturn => "capital-return",
            TxType::Deposit => "deposit",
            TxType::Withdrawal => "withdrawal",
            TxType::InvestmentDebit => "investment-debit",
        }
    }
}

impl FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "profit-credit" => Ok(TxType::ProfitCredit),
            "capital-return" => Ok(TxType::CapitalReturn),
            "deposit" => Ok(TxType::Deposit),
            "withdrawal" => Ok(TxType::Withdrawal),
            "investment-debit" => Ok(TxType::InvestmentDebit),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only record of a single balance credit or debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: UserId,
    /// Signed amount: positive credits, negative debits.
    pub amount: Decimal,
    pub tx_type: TxType,
    pub description: String,
    /// Originating distribution id or position id, when applicable.
    pub reference: Option<String>,
    pub created_at_ms: TimeMs,
}

impl Transaction {
    pub fn new(
        user_id: UserId,
        amount: Decimal,
        tx_type: TxType,
        description: String,
        reference: Option<String>,
        now: TimeMs,
    ) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            amount,
            tx_type,
            description,
            reference,
            created_at_ms: now,
        }
    }
}
