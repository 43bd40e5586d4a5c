//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `positions.rs` - Plan and position store operations
//! - `ledger.rs` - Distribution, capital-return, balance, and transaction operations
//!
//! Monetary values are stored as canonical decimal strings and summed in Rust;
//! SQLite's SUM aggregate returns REAL and would lose precision.

mod ledger;
mod positions;

use crate::domain::Decimal;
use sqlx::sqlite::SqlitePool;

pub use ledger::{CompletionRow, PeriodCredit};
pub use positions::PositionWithPlan;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a trivial query against the pool. The readiness endpoint uses
    /// this to verify the database can actually serve traffic.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Parse a stored decimal string, surfacing corruption as a decode error
/// instead of defaulting. A ledger must never silently read a bad amount as 0.
pub(crate) fn parse_decimal(value: &str, column: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str_canonical(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
