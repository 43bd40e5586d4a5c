//! Distribution ledger, capital-return marker, balance, and transaction operations.
//!
//! Every mutation here runs inside a single sqlx transaction whose first
//! statement is a write, so the connection holds the SQLite write lock before
//! any balance read-modify-write happens. Two concurrent runs therefore
//! serialize on the database rather than racing each other's reads.

use crate::db::repo::{parse_decimal, Repository};
use crate::domain::{
    CapitalReturn, Decimal, Distribution, Position, PositionId, TimeMs, Transaction, TxType, UserId,
};
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;

/// Outcome of the atomic completion write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionRow {
    /// True when this call performed the active -> completed transition.
    pub transitioned: bool,
    /// True when this call credited the principal back.
    pub capital_returned: bool,
}

/// Outcome of one period's distribution write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodCredit {
    /// The period was recorded and the profit credited by this call.
    Credited,
    /// A concurrent run already recorded the period; nothing was written.
    AlreadyRecorded,
    /// The stored position is no longer active; the whole write rolled back.
    NotActive,
}

/// Credit (or debit, for negative amounts) a user's balance inside an open
/// transaction. Caller must already hold the write lock via a prior write.
async fn credit_balance(
    conn: &mut SqliteConnection,
    user: &UserId,
    amount: Decimal,
) -> Result<(), sqlx::Error> {
    let row = sqlx::query("SELECT total FROM balances WHERE user_id = ?")
        .bind(user.as_str())
        .fetch_optional(&mut *conn)
        .await?;

    let current = match &row {
        Some(r) => {
            let total: String = r.try_get("total")?;
            parse_decimal(&total, "total")?
        }
        None => Decimal::zero(),
    };
    let updated = current + amount;

    sqlx::query(
        r#"
        INSERT INTO balances (user_id, total)
        VALUES (?, ?)
        ON CONFLICT(user_id) DO UPDATE SET total = excluded.total
        "#,
    )
    .bind(user.as_str())
    .bind(updated.to_canonical_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_transaction(
    conn: &mut SqliteConnection,
    tx_record: &Transaction,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO transactions (id, user_id, amount, tx_type, description, reference, created_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&tx_record.id)
    .bind(tx_record.user_id.as_str())
    .bind(tx_record.amount.to_canonical_string())
    .bind(tx_record.tx_type.as_str())
    .bind(&tx_record.description)
    .bind(tx_record.reference.as_deref())
    .bind(tx_record.created_at_ms.as_i64())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

impl Repository {
    // =========================================================================
    // Distribution ledger
    // =========================================================================

    /// Period indices already recorded for a position, ascending.
    pub async fn recorded_periods(&self, position: &PositionId) -> Result<Vec<u32>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT period FROM distributions WHERE position_id = ? ORDER BY period ASC",
        )
        .bind(position.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let period: i64 = row.try_get("period")?;
                u32::try_from(period).map_err(|e| sqlx::Error::ColumnDecode {
                    index: "period".to_string(),
                    source: Box::new(e),
                })
            })
            .collect()
    }

    /// All distribution records for a position, ascending by period.
    pub async fn distributions_for_position(
        &self,
        position: &PositionId,
    ) -> Result<Vec<Distribution>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, position_id, period, amount, created_at_ms
            FROM distributions
            WHERE position_id = ?
            ORDER BY period ASC
            "#,
        )
        .bind(position.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let period: i64 = row.try_get("period")?;
                let amount: String = row.try_get("amount")?;
                Ok(Distribution {
                    id: row.try_get("id")?,
                    position_id: PositionId::new(row.try_get("position_id")?),
                    period: u32::try_from(period).map_err(|e| sqlx::Error::ColumnDecode {
                        index: "period".to_string(),
                        source: Box::new(e),
                    })?,
                    amount: parse_decimal(&amount, "amount")?,
                    created_at_ms: TimeMs::new(row.try_get("created_at_ms")?),
                })
            })
            .collect()
    }

    /// Sum of a position's distribution records.
    ///
    /// Summed in Rust to preserve decimal precision.
    pub async fn sum_distributions(&self, position: &PositionId) -> Result<Decimal, sqlx::Error> {
        let rows = sqlx::query("SELECT amount FROM distributions WHERE position_id = ?")
            .bind(position.as_str())
            .fetch_all(self.pool())
            .await?;

        let mut sum = Decimal::zero();
        for row in rows {
            let amount: String = row.try_get("amount")?;
            sum = sum + parse_decimal(&amount, "amount")?;
        }

        Ok(sum)
    }

    /// Atomically distribute one period's profit for a position.
    ///
    /// In a single transaction: insert the distribution record (the unique
    /// (position_id, period) constraint turns a concurrent duplicate into a
    /// no-op), credit the user's balance, append a profit-credit transaction
    /// referencing the record, and bump the position's accrued-profit cache.
    ///
    /// The accrued-profit bump carries a `status = 'active'` guard; the
    /// caller's snapshot may be stale, and a cancellation that landed after
    /// the fetch must not receive profit. When the guard misses, the whole
    /// transaction rolls back.
    pub async fn distribute_period(
        &self,
        position: &Position,
        period: u32,
        amount: Decimal,
        now: TimeMs,
    ) -> Result<PeriodCredit, sqlx::Error> {
        let record = Distribution::new(position.id.clone(), period, amount, now);

        let mut tx = self.pool().begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO distributions (id, position_id, period, amount, created_at_ms)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(position_id, period) DO NOTHING
            "#,
        )
        .bind(&record.id)
        .bind(record.position_id.as_str())
        .bind(record.period as i64)
        .bind(record.amount.to_canonical_string())
        .bind(record.created_at_ms.as_i64())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // Already distributed by a concurrent run.
            tx.rollback().await?;
            return Ok(PeriodCredit::AlreadyRecorded);
        }

        credit_balance(&mut *tx, &position.user_id, amount).await?;

        let tx_record = Transaction::new(
            position.user_id.clone(),
            amount,
            TxType::ProfitCredit,
            format!("Profit for period {} of position {}", period, position.id),
            Some(record.id.clone()),
            now,
        );
        insert_transaction(&mut *tx, &tx_record).await?;

        let row = sqlx::query("SELECT accrued_profit FROM positions WHERE id = ?")
            .bind(position.id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let accrued: String = row.try_get("accrued_profit")?;
        let accrued = parse_decimal(&accrued, "accrued_profit")? + amount;

        let bumped = sqlx::query(
            "UPDATE positions SET accrued_profit = ? WHERE id = ? AND status = 'active'",
        )
        .bind(accrued.to_canonical_string())
        .bind(position.id.as_str())
        .execute(&mut *tx)
        .await?;

        if bumped.rows_affected() == 0 {
            // The stored row left the active state after the caller's fetch.
            tx.rollback().await?;
            return Ok(PeriodCredit::NotActive);
        }

        tx.commit().await?;
        Ok(PeriodCredit::Credited)
    }

    // =========================================================================
    // Completion and capital return
    // =========================================================================

    /// Atomically complete a position and return its principal.
    ///
    /// The status update's `WHERE status = 'active'` guard makes the
    /// transition exactly-once; the capital-return marker's primary key makes
    /// the principal credit exactly-once. Both live in one transaction so a
    /// crash cannot separate them.
    pub async fn complete_position(
        &self,
        position: &Position,
        now: TimeMs,
    ) -> Result<CompletionRow, sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        let transitioned = sqlx::query(
            "UPDATE positions SET status = 'completed', ended_at_ms = ? WHERE id = ? AND status = 'active'",
        )
        .bind(now.as_i64())
        .bind(position.id.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !transitioned {
            // Another run (or a cancellation) got there first.
            tx.rollback().await?;
            return Ok(CompletionRow {
                transitioned: false,
                capital_returned: false,
            });
        }

        let marker_inserted = sqlx::query(
            r#"
            INSERT INTO capital_returns (position_id, amount, created_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(position_id) DO NOTHING
            "#,
        )
        .bind(position.id.as_str())
        .bind(position.principal.to_canonical_string())
        .bind(now.as_i64())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if marker_inserted {
            credit_balance(&mut *tx, &position.user_id, position.principal).await?;

            let tx_record = Transaction::new(
                position.user_id.clone(),
                position.principal,
                TxType::CapitalReturn,
                format!("Capital return for position {}", position.id),
                Some(position.id.as_str().to_string()),
                now,
            );
            insert_transaction(&mut *tx, &tx_record).await?;
        }

        tx.commit().await?;
        Ok(CompletionRow {
            transitioned,
            capital_returned: marker_inserted,
        })
    }

    /// Fetch the capital-return marker for a position, if present.
    pub async fn capital_return_for(
        &self,
        position: &PositionId,
    ) -> Result<Option<CapitalReturn>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT position_id, amount, created_at_ms FROM capital_returns WHERE position_id = ?",
        )
        .bind(position.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| {
            let amount: String = r.try_get("amount")?;
            Ok(CapitalReturn {
                position_id: PositionId::new(r.try_get("position_id")?),
                amount: parse_decimal(&amount, "amount")?,
                created_at_ms: TimeMs::new(r.try_get("created_at_ms")?),
            })
        })
        .transpose()
    }

    // =========================================================================
    // Balance and transaction log
    // =========================================================================

    /// Current balance total for a user. Zero if the user has no row yet.
    pub async fn get_balance(&self, user: &UserId) -> Result<Decimal, sqlx::Error> {
        let row = sqlx::query("SELECT total FROM balances WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(r) => {
                let total: String = r.try_get("total")?;
                parse_decimal(&total, "total")
            }
            None => Ok(Decimal::zero()),
        }
    }

    /// All transactions for a user, oldest first.
    pub async fn transactions_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, amount, tx_type, description, reference, created_at_ms
            FROM transactions
            WHERE user_id = ?
            ORDER BY created_at_ms ASC, id ASC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let amount: String = row.try_get("amount")?;
                let tx_type: String = row.try_get("tx_type")?;
                Ok(Transaction {
                    id: row.try_get("id")?,
                    user_id: UserId::new(row.try_get("user_id")?),
                    amount: parse_decimal(&amount, "amount")?,
                    tx_type: tx_type.parse().map_err(|e: String| {
                        sqlx::Error::ColumnDecode {
                            index: "tx_type".to_string(),
                            source: e.into(),
                        }
                    })?,
                    description: row.try_get("description")?,
                    reference: row.try_get("reference")?,
                    created_at_ms: TimeMs::new(row.try_get("created_at_ms")?),
                })
            })
            .collect()
    }

    /// Signed sum of a user's transactions, summed in Rust for precision.
    /// The conservation audit compares this against the balance total.
    pub async fn sum_transactions(&self, user: &UserId) -> Result<Decimal, sqlx::Error> {
        let rows = sqlx::query("SELECT amount FROM transactions WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_all(self.pool())
            .await?;

        let mut sum = Decimal::zero();
        for row in rows {
            let amount: String = row.try_get("amount")?;
            sum = sum + parse_decimal(&amount, "amount")?;
        }

        Ok(sum)
    }

    /// Record an externally originated transaction (deposit, withdrawal,
    /// investment debit) and apply it to the balance atomically. This is the
    /// seam the surrounding platform writes through; it keeps the
    /// conservation invariant intact for external money movement.
    pub async fn record_external_transaction(
        &self,
        tx_record: &Transaction,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool().begin().await?;

        insert_transaction(&mut *tx, tx_record).await?;
        credit_balance(&mut *tx, &tx_record.user_id, tx_record.amount).await?;

        tx.commit().await?;
        Ok(())
    }
}
