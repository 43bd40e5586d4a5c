//! Plan and position store operations.

use crate::db::repo::{parse_decimal, Repository};
use crate::domain::{
    Plan, PlanId, Position, PositionId, PositionKind, PositionStatus, TimeMs, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::str::FromStr;

/// An active position joined with its plan, if the plan still exists.
///
/// A missing plan is surfaced as `plan: None` so the batch runner can count a
/// per-position integrity error instead of failing the whole fetch.
#[derive(Debug, Clone)]
pub struct PositionWithPlan {
    pub position: Position,
    pub plan: Option<Plan>,
}

fn decode_str_field<T>(value: &str, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    T::from_str(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

pub(crate) fn position_from_row(row: &SqliteRow) -> Result<Position, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let principal: String = row.try_get("principal")?;
    let accrued_profit: String = row.try_get("accrued_profit")?;

    Ok(Position {
        id: PositionId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        plan_id: PlanId::new(row.try_get("plan_id")?),
        kind: decode_str_field(&kind, "kind")?,
        principal: parse_decimal(&principal, "principal")?,
        status: decode_str_field(&status, "status")?,
        started_at_ms: TimeMs::new(row.try_get("started_at_ms")?),
        ended_at_ms: row
            .try_get::<Option<i64>, _>("ended_at_ms")?
            .map(TimeMs::new),
        accrued_profit: parse_decimal(&accrued_profit, "accrued_profit")?,
    })
}

fn plan_from_row_prefixed(row: &SqliteRow, prefix: &str) -> Result<Plan, sqlx::Error> {
    let col = |name: &str| format!("{}{}", prefix, name);

    let kind: String = row.try_get(col("kind").as_str())?;
    let min_principal: String = row.try_get(col("min_principal").as_str())?;
    let max_principal: String = row.try_get(col("max_principal").as_str())?;
    let rate: String = row.try_get(col("rate").as_str())?;
    let duration: i64 = row.try_get(col("duration_periods").as_str())?;
    let is_active: i64 = row.try_get(col("is_active").as_str())?;

    Ok(Plan {
        id: PlanId::new(row.try_get(col("id").as_str())?),
        name: row.try_get(col("name").as_str())?,
        kind: decode_str_field(&kind, "kind")?,
        min_principal: parse_decimal(&min_principal, "min_principal")?,
        max_principal: parse_decimal(&max_principal, "max_principal")?,
        rate: parse_decimal(&rate, "rate")?,
        duration_periods: u32::try_from(duration).map_err(|e| sqlx::Error::ColumnDecode {
            index: col("duration_periods"),
            source: Box::new(e),
        })?,
        is_active: is_active != 0,
    })
}

impl Repository {
    // =========================================================================
    // Plan operations
    // =========================================================================

    /// Insert a plan. Plans are created by the surrounding platform; this is
    /// the seam it writes through.
    pub async fn insert_plan(&self, plan: &Plan) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO plans (id, name, kind, min_principal, max_principal, rate, duration_periods, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan.id.as_str())
        .bind(&plan.name)
        .bind(plan.kind.as_str())
        .bind(plan.min_principal.to_canonical_string())
        .bind(plan.max_principal.to_canonical_string())
        .bind(plan.rate.to_canonical_string())
        .bind(plan.duration_periods as i64)
        .bind(plan.is_active as i64)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch a plan by id.
    pub async fn get_plan(&self, id: &PlanId) -> Result<Option<Plan>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, kind, min_principal, max_principal, rate, duration_periods, is_active
            FROM plans
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| plan_from_row_prefixed(&r, "")).transpose()
    }

    /// Deactivate a plan. Admin action from outside the core.
    pub async fn deactivate_plan(&self, id: &PlanId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE plans SET is_active = 0 WHERE id = ?")
            .bind(id.as_str())
            .execute(self.pool())
            .await?;

        Ok(())
    }

    // =========================================================================
    // Position operations
    // =========================================================================

    /// Insert a position. Positions are created by the surrounding platform
    /// when a user commits principal.
    pub async fn insert_position(&self, position: &Position) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO positions
            (id, user_id, plan_id, kind, principal, status, started_at_ms, ended_at_ms, accrued_profit)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.id.as_str())
        .bind(position.user_id.as_str())
        .bind(position.plan_id.as_str())
        .bind(position.kind.as_str())
        .bind(position.principal.to_canonical_string())
        .bind(position.status.as_str())
        .bind(position.started_at_ms.as_i64())
        .bind(position.ended_at_ms.map(|t| t.as_i64()))
        .bind(position.accrued_profit.to_canonical_string())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Fetch a position by id.
    pub async fn get_position(&self, id: &PositionId) -> Result<Option<Position>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, plan_id, kind, principal, status, started_at_ms, ended_at_ms, accrued_profit
            FROM positions
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| position_from_row(&r)).transpose()
    }

    /// Fetch all active positions of one kind, each joined with its plan.
    ///
    /// Uses a LEFT JOIN so a dangling plan reference comes back as
    /// `plan: None` rather than dropping the position from the batch.
    pub async fn fetch_active_positions(
        &self,
        kind: PositionKind,
    ) -> Result<Vec<PositionWithPlan>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT
                p.id, p.user_id, p.plan_id, p.kind, p.principal, p.status,
                p.started_at_ms, p.ended_at_ms, p.accrued_profit,
                pl.id AS pl_id, pl.name AS pl_name, pl.kind AS pl_kind,
                pl.min_principal AS pl_min_principal, pl.max_principal AS pl_max_principal,
                pl.rate AS pl_rate, pl.duration_periods AS pl_duration_periods,
                pl.is_active AS pl_is_active
            FROM positions p
            LEFT JOIN plans pl ON pl.id = p.plan_id
            WHERE p.status = 'active' AND p.kind = ?
            ORDER BY p.started_at_ms ASC, p.id ASC
            "#,
        )
        .bind(kind.as_str())
        .fetch_all(self.pool())
        .await?;

        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let position = position_from_row(row)?;
            let plan_id: Option<String> = row.try_get("pl_id")?;
            let plan = match plan_id {
                Some(_) => Some(plan_from_row_prefixed(row, "pl_")?),
                None => None,
            };
            result.push(PositionWithPlan { position, plan });
        }

        Ok(result)
    }

    /// Fetch all positions belonging to a user, newest first.
    pub async fn positions_for_user(&self, user: &UserId) -> Result<Vec<Position>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, plan_id, kind, principal, status, started_at_ms, ended_at_ms, accrued_profit
            FROM positions
            WHERE user_id = ?
            ORDER BY started_at_ms DESC, id ASC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(position_from_row).collect()
    }

    /// Cancel an active position. Admin action from outside the core; the
    /// status guard makes it a no-op on completed or already-cancelled rows.
    pub async fn cancel_position(&self, id: &PositionId, now: TimeMs) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE positions SET status = ?, ended_at_ms = ? WHERE id = ? AND status = 'active'",
        )
        .bind(PositionStatus::Cancelled.as_str())
        .bind(now.as_i64())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
