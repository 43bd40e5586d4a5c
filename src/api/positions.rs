use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::UserId;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub user: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsResponse {
    pub user: String,
    pub positions: Vec<PositionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub id: String,
    pub plan_id: String,
    pub kind: String,
    pub principal: String,
    pub status: String,
    pub started_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<i64>,
    pub accrued_profit: String,
    pub periods_distributed: u32,
}

pub async fn get_positions(
    Query(params): Query<PositionsQuery>,
    State(state): State<AppState>,
) -> Result<Json<PositionsResponse>, AppError> {
    if params.user.trim().is_empty() {
        return Err(AppError::BadRequest("user must not be empty".into()));
    }
    let user = UserId::new(params.user);

    let positions = state.repo.positions_for_user(&user).await?;

    let mut dtos = Vec::with_capacity(positions.len());
    for p in positions {
        let periods = state.repo.recorded_periods(&p.id).await?;
        dtos.push(PositionDto {
            id: p.id.as_str().to_string(),
            plan_id: p.plan_id.as_str().to_string(),
            kind: p.kind.as_str().to_string(),
            principal: p.principal.to_canonical_string(),
            status: p.status.as_str().to_string(),
            started_at_ms: p.started_at_ms.as_i64(),
            ended_at_ms: p.ended_at_ms.map(|t| t.as_i64()),
            accrued_profit: p.accrued_profit.to_canonical_string(),
            periods_distributed: periods.len() as u32,
        });
    }

    Ok(Json(PositionsResponse {
        user: user.as_str().to_string(),
        positions: dtos,
    }))
}
