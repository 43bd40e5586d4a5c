//! Manual admin trigger for a batch run. Shares the exact entry point the
//! scheduler uses; racing the scheduled run is safe by construction.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::PositionKind;
use crate::error::AppError;
use crate::orchestration::BatchReport;

#[derive(Debug, Deserialize)]
pub struct RunBatchQuery {
    pub kind: String,
}

pub async fn run_batch(
    Query(params): Query<RunBatchQuery>,
    State(state): State<AppState>,
) -> Result<Json<BatchReport>, AppError> {
    let kind = PositionKind::from_str(&params.kind).map_err(AppError::BadRequest)?;

    let report = state
        .runner
        .run_batch(kind)
        .await
        .map_err(|e| AppError::Internal(format!("Batch run failed: {}", e)))?;

    Ok(Json(report))
}
