//! Liveness and readiness checks.
//!
//! `/health` answers as long as the process is up; `/ready` additionally
//! requires the database to answer a query, so a deploy does not route
//! traffic to an instance whose pool is broken.

use axum::extract::State;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.repo.ping().await?;
    Ok(Json(serde_json::json!({"status": "ready"})))
}
