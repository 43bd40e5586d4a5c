use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::AppState;
use crate::domain::UserId;
use crate::engine::AuditReport;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub user: String,
}

pub async fn get_audit(
    Query(params): Query<AuditQuery>,
    State(state): State<AppState>,
) -> Result<Json<AuditReport>, AppError> {
    if params.user.trim().is_empty() {
        return Err(AppError::BadRequest("user must not be empty".into()));
    }
    let user = UserId::new(params.user);

    let report = state.auditor.audit_user(&user).await?;
    Ok(Json(report))
}
