use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::domain::UserId;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub user: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user: String,
    pub total: String,
    pub transaction_count: i64,
    pub transactions: Vec<TransactionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    pub amount: String,
    pub tx_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub created_at_ms: i64,
}

pub async fn get_balance(
    Query(params): Query<BalanceQuery>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, AppError> {
    if params.user.trim().is_empty() {
        return Err(AppError::BadRequest("user must not be empty".into()));
    }
    let user = UserId::new(params.user);

    let total = state.repo.get_balance(&user).await?;
    let transactions = state.repo.transactions_for_user(&user).await?;

    let transaction_count = transactions.len() as i64;
    let transactions = transactions
        .into_iter()
        .map(|t| TransactionDto {
            amount: t.amount.to_canonical_string(),
            tx_type: t.tx_type.as_str().to_string(),
            description: t.description,
            reference: t.reference,
            created_at_ms: t.created_at_ms.as_i64(),
        })
        .collect();

    Ok(Json(BalanceResponse {
        user: user.as_str().to_string(),
        total: total.to_canonical_string(),
        transaction_count,
        transactions,
    }))
}
