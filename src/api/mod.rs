pub mod audit;
pub mod balance;
pub mod distributions;
pub mod health;
pub mod positions;

use crate::db::Repository;
use crate::engine::Auditor;
use crate::orchestration::BatchRunner;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub runner: Arc<BatchRunner>,
    pub auditor: Arc<Auditor>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, runner: Arc<BatchRunner>, auditor: Arc<Auditor>) -> Self {
        Self {
            repo,
            runner,
            auditor,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/distributions/run", post(distributions::run_batch))
        .route("/v1/balance", get(balance::get_balance))
        .route("/v1/positions", get(positions::get_positions))
        .route("/v1/audit", get(audit::get_audit))
        .layer(cors)
        .with_state(state)
}
