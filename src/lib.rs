pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, Distribution, Plan, PlanId, Position, PositionId, PositionKind, PositionStatus,
    TimeMs, Transaction, TxType, UserId,
};
pub use engine::{Auditor, CompletionHandler, DistributionEngine, EngineError};
pub use error::AppError;
pub use orchestration::{BatchReport, BatchRunner};
