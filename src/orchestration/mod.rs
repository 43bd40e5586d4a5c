//! Batch orchestration: the runner and its periodic trigger.

pub mod batch;
pub mod scheduler;

pub use batch::{BatchReport, BatchRunner};
pub use scheduler::spawn_batch_loops;
