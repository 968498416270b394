//! Per-job pipeline execution and the bounded worker pool.

pub mod runner;
pub mod worker_pool;

pub use runner::{JobPipeline, PipelineConfig};
pub use worker_pool::WorkerPool;
