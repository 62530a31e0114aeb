//! Scrape pipeline stages.
//!
//! - `pool`: scrape every page of one source with bounded concurrency
//! - `collate`: merge pool output queues into one record list
//! - `coordinate`: drive a full run from categories to persisted jobs

pub mod collate;
pub mod coordinate;
pub mod pool;

pub use collate::{collate, collate_with};
pub use coordinate::{Coordinator, RunPhase, RunReport, RunRequest, RunSettings};
pub use pool::{PageBatch, PageFailure, PoolId, PoolOutput, PoolSettings, PoolStats, WorkerPool};
