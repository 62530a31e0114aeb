//! Storage abstractions for categories and scraped jobs.
//!
//! The coordinator only reads the category taxonomy and submits
//! job-creation commands in one batch per run; everything else about the
//! backing store is its own business.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── categories.json       # Category taxonomy
//! └── jobs.json             # Persisted jobs (append-only)
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Category, JobCreate};

pub use local::LocalStore;

/// Backend that owns categories and persisted jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Load every known category.
    async fn get_categories(&self) -> Result<Vec<Category>>;

    /// Persist a batch of jobs in a single call.
    async fn batch_create_jobs(&self, jobs: &[JobCreate]) -> Result<()>;
}
