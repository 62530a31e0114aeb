// src/models/mod.rs

//! Domain models for the aggregator.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod category;
mod config;
mod record;
mod selectors;

// Re-export all public types
pub use category::{Category, JobCreate, StoredJob};
pub use config::{
    BoardKind, BoardsConfig, Config, NotifyConfig, ScraperConfig, SearchConfig, StorageConfig,
};
pub use record::{JobDetails, Record};
pub use selectors::CardSelectors;
