//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Search parameters shared by every board
    #[serde(default)]
    pub search: SearchConfig,

    /// Boards to scrape
    #[serde(default)]
    pub boards: BoardsConfig,

    /// Digest delivery settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Local store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scraper.user_agent.trim().is_empty() {
            return Err(AppError::validation("scraper.user_agent is empty"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        if self.scraper.workers == 0 {
            return Err(AppError::validation("scraper.workers must be > 0"));
        }
        if self.scraper.page_buffer == 0 {
            return Err(AppError::validation("scraper.page_buffer must be > 0"));
        }
        if self.scraper.queue_buffer == 0 {
            return Err(AppError::validation("scraper.queue_buffer must be > 0"));
        }
        if self.scraper.max_concurrent_pools == 0 {
            return Err(AppError::validation(
                "scraper.max_concurrent_pools must be > 0",
            ));
        }
        if self.scraper.detail_concurrency == 0 {
            return Err(AppError::validation(
                "scraper.detail_concurrency must be > 0",
            ));
        }
        if self.scraper.run_timeout_secs == Some(0) {
            return Err(AppError::validation(
                "scraper.run_timeout_secs must be > 0 when set",
            ));
        }
        if self.boards.enabled.is_empty() {
            return Err(AppError::validation("No boards enabled"));
        }
        if !self.notify.recipient.is_empty() && !self.notify.recipient.contains('@') {
            return Err(AppError::validation(format!(
                "notify.recipient '{}' is not an email address",
                self.notify.recipient
            )));
        }
        Ok(())
    }
}

/// HTTP client and scraping behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Concurrent workers per board scrape
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Capacity of each pool's page-index supply
    #[serde(default = "defaults::page_buffer")]
    pub page_buffer: usize,

    /// Pages scraped per board and category
    #[serde(default = "defaults::pages")]
    pub pages: u32,

    /// Capacity of the shared output queue
    #[serde(default = "defaults::queue_buffer")]
    pub queue_buffer: usize,

    /// Maximum worker pools running at once across a run
    #[serde(default = "defaults::max_concurrent_pools")]
    pub max_concurrent_pools: usize,

    /// Concurrent per-listing detail requests within one page
    #[serde(default = "defaults::detail_concurrency")]
    pub detail_concurrency: usize,

    /// Deadline for a whole run; unlimited if absent
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl ScraperConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            workers: defaults::workers(),
            page_buffer: defaults::page_buffer(),
            pages: defaults::pages(),
            queue_buffer: defaults::queue_buffer(),
            max_concurrent_pools: defaults::max_concurrent_pools(),
            detail_concurrency: defaults::detail_concurrency(),
            run_timeout_secs: None,
        }
    }
}

/// Search parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Location filter passed to boards that support one
    #[serde(default)]
    pub location: Option<String>,
}

/// Board selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardsConfig {
    #[serde(default = "defaults::enabled_boards")]
    pub enabled: Vec<BoardKind>,
}

impl Default for BoardsConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled_boards(),
        }
    }
}

/// Supported job boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardKind {
    LinkedIn,
    Jobberman,
    Glassdoor,
    Indeed,
}

/// Digest delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Digest recipient; notification is skipped when empty
    #[serde(default)]
    pub recipient: String,

    /// From header of the digest
    #[serde(default = "defaults::sender")]
    pub sender: String,

    /// Subject line of the digest
    #[serde(default = "defaults::subject")]
    pub subject: String,

    /// Directory rendered digests are written to
    #[serde(default = "defaults::outbox_dir")]
    pub outbox_dir: PathBuf,

    /// Tera template overriding the built-in digest
    #[serde(default)]
    pub template: Option<PathBuf>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            sender: defaults::sender(),
            subject: defaults::subject(),
            outbox_dir: defaults::outbox_dir(),
            template: None,
        }
    }
}

/// Local store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::BoardKind;

    // Scraper defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn workers() -> usize {
        3
    }
    pub fn page_buffer() -> usize {
        5
    }
    pub fn pages() -> u32 {
        10
    }
    pub fn queue_buffer() -> usize {
        50
    }
    pub fn max_concurrent_pools() -> usize {
        8
    }
    pub fn detail_concurrency() -> usize {
        2
    }

    pub fn enabled_boards() -> Vec<BoardKind> {
        vec![
            BoardKind::LinkedIn,
            BoardKind::Jobberman,
            BoardKind::Glassdoor,
            BoardKind::Indeed,
        ]
    }

    // Notify defaults
    pub fn sender() -> String {
        "jobscout@localhost".into()
    }
    pub fn subject() -> String {
        "These are the job postings for today.".into()
    }
    pub fn outbox_dir() -> PathBuf {
        PathBuf::from("storage/outbox")
    }

    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }
}
