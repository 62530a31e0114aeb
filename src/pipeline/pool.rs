// src/pipeline/pool.rs

//! Bounded-concurrency worker pool scraping one source.
//!
//! A feeder task pushes page indices `1..=pages` into a bounded supply;
//! `workers` tasks claim indices one at a time, fetch the page and push the
//! resulting batch (possibly empty) onto the output queue. Failures go to a
//! side channel instead. The supervising task joins every worker and only
//! then drops its output sender, so the queue closing is the completion
//! signal.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{Record, ScraperConfig};
use crate::sources::Source;

/// Position of a pool within a run.
pub type PoolId = usize;

/// Records scraped from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBatch {
    pub pool: PoolId,
    pub page: u32,
    pub records: Vec<Record>,
}

/// A page that contributed nothing because its fetch failed.
#[derive(Debug)]
pub struct PageFailure {
    pub pool: PoolId,
    pub source: String,
    pub page: u32,
    pub error: AppError,
}

/// Per-pool tuning, taken from the scraper configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Concurrent workers
    pub workers: usize,
    /// Capacity of the page-index supply
    pub page_buffer: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: 3,
            page_buffer: 5,
        }
    }
}

impl From<&ScraperConfig> for PoolSettings {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            workers: config.workers,
            page_buffer: config.page_buffer,
        }
    }
}

/// Counters reported by a finished pool.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records: usize,
}

impl PoolStats {
    pub fn merge(&mut self, other: PoolStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.records += other.records;
    }
}

/// Queues of a pool started with [`WorkerPool::run`].
pub struct PoolOutput {
    pub batches: mpsc::Receiver<PageBatch>,
    pub failures: mpsc::UnboundedReceiver<PageFailure>,
    pub handle: JoinHandle<PoolStats>,
}

/// Scrapes every page of one source with bounded parallelism.
pub struct WorkerPool {
    id: PoolId,
    source: Arc<dyn Source>,
    settings: PoolSettings,
}

impl WorkerPool {
    pub fn new(id: PoolId, source: Arc<dyn Source>, settings: PoolSettings) -> Self {
        Self {
            id,
            source,
            settings,
        }
    }

    /// Start the pool on its own output queue.
    pub fn run(self, pages: u32, queue_buffer: usize, cancel: CancellationToken) -> PoolOutput {
        let (batch_tx, batches) = mpsc::channel(queue_buffer.max(1));
        let (failure_tx, failures) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.drive(pages, cancel, batch_tx, failure_tx));

        PoolOutput {
            batches,
            failures,
            handle,
        }
    }

    /// Scrape pages `1..=pages` into a (possibly shared) output queue.
    ///
    /// Returns once every claimed page has been attempted; the senders passed
    /// in are dropped on return.
    pub async fn drive(
        self,
        pages: u32,
        cancel: CancellationToken,
        batches: mpsc::Sender<PageBatch>,
        failures: mpsc::UnboundedSender<PageFailure>,
    ) -> PoolStats {
        let (page_tx, page_rx) = mpsc::channel::<u32>(self.settings.page_buffer.max(1));
        let page_rx = Arc::new(Mutex::new(page_rx));

        let feeder_cancel = cancel.clone();
        let feeder = tokio::spawn(async move {
            for page in 1..=pages {
                tokio::select! {
                    biased;
                    _ = feeder_cancel.cancelled() => break,
                    sent = page_tx.send(page) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut workers = JoinSet::new();
        for _ in 0..self.settings.workers.max(1) {
            let worker = Worker {
                pool: self.id,
                source: Arc::clone(&self.source),
                pages: Arc::clone(&page_rx),
                batches: batches.clone(),
                failures: failures.clone(),
                cancel: cancel.clone(),
            };
            workers.spawn(worker.work());
        }

        let mut stats = PoolStats::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker_stats) => stats.merge(worker_stats),
                Err(e) => {
                    // The page the worker was on is lost with it.
                    stats.attempted += 1;
                    stats.failed += 1;
                    log::error!("{}: worker task failed: {}", self.source.name(), e);
                }
            }
        }

        // No worker is left to claim pages; unblock the feeder.
        drop(page_rx);
        feeder.abort();
        if let Err(e) = feeder.await {
            if !e.is_cancelled() {
                log::error!("{}: page feeder failed: {}", self.source.name(), e);
            }
        }

        log::debug!(
            "{}: pool {} finished ({} pages attempted, {} failed, {} records)",
            self.source.name(),
            self.id,
            stats.attempted,
            stats.failed,
            stats.records
        );

        // Last sender held by this pool; the queue closes once every pool sharing it returns.
        drop(batches);
        stats
    }
}

struct Worker {
    pool: PoolId,
    source: Arc<dyn Source>,
    pages: Arc<Mutex<mpsc::Receiver<u32>>>,
    batches: mpsc::Sender<PageBatch>,
    failures: mpsc::UnboundedSender<PageFailure>,
    cancel: CancellationToken,
}

impl Worker {
    async fn claim(&self) -> Option<u32> {
        let mut pages = self.pages.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            page = pages.recv() => page,
        }
    }

    async fn work(self) -> PoolStats {
        let mut stats = PoolStats::default();

        while let Some(page) = self.claim().await {
            stats.attempted += 1;
            let url = self.source.page_url(page);

            match self.source.fetch_page(&self.cancel, &url).await {
                Ok(records) => {
                    stats.succeeded += 1;
                    stats.records += records.len();
                    let batch = PageBatch {
                        pool: self.pool,
                        page,
                        records,
                    };
                    if self.batches.send(batch).await.is_err() {
                        log::warn!(
                            "{}: output queue closed, dropping page {}",
                            self.source.name(),
                            page
                        );
                        break;
                    }
                }
                Err(error) => {
                    stats.failed += 1;
                    if !error.is_cancelled() {
                        log::warn!(
                            "{}: page {} failed ({}): {}",
                            self.source.name(),
                            page,
                            url,
                            error
                        );
                    }
                    let _ = self.failures.send(PageFailure {
                        pool: self.pool,
                        source: self.source.name().to_string(),
                        page,
                        error,
                    });
                }
            }
        }
        stats
    }
}
