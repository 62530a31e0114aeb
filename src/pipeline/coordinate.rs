// src/pipeline/coordinate.rs

//! End-to-end scrape run.
//!
//! One run fetches the category taxonomy, builds a source per
//! (category, board) pair, scrapes every pair through its own worker pool
//! into one shared queue, stamps the collated records with the category
//! that drove them and persists them in a single batch. An optional digest
//! goes out afterwards.
//!
//! Page failures are absorbed by the pools. Only the category lookup, source
//! construction and persistence can fail a run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Category, Config, JobCreate, Record};
use crate::notify::Notifier;
use crate::pipeline::collate::collate_with;
use crate::pipeline::pool::{PageFailure, PoolSettings, PoolStats, WorkerPool};
use crate::sources::{SearchQuery, Source, SourceFactory};
use crate::storage::JobStore;

/// Run-wide tuning.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub pool: PoolSettings,
    /// Pages scraped per (category, board) pair
    pub pages: u32,
    /// Capacity of the shared output queue
    pub queue_buffer: usize,
    /// Worker pools allowed to run at once
    pub max_concurrent_pools: usize,
    /// Deadline for the scraping phase
    pub run_timeout: Option<Duration>,
    /// Location used when a request does not give one
    pub default_location: Option<String>,
    /// Digest recipient
    pub recipient: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            pool: PoolSettings::from(&config.scraper),
            pages: config.scraper.pages,
            queue_buffer: config.scraper.queue_buffer,
            max_concurrent_pools: config.scraper.max_concurrent_pools,
            run_timeout: config.scraper.run_timeout(),
            default_location: config.search.location.clone(),
            recipient: config.notify.recipient.clone(),
        }
    }
}

/// Parameters of one run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Send a digest after persisting
    pub notify: bool,
    /// Restrict the run to categories whose name contains this term
    pub search_term: Option<String>,
    /// Location filter for boards that support one
    pub location: Option<String>,
}

/// Outcome of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub records: Vec<Record>,
    pub failures: Vec<PageFailure>,
    pub pools_launched: usize,
    pub stats: PoolStats,
    /// Phases entered, in order
    pub phases: Vec<RunPhase>,
    /// Jobs submitted to the store
    pub persisted: usize,
    /// Whether a digest was delivered
    pub notified: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    FetchingCategories,
    Scraping,
    Collating,
    Persisting,
    Notifying,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::FetchingCategories => "fetching categories",
            RunPhase::Scraping => "scraping",
            RunPhase::Collating => "collating",
            RunPhase::Persisting => "persisting",
            RunPhase::Notifying => "notifying",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct PhaseLog {
    run_id: Uuid,
    phase: RunPhase,
    history: Vec<RunPhase>,
}

impl PhaseLog {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            phase: RunPhase::Idle,
            history: vec![RunPhase::Idle],
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        log::debug!("run {}: {} -> {}", self.run_id, self.phase, phase);
        self.phase = phase;
        self.history.push(phase);
    }

    fn fail(&mut self, error: AppError) -> AppError {
        log::error!("run {} failed while {}: {}", self.run_id, self.phase, error);
        self.enter(RunPhase::Failed);
        error
    }
}

/// Source instance together with the category it searches for.
struct Target {
    category: Category,
    source: Arc<dyn Source>,
}

/// Drives scrape runs against a store, a set of boards and a notifier.
pub struct Coordinator {
    store: Arc<dyn JobStore>,
    factories: Vec<Arc<dyn SourceFactory>>,
    notifier: Option<Arc<dyn Notifier>>,
    settings: RunSettings,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn JobStore>,
        factories: Vec<Arc<dyn SourceFactory>>,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            factories,
            notifier: None,
            settings,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Run once and return the collated records.
    pub async fn coordinate(
        &self,
        cancel: &CancellationToken,
        notify: bool,
        search_term: Option<&str>,
        location: Option<&str>,
    ) -> Result<Vec<Record>> {
        let request = RunRequest {
            notify,
            search_term: search_term.map(str::to_string),
            location: location.map(str::to_string),
        };
        Ok(self.run(cancel, &request).await?.records)
    }

    /// Run once and report on every stage.
    pub async fn run(&self, cancel: &CancellationToken, request: &RunRequest) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut phase = PhaseLog::new(run_id);

        phase.enter(RunPhase::FetchingCategories);
        let categories = self
            .store
            .get_categories()
            .await
            .map_err(|e| phase.fail(e))?;
        let categories = select_categories(categories, request.search_term.as_deref())
            .map_err(|e| phase.fail(e))?;

        let targets = self.targets(&categories, request).map_err(|e| phase.fail(e))?;
        log::info!(
            "run {}: {} categories x {} boards = {} pools",
            run_id,
            categories.len(),
            self.factories.len(),
            targets.len()
        );

        phase.enter(RunPhase::Scraping);
        let (records, failures, stats) = self.scrape(cancel, &targets, &mut phase).await;
        log::info!(
            "run {}: {} records from {} pages ({} failed)",
            run_id,
            records.len(),
            stats.attempted,
            failures.len()
        );

        phase.enter(RunPhase::Persisting);
        let jobs = records
            .iter()
            .map(Record::to_job_create)
            .collect::<Result<Vec<JobCreate>>>()
            .map_err(|e| phase.fail(e))?;
        if jobs.is_empty() {
            log::info!("run {}: nothing to persist", run_id);
        } else {
            self.store
                .batch_create_jobs(&jobs)
                .await
                .map_err(|e| phase.fail(e))?;
        }

        let notified = if request.notify {
            phase.enter(RunPhase::Notifying);
            self.notify(&records).await
        } else {
            false
        };

        phase.enter(RunPhase::Done);
        Ok(RunReport {
            run_id,
            persisted: jobs.len(),
            pools_launched: targets.len(),
            records,
            failures,
            stats,
            phases: phase.history,
            notified,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn targets(&self, categories: &[Category], request: &RunRequest) -> Result<Vec<Target>> {
        let location = request
            .location
            .clone()
            .or_else(|| self.settings.default_location.clone());

        let mut targets = Vec::with_capacity(categories.len() * self.factories.len());
        for category in categories {
            let query = SearchQuery::new(&category.name)
                .with_location(location.clone())
                .with_pages(self.settings.pages);

            for factory in &self.factories {
                let source = factory.build(&query).map_err(|e| {
                    AppError::config(format!(
                        "failed to build source for category '{}': {}",
                        category.name, e
                    ))
                })?;
                targets.push(Target {
                    category: category.clone(),
                    source,
                });
            }
        }
        Ok(targets)
    }

    async fn scrape(
        &self,
        cancel: &CancellationToken,
        targets: &[Target],
        phase: &mut PhaseLog,
    ) -> (Vec<Record>, Vec<PageFailure>, PoolStats) {
        let run_cancel = cancel.child_token();
        let deadline = self.settings.run_timeout.map(|timeout| {
            let token = run_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                log::warn!("Run deadline of {:?} reached, cancelling", timeout);
                token.cancel();
            })
        });

        let (batch_tx, batch_rx) = mpsc::channel(self.settings.queue_buffer.max(1));
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_pools.max(1)));

        let mut pools = JoinSet::new();
        for (id, target) in targets.iter().enumerate() {
            let pool = WorkerPool::new(id, Arc::clone(&target.source), self.settings.pool);
            let pages = target.source.page_limit();
            let permits = Arc::clone(&permits);
            let cancel = run_cancel.clone();
            let batches = batch_tx.clone();
            let failures = failure_tx.clone();

            pools.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return PoolStats::default();
                };
                pool.drive(pages, cancel, batches, failures).await
            });
        }
        drop(batch_tx);
        drop(failure_tx);

        // Pools keep scraping while the collator drains; the queue closes
        // once every pool has returned.
        phase.enter(RunPhase::Collating);
        let records = collate_with(vec![batch_rx], |pool, record| {
            if let Some(target) = targets.get(pool) {
                record.stamp(&target.category);
            }
        })
        .await;

        let mut stats = PoolStats::default();
        while let Some(joined) = pools.join_next().await {
            match joined {
                Ok(pool_stats) => stats.merge(pool_stats),
                Err(e) => log::error!("Worker pool task failed: {}", e),
            }
        }

        let mut failures = Vec::new();
        while let Some(failure) = failure_rx.recv().await {
            failures.push(failure);
        }

        if let Some(deadline) = deadline {
            deadline.abort();
        }
        (records, failures, stats)
    }

    async fn notify(&self, records: &[Record]) -> bool {
        let Some(notifier) = &self.notifier else {
            log::warn!("Notification requested but no notifier is configured");
            return false;
        };
        if self.settings.recipient.is_empty() {
            log::warn!("Notification requested but no recipient is configured");
            return false;
        }

        match notifier.send_digest(&self.settings.recipient, records).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to send digest to {}: {}", self.settings.recipient, e);
                false
            }
        }
    }
}

/// Keep categories whose name contains `term`, ignoring case.
///
/// An empty or absent term keeps everything; a term matching nothing is an
/// error.
fn select_categories(categories: Vec<Category>, term: Option<&str>) -> Result<Vec<Category>> {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(categories);
    };

    let needle = term.to_lowercase();
    let selected: Vec<Category> = categories
        .into_iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .collect();

    if selected.is_empty() {
        return Err(AppError::validation(format!(
            "no category matches search term '{}'",
            term
        )));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;
    use crate::testing::{FixtureSource, MemoryStore, RecordingNotifier};

    /// Factory for fixture sources that remembers every instance it built.
    struct FixtureFactory {
        name: &'static str,
        per_page: usize,
        failing: Vec<u32>,
        delay: Option<Duration>,
        built: Mutex<Vec<Arc<FixtureSource>>>,
    }

    impl FixtureFactory {
        fn new(name: &'static str, per_page: usize) -> Arc<Self> {
            Self::with(name, per_page, Vec::new(), None)
        }

        fn with(
            name: &'static str,
            per_page: usize,
            failing: Vec<u32>,
            delay: Option<Duration>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                per_page,
                failing,
                delay,
                built: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.built
                .lock()
                .unwrap()
                .iter()
                .map(|s| s.attempts().len())
                .sum()
        }

        fn built(&self) -> usize {
            self.built.lock().unwrap().len()
        }
    }

    impl SourceFactory for FixtureFactory {
        fn build(&self, query: &SearchQuery) -> Result<Arc<dyn Source>> {
            let mut source =
                FixtureSource::for_query(self.name, query, self.per_page).failing_on(self.failing.clone());
            if let Some(delay) = self.delay {
                source = source.with_delay(delay);
            }
            let source = Arc::new(source);
            self.built.lock().unwrap().push(Arc::clone(&source));
            Ok(source)
        }
    }

    fn boards<const N: usize>(factories: [&Arc<FixtureFactory>; N]) -> Vec<Arc<dyn SourceFactory>> {
        factories
            .into_iter()
            .map(|f| Arc::clone(f) as Arc<dyn SourceFactory>)
            .collect()
    }

    fn settings(pages: u32) -> RunSettings {
        RunSettings {
            pages,
            recipient: "ops@example.com".to_string(),
            ..RunSettings::default()
        }
    }

    fn categories(names: &[&str]) -> Vec<Category> {
        names.iter().map(|n| Category::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_end_to_end_single_category() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])));
        let factory = FixtureFactory::new("board", 2);
        let coordinator = Coordinator::new(store.clone(), boards([&factory]), settings(3));

        let records = coordinator
            .coordinate(&CancellationToken::new(), false, None, None)
            .await
            .unwrap();

        assert_eq!(records.len(), 6);
        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 6);
        assert!(batches[0].iter().all(|job| job.origin == "board"));
        assert_eq!(factory.attempts(), 3);
    }

    #[tokio::test]
    async fn test_fans_out_categories_by_boards() {
        let cats = categories(&["Rust", "Python", "Data"]);
        let ids: HashMap<String, Uuid> = cats.iter().map(|c| (c.name.clone(), c.id)).collect();
        let store = Arc::new(MemoryStore::new(cats));
        let first = FixtureFactory::new("alpha", 1);
        let second = FixtureFactory::new("beta", 2);
        let coordinator = Coordinator::new(
            store.clone(),
            boards([&first, &second]),
            settings(2),
        );

        let report = coordinator
            .run(&CancellationToken::new(), &RunRequest::default())
            .await
            .unwrap();

        assert_eq!(report.pools_launched, 6);
        assert_eq!(first.built(), 3);
        assert_eq!(second.built(), 3);
        // 3 categories x 2 pages x (1 + 2) records
        assert_eq!(report.records.len(), 18);
        assert_eq!(report.persisted, 18);
        assert_eq!(report.stats.attempted, 12);

        for record in &report.records {
            let keyword = record.title.split(' ').next().unwrap();
            assert_eq!(record.category_name, keyword);
            assert_eq!(record.category_id, Some(ids[keyword]));
        }
    }

    #[tokio::test]
    async fn test_page_failure_is_absorbed() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])));
        let factory = FixtureFactory::with("board", 2, vec![2], None);
        let coordinator = Coordinator::new(store.clone(), boards([&factory]), settings(3));

        let report = coordinator
            .run(&CancellationToken::new(), &RunRequest::default())
            .await
            .unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].page, 2);
        assert_eq!(factory.attempts(), 3);
        assert_eq!(store.batches()[0].len(), 4);
    }

    #[tokio::test]
    async fn test_category_failure_aborts_before_scraping() {
        let store = Arc::new(MemoryStore::unreachable());
        let factory = FixtureFactory::new("board", 2);
        let coordinator = Coordinator::new(store.clone(), boards([&factory]), settings(3));

        let err = coordinator
            .coordinate(&CancellationToken::new(), true, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        assert_eq!(factory.built(), 0);
        assert!(store.batches().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_is_fatal() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])).rejecting_batches());
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = Coordinator::new(store, boards([&FixtureFactory::new("board", 1)]), settings(2))
            .with_notifier(notifier.clone());

        let request = RunRequest {
            notify: true,
            ..RunRequest::default()
        };
        let err = coordinator
            .run(&CancellationToken::new(), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Store(_)));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_notification_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])));
        let coordinator = Coordinator::new(store.clone(), boards([&FixtureFactory::new("board", 2)]), settings(1))
            .with_notifier(Arc::new(RecordingNotifier::failing()));

        let request = RunRequest {
            notify: true,
            ..RunRequest::default()
        };
        let report = coordinator
            .run(&CancellationToken::new(), &request)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert!(!report.notified);
        assert_eq!(store.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_notifies_with_all_records() {
        let store = Arc::new(MemoryStore::new(categories(&["Go", "Rust"])));
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = Coordinator::new(store, boards([&FixtureFactory::new("board", 2)]), settings(2))
            .with_notifier(notifier.clone());

        let records = coordinator
            .coordinate(&CancellationToken::new(), true, None, None)
            .await
            .unwrap();

        assert_eq!(records.len(), 8);
        assert_eq!(notifier.sent(), vec![("ops@example.com".to_string(), 8)]);
    }

    #[tokio::test]
    async fn test_notify_flag_off_sends_nothing() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])));
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = Coordinator::new(store, boards([&FixtureFactory::new("board", 1)]), settings(1))
            .with_notifier(notifier.clone());

        coordinator
            .coordinate(&CancellationToken::new(), false, None, None)
            .await
            .unwrap();

        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_search_term_filters_categories() {
        let store = Arc::new(MemoryStore::new(categories(&["Rust", "Python", "Rustacean"])));
        let factory = FixtureFactory::new("board", 1);
        let coordinator = Coordinator::new(store, boards([&factory]), settings(1));

        let records = coordinator
            .coordinate(&CancellationToken::new(), false, Some("rust"), Some("Lagos"))
            .await
            .unwrap();

        assert_eq!(factory.built(), 2);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.category_name.starts_with("Rust")));

        let err = coordinator
            .coordinate(&CancellationToken::new(), false, Some("cobol"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(factory.built(), 2);
    }

    #[tokio::test]
    async fn test_no_categories_persists_nothing() {
        let store = Arc::new(MemoryStore::new(Vec::new()));
        let coordinator = Coordinator::new(store.clone(), boards([&FixtureFactory::new("board", 1)]), settings(3));

        let report = coordinator
            .run(&CancellationToken::new(), &RunRequest::default())
            .await
            .unwrap();

        assert_eq!(report.pools_launched, 0);
        assert!(report.records.is_empty());
        assert_eq!(report.persisted, 0);
        assert!(store.batches().is_empty());
    }

    #[tokio::test]
    async fn test_factory_error_fails_run() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])));
        let broken = |_: &SearchQuery| -> Result<Arc<dyn Source>> {
            Err(AppError::selector("li..", "unexpected token"))
        };
        let coordinator = Coordinator::new(store.clone(), vec![Arc::new(broken) as Arc<dyn SourceFactory>], settings(1));

        let err = coordinator
            .run(&CancellationToken::new(), &RunRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Config(_)));
        assert!(store.batches().is_empty());
    }

    #[tokio::test]
    async fn test_run_timeout_abandons_slow_sources() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])));
        let factory = FixtureFactory::with("slow", 1, Vec::new(), Some(Duration::from_secs(30)));
        let coordinator = Coordinator::new(
            store.clone(),
            boards([&factory]),
            RunSettings {
                run_timeout: Some(Duration::from_millis(100)),
                ..settings(5)
            },
        );

        let started = Instant::now();
        let report = coordinator
            .run(&CancellationToken::new(), &RunRequest::default())
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(report.records.is_empty());
        assert!(report.failures.iter().all(|f| f.error.is_cancelled()));
        assert!(store.batches().is_empty());
    }

    #[tokio::test]
    async fn test_pool_cap_still_runs_every_pool() {
        let store = Arc::new(MemoryStore::new(categories(&["A", "B", "C", "D"])));
        let factory = FixtureFactory::with("board", 1, Vec::new(), Some(Duration::from_millis(5)));
        let coordinator = Coordinator::new(
            store,
            boards([&factory]),
            RunSettings {
                max_concurrent_pools: 1,
                ..settings(2)
            },
        );

        let report = coordinator
            .run(&CancellationToken::new(), &RunRequest::default())
            .await
            .unwrap();

        assert_eq!(report.pools_launched, 4);
        assert_eq!(factory.attempts(), 8);
        assert_eq!(report.records.len(), 8);
    }

    #[test]
    fn test_select_categories() {
        let cats = categories(&["Backend", "Frontend", "Data"]);

        assert_eq!(select_categories(cats.clone(), None).unwrap().len(), 3);
        assert_eq!(select_categories(cats.clone(), Some("  ")).unwrap().len(), 3);
        assert_eq!(select_categories(cats.clone(), Some("END")).unwrap().len(), 2);
        assert!(select_categories(cats, Some("ops")).is_err());
    }

    #[tokio::test]
    async fn test_phases_follow_run_lifecycle() {
        let store = Arc::new(MemoryStore::new(categories(&["Go"])));
        let coordinator = Coordinator::new(store, boards([&FixtureFactory::new("board", 1)]), settings(2))
            .with_notifier(Arc::new(RecordingNotifier::default()));

        let quiet = coordinator
            .run(&CancellationToken::new(), &RunRequest::default())
            .await
            .unwrap();
        assert_eq!(
            quiet.phases,
            vec![
                RunPhase::Idle,
                RunPhase::FetchingCategories,
                RunPhase::Scraping,
                RunPhase::Collating,
                RunPhase::Persisting,
                RunPhase::Done,
            ]
        );

        let request = RunRequest {
            notify: true,
            ..RunRequest::default()
        };
        let notified = coordinator
            .run(&CancellationToken::new(), &request)
            .await
            .unwrap();
        assert_eq!(
            &notified.phases[4..],
            &[RunPhase::Persisting, RunPhase::Notifying, RunPhase::Done]
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::FetchingCategories.to_string(), "fetching categories");
        assert_eq!(RunPhase::Done.to_string(), "done");
    }
}
