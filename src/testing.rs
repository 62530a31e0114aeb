//! In-memory collaborators for pipeline tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{Category, JobCreate, Record};
use crate::notify::Notifier;
use crate::sources::{Pagination, SearchQuery, Source, SourceConfig};
use crate::storage::JobStore;

/// Answer the next HTTP request on a local port with a canned response.
///
/// Returns the base URL of the listener.
pub(crate) async fn serve_once(status: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    format!("http://{}", addr)
}

/// Client that never goes through an environment proxy.
pub(crate) fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Source serving synthetic pages without touching the network.
///
/// Record titles embed the search keyword, so tests can check which
/// category a record was scraped for.
pub(crate) struct FixtureSource {
    name: String,
    keyword: String,
    config: SourceConfig,
    per_page: usize,
    failing: HashSet<u32>,
    delay: Option<Duration>,
    attempts: Mutex<Vec<u32>>,
}

impl FixtureSource {
    pub(crate) fn new(name: &str, per_page: usize) -> Self {
        Self::for_query(name, &SearchQuery::new("fixture"), per_page)
    }

    pub(crate) fn for_query(name: &str, query: &SearchQuery, per_page: usize) -> Self {
        let config = SourceConfig::new(&format!("https://{}.test/jobs", name))
            .map(|c| c.param("q", query.keyword.as_str()).with_page_limit(query.pages))
            .unwrap();

        Self {
            name: name.to_string(),
            keyword: query.keyword.clone(),
            config,
            per_page,
            failing: HashSet::new(),
            delay: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_on(mut self, pages: impl IntoIterator<Item = u32>) -> Self {
        self.failing.extend(pages);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pages fetched so far, in attempt order.
    pub(crate) fn attempts(&self) -> Vec<u32> {
        self.attempts.lock().unwrap().clone()
    }

    fn page_of(url: &str) -> u32 {
        Url::parse(url)
            .ok()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "page")
                    .and_then(|(_, v)| v.parse().ok())
            })
            .unwrap_or(1)
    }
}

#[async_trait]
impl Source for FixtureSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn pagination(&self) -> Pagination {
        Pagination::PageNumber { param: "page" }
    }

    async fn fetch_page(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<Record>> {
        let page = Self::page_of(url);
        self.attempts.lock().unwrap().push(page);

        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if self.failing.contains(&page) {
            return Err(AppError::fetch(url, "status 503 Service Unavailable"));
        }

        Ok((0..self.per_page)
            .map(|i| Record {
                external_id: format!("{}-{}-{}", self.keyword, page, i),
                title: format!("{} job {}-{}", self.keyword, page, i),
                url: format!("https://{}.test/{}/{}/{}", self.name, self.keyword, page, i),
                source: self.name.clone(),
                ..Default::default()
            })
            .collect())
    }
}

/// Store holding categories and recording every submitted batch.
pub(crate) struct MemoryStore {
    categories: Vec<Category>,
    categories_error: Option<String>,
    batch_error: Option<String>,
    batches: Mutex<Vec<Vec<JobCreate>>>,
}

impl MemoryStore {
    pub(crate) fn new(categories: Vec<Category>) -> Self {
        Self {
            categories,
            categories_error: None,
            batch_error: None,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            categories_error: Some("connection refused".to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn rejecting_batches(mut self) -> Self {
        self.batch_error = Some("constraint violation".to_string());
        self
    }

    pub(crate) fn batches(&self) -> Vec<Vec<JobCreate>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_categories(&self) -> Result<Vec<Category>> {
        match &self.categories_error {
            Some(message) => Err(AppError::store(message)),
            None => Ok(self.categories.clone()),
        }
    }

    async fn batch_create_jobs(&self, jobs: &[JobCreate]) -> Result<()> {
        if let Some(message) = &self.batch_error {
            return Err(AppError::store(message));
        }
        self.batches.lock().unwrap().push(jobs.to_vec());
        Ok(())
    }
}

/// Notifier recording digests, optionally failing every delivery.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    fail: bool,
    sent: Mutex<Vec<(String, usize)>>,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// (recipient, record count) per delivered digest.
    pub(crate) fn sent(&self) -> Vec<(String, usize)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_digest(&self, recipient: &str, records: &[Record]) -> Result<()> {
        if self.fail {
            return Err(AppError::notify("smtp: 535 authentication failed"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), records.len()));
        Ok(())
    }
}
