//! Job board sources.
//!
//! Each board implements [`Source`]: it knows its own request template,
//! pagination convention and card markup. Nothing outside this module
//! branches on which board it is talking to; the coordinator only sees
//! `Arc<dyn Source>` values built by a [`SourceFactory`].
//!
//! - `LinkedIn`: guest jobs API, offset pagination, per-listing details
//! - `Jobberman`: page-number pagination
//! - `Glassdoor`: page-number pagination
//! - `Indeed`: offset pagination

mod glassdoor;
mod indeed;
mod jobberman;
mod linkedin;

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{BoardKind, CardSelectors, JobDetails, Record, ScraperConfig};
use crate::utils::{clean_text, resolve_url};

pub use glassdoor::Glassdoor;
pub use indeed::Indeed;
pub use jobberman::Jobberman;
pub use linkedin::LinkedIn;

/// Page count used when a query does not set one.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;

/// What a source instance searches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Search keyword (the category name in category-aware runs)
    pub keyword: String,
    /// Optional location filter
    pub location: Option<String>,
    /// Pages to scrape
    pub pages: u32,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            location: None,
            pages: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = pages;
        self
    }

    fn location_param(&self) -> String {
        self.location.clone().unwrap_or_default()
    }
}

/// Request template of one source instance.
///
/// Built once per (board, category) pair and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    base_url: Url,
    params: Vec<(String, String)>,
    page_limit: u32,
}

impl SourceConfig {
    /// Parse the base URL of a board.
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url)?,
            params: Vec::new(),
            page_limit: DEFAULT_PAGE_LIMIT,
        })
    }

    /// Append a query parameter; empty values are dropped when building URLs.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn page_limit(&self) -> u32 {
        self.page_limit
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The un-paginated search request.
    pub fn base_request(&self) -> Url {
        let mut url = self.base_url.clone();
        let params: Vec<_> = self
            .params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .collect();

        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
        }
        url
    }
}

/// How a board maps a 1-based page index onto its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `param=k` for page k
    PageNumber { param: &'static str },
    /// Page 1 is the bare request; page k adds `param=(k-1)*stride`
    Offset { param: &'static str, stride: u32 },
}

impl Pagination {
    pub fn page_url(&self, config: &SourceConfig, page: u32) -> String {
        let mut url = config.base_request();
        match *self {
            Pagination::PageNumber { param } => {
                url.query_pairs_mut().append_pair(param, &page.to_string());
            }
            Pagination::Offset { param, stride } => {
                let offset = u64::from(page.saturating_sub(1)) * u64::from(stride);
                if offset > 0 {
                    url.query_pairs_mut().append_pair(param, &offset.to_string());
                }
            }
        }
        url.to_string()
    }
}

/// A job board the worker pool can scrape.
#[async_trait]
pub trait Source: Send + Sync {
    /// Origin label stored with every job from this source.
    fn name(&self) -> &str;

    /// Request template of this instance.
    fn config(&self) -> &SourceConfig;

    /// Pagination convention of the board.
    fn pagination(&self) -> Pagination;

    /// URL of a 1-based page index.
    fn page_url(&self, page: u32) -> String {
        self.pagination().page_url(self.config(), page)
    }

    /// Pages a pool should scrape for this instance.
    fn page_limit(&self) -> u32 {
        self.config().page_limit()
    }

    /// Fetch and parse one listing page.
    ///
    /// A page without listings is `Ok(vec![])`; only network, status and
    /// selector problems are errors.
    async fn fetch_page(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<Record>>;

    /// Fetch supplementary fields for one listing. Most boards have none.
    async fn fetch_details(
        &self,
        _cancel: &CancellationToken,
        _external_id: &str,
    ) -> Result<JobDetails> {
        Ok(JobDetails::default())
    }
}

/// Builds a source instance for one search query.
pub trait SourceFactory: Send + Sync {
    fn build(&self, query: &SearchQuery) -> Result<Arc<dyn Source>>;
}

impl<F> SourceFactory for F
where
    F: Fn(&SearchQuery) -> Result<Arc<dyn Source>> + Send + Sync,
{
    fn build(&self, query: &SearchQuery) -> Result<Arc<dyn Source>> {
        self(query)
    }
}

/// Factory for one of the built-in boards.
pub struct BoardFactory {
    kind: BoardKind,
    client: reqwest::Client,
    detail_concurrency: usize,
}

impl BoardFactory {
    pub fn new(kind: BoardKind, client: reqwest::Client, config: &ScraperConfig) -> Self {
        Self {
            kind,
            client,
            detail_concurrency: config.detail_concurrency.max(1),
        }
    }
}

impl SourceFactory for BoardFactory {
    fn build(&self, query: &SearchQuery) -> Result<Arc<dyn Source>> {
        let client = self.client.clone();
        let source: Arc<dyn Source> = match self.kind {
            BoardKind::LinkedIn => Arc::new(LinkedIn::new(client, query, self.detail_concurrency)?),
            BoardKind::Jobberman => Arc::new(Jobberman::new(client, query)?),
            BoardKind::Glassdoor => Arc::new(Glassdoor::new(client, query)?),
            BoardKind::Indeed => Arc::new(Indeed::new(client, query)?),
        };
        Ok(source)
    }
}

/// Factories for every enabled board, sharing one HTTP client.
pub fn board_factories(
    kinds: &[BoardKind],
    client: &reqwest::Client,
    config: &ScraperConfig,
) -> Vec<Arc<dyn SourceFactory>> {
    kinds
        .iter()
        .map(|&kind| {
            Arc::new(BoardFactory::new(kind, client.clone(), config)) as Arc<dyn SourceFactory>
        })
        .collect()
}

/// Compiled form of [`CardSelectors`].
#[derive(Debug)]
pub(crate) struct CardParser {
    card: Selector,
    title: Selector,
    company: Option<Selector>,
    location: Option<Selector>,
    date: Option<Selector>,
    link: Option<Selector>,
    link_attr: &'static str,
}

impl CardParser {
    pub(crate) fn compile(selectors: &CardSelectors) -> Result<Self> {
        let optional = |s: Option<&str>| s.map(parse_selector).transpose();
        Ok(Self {
            card: parse_selector(selectors.card)?,
            title: parse_selector(selectors.title)?,
            company: optional(selectors.company)?,
            location: optional(selectors.location)?,
            date: optional(selectors.date)?,
            link: optional(selectors.link)?,
            link_attr: selectors.link_attr,
        })
    }

    /// Parse every card of a page.
    ///
    /// `identify` fills the board-specific external ID. Cards missing a title
    /// or link are dropped.
    pub(crate) fn parse_page<F>(
        &self,
        html: &str,
        base_url: &Url,
        source: &str,
        mut identify: F,
    ) -> Vec<Record>
    where
        F: FnMut(&ElementRef<'_>, &mut Record),
    {
        let document = Html::parse_document(html);
        let mut records = Vec::new();
        let mut discarded = 0usize;

        for card in document.select(&self.card) {
            let mut record = self.parse_card(&card, base_url);
            record.source = source.to_string();
            identify(&card, &mut record);

            if record.is_valid() {
                records.push(record);
            } else {
                discarded += 1;
            }
        }

        if discarded > 0 {
            log::debug!(
                "{}: discarded {} incomplete listing(s) on {}",
                source,
                discarded,
                base_url
            );
        }
        records
    }

    fn parse_card(&self, card: &ElementRef<'_>, base_url: &Url) -> Record {
        let title_elem = card.select(&self.title).next();
        let link_elem = self
            .link
            .as_ref()
            .and_then(|sel| card.select(sel).next())
            .or(title_elem);
        let raw_link = link_elem
            .and_then(|e| e.value().attr(self.link_attr))
            .unwrap_or("")
            .trim();

        Record {
            title: title_elem.map(|e| element_text(&e)).unwrap_or_default(),
            company_name: select_text(card, self.company.as_ref()),
            location: select_text(card, self.location.as_ref()),
            date_posted: select_text(card, self.date.as_ref()),
            url: if raw_link.is_empty() {
                String::new()
            } else {
                resolve_url(base_url, raw_link)
            },
            ..Record::default()
        }
    }
}

fn select_text(card: &ElementRef<'_>, selector: Option<&Selector>) -> String {
    selector
        .and_then(|sel| card.select(sel).next())
        .map(|e| element_text(&e))
        .unwrap_or_default()
}

pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    clean_text(&raw)
}

pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
