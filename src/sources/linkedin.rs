//! LinkedIn guest jobs API.
//!
//! Search results come back as bare `<li>` fragments; applicant counts and
//! the posting age live on a separate job-posting page fetched per listing.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{CardSelectors, JobDetails, Record};
use crate::sources::{
    CardParser, Pagination, SearchQuery, Source, SourceConfig, element_text, parse_selector,
};
use crate::utils::http::fetch_text;

const SEARCH_URL: &str = "https://www.linkedin.com/jobs-guest/jobs/api/seeMoreJobPostings/search";
const POSTING_URL: &str = "https://www.linkedin.com/jobs-guest/jobs/api/jobPosting/";

const SELECTORS: CardSelectors = CardSelectors::new("li div.base-card", "h3.base-search-card__title")
    .company("h4.base-search-card__subtitle")
    .location("span.job-search-card__location")
    .date("time")
    .link("a.base-card__full-link");

const APPLICANTS_SELECTOR: &str = "span.num-applicants__caption, figcaption.num-applicants__caption";
const POSTED_SELECTOR: &str = "span.posted-time-ago__text";

/// Jobs posted in the last 24 hours.
const POSTED_WITHIN: &str = "r86400";

pub struct LinkedIn {
    client: reqwest::Client,
    config: SourceConfig,
    parser: CardParser,
    applicants: Selector,
    posted: Selector,
    posting_url: String,
    detail_concurrency: usize,
}

impl LinkedIn {
    pub fn new(
        client: reqwest::Client,
        query: &SearchQuery,
        detail_concurrency: usize,
    ) -> Result<Self> {
        let config = SourceConfig::new(SEARCH_URL)?
            .param("location", query.location_param())
            .param("keywords", query.keyword.as_str())
            .param("f_TPR", POSTED_WITHIN)
            .with_page_limit(query.pages);

        Ok(Self {
            client,
            config,
            parser: CardParser::compile(&SELECTORS)?,
            applicants: parse_selector(APPLICANTS_SELECTOR)?,
            posted: parse_selector(POSTED_SELECTOR)?,
            posting_url: POSTING_URL.to_string(),
            detail_concurrency: detail_concurrency.max(1),
        })
    }

    /// Fetch job-posting pages from `base` instead of the guest API.
    ///
    /// The listing ID is appended to `base` as-is.
    pub fn with_posting_url(mut self, base: impl Into<String>) -> Self {
        self.posting_url = base.into();
        self
    }

    /// Parse one page of search results.
    pub fn parse(&self, html: &str, page_url: &Url) -> Vec<Record> {
        self.parser
            .parse_page(html, page_url, self.name(), |card, record| {
                // data-entity-urn="urn:li:jobPosting:3812345678"
                if let Some(urn) = card.value().attr("data-entity-urn") {
                    if let Some((_, id)) = urn.rsplit_once(':') {
                        record.external_id = id.trim().to_string();
                    }
                }
            })
    }

    /// Parse a job-posting page into supplementary fields.
    pub fn parse_details(&self, html: &str) -> JobDetails {
        let document = Html::parse_document(html);
        let text_of = |selector: &Selector| {
            document
                .select(selector)
                .next()
                .map(|e| element_text(&e))
                .filter(|text| !text.is_empty())
        };

        JobDetails {
            applicant_count: text_of(&self.applicants),
            date_posted: text_of(&self.posted),
        }
    }

    async fn with_details(&self, cancel: &CancellationToken, mut record: Record) -> Record {
        if record.external_id.is_empty() {
            return record;
        }

        match self.fetch_details(cancel, &record.external_id).await {
            Ok(details) => details.apply(&mut record),
            Err(e) if e.is_cancelled() => {}
            Err(e) => log::warn!(
                "linkedin: details for listing {} unavailable: {}",
                record.external_id,
                e
            ),
        }
        record
    }
}

#[async_trait]
impl Source for LinkedIn {
    fn name(&self) -> &str {
        "linkedin"
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn pagination(&self) -> Pagination {
        Pagination::Offset {
            param: "start",
            stride: 25,
        }
    }

    async fn fetch_page(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<Record>> {
        let page_url = Url::parse(url)?;
        let html = fetch_text(&self.client, cancel, url).await?;
        let records = self.parse(&html, &page_url);

        let detailed: Vec<Record> = stream::iter(records)
            .map(|record| self.with_details(cancel, record))
            .buffered(self.detail_concurrency)
            .collect()
            .await;
        Ok(detailed)
    }

    async fn fetch_details(
        &self,
        cancel: &CancellationToken,
        external_id: &str,
    ) -> Result<JobDetails> {
        let url = format!("{}{}", self.posting_url, external_id);
        let html = fetch_text(&self.client, cancel, &url).await?;
        Ok(self.parse_details(&html))
    }
}
