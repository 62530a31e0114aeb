//! Glassdoor job search.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{CardSelectors, Record};
use crate::sources::{CardParser, Pagination, SearchQuery, Source, SourceConfig};
use crate::utils::extract_listing_id;
use crate::utils::http::fetch_text;

const SEARCH_URL: &str = "https://www.glassdoor.com/Job/jobs.htm";

const SELECTORS: CardSelectors = CardSelectors::new("li.JobList__jobItem", "a.JobCard_jobTitle")
    .company("div.JobCard_jobEmployerName")
    .location("div.JobCard_jobLocation");

pub struct Glassdoor {
    client: reqwest::Client,
    config: SourceConfig,
    parser: CardParser,
}

impl Glassdoor {
    pub fn new(client: reqwest::Client, query: &SearchQuery) -> Result<Self> {
        let config = SourceConfig::new(SEARCH_URL)?
            .param("sc.keyword", query.keyword.as_str())
            .param("locKeyword", query.location_param())
            .with_page_limit(query.pages);

        Ok(Self {
            client,
            config,
            parser: CardParser::compile(&SELECTORS)?,
        })
    }

    /// Parse one page of search results.
    pub fn parse(&self, html: &str, page_url: &Url) -> Vec<Record> {
        self.parser
            .parse_page(html, page_url, self.name(), |card, record| {
                record.external_id = card
                    .value()
                    .attr("data-jobid")
                    .map(str::to_string)
                    .or_else(|| extract_listing_id(&record.url))
                    .unwrap_or_default();
            })
    }
}

#[async_trait]
impl Source for Glassdoor {
    fn name(&self) -> &str {
        "glassdoor"
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn pagination(&self) -> Pagination {
        Pagination::PageNumber { param: "p" }
    }

    async fn fetch_page(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<Record>> {
        let page_url = Url::parse(url)?;
        let html = fetch_text(&self.client, cancel, url).await?;
        Ok(self.parse(&html, &page_url))
    }
}
