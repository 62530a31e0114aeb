//! Indeed job search.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{CardSelectors, Record};
use crate::sources::{CardParser, Pagination, SearchQuery, Source, SourceConfig};
use crate::utils::extract_listing_id;
use crate::utils::http::fetch_text;

const SEARCH_URL: &str = "https://www.indeed.com/jobs";

const SELECTORS: CardSelectors = CardSelectors::new("div.job_seen_beacon", "h2.jobTitle span")
    .company("span.companyName")
    .location("div.companyLocation")
    .date("span.date")
    .link("a.jcs-JobTitle");

pub struct Indeed {
    client: reqwest::Client,
    config: SourceConfig,
    parser: CardParser,
    link: scraper::Selector,
}

impl Indeed {
    pub fn new(client: reqwest::Client, query: &SearchQuery) -> Result<Self> {
        let config = SourceConfig::new(SEARCH_URL)?
            .param("q", query.keyword.as_str())
            .param("l", query.location_param())
            .with_page_limit(query.pages);

        Ok(Self {
            client,
            config,
            parser: CardParser::compile(&SELECTORS)?,
            link: super::parse_selector("a.jcs-JobTitle")?,
        })
    }

    /// Parse one page of search results.
    pub fn parse(&self, html: &str, page_url: &Url) -> Vec<Record> {
        self.parser
            .parse_page(html, page_url, self.name(), |card, record| {
                record.external_id = card
                    .select(&self.link)
                    .next()
                    .and_then(|a| a.value().attr("data-jk"))
                    .map(str::to_string)
                    .or_else(|| extract_listing_id(&record.url))
                    .unwrap_or_default();
            })
    }
}

#[async_trait]
impl Source for Indeed {
    fn name(&self) -> &str {
        "indeed"
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn pagination(&self) -> Pagination {
        Pagination::Offset {
            param: "start",
            stride: 10,
        }
    }

    async fn fetch_page(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<Record>> {
        let page_url = Url::parse(url)?;
        let html = fetch_text(&self.client, cancel, url).await?;
        Ok(self.parse(&html, &page_url))
    }
}
