//! Jobberman listings.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{CardSelectors, Record};
use crate::sources::{CardParser, Pagination, SearchQuery, Source, SourceConfig};
use crate::utils::extract_listing_id;
use crate::utils::http::fetch_text;

const SEARCH_URL: &str = "https://www.jobberman.com/jobs";

const SELECTORS: CardSelectors = CardSelectors::new(
    "div[data-cy='listing-cards-components']",
    "a[data-cy='listing-title-link'] p",
)
.company("p.text-sm.text-link-500")
.location("div.flex.flex-wrap.mt-3 span:first-child")
.link("a[data-cy='listing-title-link']");

pub struct Jobberman {
    client: reqwest::Client,
    config: SourceConfig,
    parser: CardParser,
}

impl Jobberman {
    pub fn new(client: reqwest::Client, query: &SearchQuery) -> Result<Self> {
        let config = SourceConfig::new(SEARCH_URL)?
            .param("q", query.keyword.as_str())
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
            .parse_page(html, page_url, self.name(), |_, record| {
                // https://www.jobberman.com/listings/<slug>
                record.external_id = extract_listing_id(&record.url).unwrap_or_default();
            })
    }
}

#[async_trait]
impl Source for Jobberman {
    fn name(&self) -> &str {
        "jobberman"
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
