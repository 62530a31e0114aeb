// src/models/selectors.rs

//! CSS selectors describing one board's listing card.

/// CSS selectors for scraping a listing page.
///
/// Every selector except `card` is evaluated relative to a card element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardSelectors {
    /// Selector for each listing card on the page
    pub card: &'static str,

    /// Selector for the title element within a card
    pub title: &'static str,

    /// Selector for the company name within a card
    pub company: Option<&'static str>,

    /// Selector for the location within a card
    pub location: Option<&'static str>,

    /// Selector for the posting date within a card
    pub date: Option<&'static str>,

    /// Selector for the link element (title element if absent)
    pub link: Option<&'static str>,

    /// HTML attribute name for extracting links (usually "href")
    pub link_attr: &'static str,
}

impl CardSelectors {
    /// Selectors with only card and title set; link taken from the title.
    pub const fn new(card: &'static str, title: &'static str) -> Self {
        Self {
            card,
            title,
            company: None,
            location: None,
            date: None,
            link: None,
            link_attr: "href",
        }
    }

    pub const fn company(mut self, selector: &'static str) -> Self {
        self.company = Some(selector);
        self
    }

    pub const fn location(mut self, selector: &'static str) -> Self {
        self.location = Some(selector);
        self
    }

    pub const fn date(mut self, selector: &'static str) -> Self {
        self.date = Some(selector);
        self
    }

    pub const fn link(mut self, selector: &'static str) -> Self {
        self.link = Some(selector);
        self
    }
}
