//! Utility functions and helpers.

pub mod http;

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static QUERY_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[?&](?:jk|jl|jobId|currentJobId)=([\w-]+)").ok());

static PATH_ID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"/(?:view|listings|jobPosting|jobs/view)/([\w-]+?)/?(?:[?#]|$)").ok()
});

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Collapse runs of whitespace and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract a listing identifier from a URL (looks for common patterns).
pub fn extract_listing_id(url: &str) -> Option<String> {
    for pattern in [&*QUERY_ID, &*PATH_ID].into_iter().flatten() {
        if let Some(id) = pattern.captures(url).and_then(|caps| caps.get(1)) {
            return Some(id.as_str().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "page.html"),
            "https://example.com/path/page.html"
        );
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Senior \n\t Rust   Engineer "), "Senior Rust Engineer");
        assert_eq!(clean_text("   "), "");
    }

    #[test]
    fn test_extract_listing_id() {
        assert_eq!(
            extract_listing_id("https://www.indeed.com/rc/clk?jk=8f2a61c0&from=serp"),
            Some("8f2a61c0".to_string())
        );
        assert_eq!(
            extract_listing_id("https://www.jobberman.com/listings/backend-developer-x7k2lp"),
            Some("backend-developer-x7k2lp".to_string())
        );
        assert_eq!(
            extract_listing_id("https://www.glassdoor.com/job-listing/rust?jl=1009321"),
            Some("1009321".to_string())
        );
        assert_eq!(extract_listing_id("https://example.com/about"), None);
    }
}
