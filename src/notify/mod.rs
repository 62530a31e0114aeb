//! Job digest rendering and delivery.
//!
//! The coordinator hands the full record list of a run to a [`Notifier`]
//! after persistence; delivery failures are logged by the caller and never
//! fail the run.

mod outbox;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::Result;
use crate::models::{NotifyConfig, Record};

pub use outbox::OutboxNotifier;

const DEFAULT_TEMPLATE: &str = include_str!("../../templates/digest.html");

/// Delivers a digest of scraped records to one recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_digest(&self, recipient: &str, records: &[Record]) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct DigestSection<'a> {
    category: &'a str,
    jobs: Vec<&'a Record>,
}

/// Renders records into an HTML digest grouped by category.
#[derive(Debug, Clone)]
pub struct DigestRenderer {
    template: String,
}

impl Default for DigestRenderer {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl DigestRenderer {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Load a Tera template from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(std::fs::read_to_string(path)?))
    }

    /// Built-in template unless the config names an override.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        match &config.template {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn render(&self, records: &[Record]) -> Result<String> {
        let mut grouped: BTreeMap<&str, Vec<&Record>> = BTreeMap::new();
        for record in records {
            let category = if record.category_name.is_empty() {
                "Uncategorized"
            } else {
                record.category_name.as_str()
            };
            grouped.entry(category).or_default().push(record);
        }

        let sections: Vec<DigestSection<'_>> = grouped
            .into_iter()
            .map(|(category, jobs)| DigestSection { category, jobs })
            .collect();

        let mut context = Context::new();
        context.insert("sections", &sections);
        context.insert("total", &records.len());
        context.insert("generated_on", &Utc::now().format("%Y-%m-%d").to_string());

        Ok(Tera::one_off(&self.template, &context, true)?)
    }
}
