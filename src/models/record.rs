//! Normalized job record data structure.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Category, JobCreate};

/// A job listing parsed from one board page.
///
/// Sources fill everything except the category fields, which are stamped by
/// the coordinator from the category that drove the scrape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record {
    /// Board-local identifier (empty if the board exposes none)
    #[serde(default)]
    pub external_id: String,

    /// Listing title
    pub title: String,

    /// Hiring company
    #[serde(default)]
    pub company_name: String,

    /// Free-text location
    #[serde(default)]
    pub location: String,

    /// Free-text posting date ("2 days ago", "2025-01-04", ...)
    #[serde(default)]
    pub date_posted: String,

    /// Applicant count, for boards that publish it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_count: Option<String>,

    /// Absolute URL of the listing
    pub url: String,

    /// Origin board label
    #[serde(default)]
    pub source: String,

    /// Category name, stamped after collation
    #[serde(default)]
    pub category_name: String,

    /// Category ID, stamped after collation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
}

impl Record {
    /// A record is usable only with a title and a link.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty()
    }

    /// Attach the originating category.
    pub fn stamp(&mut self, category: &Category) {
        self.category_name = category.name.clone();
        self.category_id = Some(category.id);
    }

    /// Identifier stored as the job's origin ID.
    ///
    /// Falls back to a SHA-256 of the URL when the board gave no ID.
    pub fn origin_id(&self) -> String {
        if !self.external_id.is_empty() {
            return self.external_id.clone();
        }
        let digest = Sha256::digest(self.url.as_bytes());
        hex::encode(digest)
    }

    /// Convert into a job-creation command.
    ///
    /// Fails if the record has not been stamped with a category.
    pub fn to_job_create(&self) -> Result<JobCreate> {
        let category_id = self.category_id.ok_or_else(|| {
            AppError::validation(format!("record '{}' has no category", self.title))
        })?;

        Ok(JobCreate {
            title: self.title.clone(),
            link: self.url.clone(),
            date_posted: self.date_posted.clone(),
            category_id,
            origin: self.source.clone(),
            origin_id: self.origin_id(),
        })
    }
}

/// Supplementary fields some boards fetch per listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobDetails {
    pub applicant_count: Option<String>,
    pub date_posted: Option<String>,
}

impl JobDetails {
    pub fn is_empty(&self) -> bool {
        self.applicant_count.is_none() && self.date_posted.is_none()
    }

    /// Merge into a record; fields the details lack are left untouched.
    pub fn apply(self, record: &mut Record) {
        if let Some(count) = self.applicant_count {
            record.applicant_count = Some(count);
        }
        if let Some(date) = self.date_posted {
            record.date_posted = date;
        }
    }
}
