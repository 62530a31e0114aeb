//! Category taxonomy and job-creation commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A taxonomy entry; its name doubles as the search keyword.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

impl Category {
    /// Create a category with a fresh ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// Command submitted to the persister for each scraped record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobCreate {
    pub title: String,
    pub link: String,
    pub date_posted: String,
    pub category_id: Uuid,
    /// Board the job came from
    pub origin: String,
    /// Board-local ID, or a hash of the link
    pub origin_id: String,
}

/// A job as held by the local store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredJob {
    pub id: Uuid,
    #[serde(flatten)]
    pub job: JobCreate,
    pub created_at: DateTime<Utc>,
}

impl From<JobCreate> for StoredJob {
    fn from(job: JobCreate) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            created_at: Utc::now(),
        }
    }
}
