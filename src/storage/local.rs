//! Local filesystem job store.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── categories.json       # [{ "id", "name" }]
//! └── jobs.json             # [{ "id", "title", "link", ..., "created_at" }]
//! ```
//!
//! Writes go to a temp file and are renamed into place; a lock serializes
//! read-modify-write cycles within the process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Category, JobCreate, StoredJob};
use crate::storage::JobStore;

const CATEGORIES_KEY: &str = "categories.json";
const JOBS_KEY: &str = "jobs.json";

/// Local filesystem storage backend.
pub struct LocalStore {
    root_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Create a new LocalStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Add a category, or return the existing one with the same name.
    pub async fn create_category(&self, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("category name must not be empty"));
        }

        let _guard = self.write_lock.lock().await;
        let mut categories: Vec<Category> =
            self.read_json(CATEGORIES_KEY).await?.unwrap_or_default();

        if let Some(existing) = categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        {
            return Ok(existing.clone());
        }

        let category = Category::new(name);
        categories.push(category.clone());
        self.write_json(CATEGORIES_KEY, &categories).await?;
        log::info!("Created category '{}' ({})", category.name, category.id);

        Ok(category)
    }

    /// Every persisted job, oldest first.
    pub async fn list_jobs(&self) -> Result<Vec<StoredJob>> {
        Ok(self.read_json(JOBS_KEY).await?.unwrap_or_default())
    }
}

#[async_trait]
impl JobStore for LocalStore {
    async fn get_categories(&self) -> Result<Vec<Category>> {
        match self.read_json::<Vec<Category>>(CATEGORIES_KEY).await {
            Ok(Some(categories)) => Ok(categories),
            Ok(None) => {
                log::warn!("No {} found in {}", CATEGORIES_KEY, self.root_dir.display());
                Ok(Vec::new())
            }
            Err(e) => Err(AppError::store(format!("failed to load categories: {}", e))),
        }
    }

    async fn batch_create_jobs(&self, jobs: &[JobCreate]) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut stored: Vec<StoredJob> = self
            .read_json(JOBS_KEY)
            .await
            .map_err(|e| AppError::store(format!("failed to load jobs: {}", e)))?
            .unwrap_or_default();

        stored.extend(jobs.iter().cloned().map(StoredJob::from));
        self.write_json(JOBS_KEY, &stored)
            .await
            .map_err(|e| AppError::store(format!("failed to write jobs: {}", e)))?;

        log::info!("Persisted {} jobs ({} total)", jobs.len(), stored.len());
        Ok(())
    }
}
