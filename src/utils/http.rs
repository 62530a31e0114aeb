// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::ScraperConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_client(config: &ScraperConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a page body, abandoning the request if `cancel` fires first.
///
/// Non-2xx responses are reported as fetch errors.
pub async fn fetch_text(
    client: &reqwest::Client,
    cancel: &CancellationToken,
    url: &str,
) -> Result<String> {
    let request = async {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("status {status}")));
        }
        Ok(response.text().await?)
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = request => result,
    }
}
