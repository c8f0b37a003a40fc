//! REST fetcher backing fallback polling.

use crate::error::{MonitorError, MonitorResult};
use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::debug;

/// Fetches the current resource state as JSON.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> MonitorResult<Self> {
        pulse_stream::init_crypto();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Http(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the resource; non-2xx responses are errors.
    pub async fn fetch(&self) -> Result<serde_json::Value, reqwest::Error> {
        debug!(url = %self.url, "Fetching fallback snapshot");
        self.client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}
