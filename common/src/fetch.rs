// Ticket page retrieval over HTTP

use crate::config::{RetryConfig, TargetConfig};
use crate::errors::FetchError;
use crate::models::PageSnapshot;
use crate::retry::{ExponentialBackoff, NoRetry, RetryStrategy};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use std::sync::Arc;
use std::time::Duration;

/// PageFetcher retrieves the current contents of a page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageSnapshot, FetchError>;
}

/// HttpPageFetcher fetches pages with a browser-like user agent
pub struct HttpPageFetcher {
    client: Client,
    retry: Arc<dyn RetryStrategy>,
}

impl HttpPageFetcher {
    /// Create a fetcher that never retries
    pub fn new(config: &TargetConfig) -> Result<Self, FetchError> {
        Self::with_retry(config, Arc::new(NoRetry))
    }

    /// Create a fetcher with a custom retry strategy
    pub fn with_retry(
        config: &TargetConfig,
        retry: Arc<dyn RetryStrategy>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;

        Ok(Self { client, retry })
    }

    pub fn from_settings(
        target: &TargetConfig,
        retry: &RetryConfig,
    ) -> Result<Self, FetchError> {
        Self::with_retry(target, Arc::new(ExponentialBackoff::from_config(retry)))
    }

    async fn fetch_once(&self, url: &str) -> Result<PageSnapshot, FetchError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        tracing::info!(status = status.as_u16(), "Ticket page responded");

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(PageSnapshot {
            url: url.to_string(),
            status_code: status.as_u16(),
            body,
            fetched_at: Utc::now(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<PageSnapshot, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(snapshot) => {
                    tracing::debug!(bytes = snapshot.body.len(), attempt, "Fetched ticket page");
                    return Ok(snapshot);
                }
                Err(e) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            error = %e,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Ticket page fetch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None if self.retry.max_attempts() > 1 => {
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: attempt + 1,
                            last_error: e.to_string(),
                        });
                    }
                    None => return Err(e),
                },
            }
        }
    }
}
