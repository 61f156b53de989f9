//! An [`ImageSource`] over HTTP with bounded retries.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use rand::Rng;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;

use crate::catalog::ImageSource;
use crate::error::{Error, Result};

/// Retry behaviour for [`HttpImageSource`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Fetches image bytes with `reqwest`, retrying transport errors and
/// retryable statuses with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: Client,
    retry: RetryConfig,
}

impl HttpImageSource {
    pub fn new() -> Result<Self> {
        Self::with_config(RetryConfig::default())
    }

    pub fn with_config(retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(retry.timeout)
            .user_agent(concat!("tankobon/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, retry })
    }

    /// Wraps an existing client, sharing its connection pool.
    pub fn with_client(client: Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let base = self.retry.initial_delay.as_millis() as u64;
        let max = self.retry.max_delay.as_millis() as u64;
        let delay = base.saturating_mul(1u64 << attempt.min(16)).min(max);

        // +-25% jitter
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((delay as f64 * jitter) as u64)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            let failure = match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    match response.bytes().await {
                        Ok(body) => {
                            debug!("Fetched {} ({} bytes)", url, body.len());
                            return Ok(body.to_vec());
                        }
                        Err(e) => e.to_string(),
                    }
                }
                Ok(response) if is_retryable(response.status()) => response.status().to_string(),
                Ok(response) => {
                    return Err(Error::Fetch {
                        url: url.to_string(),
                        reason: response.status().to_string(),
                    });
                }
                Err(e) => e.to_string(),
            };

            if attempt >= self.retry.max_retries {
                return Err(Error::Fetch {
                    url: url.to_string(),
                    reason: failure,
                });
            }
            let delay = self.retry_delay(attempt);
            warn!(
                "Fetching {} failed ({}), retrying in {:?}",
                url, failure, delay
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
