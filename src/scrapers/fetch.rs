use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::shutdown::Cancellation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    EmptyUrl,
    Transport(String),
    Timeout,
    Status(u16),
    Cancelled,
}

impl FetchError {
    /// Only transport failures and timeouts are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Timeout)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::EmptyUrl => "empty_url",
            FetchError::Transport(_) => "transport",
            FetchError::Timeout => "timeout",
            FetchError::Status(_) => "http_status",
            FetchError::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::EmptyUrl => write!(f, "Price URL is not configured"),
            FetchError::Transport(msg) => write!(f, "Transport error: {}", msg),
            FetchError::Timeout => write!(f, "Request timed out"),
            FetchError::Status(code) => write!(f, "HTTP error: {}", code),
            FetchError::Cancelled => write!(f, "Request cancelled"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Fetches a price page as text. One attempt per call; retry lives in [`fetch_with_retry`].
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (compatible; gold-tracker/0.1)")
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        Ok(response.text().await?)
    }
}

/// GET `url` with up to `attempts` tries.
///
/// The delay before retry `n` is `base_delay * 2^(n-1)`. HTTP status errors
/// are returned immediately, and cancellation aborts both the request in
/// flight and any pending backoff.
pub async fn fetch_with_retry(
    fetcher: &dyn HttpFetcher,
    url: &str,
    timeout: Duration,
    attempts: u32,
    base_delay: Duration,
    cancel: &Cancellation,
) -> Result<String, FetchError> {
    if url.trim().is_empty() {
        return Err(FetchError::EmptyUrl);
    }

    let attempts = attempts.max(1);

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let result = tokio::select! {
            result = fetcher.get(url, timeout) => result,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };

        match result {
            Ok(body) => {
                debug!(url, attempt, bytes = body.len(), "Fetched payload");
                return Ok(body);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
                warn!(url, attempt, max = attempts, ?delay, error = %e, "Fetch failed, retrying");
                if !cancel.sleep(delay).await {
                    return Err(FetchError::Cancelled);
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(FetchError::Cancelled)
}
