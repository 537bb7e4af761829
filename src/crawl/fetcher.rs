//! HTTP fetch engine for the reference crawler
//!
//! Non-2xx responses are results, not errors: a 403 or 500 still tells the
//! admission core something about its pattern. Redirects are not followed;
//! the `Location` header is extracted and admitted like any other link, so
//! no request ever leaves the configured scope.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::config::CrawlConfig;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
}

/// Result of a completed request
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched URL
    pub final_url: Url,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub content_type: String,
    pub fetch_duration: Duration,
}

impl FetchResult {
    pub fn is_html(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.contains("text/html") || ct.contains("application/xhtml")
    }

    pub fn is_javascript(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        ct.contains("javascript") || ct.contains("ecmascript")
    }

    pub fn is_css(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("text/css")
    }

    pub fn is_json(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("json")
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.fetch_duration.as_millis() as u64
    }
}

/// Fetch counters, updated lock-free
#[derive(Debug, Default)]
pub struct FetchStats {
    pub total_fetches: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub bytes: AtomicU64,
}

/// Thin reqwest wrapper shared by all crawl workers
pub struct FetchEngine {
    http_client: reqwest::Client,
    max_body_bytes: usize,
    stats: FetchStats,
}

impl FetchEngine {
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http_client,
            max_body_bytes: config.max_body_bytes,
            stats: FetchStats::default(),
        })
    }

    /// GET an absolute URL
    pub async fn fetch(&self, url: &Url) -> Result<FetchResult, FetchError> {
        self.stats.total_fetches.fetch_add(1, Ordering::Relaxed);
        let result = self.fetch_http(url).await;
        match &result {
            Ok(r) => {
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes.fetch_add(r.body.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::debug!("Fetch of {} failed: {}", url, e);
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    async fn fetch_http(&self, url: &Url) -> Result<FetchResult, FetchError> {
        let start = Instant::now();

        let mut response = self.http_client.get(url.as_str()).send().await?;

        let status = response.status();
        let final_url = response.url().clone();

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if let Some(len) = response.content_length() {
            if len as usize > self.max_body_bytes {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }

        // Stream so chunked responses without a length stay bounded too
        let mut buffer = BodyBuffer::new(self.max_body_bytes);
        while let Some(chunk) = response.chunk().await? {
            if !buffer.push(&chunk) {
                break;
            }
        }
        let body = buffer.into_text();

        Ok(FetchResult {
            final_url: Url::parse(final_url.as_str())
                .map_err(|e| FetchError::InvalidUrl(e.to_string()))?,
            status_code: status.as_u16(),
            headers,
            body,
            content_type,
            fetch_duration: start.elapsed(),
        })
    }

    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }
}

/// Response body accumulated up to a byte limit
struct BodyBuffer {
    bytes: Vec<u8>,
    max: usize,
}

impl BodyBuffer {
    fn new(max: usize) -> Self {
        Self {
            bytes: Vec::new(),
            max,
        }
    }

    /// Append a chunk. Returns false once the limit is reached.
    fn push(&mut self, chunk: &[u8]) -> bool {
        let room = self.max.saturating_sub(self.bytes.len());
        let take = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..take]);
        self.bytes.len() < self.max
    }

    /// Decode as UTF-8, dropping a character cut by the limit
    fn into_text(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(e) => {
                let error = e.utf8_error();
                let mut bytes = e.into_bytes();
                if error.error_len().is_none() {
                    bytes.truncate(error.valid_up_to());
                }
                String::from_utf8_lossy(&bytes).into_owned()
            }
        }
    }
}
