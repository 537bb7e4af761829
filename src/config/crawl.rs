//! Reference crawler configuration

use serde::{Deserialize, Serialize};

use super::DEFAULT_USER_AGENT;

/// Settings for the bundled fetcher and worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Concurrent fetch workers
    pub workers: usize,
    /// Stop after this many fetched pages (0 = unlimited)
    pub max_pages: usize,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
    /// Connect timeout (seconds)
    pub connect_timeout_secs: u64,
    /// Delay each worker waits between requests (milliseconds)
    pub delay_ms: u64,
    /// Maximum response body kept for extraction (bytes)
    pub max_body_bytes: usize,
    /// User agent string
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_pages: 500,
            request_timeout_secs: 20,
            connect_timeout_secs: 10,
            delay_ms: 100,
            max_body_bytes: 5 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
