//! Crawl report written as JSON

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::discovery::{AssetRecord, PatternSummary, PostEndpoint};
use crate::types::{ResourceKind, UrlType};

/// One fetched GET endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointRecord {
    pub url: String,
    pub method: String,
    pub kind: Option<ResourceKind>,
    pub url_type: Option<UrlType>,
    /// `None` when the request failed before a response arrived
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub param_names: Vec<String>,
    pub score: Option<f64>,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a crawl found
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub seeds: Vec<String>,
    pub duration_ms: u64,
    pub pages_fetched: usize,
    pub endpoints: Vec<EndpointRecord>,
    pub post_endpoints: Vec<PostEndpoint>,
    pub assets: Vec<AssetRecord>,
    pub patterns: Vec<PatternSummary>,
    pub stats: BTreeMap<String, u64>,
}

impl CrawlReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize crawl report")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write report '{}'", path.display()))
    }

    /// Endpoints grouped by response status, for the summary line
    pub fn status_histogram(&self) -> BTreeMap<String, usize> {
        let mut histogram = BTreeMap::new();
        for endpoint in &self.endpoints {
            let key = endpoint
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "error".to_string());
            *histogram.entry(key).or_insert(0) += 1;
        }
        histogram
    }
}
