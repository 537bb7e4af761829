//! Admission pipeline configuration: scope, dedup, scoring, quality, traps

use serde::{Deserialize, Serialize};
use url::Url;

/// Scope rules applied to every canonical URL
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Hosts to include (exact, or `*.suffix` wildcard). Empty = any host.
    pub include_domains: Vec<String>,
    /// Hosts to exclude (same syntax as include)
    pub exclude_domains: Vec<String>,
    /// Path patterns to include (`/prefix/*`, `*suffix`, or exact)
    pub include_paths: Vec<String>,
    /// Path patterns to exclude
    pub exclude_paths: Vec<String>,
    /// Regex the full URL must match
    pub include_regex: Option<String>,
    /// Regex the full URL must not match
    pub exclude_regex: Option<String>,
    /// File extensions to include (without dot). Empty = any.
    pub include_extensions: Vec<String>,
    /// File extensions to exclude. JS and CSS are never excluded.
    pub exclude_extensions: Vec<String>,
    /// Query parameter names to include. Empty = any.
    pub include_params: Vec<String>,
    /// Query parameter names to exclude
    pub exclude_params: Vec<String>,
    pub allow_http: bool,
    pub allow_https: bool,
    /// Treat an exact include domain as also covering its subdomains
    pub allow_subdomains: bool,
    /// Maximum number of path segments (0 = unlimited)
    pub max_depth: usize,
    /// Keep URL fragments (single-page apps route on them)
    pub spa_aware: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            include_regex: None,
            exclude_regex: None,
            include_extensions: Vec::new(),
            exclude_extensions: Vec::new(),
            include_params: Vec::new(),
            exclude_params: Vec::new(),
            allow_http: true,
            allow_https: true,
            allow_subdomains: true,
            max_depth: 0,
            spa_aware: false,
        }
    }
}

impl ScopeConfig {
    /// Restrict an open scope to the hosts of the crawl seeds.
    ///
    /// Does nothing when include domains are already configured. Returns the
    /// hosts that were added.
    pub fn restrict_to_seed_hosts<S: AsRef<str>>(&mut self, seeds: &[S]) -> Vec<String> {
        if !self.include_domains.is_empty() {
            return Vec::new();
        }
        let mut hosts: Vec<String> = seeds
            .iter()
            .filter_map(|seed| Url::parse(seed.as_ref().trim()).ok())
            .filter_map(|url| url.host_str().map(str::to_lowercase))
            .filter(|host| !host.is_empty())
            .collect();
        hosts.sort();
        hosts.dedup();
        self.include_domains = hosts.clone();
        hosts
    }
}

/// Near-duplicate detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// DOM signatures collected per pattern before verification
    pub sample_count: usize,
    /// Mean pairwise similarity at or above which a pattern is verified similar
    pub dom_threshold: f64,
    /// Enable the DOM-similarity gate
    pub enable_dom_verification: bool,
    /// URLs kept per (pattern, encoding variant) in the file-parameter bucket
    pub max_per_pattern_same_group: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            sample_count: 3,
            dom_threshold: 0.85,
            enable_dom_verification: true,
            max_per_pattern_same_group: 3,
        }
    }
}

/// Business-value scoring and per-pattern caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// URLs scoring below this are rejected unless high tier
    pub min_business_score: f64,
    /// Score at which a pattern becomes high tier (uncapped)
    pub high_value_threshold: f64,
    pub cap_low: u32,
    pub cap_mid: u32,
    pub cap_high: u32,
    /// Learn per-pattern score adjustments from fetch results
    pub enable_adaptive: bool,
    /// EMA rate for learned adjustments
    pub learning_rate: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_business_score: 30.0,
            high_value_threshold: 70.0,
            cap_low: 2,
            cap_mid: 5,
            cap_high: 20,
            enable_adaptive: true,
            learning_rate: 0.1,
        }
    }
}

/// Garbage-candidate rejection thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub max_url_length: usize,
    /// Maximum share of the string covered by escape sequences
    pub max_encoding_ratio: f64,
    /// Maximum share of control characters
    pub max_control_ratio: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_url_length: 500,
            max_encoding_ratio: 0.4,
            max_control_ratio: 0.2,
        }
    }
}

/// Crawl trap heuristics applied during scope checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrapConfig {
    pub enabled: bool,
    /// Maximum full URL length in bytes
    pub max_url_length: usize,
    /// Repeated path segments tolerated before a URL counts as a loop
    pub max_repeated_segments: usize,
    /// Consecutive numeric path segments that mark a calendar trap
    pub calendar_run: usize,
}

impl Default for TrapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_url_length: 2048,
            max_repeated_segments: 3,
            calendar_run: 3,
        }
    }
}
