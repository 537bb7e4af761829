//! Configuration for surfmap

mod admission;
mod crawl;
mod logging;

pub use admission::{DedupConfig, QualityConfig, ScopeConfig, ScoringConfig, TrapConfig};
pub use crawl::CrawlConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default user agent for the bundled fetcher
pub const DEFAULT_USER_AGENT: &str = "surfmap/0.1 (+endpoint-discovery)";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "surfmap.toml";

/// Configuration problems detected before the pipeline starts. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} regex '{pattern}': {source}")]
    InvalidRegex {
        field: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub trap: TrapConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write this configuration as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))?;
        Ok(())
    }

    /// Validate all configuration fields.
    ///
    /// Collects every problem and reports them together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if !self.scope.allow_http && !self.scope.allow_https {
            errors.push("scope must allow at least one of http or https".to_string());
        }

        if self.dedup.sample_count < 2 {
            errors.push("dedup.sample_count must be at least 2".to_string());
        }
        if !(0.0..=1.0).contains(&self.dedup.dom_threshold) {
            errors.push("dedup.dom_threshold must be between 0.0 and 1.0".to_string());
        }
        if self.dedup.max_per_pattern_same_group == 0 {
            errors.push("dedup.max_per_pattern_same_group must be positive".to_string());
        }

        let s = &self.scoring;
        if !(0.0..=100.0).contains(&s.min_business_score) {
            errors.push("scoring.min_business_score must be between 0 and 100".to_string());
        }
        if !(0.0..=100.0).contains(&s.high_value_threshold) {
            errors.push("scoring.high_value_threshold must be between 0 and 100".to_string());
        }
        if s.cap_low == 0 || s.cap_mid == 0 || s.cap_high == 0 {
            errors.push("scoring caps must be positive".to_string());
        }
        if s.cap_low > s.cap_mid || s.cap_mid > s.cap_high {
            errors.push("scoring caps must satisfy cap_low <= cap_mid <= cap_high".to_string());
        }
        if s.learning_rate <= 0.0 || s.learning_rate > 1.0 {
            errors.push("scoring.learning_rate must be in (0, 1]".to_string());
        }

        let q = &self.quality;
        if q.max_url_length < 2 {
            errors.push("quality.max_url_length must be at least 2".to_string());
        }
        if !(0.0..=1.0).contains(&q.max_encoding_ratio) {
            errors.push("quality.max_encoding_ratio must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&q.max_control_ratio) {
            errors.push("quality.max_control_ratio must be between 0.0 and 1.0".to_string());
        }

        if self.trap.enabled && self.trap.calendar_run < 2 {
            errors.push("trap.calendar_run must be at least 2".to_string());
        }

        if self.crawl.workers == 0 {
            errors.push("crawl.workers must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.dedup.sample_count, 3);
        assert_eq!(config.scoring.cap_mid, 5);
        assert_eq!(config.quality.max_url_length, 500);
        assert!(config.scope.allow_subdomains);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [scope]
            include_domains = ["t.example"]

            [scoring]
            min_business_score = 10.0
            "#,
        )
        .unwrap();

        assert_eq!(config.scope.include_domains, vec!["t.example".to_string()]);
        assert!(config.scope.allow_https);
        assert_eq!(config.scoring.min_business_score, 10.0);
        assert_eq!(config.scoring.cap_low, 2);
        assert_eq!(config.dedup.dom_threshold, 0.85);
    }

    #[test]
    fn test_open_scope_restricted_to_seed_hosts() {
        let mut scope = ScopeConfig::default();
        let added = scope.restrict_to_seed_hosts(&[
            "http://T.example/",
            "https://t.example/login",
            "https://api.t.example:8443/",
            "not a url",
        ]);
        assert_eq!(added, vec!["api.t.example".to_string(), "t.example".to_string()]);
        assert_eq!(scope.include_domains, added);

        let mut configured = ScopeConfig {
            include_domains: vec!["*.t.example".to_string()],
            ..Default::default()
        };
        assert!(configured.restrict_to_seed_hosts(&["http://other.example/"]).is_empty());
        assert_eq!(configured.include_domains, vec!["*.t.example".to_string()]);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.scope.allow_http = false;
        config.scope.allow_https = false;
        config.dedup.dom_threshold = 1.5;
        config.scoring.cap_low = 10;

        match config.validate() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {:?}", other),
        }
    }
}
