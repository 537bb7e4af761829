//! Scope control: include/exclude rules plus crawl trap detection
//!
//! Checks run in a fixed order and the first failure wins:
//! protocol, host, path, extension, query parameters, regexes, depth, traps.
//! Host decisions are memoized per host and path decisions per path.

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;
use url::Url;

use super::classify::{extension_of, kind_for_extension};
use super::stats::Counters;
use crate::config::{ConfigError, ScopeConfig, TrapConfig};
use crate::types::ResourceKind;

const PATH_CACHE_CAPACITY: usize = 4096;

/// Which scope rule rejected a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeRule {
    Protocol,
    Host,
    Path,
    Extension,
    Param,
    Regex,
    Depth,
    CrawlTrap,
}

impl ScopeRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Host => "host",
            Self::Path => "path",
            Self::Extension => "extension",
            Self::Param => "param",
            Self::Regex => "regex",
            Self::Depth => "depth",
            Self::CrawlTrap => "crawl_trap",
        }
    }
}

/// A structured out-of-scope rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeViolation {
    pub rule: ScopeRule,
    pub detail: String,
}

impl ScopeViolation {
    fn new(rule: ScopeRule, detail: impl Into<String>) -> Self {
        Self {
            rule,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ScopeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.rule.as_str(), self.detail)
    }
}

/// Include/exclude matcher for domains
#[derive(Debug, Clone)]
struct DomainRule {
    pattern: String,
    wildcard: bool,
}

impl DomainRule {
    fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_lowercase();
        match lower.strip_prefix("*.") {
            Some(suffix) => Self {
                pattern: suffix.to_string(),
                wildcard: true,
            },
            None => Self {
                pattern: lower,
                wildcard: false,
            },
        }
    }

    fn matches(&self, host: &str, allow_subdomains: bool) -> bool {
        if host == self.pattern {
            return true;
        }
        (self.wildcard || allow_subdomains)
            && host.len() > self.pattern.len()
            && host.ends_with(&self.pattern)
            && host.as_bytes()[host.len() - self.pattern.len() - 1] == b'.'
    }
}

/// Include/exclude matcher for paths
#[derive(Debug, Clone)]
enum PathRule {
    /// `/prefix/*`
    Prefix(String),
    /// `*suffix`
    Suffix(String),
    Exact(String),
}

impl PathRule {
    fn parse(raw: &str) -> Self {
        if let Some(prefix) = raw.strip_suffix("/*") {
            Self::Prefix(prefix.to_string())
        } else if let Some(suffix) = raw.strip_prefix('*') {
            Self::Suffix(suffix.to_string())
        } else {
            Self::Exact(raw.to_string())
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => {
                path == prefix
                    || (path.starts_with(prefix.as_str())
                        && path.as_bytes().get(prefix.len()) == Some(&b'/'))
            }
            Self::Suffix(suffix) => path.ends_with(suffix.as_str()),
            Self::Exact(exact) => path == exact,
        }
    }
}

/// Applies the configured scope rules to canonical URLs
pub struct ScopeController {
    config: ScopeConfig,
    trap: TrapConfig,
    include_domains: Vec<DomainRule>,
    exclude_domains: Vec<DomainRule>,
    include_paths: Vec<PathRule>,
    exclude_paths: Vec<PathRule>,
    include_regex: Option<Regex>,
    exclude_regex: Option<Regex>,
    include_extensions: Vec<String>,
    exclude_extensions: Vec<String>,
    host_cache: DashMap<String, bool>,
    path_cache: Mutex<LruCache<String, Option<ScopeViolation>>>,
    counters: Counters,
}

impl ScopeController {
    /// Compile the rules. Invalid regexes are configuration errors.
    pub fn new(config: &ScopeConfig, trap: &TrapConfig) -> Result<Self, ConfigError> {
        let include_regex = compile(config.include_regex.as_deref(), "scope.include_regex")?;
        let exclude_regex = compile(config.exclude_regex.as_deref(), "scope.exclude_regex")?;
        let capacity = NonZeroUsize::new(PATH_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            config: config.clone(),
            trap: trap.clone(),
            include_domains: config.include_domains.iter().map(|d| DomainRule::parse(d)).collect(),
            exclude_domains: config.exclude_domains.iter().map(|d| DomainRule::parse(d)).collect(),
            include_paths: config.include_paths.iter().map(|p| PathRule::parse(p)).collect(),
            exclude_paths: config.exclude_paths.iter().map(|p| PathRule::parse(p)).collect(),
            include_regex,
            exclude_regex,
            include_extensions: normalize_extensions(&config.include_extensions),
            exclude_extensions: normalize_extensions(&config.exclude_extensions),
            host_cache: DashMap::new(),
            path_cache: Mutex::new(LruCache::new(capacity)),
            counters: Counters::new("scope"),
        })
    }

    /// Check a canonical URL against every rule, in order
    pub fn check(&self, url: &Url) -> Result<(), ScopeViolation> {
        let result = self.evaluate(url);
        match &result {
            Ok(()) => self.counters.pass(),
            Err(violation) => {
                tracing::trace!("Out of scope {}: {}", url, violation);
                self.counters.reject(violation.rule.as_str());
            }
        }
        result
    }

    fn evaluate(&self, url: &Url) -> Result<(), ScopeViolation> {
        let allowed = match url.scheme() {
            "http" => self.config.allow_http,
            "https" => self.config.allow_https,
            _ => false,
        };
        if !allowed {
            return Err(ScopeViolation::new(ScopeRule::Protocol, url.scheme()));
        }

        let host = url.host_str().unwrap_or_default();
        if !self.host_allowed(host) {
            return Err(ScopeViolation::new(ScopeRule::Host, host));
        }

        if let Some(violation) = self.path_decision(url.path()) {
            return Err(violation);
        }

        self.check_extension(url.path())?;
        self.check_params(url)?;

        if let Some(re) = &self.include_regex {
            if !re.is_match(url.as_str()) {
                return Err(ScopeViolation::new(ScopeRule::Regex, "include_regex not matched"));
            }
        }
        if let Some(re) = &self.exclude_regex {
            if re.is_match(url.as_str()) {
                return Err(ScopeViolation::new(ScopeRule::Regex, "exclude_regex matched"));
            }
        }

        if self.config.max_depth > 0 {
            let depth = path_segments(url.path()).count();
            if depth > self.config.max_depth {
                return Err(ScopeViolation::new(
                    ScopeRule::Depth,
                    format!("{} segments > {}", depth, self.config.max_depth),
                ));
            }
        }

        if self.trap.enabled {
            if let Some(detail) = detect_trap(url, &self.trap) {
                return Err(ScopeViolation::new(ScopeRule::CrawlTrap, detail));
            }
        }

        Ok(())
    }

    fn host_allowed(&self, host: &str) -> bool {
        if let Some(cached) = self.host_cache.get(host) {
            return *cached;
        }
        let allow_subdomains = self.config.allow_subdomains;
        let excluded = self
            .exclude_domains
            .iter()
            .any(|rule| rule.matches(host, allow_subdomains));
        let included = self.include_domains.is_empty()
            || self
                .include_domains
                .iter()
                .any(|rule| rule.matches(host, allow_subdomains));
        let allowed = !excluded && included;
        self.host_cache.insert(host.to_string(), allowed);
        allowed
    }

    fn path_decision(&self, path: &str) -> Option<ScopeViolation> {
        if self.include_paths.is_empty() && self.exclude_paths.is_empty() {
            return None;
        }
        if let Some(cached) = self.path_cache.lock().get(path) {
            return cached.clone();
        }

        let decision = if self.exclude_paths.iter().any(|rule| rule.matches(path)) {
            Some(ScopeViolation::new(ScopeRule::Path, format!("{} excluded", path)))
        } else if !self.include_paths.is_empty()
            && !self.include_paths.iter().any(|rule| rule.matches(path))
        {
            Some(ScopeViolation::new(ScopeRule::Path, format!("{} not included", path)))
        } else {
            None
        };

        self.path_cache.lock().put(path.to_string(), decision.clone());
        decision
    }

    fn check_extension(&self, path: &str) -> Result<(), ScopeViolation> {
        let lower = path.to_lowercase();
        let Some(ext) = extension_of(&lower) else {
            return Ok(());
        };
        // Script and stylesheet bodies yield more URLs, so they stay in scope.
        let always_kept = matches!(
            kind_for_extension(ext),
            ResourceKind::Javascript | ResourceKind::Css
        );

        if self.exclude_extensions.iter().any(|e| e == ext) {
            if always_kept {
                self.counters.incr("extension_exclude_overridden");
                return Ok(());
            }
            return Err(ScopeViolation::new(ScopeRule::Extension, format!(".{} excluded", ext)));
        }
        if !self.include_extensions.is_empty()
            && !always_kept
            && !self.include_extensions.iter().any(|e| e == ext)
        {
            return Err(ScopeViolation::new(ScopeRule::Extension, format!(".{} not included", ext)));
        }
        Ok(())
    }

    fn check_params(&self, url: &Url) -> Result<(), ScopeViolation> {
        if self.config.include_params.is_empty() && self.config.exclude_params.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        if let Some(key) = keys
            .iter()
            .find(|k| self.config.exclude_params.iter().any(|p| p == *k))
        {
            return Err(ScopeViolation::new(ScopeRule::Param, format!("{} excluded", key)));
        }
        if !self.config.include_params.is_empty()
            && !keys.is_empty()
            && !keys.iter().any(|k| self.config.include_params.contains(k))
        {
            return Err(ScopeViolation::new(ScopeRule::Param, "no included parameter"));
        }
        Ok(())
    }

    pub fn stats(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

fn compile(pattern: Option<&str>, field: &'static str) -> Result<Option<Regex>, ConfigError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::InvalidRegex {
                field,
                pattern: p.to_string(),
                source,
            })
        })
        .transpose()
}

fn normalize_extensions(exts: &[String]) -> Vec<String> {
    exts.iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .collect()
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Describe the crawl trap a URL falls into, if any
pub fn detect_trap(url: &Url, config: &TrapConfig) -> Option<String> {
    if url.as_str().len() > config.max_url_length {
        return Some(format!("URL longer than {} bytes", config.max_url_length));
    }

    let segments: Vec<&str> = path_segments(url.path()).collect();

    if has_repetitive_pattern(&segments, config.max_repeated_segments) {
        return Some("repeating path segments".to_string());
    }

    if is_calendar_trap(&segments, config.calendar_run) {
        return Some("calendar path".to_string());
    }

    None
}

fn has_repetitive_pattern(segments: &[&str], max_repeats: usize) -> bool {
    if segments.len() < 4 || max_repeats == 0 {
        return false;
    }

    for window in 1..=segments.len() / 2 {
        let mut repeats = 0;
        for i in 0..segments.len() - window {
            if segments[i] == segments[i + window] {
                repeats += 1;
                if repeats >= max_repeats {
                    return true;
                }
            }
        }
    }

    false
}

fn is_calendar_trap(segments: &[&str], run: usize) -> bool {
    let mut consecutive = 0;
    for segment in segments {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            consecutive += 1;
            if consecutive >= run {
                return true;
            }
        } else {
            consecutive = 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn controller(config: ScopeConfig) -> ScopeController {
        ScopeController::new(&config, &TrapConfig::default()).unwrap()
    }

    fn rule_of(c: &ScopeController, s: &str) -> Option<ScopeRule> {
        c.check(&url(s)).err().map(|v| v.rule)
    }

    #[test]
    fn test_protocol() {
        let c = controller(ScopeConfig {
            allow_http: false,
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/"), Some(ScopeRule::Protocol));
        assert_eq!(rule_of(&c, "https://t.example/"), None);
    }

    #[test]
    fn test_domains() {
        let c = controller(ScopeConfig {
            include_domains: vec!["t.example".into()],
            exclude_domains: vec!["admin.t.example".into()],
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/a"), None);
        assert_eq!(rule_of(&c, "http://www.t.example/a"), None);
        assert_eq!(rule_of(&c, "http://admin.t.example/a"), Some(ScopeRule::Host));
        assert_eq!(rule_of(&c, "http://cdn.example.com/a.js"), Some(ScopeRule::Host));
        assert_eq!(rule_of(&c, "http://evilt.example/a"), Some(ScopeRule::Host));

        let strict = controller(ScopeConfig {
            include_domains: vec!["t.example".into()],
            allow_subdomains: false,
            ..Default::default()
        });
        assert_eq!(rule_of(&strict, "http://www.t.example/a"), Some(ScopeRule::Host));

        let wildcard = controller(ScopeConfig {
            include_domains: vec!["*.t.example".into()],
            allow_subdomains: false,
            ..Default::default()
        });
        assert_eq!(rule_of(&wildcard, "http://a.b.t.example/"), None);
    }

    #[test]
    fn test_paths() {
        let c = controller(ScopeConfig {
            include_paths: vec!["/app/*".into(), "*.php".into()],
            exclude_paths: vec!["/app/logout".into()],
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/app/users"), None);
        assert_eq!(rule_of(&c, "http://t.example/index.php"), None);
        assert_eq!(rule_of(&c, "http://t.example/app/logout"), Some(ScopeRule::Path));
        assert_eq!(rule_of(&c, "http://t.example/application"), Some(ScopeRule::Path));
        // memoized decision is the same
        assert_eq!(rule_of(&c, "http://t.example/app/logout?x=1"), Some(ScopeRule::Path));
    }

    #[test]
    fn test_extension_excludes_keep_scripts() {
        let c = controller(ScopeConfig {
            exclude_extensions: vec!["js".into(), ".pdf".into()],
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/app.js"), None);
        assert_eq!(rule_of(&c, "http://t.example/a.pdf"), Some(ScopeRule::Extension));
        assert_eq!(c.counters().events("extension_exclude_overridden"), 1);
        assert_eq!(c.stats()["scope.extension_exclude_overridden"], 1);
    }

    #[test]
    fn test_extension_includes_keep_scripts() {
        let c = controller(ScopeConfig {
            include_extensions: vec!["php".into()],
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/index.php"), None);
        assert_eq!(rule_of(&c, "http://t.example/about"), None);
        assert_eq!(rule_of(&c, "http://t.example/app.js"), None);
        assert_eq!(rule_of(&c, "http://t.example/site.css"), None);
        assert_eq!(rule_of(&c, "http://t.example/a.pdf"), Some(ScopeRule::Extension));
    }

    #[test]
    fn test_included_params() {
        let c = controller(ScopeConfig {
            include_params: vec!["id".into()],
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/item?id=1"), None);
        assert_eq!(rule_of(&c, "http://t.example/item?x=2&id=1"), None);
        assert_eq!(rule_of(&c, "http://t.example/item"), None);
        assert_eq!(rule_of(&c, "http://t.example/item?x=2"), Some(ScopeRule::Param));
    }

    #[test]
    fn test_include_regex() {
        let c = controller(ScopeConfig {
            include_regex: Some(r"^https://t\.example/app/".into()),
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "https://t.example/app/users"), None);
        assert_eq!(rule_of(&c, "https://t.example/other"), Some(ScopeRule::Regex));
        assert_eq!(rule_of(&c, "http://t.example/app/users"), Some(ScopeRule::Regex));
    }

    #[test]
    fn test_params_and_regex() {
        let c = controller(ScopeConfig {
            exclude_params: vec!["logout".into()],
            exclude_regex: Some(r"/delete".into()),
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/a?logout=1"), Some(ScopeRule::Param));
        assert_eq!(rule_of(&c, "http://t.example/item/delete"), Some(ScopeRule::Regex));
        assert_eq!(rule_of(&c, "http://t.example/item?id=1"), None);
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let config = ScopeConfig {
            include_regex: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(
            ScopeController::new(&config, &TrapConfig::default()),
            Err(ConfigError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_max_depth() {
        let c = controller(ScopeConfig {
            max_depth: 2,
            ..Default::default()
        });
        assert_eq!(rule_of(&c, "http://t.example/a/b"), None);
        assert_eq!(rule_of(&c, "http://t.example/a/b/c"), Some(ScopeRule::Depth));
    }

    #[test]
    fn test_traps() {
        let c = controller(ScopeConfig::default());
        assert_eq!(
            rule_of(&c, "https://t.example/forum/thread/forum/thread/forum/thread/page"),
            Some(ScopeRule::CrawlTrap)
        );
        assert_eq!(rule_of(&c, "https://t.example/calendar/2024/01/15"), Some(ScopeRule::CrawlTrap));
        assert_eq!(rule_of(&c, "https://t.example/blog/2024/01"), None);
        let long = format!("https://t.example/{}", "a/".repeat(1025));
        assert_eq!(rule_of(&c, &long), Some(ScopeRule::CrawlTrap));
        assert_eq!(c.stats()["scope.rejected.crawl_trap"], 3);
    }

    #[test]
    fn test_traps_disabled() {
        let trap = TrapConfig {
            enabled: false,
            ..Default::default()
        };
        let c = ScopeController::new(&ScopeConfig::default(), &trap).unwrap();
        assert!(c.check(&url("https://t.example/calendar/2024/01/15")).is_ok());
    }
}
