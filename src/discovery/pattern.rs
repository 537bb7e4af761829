//! Structural URL patterns and the pattern-group arena
//!
//! A pattern is the canonical URL with value-like path segments replaced by
//! placeholders and the query reduced to its sorted key set:
//!
//! ```text
//! http://t.example/user/42/orders?b=2&a=1  ->  http://t.example/user/{num}/orders?a=&b=
//! ```
//!
//! Groups live in a `Vec` arena; every other index holds a [`PatternId`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use url::Url;

use super::dom::DomVerification;
use super::stats::Counters;
use crate::util::wide_hash;

/// Parameter values kept per parameter name
pub const MAX_SAMPLE_VALUES: usize = 10;
/// Admitted URLs listed per pattern in reports
pub const MAX_REPRESENTATIVES: usize = 5;

/// Index of a group in the [`PatternStore`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PatternId(pub usize);

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Derive the structural pattern of a canonical URL
pub fn derive_pattern(url: &Url) -> String {
    let mut pattern = String::with_capacity(url.as_str().len());
    pattern.push_str(url.scheme());
    pattern.push_str("://");
    pattern.push_str(url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        pattern.push(':');
        pattern.push_str(&port.to_string());
    }

    let path = url.path();
    for (i, segment) in path.split('/').enumerate() {
        if i > 0 {
            pattern.push('/');
        }
        pattern.push_str(&segment_placeholder(segment));
    }

    let keys = query_keys(url);
    if !keys.is_empty() {
        pattern.push('?');
        let joined: Vec<String> = keys.iter().map(|k| format!("{}=", k)).collect();
        pattern.push_str(&joined.join("&"));
    }

    pattern
}

/// Sorted, de-duplicated query keys
pub fn query_keys(url: &Url) -> BTreeSet<String> {
    url.query_pairs()
        .map(|(k, _)| k.into_owned())
        .filter(|k| !k.is_empty())
        .collect()
}

/// 128-bit hash of a pattern string
pub fn pattern_hash(pattern: &str) -> u128 {
    wide_hash(pattern)
}

/// Replace a value-like path segment with its placeholder
pub fn segment_placeholder(segment: &str) -> String {
    if segment.is_empty() {
        return String::new();
    }
    if is_numeric(segment) {
        return "{num}".to_string();
    }
    if is_uuid(segment) {
        return "{uuid}".to_string();
    }
    if is_hex_hash(segment) {
        return "{hash}".to_string();
    }

    // `digits.ext`
    if let Some((stem, ext)) = segment.rsplit_once('.') {
        if is_numeric(stem) && is_extension(ext) {
            return format!("{{num}}.{}", ext);
        }
    }

    // `prefix[-_]digits(.ext)?`
    let (stem, ext) = match segment.rsplit_once('.') {
        Some((stem, ext)) if is_extension(ext) => (stem, Some(ext)),
        _ => (segment, None),
    };
    if let Some(sep) = stem.rfind(|c| c == '-' || c == '_') {
        let (prefix, digits) = (&stem[..sep], &stem[sep + 1..]);
        if !prefix.is_empty() && is_numeric(digits) {
            let sep_char = &stem[sep..sep + 1];
            return match ext {
                Some(ext) => format!("{}{}{{num}}.{}", prefix, sep_char, ext),
                None => format!("{}{}{{num}}", prefix, sep_char),
            };
        }
    }

    segment.to_string()
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_extension(s: &str) -> bool {
    !s.is_empty() && s.len() <= 6 && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

pub fn is_uuid(s: &str) -> bool {
    let groups: Vec<&str> = s.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// MD5, SHA-1 or SHA-256 shaped hex digests
pub fn is_hex_hash(s: &str) -> bool {
    matches!(s.len(), 32 | 40 | 64) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Per-pattern record
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub id: PatternId,
    pub pattern: String,
    pub hash: u128,
    pub first_url: String,
    pub seen: u64,
    pub crawled: u32,
    pub skipped: u64,
    pub fetches: u64,
    pub successes: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub avg_response_ms: f64,
    pub productive_fetches: u64,
    pub new_links: u64,
    pub new_forms: u64,
    pub new_apis: u64,
    /// Learned score adjustment in [-20, 20]
    pub adjustment: f64,
    pub param_names: BTreeSet<String>,
    pub param_samples: BTreeMap<String, Vec<String>>,
    pub verification: DomVerification,
    pub representatives: Vec<String>,
}

impl PatternGroup {
    fn new(id: PatternId, pattern: String, hash: u128, first_url: &str) -> Self {
        Self {
            id,
            pattern,
            hash,
            first_url: first_url.to_string(),
            seen: 0,
            crawled: 0,
            skipped: 0,
            fetches: 0,
            successes: 0,
            status_codes: BTreeMap::new(),
            avg_response_ms: 0.0,
            productive_fetches: 0,
            new_links: 0,
            new_forms: 0,
            new_apis: 0,
            adjustment: 0.0,
            param_names: BTreeSet::new(),
            param_samples: BTreeMap::new(),
            verification: DomVerification::default(),
            representatives: Vec::new(),
        }
    }

    /// Remember an admitted URL for reporting
    pub fn add_representative(&mut self, url: &str) {
        if self.representatives.len() < MAX_REPRESENTATIVES {
            self.representatives.push(url.to_string());
        }
    }

    /// Record parameter names and a bounded sample of their values
    pub fn observe_params(&mut self, url: &Url) {
        for (key, value) in url.query_pairs() {
            if key.is_empty() {
                continue;
            }
            self.param_names.insert(key.to_string());
            let samples = self.param_samples.entry(key.into_owned()).or_default();
            if samples.len() < MAX_SAMPLE_VALUES && !samples.iter().any(|v| *v == value) {
                samples.push(value.into_owned());
            }
        }
    }

    /// Fold one fetch outcome into the running statistics
    pub fn record_fetch(
        &mut self,
        status: u16,
        response_time_ms: u64,
        new_links: bool,
        new_forms: bool,
        new_apis: bool,
    ) {
        self.fetches += 1;
        if (200..400).contains(&status) {
            self.successes += 1;
        }
        *self.status_codes.entry(status).or_insert(0) += 1;
        self.avg_response_ms +=
            (response_time_ms as f64 - self.avg_response_ms) / self.fetches as f64;

        if new_links {
            self.new_links += 1;
        }
        if new_forms {
            self.new_forms += 1;
        }
        if new_apis {
            self.new_apis += 1;
        }
        if new_links || new_forms || new_apis {
            self.productive_fetches += 1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.fetches == 0 {
            return 1.0;
        }
        self.successes as f64 / self.fetches as f64
    }

    pub fn discovery_rate(&self) -> f64 {
        if self.fetches == 0 {
            return 0.0;
        }
        self.productive_fetches as f64 / self.fetches as f64
    }
}

/// Arena of pattern groups with a hash index
#[derive(Debug)]
pub struct PatternStore {
    groups: Vec<PatternGroup>,
    index: HashMap<u128, PatternId>,
    counters: Counters,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            index: HashMap::new(),
            counters: Counters::new("pattern"),
        }
    }

    /// Find the group for `url`, creating it on first sighting.
    ///
    /// Returns the id and whether the group was just created.
    pub fn lookup_or_create(&mut self, url: &Url) -> (PatternId, bool) {
        let pattern = derive_pattern(url);
        let hash = pattern_hash(&pattern);
        self.lookup_or_create_hashed(pattern, hash, url)
    }

    /// [`Self::lookup_or_create`] for callers that already derived the pattern
    pub fn lookup_or_create_hashed(
        &mut self,
        pattern: String,
        hash: u128,
        url: &Url,
    ) -> (PatternId, bool) {
        if let Some(&id) = self.index.get(&hash) {
            self.counters.incr("repeat_sightings");
            return (id, false);
        }

        let id = PatternId(self.groups.len());
        tracing::debug!("New pattern {} {}", id, pattern);
        let mut group = PatternGroup::new(id, pattern, hash, url.as_str());
        group.verification.start();
        self.groups.push(group);
        self.index.insert(hash, id);
        self.counters.incr("created");
        (id, true)
    }

    pub fn get_mut(&mut self, id: PatternId) -> Option<&mut PatternGroup> {
        self.groups.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternGroup> {
        self.groups.iter()
    }

    pub fn stats(&self) -> BTreeMap<String, u64> {
        let mut stats = self.counters.snapshot();
        stats.insert("pattern.groups".to_string(), self.groups.len() as u64);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> String {
        derive_pattern(&Url::parse(s).unwrap())
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            pattern("http://t.example/user/42/orders"),
            "http://t.example/user/{num}/orders"
        );
        assert_eq!(
            pattern("http://t.example/u/550e8400-e29b-41d4-a716-446655440000"),
            "http://t.example/u/{uuid}"
        );
        assert_eq!(
            pattern("http://t.example/f/d41d8cd98f00b204e9800998ecf8427e"),
            "http://t.example/f/{hash}"
        );
        assert_eq!(
            pattern("http://t.example/product-12.html"),
            "http://t.example/product-{num}.html"
        );
        assert_eq!(
            pattern("http://t.example/product-detail-7.html"),
            "http://t.example/product-detail-{num}.html"
        );
        assert_eq!(pattern("http://t.example/post_9"), "http://t.example/post_{num}");
        assert_eq!(pattern("http://t.example/a/123.html"), "http://t.example/a/{num}.html");
        assert_eq!(pattern("http://t.example/"), "http://t.example/");
        assert_eq!(pattern("http://t.example:8080/x"), "http://t.example:8080/x");
    }

    #[test]
    fn test_query_keys_sorted_values_stripped() {
        assert_eq!(
            pattern("http://t.example/item?id=1&b=2&a=3&id=4"),
            "http://t.example/item?a=&b=&id="
        );
        assert_eq!(
            pattern("http://t.example/item?b=2&a=3"),
            pattern("http://t.example/item?a=9&b=8")
        );
    }

    #[test]
    fn test_store_lookup() {
        let mut store = PatternStore::new();
        let (a, created_a) = store.lookup_or_create(&Url::parse("http://t.example/item?id=1").unwrap());
        let (b, created_b) = store.lookup_or_create(&Url::parse("http://t.example/item?id=2").unwrap());
        assert_eq!(a, b);
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(store.len(), 1);

        let group = store.get_mut(a).unwrap();
        assert_eq!(group.first_url, "http://t.example/item?id=1");
        for i in 0..8 {
            group.add_representative(&format!("http://t.example/item?id={}", i));
        }
        assert_eq!(group.representatives.len(), MAX_REPRESENTATIVES);
        assert_eq!(store.stats()["pattern.groups"], 1);
    }

    #[test]
    fn test_param_samples_capped() {
        let mut store = PatternStore::new();
        let (id, _) = store.lookup_or_create(&Url::parse("http://t.example/s?q=0").unwrap());
        let group = store.get_mut(id).unwrap();
        for i in 0..20 {
            group.observe_params(&Url::parse(&format!("http://t.example/s?q={}", i)).unwrap());
        }
        assert_eq!(group.param_samples["q"].len(), MAX_SAMPLE_VALUES);
        assert!(group.param_names.contains("q"));
    }

    #[test]
    fn test_record_fetch_rates() {
        let mut store = PatternStore::new();
        let (id, _) = store.lookup_or_create(&Url::parse("http://t.example/a").unwrap());
        let group = store.get_mut(id).unwrap();
        group.record_fetch(200, 100, true, false, false);
        group.record_fetch(500, 300, false, false, false);
        assert_eq!(group.success_rate(), 0.5);
        assert_eq!(group.discovery_rate(), 0.5);
        assert_eq!(group.avg_response_ms, 200.0);
        assert_eq!(group.status_codes[&500], 1);
    }
}
