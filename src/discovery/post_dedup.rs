//! POST request deduplication by value-independent fingerprint

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::stats::Counters;
use crate::util::wide_hash;

/// (method, canonical URL, sorted parameter names)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostFingerprint {
    pub method: String,
    pub url: String,
    pub params: Vec<String>,
}

impl PostFingerprint {
    pub fn new(method: &str, canonical_url: &str, param_names: &[String]) -> Self {
        let params: BTreeSet<String> = param_names
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            method: method.trim().to_ascii_uppercase(),
            url: canonical_url.to_string(),
            params: params.into_iter().collect(),
        }
    }

    pub fn key(&self) -> u128 {
        wide_hash(&format!("{} {} {}", self.method, self.url, self.params.join("&")))
    }
}

/// A distinct POST endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PostEndpoint {
    pub url: String,
    pub method: String,
    pub params: Vec<String>,
    pub observations: u64,
}

/// Admits each POST fingerprint once
#[derive(Debug)]
pub struct PostDeduper {
    endpoints: HashMap<u128, PostEndpoint>,
    order: Vec<u128>,
    counters: Counters,
}

impl Default for PostDeduper {
    fn default() -> Self {
        Self::new()
    }
}

impl PostDeduper {
    pub fn new() -> Self {
        Self {
            endpoints: HashMap::new(),
            order: Vec::new(),
            counters: Counters::new("post"),
        }
    }

    /// True on the first observation of this fingerprint
    pub fn admit(&mut self, fingerprint: PostFingerprint) -> bool {
        let key = fingerprint.key();
        if let Some(existing) = self.endpoints.get_mut(&key) {
            existing.observations += 1;
            self.counters.reject("duplicate_fingerprint");
            return false;
        }

        tracing::debug!(
            "New POST endpoint {} {} [{}]",
            fingerprint.method,
            fingerprint.url,
            fingerprint.params.join(", ")
        );
        self.endpoints.insert(
            key,
            PostEndpoint {
                url: fingerprint.url,
                method: fingerprint.method,
                params: fingerprint.params,
                observations: 1,
            },
        );
        self.order.push(key);
        self.counters.pass();
        true
    }

    /// Endpoints in first-seen order
    pub fn endpoints(&self) -> Vec<PostEndpoint> {
        self.order
            .iter()
            .filter_map(|key| self.endpoints.get(key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn stats(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fingerprint_ignores_order_and_case() {
        let a = PostFingerprint::new("post", "http://t.example/login", &names(&["username", "password"]));
        let b = PostFingerprint::new("POST", "http://t.example/login", &names(&["password", "username", "password"]));
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_first_admits_rest_counted() {
        let mut d = PostDeduper::new();
        let fp = || PostFingerprint::new("POST", "http://t.example/login", &names(&["username", "password"]));
        assert!(d.admit(fp()));
        assert!(!d.admit(fp()));
        assert!(!d.admit(fp()));

        let endpoints = d.endpoints();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].observations, 3);
        assert_eq!(d.stats()["post.rejected.duplicate_fingerprint"], 2);
    }

    #[test]
    fn test_distinct_params_are_distinct_endpoints() {
        let mut d = PostDeduper::new();
        assert!(d.admit(PostFingerprint::new("POST", "http://t.example/a", &names(&["x"]))));
        assert!(d.admit(PostFingerprint::new("POST", "http://t.example/a", &names(&["x", "y"]))));
        assert!(d.admit(PostFingerprint::new("PUT", "http://t.example/a", &names(&["x"]))));
        assert_eq!(d.len(), 3);
    }
}
