//! Priority queue of admitted URLs
//!
//! Ordered by admission priority, then by discovery order so equal-priority
//! URLs come out first-in first-out.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use url::Url;

use crate::discovery::Decision;
use crate::types::{ResourceKind, UrlType};

/// An admitted URL waiting to be fetched
#[derive(Debug, Clone)]
pub struct ScoredUrl {
    pub url: Url,
    /// Priority from the admission decision (higher = crawl sooner)
    pub priority: f64,
    /// Request the body for DOM sampling
    pub needs_dom_analysis: bool,
    pub kind: Option<ResourceKind>,
    pub url_type: Option<UrlType>,
    pub score: Option<f64>,
    /// Monotone discovery sequence number
    pub sequence: u64,
}

impl PartialEq for ScoredUrl {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredUrl {}

impl PartialOrd for ScoredUrl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredUrl {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier discovery
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Max-heap frontier. Admission already guarantees uniqueness.
#[derive(Debug, Default)]
pub struct UrlFrontier {
    heap: BinaryHeap<ScoredUrl>,
    next_sequence: u64,
    total_pushed: u64,
}

impl UrlFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an admitted URL with its decision's priority and metadata
    pub fn push(&mut self, url: Url, decision: &Decision) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.total_pushed += 1;
        self.heap.push(ScoredUrl {
            url,
            priority: decision.priority,
            needs_dom_analysis: decision.needs_dom_analysis,
            kind: decision.kind,
            url_type: decision.url_type,
            score: decision.score,
            sequence,
        });
    }

    pub fn pop(&mut self) -> Option<ScoredUrl> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Reason;

    fn url(path: &str) -> Url {
        Url::parse("http://t.example/").unwrap().join(path).unwrap()
    }

    fn admitted(priority: f64) -> Decision {
        Decision {
            allow: true,
            canonical_url: None,
            reason: Reason::Admitted,
            priority,
            needs_dom_analysis: false,
            kind: Some(ResourceKind::Page),
            url_type: Some(UrlType::Normal),
            score: Some(priority * 100.0),
            tier: None,
            pattern: None,
        }
    }

    #[test]
    fn test_priority_order() {
        let mut frontier = UrlFrontier::new();
        frontier.push(url("/low"), &admitted(0.3));
        frontier.push(url("/admin"), &admitted(0.95));
        frontier.push(url("/mid"), &admitted(0.55));

        let first = frontier.pop().unwrap();
        assert_eq!(first.url.path(), "/admin");
        assert_eq!(first.kind, Some(ResourceKind::Page));
        assert_eq!(frontier.pop().unwrap().url.path(), "/mid");
        assert_eq!(frontier.pop().unwrap().url.path(), "/low");
        assert!(frontier.pop().is_none());
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut frontier = UrlFrontier::new();
        for i in 0..5 {
            frontier.push(url(&format!("/p{}", i)), &admitted(0.5));
        }
        let order: Vec<String> = std::iter::from_fn(|| frontier.pop())
            .map(|s| s.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/p0", "/p1", "/p2", "/p3", "/p4"]);
        assert_eq!(frontier.total_pushed(), 5);
    }
}
