//! Per-component counters exposed as a flat name → count map

use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct Tally {
    total: u64,
    passed: u64,
    rejected: u64,
    reasons: BTreeMap<&'static str, u64>,
    events: BTreeMap<&'static str, u64>,
}

/// Counter table owned by one pipeline component.
///
/// Names are static so the hot path never allocates; the component prefix is
/// applied only when a snapshot is taken.
#[derive(Debug)]
pub struct Counters {
    component: &'static str,
    tally: Mutex<Tally>,
}

impl Counters {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            tally: Mutex::new(Tally::default()),
        }
    }

    /// Count an event that is neither a pass nor a rejection
    pub fn incr(&self, name: &'static str) {
        *self.tally.lock().events.entry(name).or_insert(0) += 1;
    }

    /// Count a rejection under `rejected.<reason>` and bump the totals
    pub fn reject(&self, reason: &'static str) {
        let mut tally = self.tally.lock();
        tally.total += 1;
        tally.rejected += 1;
        *tally.reasons.entry(reason).or_insert(0) += 1;
    }

    /// Count a pass and bump the totals
    pub fn pass(&self) {
        let mut tally = self.tally.lock();
        tally.total += 1;
        tally.passed += 1;
    }

    pub fn total(&self) -> u64 {
        self.tally.lock().total
    }

    pub fn rejected(&self, reason: &str) -> u64 {
        self.tally.lock().reasons.get(reason).copied().unwrap_or(0)
    }

    pub fn events(&self, name: &str) -> u64 {
        self.tally.lock().events.get(name).copied().unwrap_or(0)
    }

    /// Snapshot with `component.`-prefixed names
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        let tally = self.tally.lock();
        let c = self.component;
        let mut out = BTreeMap::new();
        out.insert(format!("{}.total", c), tally.total);
        out.insert(format!("{}.passed", c), tally.passed);
        out.insert(format!("{}.rejected", c), tally.rejected);
        for (reason, value) in &tally.reasons {
            out.insert(format!("{}.rejected.{}", c, reason), *value);
        }
        for (name, value) in &tally.events {
            out.insert(format!("{}.{}", c, name), *value);
        }
        out
    }
}
