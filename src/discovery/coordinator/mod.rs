//! Admission coordinator
//!
//! Owns every admission component and runs a candidate through them in
//! order: normalize, visited, quality, scope, classify, layered dedup,
//! pattern lookup, business score, pattern cap, DOM verification. Fetch
//! results flow back through [`AdmissionCoordinator::record_fetch_result`]
//! into the pattern's DOM samples and learned score adjustment.
//!
//! All tables are guarded by `parking_lot` locks, so one coordinator can be
//! shared between fetch workers behind an `Arc`. No call performs I/O.

mod types;

pub use types::*;

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use url::Url;

use super::classify::ResourceClassifier;
use super::dom::{DomSignature, VerificationState};
use super::layered::{classify_type, AssetRecord, LayeredDeduper};
use super::normalize::UrlNormalizer;
use super::pattern::{derive_pattern, pattern_hash, PatternId, PatternStore};
use super::post_dedup::{PostDeduper, PostEndpoint, PostFingerprint};
use super::quality::{QualityFilter, QualityRejection};
use super::scope::ScopeController;
use super::scoring::{BusinessScorer, Tier};
use super::stats::Counters;
use crate::config::{Config, ConfigError, DedupConfig};
use crate::types::ResourceKind;

/// Shared admission core
pub struct AdmissionCoordinator {
    normalizer: UrlNormalizer,
    quality: QualityFilter,
    classifier: ResourceClassifier,
    scope: ScopeController,
    scorer: BusinessScorer,
    dedup: DedupConfig,
    layered: Mutex<LayeredDeduper>,
    patterns: RwLock<PatternStore>,
    /// Canonical URL -> pattern of every admitted URL
    visited: RwLock<HashMap<String, PatternId>>,
    posts: Mutex<PostDeduper>,
    counters: Counters,
}

impl AdmissionCoordinator {
    /// Build the pipeline. Fails on invalid configuration.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let scope = ScopeController::new(&config.scope, &config.trap)?;

        Ok(Self {
            normalizer: UrlNormalizer::new(config.scope.spa_aware),
            quality: QualityFilter::new(config.quality.clone()),
            classifier: ResourceClassifier::new(&config.scope.include_domains),
            scope,
            scorer: BusinessScorer::new(config.scoring.clone()),
            dedup: config.dedup.clone(),
            layered: Mutex::new(LayeredDeduper::new(config.dedup.max_per_pattern_same_group)),
            patterns: RwLock::new(PatternStore::new()),
            visited: RwLock::new(HashMap::new()),
            posts: Mutex::new(PostDeduper::new()),
            counters: Counters::new("coordinator"),
        })
    }

    /// Decide whether a raw candidate found on `base` should be fetched.
    ///
    /// Returns one decision per canonical form of the candidate: two for a
    /// protocol-relative reference, one otherwise. Rejections are decisions,
    /// not errors; `Err` means the coordinator's own state is inconsistent.
    pub fn admit(&self, raw: &str, base: &str) -> Result<Vec<Decision>, AdmissionError> {
        let canonical = UrlNormalizer::parse_base(base)
            .and_then(|base| self.normalizer.normalize(raw, &base));

        let urls = match canonical {
            Ok(urls) => urls,
            Err(e) => {
                debug!("Parse failure for {:?} on {}: {}", raw, base, e);
                let decision = Decision::reject(None, Reason::ParseError(e.to_string()));
                self.count(&decision);
                return Ok(vec![decision]);
            }
        };

        // Quality looks at the raw text, so it is shared by every canonical form
        let mut quality: Option<Result<(), QualityRejection>> = None;

        let mut decisions = Vec::with_capacity(urls.len());
        for url in urls {
            let decision = self.admit_canonical(raw, &url, &mut quality)?;
            self.count(&decision);
            debug!("{}", decision);
            decisions.push(decision);
        }
        Ok(decisions)
    }

    fn admit_canonical(
        &self,
        raw: &str,
        url: &Url,
        quality: &mut Option<Result<(), QualityRejection>>,
    ) -> Result<Decision, AdmissionError> {
        let canonical = url.as_str().to_string();
        let reject = |reason| Ok(Decision::reject(Some(canonical.clone()), reason));

        if self.visited.read().contains_key(&canonical) {
            return reject(Reason::AlreadyVisited);
        }

        if let Err(rejection) = quality.get_or_insert_with(|| self.quality.check(raw)) {
            return reject(Reason::Quality(rejection.clone()));
        }

        if let Err(violation) = self.scope.check(url) {
            return reject(Reason::Scope(violation));
        }

        let kind = self.classifier.classify(url);
        if !kind.should_request() {
            self.layered.lock().record_asset(&canonical, kind);
            return reject(Reason::NotRequestable(kind));
        }

        let url_type = classify_type(url, kind);
        let pattern = derive_pattern(url);
        let hash = pattern_hash(&pattern);
        if let Err(skip) = self.layered.lock().peek(url, url_type, hash) {
            return reject(Reason::DedupSkip(skip));
        }

        let base_score = self.scorer.base_score(url, url_type);

        // Pattern lock first, then layered and visited. Holding the pattern
        // lock across the visited insert makes admission of one URL linearizable.
        let mut patterns = self.patterns.write();
        if self.visited.read().contains_key(&canonical) {
            return reject(Reason::AlreadyVisited);
        }

        let (id, _) = patterns.lookup_or_create_hashed(pattern, hash, url);
        let group = patterns.get_mut(id).ok_or_else(|| {
            warn!("Pattern {} indexed but missing from store", id);
            AdmissionError::InvariantViolation(format!("pattern {} missing from store", id))
        })?;
        group.seen += 1;
        group.observe_params(url);

        let score = self.scorer.effective_score(base_score, group.adjustment);
        let tier = self.scorer.tier(score);
        let mut decision = Decision {
            allow: false,
            canonical_url: Some(canonical.clone()),
            reason: Reason::Admitted,
            priority: 0.0,
            needs_dom_analysis: false,
            kind: Some(kind),
            url_type: Some(url_type),
            score: Some(score),
            tier: Some(tier),
            pattern: Some(id),
        };

        let minimum = self.scorer.config().min_business_score;
        if score < minimum && tier != Tier::High {
            group.skipped += 1;
            decision.reason = Reason::LowBusinessScore { score, minimum };
            return Ok(decision);
        }

        let cap = self.scorer.cap(tier);
        if tier != Tier::High && group.crawled >= cap {
            group.skipped += 1;
            decision.reason = Reason::CapExceeded {
                crawled: group.crawled,
                cap,
            };
            return Ok(decision);
        }

        if self.dedup.enable_dom_verification {
            let state = group.verification.state();
            if state == VerificationState::VerifiedSimilar {
                group.skipped += 1;
                decision.reason = Reason::VerifiedSimilar;
                return Ok(decision);
            }
            decision.needs_dom_analysis = kind == ResourceKind::Page && !state.is_terminal();
        }

        // The bucket slot is claimed only by URLs that are actually admitted
        if let Err(skip) = self.layered.lock().commit(url, url_type, hash) {
            group.skipped += 1;
            decision.reason = Reason::DedupSkip(skip);
            return Ok(decision);
        }

        self.visited.write().insert(canonical.clone(), id);
        group.crawled += 1;
        group.add_representative(&canonical);

        decision.allow = true;
        decision.priority = score / 100.0;
        Ok(decision)
    }

    /// Fold a fetch result into the admitted URL's pattern group.
    ///
    /// Updates fetch statistics, the learned score adjustment and, when the
    /// body is HTML and verification is enabled, the DOM samples.
    pub fn record_fetch_result(&self, outcome: &FetchOutcome<'_>) -> Result<(), AdmissionError> {
        let id = self
            .visited
            .read()
            .get(outcome.canonical_url)
            .copied()
            .ok_or_else(|| AdmissionError::UnknownUrl(outcome.canonical_url.to_string()))?;

        // Parse outside the lock; signatures are CPU-only and independent
        let signature = match outcome.html {
            Some(html) if self.dedup.enable_dom_verification => Some(DomSignature::from_html(html)),
            _ => None,
        };

        let mut patterns = self.patterns.write();
        let group = patterns.get_mut(id).ok_or_else(|| {
            AdmissionError::InvariantViolation(format!("visited URL points at missing pattern {}", id))
        })?;

        group.record_fetch(
            outcome.status,
            outcome.response_time_ms,
            outcome.new_links_found,
            outcome.new_forms_found,
            outcome.new_apis_found,
        );
        let adjustment = self.scorer.learn(group);
        debug!(
            "Pattern {} fetch {} in {}ms, adjustment {:.2}",
            id, outcome.status, outcome.response_time_ms, adjustment
        );

        if let Some(signature) = signature {
            if let Some(state) =
                group
                    .verification
                    .add_sample(signature, self.dedup.sample_count, self.dedup.dom_threshold)
            {
                info!(
                    "Pattern {} is {} (mean similarity {:.3})",
                    group.pattern,
                    state.as_str(),
                    group.verification.average_similarity().unwrap_or_default()
                );
                self.counters.incr(match state {
                    VerificationState::VerifiedSimilar => "verified_similar",
                    _ => "verified_different",
                });
            }
        }

        Ok(())
    }

    /// Admit a POST (or form) endpoint by fingerprint.
    ///
    /// Returns true for the first observation of a method, canonical URL and
    /// parameter-name set; false for repeats and for out-of-scope or
    /// unparseable URLs.
    pub fn admit_post(&self, url: &str, method: &str, param_names: &[String]) -> bool {
        let canonical = match self.normalizer.canonicalize(url) {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!("POST target {:?} rejected: {}", url, e);
                self.counters.incr("post_parse_error");
                return false;
            }
        };
        if let Err(violation) = self.scope.check(&canonical) {
            debug!("POST target {} out of scope: {}", canonical, violation);
            self.counters.incr("post_out_of_scope");
            return false;
        }

        let fingerprint = PostFingerprint::new(method, canonical.as_str(), param_names);
        self.posts.lock().admit(fingerprint)
    }

    pub fn is_visited(&self, canonical_url: &str) -> bool {
        self.visited.read().contains_key(canonical_url)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.read().len()
    }

    /// Number of patterns confirmed as near-duplicates; never decreases
    pub fn verified_similar_count(&self) -> usize {
        self.patterns
            .read()
            .iter()
            .filter(|g| g.verification.state() == VerificationState::VerifiedSimilar)
            .count()
    }

    /// Resources recorded instead of fetched
    pub fn assets(&self) -> Vec<AssetRecord> {
        self.layered.lock().assets().to_vec()
    }

    pub fn post_endpoints(&self) -> Vec<PostEndpoint> {
        self.posts.lock().endpoints()
    }

    pub fn pattern_summaries(&self) -> Vec<PatternSummary> {
        self.patterns
            .read()
            .iter()
            .map(|g| PatternSummary {
                id: g.id,
                pattern: g.pattern.clone(),
                first_url: g.first_url.clone(),
                representatives: g.representatives.clone(),
                seen: g.seen,
                crawled: g.crawled,
                skipped: g.skipped,
                fetches: g.fetches,
                adjustment: g.adjustment,
                verification: g.verification.state(),
                average_similarity: g.verification.average_similarity(),
                param_names: g.param_names.clone(),
            })
            .collect()
    }

    /// Flat counter map across every component
    pub fn stats(&self) -> BTreeMap<String, u64> {
        let mut stats = self.counters.snapshot();
        stats.extend(self.quality.stats());
        stats.extend(self.scope.stats());
        stats.extend(self.layered.lock().stats());
        stats.extend(self.patterns.read().stats());
        stats.extend(self.posts.lock().stats());
        stats.insert("coordinator.visited".to_string(), self.visited_count() as u64);
        stats.insert(
            "coordinator.verified_similar_patterns".to_string(),
            self.verified_similar_count() as u64,
        );
        stats
    }

    fn count(&self, decision: &Decision) {
        if decision.allow {
            self.counters.pass();
        } else {
            self.counters.reject(decision.reason.code());
        }
    }
}
