//! Reference crawler driving the admission core
//!
//! N tokio workers share one [`AdmissionCoordinator`], one fetch engine and
//! one frontier. Each fetched response is mined for candidates, every
//! candidate goes through admission, and the fetch outcome is reported back
//! so the coordinator can sample DOMs and learn pattern adjustments.

mod fetcher;
mod frontier;
mod report;

pub use fetcher::{FetchEngine, FetchError, FetchResult, FetchStats};
pub use frontier::{ScoredUrl, UrlFrontier};
pub use report::{CrawlReport, EndpointRecord};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::discovery::{
    AdmissionCoordinator, Decision, ExtractedForm, FetchOutcome, UrlExtractor,
};
use crate::types::{RawCandidate, ResourceKind};

/// Idle wait while other workers may still produce URLs
const IDLE_POLL: Duration = Duration::from_millis(25);

/// What a processed page contributed
#[derive(Debug, Default, Clone, Copy)]
struct Discoveries {
    links: usize,
    forms: usize,
    apis: usize,
}

/// Frontier plus the count of URLs popped but not yet finished
#[derive(Default)]
struct WorkQueue {
    frontier: UrlFrontier,
    in_flight: usize,
}

enum Next {
    Work(ScoredUrl),
    Wait,
    Done,
}

pub struct Crawler {
    config: CrawlConfig,
    coordinator: Arc<AdmissionCoordinator>,
    fetcher: Arc<FetchEngine>,
    extractor: Arc<UrlExtractor>,
    queue: Arc<Mutex<WorkQueue>>,
    endpoints: Arc<Mutex<Vec<EndpointRecord>>>,
    pages: Arc<AtomicUsize>,
}

impl Crawler {
    pub fn new(config: CrawlConfig, coordinator: Arc<AdmissionCoordinator>) -> Result<Self> {
        let fetcher = FetchEngine::new(&config).context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            coordinator,
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(UrlExtractor::new()),
            queue: Arc::new(Mutex::new(WorkQueue::default())),
            endpoints: Arc::new(Mutex::new(Vec::new())),
            pages: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn coordinator(&self) -> &Arc<AdmissionCoordinator> {
        &self.coordinator
    }

    /// Admit seed URLs. Each seed is its own base.
    pub fn add_seeds(&self, seeds: &[String]) -> Result<usize> {
        let mut admitted = 0;
        for seed in seeds {
            let decisions = self.coordinator.admit(seed, seed)?;
            for decision in &decisions {
                if !decision.allow {
                    warn!("Seed {} not admitted: {}", seed, decision.reason);
                }
            }
            admitted += self.enqueue(&decisions);
        }
        Ok(admitted)
    }

    /// Run workers until the frontier drains or the page limit is hit
    pub async fn run(self: Arc<Self>, seeds: Vec<String>) -> Result<CrawlReport> {
        let start = Instant::now();
        let admitted = self.add_seeds(&seeds)?;
        info!(
            "Starting crawl: {} seed(s) admitted, {} worker(s)",
            admitted, self.config.workers
        );

        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let crawler = Arc::clone(&self);
            handles.push(tokio::spawn(async move { crawler.worker(worker_id).await }));
        }
        for handle in handles {
            handle.await.context("Crawl worker panicked")??;
        }

        let report = self.report(seeds, start.elapsed());
        info!(
            "Crawl finished: {} pages, {} endpoints, {} POST endpoints in {:?}",
            report.pages_fetched,
            report.endpoints.len(),
            report.post_endpoints.len(),
            start.elapsed()
        );
        Ok(report)
    }

    async fn worker(&self, worker_id: usize) -> Result<()> {
        debug!("Worker {} started", worker_id);
        loop {
            match self.next() {
                Next::Work(item) => {
                    let result = self.process(&item).await;
                    self.queue.lock().in_flight -= 1;
                    result?;
                    if self.config.delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
                    }
                }
                Next::Wait => tokio::time::sleep(IDLE_POLL).await,
                Next::Done => break,
            }
        }
        debug!("Worker {} finished", worker_id);
        Ok(())
    }

    fn next(&self) -> Next {
        let mut queue = self.queue.lock();
        if self.limit_reached() {
            return Next::Done;
        }
        match queue.frontier.pop() {
            Some(item) => {
                queue.in_flight += 1;
                self.pages.fetch_add(1, Ordering::SeqCst);
                Next::Work(item)
            }
            None if queue.in_flight == 0 => Next::Done,
            None => Next::Wait,
        }
    }

    fn limit_reached(&self) -> bool {
        self.config.max_pages > 0 && self.pages.load(Ordering::SeqCst) >= self.config.max_pages
    }

    /// Fetch one admitted URL, admit what it links to, report back
    async fn process(&self, item: &ScoredUrl) -> Result<()> {
        let fetched = self.fetcher.fetch(&item.url).await;
        let canonical = item.url.as_str();

        let response = match fetched {
            Ok(response) => response,
            Err(e) => {
                self.record_endpoint(item, None, Duration::ZERO, Some(e.to_string()));
                self.coordinator.record_fetch_result(&FetchOutcome {
                    canonical_url: canonical,
                    status: 0,
                    response_time_ms: 0,
                    html: None,
                    new_links_found: false,
                    new_forms_found: false,
                    new_apis_found: false,
                })?;
                return Ok(());
            }
        };

        debug!(
            "Fetched {} -> {} ({}, {}ms)",
            canonical,
            response.status_code,
            response.content_type,
            response.elapsed_ms()
        );

        let (candidates, forms) = self.extract(&response).await?;
        let mut found = self.admit_candidates(&candidates)?;
        found.forms += self.admit_forms(&forms, &response.final_url)?;

        let html = (response.is_html() && item.needs_dom_analysis).then_some(response.body.as_str());
        self.coordinator.record_fetch_result(&FetchOutcome {
            canonical_url: canonical,
            status: response.status_code,
            response_time_ms: response.elapsed_ms(),
            html,
            new_links_found: found.links > 0,
            new_forms_found: found.forms > 0,
            new_apis_found: found.apis > 0,
        })?;

        self.record_endpoint(item, Some(&response), response.fetch_duration, None);
        Ok(())
    }

    /// Candidates from headers and a body the extractor understands
    async fn extract(&self, response: &FetchResult) -> Result<(Vec<RawCandidate>, Vec<ExtractedForm>)> {
        let base = response.final_url.clone();
        let mut candidates = self.extractor.extract_headers(&response.headers, &base);
        let mut forms = Vec::new();

        if response.is_html() {
            // HTML parsing is CPU-bound; keep it off the async workers
            let extractor = Arc::clone(&self.extractor);
            let body = response.body.clone();
            let extraction =
                tokio::task::spawn_blocking(move || extractor.extract_html(&body, &base))
                    .await
                    .context("HTML extraction task failed")?;
            candidates.extend(extraction.candidates);
            forms = extraction.forms;
        } else if response.is_javascript() {
            candidates.extend(self.extractor.extract_js(&response.body, &base));
        } else if response.is_css() {
            candidates.extend(self.extractor.extract_css(&response.body, &base));
        }

        Ok((candidates, forms))
    }

    fn admit_candidates(&self, candidates: &[RawCandidate]) -> Result<Discoveries> {
        let mut found = Discoveries::default();
        for candidate in candidates {
            let decisions = self
                .coordinator
                .admit(&candidate.value, candidate.base.as_str())?;
            for decision in decisions.iter().filter(|d| d.allow) {
                match decision.kind {
                    Some(ResourceKind::Api) => found.apis += 1,
                    _ => found.links += 1,
                }
            }
            self.enqueue(&decisions);
        }
        Ok(found)
    }

    /// POST forms go to fingerprint dedup, GET forms become query candidates
    fn admit_forms(&self, forms: &[ExtractedForm], page_url: &Url) -> Result<usize> {
        let mut new_forms = 0;
        for form in forms {
            let action = if form.action.is_empty() {
                page_url.clone()
            } else {
                match page_url.join(&form.action) {
                    Ok(url) => url,
                    Err(e) => {
                        debug!("Unresolvable form action {:?}: {}", form.action, e);
                        continue;
                    }
                }
            };

            if form.is_post() {
                if self
                    .coordinator
                    .admit_post(action.as_str(), &form.method, &form.param_names)
                {
                    new_forms += 1;
                }
            } else {
                let candidate = ExtractedForm {
                    action: action.to_string(),
                    ..form.clone()
                }
                .get_candidate();
                let decisions = self.coordinator.admit(&candidate, page_url.as_str())?;
                if self.enqueue(&decisions) > 0 {
                    new_forms += 1;
                }
            }
        }
        Ok(new_forms)
    }

    /// Push admitted decisions onto the frontier; returns how many
    fn enqueue(&self, decisions: &[Decision]) -> usize {
        let mut queue = self.queue.lock();
        let mut pushed = 0;
        for decision in decisions.iter().filter(|d| d.allow) {
            let Some(canonical) = decision.canonical_url.as_deref() else {
                continue;
            };
            match Url::parse(canonical) {
                Ok(url) => {
                    queue.frontier.push(url, decision);
                    pushed += 1;
                }
                Err(e) => warn!("Admitted URL {} does not parse: {}", canonical, e),
            }
        }
        pushed
    }

    fn record_endpoint(
        &self,
        item: &ScoredUrl,
        response: Option<&FetchResult>,
        elapsed: Duration,
        error: Option<String>,
    ) {
        let mut param_names: Vec<String> = item
            .url
            .query_pairs()
            .map(|(k, _)| k.into_owned())
            .filter(|k| !k.is_empty())
            .collect();
        param_names.sort();
        param_names.dedup();

        self.endpoints.lock().push(EndpointRecord {
            url: item.url.to_string(),
            method: "GET".to_string(),
            kind: item.kind,
            url_type: item.url_type,
            status: response.map(|r| r.status_code),
            content_type: response
                .map(|r| r.content_type.clone())
                .filter(|ct| !ct.is_empty()),
            param_names,
            score: item.score,
            response_time_ms: elapsed.as_millis() as u64,
            error,
        });
    }

    fn report(&self, seeds: Vec<String>, elapsed: Duration) -> CrawlReport {
        let mut stats = self.coordinator.stats();
        let fetch = self.fetcher.stats();
        stats.insert("fetch.total".to_string(), fetch.total_fetches.load(Ordering::Relaxed));
        stats.insert("fetch.successes".to_string(), fetch.successes.load(Ordering::Relaxed));
        stats.insert("fetch.failures".to_string(), fetch.failures.load(Ordering::Relaxed));
        stats.insert("fetch.bytes".to_string(), fetch.bytes.load(Ordering::Relaxed));
        stats.insert(
            "frontier.pushed".to_string(),
            self.queue.lock().frontier.total_pushed(),
        );

        let endpoints = self.endpoints.lock().clone();
        CrawlReport {
            seeds,
            duration_ms: elapsed.as_millis() as u64,
            pages_fetched: endpoints.len(),
            endpoints,
            post_endpoints: self.coordinator.post_endpoints(),
            assets: self.coordinator.assets(),
            patterns: self.coordinator.pattern_summaries(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn crawler(max_pages: usize) -> Crawler {
        let mut config = Config::default();
        config.scope.include_domains = vec!["t.example".to_string()];
        config.crawl.max_pages = max_pages;
        let coordinator = Arc::new(AdmissionCoordinator::new(&config).unwrap());
        Crawler::new(config.crawl, coordinator).unwrap()
    }

    #[test]
    fn test_seeds_are_admitted_once() {
        let c = crawler(10);
        let seeds = vec!["http://t.example/".to_string(), "http://t.example/".to_string()];
        assert_eq!(c.add_seeds(&seeds).unwrap(), 1);
        assert_eq!(c.queue.lock().frontier.len(), 1);
    }

    #[test]
    fn test_out_of_scope_seed_is_not_queued() {
        let c = crawler(10);
        assert_eq!(c.add_seeds(&["http://other.example/".to_string()]).unwrap(), 0);
        assert!(matches!(c.next(), Next::Done));
    }

    #[test]
    fn test_page_limit_stops_workers() {
        let c = crawler(1);
        c.add_seeds(&["http://t.example/".to_string(), "http://t.example/login".to_string()])
            .unwrap();
        assert!(matches!(c.next(), Next::Work(_)));
        assert!(matches!(c.next(), Next::Done));
    }

    #[test]
    fn test_wait_while_in_flight() {
        let c = crawler(0);
        c.add_seeds(&["http://t.example/".to_string()]).unwrap();
        assert!(matches!(c.next(), Next::Work(_)));
        assert!(matches!(c.next(), Next::Wait));
        c.queue.lock().in_flight -= 1;
        assert!(matches!(c.next(), Next::Done));
    }

    #[test]
    fn test_forms_feed_admission() {
        let c = crawler(10);
        let page = Url::parse("http://t.example/account").unwrap();
        let forms = vec![
            ExtractedForm {
                action: "/login".to_string(),
                method: "POST".to_string(),
                param_names: vec!["password".to_string(), "username".to_string()],
            },
            ExtractedForm {
                action: "/login".to_string(),
                method: "POST".to_string(),
                param_names: vec!["password".to_string(), "username".to_string()],
            },
            ExtractedForm {
                action: String::new(),
                method: "GET".to_string(),
                param_names: vec!["q".to_string()],
            },
        ];
        assert_eq!(c.admit_forms(&forms, &page).unwrap(), 2);
        assert_eq!(c.coordinator().post_endpoints().len(), 1);
        assert!(c.coordinator().is_visited("http://t.example/account?q="));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_reported() {
        let mut config = Config::default();
        config.crawl.request_timeout_secs = 2;
        config.crawl.connect_timeout_secs = 1;
        let coordinator = Arc::new(AdmissionCoordinator::new(&config).unwrap());
        let c = Crawler::new(config.crawl, coordinator).unwrap();

        // Port 9 on loopback refuses connections
        c.add_seeds(&["http://127.0.0.1:9/".to_string()]).unwrap();
        let Next::Work(item) = c.next() else {
            panic!("seed should be queued");
        };
        c.process(&item).await.unwrap();

        let endpoints = c.endpoints.lock();
        assert_eq!(endpoints.len(), 1);
        assert!(endpoints[0].status.is_none());
        assert!(endpoints[0].error.is_some());
        let summary = &c.coordinator().pattern_summaries()[0];
        assert_eq!(summary.fetches, 1);
    }

    async fn crawl_redirect(location: &str) -> (Crawler, Url) {
        let url = fetcher::tests::serve_once(fetcher::tests::redirect_to(location)).await;
        let mut config = Config::default();
        config.scope.include_domains = vec!["127.0.0.1".to_string()];
        let coordinator = Arc::new(AdmissionCoordinator::new(&config).unwrap());
        let c = Crawler::new(config.crawl, coordinator).unwrap();

        c.add_seeds(&[url.to_string()]).unwrap();
        let Next::Work(item) = c.next() else {
            panic!("seed should be queued");
        };
        c.process(&item).await.unwrap();
        c.queue.lock().in_flight -= 1;
        (c, url)
    }

    #[tokio::test]
    async fn test_offsite_redirect_goes_through_scope() {
        let (c, _) = crawl_redirect("http://other.example/landing").await;
        assert!(c.queue.lock().frontier.is_empty());
        assert!(!c.coordinator().is_visited("http://other.example/landing"));
        assert_eq!(c.endpoints.lock()[0].status, Some(302));
    }

    #[tokio::test]
    async fn test_onsite_redirect_is_queued() {
        let (c, url) = crawl_redirect("/next").await;
        let target = url.join("/next").unwrap();
        assert!(c.coordinator().is_visited(target.as_str()));
        assert_eq!(c.queue.lock().frontier.len(), 1);
    }
}
