//! URL-type routing and per-bucket duplicate policies
//!
//! Every canonical URL gets one [`UrlType`]; the type's bucket decides
//! whether the URL is a duplicate:
//!
//! | type         | key                     | policy                              |
//! |--------------|-------------------------|-------------------------------------|
//! | static-asset | full URL                | once                                |
//! | ajax         | full URL                | once                                |
//! | file-param   | pattern + value variant | up to `max_per_pattern_same_group`  |
//! | restful      | full URL                | once                                |
//! | multi-param  | pattern                 | first is representative, exact repeats skipped |
//! | normal       | pattern                 | same as multi-param                 |
//!
//! Admission peeks at the bucket early and commits only once a URL passes
//! every later gate, so a URL rejected for score or cap never holds a slot.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use url::Url;

use super::classify::{has_file_param, FILE_PARAM_KEYS};
use super::pattern::{query_keys, segment_placeholder};
use super::stats::Counters;
use crate::types::{ResourceKind, UrlType};

/// Query keys that mark a JSONP/AJAX endpoint
const AJAX_PARAM_KEYS: &[&str] = &["callback", "jsonp", "jsoncallback"];

/// Pick the dedup bucket for a canonical URL
pub fn classify_type(url: &Url, kind: ResourceKind) -> UrlType {
    if matches!(
        kind,
        ResourceKind::Javascript
            | ResourceKind::Css
            | ResourceKind::Image
            | ResourceKind::Video
            | ResourceKind::Audio
            | ResourceKind::Font
            | ResourceKind::Document
            | ResourceKind::Archive
            | ResourceKind::OtherStatic
    ) {
        return UrlType::StaticAsset;
    }

    let keys = query_keys(url);
    let lower_path = url.path().to_lowercase();
    if kind == ResourceKind::Api
        || lower_path.contains("ajax")
        || keys
            .iter()
            .any(|k| AJAX_PARAM_KEYS.contains(&k.to_ascii_lowercase().as_str()))
    {
        return UrlType::Ajax;
    }

    if has_file_param(url) {
        return UrlType::FileParam;
    }

    if url
        .path()
        .split('/')
        .any(|segment| !segment.is_empty() && segment_placeholder(segment) != segment)
    {
        return UrlType::Restful;
    }

    if keys.len() >= 2 {
        return UrlType::MultiParam;
    }

    UrlType::Normal
}

/// How a file parameter's value is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileVariant {
    Plain,
    UrlEncoded,
    Traversal,
}

impl FileVariant {
    /// Variant of the first file-like parameter in the raw query
    pub fn of(url: &Url) -> Self {
        let Some(query) = url.query() else {
            return Self::Plain;
        };
        for pair in query.split('&') {
            let (key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            if !FILE_PARAM_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
                continue;
            }
            let lower = raw_value.to_ascii_lowercase();
            if lower.contains("../")
                || lower.contains("..\\")
                || lower.contains("%2e%2e")
                || lower.contains("..%2f")
                || lower.contains("..%5c")
            {
                return Self::Traversal;
            }
            if lower.contains('%') {
                return Self::UrlEncoded;
            }
            return Self::Plain;
        }
        Self::Plain
    }
}

/// Why the layered deduper skipped a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupSkip {
    pub url_type: UrlType,
    pub detail: String,
}

impl fmt::Display for DedupSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bucket: {}", self.url_type, self.detail)
    }
}

/// Whether a URL is the first of its bucket group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketOutcome {
    Representative,
    Variant,
}

/// A non-requested resource kept for the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRecord {
    pub url: String,
    pub kind: ResourceKind,
}

/// Per-type duplicate tables
#[derive(Debug)]
pub struct LayeredDeduper {
    max_per_group: usize,
    static_assets: HashSet<String>,
    ajax: HashSet<String>,
    restful: HashSet<String>,
    file_param: HashMap<(u128, FileVariant), HashSet<String>>,
    by_pattern: HashMap<u128, HashSet<String>>,
    assets: Vec<AssetRecord>,
    asset_index: HashSet<String>,
    counters: Counters,
}

impl LayeredDeduper {
    pub fn new(max_per_pattern_same_group: usize) -> Self {
        Self {
            max_per_group: max_per_pattern_same_group.max(1),
            static_assets: HashSet::new(),
            ajax: HashSet::new(),
            restful: HashSet::new(),
            file_param: HashMap::new(),
            by_pattern: HashMap::new(),
            assets: Vec::new(),
            asset_index: HashSet::new(),
            counters: Counters::new("layered"),
        }
    }

    /// Check `url` against the bucket owned by `url_type` without claiming a
    /// slot. Counts the type and any rejection.
    ///
    /// `pattern_hash` is the structural pattern hash of `url`.
    pub fn peek(
        &self,
        url: &Url,
        url_type: UrlType,
        pattern_hash: u128,
    ) -> Result<BucketOutcome, DedupSkip> {
        self.counters.incr(type_event(url_type));
        let result = self.evaluate(url, url_type, pattern_hash);
        if result.is_err() {
            self.counters.reject(bucket_reason(url_type));
        }
        result
    }

    /// Claim the bucket slot for an admitted URL. Re-evaluates, so a slot
    /// taken by a concurrent admission since [`peek`](Self::peek) is caught.
    pub fn commit(
        &mut self,
        url: &Url,
        url_type: UrlType,
        pattern_hash: u128,
    ) -> Result<BucketOutcome, DedupSkip> {
        let outcome = match self.evaluate(url, url_type, pattern_hash) {
            Ok(outcome) => outcome,
            Err(skip) => {
                self.counters.reject(bucket_reason(url_type));
                return Err(skip);
            }
        };

        let key = url.as_str().to_string();
        match url_type {
            UrlType::StaticAsset => self.static_assets.insert(key),
            UrlType::Ajax => self.ajax.insert(key),
            UrlType::Restful => self.restful.insert(key),
            UrlType::FileParam => self
                .file_param
                .entry((pattern_hash, FileVariant::of(url)))
                .or_default()
                .insert(key),
            UrlType::MultiParam | UrlType::Normal => {
                self.by_pattern.entry(pattern_hash).or_default().insert(key)
            }
        };
        self.counters.pass();
        Ok(outcome)
    }

    /// Peek then commit in one step
    pub fn check(
        &mut self,
        url: &Url,
        url_type: UrlType,
        pattern_hash: u128,
    ) -> Result<BucketOutcome, DedupSkip> {
        self.peek(url, url_type, pattern_hash)?;
        self.commit(url, url_type, pattern_hash)
    }

    fn evaluate(
        &self,
        url: &Url,
        url_type: UrlType,
        pattern_hash: u128,
    ) -> Result<BucketOutcome, DedupSkip> {
        let key = url.as_str();
        match url_type {
            UrlType::StaticAsset => once(&self.static_assets, key, url_type),
            UrlType::Ajax => once(&self.ajax, key, url_type),
            UrlType::Restful => once(&self.restful, key, url_type),
            UrlType::FileParam => {
                let variant = FileVariant::of(url);
                match self.file_param.get(&(pattern_hash, variant)) {
                    Some(slot) if slot.contains(key) => Err(skip(url_type, "exact repeat")),
                    Some(slot) if slot.len() >= self.max_per_group => Err(skip(
                        url_type,
                        format!("{} {:?} samples already kept", slot.len(), variant),
                    )),
                    Some(slot) if !slot.is_empty() => Ok(BucketOutcome::Variant),
                    _ => Ok(BucketOutcome::Representative),
                }
            }
            UrlType::MultiParam | UrlType::Normal => match self.by_pattern.get(&pattern_hash) {
                Some(members) if members.contains(key) => Err(skip(url_type, "exact repeat")),
                Some(members) if !members.is_empty() => Ok(BucketOutcome::Variant),
                _ => Ok(BucketOutcome::Representative),
            },
        }
    }

    /// Keep a resource that will not be requested. Returns false if already recorded.
    pub fn record_asset(&mut self, url: &str, kind: ResourceKind) -> bool {
        if !self.asset_index.insert(url.to_string()) {
            return false;
        }
        self.counters.incr("assets_recorded");
        self.assets.push(AssetRecord {
            url: url.to_string(),
            kind,
        });
        true
    }

    pub fn assets(&self) -> &[AssetRecord] {
        &self.assets
    }

    pub fn stats(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }
}

fn once(set: &HashSet<String>, key: &str, url_type: UrlType) -> Result<BucketOutcome, DedupSkip> {
    if set.contains(key) {
        Err(skip(url_type, "exact repeat"))
    } else {
        Ok(BucketOutcome::Representative)
    }
}

fn skip(url_type: UrlType, detail: impl Into<String>) -> DedupSkip {
    DedupSkip {
        url_type,
        detail: detail.into(),
    }
}

fn bucket_reason(url_type: UrlType) -> &'static str {
    match url_type {
        UrlType::StaticAsset => "static_asset",
        UrlType::Ajax => "ajax",
        UrlType::FileParam => "file_param",
        UrlType::Restful => "restful",
        UrlType::MultiParam => "multi_param",
        UrlType::Normal => "normal",
    }
}

fn type_event(url_type: UrlType) -> &'static str {
    match url_type {
        UrlType::StaticAsset => "type.static_asset",
        UrlType::Ajax => "type.ajax",
        UrlType::FileParam => "type.file_param",
        UrlType::Restful => "type.restful",
        UrlType::MultiParam => "type.multi_param",
        UrlType::Normal => "type.normal",
    }
}
