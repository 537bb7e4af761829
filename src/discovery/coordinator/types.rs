//! Coordinator types: decisions, rejection reasons, fetch outcomes, errors

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::discovery::dom::VerificationState;
use crate::discovery::layered::DedupSkip;
use crate::discovery::pattern::PatternId;
use crate::discovery::quality::QualityRejection;
use crate::discovery::scope::ScopeViolation;
use crate::discovery::scoring::Tier;
use crate::types::{ResourceKind, UrlType};

/// Failures of the admission core itself. Always a bug or a caller mistake,
/// never a property of the candidate.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),
    #[error("no admitted URL '{0}'")]
    UnknownUrl(String),
}

/// Why a candidate was admitted or rejected
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    Admitted,
    ParseError(String),
    AlreadyVisited,
    Quality(QualityRejection),
    Scope(ScopeViolation),
    NotRequestable(ResourceKind),
    DedupSkip(DedupSkip),
    LowBusinessScore { score: f64, minimum: f64 },
    CapExceeded { crawled: u32, cap: u32 },
    VerifiedSimilar,
}

impl Reason {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::ParseError(_) => "parse_error",
            Self::AlreadyVisited => "already_visited",
            Self::Quality(_) => "quality",
            Self::Scope(_) => "scope",
            Self::NotRequestable(_) => "not_requestable",
            Self::DedupSkip(_) => "dedup_skip",
            Self::LowBusinessScore { .. } => "low_business_score",
            Self::CapExceeded { .. } => "cap_exceeded",
            Self::VerifiedSimilar => "verified_similar",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admitted => f.write_str("admitted"),
            Self::ParseError(detail) => write!(f, "parse error: {}", detail),
            Self::AlreadyVisited => f.write_str("already visited"),
            Self::Quality(rejection) => write!(f, "quality: {}", rejection),
            Self::Scope(violation) => write!(f, "out of scope: {}", violation),
            Self::NotRequestable(kind) => write!(f, "not requestable: {}", kind),
            Self::DedupSkip(skip) => write!(f, "dedup skip: {}", skip),
            Self::LowBusinessScore { .. } => f.write_str("low business score"),
            Self::CapExceeded { .. } => f.write_str("cap exceeded"),
            Self::VerifiedSimilar => f.write_str("pattern verified similar"),
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of admitting one canonical form of a candidate
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub allow: bool,
    pub canonical_url: Option<String>,
    pub reason: Reason,
    /// Fetch priority, higher first
    pub priority: f64,
    /// Fetch result should carry the HTML body for DOM sampling
    pub needs_dom_analysis: bool,
    pub kind: Option<ResourceKind>,
    pub url_type: Option<UrlType>,
    /// Effective business score, when scoring ran
    pub score: Option<f64>,
    pub tier: Option<Tier>,
    pub pattern: Option<PatternId>,
}

impl Decision {
    pub(crate) fn reject(canonical_url: Option<String>, reason: Reason) -> Self {
        Self {
            allow: false,
            canonical_url,
            reason,
            priority: 0.0,
            needs_dom_analysis: false,
            kind: None,
            url_type: None,
            score: None,
            tier: None,
            pattern: None,
        }
    }

    pub fn is_rejected_for(&self, code: &str) -> bool {
        !self.allow && self.reason.code() == code
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.allow { "ALLOW" } else { "REJECT" };
        write!(
            f,
            "{:6} {} ({})",
            verdict,
            self.canonical_url.as_deref().unwrap_or("-"),
            self.reason
        )
    }
}

/// What the fetcher reports back after fetching an admitted URL
#[derive(Debug, Clone, Copy)]
pub struct FetchOutcome<'a> {
    pub canonical_url: &'a str,
    pub status: u16,
    pub response_time_ms: u64,
    /// HTML body, for DOM sampling; `None` for non-HTML responses
    pub html: Option<&'a str>,
    pub new_links_found: bool,
    pub new_forms_found: bool,
    pub new_apis_found: bool,
}

/// Report view of one pattern group
#[derive(Debug, Clone, Serialize)]
pub struct PatternSummary {
    pub id: PatternId,
    pub pattern: String,
    pub first_url: String,
    pub representatives: Vec<String>,
    pub seen: u64,
    pub crawled: u32,
    pub skipped: u64,
    pub fetches: u64,
    pub adjustment: f64,
    pub verification: VerificationState,
    pub average_similarity: Option<f64>,
    pub param_names: BTreeSet<String>,
}
