//! URL discovery and admission
//!
//! Raw candidates come out of [`extractor`]; [`coordinator`] decides which
//! of them are worth a request:
//!
//! ```text
//! candidate -> normalize -> visited -> quality -> scope -> classify
//!           -> layered dedup -> pattern -> score / cap -> DOM gate -> admit
//! ```

pub mod classify;
pub mod coordinator;
pub mod dom;
pub mod extractor;
pub mod layered;
pub mod normalize;
pub mod pattern;
pub mod post_dedup;
pub mod quality;
pub mod scope;
pub mod scoring;
pub mod stats;

pub use classify::ResourceClassifier;
pub use coordinator::{
    AdmissionCoordinator, AdmissionError, Decision, FetchOutcome, PatternSummary, Reason,
};
pub use dom::{DomSignature, VerificationState};
pub use extractor::{ExtractedForm, Extraction, UrlExtractor};
pub use layered::{AssetRecord, DedupSkip, LayeredDeduper};
pub use normalize::{NormalizeError, UrlNormalizer};
pub use pattern::{derive_pattern, PatternId, PatternStore};
pub use post_dedup::{PostDeduper, PostEndpoint, PostFingerprint};
pub use quality::{QualityFilter, QualityLayer, QualityRejection};
pub use scope::{ScopeController, ScopeRule, ScopeViolation};
pub use scoring::{BusinessScorer, Tier};
pub use stats::Counters;
