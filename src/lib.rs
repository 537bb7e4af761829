//! surfmap: URL discovery and admission for web attack-surface mapping
//!
//! Given pages, scripts and stylesheets, surfmap finds every URL-like
//! reference, canonicalizes it, throws away garbage and out-of-scope
//! targets, and admits only URLs likely to expose new behavior:
//! - Layered dedup by URL shape (static, ajax, file-parameter, RESTful, ...)
//! - Structural patterns with per-pattern crawl caps
//! - Business-value scoring with learned per-pattern adjustments
//! - DOM-similarity verification of near-duplicate pages
//! - POST endpoint dedup by (method, URL, parameter names)
//!
//! The [`crawl`] module is a small reqwest/tokio crawler that drives the
//! admission core end to end.

pub mod config;
pub mod crawl;
pub mod discovery;
pub mod types;
pub mod util;

pub use config::Config;
pub use discovery::{AdmissionCoordinator, Decision, FetchOutcome};
pub use types::*;
