//! Core types shared across the admission pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// What kind of resource a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Page,
    Javascript,
    Css,
    Image,
    Video,
    Audio,
    Font,
    Document,
    Archive,
    OtherStatic,
    External,
    Api,
}

impl ResourceKind {
    /// Whether a URL of this kind should be fetched.
    ///
    /// Pages, scripts, stylesheets and API endpoints yield more URLs or
    /// describe the application surface; everything else is recorded only.
    pub fn should_request(self) -> bool {
        matches!(self, Self::Page | Self::Javascript | Self::Css | Self::Api)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Javascript => "javascript",
            Self::Css => "css",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Font => "font",
            Self::Document => "document",
            Self::Archive => "archive",
            Self::OtherStatic => "other-static",
            Self::External => "external",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL shape used to pick a dedup bucket. Orthogonal to [`ResourceKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UrlType {
    StaticAsset,
    Ajax,
    FileParam,
    Restful,
    MultiParam,
    Normal,
}

impl UrlType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StaticAsset => "static-asset",
            Self::Ajax => "ajax",
            Self::FileParam => "file-param",
            Self::Restful => "restful",
            Self::MultiParam => "multi-param",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for UrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a raw candidate string was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    /// An HTML attribute such as `a@href`
    Attribute { tag: String, attr: String },
    /// A `meta http-equiv=refresh` target
    MetaRefresh,
    /// Inline event handler attribute (`onclick`, ...)
    EventHandler { attr: String },
    /// JavaScript source, with the context that anchored the match
    Script { context: JsContext },
    /// `url(...)` or `@import` in CSS
    Css,
    /// HTTP response header
    Header { name: String },
}

/// The anchoring context of a URL recovered from JavaScript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsContext {
    AbsoluteUrl,
    NetworkCall,
    ConfigAssignment,
    PathLiteral,
}

/// A URL-like string observed in source material, before any validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCandidate {
    pub value: String,
    pub provenance: Provenance,
    /// Absolute URL of the response the candidate came from
    pub base: Url,
}

impl RawCandidate {
    pub fn new(value: impl Into<String>, provenance: Provenance, base: &Url) -> Self {
        Self {
            value: value.into(),
            provenance,
            base: base.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_request_table() {
        let requested = [
            ResourceKind::Page,
            ResourceKind::Javascript,
            ResourceKind::Css,
            ResourceKind::Api,
        ];
        let recorded = [
            ResourceKind::Image,
            ResourceKind::Video,
            ResourceKind::Audio,
            ResourceKind::Font,
            ResourceKind::Document,
            ResourceKind::Archive,
            ResourceKind::OtherStatic,
            ResourceKind::External,
        ];
        assert!(requested.iter().all(|k| k.should_request()));
        assert!(recorded.iter().all(|k| !k.should_request()));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ResourceKind::OtherStatic.to_string(), "other-static");
        assert_eq!(UrlType::FileParam.to_string(), "file-param");
    }
}
