//! Candidate quality filter
//!
//! Rejects strings that are clearly not URLs before they reach the
//! normalizer. Layers run in a fixed order and the first one that fires
//! decides the rejection reason:
//!
//! 1. length bounds
//! 2. exact keyword sets (JS words, CSS properties, MIME types, HTTP methods)
//! 3. code patterns (JS syntax, HTML tags, bracketed expressions, regex literals)
//! 4. escape-sequence density
//! 5. control-character density
//! 6. structural garbage (`]}`, `({`, paired quotes)
//! 7. pure-symbol / color / single-letter / pure-number strings
//!
//! The filter keeps no state between candidates other than its counters.

use regex::{Regex, RegexSet};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::stats::Counters;
use crate::config::QualityConfig;

const MIN_LENGTH: usize = 2;

const JS_WORDS: &[&str] = &[
    "function", "return", "var", "let", "const", "if", "else", "for", "while", "do",
    "switch", "case", "break", "continue", "new", "this", "typeof", "instanceof", "null",
    "undefined", "true", "false", "try", "catch", "finally", "throw", "class", "extends",
    "super", "import", "export", "default", "delete", "void", "yield", "async", "await",
    "in", "of", "with", "debugger", "arguments", "window", "document", "console",
    "navigator", "location", "math", "json", "object", "array", "string", "number",
    "boolean", "date", "regexp", "promise", "error", "nan", "infinity", "prototype",
    "constructor", "length", "jquery", "self", "globalthis", "localstorage",
    "sessionstorage", "settimeout", "setinterval", "alert", "eval", "symbol",
];

const CSS_PROPERTIES: &[&str] = &[
    "color", "background", "margin", "padding", "border", "display", "position", "width",
    "height", "font", "opacity", "cursor", "float", "visibility", "overflow", "transform",
    "transition", "animation", "outline", "z-index", "line-height", "vertical-align",
    "white-space", "flex", "grid", "fill", "stroke", "none", "inherit", "initial",
    "important", "px", "em", "rem", "auto", "block", "inline", "inline-block", "absolute",
    "relative", "fixed", "hidden", "visible", "solid", "bold", "italic", "center",
];

/// Property families rejected in their `name-*` form (e.g. `margin-top`)
const CSS_PREFIXES: &[&str] = &[
    "font-", "text-", "border-", "margin-", "padding-", "background-", "flex-", "grid-",
    "transition-", "transform-", "animation-", "overflow-", "outline-", "box-",
    "list-style", "min-", "max-", "word-", "letter-", "align-", "justify-", "column-",
    "pointer-", "user-", "white-", "line-", "vertical-", "webkit-", "-webkit-", "-moz-",
    "-ms-",
];

const MIME_TYPES: &[&str] = &[
    "text/html", "text/css", "text/javascript", "text/plain", "text/xml", "text/csv",
    "text/template", "text/x-template", "text/babel", "application/json",
    "application/javascript", "application/x-javascript", "application/xml",
    "application/xhtml+xml", "application/x-www-form-urlencoded", "application/octet-stream",
    "application/pdf", "application/zip", "application/ld+json", "multipart/form-data",
    "image/png", "image/jpeg", "image/jpg", "image/gif", "image/svg+xml", "image/webp",
    "image/x-icon", "image/vnd.microsoft.icon", "audio/mpeg", "video/mp4", "font/woff",
    "font/woff2",
];

const HTTP_METHODS: &[&str] = &[
    "get", "post", "put", "delete", "patch", "head", "options", "trace", "connect",
];

/// Extensions that make `name.ext` a file reference rather than member access
const FILE_EXTENSIONS: &[&str] = &[
    "html", "htm", "shtml", "xhtml", "php", "php3", "php4", "php5", "phtml", "jsp", "jspx",
    "asp", "aspx", "ashx", "asmx", "do", "action", "cgi", "pl", "py", "rb", "cfm", "js",
    "mjs", "css", "json", "xml", "txt", "pdf", "png", "jpg", "jpeg", "gif", "svg", "ico",
    "webp", "zip", "gz", "tar", "rar", "doc", "docx", "xls", "xlsx", "csv", "mp4", "mp3",
    "woff", "woff2", "ttf", "eot", "map", "swf", "wasm",
];

const CODE_MARKERS: &[&str] = &[
    r"function\s*\(",
    r"function\s+[\w$]+\s*\(",
    r"=>\s*[{(]",
    r"\b(?:var|let|const)\s+[\w$]+\s*=",
    r"===",
    r"!==",
    r"&&",
    r"\|\|",
    r"console\.",
    r"\.push\(",
    r"\.forEach\(",
    r"\.map\(",
    r"\.filter\(",
    r"\.then\(",
    r"\.catch\(",
    r"addEventListener",
    r"getElementById",
    r"querySelector",
    r"\breturn\s",
    r"\bnew\s+[A-Z][\w$]*\s*\(",
    r"\)\s*\{",
    r";\s*\}",
    r"^[A-Za-z_$][\w$.]*\s*\(.*\)$",
    r"<[a-zA-Z/!][^>]*>",
    r"(?s)^[({\[].*[)}\]]$",
];

const PURE_SYMBOL_PATTERNS: &[&str] = &[
    r"^[#?&=\-_./:\\|~!@$%^*()+\[\]{}]+$",
    r"^#[0-9A-Fa-f]{3,8}$",
    r"^[a-zA-Z]$",
    r"^\d+$",
];

const STRUCTURE_MARKERS: &[&str] = &["]}", "[{", "})", "({", "\"\"", "''"];

/// Which layer rejected a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityLayer {
    Length,
    Keyword,
    Pattern,
    Encoding,
    Control,
    Structure,
    PureSymbol,
}

impl QualityLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::Keyword => "keyword",
            Self::Pattern => "pattern",
            Self::Encoding => "encoding",
            Self::Control => "control",
            Self::Structure => "structure",
            Self::PureSymbol => "pure_symbol",
        }
    }
}

/// Structured quality rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityRejection {
    pub layer: QualityLayer,
    pub detail: String,
}

impl QualityRejection {
    fn new(layer: QualityLayer, detail: impl Into<String>) -> Self {
        Self {
            layer,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for QualityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.layer.as_str(), self.detail)
    }
}

/// Layered rejection cascade for raw candidates
pub struct QualityFilter {
    config: QualityConfig,
    keywords: HashSet<&'static str>,
    css_properties: HashSet<&'static str>,
    mime_types: HashSet<&'static str>,
    http_methods: HashSet<&'static str>,
    file_extensions: HashSet<&'static str>,
    code_markers: RegexSet,
    member_access: Regex,
    regex_literal: Regex,
    encoded: Regex,
    pure_symbols: RegexSet,
    counters: Counters,
}

impl QualityFilter {
    pub fn new(config: QualityConfig) -> Self {
        Self {
            config,
            keywords: JS_WORDS.iter().copied().collect(),
            css_properties: CSS_PROPERTIES.iter().copied().collect(),
            mime_types: MIME_TYPES.iter().copied().collect(),
            http_methods: HTTP_METHODS.iter().copied().collect(),
            file_extensions: FILE_EXTENSIONS.iter().copied().collect(),
            code_markers: RegexSet::new(CODE_MARKERS).expect("built-in code markers compile"),
            member_access: Regex::new(r"^[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)+$")
                .expect("built-in member access pattern compiles"),
            regex_literal: Regex::new(r"(?s)^/(.+)/[gimsuy]*$")
                .expect("built-in regex literal pattern compiles"),
            encoded: Regex::new(
                r"%[0-9A-Fa-f]{2}|\\x[0-9A-Fa-f]{2}|\\u[0-9A-Fa-f]{4}|&#[0-9]+;|&#[xX][0-9A-Fa-f]+;|&[a-zA-Z]+;",
            )
            .expect("built-in escape pattern compiles"),
            pure_symbols: RegexSet::new(PURE_SYMBOL_PATTERNS)
                .expect("built-in symbol patterns compile"),
            counters: Counters::new("quality"),
        }
    }

    /// Check a candidate. `Ok(())` means no layer rejected it.
    pub fn check(&self, candidate: &str) -> Result<(), QualityRejection> {
        let result = self.evaluate(candidate);
        match &result {
            Ok(()) => self.counters.pass(),
            Err(rejection) => {
                tracing::trace!("quality rejected {:?}: {}", candidate, rejection);
                self.counters.reject(rejection.layer.as_str());
            }
        }
        result
    }

    /// Convenience wrapper for callers that only need the verdict
    pub fn is_plausible(&self, candidate: &str) -> bool {
        self.check(candidate).is_ok()
    }

    fn evaluate(&self, s: &str) -> Result<(), QualityRejection> {
        self.check_length(s)?;
        self.check_keywords(s)?;
        self.check_patterns(s)?;
        self.check_encoding(s)?;
        self.check_control(s)?;
        self.check_structure(s)?;
        self.check_pure_symbol(s)
    }

    fn check_length(&self, s: &str) -> Result<(), QualityRejection> {
        let len = s.len();
        if len < MIN_LENGTH {
            return Err(QualityRejection::new(
                QualityLayer::Length,
                format!("too short ({} bytes)", len),
            ));
        }
        if len > self.config.max_url_length {
            return Err(QualityRejection::new(
                QualityLayer::Length,
                format!("too long ({} bytes)", len),
            ));
        }
        Ok(())
    }

    fn check_keywords(&self, s: &str) -> Result<(), QualityRejection> {
        let lower = s.trim().to_ascii_lowercase();
        let word = lower.as_str();

        if self.keywords.contains(word) || word == "$" {
            return Err(QualityRejection::new(QualityLayer::Keyword, "javascript keyword"));
        }
        if self.css_properties.contains(word) || self.is_css_property_family(word) {
            return Err(QualityRejection::new(QualityLayer::Keyword, "css property"));
        }
        if self.mime_types.contains(word) {
            return Err(QualityRejection::new(QualityLayer::Keyword, "mime type"));
        }
        if self.http_methods.contains(word) {
            return Err(QualityRejection::new(QualityLayer::Keyword, "http method"));
        }
        Ok(())
    }

    fn is_css_property_family(&self, word: &str) -> bool {
        word.bytes().all(|b| b.is_ascii_lowercase() || b == b'-')
            && CSS_PREFIXES.iter().any(|p| word.starts_with(p))
    }

    fn check_patterns(&self, s: &str) -> Result<(), QualityRejection> {
        if let Some(idx) = self.code_markers.matches(s).iter().next() {
            return Err(QualityRejection::new(
                QualityLayer::Pattern,
                format!("code marker /{}/", CODE_MARKERS[idx]),
            ));
        }

        if self.member_access.is_match(s) {
            let last = s.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
            if !self.file_extensions.contains(last.as_str()) {
                return Err(QualityRejection::new(QualityLayer::Pattern, "member access"));
            }
        }

        if let Some(caps) = self.regex_literal.captures(s) {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if body.contains(|c: char| "\\^$*+?()[]{}|".contains(c)) {
                return Err(QualityRejection::new(QualityLayer::Pattern, "regex literal"));
            }
        }

        Ok(())
    }

    fn check_encoding(&self, s: &str) -> Result<(), QualityRejection> {
        let covered: usize = self.encoded.find_iter(s).map(|m| m.len()).sum();
        let ratio = covered as f64 / s.len() as f64;
        if ratio > self.config.max_encoding_ratio {
            return Err(QualityRejection::new(
                QualityLayer::Encoding,
                format!("escape density {:.2}", ratio),
            ));
        }
        Ok(())
    }

    fn check_control(&self, s: &str) -> Result<(), QualityRejection> {
        let mut total = 0usize;
        let mut control = 0usize;
        let mut printable = 0usize;
        for c in s.chars() {
            total += 1;
            if c.is_control() {
                control += 1;
            } else if !c.is_whitespace() {
                printable += 1;
            }
        }

        let ratio = control as f64 / total.max(1) as f64;
        if ratio > self.config.max_control_ratio {
            return Err(QualityRejection::new(
                QualityLayer::Control,
                format!("control density {:.2}", ratio),
            ));
        }
        if printable < 2 {
            return Err(QualityRejection::new(
                QualityLayer::Control,
                "fewer than 2 printable characters",
            ));
        }
        Ok(())
    }

    fn check_structure(&self, s: &str) -> Result<(), QualityRejection> {
        if let Some(marker) = STRUCTURE_MARKERS.iter().find(|m| s.contains(*m)) {
            return Err(QualityRejection::new(
                QualityLayer::Structure,
                format!("contains {}", marker),
            ));
        }
        if s.matches('`').count() >= 2 {
            return Err(QualityRejection::new(QualityLayer::Structure, "backtick pair"));
        }
        Ok(())
    }

    fn check_pure_symbol(&self, s: &str) -> Result<(), QualityRejection> {
        if self.pure_symbols.is_match(s) {
            return Err(QualityRejection::new(
                QualityLayer::PureSymbol,
                "symbol, color, letter or number",
            ));
        }
        Ok(())
    }

    pub fn stats(&self) -> BTreeMap<String, u64> {
        self.counters.snapshot()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> QualityFilter {
        QualityFilter::new(QualityConfig::default())
    }

    fn layer_of(f: &QualityFilter, s: &str) -> Option<QualityLayer> {
        f.check(s).err().map(|r| r.layer)
    }

    #[test]
    fn test_boundaries_rejected_at_length() {
        let f = filter();
        assert_eq!(layer_of(&f, ""), Some(QualityLayer::Length));
        assert_eq!(layer_of(&f, "a"), Some(QualityLayer::Length));
        let long = format!("/{}", "a".repeat(500));
        assert_eq!(long.len(), 501);
        assert_eq!(layer_of(&f, &long), Some(QualityLayer::Length));
        let max = format!("/{}", "a".repeat(499));
        assert!(f.check(&max).is_ok());
    }

    #[test]
    fn test_percent_noise_rejected() {
        let f = filter();
        assert_eq!(layer_of(&f, "%20%20%20%20"), Some(QualityLayer::Encoding));
        assert!(f.check("/search?q=hello%20world").is_ok());
    }

    #[test]
    fn test_js_garbage() {
        let f = filter();
        assert_eq!(layer_of(&f, "function"), Some(QualityLayer::Keyword));
        assert_eq!(layer_of(&f, "return"), Some(QualityLayer::Keyword));
        assert_eq!(layer_of(&f, "user.id"), Some(QualityLayer::Pattern));
        assert_eq!(layer_of(&f, "handle()"), Some(QualityLayer::Pattern));
        assert_eq!(layer_of(&f, "a === b"), Some(QualityLayer::Pattern));
        assert_eq!(layer_of(&f, "x => {"), Some(QualityLayer::Pattern));
        assert_eq!(layer_of(&f, "<div class=x>"), Some(QualityLayer::Pattern));
        assert_eq!(layer_of(&f, "{a:1}"), Some(QualityLayer::Pattern));
    }

    #[test]
    fn test_keyword_sets() {
        let f = filter();
        assert_eq!(layer_of(&f, "margin-top"), Some(QualityLayer::Keyword));
        assert_eq!(layer_of(&f, "Background"), Some(QualityLayer::Keyword));
        assert_eq!(layer_of(&f, "application/json"), Some(QualityLayer::Keyword));
        assert_eq!(layer_of(&f, "POST"), Some(QualityLayer::Keyword));
    }

    #[test]
    fn test_regex_literal_requires_metachar() {
        let f = filter();
        assert_eq!(layer_of(&f, r"/\d+/g"), Some(QualityLayer::Pattern));
        assert!(f.check("/admin/").is_ok());
        assert!(f.check("/api/users/").is_ok());
    }

    #[test]
    fn test_structure_and_symbols() {
        let f = filter();
        assert_eq!(layer_of(&f, "a]}b"), Some(QualityLayer::Structure));
        assert_eq!(layer_of(&f, "x``y"), Some(QualityLayer::Structure));
        assert_eq!(layer_of(&f, "#fff"), Some(QualityLayer::PureSymbol));
        assert_eq!(layer_of(&f, "12345"), Some(QualityLayer::PureSymbol));
        assert_eq!(layer_of(&f, "../"), Some(QualityLayer::PureSymbol));
    }

    #[test]
    fn test_control_noise() {
        let f = filter();
        assert_eq!(layer_of(&f, "a\u{1}\u{2}\u{3}b"), Some(QualityLayer::Control));
    }

    #[test]
    fn test_real_urls_pass() {
        let f = filter();
        for url in [
            "/login.php",
            "index.php",
            "http://t.example/item?id=1",
            "//cdn.example.com/a.js",
            "/api/v1/users",
            "showimage.php?file=./pictures/1.jpg",
            "../images/logo.png",
        ] {
            assert!(f.check(url).is_ok(), "{} should pass", url);
        }
    }

    #[test]
    fn test_idempotent_and_counted() {
        let f = filter();
        let first = f.check("return").is_ok();
        let second = f.check("return").is_ok();
        assert_eq!(first, second);

        let stats = f.stats();
        assert_eq!(stats["quality.total"], 2);
        assert_eq!(stats["quality.rejected.keyword"], 2);
    }
}
