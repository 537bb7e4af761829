//! Candidate URL extraction from fetched responses
//!
//! Surfaces:
//! - HTML attributes that carry links (`a@href`, `img@srcset`, `object@data`, ...)
//! - `data-url`-style attributes on any element
//! - inline event handlers and `<script>` bodies, through [`JsExtractor`]
//! - `style` attributes and `<style>` bodies, through [`CssExtractor`]
//! - `meta http-equiv=refresh`
//! - response headers
//!
//! Output is in document order with repeated values dropped. Forms are
//! returned separately so POST targets can be deduplicated by fingerprint.

mod css;
mod headers;
mod js;

pub use css::CssExtractor;
pub use headers::{extract_headers, parse_refresh};
pub use js::JsExtractor;

use scraper::{ElementRef, Html};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use url::Url;

use crate::types::{Provenance, RawCandidate};

/// Attributes that hold a single URL, per element
const LINK_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("area", "href"),
    ("base", "href"),
    ("link", "href"),
    ("form", "action"),
    ("iframe", "src"),
    ("frame", "src"),
    ("embed", "src"),
    ("script", "src"),
    ("img", "src"),
    ("source", "src"),
    ("audio", "src"),
    ("video", "src"),
    ("video", "poster"),
    ("track", "src"),
    ("input", "src"),
    ("object", "data"),
    ("button", "formaction"),
    ("input", "formaction"),
];

/// Attributes that hold a comma-separated candidate list
const SRCSET_ATTRIBUTES: &[(&str, &str)] = &[("img", "srcset"), ("source", "srcset")];

/// URL-bearing data attributes, read on any element
const DATA_ATTRIBUTES: &[&str] = &[
    "data-url",
    "data-href",
    "data-src",
    "data-link",
    "data-ajax",
    "data-target",
];

const EVENT_HANDLERS: &[&str] = &[
    "onclick",
    "onmouseover",
    "onmousedown",
    "ondblclick",
    "onload",
    "onerror",
    "onsubmit",
    "onfocus",
    "onblur",
    "onchange",
];

/// A `<form>` and the names it submits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedForm {
    /// Raw `action` attribute; empty means the page itself
    pub action: String,
    /// Uppercase method, GET when absent
    pub method: String,
    /// Sorted, de-duplicated field names
    pub param_names: Vec<String>,
}

impl ExtractedForm {
    pub fn is_post(&self) -> bool {
        self.method != "GET"
    }

    /// The GET request a submission of this form would make, with empty values
    pub fn get_candidate(&self) -> String {
        let action = self.action.split('#').next().unwrap_or_default();
        if self.param_names.is_empty() {
            return action.to_string();
        }
        let query: Vec<String> = self
            .param_names
            .iter()
            .map(|name| format!("{}=", name))
            .collect();
        let separator = if action.contains('?') { '&' } else { '?' };
        format!("{}{}{}", action, separator, query.join("&"))
    }
}

/// Everything extracted from one HTML document
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub candidates: Vec<RawCandidate>,
    pub forms: Vec<ExtractedForm>,
    /// Effective base after `<base href>`
    pub base: Option<Url>,
}

/// Ordered, de-duplicated candidate collector
struct CandidateSink<'a> {
    base: &'a Url,
    seen: HashSet<String>,
    out: Vec<RawCandidate>,
}

impl<'a> CandidateSink<'a> {
    fn new(base: &'a Url) -> Self {
        Self {
            base,
            seen: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn push(&mut self, value: &str, provenance: Provenance) {
        let value = value.trim();
        if value.is_empty() || !self.seen.insert(value.to_string()) {
            return;
        }
        self.out.push(RawCandidate::new(value, provenance, self.base));
    }
}

/// HTML, JS, CSS and header extraction with shared compiled patterns
#[derive(Debug, Clone, Default)]
pub struct UrlExtractor {
    js: JsExtractor,
    css: CssExtractor,
}

impl UrlExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract candidates and forms from an HTML document fetched from `page_url`
    pub fn extract_html(&self, html: &str, page_url: &Url) -> Extraction {
        let document = Html::parse_document(html);
        let base = effective_base(&document, page_url);
        let mut sink = CandidateSink::new(&base);
        let mut forms = Vec::new();

        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            self.visit_element(element, &mut sink, &mut forms);
        }

        let CandidateSink { out: candidates, .. } = sink;
        tracing::debug!(
            "Extracted {} candidates and {} forms from {}",
            candidates.len(),
            forms.len(),
            page_url
        );

        Extraction {
            candidates,
            forms,
            base: (base != *page_url).then_some(base),
        }
    }

    fn visit_element(
        &self,
        element: ElementRef<'_>,
        sink: &mut CandidateSink<'_>,
        forms: &mut Vec<ExtractedForm>,
    ) {
        let el = element.value();
        let tag = el.name();

        for (t, attr) in LINK_ATTRIBUTES {
            if *t == tag {
                if let Some(value) = el.attr(attr) {
                    sink.push(value, attribute(tag, attr));
                }
            }
        }

        for (t, attr) in SRCSET_ATTRIBUTES {
            if *t == tag {
                if let Some(value) = el.attr(attr) {
                    for item in parse_srcset(value) {
                        sink.push(item, attribute(tag, attr));
                    }
                }
            }
        }

        for attr in DATA_ATTRIBUTES {
            if let Some(value) = el.attr(attr) {
                sink.push(value, attribute(tag, attr));
            }
        }

        if tag == "meta"
            && el
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
        {
            if let Some(target) = el.attr("content").and_then(parse_refresh) {
                sink.push(&target, Provenance::MetaRefresh);
            }
        }

        for handler in EVENT_HANDLERS {
            if let Some(code) = el.attr(handler) {
                for (value, _) in self.js.extract(code) {
                    sink.push(
                        &value,
                        Provenance::EventHandler {
                            attr: handler.to_string(),
                        },
                    );
                }
            }
        }

        if let Some(style) = el.attr("style") {
            for value in self.css.extract(style) {
                sink.push(&value, Provenance::Css);
            }
        }

        match tag {
            "script" => {
                let code: String = element.text().collect();
                for (value, context) in self.js.extract(&code) {
                    sink.push(&value, Provenance::Script { context });
                }
            }
            "style" => {
                let css: String = element.text().collect();
                for value in self.css.extract(&css) {
                    sink.push(&value, Provenance::Css);
                }
            }
            "form" => forms.push(extract_form(element)),
            _ => {}
        }
    }

    /// Extract candidates from a JavaScript body
    pub fn extract_js(&self, source: &str, base: &Url) -> Vec<RawCandidate> {
        let mut sink = CandidateSink::new(base);
        for (value, context) in self.js.extract(source) {
            sink.push(&value, Provenance::Script { context });
        }
        sink.out
    }

    /// Extract candidates from a stylesheet body
    pub fn extract_css(&self, source: &str, base: &Url) -> Vec<RawCandidate> {
        let mut sink = CandidateSink::new(base);
        for value in self.css.extract(source) {
            sink.push(&value, Provenance::Css);
        }
        sink.out
    }

    /// Extract candidates from response headers
    pub fn extract_headers(&self, headers: &[(String, String)], base: &Url) -> Vec<RawCandidate> {
        let mut sink = CandidateSink::new(base);
        for (name, value) in extract_headers(headers) {
            sink.push(&value, Provenance::Header { name });
        }
        sink.out
    }
}

fn attribute(tag: &str, attr: &str) -> Provenance {
    Provenance::Attribute {
        tag: tag.to_string(),
        attr: attr.to_string(),
    }
}

/// First `<base href>` resolved against the page, else the page itself
fn effective_base(document: &Html, page_url: &Url) -> Url {
    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "base" && el.value().attr("href").is_some())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or_else(|| page_url.clone())
}

/// URL of each `srcset` item, without width/density descriptors
fn parse_srcset(value: &str) -> Vec<&str> {
    value
        .split(',')
        .filter_map(|item| item.split_whitespace().next())
        .collect()
}

fn extract_form(form: ElementRef<'_>) -> ExtractedForm {
    let el = form.value();
    let action = el.attr("action").unwrap_or_default().trim().to_string();
    let method = el
        .attr("method")
        .map(|m| m.trim().to_ascii_uppercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "GET".to_string());

    let param_names: BTreeSet<String> = form
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|field| {
            matches!(
                field.value().name(),
                "input" | "select" | "textarea" | "button"
            )
        })
        .filter_map(|field| field.value().attr("name"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    ExtractedForm {
        action,
        method,
        param_names: param_names.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("http://t.example/dir/page.html").unwrap()
    }

    fn values(extraction: &Extraction) -> Vec<&str> {
        extraction.candidates.iter().map(|c| c.value.as_str()).collect()
    }

    #[test]
    fn test_attribute_surfaces() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/site.css">
            <script src="app.js"></script>
            <meta http-equiv="Refresh" content="5; url=/later">
            </head><body>
            <a href="/about">About</a>
            <a href="/about">About again</a>
            <img src="logo.png" srcset="small.png 1x, large.png 2x">
            <iframe src="/frame"></iframe>
            <object data="/movie.swf"></object>
            <div data-url="/lazy" data-target="/modal"></div>
            </body></html>"#;
        let extraction = UrlExtractor::new().extract_html(html, &page());
        assert_eq!(
            values(&extraction),
            vec![
                "/site.css",
                "app.js",
                "/later",
                "/about",
                "logo.png",
                "small.png",
                "large.png",
                "/frame",
                "/movie.swf",
                "/lazy",
                "/modal"
            ]
        );
        assert_eq!(extraction.candidates[2].provenance, Provenance::MetaRefresh);
        assert_eq!(extraction.candidates[0].base, page());
    }

    #[test]
    fn test_scripts_handlers_and_styles() {
        let html = r#"<html><body style="background: url('/bg.jpg')">
            <button onclick="window.location='/go'">Go</button>
            <script>fetch("/api/items"); function f(){ return user.id; }</script>
            <style>@import "print.css";</style>
            </body></html>"#;
        let extraction = UrlExtractor::new().extract_html(html, &page());
        let vals = values(&extraction);
        assert_eq!(vals, vec!["/bg.jpg", "/go", "/api/items", "print.css"]);
        assert_eq!(
            extraction.candidates[1].provenance,
            Provenance::EventHandler {
                attr: "onclick".to_string()
            }
        );
    }

    #[test]
    fn test_base_href_changes_resolution_base() {
        let html = r#"<html><head><base href="/root/"></head><body><a href="x">x</a></body></html>"#;
        let extraction = UrlExtractor::new().extract_html(html, &page());
        let base = Url::parse("http://t.example/root/").unwrap();
        assert_eq!(extraction.base, Some(base.clone()));
        assert!(extraction.candidates.iter().all(|c| c.base == base));
    }

    #[test]
    fn test_forms() {
        let html = r#"<html><body>
            <form action="/login" method="post">
              <input name="username"><input name="password" type="password">
              <input type="submit">
            </form>
            <form action="/search"><input name="q"><select name="cat"></select><input name="q"></form>
            </body></html>"#;
        let extraction = UrlExtractor::new().extract_html(html, &page());
        assert_eq!(extraction.forms.len(), 2);

        let login = &extraction.forms[0];
        assert!(login.is_post());
        assert_eq!(login.method, "POST");
        assert_eq!(login.param_names, vec!["password", "username"]);

        let search = &extraction.forms[1];
        assert!(!search.is_post());
        assert_eq!(search.get_candidate(), "/search?cat=&q=");
    }

    #[test]
    fn test_malformed_html_is_tolerated() {
        let html = r#"<a href="/ok">ok<div><a href=/also-ok><p></span></a"#;
        let extraction = UrlExtractor::new().extract_html(html, &page());
        assert!(values(&extraction).contains(&"/ok"));
        assert!(values(&extraction).contains(&"/also-ok"));
    }

    #[test]
    fn test_headers_and_bodies() {
        let extractor = UrlExtractor::new();
        let headers = vec![("Location".to_string(), "/moved".to_string())];
        let out = extractor.extract_headers(&headers, &page());
        assert_eq!(out[0].value, "/moved");
        assert_eq!(
            out[0].provenance,
            Provenance::Header {
                name: "location".to_string()
            }
        );

        let js = extractor.extract_js("axios.get('/api/x'); axios.get('/api/x');", &page());
        assert_eq!(js.len(), 1);

        let css = extractor.extract_css(".a{background:url(a.png)}", &page());
        assert_eq!(css[0].value, "a.png");
    }
}
