//! URL recovery from JavaScript source
//!
//! Only contextually anchored sites are read: absolute URLs, string
//! arguments of known network APIs, assignments to URL-bearing config names,
//! and string literals shaped like API paths or server-side pages. Bare
//! identifiers, JSON keys and CSS tokens are never candidates.

use regex::Regex;

use crate::types::JsContext;

/// A string literal in any of the three JS quote styles. No escapes inside.
const QUOTED: &str = r#"(?:"([^"\\\n]*)"|'([^'\\\n]*)'|`([^`\\]*)`)"#;

/// Call sites whose first string argument is a request target
const NETWORK_CALL_PREFIXES: &[&str] = &[
    r"\bfetch\s*\(\s*",
    r"(?:\$|\bjQuery)\.ajax\s*\(\s*\{[^}]*?\burl\s*:\s*",
    r"(?:\$|\bjQuery)\.(?:get|post|getJSON|load)\s*\(\s*",
    r"\baxios\.(?:get|post|put|delete|patch|head|request)\s*\(\s*",
    r"\baxios\s*\(\s*\{[^}]*?\burl\s*:\s*",
    r#"\.open\s*\(\s*["'][A-Za-z]+["']\s*,\s*"#,
    r"\bnavigator\.sendBeacon\s*\(\s*",
    r"\bwindow\.open\s*\(\s*",
    r"\b(?:window\.|document\.)?location(?:\.href)?\s*=\s*",
    r"\blocation\.(?:assign|replace)\s*\(\s*",
];

const CONFIG_ASSIGNMENT: &str = r"\b(?:apiUrl|baseURL|endpoint)\s*[:=]\s*";

/// Extracts candidate strings from JavaScript
#[derive(Debug, Clone)]
pub struct JsExtractor {
    absolute: Regex,
    network_calls: Vec<Regex>,
    config_assignment: Regex,
    literal: Regex,
    path_literal: Regex,
}

impl Default for JsExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl JsExtractor {
    pub fn new() -> Self {
        Self {
            absolute: Regex::new(r#"https?://[^\s"'`<>(){}\[\]\\,;|^]+"#)
                .expect("absolute URL pattern compiles"),
            network_calls: NETWORK_CALL_PREFIXES
                .iter()
                .map(|prefix| {
                    Regex::new(&format!("{}{}", prefix, QUOTED))
                        .expect("network call pattern compiles")
                })
                .collect(),
            config_assignment: Regex::new(&format!("{}{}", CONFIG_ASSIGNMENT, QUOTED))
                .expect("config assignment pattern compiles"),
            literal: Regex::new(QUOTED).expect("string literal pattern compiles"),
            path_literal: Regex::new(
                r"^(?:/(?:api|v\d+|admin)(?:/[^\s]*)?|[\w./-]*\.(?:php|jsp|asp|aspx|do|action|html|htm)(?:\?[^\s]*)?)$",
            )
            .expect("path literal pattern compiles"),
        }
    }

    /// Candidates in source order, tagged with the context that anchored them
    pub fn extract(&self, source: &str) -> Vec<(String, JsContext)> {
        let mut found: Vec<(usize, String, JsContext)> = Vec::new();

        for m in self.absolute.find_iter(source) {
            let url = m
                .as_str()
                .trim_end_matches(|c: char| matches!(c, '.' | ':' | '!' | '?' | '*' | '+'));
            found.push((m.start(), url.to_string(), JsContext::AbsoluteUrl));
        }

        for re in &self.network_calls {
            for caps in re.captures_iter(source) {
                if let Some((start, value)) = quoted_value(&caps) {
                    found.push((start, value, JsContext::NetworkCall));
                }
            }
        }

        for caps in self.config_assignment.captures_iter(source) {
            if let Some((start, value)) = quoted_value(&caps) {
                found.push((start, value, JsContext::ConfigAssignment));
            }
        }

        for caps in self.literal.captures_iter(source) {
            if let Some((start, value)) = quoted_value(&caps) {
                if self.path_literal.is_match(&value) {
                    found.push((start, value, JsContext::PathLiteral));
                }
            }
        }

        found.sort_by_key(|(start, _, _)| *start);
        found
            .into_iter()
            .filter(|(_, value, _)| is_static_target(value))
            .map(|(_, value, context)| (value, context))
            .collect()
    }
}

/// The last three groups of a [`QUOTED`]-suffixed pattern hold the literal body
fn quoted_value(caps: &regex::Captures<'_>) -> Option<(usize, String)> {
    let n = caps.len();
    (n.saturating_sub(3)..n)
        .filter_map(|i| caps.get(i))
        .next()
        .map(|m| (m.start(), m.as_str().trim().to_string()))
}

/// Skip empty strings and template literals with interpolation
fn is_static_target(value: &str) -> bool {
    !value.is_empty() && !value.contains("${") && value != "#"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(src: &str) -> Vec<String> {
        JsExtractor::new()
            .extract(src)
            .into_iter()
            .map(|(v, _)| v)
            .collect()
    }

    #[test]
    fn test_absolute_urls() {
        let out = JsExtractor::new().extract(r#"var u = "https://api.t.example/v2/items?x=1"; go(u);"#);
        assert!(out.contains(&(
            "https://api.t.example/v2/items?x=1".to_string(),
            JsContext::AbsoluteUrl
        )));
    }

    #[test]
    fn test_network_calls() {
        let src = r#"
            fetch('/api/users');
            $.ajax({ type: "POST", url: "/ajax/save.php" });
            jQuery.get("/search.do?q=1");
            axios.post(`/v1/orders`, body);
            xhr.open("GET", "/data/feed.json");
            navigator.sendBeacon('/collect');
            window.open('/popup');
            window.location = "/next";
            location.href = '/done';
        "#;
        let out = JsExtractor::new().extract(src);
        for (expected, context) in [
            ("/api/users", JsContext::NetworkCall),
            ("/ajax/save.php", JsContext::NetworkCall),
            ("/search.do?q=1", JsContext::NetworkCall),
            ("/v1/orders", JsContext::NetworkCall),
            ("/data/feed.json", JsContext::NetworkCall),
            ("/collect", JsContext::NetworkCall),
            ("/popup", JsContext::NetworkCall),
            ("/next", JsContext::NetworkCall),
            ("/done", JsContext::NetworkCall),
        ] {
            assert!(
                out.contains(&(expected.to_string(), context)),
                "missing {} in {:?}",
                expected,
                out
            );
        }
    }

    #[test]
    fn test_config_assignments() {
        let out = JsExtractor::new().extract(r#"const apiUrl = "/svc"; axios.create({ baseURL: '/gw' });"#);
        assert!(out.contains(&("/svc".to_string(), JsContext::ConfigAssignment)));
        assert!(out.contains(&("/gw".to_string(), JsContext::ConfigAssignment)));
    }

    #[test]
    fn test_path_literals() {
        let out = values(r#"var a = "/admin/panel"; var b = 'profile.php?id=2'; var c = "color"; var d = "/about";"#);
        assert!(out.contains(&"/admin/panel".to_string()));
        assert!(out.contains(&"profile.php?id=2".to_string()));
        assert!(!out.contains(&"color".to_string()));
        assert!(!out.contains(&"/about".to_string()));
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert!(values("function handle(){ return user.id; }").is_empty());
        assert!(values(r#"var o = { "display": "block", width: "100px" };"#).is_empty());
    }

    #[test]
    fn test_interpolated_templates_skipped() {
        assert!(values("fetch(`/api/users/${id}`)").is_empty());
    }

    #[test]
    fn test_source_order() {
        let out = values(r#"fetch("/api/b"); fetch("/api/a");"#);
        assert_eq!(out[0], "/api/b");
    }
}
