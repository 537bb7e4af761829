//! URL normalization into canonical form
//!
//! Canonical URLs are the equality key for the visited set:
//! - scheme and host lowercased, default ports dropped
//! - `.` and `..` path segments resolved
//! - percent-escapes of unreserved bytes decoded, all other escapes uppercased
//! - fragment dropped unless the scope is SPA-aware
//! - query string kept exactly as given (pattern derivation reorders, not us)

use thiserror::Error;
use url::Url;

/// Why a candidate could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("invalid base URL '{0}'")]
    InvalidBase(String),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("empty host")]
    EmptyHost,
    #[error("unparseable URL: {0}")]
    Parse(#[from] url::ParseError),
}

/// Resolves raw candidates against a base and canonicalizes the result
#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    retain_fragment: bool,
}

impl UrlNormalizer {
    pub fn new(retain_fragment: bool) -> Self {
        Self { retain_fragment }
    }

    /// Parse and validate a base URL
    pub fn parse_base(base: &str) -> Result<Url, NormalizeError> {
        let url = Url::parse(base.trim()).map_err(|_| NormalizeError::InvalidBase(base.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
            return Err(NormalizeError::InvalidBase(base.to_string()));
        }
        Ok(url)
    }

    /// Resolve `candidate` against `base` and canonicalize.
    ///
    /// Returns one URL, or two for protocol-relative candidates (`//host/...`),
    /// with the base's scheme first.
    pub fn normalize(&self, candidate: &str, base: &Url) -> Result<Vec<Url>, NormalizeError> {
        let candidate = candidate.trim();

        if let Some(rest) = candidate.strip_prefix("//") {
            let (first, second) = if base.scheme() == "https" {
                ("https", "http")
            } else {
                ("http", "https")
            };
            let primary = self.canonicalize(&format!("{}://{}", first, rest))?;
            let alternate = self.canonicalize(&format!("{}://{}", second, rest))?;
            return Ok(vec![primary, alternate]);
        }

        // join() also accepts absolute candidates, foreign schemes included
        let joined = base.join(candidate)?;
        Ok(vec![self.finish(joined)?])
    }

    /// Canonicalize an absolute URL string
    pub fn canonicalize(&self, absolute: &str) -> Result<Url, NormalizeError> {
        let url = Url::parse(absolute.trim())?;
        self.finish(url)
    }

    fn finish(&self, mut url: Url) -> Result<Url, NormalizeError> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(NormalizeError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(NormalizeError::EmptyHost);
        }

        // The url crate already lowercases the host, strips default ports,
        // and resolves dot segments; only escape casing is left.
        let path = normalize_percent_encoding(url.path());
        if path != url.path() {
            url.set_path(&path);
        }

        if !self.retain_fragment {
            url.set_fragment(None);
        }

        Ok(url)
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}

/// Decode escapes of unreserved bytes and uppercase the hex of the rest
fn normalize_percent_encoding(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                let value = (hi * 16 + lo) as u8;
                if is_unreserved(value) {
                    out.push(value as char);
                } else {
                    out.push('%');
                    out.push(bytes[i + 1].to_ascii_uppercase() as char);
                    out.push(bytes[i + 2].to_ascii_uppercase() as char);
                }
                i += 3;
                continue;
            }
        }
        // Multi-byte UTF-8 never appears here: the url crate escapes it.
        out.push(bytes[i] as char);
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn one(n: &UrlNormalizer, candidate: &str, b: &str) -> String {
        let out = n.normalize(candidate, &base(b)).unwrap();
        assert_eq!(out.len(), 1);
        out[0].to_string()
    }

    #[test]
    fn test_case_and_default_port() {
        let n = UrlNormalizer::default();
        assert_eq!(
            one(&n, "HTTP://T.Example:80/a", "http://b/"),
            "http://t.example/a"
        );
        assert_eq!(
            one(&n, "https://t.example:443/a", "http://b/"),
            "https://t.example/a"
        );
        assert_eq!(
            one(&n, "http://t.example:8080/a", "http://b/"),
            "http://t.example:8080/a"
        );
    }

    #[test]
    fn test_dot_segments_and_relative() {
        let n = UrlNormalizer::default();
        assert_eq!(
            one(&n, "../x/./y", "http://t.example/a/b/c.html"),
            "http://t.example/a/x/y"
        );
        assert_eq!(one(&n, "/root", "http://t.example/a/b"), "http://t.example/root");
        assert_eq!(one(&n, "page.php?b=2&a=1", "http://t.example/dir/"), "http://t.example/dir/page.php?b=2&a=1");
    }

    #[test]
    fn test_percent_encoding() {
        let n = UrlNormalizer::default();
        assert_eq!(
            one(&n, "http://t.example/%7euser/%2fx/%41", "http://b/"),
            "http://t.example/~user/%2Fx/A"
        );
        // query stays byte-exact
        assert_eq!(
            one(&n, "http://t.example/p?q=%2f%41", "http://b/"),
            "http://t.example/p?q=%2f%41"
        );
    }

    #[test]
    fn test_fragment_handling() {
        let n = UrlNormalizer::default();
        assert_eq!(one(&n, "/a#top", "http://t.example/"), "http://t.example/a");

        let spa = UrlNormalizer::new(true);
        assert_eq!(one(&spa, "/#/route", "http://t.example/"), "http://t.example/#/route");
    }

    #[test]
    fn test_protocol_relative_emits_both() {
        let n = UrlNormalizer::default();
        let out = n.normalize("//host/path", &base("http://b/")).unwrap();
        let strings: Vec<String> = out.iter().map(|u| u.to_string()).collect();
        assert_eq!(strings, vec!["http://host/path", "https://host/path"]);

        let out = n.normalize("//cdn.example.com/a.js", &base("https://t.example/")).unwrap();
        assert_eq!(out[0].as_str(), "https://cdn.example.com/a.js");
        assert_eq!(out[1].as_str(), "http://cdn.example.com/a.js");
    }

    #[test]
    fn test_rejections() {
        let n = UrlNormalizer::default();
        let b = base("http://t.example/");
        assert!(matches!(
            n.normalize("javascript:void(0)", &b),
            Err(NormalizeError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            n.normalize("mailto:a@b.c", &b),
            Err(NormalizeError::UnsupportedScheme(_))
        ));
        assert!(n.normalize("http://", &b).is_err());
        assert!(UrlNormalizer::parse_base("not a url").is_err());
        assert!(UrlNormalizer::parse_base("ftp://x/").is_err());
    }

    #[test]
    fn test_canonical_is_fixed_point() {
        let n = UrlNormalizer::default();
        for raw in [
            "HTTP://Example.COM:80/a/../b/%7e?x=1&y=%2f",
            "https://t.example/item?id=1",
            "http://t.example/%E4%B8%AD",
        ] {
            let once = n.canonicalize(raw).unwrap();
            let twice = n.canonicalize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }
}
