//! URL recovery from HTTP response headers

/// `(header name, target)` pairs from `Location`, `Content-Location`,
/// `Refresh` and `Link`
pub fn extract_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    let mut found = Vec::new();

    for (name, value) in headers {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "location" | "content-location" => {
                let value = value.trim();
                if !value.is_empty() {
                    found.push((lower, value.to_string()));
                }
            }
            "refresh" => {
                if let Some(target) = parse_refresh(value) {
                    found.push((lower, target));
                }
            }
            "link" => {
                for target in parse_link(value) {
                    found.push((lower.clone(), target));
                }
            }
            _ => {}
        }
    }

    found
}

/// Target of a refresh directive such as `5; url=/next`
pub fn parse_refresh(content: &str) -> Option<String> {
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let target = match rest.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("url=") => &rest[4..],
        _ => rest,
    };
    let target = target.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    if target.is_empty() {
        None
    } else {
        Some(target.to_string())
    }
}

/// Every `<...>` reference in a `Link` header value
fn parse_link(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = value;
    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open + 1..].find('>') else {
            break;
        };
        let target = rest[open + 1..open + 1 + close].trim();
        if !target.is_empty() {
            out.push(target.to_string());
        }
        rest = &rest[open + 1 + close + 1..];
    }
    out
}
