//! URL recovery from CSS: `url(...)` and `@import` targets

use regex::Regex;

#[derive(Debug, Clone)]
pub struct CssExtractor {
    url_fn: Regex,
    import: Regex,
}

impl Default for CssExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CssExtractor {
    pub fn new() -> Self {
        Self {
            url_fn: Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)"#)
                .expect("css url() pattern compiles"),
            import: Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#)
                .expect("css @import pattern compiles"),
        }
    }

    /// Targets in source order, minus inline and script schemes
    pub fn extract(&self, source: &str) -> Vec<String> {
        let mut found: Vec<(usize, String)> = Vec::new();

        for re in [&self.url_fn, &self.import] {
            for caps in re.captures_iter(source) {
                if let Some(m) = (1..caps.len()).filter_map(|i| caps.get(i)).next() {
                    found.push((m.start(), m.as_str().trim().to_string()));
                }
            }
        }

        found.sort_by_key(|(start, _)| *start);
        found
            .into_iter()
            .map(|(_, value)| value)
            .filter(|value| is_fetchable(value))
            .collect()
    }
}

fn is_fetchable(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    !value.is_empty()
        && !value.starts_with('#')
        && !lower.starts_with("data:")
        && !lower.starts_with("javascript:")
        && !lower.starts_with("about:")
}
