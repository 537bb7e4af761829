//! Business-value scoring and per-pattern crawl caps
//!
//! Stage A scores a URL from fixed path and parameter priors. Stage B learns
//! a bounded per-pattern adjustment from fetch outcomes. The effective score
//! picks a tier, and the tier picks the pattern's crawl cap.

use serde::Serialize;
use url::Url;

use super::classify::{extension_of, kind_for_extension, FILE_PARAM_KEYS};
use super::pattern::{query_keys, PatternGroup};
use crate::config::ScoringConfig;
use crate::types::{ResourceKind, UrlType};

pub const BASE_SCORE: f64 = 50.0;
/// Score forced onto image-display endpoints
pub const IMAGE_DISPLAY_SCORE: f64 = 15.0;
pub const MAX_PARAM_BONUS: f64 = 25.0;
pub const MAX_ADJUSTMENT: f64 = 20.0;
/// Lower bound of the mid tier
pub const MID_TIER_SCORE: f64 = 50.0;

/// Path tokens that raise the score; the highest match wins
const HIGH_VALUE_KEYWORDS: &[(&str, f64)] = &[
    ("admin", 95.0),
    ("administrator", 95.0),
    ("manage", 90.0),
    ("console", 90.0),
    ("login", 90.0),
    ("signin", 90.0),
    ("auth", 90.0),
    ("oauth", 90.0),
    ("authentication", 90.0),
    ("authorize", 90.0),
    ("upload", 90.0),
    ("password", 90.0),
    ("api", 85.0),
    ("graphql", 85.0),
    ("config", 85.0),
    ("debug", 85.0),
    ("backup", 85.0),
    ("dashboard", 85.0),
    ("pay", 85.0),
    ("payment", 85.0),
    ("checkout", 85.0),
    ("register", 80.0),
    ("export", 80.0),
    ("import", 80.0),
    ("setting", 80.0),
    ("user", 75.0),
    ("account", 75.0),
    ("order", 75.0),
    ("profile", 75.0),
    ("search", 70.0),
];

/// Path tokens that lower the score when nothing valuable matched; the lowest wins
const LOW_VALUE_KEYWORDS: &[(&str, f64)] = &[
    ("static", 20.0),
    ("assets", 20.0),
    ("images", 15.0),
    ("img", 15.0),
    ("fonts", 15.0),
    ("css", 20.0),
    ("terms", 25.0),
    ("privacy", 25.0),
    ("faq", 30.0),
    ("help", 35.0),
    ("about", 35.0),
    ("contact", 40.0),
    ("news", 40.0),
    ("blog", 40.0),
];

/// Parameter names worth probing
const VALUABLE_PARAMS: &[(&str, f64)] = &[
    ("cmd", 20.0),
    ("exec", 20.0),
    ("sql", 20.0),
    ("token", 15.0),
    ("redirect", 15.0),
    ("url", 15.0),
    ("debug", 15.0),
    ("admin", 15.0),
    ("password", 15.0),
    ("file", 10.0),
    ("path", 10.0),
    ("next", 10.0),
    ("return", 10.0),
    ("callback", 10.0),
    ("user", 10.0),
    ("username", 10.0),
    ("key", 10.0),
    ("action", 10.0),
    ("id", 5.0),
    ("q", 5.0),
    ("query", 5.0),
    ("search", 5.0),
    ("order", 3.0),
    ("type", 3.0),
    ("sort", 2.0),
];

/// Inflections accepted after a keyword (`users`, `settings`, `uploader`).
/// Anything else is a different word: `author` is not `auth`.
const KEYWORD_SUFFIXES: &[&str] = &["s", "es", "r", "rs", "er", "ers", "ing", "ings", "ed"];

const IMAGE_DISPLAY_WORDS: &[&str] = &["image", "img", "thumb", "pic", "photo"];

/// Score band controlling the crawl cap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Mid,
    High,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

/// Scores URLs and learns per-pattern adjustments
#[derive(Debug, Clone)]
pub struct BusinessScorer {
    config: ScoringConfig,
}

impl BusinessScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Stage A: prior score in [0, 100]
    pub fn base_score(&self, url: &Url, url_type: UrlType) -> f64 {
        if is_image_display(url) {
            return IMAGE_DISPLAY_SCORE;
        }

        let lower_path = url.path().to_lowercase();
        let tokens: Vec<&str> = lower_path
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let matches_token =
            |keyword: &str| tokens.iter().any(|token| is_keyword_token(token, keyword));

        let high = HIGH_VALUE_KEYWORDS
            .iter()
            .filter(|(k, _)| matches_token(*k))
            .map(|(_, s)| *s)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))));
        let low = LOW_VALUE_KEYWORDS
            .iter()
            .filter(|(k, _)| matches_token(*k))
            .map(|(_, s)| *s)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.min(s))));

        let mut score = high.or(low).unwrap_or(BASE_SCORE);

        let keys = query_keys(url);
        let bonus: f64 = keys
            .iter()
            .filter_map(|key| {
                let key = key.to_ascii_lowercase();
                VALUABLE_PARAMS
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, b)| *b)
            })
            .sum();
        score += bonus.min(MAX_PARAM_BONUS);

        let depth = tokens_in_path(url.path());
        score += match depth {
            0..=3 => 0.0,
            4..=5 => -3.0,
            _ => -8.0,
        };
        score += match keys.len() {
            0..=2 => 0.0,
            3..=5 => 3.0,
            _ => -5.0,
        };

        if url_type == UrlType::Restful || ends_in_numeric_resource(url.path()) {
            score += 5.0;
        }

        score.clamp(0.0, 100.0)
    }

    /// Base plus learned adjustment, clamped to [0, 100]
    pub fn effective_score(&self, base: f64, adjustment: f64) -> f64 {
        (base + adjustment).clamp(0.0, 100.0)
    }

    pub fn tier(&self, effective: f64) -> Tier {
        if effective >= self.config.high_value_threshold {
            Tier::High
        } else if effective >= MID_TIER_SCORE {
            Tier::Mid
        } else {
            Tier::Low
        }
    }

    pub fn cap(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Low => self.config.cap_low,
            Tier::Mid => self.config.cap_mid,
            Tier::High => self.config.cap_high,
        }
    }

    /// Stage B: fold the group's fetch statistics into its adjustment.
    ///
    /// Returns the new adjustment.
    pub fn learn(&self, group: &mut PatternGroup) -> f64 {
        if !self.config.enable_adaptive || group.fetches == 0 {
            return group.adjustment;
        }

        let mut target = 0.0;
        let success = group.success_rate();
        if success >= 0.9 {
            target += 5.0;
        } else if success < 0.5 {
            target -= 10.0;
        }
        let discovery = group.discovery_rate();
        if discovery > 0.5 {
            target += 10.0;
        } else if discovery < 0.1 {
            target -= 5.0;
        }
        if group.avg_response_ms > 5000.0 {
            target -= 3.0;
        }

        let alpha = self.config.learning_rate;
        group.adjustment = ((1.0 - alpha) * group.adjustment + alpha * target)
            .clamp(-MAX_ADJUSTMENT, MAX_ADJUSTMENT);
        group.adjustment
    }
}

fn is_keyword_token(token: &str, keyword: &str) -> bool {
    match token.strip_prefix(keyword) {
        Some("") => true,
        Some(rest) => KEYWORD_SUFFIXES.contains(&rest),
        None => false,
    }
}

fn tokens_in_path(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

fn ends_in_numeric_resource(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    matches!(
        segments.as_slice(),
        [.., resource, id] if !resource.is_empty()
            && resource.bytes().all(|b| b.is_ascii_alphabetic())
            && id.bytes().all(|b| b.is_ascii_digit())
    )
}

/// Endpoints that only render an image: `show(image|thumb|...)` paths, or a
/// file-like parameter pointing at an image or an images directory.
pub fn is_image_display(url: &Url) -> bool {
    let lower_path = url.path().to_lowercase();
    let mut rest = lower_path.as_str();
    while let Some(pos) = rest.find("show") {
        let after = rest[pos + 4..].trim_start_matches(|c| c == '-' || c == '_');
        if IMAGE_DISPLAY_WORDS.iter().any(|w| after.starts_with(w)) {
            return true;
        }
        rest = &rest[pos + 4..];
    }

    url.query_pairs().any(|(key, value)| {
        if !FILE_PARAM_KEYS.contains(&key.to_ascii_lowercase().as_str()) {
            return false;
        }
        let value = value.to_lowercase();
        let value_path = value.split(|c| c == '?' || c == '#').next().unwrap_or_default();
        value_path.contains("/images/")
            || value_path.starts_with("images/")
            || extension_of(value_path).map(kind_for_extension) == Some(ResourceKind::Image)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::pattern::PatternStore;

    fn scorer() -> BusinessScorer {
        BusinessScorer::new(ScoringConfig::default())
    }

    fn score(s: &str, t: UrlType) -> f64 {
        scorer().base_score(&Url::parse(s).unwrap(), t)
    }

    #[test]
    fn test_keyword_priors() {
        assert_eq!(score("http://t.example/admin/", UrlType::Normal), 95.0);
        assert_eq!(score("http://t.example/api/v1/x", UrlType::Ajax), 85.0);
        // high keyword beats low
        assert_eq!(score("http://t.example/static/admin", UrlType::Normal), 95.0);
        assert_eq!(score("http://t.example/about", UrlType::Normal), 35.0);
        assert_eq!(score("http://t.example/item", UrlType::Normal), 50.0);
        // "display" is not "pay"
        assert_eq!(score("http://t.example/display", UrlType::Normal), 50.0);
    }

    #[test]
    fn test_keywords_match_whole_words() {
        // numeric resource bonus only
        assert_eq!(score("http://t.example/author/7", UrlType::Restful), 55.0);
        assert_eq!(score("http://t.example/important-notice", UrlType::Normal), 50.0);
        assert_eq!(score("http://t.example/payload", UrlType::Normal), 50.0);
        assert_eq!(score("http://t.example/apiary", UrlType::Normal), 50.0);
        assert_eq!(scorer().tier(score("http://t.example/author/7", UrlType::Restful)), Tier::Mid);

        assert_eq!(score("http://t.example/users", UrlType::Normal), 75.0);
        assert_eq!(score("http://t.example/settings", UrlType::Normal), 80.0);
        assert_eq!(score("http://t.example/uploader", UrlType::Normal), 90.0);
        assert_eq!(score("http://t.example/payment", UrlType::Normal), 85.0);
    }

    #[test]
    fn test_param_bonus_capped() {
        assert_eq!(score("http://t.example/item?id=1", UrlType::Normal), 55.0);
        // cmd 20 + token 15 + url 15 capped at 25, three params +3
        assert_eq!(
            score("http://t.example/run?cmd=a&token=b&url=c", UrlType::MultiParam),
            78.0
        );
    }

    #[test]
    fn test_restful_bonus_and_depth() {
        assert_eq!(score("http://t.example/product-1.html", UrlType::Restful), 55.0);
        assert_eq!(score("http://t.example/a/b/c/d/e/f/g", UrlType::Normal), 42.0);
    }

    #[test]
    fn test_image_display_forced_low() {
        assert_eq!(
            score("http://t.example/showimage.php?file=./pictures/1.jpg", UrlType::FileParam),
            IMAGE_DISPLAY_SCORE
        );
        assert_eq!(
            score("http://t.example/admin/view.php?src=/images/a", UrlType::FileParam),
            IMAGE_DISPLAY_SCORE
        );
        assert_eq!(score("http://t.example/show_thumb", UrlType::Normal), IMAGE_DISPLAY_SCORE);
        assert!(score("http://t.example/download.php?file=report.pdf", UrlType::FileParam) > 30.0);
    }

    #[test]
    fn test_tiers_and_caps() {
        let s = scorer();
        assert_eq!(s.tier(70.0), Tier::High);
        assert_eq!(s.tier(55.0), Tier::Mid);
        assert_eq!(s.tier(49.9), Tier::Low);
        assert_eq!(s.cap(Tier::Low), 2);
        assert_eq!(s.cap(Tier::Mid), 5);
        assert_eq!(s.cap(Tier::High), 20);
        assert_eq!(s.effective_score(95.0, 20.0), 100.0);
    }

    #[test]
    fn test_learning_stays_bounded() {
        let s = BusinessScorer::new(ScoringConfig {
            learning_rate: 1.0,
            ..Default::default()
        });
        let mut store = PatternStore::new();
        let (id, _) = store.lookup_or_create(&Url::parse("http://t.example/a").unwrap());
        let group = store.get_mut(id).unwrap();

        for _ in 0..10 {
            group.record_fetch(200, 10, true, true, false);
        }
        assert_eq!(s.learn(group), 15.0);

        for _ in 0..40 {
            group.record_fetch(500, 9000, false, false, false);
        }
        let adj = s.learn(group);
        assert!(adj >= -MAX_ADJUSTMENT && adj < 0.0);
    }

    #[test]
    fn test_learning_disabled() {
        let s = BusinessScorer::new(ScoringConfig {
            enable_adaptive: false,
            ..Default::default()
        });
        let mut store = PatternStore::new();
        let (id, _) = store.lookup_or_create(&Url::parse("http://t.example/a").unwrap());
        let group = store.get_mut(id).unwrap();
        group.record_fetch(500, 10, false, false, false);
        assert_eq!(s.learn(group), 0.0);
    }
}
