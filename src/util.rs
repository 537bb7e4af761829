//! Shared utility functions

use xxhash_rust::xxh3::{xxh3_128, xxh3_64};

/// Truncate a string to a maximum length, appending "..." if truncated.
/// Handles multi-byte characters by finding a valid char boundary.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let suffix = "...";
    let target = max_len.saturating_sub(suffix.len());
    let mut end = target;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], suffix)
}

/// 64-bit hash for set membership and structural fingerprints
pub fn fast_hash(s: &str) -> u64 {
    xxh3_64(s.as_bytes())
}

/// 128-bit hash for pattern and fingerprint keys
pub fn wide_hash(s: &str) -> u128 {
    xxh3_128(s.as_bytes())
}

/// Compute a 64-bit SimHash over a stream of string features.
///
/// Each feature votes +1/-1 on every bit of its hash; the sign of each
/// column becomes the output bit. Equal feature multisets give equal
/// hashes, and small feature changes flip few bits.
pub fn compute_simhash<'a>(features: impl Iterator<Item = &'a str>) -> u64 {
    let mut columns = [0i64; 64];
    let mut any = false;

    for feature in features {
        any = true;
        let h = fast_hash(feature);
        for (bit, column) in columns.iter_mut().enumerate() {
            if (h >> bit) & 1 == 1 {
                *column += 1;
            } else {
                *column -= 1;
            }
        }
    }

    if !any {
        return 0;
    }

    columns
        .iter()
        .enumerate()
        .filter(|(_, &c)| c > 0)
        .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_str("short", 10), "short");
        let t = truncate_str("ééééééééé", 8);
        assert!(t.ends_with("..."));
        assert!(t.len() <= 8);
    }

    #[test]
    fn test_simhash_stable() {
        let a = ["html>body", "body>div", "div>p"];
        let h1 = compute_simhash(a.iter().copied());
        let h2 = compute_simhash(a.iter().copied());
        assert_eq!(h1, h2);
        assert_eq!(compute_simhash(std::iter::empty()), 0);
    }

    #[test]
    fn test_simhash_near_inputs_are_close() {
        let base: Vec<String> = (0..40).map(|i| format!("feature-{}", i)).collect();
        let mut changed = base.clone();
        changed[0] = "something-else".to_string();

        let h1 = compute_simhash(base.iter().map(|s| s.as_str()));
        let h2 = compute_simhash(changed.iter().map(|s| s.as_str()));
        assert!((h1 ^ h2).count_ones() < 16);
    }
}
