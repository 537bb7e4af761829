//! DOM signatures and per-pattern similarity verification
//!
//! A signature is a fixed-shape fingerprint of an HTML response. Patterns
//! collect a few signatures from fetched pages; once enough are in, the
//! mean pairwise similarity decides whether the pattern's pages are all the
//! same template (verified similar) or genuinely distinct.

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::util::{compute_simhash, fast_hash};

/// Tags whose frequencies form the tag vector
pub const TRACKED_TAGS: &[&str] = &[
    "html", "head", "body", "div", "span", "p", "a", "ul", "ol", "li", "table", "thead", "tbody",
    "tr", "td", "th", "form", "input", "select", "option", "textarea", "button", "label", "img",
    "script", "style", "link", "meta", "h1", "h2", "h3", "h4", "nav", "header", "footer",
    "section", "article", "aside", "main", "iframe", "br", "strong", "em", "pre", "code",
];

/// Fingerprint of one HTML document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomSignature {
    /// SimHash over parent>child>grandchild tag-path shingles
    pub simhash: u64,
    /// Hash of the pre-order tag sequence with depths
    pub structure_hash: u64,
    pub node_count: u32,
    pub link_count: u32,
    pub form_count: u32,
    pub input_count: u32,
    pub max_depth: u32,
    /// Frequencies aligned with [`TRACKED_TAGS`]
    pub tag_counts: Vec<u32>,
}

impl DomSignature {
    /// Build a signature. Malformed markup is parsed leniently.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);

        let mut shingles: Vec<String> = Vec::new();
        let mut structure = String::new();
        let mut tag_counts = vec![0u32; TRACKED_TAGS.len()];
        let mut node_count = 0u32;
        let mut link_count = 0u32;
        let mut form_count = 0u32;
        let mut input_count = 0u32;
        let mut max_depth = 0u32;

        let root = document.root_element();
        let mut stack: Vec<(ElementRef<'_>, u32, &str, &str)> = vec![(root, 0, "", "")];

        while let Some((element, depth, parent, grandparent)) = stack.pop() {
            let name = element.value().name();
            node_count += 1;
            max_depth = max_depth.max(depth);

            if let Some(slot) = TRACKED_TAGS.iter().position(|t| *t == name) {
                tag_counts[slot] += 1;
            }
            match name {
                "a" if element.value().attr("href").is_some() => link_count += 1,
                "form" => form_count += 1,
                "input" | "select" | "textarea" => input_count += 1,
                _ => {}
            }

            shingles.push(format!("{}>{}>{}", grandparent, parent, name));
            structure.push_str(&depth.to_string());
            structure.push(':');
            structure.push_str(name);
            structure.push(';');

            let children: Vec<ElementRef<'_>> =
                element.children().filter_map(ElementRef::wrap).collect();
            for child in children.into_iter().rev() {
                stack.push((child, depth + 1, name, parent));
            }
        }

        Self {
            simhash: compute_simhash(shingles.iter().map(String::as_str)),
            structure_hash: fast_hash(&structure),
            node_count,
            link_count,
            form_count,
            input_count,
            max_depth,
            tag_counts,
        }
    }

    /// Similarity in [0, 1]; equal structure hashes give 1.0
    pub fn similarity(&self, other: &DomSignature) -> f64 {
        if self.structure_hash == other.structure_hash {
            return 1.0;
        }

        let hamming = (self.simhash ^ other.simhash).count_ones() as f64;
        let simhash_similarity = 1.0 - hamming / 64.0;

        let pairs = [
            (self.max_depth, other.max_depth),
            (self.node_count, other.node_count),
            (self.link_count, other.link_count),
            (self.form_count, other.form_count),
            (self.input_count, other.input_count),
        ];
        let count_similarity = pairs
            .iter()
            .map(|&(a, b)| normalized_difference(a, b))
            .sum::<f64>()
            / pairs.len() as f64;

        let tag_similarity = cosine(&self.tag_counts, &other.tag_counts);

        (simhash_similarity + count_similarity + tag_similarity) / 3.0
    }
}

fn normalized_difference(a: u32, b: u32) -> f64 {
    let max = a.max(b);
    if max == 0 {
        return 1.0;
    }
    1.0 - (a.abs_diff(b) as f64 / max as f64)
}

fn cosine(a: &[u32], b: &[u32]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 && norm_b == 0.0 {
        return 1.0;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Mean similarity over all unordered pairs
pub fn mean_pairwise_similarity(signatures: &[DomSignature]) -> f64 {
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for i in 0..signatures.len() {
        for j in (i + 1)..signatures.len() {
            sum += signatures[i].similarity(&signatures[j]);
            pairs += 1;
        }
    }
    if pairs == 0 {
        1.0
    } else {
        sum / pairs as f64
    }
}

/// Verification state of one pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationState {
    #[default]
    New,
    Sampling,
    VerifiedSimilar,
    VerifiedDifferent,
}

impl VerificationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::VerifiedSimilar | Self::VerifiedDifferent)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Sampling => "sampling",
            Self::VerifiedSimilar => "verified-similar",
            Self::VerifiedDifferent => "verified-different",
        }
    }
}

/// Sampled signatures and verdict for one pattern
#[derive(Debug, Clone, Default)]
pub struct DomVerification {
    state: VerificationState,
    signatures: Vec<DomSignature>,
    average_similarity: Option<f64>,
}

impl DomVerification {
    pub fn state(&self) -> VerificationState {
        self.state
    }

    pub fn signatures(&self) -> &[DomSignature] {
        &self.signatures
    }

    pub fn average_similarity(&self) -> Option<f64> {
        self.average_similarity
    }

    /// The pattern has seen its first URL
    pub fn start(&mut self) {
        if self.state == VerificationState::New {
            self.state = VerificationState::Sampling;
        }
    }

    /// Add a fetched page's signature.
    ///
    /// Returns the new state when this sample completed verification.
    /// Terminal states ignore further samples.
    pub fn add_sample(
        &mut self,
        signature: DomSignature,
        sample_count: usize,
        threshold: f64,
    ) -> Option<VerificationState> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = VerificationState::Sampling;
        if self.signatures.len() < sample_count {
            self.signatures.push(signature);
        }
        if self.signatures.len() < sample_count {
            return None;
        }

        let mean = mean_pairwise_similarity(&self.signatures);
        self.average_similarity = Some(mean);
        self.state = if mean >= threshold {
            VerificationState::VerifiedSimilar
        } else {
            VerificationState::VerifiedDifferent
        };
        Some(self.state)
    }
}
