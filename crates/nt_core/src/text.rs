//! Text normalization shared by ingestion and duplicate detection.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Tokens of this length or shorter are ignored by title similarity.
pub const MIN_TOKEN_CHARS: usize = 4;

/// Lower-cases, strips diacritics and punctuation, and collapses whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Equality fingerprint over the title and the first `prefix_chars`
/// characters of the content.
pub fn fingerprint(title: &str, content: &str, prefix_chars: usize) -> String {
    let prefix: String = content.chars().take(prefix_chars).collect();
    let normalized = normalize(&format!("{} {}", title, prefix));
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

pub fn title_tokens(title: &str) -> HashSet<String> {
    normalize(title)
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_string)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn title_similarity(a: &str, b: &str) -> f64 {
    jaccard(&title_tokens(a), &title_tokens(b))
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
