//! Keyword-overlap scoring.
//!
//! The score is the share of distinct query terms that appear in the
//! fragment text, so it is already in `[0, 1]`.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "it", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when", "where",
    "which", "who", "why", "with",
];

/// Lowercased alphanumeric terms of at least two characters, minus stopwords.
pub fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Fraction of `query_terms` present in `content`. `0.0` for an empty query.
pub fn keyword_score(query_terms: &BTreeSet<String>, content: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = terms(content);
    let hits = query_terms
        .iter()
        .filter(|t| content_terms.contains(*t))
        .count();
    hits as f64 / query_terms.len() as f64
}
