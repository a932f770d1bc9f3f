//! Hybrid vector + keyword ranking of fragments.
//!
//! # Scoring
//!
//! 1. Vector similarity via [`Similarity`] (already in `[0, 1]`; `0.0` when
//!    either the query or the fragment has no embedding).
//! 2. Keyword score: share of distinct query terms found in the fragment.
//! 3. `combined = 0.7 × similarity + 0.3 × keyword`.
//! 4. Sort by combined (desc), sequence index (asc), document id (asc),
//!    fragment id (asc).
//! 5. Truncate to the caller's limit.
//!
//! Identity only acts as a pre-filter through [`Scope`]; ranking itself is a
//! pure function of the query and the pool.

use serde::Serialize;
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::RetrievalError;
use crate::keyword;
use crate::models::Fragment;
use crate::similarity::{QueryEmbedder, Similarity};
use crate::store::{FragmentStore, Scope};

/// Weight of vector similarity in the combined score.
pub const VECTOR_WEIGHT: f64 = 0.7;
/// Weight of keyword overlap in the combined score.
pub const KEYWORD_WEIGHT: f64 = 0.3;

/// Per-fragment scoring breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    /// Raw vector similarity in `[0, 1]`.
    pub similarity: f64,
    /// Keyword-match score in `[0, 1]`.
    pub keyword: f64,
    /// `0.7 × similarity + 0.3 × keyword`.
    pub combined: f64,
}

/// A fragment with its scores.
#[derive(Debug, Clone)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub scores: Scores,
}

/// Result of scoring a scope.
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    /// Top candidates in descending combined-score order.
    pub candidates: Vec<ScoredFragment>,
    /// Number of fragments that were scored.
    pub pool_size: usize,
    /// False when the query could not be embedded and scoring fell back
    /// to keyword overlap only.
    pub vector_scoring: bool,
}

/// Rank `pool` against the query and keep the top `limit`.
pub fn rank_fragments(
    query: &str,
    query_vec: Option<&[f32]>,
    pool: Vec<Fragment>,
    limit: usize,
    similarity: &dyn Similarity,
) -> Vec<ScoredFragment> {
    let query_terms = keyword::terms(query);

    let mut scored: Vec<ScoredFragment> = pool
        .into_iter()
        .map(|fragment| {
            let sim = match (query_vec, fragment.embedding.as_deref()) {
                (Some(q), Some(v)) => similarity.similarity(q, v).clamp(0.0, 1.0),
                _ => 0.0,
            };
            let kw = keyword::keyword_score(&query_terms, &fragment.content);
            ScoredFragment {
                scores: Scores {
                    similarity: sim,
                    keyword: kw,
                    combined: VECTOR_WEIGHT * sim + KEYWORD_WEIGHT * kw,
                },
                fragment,
            }
        })
        .collect();

    scored.sort_by(compare_ranked);
    scored.truncate(limit);
    scored
}

fn compare_ranked(a: &ScoredFragment, b: &ScoredFragment) -> Ordering {
    b.scores
        .combined
        .partial_cmp(&a.scores.combined)
        .unwrap_or(Ordering::Equal)
        .then(a.fragment.sequence_index.cmp(&b.fragment.sequence_index))
        .then(a.fragment.document_id.cmp(&b.fragment.document_id))
        .then(a.fragment.id.cmp(&b.fragment.id))
}

/// Score every fragment visible under `scope` and return the top `limit`.
///
/// Embedding failures, and embeddings slower than `embed_timeout`, degrade
/// to keyword-only scoring; store failures propagate as
/// [`RetrievalError::StoreAccess`].
pub async fn score_scope(
    store: &dyn FragmentStore,
    embedder: &dyn QueryEmbedder,
    similarity: &dyn Similarity,
    scope: Scope<'_>,
    query: &str,
    limit: usize,
    embed_timeout: Duration,
) -> Result<ScoreOutcome, RetrievalError> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(ScoreOutcome {
            candidates: Vec::new(),
            pool_size: 0,
            vector_scoring: false,
        });
    }

    let pool = store
        .list_fragments(scope, None)
        .await
        .map_err(RetrievalError::store)?;
    let pool_size = pool.len();
    if pool.is_empty() {
        return Ok(ScoreOutcome {
            candidates: Vec::new(),
            pool_size,
            vector_scoring: false,
        });
    }

    let query_vec = match tokio::time::timeout(embed_timeout, embedder.embed_query(query)).await {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            warn!(error = %e, "query embedding failed, scoring by keywords only");
            None
        }
        Err(_) => {
            warn!(
                timeout_ms = embed_timeout.as_millis() as u64,
                "query embedding timed out, scoring by keywords only"
            );
            None
        }
    };

    let candidates = rank_fragments(query, query_vec.as_deref(), pool, limit, similarity);
    debug!(
        pool_size,
        returned = candidates.len(),
        vector_scoring = query_vec.is_some(),
        "scored fragments"
    );

    Ok(ScoreOutcome {
        candidates,
        pool_size,
        vector_scoring: query_vec.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentMetadata;
    use crate::similarity::CosineSimilarity;

    fn frag(doc: &str, idx: i64, content: &str, emb: Option<Vec<f32>>) -> Fragment {
        Fragment {
            id: format!("{}-{}", doc, idx),
            document_id: doc.to_string(),
            sequence_index: idx,
            content: content.to_string(),
            embedding: emb,
            metadata: FragmentMetadata::default(),
        }
    }

    #[test]
    fn test_combined_weights() {
        let pool = vec![frag("d", 0, "whale hunting", Some(vec![1.0, 0.0]))];
        let out = rank_fragments("whale", Some(&[1.0, 0.0]), pool, 5, &CosineSimilarity);
        let s = out[0].scores;
        assert!((s.similarity - 1.0).abs() < 1e-9);
        assert!((s.keyword - 1.0).abs() < 1e-9);
        assert!((s.combined - 1.0).abs() < 1e-9);

        let pool = vec![frag("d", 0, "nothing", Some(vec![1.0, 0.0]))];
        let out = rank_fragments("whale", Some(&[1.0, 0.0]), pool, 5, &CosineSimilarity);
        assert!((out[0].scores.combined - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_descending_and_truncated() {
        let pool = vec![
            frag("d", 0, "none", Some(vec![0.0, 1.0])),
            frag("d", 1, "none", Some(vec![1.0, 0.0])),
            frag("d", 2, "none", Some(vec![1.0, 1.0])),
        ];
        let out = rank_fragments("q", Some(&[1.0, 0.0]), pool, 2, &CosineSimilarity);
        let ids: Vec<&str> = out.iter().map(|s| s.fragment.id.as_str()).collect();
        assert_eq!(ids, vec!["d-1", "d-2"]);
    }

    #[test]
    fn test_ties_break_by_sequence_then_document() {
        let pool = vec![
            frag("b", 1, "same", None),
            frag("b", 0, "same", None),
            frag("a", 1, "same", None),
            frag("a", 0, "same", None),
        ];
        let out = rank_fragments("same", None, pool, 10, &CosineSimilarity);
        let ids: Vec<&str> = out.iter().map(|s| s.fragment.id.as_str()).collect();
        assert_eq!(ids, vec!["a-0", "b-0", "a-1", "b-1"]);
    }

    #[test]
    fn test_missing_embedding_scores_zero_similarity() {
        let pool = vec![frag("d", 0, "whale", None)];
        let out = rank_fragments("whale", Some(&[1.0]), pool, 1, &CosineSimilarity);
        assert_eq!(out[0].scores.similarity, 0.0);
        assert!((out[0].scores.combined - 0.3).abs() < 1e-9);
    }
}
