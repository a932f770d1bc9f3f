//! Retrieval orchestration.
//!
//! [`Retriever`] composes the store, scorer, summarizer, and selector into
//! the two supported strategies plus a budget-gated entry point:
//!
//! | Entry point | Flow |
//! |-------------|------|
//! | [`two_stage_select`](Retriever::two_stage_select) | fetch pool → summarize → select → re-fetch, reading order |
//! | [`hybrid_search`](Retriever::hybrid_search) | score → (optional) select over scored candidates |
//! | [`retrieve`](Retriever::retrieve) | mode decider → full document or one of the above |
//!
//! Store failures propagate as [`RetrievalError::StoreAccess`]; only the
//! reasoning step has a soft fallback. No state is kept across calls, so a
//! single `Retriever` can serve concurrent requests.

mod diagnostics;

pub use diagnostics::{Diagnostics, PipelineFallback, Stage, StageReport, Strategy};

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::decider::{decide, RetrievalBudget};
use crate::error::RetrievalError;
use crate::models::Fragment;
use crate::scorer::{score_scope, ScoredFragment, Scores};
use crate::selector::Selector;
use crate::similarity::{CosineSimilarity, NoEmbedder, QueryEmbedder, Similarity};
use crate::store::{FragmentStore, Scope};
use crate::summarizer::{distinct_document_ids, summarize, summarize_with_names};

/// Default number of candidates handed to the selector.
pub const DEFAULT_CANDIDATE_POOL_SIZE: usize = 50;
/// Default number of fragments returned.
pub const DEFAULT_FINAL_COUNT: usize = 10;
/// Default bound on embedding the query before scoring.
pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(10);

/// Narrowing strategy for bounded retrieval. Returning the whole corpus is
/// the mode decider's call alone, so it is not an option here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundedStrategy {
    TwoStage,
    Hybrid,
}

impl From<BoundedStrategy> for Strategy {
    fn from(s: BoundedStrategy) -> Self {
        match s {
            BoundedStrategy::TwoStage => Strategy::TwoStage,
            BoundedStrategy::Hybrid => Strategy::Hybrid,
        }
    }
}

/// Tuning for a [`Retriever`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Hard bound on the batch handed to the selector.
    pub candidate_pool_size: usize,
    pub final_count: usize,
    /// Strategy used by [`Retriever::retrieve`] for bounded retrieval.
    pub strategy: BoundedStrategy,
    /// Whether hybrid search runs the relevance selector.
    pub smart_selection: bool,
    /// Past this, scoring proceeds on keywords only.
    pub embed_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            candidate_pool_size: DEFAULT_CANDIDATE_POOL_SIZE,
            final_count: DEFAULT_FINAL_COUNT,
            strategy: BoundedStrategy::TwoStage,
            smart_selection: true,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }
}

/// Caller-supplied inputs for [`Retriever::retrieve`].
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    pub identity: &'a str,
    pub document_ids: Option<&'a [String]>,
    pub budget: RetrievalBudget,
}

impl<'a> RetrievalRequest<'a> {
    pub fn scope(&self) -> Scope<'a> {
        Scope::new(self.identity, self.document_ids)
    }
}

/// A full fragment record in a result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedFragment {
    pub fragment: Fragment,
    pub document_name: Option<String>,
    /// Present when the fragment came out of the scorer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Scores>,
}

/// Ordered fragments plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub fragments: Vec<RetrievedFragment>,
    pub diagnostics: Diagnostics,
}

impl RetrievalResult {
    fn empty(diagnostics: Diagnostics) -> Self {
        Self {
            fragments: Vec::new(),
            diagnostics,
        }
    }

    fn finish(fragments: Vec<RetrievedFragment>, mut diagnostics: Diagnostics) -> Self {
        diagnostics.selected = fragments.len();
        Self {
            fragments,
            diagnostics,
        }
    }

    pub fn fragment_ids(&self) -> Vec<&str> {
        self.fragments
            .iter()
            .map(|f| f.fragment.id.as_str())
            .collect()
    }
}

/// Retrieval pipeline over a [`FragmentStore`] and a [`Selector`].
pub struct Retriever<S, Sel> {
    store: S,
    selector: Sel,
    embedder: Box<dyn QueryEmbedder>,
    similarity: Box<dyn Similarity>,
    options: PipelineOptions,
}

impl<S: FragmentStore, Sel: Selector> Retriever<S, Sel> {
    /// Keyword-only scoring and default options until configured otherwise.
    pub fn new(store: S, selector: Sel) -> Self {
        Self {
            store,
            selector,
            embedder: Box::new(NoEmbedder),
            similarity: Box::new(CosineSimilarity),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_embedder(mut self, embedder: impl QueryEmbedder + 'static) -> Self {
        self.embedder = Box::new(embedder);
        self
    }

    pub fn with_similarity(mut self, similarity: impl Similarity + 'static) -> Self {
        self.similarity = Box::new(similarity);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Budget-gated retrieval: full document set or the configured strategy.
    ///
    /// In bounded mode the budget's target count becomes the final count,
    /// capped at `candidate_pool_size` so the selector batch stays bounded.
    /// A capped target is reported in [`Diagnostics::clamped_target`].
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest<'_>,
    ) -> Result<RetrievalResult, RetrievalError> {
        request.budget.validate()?;
        let scope = request.scope();

        let corpus_size = self
            .store
            .count_fragments(scope)
            .await
            .map_err(RetrievalError::store)?;
        let decision = decide(&request.budget, corpus_size);
        info!(
            mode = %decision.mode,
            bounded = decision.bounded,
            target_count = decision.target_count,
            corpus_size,
            "retrieval mode decided"
        );

        let mut result = if !decision.bounded {
            self.full_document(scope).await?
        } else {
            let pool = self.options.candidate_pool_size;
            let final_count = decision.target_count.min(pool);
            let mut bounded = match self.options.strategy {
                BoundedStrategy::TwoStage => {
                    self.two_stage_select(request.query, scope, pool, final_count)
                        .await?
                }
                BoundedStrategy::Hybrid => {
                    self.hybrid_search(
                        request.query,
                        scope,
                        self.options.smart_selection,
                        pool,
                        final_count,
                    )
                    .await?
                }
            };
            if final_count < decision.target_count {
                warn!(
                    target_count = decision.target_count,
                    candidate_pool_size = pool,
                    "budget target exceeds candidate pool, returning at most the pool size"
                );
                bounded.diagnostics.clamped_target = Some(decision.target_count);
            }
            bounded
        };
        result.diagnostics.mode = Some(decision);
        Ok(result)
    }

    /// Every visible fragment in reading order.
    pub async fn full_document(&self, scope: Scope<'_>) -> Result<RetrievalResult, RetrievalError> {
        let mut diag = Diagnostics::new(Strategy::FullDocument);
        let fragments = self
            .store
            .list_fragments(scope, None)
            .await
            .map_err(RetrievalError::store)?;
        diag.record(Stage::CandidateFetch, fragments.len());

        let mut retrieved = self
            .attach_names(fragments.into_iter().map(|f| (f, None)).collect(), scope.identity)
            .await?;
        sort_reading_order(&mut retrieved);
        Ok(RetrievalResult::finish(retrieved, diag))
    }

    /// Two-stage selection.
    ///
    /// 1. Fetch up to `candidate_pool_size` fragments in reading order.
    /// 2. Let the selector pick at most `final_count` from their summaries;
    ///    if it yields nothing, use the scorer's top `final_count` instead.
    /// 3. Re-fetch the chosen fragments and sort by
    ///    `(document_id, sequence_index)`, regardless of selection order.
    pub async fn two_stage_select(
        &self,
        query: &str,
        scope: Scope<'_>,
        candidate_pool_size: usize,
        final_count: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let mut diag = Diagnostics::new(Strategy::TwoStage);

        let candidates = self
            .store
            .list_fragments(scope, Some(candidate_pool_size))
            .await
            .map_err(RetrievalError::store)?;
        diag.record(Stage::CandidateFetch, candidates.len());
        if candidates.is_empty() || final_count == 0 {
            debug!(candidates = candidates.len(), "two-stage selection has nothing to select");
            return Ok(RetrievalResult::empty(diag));
        }

        let summaries = summarize(&self.store, scope.identity, &candidates).await?;
        diag.record(Stage::Summarize, summaries.len());

        let selection = self.selector.select(query, &summaries, final_count).await;
        diag.record(Stage::Selection, summaries.len());
        diag.selection_method = Some(selection.method);

        let known: HashSet<&str> = candidates.iter().map(|f| f.id.as_str()).collect();
        let mut ids = unique_known(&selection.ids, &known, final_count);
        let mut scores = HashMap::new();

        if ids.is_empty() {
            warn!("selector returned no usable ids, using scorer ranking");
            let outcome = score_scope(
                &self.store,
                self.embedder.as_ref(),
                self.similarity.as_ref(),
                scope,
                query,
                final_count,
                self.options.embed_timeout,
            )
            .await?;
            diag.record(Stage::Scoring, outcome.pool_size);
            diag.vector_scoring = Some(outcome.vector_scoring);
            diag.fallback = Some(PipelineFallback::ScorerRanking);
            for c in &outcome.candidates {
                scores.insert(c.fragment.id.clone(), c.scores);
            }
            ids = outcome
                .candidates
                .into_iter()
                .map(|c| c.fragment.id)
                .collect();
        }

        let fragments = self
            .store
            .get_fragments_by_ids(&ids, scope.identity)
            .await
            .map_err(RetrievalError::store)?;
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let fragments: Vec<(Fragment, Option<Scores>)> = fragments
            .into_iter()
            .filter(|f| wanted.contains(f.id.as_str()))
            .map(|f| {
                let s = scores.get(&f.id).copied();
                (f, s)
            })
            .collect();
        diag.record(Stage::Hydrate, fragments.len());

        let mut retrieved = self.attach_names(fragments, scope.identity).await?;
        sort_reading_order(&mut retrieved);
        debug!(selected = retrieved.len(), "two-stage selection finished");
        Ok(RetrievalResult::finish(retrieved, diag))
    }

    /// Hybrid search.
    ///
    /// Scores the scope, keeps `candidate_pool_size` candidates, and either
    /// returns the top `final_count` in score order or runs the selector over
    /// summaries built from the in-memory candidates. Selected ids are mapped
    /// back to their scored candidates in selection order.
    pub async fn hybrid_search(
        &self,
        query: &str,
        scope: Scope<'_>,
        use_smart_selection: bool,
        candidate_pool_size: usize,
        final_count: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let mut diag = Diagnostics::new(Strategy::Hybrid);

        let outcome = score_scope(
            &self.store,
            self.embedder.as_ref(),
            self.similarity.as_ref(),
            scope,
            query,
            candidate_pool_size,
            self.options.embed_timeout,
        )
        .await?;
        diag.record(Stage::Scoring, outcome.pool_size);
        diag.record(Stage::CandidateFetch, outcome.candidates.len());
        diag.vector_scoring = Some(outcome.vector_scoring);

        let candidates = outcome.candidates;
        if candidates.is_empty() || final_count == 0 {
            debug!("hybrid search has no candidates");
            return Ok(RetrievalResult::empty(diag));
        }

        let doc_ids = distinct_document_ids(candidates.iter().map(|c| &c.fragment));
        let names = self
            .store
            .list_document_names(&doc_ids, scope.identity)
            .await
            .map_err(RetrievalError::store)?;

        let chosen: Vec<ScoredFragment> = if !use_smart_selection {
            candidates.into_iter().take(final_count).collect()
        } else {
            let summaries = summarize_with_names(candidates.iter().map(|c| &c.fragment), &names);
            diag.record(Stage::Summarize, summaries.len());

            let selection = self.selector.select(query, &summaries, final_count).await;
            diag.record(Stage::Selection, summaries.len());
            diag.selection_method = Some(selection.method);

            let by_id: HashMap<&str, &ScoredFragment> = candidates
                .iter()
                .map(|c| (c.fragment.id.as_str(), c))
                .collect();
            let known: HashSet<&str> = by_id.keys().copied().collect();
            let mapped: Vec<ScoredFragment> = unique_known(&selection.ids, &known, final_count)
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).map(|c| (*c).clone()))
                .collect();

            if mapped.is_empty() {
                warn!("selected ids matched no scored candidate, using top scored");
                diag.fallback = Some(PipelineFallback::ScoredPrefix);
                candidates.into_iter().take(final_count).collect()
            } else {
                mapped
            }
        };

        let retrieved = chosen
            .into_iter()
            .map(|c| RetrievedFragment {
                document_name: names.get(&c.fragment.document_id).cloned(),
                scores: Some(c.scores),
                fragment: c.fragment,
            })
            .collect();
        Ok(RetrievalResult::finish(retrieved, diag))
    }

    async fn attach_names(
        &self,
        fragments: Vec<(Fragment, Option<Scores>)>,
        identity: &str,
    ) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        if fragments.is_empty() {
            return Ok(Vec::new());
        }
        let doc_ids = distinct_document_ids(fragments.iter().map(|(f, _)| f));
        let names = self
            .store
            .list_document_names(&doc_ids, identity)
            .await
            .map_err(RetrievalError::store)?;
        Ok(fragments
            .into_iter()
            .map(|(fragment, scores)| RetrievedFragment {
                document_name: names.get(&fragment.document_id).cloned(),
                scores,
                fragment,
            })
            .collect())
    }
}

/// Keep ids that are in `known`, first occurrence only, at most `max`.
fn unique_known(ids: &[String], known: &HashSet<&str>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if out.len() == max {
            break;
        }
        if known.contains(id.as_str()) && seen.insert(id.as_str()) {
            out.push(id.clone());
        }
    }
    out
}

fn sort_reading_order(fragments: &mut [RetrievedFragment]) {
    fragments.sort_by(|a, b| a.fragment.reading_key().cmp(&b.fragment.reading_key()));
}
