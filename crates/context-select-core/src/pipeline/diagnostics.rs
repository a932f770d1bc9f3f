//! Observability record attached to every [`RetrievalResult`](super::RetrievalResult).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decider::ModeDecision;
use crate::selector::SelectionMethod;

/// Which retrieval strategy produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The whole visible corpus, no narrowing.
    FullDocument,
    /// Fetch → summarize → select → re-fetch.
    TwoStage,
    /// Score → (optionally) select.
    Hybrid,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::FullDocument => "full_document",
            Strategy::TwoStage => "two_stage",
            Strategy::Hybrid => "hybrid",
        })
    }
}

/// Pipeline stage names used in [`StageReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CandidateFetch,
    Summarize,
    Selection,
    Scoring,
    Hydrate,
}

/// How many candidates a stage considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub candidates: usize,
}

/// Pipeline-level fallbacks, distinct from the selector's own fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineFallback {
    /// Two-stage selection yielded no ids; the scorer's ranking was used.
    ScorerRanking,
    /// Hybrid selection ids matched no scored candidate; the top scored
    /// candidates were used.
    ScoredPrefix,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub strategy: Strategy,
    pub stages: Vec<StageReport>,
    /// Present when the relevance selector ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection_method: Option<SelectionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<PipelineFallback>,
    /// Present when the scorer ran; false means keyword-only scoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_scoring: Option<bool>,
    /// Present when the result went through the mode decider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ModeDecision>,
    /// Budget target that exceeded the candidate pool and was capped to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clamped_target: Option<usize>,
    /// Number of fragments in the final result.
    pub selected: usize,
}

impl Diagnostics {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            stages: Vec::new(),
            selection_method: None,
            fallback: None,
            vector_scoring: None,
            mode: None,
            clamped_target: None,
            selected: 0,
        }
    }

    pub fn record(&mut self, stage: Stage, candidates: usize) {
        self.stages.push(StageReport { stage, candidates });
    }

    /// Candidate count of the first report for `stage`.
    pub fn candidates_at(&self, stage: Stage) -> Option<usize> {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.candidates)
    }
}
