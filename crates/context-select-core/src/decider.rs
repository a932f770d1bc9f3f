//! Retrieval mode decision: whole document set or bounded retrieval.
//!
//! | Mode | Bounded when |
//! |------|--------------|
//! | `fixed` | always |
//! | `percent` | `percent < 80` |
//! | `adaptive` | `max_percent_cap < 80`, else `target_count < 50%` of the corpus |
//! | `full_document` | never |
//!
//! A user's literal percentage is authoritative in `percent` mode; the
//! fragment-count heuristic only applies to `adaptive`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RetrievalError;

/// Percentages at or above this keep the full document set.
pub const FULL_DOCUMENT_PERCENT: f64 = 80.0;

/// Adaptive mode narrows when the target is below this share of the corpus.
pub const ADAPTIVE_CORPUS_SHARE: f64 = 0.5;

/// Caller-controlled retrieval budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetrievalBudget {
    /// An absolute fragment count.
    Fixed { count: usize },
    /// A percentage of the corpus.
    Percent { percent: f64 },
    /// A percentage of the corpus, additionally capped.
    Adaptive { percent: f64, max_percent_cap: f64 },
    /// Never narrow.
    FullDocument,
}

/// Budget mode without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    Fixed,
    Percent,
    Adaptive,
    FullDocument,
}

impl fmt::Display for BudgetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetMode::Fixed => "fixed",
            BudgetMode::Percent => "percent",
            BudgetMode::Adaptive => "adaptive",
            BudgetMode::FullDocument => "full_document",
        })
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeDecision {
    pub mode: BudgetMode,
    /// True when bounded retrieval should run instead of the full corpus.
    pub bounded: bool,
    /// Number of fragments the budget asks for.
    pub target_count: usize,
    pub corpus_size: usize,
    pub rationale: String,
}

impl RetrievalBudget {
    pub fn mode(&self) -> BudgetMode {
        match self {
            RetrievalBudget::Fixed { .. } => BudgetMode::Fixed,
            RetrievalBudget::Percent { .. } => BudgetMode::Percent,
            RetrievalBudget::Adaptive { .. } => BudgetMode::Adaptive,
            RetrievalBudget::FullDocument => BudgetMode::FullDocument,
        }
    }

    /// Reject budgets whose numbers cannot be honored.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        let pct_ok = |p: f64| p.is_finite() && p > 0.0 && p <= 100.0;
        match *self {
            RetrievalBudget::Fixed { count } if count == 0 => Err(
                RetrievalError::InvalidRequest("fixed budget count must be >= 1".to_string()),
            ),
            RetrievalBudget::Percent { percent } if !pct_ok(percent) => {
                Err(RetrievalError::InvalidRequest(format!(
                    "percent must be in (0, 100], got {}",
                    percent
                )))
            }
            RetrievalBudget::Adaptive {
                percent,
                max_percent_cap,
            } if !pct_ok(percent) || !pct_ok(max_percent_cap) => {
                Err(RetrievalError::InvalidRequest(format!(
                    "adaptive percent and cap must be in (0, 100], got {} / {}",
                    percent, max_percent_cap
                )))
            }
            _ => Ok(()),
        }
    }

    /// Number of fragments this budget asks for out of `corpus_size`.
    ///
    /// Percent-based budgets round up and never drop below one fragment of
    /// a non-empty corpus.
    pub fn target_count(&self, corpus_size: usize) -> usize {
        let of_percent = |p: f64| {
            let n = (corpus_size as f64 * p / 100.0).ceil() as usize;
            n.clamp(1.min(corpus_size), corpus_size)
        };
        match *self {
            RetrievalBudget::Fixed { count } => count.min(corpus_size),
            RetrievalBudget::Percent { percent } => of_percent(percent),
            RetrievalBudget::Adaptive {
                percent,
                max_percent_cap,
            } => of_percent(percent.min(max_percent_cap)),
            RetrievalBudget::FullDocument => corpus_size,
        }
    }
}

/// Literal decision rule over raw parameters.
///
/// `percent` is read in `percent` mode, `cap` in `adaptive` mode, and
/// `target_count` against `corpus_size` in `adaptive` mode only.
pub fn decide_mode(
    mode: BudgetMode,
    percent: f64,
    cap: f64,
    target_count: usize,
    corpus_size: usize,
) -> (bool, String) {
    match mode {
        BudgetMode::Fixed => (
            true,
            format!("fixed budget of {} fragments requests narrowing", target_count),
        ),
        BudgetMode::Percent if percent < FULL_DOCUMENT_PERCENT => (
            true,
            format!(
                "percent {} is below {}: bounded retrieval",
                percent, FULL_DOCUMENT_PERCENT
            ),
        ),
        BudgetMode::Percent => (
            false,
            format!(
                "percent {} is at least {}: full document",
                percent, FULL_DOCUMENT_PERCENT
            ),
        ),
        BudgetMode::Adaptive if cap < FULL_DOCUMENT_PERCENT => (
            true,
            format!(
                "adaptive cap {} is below {}: bounded retrieval",
                cap, FULL_DOCUMENT_PERCENT
            ),
        ),
        BudgetMode::Adaptive
            if (target_count as f64) < corpus_size as f64 * ADAPTIVE_CORPUS_SHARE =>
        {
            (
                true,
                format!(
                    "adaptive target {} is under half of {} fragments: bounded retrieval",
                    target_count, corpus_size
                ),
            )
        }
        BudgetMode::Adaptive => (
            false,
            format!(
                "adaptive target {} covers at least half of {} fragments: full document",
                target_count, corpus_size
            ),
        ),
        BudgetMode::FullDocument => (false, "full_document mode never narrows".to_string()),
    }
}

/// Decide how `budget` applies to a corpus of `corpus_size` fragments.
pub fn decide(budget: &RetrievalBudget, corpus_size: usize) -> ModeDecision {
    let target_count = budget.target_count(corpus_size);
    let (percent, cap) = match *budget {
        RetrievalBudget::Percent { percent } => (percent, 100.0),
        RetrievalBudget::Adaptive {
            percent,
            max_percent_cap,
        } => (percent, max_percent_cap),
        _ => (100.0, 100.0),
    };
    let (bounded, rationale) = decide_mode(budget.mode(), percent, cap, target_count, corpus_size);
    ModeDecision {
        mode: budget.mode(),
        bounded,
        target_count,
        corpus_size,
        rationale,
    }
}
