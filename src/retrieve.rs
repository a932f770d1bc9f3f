//! CLI entry points for retrieval: `retrieve`, `select`, `search`, `decide`.
//!
//! Each command builds a [`Retriever`] over the configured SQLite store,
//! reasoning service and embedder, runs one pipeline entry point, and
//! prints either a human-readable listing or the full result as JSON.

use anyhow::{bail, Context, Result};
use std::time::Duration;

use context_select_core::pipeline::RetrievalRequest;
use context_select_core::summarizer::preview;
use context_select_core::{
    decide, BudgetMode, ModeDecision, ReasoningService, RelevanceSelector, RetrievalBudget,
    RetrievalResult, Retriever, Scope, SelectionMethod,
};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::reasoning::create_reasoning;
use crate::sqlite_store::SqliteStore;

pub type AppRetriever = Retriever<SqliteStore, RelevanceSelector<Box<dyn ReasoningService>>>;

/// Per-invocation options shared by the query commands.
#[derive(Debug, Clone, Default)]
pub struct QueryArgs {
    pub identity: String,
    pub documents: Vec<String>,
    pub pool: Option<usize>,
    pub count: Option<usize>,
    pub json: bool,
}

impl QueryArgs {
    fn scope(&self) -> Scope<'_> {
        let filter = if self.documents.is_empty() {
            None
        } else {
            Some(self.documents.as_slice())
        };
        Scope::new(&self.identity, filter)
    }
}

/// Wire the store, reasoning service, and embedder from configuration.
pub async fn build_retriever(config: &Config) -> Result<AppRetriever> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let service = create_reasoning(&config.reasoning)?;
    let selector = RelevanceSelector::new(service)
        .with_timeout(Duration::from_secs(config.reasoning.timeout_secs));
    let embedder = create_embedder(&config.embedding)?;

    Ok(Retriever::new(store, selector)
        .with_embedder(embedder)
        .with_options(config.retrieval.pipeline_options()))
}

/// `ctxsel retrieve`: budget-gated retrieval. `--count` replaces the
/// configured budget with a fixed one.
pub async fn run_retrieve(config: &Config, query: &str, args: &QueryArgs) -> Result<()> {
    let mut options = config.retrieval.pipeline_options();
    if let Some(pool) = args.pool {
        options.candidate_pool_size = pool;
    }
    let retriever = build_retriever(config).await?.with_options(options);

    let budget = match args.count {
        Some(count) => RetrievalBudget::Fixed { count },
        None => config.retrieval.budget,
    };
    let filter = (!args.documents.is_empty()).then_some(args.documents.as_slice());
    let request = RetrievalRequest {
        query,
        identity: &args.identity,
        document_ids: filter,
        budget,
    };

    let result = retriever.retrieve(&request).await?;
    emit(&result, args.json)
}

/// `ctxsel select`: two-stage selection.
pub async fn run_select(config: &Config, query: &str, args: &QueryArgs) -> Result<()> {
    let retriever = build_retriever(config).await?;
    let options = retriever.options();
    let pool = args.pool.unwrap_or(options.candidate_pool_size);
    let count = args.count.unwrap_or(options.final_count);

    let result = retriever
        .two_stage_select(query, args.scope(), pool, count)
        .await?;
    emit(&result, args.json)
}

/// `ctxsel search`: hybrid search, with relevance selection unless
/// `no_smart` is set.
pub async fn run_search(
    config: &Config,
    query: &str,
    args: &QueryArgs,
    no_smart: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        bail!("search query must not be empty");
    }
    let retriever = build_retriever(config).await?;
    let options = retriever.options();
    let pool = args.pool.unwrap_or(options.candidate_pool_size);
    let count = args.count.unwrap_or(options.final_count);
    let smart = options.smart_selection && !no_smart;

    let result = retriever
        .hybrid_search(query, args.scope(), smart, pool, count)
        .await?;
    emit(&result, args.json)
}

/// Raw parameters for `ctxsel decide`.
#[derive(Debug, Clone)]
pub struct DecideArgs {
    pub mode: String,
    pub percent: Option<f64>,
    pub cap: Option<f64>,
    pub count: Option<usize>,
    pub corpus: usize,
    pub json: bool,
}

/// Build a budget from the `decide` flags, requiring what each mode needs.
pub fn budget_from_args(args: &DecideArgs) -> Result<RetrievalBudget> {
    let budget = match args.mode.as_str() {
        "fixed" => RetrievalBudget::Fixed {
            count: args.count.context("--count is required for fixed mode")?,
        },
        "percent" => RetrievalBudget::Percent {
            percent: args.percent.context("--percent is required for percent mode")?,
        },
        "adaptive" => RetrievalBudget::Adaptive {
            percent: args
                .percent
                .context("--percent is required for adaptive mode")?,
            max_percent_cap: args.cap.unwrap_or(100.0),
        },
        "full_document" => RetrievalBudget::FullDocument,
        other => bail!(
            "Unknown budget mode: '{}'. Must be fixed, percent, adaptive, or full_document.",
            other
        ),
    };
    budget.validate()?;
    Ok(budget)
}

/// `ctxsel decide`: show the mode decision without touching the store.
pub fn run_decide(args: &DecideArgs) -> Result<()> {
    let budget = budget_from_args(args)?;
    let decision = decide(&budget, args.corpus);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        print_decision(&decision);
    }
    Ok(())
}

fn print_decision(decision: &ModeDecision) {
    println!("mode: {}", decision.mode);
    println!("bounded: {}", decision.bounded);
    if decision.mode != BudgetMode::FullDocument {
        println!(
            "target_count: {} of {}",
            decision.target_count, decision.corpus_size
        );
    }
    println!("rationale: {}", decision.rationale);
}

fn emit(result: &RetrievalResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print_result(result);
    }
    Ok(())
}

fn print_result(result: &RetrievalResult) {
    let diag = &result.diagnostics;

    let mut header = format!("strategy: {}", diag.strategy);
    if let Some(method) = &diag.selection_method {
        match method {
            SelectionMethod::Reasoned => header.push_str(" | selection: reasoned"),
            SelectionMethod::Fallback { reason } => {
                header.push_str(&format!(" | selection: fallback ({:?})", reason))
            }
        }
    }
    if diag.vector_scoring == Some(false) {
        header.push_str(" | keyword-only scoring");
    }
    println!("{}", header);
    if let Some(mode) = &diag.mode {
        println!("mode: {}", mode.rationale);
    }

    if result.fragments.is_empty() {
        println!("No results.");
        return;
    }

    println!();
    for (i, item) in result.fragments.iter().enumerate() {
        let f = &item.fragment;
        let name = item.document_name.as_deref().unwrap_or(f.document_id.as_str());
        let mut line = format!("{}. {} #{}", i + 1, name, f.sequence_index);
        if let Some(chapter) = &f.metadata.chapter {
            line.push_str(&format!(" | {}", chapter));
        }
        if let Some(pos) = f.metadata.position_percent {
            line.push_str(&format!(" | {:.0}%", pos));
        }
        if let Some(scores) = &item.scores {
            line.push_str(&format!(" | score {:.3}", scores.combined));
        }
        println!("{}", line);
        println!("    id: {}", f.id);
        println!("    {}", preview(&f.content).replace('\n', " "));
        println!();
    }
    println!("selected: {}", diag.selected);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: &str) -> DecideArgs {
        DecideArgs {
            mode: mode.to_string(),
            percent: None,
            cap: None,
            count: None,
            corpus: 100,
            json: false,
        }
    }

    #[test]
    fn test_budget_requires_mode_parameters() {
        assert!(budget_from_args(&args("fixed")).is_err());
        assert!(budget_from_args(&args("percent")).is_err());
        assert_eq!(
            budget_from_args(&args("full_document")).unwrap(),
            RetrievalBudget::FullDocument
        );
        assert!(budget_from_args(&args("everything")).is_err());
    }

    #[test]
    fn test_adaptive_cap_defaults_to_100() {
        let a = DecideArgs {
            percent: Some(30.0),
            ..args("adaptive")
        };
        assert_eq!(
            budget_from_args(&a).unwrap(),
            RetrievalBudget::Adaptive {
                percent: 30.0,
                max_percent_cap: 100.0
            }
        );
    }

    #[test]
    fn test_out_of_range_percent_rejected() {
        let a = DecideArgs {
            percent: Some(0.0),
            ..args("percent")
        };
        assert!(budget_from_args(&a).is_err());
    }

    #[test]
    fn test_scope_filter_only_when_documents_given() {
        let mut q = QueryArgs {
            identity: "alice".to_string(),
            ..QueryArgs::default()
        };
        assert!(q.scope().document_ids.is_none());
        q.documents.push("d1".to_string());
        assert_eq!(q.scope().document_ids.map(|d| d.len()), Some(1));
    }
}
