//! Configuration parsing and validation.
//!
//! The `ctxsel` binary reads a single TOML file (default
//! `./config/ctxsel.toml`). Only `[db]` is required; every other section
//! falls back to defaults that run fully offline (reasoning and embedding
//! disabled, keyword-only scoring, ordered-prefix selection).
//!
//! ```toml
//! [db]
//! path = "./data/ctxsel.sqlite"
//!
//! [retrieval]
//! strategy = "two_stage"          # or "hybrid"
//! smart_selection = true
//! candidate_pool_size = 50
//! final_count = 10
//! budget = { mode = "percent", percent = 20.0 }
//!
//! [reasoning]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! timeout_secs = 30
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use context_select_core::pipeline::{BoundedStrategy, PipelineOptions};
use context_select_core::RetrievalBudget;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Narrowing strategy for bounded budgets; `full_document` is rejected
    /// at parse time since only the budget can ask for the whole corpus.
    #[serde(default = "default_strategy")]
    pub strategy: BoundedStrategy,
    #[serde(default = "default_true")]
    pub smart_selection: bool,
    #[serde(default = "default_candidate_pool_size")]
    pub candidate_pool_size: usize,
    #[serde(default = "default_final_count")]
    pub final_count: usize,
    #[serde(default = "default_budget")]
    pub budget: RetrievalBudget,
    /// Bound on query embedding before scoring falls back to keywords.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            smart_selection: true,
            candidate_pool_size: default_candidate_pool_size(),
            final_count: default_final_count(),
            budget: default_budget(),
            embed_timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl RetrievalConfig {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            candidate_pool_size: self.candidate_pool_size,
            final_count: self.final_count,
            strategy: self.strategy,
            smart_selection: self.smart_selection,
            embed_timeout: Duration::from_secs(self.embed_timeout_secs),
        }
    }
}

fn default_strategy() -> BoundedStrategy {
    BoundedStrategy::TwoStage
}
fn default_true() -> bool {
    true
}
fn default_candidate_pool_size() -> usize {
    context_select_core::pipeline::DEFAULT_CANDIDATE_POOL_SIZE
}
fn default_final_count() -> usize {
    context_select_core::pipeline::DEFAULT_FINAL_COUNT
}
fn default_budget() -> RetrievalBudget {
    RetrievalBudget::Percent { percent: 20.0 }
}
fn default_embed_timeout_secs() -> u64 {
    context_select_core::pipeline::DEFAULT_EMBED_TIMEOUT.as_secs()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReasoningConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ReasoningConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}
fn default_max_tokens() -> u32 {
    256
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Retrieval
    if config.retrieval.candidate_pool_size == 0 {
        anyhow::bail!("retrieval.candidate_pool_size must be >= 1");
    }
    if config.retrieval.final_count == 0 {
        anyhow::bail!("retrieval.final_count must be >= 1");
    }
    if config.retrieval.embed_timeout_secs == 0 {
        anyhow::bail!("retrieval.embed_timeout_secs must be >= 1");
    }
    config
        .retrieval
        .budget
        .validate()
        .map_err(|e| anyhow::anyhow!("retrieval.budget: {}", e))?;

    // Reasoning
    match config.reasoning.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown reasoning provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.reasoning.is_enabled() && config.reasoning.model.is_none() {
        anyhow::bail!(
            "reasoning.model must be specified when provider is '{}'",
            config.reasoning.provider
        );
    }
    if !(0.0..=2.0).contains(&config.reasoning.temperature) {
        anyhow::bail!("reasoning.temperature must be in [0.0, 2.0]");
    }
    if config.reasoning.timeout_secs == 0 {
        anyhow::bail!("reasoning.timeout_secs must be >= 1");
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_offline_defaults() {
        let config = parse("[db]\npath = \"/tmp/x.sqlite\"\n").unwrap();
        assert_eq!(config.retrieval.strategy, BoundedStrategy::TwoStage);
        assert_eq!(
            config.retrieval.pipeline_options().embed_timeout,
            Duration::from_secs(10)
        );
        assert!(config.retrieval.smart_selection);
        assert_eq!(config.retrieval.candidate_pool_size, 50);
        assert_eq!(config.retrieval.final_count, 10);
        assert_eq!(
            config.retrieval.budget,
            RetrievalBudget::Percent { percent: 20.0 }
        );
        assert!(!config.reasoning.is_enabled());
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.reasoning.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.reasoning.timeout_secs, 30);
    }

    #[test]
    fn test_budget_table_parses_each_mode() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[retrieval]
strategy = "hybrid"
budget = { mode = "adaptive", percent = 30.0, max_percent_cap = 60.0 }
"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.strategy, BoundedStrategy::Hybrid);
        assert_eq!(
            config.retrieval.budget,
            RetrievalBudget::Adaptive {
                percent: 30.0,
                max_percent_cap: 60.0
            }
        );

        let config = parse(
            "[db]\npath = \"x\"\n[retrieval]\nbudget = { mode = \"full_document\" }\n",
        )
        .unwrap();
        assert_eq!(config.retrieval.budget, RetrievalBudget::FullDocument);

        let config =
            parse("[db]\npath = \"x\"\n[retrieval]\nbudget = { mode = \"fixed\", count = 7 }\n")
                .unwrap();
        assert_eq!(config.retrieval.budget, RetrievalBudget::Fixed { count: 7 });
    }

    #[test]
    fn test_full_document_strategy_rejected() {
        let err = parse("[db]\npath = \"x\"\n[retrieval]\nstrategy = \"full_document\"\n")
            .unwrap_err();
        assert!(err.to_string().contains("full_document"), "{}", err);
    }

    #[test]
    fn test_invalid_budget_rejected() {
        let err = parse(
            "[db]\npath = \"x\"\n[retrieval]\nbudget = { mode = \"percent\", percent = 150.0 }\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("retrieval.budget"));
    }

    #[test]
    fn test_zero_pool_rejected() {
        let err = parse("[db]\npath = \"x\"\n[retrieval]\ncandidate_pool_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("candidate_pool_size"));
    }

    #[test]
    fn test_reasoning_requires_model() {
        let err = parse("[db]\npath = \"x\"\n[reasoning]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("reasoning.model"));

        let err = parse("[db]\npath = \"x\"\n[reasoning]\nprovider = \"llama\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown reasoning provider"));
    }

    #[test]
    fn test_embedding_requires_dims_and_model() {
        let err = parse(
            "[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\nmodel = \"m\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_pipeline_options_mirror_config() {
        let config = parse(
            "[db]\npath = \"x\"\n[retrieval]\nsmart_selection = false\nfinal_count = 4\n",
        )
        .unwrap();
        let options = config.retrieval.pipeline_options();
        assert!(!options.smart_selection);
        assert_eq!(options.final_count, 4);
        assert_eq!(options.candidate_pool_size, 50);
    }
}
