//! Library-level tests: the core pipeline over the SQLite store.

use async_trait::async_trait;
use std::path::Path;
use tempfile::TempDir;

use context_select::config::{self, Config};
use context_select::import::{import_documents, ImportFile};
use context_select::migrate::run_migrations;
use context_select::retrieve::build_retriever;
use context_select::sqlite_store::SqliteStore;
use context_select::db;
use context_select_core::pipeline::{RetrievalRequest, Strategy};
use context_select_core::{
    FragmentStore, ReasoningError, ReasoningService, RelevanceSelector, RetrievalBudget, Retriever,
    Scope, SelectionMethod,
};

struct Canned(&'static str);

#[async_trait]
impl ReasoningService for Canned {
    async fn complete(&self, _prompt: &str) -> Result<String, ReasoningError> {
        Ok(self.0.to_string())
    }
}

async fn seeded_store(tmp: &TempDir) -> (Config, SqliteStore) {
    let config_path = tmp.path().join("ctxsel.toml");
    std::fs::write(
        &config_path,
        format!("[db]\npath = \"{}/ctxsel.sqlite\"\n", tmp.path().display()),
    )
    .unwrap();
    let config = config::load_config(&config_path).unwrap();
    run_migrations(&config).await.unwrap();

    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/library.json");
    let file: ImportFile =
        serde_json::from_str(&std::fs::read_to_string(fixture).unwrap()).unwrap();

    let store = SqliteStore::new(db::connect(&config).await.unwrap());
    import_documents(&store, file).await.unwrap();
    (config, store)
}

#[tokio::test]
async fn test_two_stage_over_sqlite_returns_reading_order() {
    let tmp = TempDir::new().unwrap();
    let (_config, store) = seeded_store(&tmp).await;

    // Candidates: moby-0..5 then walden-0..3. Pick walden-1, moby-4, moby-1.
    let retriever = Retriever::new(store, RelevanceSelector::new(Canned("Sure: [7, 4, 1, 4]")));
    let result = retriever
        .two_stage_select("quiet lives", Scope::new("alice", None), 50, 3)
        .await
        .unwrap();

    assert_eq!(result.fragment_ids(), vec!["moby-1", "moby-4", "walden-1"]);
    assert_eq!(
        result.diagnostics.selection_method,
        Some(SelectionMethod::Reasoned)
    );
    assert_eq!(result.fragments[2].document_name.as_deref(), Some("Walden"));
    assert_eq!(
        result.fragments[1].fragment.metadata.chapter.as_deref(),
        Some("Biographical")
    );
}

#[tokio::test]
async fn test_retrieve_adaptive_budget_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let (_config, store) = seeded_store(&tmp).await;
    assert_eq!(store.count_fragments(Scope::new("alice", None)).await.unwrap(), 10);

    let retriever = Retriever::new(store, RelevanceSelector::new(Canned("[9, 0, 3]")));
    let request = RetrievalRequest {
        query: "whale",
        identity: "alice",
        document_ids: None,
        budget: RetrievalBudget::Adaptive {
            percent: 30.0,
            max_percent_cap: 90.0,
        },
    };
    let result = retriever.retrieve(&request).await.unwrap();

    let mode = result.diagnostics.mode.as_ref().unwrap();
    assert!(mode.bounded, "3 of 10 is under half the corpus");
    assert_eq!(mode.target_count, 3);
    assert_eq!(result.diagnostics.strategy, Strategy::TwoStage);
    assert_eq!(result.fragment_ids(), vec!["moby-0", "moby-3", "walden-3"]);
}

#[tokio::test]
async fn test_configured_retriever_is_offline_by_default() {
    let tmp = TempDir::new().unwrap();
    let (config, _store) = seeded_store(&tmp).await;

    let retriever = build_retriever(&config).await.unwrap();
    let result = retriever
        .hybrid_search("whale", Scope::new("alice", None), true, 5, 2)
        .await
        .unwrap();

    // Embedding disabled: keyword-only scoring. Reasoning disabled: the
    // selector falls back to the top of the scored candidates.
    assert_eq!(result.diagnostics.vector_scoring, Some(false));
    assert!(matches!(
        result.diagnostics.selection_method,
        Some(SelectionMethod::Fallback { .. })
    ));
    assert_eq!(result.fragment_ids(), vec!["moby-3", "moby-5"]);
}
