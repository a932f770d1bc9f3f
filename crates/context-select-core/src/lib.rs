//! # Context Select Core
//!
//! Retrieval-and-selection logic for grounding a conversational answer in
//! previously ingested documents: how much of the corpus to surface, how to
//! rank candidate fragments, and how to let a reasoning service pick the
//! final set from cheap descriptors instead of full content.
//!
//! This crate holds no database, HTTP, or configuration-file code. Storage,
//! query embedding, and the reasoning service are reached through the
//! [`store::FragmentStore`], [`similarity::QueryEmbedder`], and
//! [`selector::ReasoningService`] traits; the calling application provides
//! implementations.
//!
//! ```text
//!  RetrievalBudget ──▶ decider ──┬── full document ───────────────┐
//!                                │                                 │
//!                                └── bounded ──▶ scorer/summarizer │
//!                                                  │               │
//!                                                  ▼               │
//!                                               selector           │
//!                                                  │               ▼
//!                                                  └──▶ pipeline ──▶ RetrievalResult
//! ```

pub mod decider;
pub mod error;
pub mod keyword;
pub mod models;
pub mod pipeline;
pub mod scorer;
pub mod selector;
pub mod similarity;
pub mod store;
pub mod summarizer;

pub use decider::{decide, decide_mode, BudgetMode, ModeDecision, RetrievalBudget};
pub use error::{ReasoningError, RetrievalError};
pub use models::{Document, DocumentStatus, Fragment, FragmentMetadata, FragmentSummary};
pub use pipeline::{
    BoundedStrategy, Diagnostics, PipelineOptions, RetrievalRequest, RetrievalResult,
    RetrievedFragment, Retriever, Strategy,
};
pub use selector::{ReasoningService, RelevanceSelector, Selection, SelectionMethod, Selector};
pub use store::{FragmentStore, Scope};
