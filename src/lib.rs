//! # Context Select
//!
//! Application layer around [`context_select_core`]: decides how much of a
//! user's uploaded documents to surface for a question, narrows large
//! corpora to a handful of fragments, and lets a reasoning service pick
//! the final set from cheap summaries.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────────┐   ┌───────────────┐
//! │  SQLite    │──▶│  context-select-core │──▶│  CLI (ctxsel) │
//! │ documents  │   │ decide/score/select  │   │ text or JSON  │
//! │ fragments  │   └──────────┬───────────┘   └───────────────┘
//! └───────────┘              │
//!                  ┌──────────┴──────────┐
//!                  ▼                     ▼
//!           ┌─────────────┐      ┌──────────────┐
//!           │  reasoning   │      │  embeddings   │
//!           │ (chat API)   │      │ (query only)  │
//!           └─────────────┘      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ctxsel init                                   # create database
//! ctxsel import ./fixtures/library.json         # load pre-chunked documents
//! ctxsel retrieve "who is Ahab?" --identity alice
//! ctxsel search "white whale" --identity alice --no-smart
//! ctxsel decide --mode percent --percent 30 --corpus 400
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | `FragmentStore` over SQLite |
//! | [`import`] | JSON fixture import |
//! | [`reasoning`] | Chat-completions reasoning service |
//! | [`embedding`] | Query embedding |
//! | [`retrieve`] | CLI command runners |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod db;
pub mod embedding;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod reasoning;
pub mod retrieve;
pub mod sqlite_store;
