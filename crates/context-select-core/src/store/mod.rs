//! Read-only fragment storage abstraction.
//!
//! The [`FragmentStore`] trait is the pipeline's only window onto persisted
//! documents and fragments. Every operation is scoped to the requesting
//! identity: fragments of documents owned by someone else, or of documents
//! not yet `ready`, are invisible.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`list_fragments`](FragmentStore::list_fragments) | Fragments in reading order, optionally limited |
//! | [`get_fragments_by_ids`](FragmentStore::get_fragments_by_ids) | Full records for a selected id set |
//! | [`list_document_names`](FragmentStore::list_document_names) | Batched id → display-name lookup |
//! | [`count_fragments`](FragmentStore::count_fragments) | Corpus size for budget decisions |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::Fragment;

/// Identity plus optional document-set filter for a single request.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    /// Requesting identity; results never cross owners.
    pub identity: &'a str,
    /// Restrict to these documents. `None` means all visible documents.
    pub document_ids: Option<&'a [String]>,
}

impl<'a> Scope<'a> {
    pub fn new(identity: &'a str, document_ids: Option<&'a [String]>) -> Self {
        Self {
            identity,
            document_ids,
        }
    }

    /// Whether `document_id` passes the document filter.
    pub fn admits(&self, document_id: &str) -> bool {
        match self.document_ids {
            Some(ids) => ids.iter().any(|id| id == document_id),
            None => true,
        }
    }
}

/// Abstract, identity-scoped read access to fragments and documents.
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// List fragments in `(document_id, sequence_index)` order.
    ///
    /// `limit = None` returns the whole visible corpus.
    async fn list_fragments(&self, scope: Scope<'_>, limit: Option<usize>)
        -> Result<Vec<Fragment>>;

    /// Fetch full records for `ids`. Unknown or foreign ids are absent from
    /// the result rather than an error. Result order is unspecified.
    async fn get_fragments_by_ids(&self, ids: &[String], identity: &str) -> Result<Vec<Fragment>>;

    /// Display names for the given document ids, in one round-trip.
    async fn list_document_names(
        &self,
        ids: &[String],
        identity: &str,
    ) -> Result<HashMap<String, String>>;

    /// Number of fragments visible under `scope`.
    async fn count_fragments(&self, scope: Scope<'_>) -> Result<usize>;
}
