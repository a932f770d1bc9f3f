//! In-memory [`FragmentStore`] implementation for tests and embedding hosts.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Visibility rules
//! match the SQLite store: only `ready` documents owned by the requesting
//! identity are returned.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Document, DocumentStatus, Fragment};

use super::{FragmentStore, Scope};

/// In-memory store keyed by document id.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    fragments: RwLock<Vec<Fragment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            fragments: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace a document record.
    pub fn insert_document(&self, doc: Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(|_| anyhow!("document map poisoned"))?;
        docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    /// Replace all fragments of `doc_id` with `fragments`.
    pub fn replace_fragments(&self, doc_id: &str, fragments: Vec<Fragment>) -> Result<()> {
        let mut stored = self
            .fragments
            .write()
            .map_err(|_| anyhow!("fragment list poisoned"))?;
        stored.retain(|f| f.document_id != doc_id);
        stored.extend(fragments);
        Ok(())
    }

    fn visible_documents(&self, identity: &str) -> Result<HashMap<String, Document>> {
        let docs = self.docs.read().map_err(|_| anyhow!("document map poisoned"))?;
        Ok(docs
            .values()
            .filter(|d| d.owner == identity && d.status == DocumentStatus::Ready)
            .map(|d| (d.id.clone(), d.clone()))
            .collect())
    }

    fn scoped(&self, scope: Scope<'_>) -> Result<Vec<Fragment>> {
        let visible = self.visible_documents(scope.identity)?;
        let stored = self
            .fragments
            .read()
            .map_err(|_| anyhow!("fragment list poisoned"))?;
        let mut out: Vec<Fragment> = stored
            .iter()
            .filter(|f| visible.contains_key(&f.document_id) && scope.admits(&f.document_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.reading_key().cmp(&b.reading_key()));
        Ok(out)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentStore for InMemoryStore {
    async fn list_fragments(
        &self,
        scope: Scope<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<Fragment>> {
        let mut fragments = self.scoped(scope)?;
        if let Some(limit) = limit {
            fragments.truncate(limit);
        }
        Ok(fragments)
    }

    async fn get_fragments_by_ids(&self, ids: &[String], identity: &str) -> Result<Vec<Fragment>> {
        let visible = self.visible_documents(identity)?;
        let stored = self
            .fragments
            .read()
            .map_err(|_| anyhow!("fragment list poisoned"))?;
        Ok(stored
            .iter()
            .filter(|f| visible.contains_key(&f.document_id) && ids.contains(&f.id))
            .cloned()
            .collect())
    }

    async fn list_document_names(
        &self,
        ids: &[String],
        identity: &str,
    ) -> Result<HashMap<String, String>> {
        let docs = self.docs.read().map_err(|_| anyhow!("document map poisoned"))?;
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id))
            .filter(|d| d.owner == identity)
            .map(|d| (d.id.clone(), d.name.clone()))
            .collect())
    }

    async fn count_fragments(&self, scope: Scope<'_>) -> Result<usize> {
        Ok(self.scoped(scope)?.len())
    }
}
