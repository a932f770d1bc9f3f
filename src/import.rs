//! Load pre-chunked documents from a JSON file.
//!
//! Splitting and embedding happen elsewhere; this only persists their
//! output so the retrieval pipeline has something to read. Format:
//!
//! ```json
//! {
//!   "documents": [
//!     {
//!       "id": "moby-dick",
//!       "owner": "alice",
//!       "name": "Moby Dick",
//!       "status": "ready",
//!       "fragments": [
//!         { "content": "Call me Ishmael.", "embedding": [0.1, 0.2],
//!           "metadata": { "chapter": "Loomings", "position_percent": 0.0 } }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `id` defaults to a random UUID, `status` to `ready`, a fragment's
//! `sequence_index` to its array position and its `id` to
//! `<document id>-<sequence index>`. Re-importing a document replaces its
//! fragments; it may not change the document's owner.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use context_select_core::models::{Document, DocumentStatus, Fragment, FragmentMetadata};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Deserialize)]
pub struct ImportFile {
    pub documents: Vec<ImportDocument>,
}

#[derive(Debug, Deserialize)]
pub struct ImportDocument {
    #[serde(default)]
    pub id: Option<String>,
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub fragments: Vec<ImportFragment>,
}

#[derive(Debug, Deserialize)]
pub struct ImportFragment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sequence_index: Option<i64>,
    pub content: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub documents: usize,
    pub fragments: usize,
}

impl ImportDocument {
    /// Resolve defaults into a document row plus its fragments.
    pub fn into_records(self) -> Result<(Document, Vec<Fragment>)> {
        if self.owner.trim().is_empty() {
            bail!("document '{}' has an empty owner", self.name);
        }
        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let doc = Document {
            id: id.clone(),
            owner: self.owner,
            name: self.name,
            status: self.status.unwrap_or(DocumentStatus::Ready),
            created_at: chrono::Utc::now().timestamp(),
        };

        let mut seen = HashSet::new();
        let mut fragments = Vec::with_capacity(self.fragments.len());
        for (pos, f) in self.fragments.into_iter().enumerate() {
            let sequence_index = f.sequence_index.unwrap_or(pos as i64);
            if sequence_index < 0 {
                bail!("document '{}': negative sequence_index {}", id, sequence_index);
            }
            if !seen.insert(sequence_index) {
                bail!("document '{}': duplicate sequence_index {}", id, sequence_index);
            }
            fragments.push(Fragment {
                id: f
                    .id
                    .unwrap_or_else(|| format!("{}-{}", id, sequence_index)),
                document_id: id.clone(),
                sequence_index,
                content: f.content,
                embedding: f.embedding.filter(|v| !v.is_empty()),
                metadata: FragmentMetadata::from_json(&f.metadata),
            });
        }

        Ok((doc, fragments))
    }
}

/// Persist every document in `file`.
///
/// Each document is written as `processing`, its fragments replaced, and
/// only then moved to its final status, so a half-imported document is
/// never visible to retrieval. A document already stored under another
/// owner is rejected before anything is written for it.
pub async fn import_documents(store: &SqliteStore, file: ImportFile) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    for entry in file.documents {
        let (doc, fragments) = entry.into_records()?;
        let final_status = doc.status;

        if let Some(existing) = store.document_owner(&doc.id).await? {
            if existing != doc.owner {
                bail!(
                    "document '{}' belongs to '{}' and cannot be re-imported for '{}'",
                    doc.id,
                    existing,
                    doc.owner
                );
            }
        }

        let staged = Document {
            status: DocumentStatus::Processing,
            ..doc.clone()
        };
        store.upsert_document(&staged).await?;
        store
            .replace_fragments(&doc.id, &fragments)
            .await
            .with_context(|| format!("Failed to store fragments of '{}'", doc.id))?;
        store.set_document_status(&doc.id, final_status).await?;

        info!(
            document = %doc.id,
            owner = %doc.owner,
            fragments = fragments.len(),
            status = %final_status,
            "imported document"
        );
        report.documents += 1;
        report.fragments += fragments.len();
    }

    Ok(report)
}

/// `ctxsel import <file>`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let file: ImportFile =
        serde_json::from_str(&raw).with_context(|| "Failed to parse import file")?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let report = import_documents(&store, file).await?;
    store.pool().close().await;

    println!("imported documents: {}", report.documents);
    println!("imported fragments: {}", report.fragments);
    Ok(())
}
