//! Projection of fragments into compact [`FragmentSummary`] descriptors.
//!
//! Summaries carry structure hints and a short preview but never the
//! embedding, which keeps the selection prompt small. Document names are
//! looked up once per distinct document id in the batch.

use std::collections::{BTreeSet, HashMap};

use crate::error::RetrievalError;
use crate::models::{Fragment, FragmentSummary};
use crate::store::FragmentStore;

/// Maximum preview length in characters, before the ellipsis.
pub const PREVIEW_CHARS: usize = 200;

/// Name used when a document's display name cannot be resolved.
pub const UNKNOWN_DOCUMENT: &str = "Unknown document";

/// Trimmed content cut to [`PREVIEW_CHARS`] characters, with `...`
/// appended only when something was cut.
pub fn preview(content: &str) -> String {
    let trimmed = content.trim();
    let mut chars = trimmed.char_indices();
    match chars.nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Build summaries from fragments and an already-resolved name map.
pub fn summarize_with_names<'a>(
    fragments: impl IntoIterator<Item = &'a Fragment>,
    names: &HashMap<String, String>,
) -> Vec<FragmentSummary> {
    fragments
        .into_iter()
        .map(|f| FragmentSummary {
            fragment_id: f.id.clone(),
            document_id: f.document_id.clone(),
            document_name: names
                .get(&f.document_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_DOCUMENT.to_string()),
            sequence_index: f.sequence_index,
            chapter: f.metadata.chapter.clone(),
            section: f.metadata.section.clone(),
            position_percent: f.metadata.position_percent,
            preview: preview(&f.content),
        })
        .collect()
}

/// Distinct document ids referenced by `fragments`, sorted.
pub fn distinct_document_ids<'a>(fragments: impl IntoIterator<Item = &'a Fragment>) -> Vec<String> {
    fragments
        .into_iter()
        .map(|f| f.document_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Summarize `fragments`, resolving document names in one batched lookup.
pub async fn summarize(
    store: &dyn FragmentStore,
    identity: &str,
    fragments: &[Fragment],
) -> Result<Vec<FragmentSummary>, RetrievalError> {
    if fragments.is_empty() {
        return Ok(Vec::new());
    }
    let doc_ids = distinct_document_ids(fragments);
    let names = store
        .list_document_names(&doc_ids, identity)
        .await
        .map_err(RetrievalError::store)?;
    Ok(summarize_with_names(fragments, &names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentMetadata;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::Scope;

    fn frag(doc: &str, idx: i64, content: &str) -> Fragment {
        Fragment {
            id: format!("{}-{}", doc, idx),
            document_id: doc.to_string(),
            sequence_index: idx,
            content: content.to_string(),
            embedding: Some(vec![0.5; 8]),
            metadata: FragmentMetadata {
                chapter: Some("Chapter 1".to_string()),
                section: None,
                position_percent: Some(12.5),
            },
        }
    }

    #[test]
    fn test_short_content_kept_verbatim() {
        assert_eq!(preview("  hello world \n"), "hello world");
        let exact = "x".repeat(200);
        assert_eq!(preview(&exact), exact);
    }

    #[test]
    fn test_long_content_truncated_with_ellipsis() {
        let long = "y".repeat(450);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 203);
        assert!(p.ends_with("..."));
        assert_eq!(&p[..200], &long[..200]);
    }

    #[test]
    fn test_trim_happens_before_measuring() {
        let padded = format!("   {}   ", "z".repeat(200));
        assert_eq!(preview(&padded), "z".repeat(200));
    }

    #[test]
    fn test_multibyte_preview_counts_characters() {
        let long = "é".repeat(300);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 203);
    }

    #[test]
    fn test_preview_bound_holds_for_varied_lengths() {
        for len in [0usize, 1, 199, 200, 201, 1000] {
            let content = "a".repeat(len);
            let p = preview(&content);
            assert!(p.chars().count() <= 203);
            if len <= 200 {
                assert_eq!(p, content);
            }
        }
    }

    #[test]
    fn test_missing_name_uses_placeholder() {
        let frags = vec![frag("d1", 0, "text")];
        let summaries = summarize_with_names(&frags, &HashMap::new());
        assert_eq!(summaries[0].document_name, UNKNOWN_DOCUMENT);
        assert_eq!(summaries[0].chapter.as_deref(), Some("Chapter 1"));
        assert_eq!(summaries[0].position_percent, Some(12.5));
    }

    struct CountingStore {
        name_lookups: AtomicUsize,
    }

    #[async_trait]
    impl FragmentStore for CountingStore {
        async fn list_fragments(&self, _: Scope<'_>, _: Option<usize>) -> Result<Vec<Fragment>> {
            Ok(Vec::new())
        }
        async fn get_fragments_by_ids(&self, _: &[String], _: &str) -> Result<Vec<Fragment>> {
            Ok(Vec::new())
        }
        async fn list_document_names(
            &self,
            ids: &[String],
            _: &str,
        ) -> Result<HashMap<String, String>> {
            self.name_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(ids
                .iter()
                .map(|id| (id.clone(), format!("{} title", id)))
                .collect())
        }
        async fn count_fragments(&self, _: Scope<'_>) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_names_resolved_in_one_lookup() {
        let store = CountingStore {
            name_lookups: AtomicUsize::new(0),
        };
        let frags = vec![frag("d1", 0, "a"), frag("d2", 0, "b"), frag("d1", 1, "c")];
        let summaries = summarize(&store, "alice", &frags).await.unwrap();
        assert_eq!(store.name_lookups.load(Ordering::SeqCst), 1);
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[1].document_name, "d2 title");
        assert_eq!(summaries[2].fragment_id, "d1-1");
    }
}
