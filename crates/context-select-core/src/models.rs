//! Data types read by the retrieval pipeline.
//!
//! [`Document`] and [`Fragment`] are produced by the ingestion subsystem and
//! are never mutated here. [`FragmentSummary`] is the pipeline's own
//! ephemeral projection used for relevance selection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "failed" => Ok(DocumentStatus::Failed),
            other => anyhow::bail!("unknown document status: {}", other),
        }
    }
}

/// An uploaded document, owned by a single identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner: String,
    /// Display name shown to the reasoning service and in results.
    pub name: String,
    pub status: DocumentStatus,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

/// Optional structural hints attached to a fragment at ingestion time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Position within the document, `0.0..=100.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_percent: Option<f64>,
}

impl FragmentMetadata {
    /// Parse the metadata bag stored alongside a fragment.
    ///
    /// Unknown keys are ignored, non-string labels are dropped, and
    /// `position_percent` is clamped to `0..=100`. Malformed JSON yields
    /// empty metadata.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let label = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let position_percent = value
            .get("position_percent")
            .and_then(|v| v.as_f64())
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0));

        Self {
            chapter: label("chapter"),
            section: label("section"),
            position_percent,
        }
    }

    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str::<serde_json::Value>(raw)
            .map(|v| Self::from_json(&v))
            .unwrap_or_default()
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A chunk of a document with its embedding and position hints.
///
/// `sequence_index` is zero-based, unique per document, and defines the
/// canonical reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub document_id: String,
    pub sequence_index: i64,
    pub content: String,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: FragmentMetadata,
}

impl Fragment {
    /// Reading-order key: `(document_id, sequence_index)`.
    pub fn reading_key(&self) -> (&str, i64) {
        (self.document_id.as_str(), self.sequence_index)
    }
}

/// Compact descriptor of a fragment for cheap inspection by the selector.
///
/// Never carries the embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentSummary {
    pub fragment_id: String,
    pub document_id: String,
    pub document_name: String,
    pub sequence_index: i64,
    pub chapter: Option<String>,
    pub section: Option<String>,
    pub position_percent: Option<f64>,
    pub preview: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_from_json_reads_known_keys() {
        let meta = FragmentMetadata::from_json(&json!({
            "chapter": "Chapter 3",
            "section": "  The Storm ",
            "position_percent": 42.5,
            "page": 17
        }));
        assert_eq!(meta.chapter.as_deref(), Some("Chapter 3"));
        assert_eq!(meta.section.as_deref(), Some("The Storm"));
        assert_eq!(meta.position_percent, Some(42.5));
    }

    #[test]
    fn test_metadata_clamps_position() {
        let meta = FragmentMetadata::from_json(&json!({ "position_percent": 140 }));
        assert_eq!(meta.position_percent, Some(100.0));
        let meta = FragmentMetadata::from_json(&json!({ "position_percent": -3 }));
        assert_eq!(meta.position_percent, Some(0.0));
    }

    #[test]
    fn test_metadata_malformed_is_empty() {
        assert_eq!(
            FragmentMetadata::from_json_str("not json"),
            FragmentMetadata::default()
        );
        let meta = FragmentMetadata::from_json(&json!({ "chapter": 7, "section": "" }));
        assert!(meta.chapter.is_none());
        assert!(meta.section.is_none());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("ready".parse::<DocumentStatus>().unwrap(), DocumentStatus::Ready);
        assert!("archived".parse::<DocumentStatus>().is_err());
    }
}
