//! AI-assisted relevance selection over fragment summaries.
//!
//! [`RelevanceSelector`] renders each [`FragmentSummary`] as a short
//! structured description, sends one prompt to a [`ReasoningService`], and
//! parses back zero-based indices into the batch.
//!
//! # Failure policy
//!
//! Selection never fails from the caller's point of view. If the service
//! errors, exceeds the timeout, or replies without a usable index array, the
//! selector returns the first `max` summaries in their given order and marks
//! the [`Selection`] as [`SelectionMethod::Fallback`].
//!
//! # Response parsing
//!
//! The reply is scanned for the first `[` and the first `]` after it; that
//! span must be a JSON array. Elements that are not non-negative integers
//! inside `[0, batch)` are dropped, duplicates collapse to their first
//! occurrence, and the list is cut to `max`. An array with no usable element
//! counts as malformed.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ReasoningError;
use crate::models::FragmentSummary;

/// Default bound on a single reasoning-service call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Text-completion capability used for relevance selection.
///
/// Implementations should use low or zero sampling temperature, since the
/// reply is parsed structurally.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ReasoningError>;
}

#[async_trait]
impl<T: ReasoningService + ?Sized> ReasoningService for Box<T> {
    async fn complete(&self, prompt: &str) -> Result<String, ReasoningError> {
        (**self).complete(prompt).await
    }
}

/// Why a selection degraded to the ordered prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    ServiceError,
    Timeout,
    MalformedResponse,
}

impl From<&ReasoningError> for FallbackReason {
    fn from(err: &ReasoningError) -> Self {
        match err {
            ReasoningError::Service(_) => FallbackReason::ServiceError,
            ReasoningError::Timeout(_) => FallbackReason::Timeout,
            ReasoningError::Malformed(_) => FallbackReason::MalformedResponse,
        }
    }
}

/// How a [`Selection`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Indices came from the reasoning service.
    Reasoned,
    /// The ordered-prefix fallback was used.
    Fallback { reason: FallbackReason },
}

impl SelectionMethod {
    pub fn is_fallback(&self) -> bool {
        matches!(self, SelectionMethod::Fallback { .. })
    }
}

/// Selected fragment ids, each one of the input summaries' ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub ids: Vec<String>,
    pub method: SelectionMethod,
}

impl Selection {
    /// The first `max` summaries, in order.
    pub fn ordered_prefix(
        summaries: &[FragmentSummary],
        max: usize,
        reason: FallbackReason,
    ) -> Self {
        Self {
            ids: summaries
                .iter()
                .take(max)
                .map(|s| s.fragment_id.clone())
                .collect(),
            method: SelectionMethod::Fallback { reason },
        }
    }
}

/// Narrow selection seam: pick at most `max` of `summaries` for `query`.
#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(&self, query: &str, summaries: &[FragmentSummary], max: usize) -> Selection;
}

/// [`Selector`] backed by a [`ReasoningService`] call.
pub struct RelevanceSelector<R> {
    service: R,
    timeout: Duration,
}

impl<R: ReasoningService> RelevanceSelector<R> {
    pub fn new(service: R) -> Self {
        Self {
            service,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call(
        &self,
        prompt: &str,
        batch: usize,
        max: usize,
    ) -> Result<Vec<usize>, ReasoningError> {
        let reply = match tokio::time::timeout(self.timeout, self.service.complete(prompt)).await {
            Ok(reply) => reply?,
            Err(_) => return Err(ReasoningError::Timeout(self.timeout)),
        };
        let mut indices = parse_indices(&reply, batch)
            .ok_or_else(|| ReasoningError::Malformed("no index array in reply".to_string()))?;
        if indices.is_empty() {
            return Err(ReasoningError::Malformed(
                "index array held no usable index".to_string(),
            ));
        }
        indices.truncate(max);
        Ok(indices)
    }
}

#[async_trait]
impl<R: ReasoningService> Selector for RelevanceSelector<R> {
    async fn select(&self, query: &str, summaries: &[FragmentSummary], max: usize) -> Selection {
        if summaries.is_empty() || max == 0 {
            return Selection {
                ids: Vec::new(),
                method: SelectionMethod::Reasoned,
            };
        }

        let prompt = build_prompt(query, summaries, max);
        match self.call(&prompt, summaries.len(), max).await {
            Ok(indices) => {
                debug!(
                    batch = summaries.len(),
                    selected = indices.len(),
                    "relevance selection succeeded"
                );
                Selection {
                    ids: indices
                        .into_iter()
                        .map(|i| summaries[i].fragment_id.clone())
                        .collect(),
                    method: SelectionMethod::Reasoned,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    batch = summaries.len(),
                    "relevance selection fell back to ordered prefix"
                );
                Selection::ordered_prefix(summaries, max, FallbackReason::from(&e))
            }
        }
    }
}

/// One-line-plus-preview description of a summary.
pub fn describe(index: usize, summary: &FragmentSummary) -> String {
    let mut line = format!("[{}] Document: {}", index, summary.document_name);
    if let Some(chapter) = &summary.chapter {
        let _ = write!(line, " | Chapter: {}", chapter);
    }
    if let Some(section) = &summary.section {
        let _ = write!(line, " | Section: {}", section);
    }
    if let Some(pos) = summary.position_percent {
        let _ = write!(line, " | Position: {:.0}%", pos);
    }
    let _ = write!(line, "\n    Preview: {}", summary.preview.replace('\n', " "));
    line
}

/// Prompt asking for at most `max` indices into `summaries`.
pub fn build_prompt(query: &str, summaries: &[FragmentSummary], max: usize) -> String {
    let descriptions = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| describe(i, s))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are choosing which document passages are needed to answer a question.\n\n\
         Question: {query}\n\n\
         Candidate passages ({count}):\n{descriptions}\n\n\
         Reply with a JSON array of at most {max} zero-based passage indices, most relevant \
         first, for example [0, 4, 7]. Reply with the array only.",
        query = query.trim(),
        count = summaries.len(),
        descriptions = descriptions,
        max = max,
    )
}

/// Extract valid, de-duplicated indices from the first `[...]` span.
///
/// Returns `None` when there is no bracketed span or it is not a JSON array.
pub fn parse_indices(text: &str, batch: usize) -> Option<Vec<usize>> {
    let start = text.find('[')?;
    let end = start + text[start..].find(']')?;
    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let items = value.as_array()?;

    let mut seen = HashSet::new();
    Some(
        items
            .iter()
            .filter_map(|v| v.as_u64())
            .filter_map(|i| usize::try_from(i).ok())
            .filter(|&i| i < batch)
            .filter(|&i| seen.insert(i))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn summaries(n: usize) -> Vec<FragmentSummary> {
        (0..n)
            .map(|i| FragmentSummary {
                fragment_id: format!("f{}", i),
                document_id: "doc".to_string(),
                document_name: "Moby Dick".to_string(),
                sequence_index: i as i64,
                chapter: if i % 2 == 0 { Some(format!("Chapter {}", i)) } else { None },
                section: None,
                position_percent: Some(i as f64 * 10.0),
                preview: format!("preview {}", i),
            })
            .collect()
    }

    struct Canned {
        reply: Result<String, String>,
        calls: AtomicUsize,
    }

    impl Canned {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
        fn err(msg: &str) -> Self {
            Self {
                reply: Err(msg.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReasoningService for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(ReasoningError::Service)
        }
    }

    struct Slow;

    #[async_trait]
    impl ReasoningService for Slow {
        async fn complete(&self, _prompt: &str) -> Result<String, ReasoningError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("[0]".to_string())
        }
    }

    fn assert_subset(sel: &Selection, input: &[FragmentSummary], max: usize) {
        assert!(sel.ids.len() <= max);
        for id in &sel.ids {
            assert!(input.iter().any(|s| &s.fragment_id == id), "unknown id {}", id);
        }
    }

    #[test]
    fn test_parse_first_array_in_prose() {
        let got = parse_indices("Sure! The best are [2, 0, 5] and maybe [1].", 6);
        assert_eq!(got, Some(vec![2, 0, 5]));
    }

    #[test]
    fn test_parse_drops_out_of_range_and_non_integers() {
        let got = parse_indices("[0, 9, -1, 2.5, \"3\", 1, 1, 4]", 5);
        assert_eq!(got, Some(vec![0, 1, 4]));
    }

    #[test]
    fn test_parse_without_array_is_none() {
        assert_eq!(parse_indices("I think passage two", 5), None);
        assert_eq!(parse_indices("[two, three]", 5), None);
        assert_eq!(parse_indices("only an opening [", 5), None);
    }

    #[test]
    fn test_describe_includes_hints() {
        let s = summaries(1);
        let d = describe(0, &s[0]);
        assert!(d.starts_with("[0] Document: Moby Dick | Chapter: Chapter 0 | Position: 0%"));
        assert!(d.contains("Preview: preview 0"));
    }

    #[test]
    fn test_prompt_lists_every_summary() {
        let s = summaries(3);
        let prompt = build_prompt("who is Ishmael?", &s, 2);
        assert!(prompt.contains("Question: who is Ishmael?"));
        assert!(prompt.contains("[2] Document"));
        assert!(prompt.contains("at most 2"));
    }

    #[tokio::test]
    async fn test_reasoned_selection_maps_indices_to_ids() {
        let s = summaries(6);
        let sel = RelevanceSelector::new(Canned::ok("[4, 1]"))
            .select("q", &s, 3)
            .await;
        assert_eq!(sel.ids, vec!["f4", "f1"]);
        assert_eq!(sel.method, SelectionMethod::Reasoned);
    }

    #[tokio::test]
    async fn test_selection_truncated_to_max() {
        let s = summaries(6);
        let sel = RelevanceSelector::new(Canned::ok("[5, 4, 3, 2, 1]"))
            .select("q", &s, 2)
            .await;
        assert_eq!(sel.ids, vec!["f5", "f4"]);
    }

    #[tokio::test]
    async fn test_service_error_falls_back_to_prefix() {
        let s = summaries(6);
        let sel = RelevanceSelector::new(Canned::err("connection refused"))
            .select("q", &s, 3)
            .await;
        assert_eq!(sel.ids, vec!["f0", "f1", "f2"]);
        assert_eq!(
            sel.method,
            SelectionMethod::Fallback {
                reason: FallbackReason::ServiceError
            }
        );
    }

    #[tokio::test]
    async fn test_garbage_and_empty_array_fall_back() {
        let s = summaries(4);
        for reply in ["no idea", "[]", "[17, 99]", "{\"a\": 1}"] {
            let sel = RelevanceSelector::new(Canned::ok(reply)).select("q", &s, 2).await;
            assert_subset(&sel, &s, 2);
            assert_eq!(
                sel.method,
                SelectionMethod::Fallback {
                    reason: FallbackReason::MalformedResponse
                },
                "reply {:?}",
                reply
            );
        }
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let s = summaries(5);
        let sel = RelevanceSelector::new(Slow)
            .with_timeout(Duration::from_millis(20))
            .select("q", &s, 2)
            .await;
        assert_eq!(sel.ids, vec!["f0", "f1"]);
        assert_eq!(
            sel.method,
            SelectionMethod::Fallback {
                reason: FallbackReason::Timeout
            }
        );
    }

    #[tokio::test]
    async fn test_fallback_prefix_shorter_than_max() {
        let s = summaries(2);
        let sel = RelevanceSelector::new(Canned::err("down")).select("q", &s, 10).await;
        assert_eq!(sel.ids, vec!["f0", "f1"]);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_service() {
        let service = Canned::ok("[0]");
        let selector = RelevanceSelector::new(service);
        let sel = selector.select("q", &[], 3).await;
        assert!(sel.ids.is_empty());
        assert_eq!(selector.service.calls.load(Ordering::SeqCst), 0);
    }
}
