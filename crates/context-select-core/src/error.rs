//! Error taxonomy for the retrieval pipeline.
//!
//! Only [`RetrievalError`] ever reaches a caller. [`ReasoningError`] is
//! produced by reasoning-service implementations and absorbed by the
//! selector's ordered-prefix fallback.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`Retriever`](crate::pipeline::Retriever) entry points.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A store read failed (network, permission, not-found-for-identity).
    /// Propagated unmodified and never retried inside the pipeline.
    #[error("store access failed: {0:#}")]
    StoreAccess(#[source] anyhow::Error),

    /// The request itself is unusable (e.g. an out-of-range budget).
    #[error("invalid retrieval request: {0}")]
    InvalidRequest(String),
}

impl RetrievalError {
    pub fn store(err: anyhow::Error) -> Self {
        RetrievalError::StoreAccess(err)
    }
}

/// Failures of the relevance-selection call.
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// The service call itself failed (transport, non-2xx, empty reply).
    #[error("reasoning service error: {0}")]
    Service(String),

    /// The call did not complete within the configured bound.
    #[error("reasoning service timed out after {0:?}")]
    Timeout(Duration),

    /// The reply contained no usable index array.
    #[error("malformed selection response: {0}")]
    Malformed(String),
}
