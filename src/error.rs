//! Typed errors for the retrieval and generation service boundaries.
//!
//! Malformed input (empty query, empty corpus) never produces an error —
//! those paths return empty results. These types cover the failures the
//! caller may want to retry or surface: an unreachable backing store, or a
//! generation service refusing a call.

use thiserror::Error;

/// Errors raised by the retrieval side (semantic index, embedding function).
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The semantic index backing store could not be reached.
    #[error("semantic index unavailable: {0}")]
    IndexUnavailable(String),

    /// The embedding provider failed to produce a query embedding.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// The embedding provider is disabled but a semantic query was made.
    #[error("embedding provider is disabled")]
    EmbeddingDisabled,
}

/// Errors raised by the generation side.
///
/// The orchestrator surfaces these to the caller instead of counting them
/// as quality failures: without a draft there is nothing to assess.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generation service could not be reached or refused the request.
    #[error("generation service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service responded but the payload could not be interpreted.
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    /// Quota or rate limiting on the provider side.
    #[error("generation quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Retrieval failed while building the generation context.
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}
