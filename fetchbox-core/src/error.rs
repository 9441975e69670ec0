//! Error types for request and cache operations.

use thiserror::Error;

/// Error type for fetchbox operations.
///
/// Only configuration problems and cancellation are errors. A failed HTTP
/// exchange is reported as an [`Outcome`](crate::Outcome) instead, so callers
/// match on the returned value rather than handling an error path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// No transport could be resolved from the call site, the descriptor or
    /// the process-wide default.
    #[error("request function is not defined")]
    TransportUndefined,

    /// No query cache could be resolved from the call options, the descriptor
    /// or the process-wide default.
    #[error("query client is not defined")]
    QueryClientUndefined,

    /// The fetch was aborted before it completed.
    #[error("query was cancelled")]
    Cancelled,
}

/// Result alias with [`Error`] as the default error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
