//! Typed errors for the alert-extraction engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use thiserror::Error;

/// Errors that can occur during extraction and enrichment operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// URL resolution failed
    #[error("resolve failed: {0}")]
    Resolve(#[from] ResolveError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while resolving a tracking URL to its canonical
/// job URL.
///
/// Each variant maps to one arm of the retry state machine: the machine
/// switches on the variant, never on a downcast.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Neither the HEAD nor the GET probe produced a `Location` header.
    #[error("no Location header (status {status}) for {url}")]
    NoRedirect {
        /// HTTP status observed on the last probe
        status: u16,
        /// The tracking URL that was probed
        url: String,
    },

    /// The redirect target does not look like a job URL.
    #[error("redirect target is not a job URL (status {status}): {location}")]
    UnrecognizedTarget {
        /// HTTP status observed on the probe that produced the target
        status: u16,
        /// The `Location` header value that failed validation
        location: String,
    },

    /// Connection failure or timeout.
    #[error("network error for {url}: {message}")]
    Network {
        /// The tracking URL that was probed
        url: String,
        /// Transport-level failure description
        message: String,
    },

    /// Any other transport failure.
    #[error("unexpected error for {url}: {message}")]
    Unclassified {
        /// The tracking URL that was probed
        url: String,
        /// Failure description
        message: String,
    },
}

impl ResolveError {
    /// The HTTP status carried by this failure, when one was observed.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ResolveError::NoRedirect { status, .. } => Some(*status),
            ResolveError::UnrecognizedTarget { status, .. } => Some(*status),
            ResolveError::Network { .. } | ResolveError::Unclassified { .. } => None,
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
