//! Error types for blockwright.
//!
//! Store errors are classified for the retry layer; only a failed initial
//! write surfaces as a [`PipelineError`]. Everything later in a run degrades
//! into the run report and the persisted validation metadata instead.

use std::time::Duration;

use thiserror::Error;

use crate::store::BlockId;

// =============================================================================
// StoreError
// =============================================================================

/// Errors returned by a document store call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store asked us to slow down (HTTP 429)
    #[error("rate limited by store{}", format_retry_after(.retry_after))]
    RateLimited {
        /// Server-suggested wait, if any
        retry_after: Option<Duration>,
    },

    /// Concurrent write to the same block (HTTP 409)
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Connection reset, timeout, or other transport failure
    #[error("network error: {0}")]
    Network(String),

    /// The store rejected the payload; retrying the same payload cannot help
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The referenced block does not exist
    #[error("block not found: {0}")]
    NotFound(BlockId),
}

fn format_retry_after(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}ms)", d.as_millis()),
        None => String::new(),
    }
}

/// Retry class of a store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryClass {
    RateLimit,
    Conflict,
    Network,
}

impl StoreError {
    /// Create a rejection error with a message.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Retry class, or `None` for errors that must not be retried.
    pub fn retry_class(&self) -> Option<RetryClass> {
        match self {
            StoreError::RateLimited { .. } => Some(RetryClass::RateLimit),
            StoreError::Conflict(_) => Some(RetryClass::Conflict),
            StoreError::Network(_) => Some(RetryClass::Network),
            StoreError::Rejected(_) | StoreError::NotFound(_) => None,
        }
    }

    /// Check if the error may succeed on resubmission.
    pub fn is_retryable(&self) -> bool {
        self.retry_class().is_some()
    }
}

// =============================================================================
// PipelineError
// =============================================================================

/// Caller-visible pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The first write chunk could not be persisted; no document exists
    #[error("initial write failed: {0}")]
    InitialWrite(#[source] StoreError),

    /// The existing document could not be listed for replacement
    #[error("failed to clear document {document}: {source}")]
    Clear {
        document: BlockId,
        #[source]
        source: StoreError,
    },

    /// Configuration could not be parsed or is out of range
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Create a configuration error with a message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

// =============================================================================
// ValidationError
// =============================================================================

/// Failures inside the validation step. These never escape: they are folded
/// into a synthetic failed `ValidationResult`.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Reading the persisted tree back failed
    #[error("failed to read back document: {0}")]
    ReadBack(#[from] StoreError),

    /// The validator itself could not complete
    #[error("validator error: {0}")]
    Internal(String),
}
