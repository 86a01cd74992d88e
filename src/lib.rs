//! blockwright - Depth-limited, deduplicated, verified conversion of document
//! trees into block stores
//!
//! ## Core Concepts
//!
//! **Depth-bounded writes**: block stores reject payloads nested deeper than a
//! few levels. Deep subtrees are excised behind marker tokens, written
//! shallow, and reattached under their marked blocks afterwards.
//!
//! **Verification**: every run ends by reading the document back and
//! comparing its text and structure against the source. The verdict is
//! returned and written onto the document itself.
//!
//! ## Modules
//! - `block`: Content block model (`ContentBlock`, `BlockKind`, `TextRun`)
//! - `dedup`: Sliding-window duplicate removal
//! - `marker`: Depth limiting and marker tokens
//! - `orchestrator`: Chunked writes, reattachment, sweep
//! - `validate`: Coverage, structural counts, order issues, metadata
//! - `store`: Store interface, retry, tree reader, in-memory store
//! - `pipeline`: The end-to-end run
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use blockwright::prelude::*;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let store = Arc::new(InMemoryStore::new());
//! let pipeline = Pipeline::new(store, PipelineConfig::fast());
//!
//! let blocks = vec![
//!     ContentBlock::heading(1, "Getting started"),
//!     ContentBlock::bulleted("Install").child(
//!         ContentBlock::bulleted("Download").child(
//!             ContentBlock::bulleted("Pick a mirror").child(ContentBlock::paragraph("Any will do")),
//!         ),
//!     ),
//! ];
//! let outcome = pipeline
//!     .run(SourceDocument::from_blocks("Guide", blocks), &ParentRef::Page("root".into()))
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.validation.status, ValidationStatus::Passed);
//! assert_eq!(outcome.report.marks.markers, 1);
//! # });
//! ```

#[macro_use]
mod macros;

// =============================================================================
// Modules
// =============================================================================

/// Content block model
pub mod block;

/// Pipeline configuration
pub mod config;

/// Duplicate removal
pub mod dedup;

/// Error types
pub mod error;

/// Stable hashing
pub mod hash;

/// Run seeds and marker IDs
pub mod id;

/// Depth limiting and marker tokens
pub mod marker;

/// Chunked writes, reattachment, sweep
pub mod orchestrator;

/// End-to-end conversion runs
pub mod pipeline;

/// Prelude for common imports
pub mod prelude;

/// Source documents and HTML scanning
pub mod source;

/// Document store interface and implementations
pub mod store;

/// Completeness validation
pub mod validate;

/// Global tracing subscriber setup
#[cfg(feature = "logging")]
pub mod logging;

// =============================================================================
// Re-exports
// =============================================================================

// Block model
pub use block::{BlockKind, ContentBlock, TextRun};

// Configuration
pub use config::PipelineConfig;

// Pipeline
pub use pipeline::{Created, Pipeline, PipelineOutcome, RunReport};

// Source
pub use source::SourceDocument;

// Store
pub use store::{BlockId, DocumentStore, InMemoryStore, ParentRef, RetryPolicy};

// Validation
pub use validate::{OrderIssueDetector, ValidationResult, ValidationStatus, Validator};

// Identity
pub use id::{MarkerId, RunSeed};

// Error types
pub use error::{PipelineError, PipelineResult, StoreError, ValidationError};

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Pipeline<InMemoryStore>: Send, Sync);
    assert_impl_all!(PipelineOutcome: Send, Sync);
    assert_impl_all!(InMemoryStore: DocumentStore, Send, Sync);
    assert_impl_all!(PipelineError: std::error::Error, Send, Sync);

    #[test]
    fn test_reexports_resolve() {
        let config = PipelineConfig::default();
        assert_eq!(config.marker.max_depth, 3);
        assert_eq!(config.marker.chunk_size, 100);
        assert_eq!(RunSeed::fixed(1), RunSeed::fixed(1));
    }
}
