//! Prelude module for common imports.
//!
//! ```
//! use blockwright::prelude::*;
//! ```

// Block model
pub use crate::block::{BlockData, BlockKind, Color, ContentBlock, MediaSource, RichText, TextRun};

// Configuration
pub use crate::config::{
    DedupConfig, MarkerConfig, PipelineConfig, SettleConfig, ValidatorConfig,
};

// Pipeline
pub use crate::pipeline::{Created, Pipeline, PipelineOutcome, RunReport};

// Source
pub use crate::source::{SourceDocument, scan_html};

// Store
pub use crate::store::{
    BlockId, DocumentStore, InMemoryStore, ParentRef, Properties, PropertyValue, RetryPolicy,
};

// Validation
pub use crate::validate::{
    CountKind, Inversion, NoopOrderDetector, OrderIssueDetector, StructuralCounts,
    ValidationResult, ValidationStatus, Validator, detector_fn,
};

// Identity
pub use crate::id::{MarkerId, RunSeed};

// Error
pub use crate::error::{PipelineError, PipelineResult, StoreError};
