//! Pluggable order-issue detection.
//!
//! An order issue is a pair of source passages that appear in the document
//! in the opposite order. Inversions never fail a validation; they downgrade
//! a pass to a warning.

use std::sync::Arc;

use serde::Serialize;

use crate::block::ContentBlock;

/// Two passages found in swapped order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inversion {
    /// Passage that comes first in the source
    pub expected_first: String,
    /// Passage that comes second in the source but first in the document
    pub expected_second: String,
}

impl Inversion {
    pub fn new(expected_first: impl Into<String>, expected_second: impl Into<String>) -> Self {
        Self {
            expected_first: expected_first.into(),
            expected_second: expected_second.into(),
        }
    }
}

/// Detects order inversions between the source text and the final tree.
pub trait OrderIssueDetector: Send + Sync {
    fn detect(&self, source_text: &str, final_tree: &[ContentBlock]) -> Vec<Inversion>;
}

impl<D: OrderIssueDetector + ?Sized> OrderIssueDetector for Arc<D> {
    fn detect(&self, source_text: &str, final_tree: &[ContentBlock]) -> Vec<Inversion> {
        (**self).detect(source_text, final_tree)
    }
}

// =============================================================================
// NoopOrderDetector
// =============================================================================

/// A detector that reports nothing.
///
/// The default for [`Pipeline`](crate::Pipeline) when no detector is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOrderDetector;

impl OrderIssueDetector for NoopOrderDetector {
    fn detect(&self, _source_text: &str, _final_tree: &[ContentBlock]) -> Vec<Inversion> {
        Vec::new()
    }
}

/// Adapts a closure into an [`OrderIssueDetector`].
#[derive(Debug, Clone, Copy)]
pub struct DetectorFn<F>(pub F);

impl<F> OrderIssueDetector for DetectorFn<F>
where
    F: Fn(&str, &[ContentBlock]) -> Vec<Inversion> + Send + Sync,
{
    fn detect(&self, source_text: &str, final_tree: &[ContentBlock]) -> Vec<Inversion> {
        (self.0)(source_text, final_tree)
    }
}

/// Wrap a closure as a detector.
pub fn detector_fn<F>(f: F) -> DetectorFn<F>
where
    F: Fn(&str, &[ContentBlock]) -> Vec<Inversion> + Send + Sync,
{
    DetectorFn(f)
}
