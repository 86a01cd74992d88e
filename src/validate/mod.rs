//! Completeness validation
//!
//! Compares what was written against what the source held:
//!
//! - **Text coverage**: exact token LCS, or shingle coverage when the LCS
//!   table would be too large ([`coverage`]).
//! - **Structure**: per-kind block counts under a per-kind policy
//!   ([`structure`]).
//! - **Marker leaks**: any token left in the final tree.
//! - **Order issues**: reported by a pluggable [`OrderIssueDetector`].
//!
//! The validator is synchronous and side-effect free; reading the tree back
//! and persisting the result are the pipeline's job.

pub mod canonical;
pub mod coverage;
pub mod lcs;
pub mod order;
pub mod report;
pub mod result;
pub mod shingle;
pub mod structure;

pub use coverage::{CoverageMethod, CoverageReport, TextSpan, measure};
pub use order::{DetectorFn, Inversion, NoopOrderDetector, OrderIssueDetector, detector_fn};
pub use report::{STATS_PROPERTY, VALIDATION_PROPERTY, metadata_properties};
pub use result::{ValidationResult, ValidationStatus};
pub use structure::{CountComparison, CountKind, CountPolicy, StructuralCounts};

use crate::block::{ContentBlock, flatten_text};
use crate::config::ValidatorConfig;
use crate::error::ValidationError;
use crate::marker::contains_marker;

/// Facts about the run that feed into the verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    /// A marker failed to reattach or was never found
    pub orchestration_failed: bool,
}

/// Number of blocks in `blocks` (descendants included) whose text still
/// carries a marker token.
pub fn count_marker_leaks(blocks: &[ContentBlock]) -> usize {
    blocks
        .iter()
        .map(|b| usize::from(contains_marker(&b.plain_text())) + count_marker_leaks(&b.children))
        .sum()
}

/// Checks a persisted tree against its source.
#[derive(Debug, Clone)]
pub struct Validator<D = NoopOrderDetector> {
    config: ValidatorConfig,
    detector: D,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            detector: NoopOrderDetector,
        }
    }
}

impl<D: OrderIssueDetector> Validator<D> {
    /// Use a custom order-issue detector.
    pub fn with_detector<D2: OrderIssueDetector>(self, detector: D2) -> Validator<D2> {
        Validator {
            config: self.config,
            detector,
        }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate `final_tree` against the source text and counts.
    pub fn validate(
        &self,
        source_text: &str,
        final_tree: &[ContentBlock],
        source_counts: &StructuralCounts,
    ) -> ValidationResult {
        self.validate_run(source_text, final_tree, source_counts, RunFlags::default())
    }

    /// Like [`validate`](Self::validate), folding in run flags. Internal
    /// errors become a failed result.
    pub fn validate_run(
        &self,
        source_text: &str,
        final_tree: &[ContentBlock],
        source_counts: &StructuralCounts,
        flags: RunFlags,
    ) -> ValidationResult {
        match self.try_validate(source_text, final_tree, source_counts, flags) {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(error = %err, "validation failed internally");
                ValidationResult::from_error(&err)
            }
        }
    }

    fn try_validate(
        &self,
        source_text: &str,
        final_tree: &[ContentBlock],
        source_counts: &StructuralCounts,
        flags: RunFlags,
    ) -> Result<ValidationResult, ValidationError> {
        let config = &self.config;
        if config.shingle_size == 0 {
            return Err(ValidationError::Internal("shingle size must be at least 1".into()));
        }
        if !config.coverage_threshold.is_finite() {
            return Err(ValidationError::Internal("coverage threshold is not a number".into()));
        }

        let coverage = measure(source_text, &flatten_text(final_tree), config);
        let target_counts = StructuralCounts::from_tree(final_tree);
        let structure = structure::compare(source_counts, &target_counts, config.heading_tolerance);
        let marker_leaks = count_marker_leaks(final_tree);
        let inversions = self.detector.detect(source_text, final_tree);

        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if coverage.coverage < config.coverage_threshold {
            errors.push(format!(
                "text coverage {:.1}% is below {:.1}%",
                coverage.coverage * 100.0,
                config.coverage_threshold * 100.0
            ));
        }
        if !coverage.missing_spans.is_empty() {
            errors.push(format!(
                "{} missing text span(s) of at least {} tokens",
                coverage.missing_spans.len(),
                config.min_span_tokens
            ));
        }
        for c in &structure {
            if c.is_hard_mismatch() {
                errors.push(format!("{} count mismatch: source {}, target {}", c.kind.as_str(), c.source, c.target));
            } else if !c.ok {
                warnings.push(format!("{} count differs: source {}, target {}", c.kind.as_str(), c.source, c.target));
            }
        }
        if marker_leaks > 0 {
            errors.push(format!("{marker_leaks} block(s) still carry marker tokens"));
        }
        if flags.orchestration_failed {
            errors.push("deferred content could not be fully reattached".to_owned());
        }
        if coverage.suppressed_spans > 0 {
            warnings.push(format!("{} short missing span(s) ignored", coverage.suppressed_spans));
        }
        if let Some(reason) = &coverage.fallback_reason {
            warnings.push(format!("approximate coverage: {reason}"));
        }

        let passed = errors.is_empty();
        let status = match (passed, inversions.is_empty()) {
            (false, _) => ValidationStatus::Failed,
            (true, false) => ValidationStatus::Warning,
            (true, true) => ValidationStatus::Passed,
        };
        let summary = format!(
            "{}: coverage {:.1}% ({}), {} error(s), {} warning(s), {} order issue(s)",
            status.as_str(),
            coverage.coverage * 100.0,
            coverage.method.as_str(),
            errors.len(),
            warnings.len(),
            inversions.len()
        );

        Ok(ValidationResult {
            status,
            passed,
            coverage,
            structure,
            marker_leaks,
            orchestration_failed: flags.orchestration_failed,
            inversions,
            errors,
            warnings,
            reprocess: marker_leaks > 0,
            summary,
        })
    }
}
