//! Validation outcome.

use serde::Serialize;

use crate::error::ValidationError;

use super::coverage::{CoverageMethod, CoverageReport};
use super::order::Inversion;
use super::structure::CountComparison;

/// Overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Passed,
    /// Passed, but with order issues
    Warning,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Passed => "PASSED",
            ValidationStatus::Warning => "WARNING",
            ValidationStatus::Failed => "FAILED",
        }
    }
}

/// Everything a validation found. Never empty: `summary` always describes
/// the outcome, even for internal failures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub passed: bool,
    pub coverage: CoverageReport,
    pub structure: Vec<CountComparison>,
    /// Blocks in the final tree still carrying a marker token
    pub marker_leaks: usize,
    pub orchestration_failed: bool,
    pub inversions: Vec<Inversion>,
    /// Reasons for failure, one per line
    pub errors: Vec<String>,
    /// Non-fatal observations
    pub warnings: Vec<String>,
    /// The document should be reprocessed from scratch
    pub reprocess: bool,
    pub summary: String,
}

impl ValidationResult {
    /// A failed result describing an error that prevented validation.
    pub fn from_error(err: &ValidationError) -> Self {
        let message = err.to_string();
        Self {
            status: ValidationStatus::Failed,
            passed: false,
            coverage: CoverageReport {
                method: CoverageMethod::Lcs,
                coverage: 0.0,
                source_tokens: 0,
                target_tokens: 0,
                missing_spans: Vec::new(),
                suppressed_spans: 0,
                fallback_reason: None,
            },
            structure: Vec::new(),
            marker_leaks: 0,
            orchestration_failed: false,
            inversions: Vec::new(),
            summary: format!("FAILED: validation could not complete: {message}"),
            errors: vec![message],
            warnings: Vec::new(),
            reprocess: true,
        }
    }

    /// Failures that justify waiting for the store and validating again.
    pub fn has_hard_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Structural comparisons that failed their policy.
    pub fn hard_mismatches(&self) -> impl Iterator<Item = &CountComparison> {
        self.structure.iter().filter(|c| c.is_hard_mismatch())
    }
}
