//! Text coverage: how much of the source text survived into the document.

use serde::Serialize;

use crate::config::ValidatorConfig;

use super::canonical::{TokenInterner, canonicalize};
use super::lcs::{lcs_mask, unmatched_runs};
use super::shingle::shingle_coverage;

/// How coverage was measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMethod {
    /// Exact LCS over tokens
    Lcs,
    /// k-word shingle coverage, order-insensitive (no spans)
    Shingle,
}

impl CoverageMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageMethod::Lcs => "lcs",
            CoverageMethod::Shingle => "shingle",
        }
    }
}

/// A run of source tokens missing from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    /// Index of the first missing token in the canonical source
    pub start: usize,
    /// Number of missing tokens
    pub len: usize,
    /// The missing tokens, space-joined
    pub text: String,
}

/// Coverage of the source text by the document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub method: CoverageMethod,
    /// Fraction of source content present, in `0.0..=1.0`
    pub coverage: f64,
    pub source_tokens: usize,
    pub target_tokens: usize,
    /// Missing spans at or above the reporting threshold
    pub missing_spans: Vec<TextSpan>,
    /// Missing spans below the threshold, dropped as noise
    pub suppressed_spans: usize,
    /// Why the exact method was not used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl CoverageReport {
    /// Coverage of a source with no text.
    fn complete(target_tokens: usize) -> Self {
        Self {
            method: CoverageMethod::Lcs,
            coverage: 1.0,
            source_tokens: 0,
            target_tokens,
            missing_spans: Vec::new(),
            suppressed_spans: 0,
            fallback_reason: None,
        }
    }
}

/// Measure how much of `source` appears, in order, in `target`.
pub fn measure(source: &str, target: &str, config: &ValidatorConfig) -> CoverageReport {
    let source_text = canonicalize(source);
    let target_text = canonicalize(target);

    let mut interner = TokenInterner::new();
    let source_ids = interner.intern(&source_text);
    let target_ids = interner.intern(&target_text);

    if source_ids.is_empty() {
        return CoverageReport::complete(target_ids.len());
    }

    match lcs_mask(&source_ids, &target_ids, config.cell_budget) {
        Ok(lcs) => {
            let words: Vec<&str> = source_text.split_whitespace().collect();
            let mut missing_spans = Vec::new();
            let mut suppressed_spans = 0;
            for run in unmatched_runs(&lcs.matched) {
                if run.len < config.min_span_tokens {
                    suppressed_spans += 1;
                    continue;
                }
                missing_spans.push(TextSpan {
                    start: run.start,
                    len: run.len,
                    text: words[run.start..run.start + run.len].join(" "),
                });
            }
            CoverageReport {
                method: CoverageMethod::Lcs,
                coverage: lcs.length as f64 / source_ids.len() as f64,
                source_tokens: source_ids.len(),
                target_tokens: target_ids.len(),
                missing_spans,
                suppressed_spans,
                fallback_reason: None,
            }
        }
        Err(refusal) => {
            tracing::debug!(reason = %refusal, "falling back to shingle coverage");
            CoverageReport {
                method: CoverageMethod::Shingle,
                coverage: shingle_coverage(&source_ids, &target_ids, config.shingle_size),
                source_tokens: source_ids.len(),
                target_tokens: target_ids.len(),
                missing_spans: Vec::new(),
                suppressed_spans: 0,
                fallback_reason: Some(refusal.to_string()),
            }
        }
    }
}
