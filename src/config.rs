//! Configuration for conversion runs
//!
//! Every knob has a default matching the target store's published limits;
//! a partial TOML document overrides only what it names.
//!
//! # Examples
//!
//! ```
//! use blockwright::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! assert_eq!(config.marker.max_depth, 3);
//! assert_eq!(config.dedup.window, 5);
//!
//! let config = PipelineConfig::from_toml_str("[marker]\nmax_depth = 2\n").unwrap();
//! assert_eq!(config.marker.max_depth, 2);
//! assert_eq!(config.marker.chunk_size, 100);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::store::RetryPolicy;

// =============================================================================
// Section configs
// =============================================================================

/// Deduplicator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Run the deduplicator at all
    pub enabled: bool,
    /// Proximity window K: duplicates further apart than this are kept
    pub window: usize,
    /// Characters of normalized text that go into a text signature
    pub text_limit: usize,
    /// Leading table rows that go into a table signature
    pub table_rows: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 5,
            text_limit: 200,
            table_rows: 5,
        }
    }
}

/// Depth-limit marker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Maximum nesting depth per write request (top-level = 1)
    pub max_depth: usize,
    /// Maximum top-level blocks per write request
    pub chunk_size: usize,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            chunk_size: 100,
        }
    }
}

/// Completeness validator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum LCS table size, in cells, before falling back to shingle coverage
    pub cell_budget: u64,
    /// Missing spans shorter than this many tokens are suppressed
    pub min_span_tokens: usize,
    /// Shingle width for the shingle-coverage fallback
    pub shingle_size: usize,
    /// Minimum coverage for a pass
    pub coverage_threshold: f64,
    /// Relative tolerance for heading counts
    pub heading_tolerance: f64,
    /// Missing spans listed in the persisted metadata
    pub max_reported_spans: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            cell_budget: 50_000_000,
            min_span_tokens: 40,
            shingle_size: 5,
            coverage_threshold: 0.95,
            heading_tolerance: 0.20,
            max_reported_spans: 5,
        }
    }
}

/// Delays covering the store's eventual consistency before read-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub base_ms: u64,
    pub per_marker_ms: u64,
    pub per_block_ms: u64,
    pub cap_ms: u64,
    /// Wait before the single re-validation after hard errors
    pub revalidate_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            per_marker_ms: 500,
            per_block_ms: 10,
            cap_ms: 30_000,
            revalidate_ms: 5_000,
        }
    }
}

impl SettleConfig {
    /// No waiting at all.
    pub fn immediate() -> Self {
        Self {
            base_ms: 0,
            per_marker_ms: 0,
            per_block_ms: 0,
            cap_ms: 0,
            revalidate_ms: 0,
        }
    }

    /// Delay before reading back a document with `markers` reattachments and
    /// `blocks` written blocks.
    pub fn delay_for(&self, markers: usize, blocks: usize) -> Duration {
        let ms = self
            .base_ms
            .saturating_add(self.per_marker_ms.saturating_mul(markers as u64))
            .saturating_add(self.per_block_ms.saturating_mul(blocks as u64));
        Duration::from_millis(ms.min(self.cap_ms))
    }

    pub fn revalidate_delay(&self) -> Duration {
        Duration::from_millis(self.revalidate_ms)
    }
}

// =============================================================================
// PipelineConfig
// =============================================================================

/// Configuration for one [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dedup: DedupConfig,
    pub marker: MarkerConfig,
    pub retry: RetryPolicy,
    pub validator: ValidatorConfig,
    pub settle: SettleConfig,
    /// Concurrent deletes per batch when replacing a document
    pub delete_concurrency: usize,
    /// Write validation results back as document properties
    pub persist_metadata: bool,
    /// Where to capture the raw source of documents that fail validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            marker: MarkerConfig::default(),
            retry: RetryPolicy::default(),
            validator: ValidatorConfig::default(),
            settle: SettleConfig::default(),
            delete_concurrency: 10,
            persist_metadata: true,
            capture_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Stricter validation: full coverage demanded and every span reported.
    pub fn strict() -> Self {
        Self {
            validator: ValidatorConfig {
                coverage_threshold: 0.99,
                min_span_tokens: 10,
                heading_tolerance: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// No settle delays. Intended for in-memory stores and tests.
    pub fn fast() -> Self {
        Self {
            settle: SettleConfig::immediate(),
            ..Default::default()
        }
    }

    /// Parse a (possibly partial) TOML document.
    pub fn from_toml_str(source: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| PipelineError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.marker.max_depth == 0 {
            return Err(PipelineError::config("marker.max_depth must be at least 1"));
        }
        if self.marker.chunk_size == 0 {
            return Err(PipelineError::config("marker.chunk_size must be at least 1"));
        }
        if self.dedup.window == 0 {
            return Err(PipelineError::config("dedup.window must be at least 1"));
        }
        if self.validator.shingle_size == 0 {
            return Err(PipelineError::config("validator.shingle_size must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.validator.coverage_threshold) {
            return Err(PipelineError::config("validator.coverage_threshold must be within 0..=1"));
        }
        if self.validator.heading_tolerance < 0.0 {
            return Err(PipelineError::config("validator.heading_tolerance must not be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_delay_scales_and_caps() {
        let settle = SettleConfig::default();
        assert_eq!(settle.delay_for(0, 0), Duration::from_millis(1_000));
        assert_eq!(settle.delay_for(2, 100), Duration::from_millis(3_000));
        assert_eq!(settle.delay_for(1_000, 0), Duration::from_millis(30_000));
        assert_eq!(SettleConfig::immediate().delay_for(50, 5_000), Duration::ZERO);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            delete_concurrency = 4

            [validator]
            min_span_tokens = 20

            [retry.rate_limit]
            max_retries = 8
            base_ms = 250
            cap_ms = 60000
            "#,
        )
        .unwrap();
        assert_eq!(config.delete_concurrency, 4);
        assert_eq!(config.validator.min_span_tokens, 20);
        assert_eq!(config.validator.shingle_size, 5);
        assert_eq!(config.retry.rate_limit.max_retries, 8);
        assert_eq!(config.retry.conflict, RetryPolicy::default().conflict);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(PipelineConfig::from_toml_str("[marker]\nmax_depth = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[validator]\ncoverage_threshold = 1.5\n").is_err());
        assert!(PipelineConfig::from_toml_str("not toml = = =").is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(PipelineConfig::fast().settle, SettleConfig::immediate());
        assert!(PipelineConfig::strict().validator.coverage_threshold > 0.95);
    }
}
