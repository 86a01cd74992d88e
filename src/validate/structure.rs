//! Structural counts and the comparison policy.
//!
//! | Kind | Policy |
//! |------|--------|
//! | Tables, images, callouts | must match exactly |
//! | Headings | `|target − source| ≤ ceil(tolerance × source)` |
//! | Paragraphs, list items, code | informational |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::{BlockKind, ContentBlock};

/// Block categories counted on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountKind {
    ListItems,
    Paragraphs,
    Headings,
    Tables,
    Images,
    Callouts,
    Code,
}

/// How a count mismatch is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    Exact,
    Tolerance,
    Informational,
}

impl CountKind {
    pub const ALL: [CountKind; 7] = [
        CountKind::ListItems,
        CountKind::Paragraphs,
        CountKind::Headings,
        CountKind::Tables,
        CountKind::Images,
        CountKind::Callouts,
        CountKind::Code,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CountKind::ListItems => "list items",
            CountKind::Paragraphs => "paragraphs",
            CountKind::Headings => "headings",
            CountKind::Tables => "tables",
            CountKind::Images => "images",
            CountKind::Callouts => "callouts",
            CountKind::Code => "code",
        }
    }

    pub fn policy(&self) -> CountPolicy {
        match self {
            CountKind::Tables | CountKind::Images | CountKind::Callouts => CountPolicy::Exact,
            CountKind::Headings => CountPolicy::Tolerance,
            CountKind::ListItems | CountKind::Paragraphs | CountKind::Code => {
                CountPolicy::Informational
            }
        }
    }

    /// Category of a block kind, if it is counted at all.
    pub fn of(kind: BlockKind) -> Option<Self> {
        match kind {
            k if k.is_list_item() => Some(CountKind::ListItems),
            k if k.is_heading() => Some(CountKind::Headings),
            BlockKind::Paragraph => Some(CountKind::Paragraphs),
            BlockKind::Table => Some(CountKind::Tables),
            BlockKind::Image => Some(CountKind::Images),
            BlockKind::Callout => Some(CountKind::Callouts),
            BlockKind::Code => Some(CountKind::Code),
            _ => None,
        }
    }
}

// =============================================================================
// StructuralCounts
// =============================================================================

/// Per-category block counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuralCounts(BTreeMap<CountKind, usize>);

impl StructuralCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every block of `blocks`, descendants included.
    pub fn from_tree(blocks: &[ContentBlock]) -> Self {
        let mut counts = Self::new();
        counts.add_tree(blocks);
        counts
    }

    fn add_tree(&mut self, blocks: &[ContentBlock]) {
        for block in blocks {
            if let Some(kind) = block.kind.and_then(CountKind::of) {
                self.increment(kind);
            }
            self.add_tree(&block.children);
        }
    }

    pub fn get(&self, kind: CountKind) -> usize {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn set(&mut self, kind: CountKind, count: usize) {
        self.0.insert(kind, count);
    }

    pub fn increment(&mut self, kind: CountKind) {
        *self.0.entry(kind).or_default() += 1;
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, kind: CountKind, count: usize) -> Self {
        self.set(kind, count);
        self
    }
}

// =============================================================================
// Comparison
// =============================================================================

/// Source versus target count for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountComparison {
    pub kind: CountKind,
    pub source: usize,
    pub target: usize,
    pub policy: CountPolicy,
    /// The difference is within policy
    pub ok: bool,
}

impl CountComparison {
    /// A mismatch that fails validation.
    pub fn is_hard_mismatch(&self) -> bool {
        !self.ok && self.policy != CountPolicy::Informational
    }
}

/// Largest heading difference tolerated for `source` headings.
pub fn heading_allowance(source: usize, tolerance: f64) -> usize {
    // Subtract a hair so that e.g. 0.2 × 15 does not round up to 4
    (tolerance * source as f64 - 1e-9).ceil().max(0.0) as usize
}

/// Compare every category under its policy.
pub fn compare(
    source: &StructuralCounts,
    target: &StructuralCounts,
    heading_tolerance: f64,
) -> Vec<CountComparison> {
    CountKind::ALL
        .iter()
        .map(|&kind| {
            let s = source.get(kind);
            let t = target.get(kind);
            let policy = kind.policy();
            let ok = match policy {
                CountPolicy::Exact | CountPolicy::Informational => s == t,
                CountPolicy::Tolerance => s.abs_diff(t) <= heading_allowance(s, heading_tolerance),
            };
            CountComparison {
                kind,
                source: s,
                target: t,
                policy,
                ok,
            }
        })
        .collect()
}
