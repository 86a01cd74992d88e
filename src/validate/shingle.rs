//! Order-insensitive fallback: k-word shingle coverage.
//!
//! Raw Jaccard similarity of shingle sets undercounts: one substituted token
//! spoils up to k shingles. Instead a source token counts as present when
//! at least one shingle containing it occurs anywhere in the target, which
//! puts the result on the same scale as the exact LCS coverage.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet, FxHasher};

fn shingles(tokens: &[u32], width: usize) -> FxHashSet<u64> {
    tokens.windows(width).map(hash_window).collect()
}

fn hash_window(window: &[u32]) -> u64 {
    let mut hasher = FxHasher::default();
    window.hash(&mut hasher);
    hasher.finish()
}

/// Fraction of `source` tokens covered by a k-word shingle that also occurs
/// in `target`.
///
/// Sources shorter than `k` are compared as a single shingle. An empty
/// source is fully covered.
pub fn shingle_coverage(source: &[u32], target: &[u32], k: usize) -> f64 {
    if source.is_empty() {
        return 1.0;
    }
    let width = k.max(1).min(source.len());
    let known = shingles(target, width);

    // +1 where a matched window starts, -1 one past where it ends
    let mut delta = vec![0i32; source.len() + 1];
    for (start, window) in source.windows(width).enumerate() {
        if known.contains(&hash_window(window)) {
            delta[start] += 1;
            delta[start + width] -= 1;
        }
    }

    let mut open = 0;
    let mut covered = 0usize;
    for step in &delta[..source.len()] {
        open += step;
        if open > 0 {
            covered += 1;
        }
    }
    covered as f64 / source.len() as f64
}
