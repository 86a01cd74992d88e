//! Longest Common Subsequence over interned token sequences
//!
//! Used to find which source tokens survived into the persisted document.
//!
//! # Algorithm
//!
//! 1. Refuse inputs whose full `(n+1) × (m+1)` table exceeds the cell budget.
//! 2. Trim the common prefix and suffix; they match trivially.
//! 3. Fill a flat table for the remaining core, refusing allocation failures.
//! 4. Backtrack into a per-token "matched" mask over the source.
//!
//! # Complexity
//!
//! - Time: O(n × m) over the untrimmed core
//! - Space: O(n × m) `u32` cells for the core
//!
//! Near-identical documents trim down to a tiny core, so the table actually
//! allocated is usually far smaller than the budget allows.

use std::fmt;

/// Result of a successful LCS computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcsMatch {
    /// Length of the longest common subsequence
    pub length: usize,
    /// `matched[i]` is true if source token `i` is part of the LCS
    pub matched: Vec<bool>,
}

/// Why the exact computation was not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcsRefusal {
    /// The table would exceed the cell budget
    OverBudget { cells: u64, budget: u64 },
    /// The table could not be allocated
    Allocation { cells: u64 },
}

impl fmt::Display for LcsRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LcsRefusal::OverBudget { cells, budget } => {
                write!(f, "LCS table of {cells} cells exceeds budget of {budget}")
            }
            LcsRefusal::Allocation { cells } => write!(f, "failed to allocate LCS table of {cells} cells"),
        }
    }
}

/// Compute the LCS of `source` and `target`, marking matched source tokens.
pub fn lcs_mask(source: &[u32], target: &[u32], cell_budget: u64) -> Result<LcsMatch, LcsRefusal> {
    let cells = (source.len() as u64 + 1).saturating_mul(target.len() as u64 + 1);
    if cells > cell_budget {
        return Err(LcsRefusal::OverBudget {
            cells,
            budget: cell_budget,
        });
    }

    let prefix = source
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = source[prefix..]
        .iter()
        .rev()
        .zip(target[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let core_source = &source[prefix..source.len() - suffix];
    let core_target = &target[prefix..target.len() - suffix];

    let mut matched = vec![false; source.len()];
    matched[..prefix].fill(true);
    matched[source.len() - suffix..].fill(true);

    let core = compute_core(core_source, core_target)?;
    for idx in &core {
        matched[prefix + idx] = true;
    }

    Ok(LcsMatch {
        length: prefix + suffix + core.len(),
        matched,
    })
}

/// LCS of the trimmed core, as matched indices into `old`.
fn compute_core(old: &[u32], new: &[u32]) -> Result<Vec<usize>, LcsRefusal> {
    let n = old.len();
    let m = new.len();
    if n == 0 || m == 0 {
        return Ok(Vec::new());
    }

    let cells = (n as u64 + 1).saturating_mul(m as u64 + 1);
    let len = usize::try_from(cells).map_err(|_| LcsRefusal::Allocation { cells })?;

    // dp[i * w + j] = length of LCS of old[0..i] and new[0..j]
    let w = m + 1;
    let mut dp: Vec<u32> = Vec::new();
    dp.try_reserve_exact(len)
        .map_err(|_| LcsRefusal::Allocation { cells })?;
    dp.resize(len, 0);

    for i in 1..=n {
        for j in 1..=m {
            dp[i * w + j] = if old[i - 1] == new[j - 1] {
                dp[(i - 1) * w + j - 1] + 1
            } else {
                dp[(i - 1) * w + j].max(dp[i * w + j - 1])
            };
        }
    }

    // Backtrack to find LCS
    let mut lcs = Vec::with_capacity(dp[n * w + m] as usize);
    let mut i = n;
    let mut j = m;
    while i > 0 && j > 0 {
        if old[i - 1] == new[j - 1] {
            lcs.push(i - 1);
            i -= 1;
            j -= 1;
        } else if dp[(i - 1) * w + j] >= dp[i * w + j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    lcs.reverse();
    Ok(lcs)
}

/// A maximal run of unmatched source tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmatchedRun {
    pub start: usize,
    pub len: usize,
}

/// Coalesce the `false` entries of `matched` into runs.
pub fn unmatched_runs(matched: &[bool]) -> Vec<UnmatchedRun> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, &hit) in matched.iter().enumerate() {
        match (hit, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                runs.push(UnmatchedRun { start: s, len: i - s });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        runs.push(UnmatchedRun {
            start: s,
            len: matched.len() - s,
        });
    }
    runs
}
