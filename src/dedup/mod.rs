//! Block deduplication
//!
//! Extraction can emit the same content twice (a callout picked up by two
//! selectors, an image reached through a figure and its link). The
//! deduplicator removes such copies per children list, recursively, without
//! ever comparing blocks under unrelated parents.
//!
//! # Rules
//!
//! - Two blocks are duplicates when their [`Signature`]s match and they are
//!   at most `window` positions apart.
//! - Blocks matched by an [`ExemptionRule`] are removed only when directly
//!   adjacent to their copy.
//! - Images are removed at any distance within the same list.
//! - Blocks without a kind are dropped and counted.
//!
//! Distances are measured between positions in the *output* list, which
//! makes the pass idempotent.
//!
//! # Example
//!
//! ```
//! use blockwright::block::ContentBlock;
//! use blockwright::dedup::Deduplicator;
//! use blockwright::config::DedupConfig;
//!
//! let blocks = vec![
//!     ContentBlock::paragraph("Restart the service."),
//!     ContentBlock::paragraph("Restart the service."),
//! ];
//! let (kept, stats) = Deduplicator::new(&DedupConfig::default()).dedupe(blocks);
//! assert_eq!(kept.len(), 1);
//! assert_eq!(stats.removed, 1);
//! ```

mod exemption;
mod signature;
mod window;

pub use exemption::{EXEMPTION_RULES, ExemptionRule, exemption};
pub use signature::{Signature, normalize_text, signature};
pub use window::DedupWindow;

use rustc_hash::FxHashSet;

use crate::block::ContentBlock;
use crate::config::DedupConfig;

/// Counters for one dedup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Duplicates removed, images included
    pub removed: usize,
    /// Images removed as global duplicates
    pub images_removed: usize,
    /// Blocks dropped for lacking a kind
    pub malformed: usize,
    /// Exempt blocks kept despite a copy inside the window
    pub exempt_kept: usize,
}

/// Removes duplicate blocks from a tree.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    window: usize,
    text_limit: usize,
    table_rows: usize,
    rules: &'static [ExemptionRule],
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            window: config.window.max(1),
            text_limit: config.text_limit,
            table_rows: config.table_rows,
            rules: EXEMPTION_RULES,
        }
    }

    /// Replace the exemption table.
    pub fn with_rules(mut self, rules: &'static [ExemptionRule]) -> Self {
        self.rules = rules;
        self
    }

    /// Deduplicate `blocks` and every nested children list.
    pub fn dedupe(&self, blocks: Vec<ContentBlock>) -> (Vec<ContentBlock>, DedupStats) {
        let mut stats = DedupStats::default();
        let kept = self.dedupe_list(blocks, &mut stats);
        if stats.removed > 0 || stats.malformed > 0 {
            tracing::debug!(
                removed = stats.removed,
                images = stats.images_removed,
                malformed = stats.malformed,
                exempt_kept = stats.exempt_kept,
                "deduplicated tree"
            );
        }
        (kept, stats)
    }

    fn dedupe_list(&self, blocks: Vec<ContentBlock>, stats: &mut DedupStats) -> Vec<ContentBlock> {
        let mut window = DedupWindow::new(self.window);
        let mut images = FxHashSet::default();
        let mut out = Vec::with_capacity(blocks.len());

        for mut block in blocks {
            if block.is_malformed() {
                stats.malformed += 1;
                tracing::warn!(text = %block.plain_text(), "dropping block without kind");
                continue;
            }
            block.children = self.dedupe_list(std::mem::take(&mut block.children), stats);

            let position = out.len();
            match signature(&block, self.text_limit, self.table_rows) {
                None => {}
                Some(Signature::Global(sig)) => {
                    if !images.insert(sig) {
                        stats.removed += 1;
                        stats.images_removed += 1;
                        continue;
                    }
                }
                Some(Signature::Proximity(sig)) => {
                    let exempt = exemption(self.rules, &block).is_some();
                    let max_distance = if exempt { 1 } else { self.window };
                    if window.find(sig, position, max_distance).is_some() {
                        stats.removed += 1;
                        continue;
                    }
                    if exempt && window.find(sig, position, self.window).is_some() {
                        stats.exempt_kept += 1;
                    }
                    window.push(sig, position);
                }
            }
            out.push(block);
        }
        out
    }
}

/// Deduplicate with the given configuration and the built-in exemption table.
pub fn dedupe(blocks: Vec<ContentBlock>, config: &DedupConfig) -> (Vec<ContentBlock>, DedupStats) {
    Deduplicator::new(config).dedupe(blocks)
}
