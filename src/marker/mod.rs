//! Depth-limit marking (Phase A).
//!
//! The store accepts at most `max_depth` levels of nesting per request. Any
//! block at depth `max_depth` that still has children gets a marker token
//! appended to its text; its children are excised into the [`MarkerMap`]
//! and written later, by a separate append under the persisted block.
//!
//! Excised children are marked again relative to their future append root,
//! so every deferred payload is itself depth-bounded.
//!
//! # Unmarkable blocks
//!
//! Tables and columns cannot carry a token (they have no text of their own).
//! When such a block would need one, its nearest markable parent is marked
//! instead. A top-level block that cannot be marked is counted and logged;
//! the store will reject its subtree.

pub mod token;

use rustc_hash::FxHashMap;

use crate::block::{ContentBlock, count_blocks};
use crate::id::{MarkerId, RunSeed};

pub use token::{contains_marker, find_markers, strip_marker, strip_markers, token_run};

// =============================================================================
// MarkerMap
// =============================================================================

/// Deferred children by marker ID.
///
/// Owned by one run. Entries are taken out as they are reattached, so what
/// remains after Phase C is exactly the set of markers that were never found.
#[derive(Debug, Clone, Default)]
pub struct MarkerMap {
    entries: FxHashMap<MarkerId, Vec<ContentBlock>>,
}

impl MarkerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: MarkerId, children: Vec<ContentBlock>) {
        self.entries.insert(id, children);
    }

    /// Remove and return the payload for `id`.
    pub fn take(&mut self, id: MarkerId) -> Option<Vec<ContentBlock>> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: MarkerId) -> Option<&[ContentBlock]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total blocks held across all payloads.
    pub fn deferred_block_count(&self) -> usize {
        self.entries.values().map(|c| count_blocks(c)).sum()
    }

    /// Marker IDs still pending, in a stable order.
    pub fn ids(&self) -> Vec<MarkerId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

// =============================================================================
// Marker
// =============================================================================

/// Counters for one marking pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkStats {
    /// Markers generated
    pub markers: usize,
    /// Blocks moved into deferred payloads
    pub deferred_blocks: usize,
    /// Blocks that needed a marker but had no markable ancestor
    pub unmarkable: usize,
}

/// Output of [`Marker::mark`].
#[derive(Debug, Clone, Default)]
pub struct Marked {
    /// Depth-bounded top-level sequence
    pub blocks: Vec<ContentBlock>,
    pub map: MarkerMap,
    pub stats: MarkStats,
}

/// Splits a block tree into a depth-bounded tree plus deferred payloads.
#[derive(Debug)]
pub struct Marker {
    max_depth: usize,
    seed: RunSeed,
    counter: u64,
    stats: MarkStats,
}

impl Marker {
    pub fn new(max_depth: usize, seed: RunSeed) -> Self {
        Self {
            max_depth: max_depth.max(1),
            seed,
            counter: 0,
            stats: MarkStats::default(),
        }
    }

    /// Mark `blocks`. After this, neither the returned sequence nor any
    /// payload in the map nests deeper than `max_depth`, except below
    /// blocks counted as unmarkable.
    pub fn mark(mut self, mut blocks: Vec<ContentBlock>) -> Marked {
        let mut map = MarkerMap::new();
        let mut pending: Vec<(MarkerId, Vec<ContentBlock>)> = Vec::new();

        self.mark_level(&mut blocks, 1, &mut pending);
        while let Some((id, mut children)) = pending.pop() {
            self.mark_level(&mut children, 1, &mut pending);
            map.insert(id, children);
        }
        self.stats.deferred_blocks = map.deferred_block_count();

        tracing::debug!(
            markers = self.stats.markers,
            deferred = self.stats.deferred_blocks,
            unmarkable = self.stats.unmarkable,
            "marked tree"
        );
        Marked {
            blocks,
            map,
            stats: self.stats,
        }
    }

    fn next_id(&mut self) -> MarkerId {
        let id = MarkerId::derive(self.seed, self.counter);
        self.counter += 1;
        id
    }

    fn mark_level(
        &mut self,
        blocks: &mut [ContentBlock],
        depth: usize,
        pending: &mut Vec<(MarkerId, Vec<ContentBlock>)>,
    ) {
        for block in blocks.iter_mut() {
            if block.children.is_empty() {
                continue;
            }
            let needs_marker = depth >= self.max_depth || !self.resolvable_below(block, depth);
            if needs_marker && block.can_carry_marker() {
                let id = self.next_id();
                let children = std::mem::take(&mut block.children);
                self.stats.markers += 1;
                block.rich_text.push(token_run(id));
                tracing::trace!(marker = %id, kind = ?block.kind, depth, "deferred children");
                pending.push((id, children));
                continue;
            }
            if depth >= self.max_depth {
                self.stats.unmarkable += 1;
                tracing::warn!(kind = ?block.kind, depth, "block exceeds nesting limit and cannot carry a marker");
                continue;
            }
            self.mark_level(&mut block.children, depth + 1, pending);
        }
    }

    /// Markers placed strictly below `block` can bound its subtree.
    fn resolvable_below(&self, block: &ContentBlock, depth: usize) -> bool {
        depth < self.max_depth
            && block
                .children
                .iter()
                .all(|child| self.fits(child, depth + 1))
    }

    /// The subtree at `block` can be bounded by markers at `block` or below.
    fn fits(&self, block: &ContentBlock, depth: usize) -> bool {
        if block.children.is_empty() {
            return true;
        }
        if depth >= self.max_depth {
            return block.can_carry_marker();
        }
        block.can_carry_marker() || self.resolvable_below(block, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockKind, plain_text, tree_depth};

    fn mark(blocks: Vec<ContentBlock>, max_depth: usize) -> Marked {
        Marker::new(max_depth, RunSeed::fixed(42)).mark(blocks)
    }

    fn assert_bounded(marked: &Marked, max_depth: usize) {
        assert!(tree_depth(&marked.blocks) <= max_depth);
        for id in marked.map.ids() {
            assert!(tree_depth(marked.map.get(id).unwrap()) <= max_depth);
        }
    }

    fn chain(len: usize) -> ContentBlock {
        let mut block = ContentBlock::bulleted(format!("level {len}"));
        for level in (1..len).rev() {
            block = ContentBlock::bulleted(format!("level {level}")).child(block);
        }
        block
    }

    #[test]
    fn test_shallow_tree_is_untouched() {
        let tree = vec![chain(3), ContentBlock::paragraph("p")];
        let marked = mark(tree.clone(), 3);
        assert_eq!(marked.blocks, tree);
        assert!(marked.map.is_empty());
        assert_eq!(marked.stats, MarkStats::default());
    }

    #[test]
    fn test_depth_limit_node_gets_one_marker() {
        let node = ContentBlock::bulleted("c")
            .child(ContentBlock::paragraph("d1"))
            .child(ContentBlock::paragraph("d2"));
        let tree = vec![ContentBlock::bulleted("a").child(ContentBlock::bulleted("b").child(node))];
        let marked = mark(tree, 3);

        assert_eq!(marked.map.len(), 1);
        assert_eq!(marked.stats.markers, 1);
        assert_eq!(marked.stats.deferred_blocks, 2);
        assert_eq!(tree_depth(&marked.blocks), 3);

        let marked_node = &marked.blocks[0].children[0].children[0];
        assert!(marked_node.children.is_empty());
        let ids = find_markers(&plain_text(&marked_node.rich_text));
        assert_eq!(ids.len(), 1);
        let payload = marked.map.get(ids[0]).unwrap();
        assert_eq!(payload[0].plain_text(), "d1");
        assert_eq!(payload[1].plain_text(), "d2");
    }

    #[test]
    fn test_deep_chain_yields_bounded_payloads() {
        let marked = mark(vec![chain(10)], 3);
        assert_bounded(&marked, 3);
        assert_eq!(marked.map.deferred_block_count(), 7);
        assert_eq!(marked.stats.deferred_blocks, 7);
        assert_eq!(marked.stats.markers, marked.map.len());
        assert_eq!(
            count_blocks(&marked.blocks) + marked.map.deferred_block_count(),
            10
        );
    }

    #[test]
    fn test_table_at_limit_marks_its_parent() {
        let tree = vec![ContentBlock::toggle("outer").child(
            ContentBlock::toggle("inner").child(ContentBlock::table([["a", "b"]])),
        )];
        let marked = mark(tree, 3);
        assert_bounded(&marked, 3);
        assert_eq!(marked.stats.unmarkable, 0);

        let inner = &marked.blocks[0].children[0];
        assert!(inner.children.is_empty());
        assert!(contains_marker(&plain_text(&inner.rich_text)));
        let id = find_markers(&plain_text(&inner.rich_text))[0];
        assert!(marked.map.get(id).unwrap()[0].is(BlockKind::Table));
    }

    #[test]
    fn test_unmarkable_chain_marks_nearest_carrier() {
        let tree = vec![ContentBlock::toggle("outer").child(
            ContentBlock::new(BlockKind::ColumnList).child(
                ContentBlock::new(BlockKind::Column).child(ContentBlock::paragraph("deep text")),
            ),
        )];
        let marked = mark(tree, 3);
        assert_bounded(&marked, 3);
        assert_eq!(marked.stats.unmarkable, 0);
        assert_eq!(marked.stats.markers, 1);

        let outer = &marked.blocks[0];
        assert!(outer.children.is_empty());
        let id = find_markers(&plain_text(&outer.rich_text))[0];
        let payload = marked.map.get(id).unwrap();
        assert!(payload[0].is(BlockKind::ColumnList));
        assert_eq!(tree_depth(payload), 3);
    }

    #[test]
    fn test_unmarkable_top_level_is_counted() {
        let tree = vec![ContentBlock::table([["a"]])];
        let marked = mark(tree, 1);
        assert_eq!(marked.stats.unmarkable, 1);
        assert!(marked.map.is_empty());
    }

    #[test]
    fn test_marker_ids_are_reproducible() {
        let a = mark(vec![chain(6)], 2);
        let b = mark(vec![chain(6)], 2);
        assert_eq!(a.map.ids(), b.map.ids());
        assert_eq!(a.blocks, b.blocks);
    }
}
