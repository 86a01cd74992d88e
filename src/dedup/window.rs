//! Bounded proximity window of recent signatures.

use std::collections::VecDeque;

/// FIFO of `(signature, position)` for the last K signature-bearing blocks
/// of one children list.
///
/// Positions are indices in the *output* sequence, so removing a duplicate
/// never changes the distance between the blocks that remain. That is what
/// makes a second dedup pass a no-op.
#[derive(Debug)]
pub struct DedupWindow {
    entries: VecDeque<(u64, usize)>,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Position of the most recent entry with `signature` no further than
    /// `max_distance` before `position`.
    pub fn find(&self, signature: u64, position: usize, max_distance: usize) -> Option<usize> {
        self.entries
            .iter()
            .rev()
            .filter(|(sig, _)| *sig == signature)
            .map(|(_, pos)| *pos)
            .find(|pos| position.saturating_sub(*pos) <= max_distance)
    }

    /// Record a kept block, evicting the oldest entry when full.
    pub fn push(&mut self, signature: u64, position: usize) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((signature, position));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
