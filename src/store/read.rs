//! Reading a persisted tree back from the store.
//!
//! Listing is breadth-first over a flat arena so that no recursive futures
//! are needed; the arena is then folded bottom-up into [`PersistedNode`]s.
//! Children always land after their parent in the arena, which is what makes
//! the reverse fold valid.

use crate::block::ContentBlock;
use crate::error::StoreError;

use super::{BlockId, DocumentStore, PersistedBlock, Retrier};

/// A persisted block with its children resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedNode {
    pub block: PersistedBlock,
    pub children: Vec<PersistedNode>,
}

impl PersistedNode {
    pub fn id(&self) -> &BlockId {
        &self.block.id
    }

    /// Convert the subtree into content blocks (store IDs dropped).
    pub fn to_content(&self) -> ContentBlock {
        let mut block = self.block.to_content();
        block.children = self.children.iter().map(PersistedNode::to_content).collect();
        block
    }

    /// Visit this node and every descendant in document order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a PersistedNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    /// Convert a persisted sequence into content blocks.
    pub fn to_content_tree(nodes: &[PersistedNode]) -> Vec<ContentBlock> {
        nodes.iter().map(PersistedNode::to_content).collect()
    }
}

/// List every direct child of `id`, following cursors.
pub(crate) async fn list_all<S: DocumentStore>(
    store: &S,
    retrier: &Retrier,
    id: &BlockId,
) -> Result<Vec<PersistedBlock>, StoreError> {
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = retrier
            .run("list_children", || store.list_children(id, cursor.as_deref()))
            .await?;
        items.extend(page.items);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }
}

/// Read the full persisted tree under `root`.
pub async fn read_tree<S: DocumentStore>(
    store: &S,
    retrier: &Retrier,
    root: &BlockId,
) -> Result<Vec<PersistedNode>, StoreError> {
    let mut arena: Vec<(PersistedBlock, Option<usize>)> = Vec::new();
    let mut roots = Vec::new();
    for block in list_all(store, retrier, root).await? {
        roots.push(arena.len());
        arena.push((block, None));
    }

    let mut next = 0;
    while next < arena.len() {
        if arena[next].0.has_children {
            let id = arena[next].0.id.clone();
            for block in list_all(store, retrier, &id).await? {
                arena.push((block, Some(next)));
            }
        }
        next += 1;
    }

    let mut child_index: Vec<Vec<usize>> = vec![Vec::new(); arena.len()];
    for (i, (_, parent)) in arena.iter().enumerate() {
        if let Some(p) = parent {
            child_index[*p].push(i);
        }
    }

    let mut built: Vec<Option<PersistedNode>> = (0..arena.len()).map(|_| None).collect();
    while let Some((block, _)) = arena.pop() {
        let i = arena.len();
        let children = child_index[i]
            .iter()
            .filter_map(|&c| built[c].take())
            .collect();
        built[i] = Some(PersistedNode { block, children });
    }

    Ok(roots.iter().filter_map(|&i| built[i].take()).collect())
}
