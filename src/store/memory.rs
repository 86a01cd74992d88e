//! In-memory document store.
//!
//! Enforces the same platform constraints as the real store (nesting depth
//! and blocks per request), paginates listings, and can be scripted to fail
//! specific operations, which is how the retry and degradation paths are
//! exercised in tests.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::block::{BlockData, BlockKind, ContentBlock, RichText, TextRun, tree_depth};
use crate::error::StoreError;

use super::{BlockId, ChildrenPage, DocumentStore, ParentRef, PersistedBlock, Properties};

// =============================================================================
// Configuration
// =============================================================================

/// Store operations, for fault scripting and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Append,
    List,
    Delete,
    UpdateBlock,
    UpdateProperties,
}

/// Platform constraints enforced on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum nesting depth of one request payload (top-level = 1)
    pub max_depth: usize,
    /// Maximum top-level blocks per create/append request
    pub max_chunk: usize,
    /// Items per `list_children` page
    pub page_size: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_chunk: 100,
            page_size: 100,
        }
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct Node {
    /// `None` for a document root
    kind: Option<BlockKind>,
    rich_text: RichText,
    data: BlockData,
    children: Vec<BlockId>,
    archived: bool,
}

#[derive(Debug, Default)]
struct State {
    nodes: FxHashMap<BlockId, Node>,
    properties: FxHashMap<BlockId, Properties>,
    documents: Vec<(BlockId, ParentRef)>,
    next_id: u64,
    faults: FxHashMap<Operation, VecDeque<StoreError>>,
    calls: FxHashMap<Operation, usize>,
}

impl State {
    fn begin(&mut self, op: Operation) -> Result<(), StoreError> {
        *self.calls.entry(op).or_default() += 1;
        match self.faults.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn alloc(&mut self, prefix: &str) -> BlockId {
        self.next_id += 1;
        BlockId::new(format!("{prefix}-{}", self.next_id))
    }

    fn live(&self, id: &BlockId) -> Result<&Node, StoreError> {
        match self.nodes.get(id) {
            Some(node) if !node.archived => Ok(node),
            _ => Err(StoreError::NotFound(id.clone())),
        }
    }

    fn insert_tree(&mut self, parent: &BlockId, blocks: &[ContentBlock]) -> Vec<BlockId> {
        let mut ids = Vec::with_capacity(blocks.len());
        for block in blocks {
            let id = self.alloc("blk");
            let child_ids = self.insert_tree(&id, &block.children);
            self.nodes.insert(
                id.clone(),
                Node {
                    kind: block.kind,
                    rich_text: block.rich_text.clone(),
                    data: block.data.clone(),
                    children: child_ids,
                    archived: false,
                },
            );
            ids.push(id);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.extend(ids.iter().cloned());
        }
        ids
    }

    fn live_children(&self, node: &Node) -> Vec<BlockId> {
        node.children
            .iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|n| !n.archived))
            .cloned()
            .collect()
    }

    fn snapshot(&self, id: &BlockId) -> Vec<ContentBlock> {
        let Ok(node) = self.live(id) else {
            return Vec::new();
        };
        self.live_children(node)
            .iter()
            .filter_map(|child_id| {
                let child = self.nodes.get(child_id)?;
                Some(ContentBlock {
                    kind: child.kind,
                    rich_text: child.rich_text.clone(),
                    children: self.snapshot(child_id),
                    data: child.data.clone(),
                })
            })
            .collect()
    }
}

fn validate_payload(chunk: &[ContentBlock], limits: &StoreLimits) -> Result<(), StoreError> {
    if chunk.len() > limits.max_chunk {
        return Err(StoreError::rejected(format!(
            "request holds {} blocks, limit is {}",
            chunk.len(),
            limits.max_chunk
        )));
    }
    let depth = tree_depth(chunk);
    if depth > limits.max_depth {
        return Err(StoreError::rejected(format!(
            "nesting depth {depth} exceeds limit {}",
            limits.max_depth
        )));
    }
    validate_blocks(chunk)
}

fn validate_blocks(blocks: &[ContentBlock]) -> Result<(), StoreError> {
    for block in blocks {
        let Some(kind) = block.kind else {
            return Err(StoreError::rejected("block without kind"));
        };
        if !block.children.is_empty() && !kind.is_nestable() {
            return Err(StoreError::rejected(format!("{kind} blocks cannot have children")));
        }
        validate_blocks(&block.children)?;
    }
    Ok(())
}

// =============================================================================
// InMemoryStore
// =============================================================================

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    limits: StoreLimits,
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_limits(StoreLimits::default())
    }

    pub fn with_limits(limits: StoreLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(State::default()),
        }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fault scripting
    // ─────────────────────────────────────────────────────────────────────────

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: Operation, err: StoreError) {
        self.fail_times(op, err, 1);
    }

    /// Make the next `times` calls of `op` fail with `err`.
    pub fn fail_times(&self, op: Operation, err: StoreError, times: usize) {
        let mut state = self.state.lock();
        let queue = state.faults.entry(op).or_default();
        queue.extend(std::iter::repeat_n(err, times));
    }

    /// Number of calls of `op` so far, failed ones included.
    pub fn calls(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// The live tree under `id` as content blocks.
    pub fn snapshot(&self, id: &BlockId) -> Vec<ContentBlock> {
        self.state.lock().snapshot(id)
    }

    /// Current properties of a document.
    pub fn properties(&self, id: &BlockId) -> Properties {
        self.state.lock().properties.get(id).cloned().unwrap_or_default()
    }

    /// IDs of all created documents, in creation order.
    pub fn documents(&self) -> Vec<BlockId> {
        self.state.lock().documents.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Seed a document directly, bypassing limits and fault scripting.
    pub fn insert_document(&self, blocks: &[ContentBlock]) -> BlockId {
        let mut state = self.state.lock();
        let id = state.alloc("doc");
        state.nodes.insert(
            id.clone(),
            Node {
                kind: None,
                rich_text: RichText::new(),
                data: BlockData::None,
                children: Vec::new(),
                archived: false,
            },
        );
        state.documents.push((id.clone(), ParentRef::Page("seed".into())));
        state.insert_tree(&id, blocks);
        id
    }
}

impl DocumentStore for InMemoryStore {
    async fn create(
        &self,
        parent: &ParentRef,
        properties: &Properties,
        first_chunk: &[ContentBlock],
    ) -> Result<BlockId, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.begin(Operation::Create)?;
        validate_payload(first_chunk, &self.limits)?;

        let id = state.alloc("doc");
        state.nodes.insert(
            id.clone(),
            Node {
                kind: None,
                rich_text: RichText::new(),
                data: BlockData::None,
                children: Vec::new(),
                archived: false,
            },
        );
        state.properties.insert(id.clone(), properties.clone());
        state.documents.push((id.clone(), parent.clone()));
        state.insert_tree(&id, first_chunk);
        Ok(id)
    }

    async fn append_children(
        &self,
        block_id: &BlockId,
        chunk: &[ContentBlock],
    ) -> Result<Vec<BlockId>, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.begin(Operation::Append)?;
        let target = state.live(block_id)?;
        if let Some(kind) = target.kind
            && !kind.is_nestable()
        {
            return Err(StoreError::rejected(format!("{kind} blocks cannot have children")));
        }
        validate_payload(chunk, &self.limits)?;
        Ok(state.insert_tree(block_id, chunk))
    }

    async fn list_children(
        &self,
        block_id: &BlockId,
        cursor: Option<&str>,
    ) -> Result<ChildrenPage, StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.begin(Operation::List)?;
        let node = state.live(block_id)?;
        let children = state.live_children(node);

        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| StoreError::rejected(format!("invalid cursor {c:?}")))?,
            None => 0,
        };
        let end = (start + self.limits.page_size).min(children.len());
        let items = children
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| {
                let child = state.nodes.get(id)?;
                Some(PersistedBlock {
                    id: id.clone(),
                    kind: child.kind?,
                    rich_text: child.rich_text.clone(),
                    data: child.data.clone(),
                    has_children: !state.live_children(child).is_empty(),
                })
            })
            .collect();
        let next_cursor = (end < children.len()).then(|| end.to_string());
        Ok(ChildrenPage { items, next_cursor })
    }

    async fn delete_block(&self, block_id: &BlockId) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.begin(Operation::Delete)?;
        match state.nodes.get_mut(block_id) {
            Some(node) => {
                node.archived = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(block_id.clone())),
        }
    }

    async fn update_block(
        &self,
        block_id: &BlockId,
        rich_text: &[TextRun],
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.begin(Operation::UpdateBlock)?;
        state.live(block_id)?;
        let Some(node) = state.nodes.get_mut(block_id) else {
            return Err(StoreError::NotFound(block_id.clone()));
        };
        match node.kind {
            Some(kind) if kind.is_text_bearing() => {
                node.rich_text = rich_text.iter().cloned().collect();
                Ok(())
            }
            _ => Err(StoreError::rejected("block has no editable text")),
        }
    }

    async fn update_properties(
        &self,
        id: &BlockId,
        properties: &Properties,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.begin(Operation::UpdateProperties)?;
        let node = state.live(id)?;
        if node.kind.is_some() {
            return Err(StoreError::rejected("properties can only be set on documents"));
        }
        let entry = state.properties.entry(id.clone()).or_default();
        entry.extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> ParentRef {
        ParentRef::Database("db".into())
    }

    #[tokio::test]
    async fn test_create_and_snapshot() {
        let store = InMemoryStore::new();
        let blocks = vec![
            ContentBlock::paragraph("intro"),
            ContentBlock::bulleted("a").child(ContentBlock::bulleted("b")),
        ];
        let doc = store.create(&parent(), &Properties::new(), &blocks).await.unwrap();
        assert_eq!(store.snapshot(&doc), blocks);
    }

    #[tokio::test]
    async fn test_rejects_too_deep_payload() {
        let store = InMemoryStore::with_limits(StoreLimits {
            max_depth: 2,
            ..Default::default()
        });
        let deep = vec![ContentBlock::bulleted("1").child(
            ContentBlock::bulleted("2").child(ContentBlock::bulleted("3")),
        )];
        let err = store.create(&parent(), &Properties::new(), &deep).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_rejects_oversized_chunk() {
        let store = InMemoryStore::with_limits(StoreLimits {
            max_chunk: 2,
            ..Default::default()
        });
        let blocks: Vec<_> = (0..3).map(|i| ContentBlock::paragraph(format!("p{i}"))).collect();
        assert!(store.create(&parent(), &Properties::new(), &blocks).await.is_err());
    }

    #[tokio::test]
    async fn test_pagination() {
        let store = InMemoryStore::with_limits(StoreLimits {
            page_size: 2,
            ..Default::default()
        });
        let blocks: Vec<_> = (0..5).map(|i| ContentBlock::paragraph(format!("p{i}"))).collect();
        let doc = store.insert_document(&blocks);

        let first = store.list_children(&doc, None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let last = store.list_children(&doc, Some("4")).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_scripted_faults_consume_in_order() {
        let store = InMemoryStore::new();
        store.fail_times(Operation::Create, StoreError::Conflict("busy".into()), 2);

        for _ in 0..2 {
            let err = store.create(&parent(), &Properties::new(), &[]).await.unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
        }
        assert!(store.create(&parent(), &Properties::new(), &[]).await.is_ok());
        assert_eq!(store.calls(Operation::Create), 3);
    }

    #[tokio::test]
    async fn test_delete_hides_subtree() {
        let store = InMemoryStore::new();
        let doc = store.insert_document(&[ContentBlock::paragraph("gone"), ContentBlock::paragraph("kept")]);
        let page = store.list_children(&doc, None).await.unwrap();
        store.delete_block(&page.items[0].id).await.unwrap();

        assert_eq!(store.snapshot(&doc), vec![ContentBlock::paragraph("kept")]);
    }
}
