//! Writing a marked tree and reattaching its deferred payloads.
//!
//! - **Write**: the depth-bounded sequence goes out in chunks of at most
//!   `chunk_size` top-level blocks, the first with `create` and the rest
//!   with ordered appends.
//! - **Reattach**: persisted blocks carrying a token get the token stripped
//!   and their deferred children appended. Tokens inside a reattached payload
//!   are found by reading back the appended subtree and handled in the next
//!   wave. Markers within one wave are processed concurrently.
//! - **Sweep**: a full re-read that strips any token still present. It never
//!   deletes and always runs.
//!
//! Only a failed first chunk is fatal. Everything else degrades into the
//! per-phase reports.

use futures_util::future::join_all;

use crate::block::{ContentBlock, RichText, count_blocks, plain_text};
use crate::error::{PipelineError, PipelineResult, StoreError};
use crate::id::MarkerId;
use crate::marker::{MarkerMap, find_markers, strip_marker, strip_markers};
use crate::store::{
    BlockId, DocumentStore, ParentRef, PersistedNode, Properties, Retrier, read_tree,
};

// =============================================================================
// Reports
// =============================================================================

/// Outcome of the write phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Requests issued, the initial create included
    pub chunks: usize,
    pub failed_chunks: usize,
    /// Blocks persisted (descendants included)
    pub blocks_written: usize,
    /// Blocks lost with failed chunks (descendants included)
    pub blocks_lost: usize,
}

impl WriteReport {
    pub fn is_degraded(&self) -> bool {
        self.failed_chunks > 0
    }

    /// Fold a later write into this one.
    pub fn absorb(&mut self, other: WriteReport) {
        self.chunks += other.chunks;
        self.failed_chunks += other.failed_chunks;
        self.blocks_written += other.blocks_written;
        self.blocks_lost += other.blocks_lost;
    }
}

/// Outcome of the reattach phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReattachReport {
    pub reattached: usize,
    pub failed: Vec<MarkerId>,
    /// Markers whose token was never found in the persisted tree
    pub missing: Vec<MarkerId>,
    pub waves: usize,
    /// Blocks appended under marked blocks (descendants included)
    pub blocks_appended: usize,
}

impl ReattachReport {
    /// Any marker failed or was never found.
    pub fn orchestration_failed(&self) -> bool {
        !self.failed.is_empty() || !self.missing.is_empty()
    }
}

/// Outcome of the sweep phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub stripped: usize,
    pub failed: usize,
    /// The tree could not be read back at all
    pub read_failed: bool,
}

/// A persisted block whose text carries a marker token.
#[derive(Debug, Clone)]
struct TokenHit {
    marker: MarkerId,
    block: BlockId,
    rich_text: RichText,
}

fn collect_hits(nodes: &[PersistedNode], hits: &mut Vec<TokenHit>) {
    for root in nodes {
        root.visit(&mut |node| {
            for marker in find_markers(&plain_text(&node.block.rich_text)) {
                hits.push(TokenHit {
                    marker,
                    block: node.block.id.clone(),
                    rich_text: node.block.rich_text.clone(),
                });
            }
        });
    }
}

fn subtree_has_marker(block: &ContentBlock) -> bool {
    block
        .children
        .iter()
        .any(|c| !find_markers(&plain_text(&c.rich_text)).is_empty() || subtree_has_marker(c))
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives the store side of one run.
#[derive(Debug)]
pub struct Orchestrator<'a, S> {
    store: &'a S,
    retrier: &'a Retrier,
    chunk_size: usize,
}

impl<'a, S: DocumentStore> Orchestrator<'a, S> {
    pub fn new(store: &'a S, retrier: &'a Retrier, chunk_size: usize) -> Self {
        Self {
            store,
            retrier,
            chunk_size: chunk_size.max(1),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Phase B: write
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a document holding `blocks`.
    ///
    /// Returns [`PipelineError::InitialWrite`] if the first chunk cannot be
    /// persisted; in that case no document exists.
    pub async fn write(
        &self,
        parent: &ParentRef,
        properties: &Properties,
        blocks: &[ContentBlock],
    ) -> PipelineResult<(BlockId, WriteReport)> {
        let split = blocks.len().min(self.chunk_size);
        let (first, rest) = blocks.split_at(split);
        let (document, mut report) = self.create(parent, properties, first).await?;
        report.absorb(self.write_into(&document, rest).await);
        Ok((document, report))
    }

    /// Create a document holding at most one chunk of top-level blocks.
    pub async fn create(
        &self,
        parent: &ParentRef,
        properties: &Properties,
        first_chunk: &[ContentBlock],
    ) -> PipelineResult<(BlockId, WriteReport)> {
        let document = self
            .retrier
            .run("create", || self.store.create(parent, properties, first_chunk))
            .await
            .map_err(PipelineError::InitialWrite)?;

        tracing::info!(document = %document, blocks = first_chunk.len(), "created document");
        let report = WriteReport {
            chunks: 1,
            blocks_written: count_blocks(first_chunk),
            ..Default::default()
        };
        Ok((document, report))
    }

    /// Append `blocks` to an existing document. Every chunk failure degrades.
    pub async fn write_into(&self, document: &BlockId, blocks: &[ContentBlock]) -> WriteReport {
        let mut report = WriteReport::default();
        for chunk in blocks.chunks(self.chunk_size) {
            self.append_chunk(document, chunk, &mut report).await;
        }
        report
    }

    async fn append_chunk(&self, document: &BlockId, chunk: &[ContentBlock], report: &mut WriteReport) {
        report.chunks += 1;
        match self
            .retrier
            .run("append_children", || self.store.append_children(document, chunk))
            .await
        {
            Ok(_) => report.blocks_written += count_blocks(chunk),
            Err(err) => {
                report.failed_chunks += 1;
                report.blocks_lost += count_blocks(chunk);
                tracing::warn!(
                    document = %document,
                    chunk = report.chunks,
                    blocks = chunk.len(),
                    error = %err,
                    "chunk write failed, continuing"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Phase C: reattach
    // ─────────────────────────────────────────────────────────────────────────

    /// Reattach every payload in `map` under its persisted marker block.
    ///
    /// Payloads are taken out of the map as they are processed; whatever is
    /// left afterwards was never found and is reported as missing.
    pub async fn reattach(&self, document: &BlockId, map: &mut MarkerMap) -> ReattachReport {
        let mut report = ReattachReport::default();
        if map.is_empty() {
            return report;
        }

        let mut wave = Vec::new();
        match read_tree(self.store, self.retrier, document).await {
            Ok(tree) => collect_hits(&tree, &mut wave),
            Err(err) => tracing::warn!(document = %document, error = %err, "failed to scan for markers"),
        }

        while !wave.is_empty() {
            report.waves += 1;
            let jobs: Vec<(TokenHit, Vec<ContentBlock>)> = wave
                .drain(..)
                .filter_map(|hit| map.take(hit.marker).map(|payload| (hit, payload)))
                .collect();
            tracing::debug!(wave = report.waves, markers = jobs.len(), "reattaching");

            let results = join_all(jobs.iter().map(|(hit, payload)| self.reattach_one(hit, payload))).await;

            for ((hit, payload), result) in jobs.iter().zip(results) {
                match result {
                    Ok(nested) => {
                        report.reattached += 1;
                        report.blocks_appended += count_blocks(payload);
                        wave.extend(nested);
                    }
                    Err(err) => {
                        tracing::warn!(marker = %hit.marker, block = %hit.block, error = %err, "reattach failed");
                        report.failed.push(hit.marker);
                    }
                }
            }
        }

        report.missing = map.ids();
        for marker in &report.missing {
            tracing::warn!(marker = %marker, "marker never found in persisted tree");
        }
        tracing::info!(
            document = %document,
            reattached = report.reattached,
            failed = report.failed.len(),
            missing = report.missing.len(),
            waves = report.waves,
            "reattach complete"
        );
        report
    }

    /// Strip the token, append the payload, and return the tokens found in
    /// the appended subtree.
    async fn reattach_one(
        &self,
        hit: &TokenHit,
        payload: &[ContentBlock],
    ) -> Result<Vec<TokenHit>, StoreError> {
        let stripped = strip_marker(&hit.rich_text, hit.marker);
        self.retrier
            .run("update_block", || self.store.update_block(&hit.block, &stripped))
            .await?;

        let mut nested = Vec::new();
        for chunk in payload.chunks(self.chunk_size) {
            let ids = self
                .retrier
                .run("append_children", || self.store.append_children(&hit.block, chunk))
                .await?;

            for (id, block) in ids.iter().zip(chunk) {
                for marker in find_markers(&plain_text(&block.rich_text)) {
                    nested.push(TokenHit {
                        marker,
                        block: id.clone(),
                        rich_text: block.rich_text.clone(),
                    });
                }
                if subtree_has_marker(block) {
                    let subtree = read_tree(self.store, self.retrier, id).await?;
                    collect_hits(&subtree, &mut nested);
                }
            }
        }
        tracing::trace!(marker = %hit.marker, nested = nested.len(), "reattached payload");
        Ok(nested)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Phase D: sweep
    // ─────────────────────────────────────────────────────────────────────────

    /// Strip every remaining token from the persisted tree.
    pub async fn sweep(&self, document: &BlockId) -> SweepReport {
        let mut report = SweepReport::default();
        let tree = match read_tree(self.store, self.retrier, document).await {
            Ok(tree) => tree,
            Err(err) => {
                tracing::warn!(document = %document, error = %err, "sweep could not read document");
                report.read_failed = true;
                return report;
            }
        };

        let mut updates: Vec<(BlockId, RichText)> = Vec::new();
        for root in &tree {
            root.visit(&mut |node| {
                report.scanned += 1;
                if node.block.kind.is_text_bearing()
                    && let Some(stripped) = strip_markers(&node.block.rich_text)
                {
                    updates.push((node.block.id.clone(), stripped));
                }
            });
        }

        let results = join_all(updates.iter().map(|(id, text)| {
            self.retrier
                .run("update_block", move || self.store.update_block(id, text))
        }))
        .await;
        for ((id, _), result) in updates.iter().zip(results) {
            match result {
                Ok(()) => report.stripped += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(block = %id, error = %err, "sweep failed to strip token");
                }
            }
        }

        if report.stripped > 0 || report.failed > 0 {
            tracing::info!(
                document = %document,
                stripped = report.stripped,
                failed = report.failed,
                "sweep removed leftover tokens"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::tree_depth;
    use crate::id::RunSeed;
    use crate::marker::{Marker, contains_marker, token_run};
    use crate::store::{InMemoryStore, Operation, RetryPolicy, StoreLimits};

    fn parent() -> ParentRef {
        ParentRef::Database("db".into())
    }

    fn no_retry() -> Retrier {
        Retrier::new(RetryPolicy::none())
    }

    fn chain(len: usize) -> ContentBlock {
        let mut block = ContentBlock::bulleted(format!("level {len}"));
        for level in (1..len).rev() {
            block = ContentBlock::bulleted(format!("level {level}")).child(block);
        }
        block
    }

    fn snapshot_has_marker(blocks: &[ContentBlock]) -> bool {
        blocks
            .iter()
            .any(|b| contains_marker(&b.plain_text()) || snapshot_has_marker(&b.children))
    }

    #[tokio::test]
    async fn test_write_chunks_in_order() {
        let store = InMemoryStore::new();
        let retrier = no_retry();
        let orch = Orchestrator::new(&store, &retrier, 2);
        let blocks: Vec<_> = (0..5).map(|i| ContentBlock::paragraph(format!("p{i}"))).collect();

        let (doc, report) = orch.write(&parent(), &Properties::new(), &blocks).await.unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(report.blocks_written, 5);
        assert_eq!(store.calls(Operation::Append), 2);
        assert_eq!(store.snapshot(&doc), blocks);
    }

    #[tokio::test]
    async fn test_first_chunk_failure_is_fatal() {
        let store = InMemoryStore::new();
        store.fail_next(Operation::Create, StoreError::rejected("bad payload"));
        let retrier = no_retry();
        let orch = Orchestrator::new(&store, &retrier, 100);

        let err = orch
            .write(&parent(), &Properties::new(), &[ContentBlock::paragraph("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InitialWrite(_)));
        assert!(store.documents().is_empty());
    }

    #[tokio::test]
    async fn test_later_chunk_failure_degrades() {
        let store = InMemoryStore::new();
        store.fail_next(Operation::Append, StoreError::rejected("nope"));
        let retrier = no_retry();
        let orch = Orchestrator::new(&store, &retrier, 1);
        let blocks: Vec<_> = (0..3).map(|i| ContentBlock::paragraph(format!("p{i}"))).collect();

        let (doc, report) = orch.write(&parent(), &Properties::new(), &blocks).await.unwrap();
        assert!(report.is_degraded());
        assert_eq!(report.blocks_lost, 1);
        assert_eq!(store.snapshot(&doc), vec![blocks[0].clone(), blocks[2].clone()]);
    }

    #[tokio::test]
    async fn test_reattach_restores_deep_tree() {
        let store = InMemoryStore::new();
        let retrier = no_retry();
        let orch = Orchestrator::new(&store, &retrier, 100);
        let original = vec![chain(9), ContentBlock::paragraph("after")];

        let mut marked = Marker::new(3, RunSeed::fixed(1)).mark(original.clone());
        let (doc, _) = orch.write(&parent(), &Properties::new(), &marked.blocks).await.unwrap();
        let report = orch.reattach(&doc, &mut marked.map).await;

        assert!(!report.orchestration_failed());
        assert_eq!(report.reattached, 2);
        assert_eq!(report.waves, 2);
        assert!(marked.map.is_empty());

        let snapshot = store.snapshot(&doc);
        assert_eq!(tree_depth(&snapshot), 9);
        assert!(!snapshot_has_marker(&snapshot));
        assert_eq!(snapshot, original);
    }

    #[tokio::test]
    async fn test_failed_marker_does_not_block_others() {
        let store = InMemoryStore::new();
        let retrier = no_retry();
        let orch = Orchestrator::new(&store, &retrier, 100);
        let original = vec![chain(4), chain(4)];

        let mut marked = Marker::new(3, RunSeed::fixed(2)).mark(original);
        let (doc, _) = orch.write(&parent(), &Properties::new(), &marked.blocks).await.unwrap();
        store.fail_next(Operation::UpdateBlock, StoreError::rejected("locked"));
        let report = orch.reattach(&doc, &mut marked.map).await;

        assert!(report.orchestration_failed());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.reattached, 1);

        let sweep = orch.sweep(&doc).await;
        assert_eq!(sweep.stripped, 1);
        assert!(!snapshot_has_marker(&store.snapshot(&doc)));
    }

    #[tokio::test]
    async fn test_missing_marker_is_reported() {
        let store = InMemoryStore::new();
        let retrier = no_retry();
        let orch = Orchestrator::new(&store, &retrier, 100);
        let doc = store.insert_document(&[ContentBlock::paragraph("no tokens here")]);

        let mut map = MarkerMap::new();
        map.insert(MarkerId::from_raw(5), vec![ContentBlock::paragraph("lost")]);
        let report = orch.reattach(&doc, &mut map).await;
        assert_eq!(report.missing, vec![MarkerId::from_raw(5)]);
        assert!(report.orchestration_failed());
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent_and_never_deletes() {
        let store = InMemoryStore::with_limits(StoreLimits::default());
        let retrier = no_retry();
        let orch = Orchestrator::new(&store, &retrier, 100);
        let doc = store.insert_document(&[
            ContentBlock::paragraph("a").run(token_run(MarkerId::from_raw(1))),
            ContentBlock::toggle("b").child(ContentBlock::quote("c").run(token_run(MarkerId::from_raw(2)))),
        ]);

        let first = orch.sweep(&doc).await;
        assert_eq!(first.scanned, 3);
        assert_eq!(first.stripped, 2);
        let second = orch.sweep(&doc).await;
        assert_eq!(second.stripped, 0);

        let snapshot = store.snapshot(&doc);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].children[0].plain_text(), "c");
    }
}
