//! Batched deletion of a document's existing blocks (update-in-place).
//!
//! Deletes run in batches of at most `concurrency` calls awaited together,
//! which bounds the load on the store while still overlapping round-trips.

use futures_util::future::join_all;

use crate::error::StoreError;

use super::read::list_all;
use super::{BlockId, DocumentStore, Retrier};

/// Outcome of clearing a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
    pub failed: Vec<BlockId>,
    pub batches: usize,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every top-level block under `document`.
///
/// A failure to list the existing blocks is returned as an error, since
/// nothing has been changed yet. Individual delete failures are collected in
/// the report and do not stop the remaining batches.
pub async fn clear_children<S: DocumentStore>(
    store: &S,
    retrier: &Retrier,
    document: &BlockId,
    concurrency: usize,
) -> Result<DeleteReport, StoreError> {
    let existing = list_all(store, retrier, document).await?;
    let ids: Vec<BlockId> = existing.into_iter().map(|b| b.id).collect();
    let mut report = DeleteReport::default();

    for batch in ids.chunks(concurrency.max(1)) {
        report.batches += 1;
        let results = join_all(
            batch
                .iter()
                .map(|id| retrier.run("delete_block", move || store.delete_block(id))),
        )
        .await;

        for (id, result) in batch.iter().zip(results) {
            match result {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    tracing::warn!(block = %id, error = %err, "failed to delete block");
                    report.failed.push(id.clone());
                }
            }
        }
    }

    tracing::debug!(
        document = %document,
        deleted = report.deleted,
        failed = report.failed.len(),
        batches = report.batches,
        "cleared existing blocks"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ContentBlock;
    use crate::store::{InMemoryStore, Operation, RetryPolicy};

    #[tokio::test]
    async fn test_clears_in_bounded_batches() {
        let store = InMemoryStore::new();
        let blocks: Vec<_> = (0..25).map(|i| ContentBlock::paragraph(format!("p{i}"))).collect();
        let doc = store.insert_document(&blocks);

        let report = clear_children(&store, &Retrier::default(), &doc, 10).await.unwrap();
        assert_eq!(report.deleted, 25);
        assert_eq!(report.batches, 3);
        assert!(store.snapshot(&doc).is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_is_reported_not_fatal() {
        let store = InMemoryStore::new();
        let doc = store.insert_document(&[ContentBlock::paragraph("a"), ContentBlock::paragraph("b")]);
        store.fail_next(Operation::Delete, StoreError::rejected("locked"));

        let report = clear_children(&store, &Retrier::new(RetryPolicy::none()), &doc, 10)
            .await
            .unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.is_complete());
    }
}
