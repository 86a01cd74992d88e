//! The conversion pipeline.
//!
//! One run takes a [`SourceDocument`] through these phases:
//!
//! 1. **Dedup**: repeated blocks removed, blocks without a kind dropped
//! 2. **Mark**: subtrees below the depth limit excised into a marker map
//! 3. **Write**: the bounded tree persisted in chunks
//! 4. **Reattach**: deferred payloads appended under their marked blocks
//! 5. **Sweep**: leftover tokens stripped
//! 6. **Settle**: a wait proportional to the amount written
//! 7. **Validate**: the tree read back and compared against the source
//! 8. **Persist**: validation metadata written as document properties
//!
//! Only a failed first write (or, when replacing, a failed listing of the
//! existing blocks) is returned as an error. Every later failure ends up in
//! the [`RunReport`] and the [`ValidationResult`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use blockwright::block::ContentBlock;
//! use blockwright::store::{InMemoryStore, ParentRef};
//! use blockwright::{Pipeline, PipelineConfig, SourceDocument};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let store = Arc::new(InMemoryStore::new());
//! let pipeline = Pipeline::new(Arc::clone(&store), PipelineConfig::fast());
//!
//! let source = SourceDocument::from_blocks(
//!     "Guide",
//!     vec![ContentBlock::heading(1, "Install"), ContentBlock::paragraph("Run the installer.")],
//! );
//! let outcome = pipeline.run(source, &ParentRef::Page("root".into())).await.unwrap();
//! assert!(outcome.validation.passed);
//! assert_eq!(store.snapshot(&outcome.document_id).len(), 2);
//! # });
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::block::{ContentBlock, count_blocks};
use crate::config::PipelineConfig;
use crate::dedup::{DedupStats, Deduplicator};
use crate::error::{PipelineError, PipelineResult, ValidationError};
use crate::id::RunSeed;
use crate::marker::{MarkStats, Marked, Marker, MarkerMap};
use crate::orchestrator::{Orchestrator, ReattachReport, SweepReport, WriteReport};
use crate::source::SourceDocument;
use crate::store::{
    BlockId, DeleteReport, DocumentStore, ParentRef, PersistedNode, Retrier, clear_children,
    read_tree,
};
use crate::validate::{
    NoopOrderDetector, OrderIssueDetector, RunFlags, ValidationResult, Validator,
    metadata_properties,
};

// =============================================================================
// Results
// =============================================================================

/// Everything a run did, phase by phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub dedup: DedupStats,
    pub marks: MarkStats,
    pub write: WriteReport,
    pub reattach: ReattachReport,
    pub sweep: SweepReport,
    /// Present when an existing document was replaced
    pub cleared: Option<DeleteReport>,
    /// Backoff sleeps taken across all store calls
    pub retries: usize,
    /// Store calls that ran out of retry budget
    pub retries_exhausted: usize,
    /// Validation failed once and was repeated after a delay
    pub revalidated: bool,
    pub metadata_persisted: bool,
    /// Where the raw source was captured after a failed validation
    pub captured: Option<PathBuf>,
    /// Extractor warnings plus anything the run itself noticed
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn orchestration_failed(&self) -> bool {
        self.reattach.orchestration_failed()
    }

    /// Some write, reattach, sweep or delete step did not complete.
    pub fn is_degraded(&self) -> bool {
        self.write.is_degraded()
            || self.orchestration_failed()
            || self.sweep.failed > 0
            || self.sweep.read_failed
            || self.cleared.as_ref().is_some_and(|c| !c.is_complete())
    }
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub document_id: BlockId,
    pub validation: ValidationResult,
    pub report: RunReport,
}

/// A document whose first chunk is persisted and whose remaining phases
/// run on a background task.
#[derive(Debug)]
pub struct Created {
    pub document_id: BlockId,
    pub completion: JoinHandle<PipelineOutcome>,
}

// =============================================================================
// Pipeline
// =============================================================================

/// Converts source documents into a [`DocumentStore`].
///
/// A pipeline is cheap to share: the store and detector sit behind `Arc`s
/// and every run gets its own retry counters.
#[derive(Debug)]
pub struct Pipeline<S, D = NoopOrderDetector> {
    store: Arc<S>,
    config: PipelineConfig,
    detector: Arc<D>,
    seed: Option<RunSeed>,
}

impl<S: DocumentStore> Pipeline<S> {
    pub fn new(store: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            store,
            config,
            detector: Arc::new(NoopOrderDetector),
            seed: None,
        }
    }
}

impl<S: DocumentStore, D: OrderIssueDetector> Pipeline<S, D> {
    /// Use a custom order-issue detector during validation.
    pub fn with_detector<D2: OrderIssueDetector>(self, detector: D2) -> Pipeline<S, D2> {
        Pipeline {
            store: self.store,
            config: self.config,
            detector: Arc::new(detector),
            seed: self.seed,
        }
    }

    /// Derive marker IDs from a fixed seed instead of the title and clock.
    pub fn with_seed(mut self, seed: RunSeed) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Create a new document under `parent` and run every phase to the end.
    pub async fn run(&self, source: SourceDocument, parent: &ParentRef) -> PipelineResult<PipelineOutcome> {
        let Prepared {
            run,
            source,
            marked,
            mut report,
        } = self.prepare(source)?;

        let (document, write) = run
            .orchestrator()
            .write(parent, &source.create_properties(), &marked.blocks)
            .await?;
        report.write = write;
        Ok(run.complete(document, source, marked.map, report).await)
    }

    /// Create a new document and return as soon as its first chunk is
    /// persisted. The remaining chunks and every later phase run on a
    /// spawned task whose handle is returned in [`Created`].
    pub async fn spawn(&self, source: SourceDocument, parent: &ParentRef) -> PipelineResult<Created>
    where
        S: 'static,
        D: 'static,
    {
        let Prepared {
            run,
            source,
            marked,
            mut report,
        } = self.prepare(source)?;
        let Marked { mut blocks, map, .. } = marked;
        let rest = blocks.split_off(blocks.len().min(self.config.marker.chunk_size));

        let (document_id, write) = run
            .orchestrator()
            .create(parent, &source.create_properties(), &blocks)
            .await?;
        report.write = write;

        let document = document_id.clone();
        let completion = tokio::spawn(async move {
            let appended = run.orchestrator().write_into(&document, &rest).await;
            report.write.absorb(appended);
            run.complete(document, source, map, report).await
        });
        Ok(Created {
            document_id,
            completion,
        })
    }

    /// Replace the content of an existing document in place.
    ///
    /// Every existing top-level block is deleted first, then the new tree is
    /// written and the usual phases follow. The document keeps its ID.
    pub async fn replace(&self, document: &BlockId, source: SourceDocument) -> PipelineResult<PipelineOutcome> {
        let Prepared {
            run,
            source,
            marked,
            mut report,
        } = self.prepare(source)?;

        let cleared = clear_children(
            &*run.store,
            &run.retrier,
            document,
            self.config.delete_concurrency,
        )
        .await
        .map_err(|source| PipelineError::Clear {
            document: document.clone(),
            source,
        })?;
        if !cleared.is_complete() {
            tracing::warn!(document = %document, failed = cleared.failed.len(), "some old blocks were not deleted");
            report
                .warnings
                .push(format!("{} old block(s) could not be deleted", cleared.failed.len()));
        }
        report.cleared = Some(cleared);

        let properties = source.create_properties();
        if let Err(err) = run
            .retrier
            .run("update_properties", || run.store.update_properties(document, &properties))
            .await
        {
            tracing::warn!(document = %document, error = %err, "could not update document properties");
        }

        report.write = run.orchestrator().write_into(document, &marked.blocks).await;
        Ok(run.complete(document.clone(), source, marked.map, report).await)
    }

    /// Dedup and mark. Pure apart from logging.
    fn prepare(&self, mut source: SourceDocument) -> PipelineResult<Prepared<S, D>> {
        self.config.validate()?;

        let mut report = RunReport {
            warnings: std::mem::take(&mut source.warnings),
            ..Default::default()
        };
        let mut blocks = std::mem::take(&mut source.blocks);
        if self.config.dedup.enabled {
            let (deduped, stats) = Deduplicator::new(&self.config.dedup).dedupe(blocks);
            blocks = deduped;
            report.dedup = stats;
        } else {
            report.dedup.malformed = drop_malformed(&mut blocks);
        }
        source.refresh_derived(&blocks);
        if report.dedup.malformed > 0 {
            report
                .warnings
                .push(format!("{} block(s) without a kind were dropped", report.dedup.malformed));
        }

        let seed = self
            .seed
            .unwrap_or_else(|| RunSeed::for_document(&source.title));
        let marked = Marker::new(self.config.marker.max_depth, seed).mark(blocks);
        report.marks = marked.stats;
        if marked.stats.unmarkable > 0 {
            report.warnings.push(format!(
                "{} block(s) nest deeper than {} levels and cannot carry a marker",
                marked.stats.unmarkable, self.config.marker.max_depth
            ));
        }

        tracing::info!(
            title = %source.title,
            blocks = count_blocks(&marked.blocks),
            removed = report.dedup.removed,
            markers = marked.stats.markers,
            deferred = marked.stats.deferred_blocks,
            "prepared document"
        );

        let run = RunContext {
            store: Arc::clone(&self.store),
            retrier: Retrier::new(self.config.retry.clone()),
            validator: Validator::new(self.config.validator.clone()).with_detector(Arc::clone(&self.detector)),
            config: self.config.clone(),
        };
        Ok(Prepared {
            run,
            source,
            marked,
            report,
        })
    }
}

/// Remove blocks without a kind at every level, returning how many went.
fn drop_malformed(blocks: &mut Vec<ContentBlock>) -> usize {
    let before = blocks.len();
    blocks.retain(|b| !b.is_malformed());
    let mut dropped = before - blocks.len();
    for block in blocks.iter_mut() {
        dropped += drop_malformed(&mut block.children);
    }
    dropped
}

// =============================================================================
// One run
// =============================================================================

struct Prepared<S, D> {
    run: RunContext<S, D>,
    source: SourceDocument,
    marked: Marked,
    report: RunReport,
}

/// State owned by one run, movable onto a spawned task.
struct RunContext<S, D> {
    store: Arc<S>,
    retrier: Retrier,
    validator: Validator<Arc<D>>,
    config: PipelineConfig,
}

impl<S: DocumentStore, D: OrderIssueDetector> RunContext<S, D> {
    fn orchestrator(&self) -> Orchestrator<'_, S> {
        Orchestrator::new(&*self.store, &self.retrier, self.config.marker.chunk_size)
    }

    /// Reattach, sweep, settle, validate, persist.
    async fn complete(
        self,
        document: BlockId,
        source: SourceDocument,
        mut map: MarkerMap,
        mut report: RunReport,
    ) -> PipelineOutcome {
        let orchestrator = self.orchestrator();
        report.reattach = orchestrator.reattach(&document, &mut map).await;
        report.sweep = orchestrator.sweep(&document).await;

        let written = report.write.blocks_written + report.reattach.blocks_appended;
        let delay = self.config.settle.delay_for(report.marks.markers, written);
        if !delay.is_zero() {
            tracing::debug!(document = %document, delay_ms = delay.as_millis() as u64, "settling");
            tokio::time::sleep(delay).await;
        }

        let flags = RunFlags {
            orchestration_failed: report.orchestration_failed(),
        };
        let mut validation = self.validate(&document, &source, flags).await;
        if validation.has_hard_errors() {
            let delay = self.config.settle.revalidate_delay();
            tracing::info!(
                document = %document,
                errors = validation.errors.len(),
                delay_ms = delay.as_millis() as u64,
                "validation failed, revalidating once"
            );
            tokio::time::sleep(delay).await;
            validation = self.validate(&document, &source, flags).await;
            report.revalidated = true;
        }

        if self.config.persist_metadata {
            report.metadata_persisted = self.persist_metadata(&document, &validation).await;
        }
        if !validation.passed {
            report.captured = self.capture(&document, &source).await;
        }
        report.retries = self.retrier.retries();
        report.retries_exhausted = self.retrier.exhausted();

        tracing::info!(
            document = %document,
            status = validation.status.as_str(),
            coverage = validation.coverage.coverage,
            degraded = report.is_degraded(),
            retries = report.retries,
            "run complete"
        );
        PipelineOutcome {
            document_id: document,
            validation,
            report,
        }
    }

    async fn validate(&self, document: &BlockId, source: &SourceDocument, flags: RunFlags) -> ValidationResult {
        match read_tree(&*self.store, &self.retrier, document).await {
            Ok(nodes) => {
                let tree = PersistedNode::to_content_tree(&nodes);
                self.validator
                    .validate_run(&source.text, &tree, &source.structural_counts, flags)
            }
            Err(err) => {
                tracing::error!(document = %document, error = %err, "could not read document back");
                ValidationResult::from_error(&ValidationError::ReadBack(err))
            }
        }
    }

    async fn persist_metadata(&self, document: &BlockId, validation: &ValidationResult) -> bool {
        let properties = metadata_properties(validation, self.config.validator.max_reported_spans);
        match self
            .retrier
            .run("update_properties", || self.store.update_properties(document, &properties))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(document = %document, error = %err, "could not persist validation metadata");
                false
            }
        }
    }

    /// Write the raw source next to other failures for later inspection.
    async fn capture(&self, document: &BlockId, source: &SourceDocument) -> Option<PathBuf> {
        let dir = self.config.capture_dir.as_ref()?;
        let raw = source.raw.as_deref()?;
        let path = dir.join(format!("{}.html", file_stem(document)));

        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, raw).await
        }
        .await;
        match written {
            Ok(()) => {
                tracing::info!(document = %document, path = %path.display(), "captured failed source");
                Some(path)
            }
            Err(err) => {
                tracing::warn!(document = %document, error = %err, "could not capture failed source");
                None
            }
        }
    }
}

fn file_stem(id: &BlockId) -> String {
    id.as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{MediaSource, tree_depth};
    use crate::error::StoreError;
    use crate::marker::contains_marker;
    use crate::store::{InMemoryStore, Operation};
    use crate::validate::{Inversion, ValidationStatus, detector_fn};

    fn parent() -> ParentRef {
        ParentRef::Page("root".into())
    }

    fn pipeline(store: &Arc<InMemoryStore>) -> Pipeline<InMemoryStore> {
        Pipeline::new(Arc::clone(store), PipelineConfig::fast()).with_seed(RunSeed::fixed(42))
    }

    fn deep(levels: usize) -> ContentBlock {
        let mut block = ContentBlock::paragraph(format!("level {levels} holds the deepest detail"));
        for level in (1..levels).rev() {
            block = ContentBlock::bulleted(format!("level {level} of the outline")).child(block);
        }
        block
    }

    fn no_markers(blocks: &[ContentBlock]) -> bool {
        blocks
            .iter()
            .all(|b| !contains_marker(&b.plain_text()) && no_markers(&b.children))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_restores_deep_tree() {
        let store = Arc::new(InMemoryStore::new());
        let blocks = vec![ContentBlock::heading(1, "Outline"), deep(6)];
        let source = SourceDocument::from_blocks("Outline", blocks.clone());

        let outcome = pipeline(&store).run(source, &parent()).await.unwrap();
        assert_eq!(outcome.validation.status, ValidationStatus::Passed);
        assert_eq!(outcome.report.marks.markers, 1);
        assert_eq!(outcome.report.reattach.reattached, 1);

        let snapshot = store.snapshot(&outcome.document_id);
        assert_eq!(tree_depth(&snapshot), 6);
        assert!(no_markers(&snapshot));
        assert_eq!(snapshot, blocks);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_dedups_before_writing() {
        let store = Arc::new(InMemoryStore::new());
        let image = ContentBlock::image(MediaSource::External {
            url: "https://example.com/a.png".into(),
        });
        let source = SourceDocument::from_blocks(
            "Dup",
            vec![
                ContentBlock::paragraph("Same text"),
                ContentBlock::paragraph("Same text"),
                image.clone(),
                ContentBlock::paragraph("Other text"),
                image,
            ],
        );

        let outcome = pipeline(&store).run(source, &parent()).await.unwrap();
        assert_eq!(outcome.report.dedup.removed, 2);
        assert_eq!(store.snapshot(&outcome.document_id).len(), 3);
        assert_eq!(outcome.validation.status, ValidationStatus::Passed, "{:?}", outcome.validation.errors);
        assert!(!outcome.report.revalidated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_write_failure_is_returned() {
        let store = Arc::new(InMemoryStore::new());
        store.fail_next(Operation::Create, StoreError::rejected("invalid payload"));
        let source = SourceDocument::from_blocks("X", vec![ContentBlock::paragraph("x")]);

        let err = pipeline(&store).run(source, &parent()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InitialWrite(StoreError::Rejected(_))));
        assert!(store.documents().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_validation_revalidates_once() {
        let store = Arc::new(InMemoryStore::new());
        let source = SourceDocument::from_blocks("Short", vec![ContentBlock::paragraph("only this")])
            .with_text("only this and a great deal of text that was never extracted into any block at all");

        let outcome = pipeline(&store).run(source, &parent()).await.unwrap();
        assert_eq!(outcome.validation.status, ValidationStatus::Failed);
        assert!(outcome.report.revalidated);
        assert!(outcome.report.metadata_persisted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_errors_surface_before_any_write() {
        let store = Arc::new(InMemoryStore::new());
        let mut config = PipelineConfig::fast();
        config.marker.max_depth = 0;
        let pipeline = Pipeline::new(Arc::clone(&store), config);

        let err = pipeline
            .run(SourceDocument::from_blocks("X", vec![]), &parent())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert_eq!(store.calls(Operation::Create), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detector_downgrades_to_warning() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(&store).with_detector(detector_fn(|_: &str, _: &[ContentBlock]| {
            vec![Inversion::new("a", "b")]
        }));
        let source = SourceDocument::from_blocks("W", vec![ContentBlock::paragraph("text")]);

        let outcome = pipeline.run(source, &parent()).await.unwrap();
        assert_eq!(outcome.validation.status, ValidationStatus::Warning);
        assert!(!outcome.report.revalidated);
    }

    #[test]
    fn test_drop_malformed_nested() {
        let mut blocks = vec![
            ContentBlock::toggle("keep").child(ContentBlock::default()),
            ContentBlock::default(),
        ];
        assert_eq!(drop_malformed(&mut blocks), 2);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].children.is_empty());
    }

    #[test]
    fn test_file_stem_is_path_safe() {
        assert_eq!(file_stem(&BlockId::new("doc/1:a")), "doc_1_a");
    }
}
