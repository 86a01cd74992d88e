//! End-to-end runs against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use blockwright::block::tree_depth;
use blockwright::marker::contains_marker;
use blockwright::prelude::*;
use blockwright::store::Operation;
use blockwright::validate::VALIDATION_PROPERTY;

fn parent() -> ParentRef {
    ParentRef::Page("workspace".into())
}

fn pipeline(store: &Arc<InMemoryStore>) -> Pipeline<InMemoryStore> {
    Pipeline::new(Arc::clone(store), PipelineConfig::fast()).with_seed(RunSeed::fixed(7))
}

fn no_markers(blocks: &[ContentBlock]) -> bool {
    blocks
        .iter()
        .all(|b| !contains_marker(&b.plain_text()) && no_markers(&b.children))
}

/// A numbered step at depth 3 with two children one level below.
fn procedure() -> Vec<ContentBlock> {
    vec![
        ContentBlock::heading(1, "Configure discovery"),
        ContentBlock::numbered("Open the console").child(
            ContentBlock::bulleted("Choose a scope").child(
                ContentBlock::numbered("Select the subnet")
                    .child(ContentBlock::paragraph("Use the CIDR notation for ranges."))
                    .child(ContentBlock::paragraph("Exclude printers from the range.")),
            ),
        ),
        ContentBlock::paragraph("Discovery then runs on a schedule."),
    ]
}

#[tokio::test(start_paused = true)]
async fn deep_node_keeps_both_children_in_order() {
    let store = Arc::new(InMemoryStore::new());
    let blocks = procedure();

    let outcome = pipeline(&store)
        .run(SourceDocument::from_blocks("Discovery", blocks.clone()), &parent())
        .await
        .unwrap();

    assert_eq!(outcome.validation.status, ValidationStatus::Passed, "{:?}", outcome.validation.errors);
    assert_eq!(outcome.report.marks.markers, 1);
    assert_eq!(outcome.report.marks.deferred_blocks, 2);
    assert_eq!(outcome.report.reattach.blocks_appended, 2);
    assert!(!outcome.report.is_degraded());

    let snapshot = store.snapshot(&outcome.document_id);
    assert_eq!(tree_depth(&snapshot), 4);
    assert!(no_markers(&snapshot));
    assert_eq!(snapshot, blocks);
}

#[tokio::test(start_paused = true)]
async fn column_layout_under_a_toggle_is_deferred_whole() {
    let store = Arc::new(InMemoryStore::new());
    let blocks = vec![ContentBlock::toggle("Platform notes").child(
        ContentBlock::new(BlockKind::ColumnList).child(
            ContentBlock::new(BlockKind::Column)
                .child(ContentBlock::paragraph("Linux hosts need the agent package.")),
        ),
    )];

    let outcome = pipeline(&store)
        .run(SourceDocument::from_blocks("Platforms", blocks.clone()), &parent())
        .await
        .unwrap();

    assert_eq!(outcome.validation.status, ValidationStatus::Passed, "{:?}", outcome.validation.errors);
    assert_eq!(outcome.report.marks.markers, 1);
    assert_eq!(outcome.report.marks.unmarkable, 0);
    let snapshot = store.snapshot(&outcome.document_id);
    assert!(no_markers(&snapshot));
    assert_eq!(snapshot, blocks);
}

#[tokio::test(start_paused = true)]
async fn rate_limits_are_retried_transparently() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_times(
        Operation::Append,
        StoreError::RateLimited {
            retry_after: Some(Duration::from_secs(2)),
        },
        3,
    );

    let outcome = pipeline(&store)
        .run(SourceDocument::from_blocks("Discovery", procedure()), &parent())
        .await
        .unwrap();

    assert!(outcome.validation.passed);
    assert_eq!(outcome.report.retries, 3);
    assert_eq!(outcome.report.retries_exhausted, 0);
    assert_eq!(store.snapshot(&outcome.document_id), procedure());
}

#[tokio::test(start_paused = true)]
async fn replace_swaps_content_in_place() {
    let store = Arc::new(InMemoryStore::new());
    let pipeline = pipeline(&store);
    let first = pipeline
        .run(SourceDocument::from_blocks("Discovery", procedure()), &parent())
        .await
        .unwrap();

    let revised = vec![
        ContentBlock::heading(1, "Configure discovery"),
        ContentBlock::paragraph("Discovery is now configured from the wizard."),
    ];
    let second = pipeline
        .replace(&first.document_id, SourceDocument::from_blocks("Discovery v2", revised.clone()))
        .await
        .unwrap();

    assert_eq!(second.document_id, first.document_id);
    assert!(second.validation.passed, "{:?}", second.validation.errors);
    let cleared = second.report.cleared.as_ref().unwrap();
    assert_eq!(cleared.deleted, 3);
    assert!(cleared.is_complete());
    assert_eq!(store.snapshot(&first.document_id), revised);
    assert_eq!(store.documents().len(), 1);
    assert_eq!(
        store.properties(&first.document_id)["Name"],
        PropertyValue::Title("Discovery v2".into())
    );
}

#[tokio::test(start_paused = true)]
async fn replace_of_unknown_document_fails_before_writing() {
    let store = Arc::new(InMemoryStore::new());
    let err = pipeline(&store)
        .replace(&BlockId::new("missing"), SourceDocument::from_blocks("X", procedure()))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Clear { .. }));
    assert_eq!(store.calls(Operation::Append), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_reattach_fails_validation() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_next(Operation::UpdateBlock, StoreError::rejected("block is locked"));

    let outcome = pipeline(&store)
        .run(SourceDocument::from_blocks("Discovery", procedure()), &parent())
        .await
        .unwrap();

    assert!(outcome.report.orchestration_failed());
    assert!(outcome.validation.orchestration_failed);
    assert_eq!(outcome.validation.status, ValidationStatus::Failed);
    assert!(outcome.report.revalidated);
    assert!(no_markers(&store.snapshot(&outcome.document_id)));
    assert_eq!(outcome.validation.marker_leaks, 0);
}

#[tokio::test(start_paused = true)]
async fn spawn_returns_after_first_chunk() {
    let store = Arc::new(InMemoryStore::new());
    let mut config = PipelineConfig::fast();
    config.marker.chunk_size = 1;
    let pipeline = Pipeline::new(Arc::clone(&store), config).with_seed(RunSeed::fixed(3));

    let created = pipeline
        .spawn(SourceDocument::from_blocks("Discovery", procedure()), &parent())
        .await
        .unwrap();
    assert_eq!(store.calls(Operation::Create), 1);

    let outcome = created.completion.await.unwrap();
    assert_eq!(outcome.document_id, created.document_id);
    assert!(outcome.validation.passed, "{:?}", outcome.validation.errors);
    assert_eq!(outcome.report.write.chunks, 3);
    assert_eq!(store.snapshot(&created.document_id), procedure());
}

#[tokio::test(start_paused = true)]
async fn malformed_blocks_are_dropped_with_a_warning() {
    let store = Arc::new(InMemoryStore::new());
    let mut blocks = procedure();
    blocks.insert(1, ContentBlock::default());
    let source = SourceDocument::from_blocks("Discovery", blocks);

    let outcome = pipeline(&store).run(source, &parent()).await.unwrap();
    assert_eq!(outcome.report.dedup.malformed, 1);
    assert!(outcome.report.warnings.iter().any(|w| w.contains("without a kind")));
    assert_eq!(store.snapshot(&outcome.document_id), procedure());
}

#[tokio::test(start_paused = true)]
async fn validation_metadata_is_written_to_the_document() {
    let store = Arc::new(InMemoryStore::new());
    let outcome = pipeline(&store)
        .run(SourceDocument::from_blocks("Discovery", procedure()), &parent())
        .await
        .unwrap();

    let props = store.properties(&outcome.document_id);
    assert!(outcome.report.metadata_persisted);
    assert!(props[VALIDATION_PROPERTY].as_str().starts_with("PASSED"));
    assert!(props["Stats"].as_str().contains("headings: 1 → 1"));
}

#[tokio::test]
async fn failed_source_is_captured() {
    let dir = std::env::temp_dir().join(format!("blockwright-capture-{}", std::process::id()));
    let mut config = PipelineConfig::fast();
    config.capture_dir = Some(dir.clone());
    let store = Arc::new(InMemoryStore::new());
    let pipeline = Pipeline::new(Arc::clone(&store), config);

    let raw = "<h1>Configure discovery</h1>\
               <p>Discovery finds every device on the network and records its address.</p>\
               <p>This whole paragraph never made it into the extracted blocks, so the \
               converted document is missing a large share of its text.</p>";
    let source = SourceDocument::from_html(
        "Discovery",
        raw,
        vec![
            ContentBlock::heading(1, "Configure discovery"),
            ContentBlock::paragraph("Discovery finds every device on the network and records its address."),
        ],
    );

    let outcome = pipeline.run(source, &parent()).await.unwrap();
    assert!(!outcome.validation.passed);
    let path = outcome.report.captured.clone().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), raw);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test(start_paused = true)]
async fn html_source_matching_its_blocks_passes() {
    let store = Arc::new(InMemoryStore::new());
    let raw = r#"<nav><a href="/">Home</a></nav>
        <h1>Install</h1>
        <p>Run the installer &amp; follow the prompts.</p>
        <ul><li>Windows</li><li>macOS</li></ul>"#;
    let source = SourceDocument::from_html(
        "Install",
        raw,
        vec![
            ContentBlock::heading(1, "Install"),
            ContentBlock::paragraph("Run the installer & follow the prompts."),
            ContentBlock::bulleted("Windows"),
            ContentBlock::bulleted("macOS"),
        ],
    );

    let outcome = pipeline(&store).run(source, &parent()).await.unwrap();
    assert_eq!(outcome.validation.status, ValidationStatus::Passed, "{:?}", outcome.validation.errors);
    assert_eq!(outcome.validation.coverage.coverage, 1.0);
}
