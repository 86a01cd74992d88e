//! Document store client interface.
//!
//! The target store is an external collaborator. This module defines the
//! calls the pipeline makes against it ([`DocumentStore`]), the retry glue
//! wrapped around every call, a tree reader, the batched delete pool used by
//! update-in-place, and an in-memory store for tests and demos.
//!
//! # Suspension points
//!
//! Every method is an awaited round-trip. Implementations must be `Sync`:
//! reattachment of distinct markers and bulk deletes issue concurrent calls
//! against a shared reference.

mod delete;
mod memory;
mod read;
mod retry;

pub use delete::{DeleteReport, clear_children};
pub use memory::{InMemoryStore, Operation, StoreLimits};
pub use read::{PersistedNode, read_tree};
pub use retry::{BackoffStep, Retrier, RetryPolicy};

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::block::{BlockData, BlockKind, ContentBlock, RichText, TextRun};
use crate::error::StoreError;

// =============================================================================
// Identifiers and payload types
// =============================================================================

/// Store-assigned identifier of a block or document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(CompactString);

impl BlockId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(CompactString::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a new document is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    Database(String),
    Page(String),
}

/// A document property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Url(String),
    Select(String),
}

impl PropertyValue {
    /// The textual value regardless of property type.
    pub fn as_str(&self) -> &str {
        match self {
            PropertyValue::Title(s)
            | PropertyValue::RichText(s)
            | PropertyValue::Url(s)
            | PropertyValue::Select(s) => s,
        }
    }
}

/// Document properties keyed by property name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A block as returned by `list_children`: its own content plus whether it
/// has children to list.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedBlock {
    pub id: BlockId,
    pub kind: BlockKind,
    pub rich_text: RichText,
    pub data: BlockData,
    pub has_children: bool,
}

impl PersistedBlock {
    /// Convert to a childless content block.
    pub fn to_content(&self) -> ContentBlock {
        ContentBlock {
            kind: Some(self.kind),
            rich_text: self.rich_text.clone(),
            children: Vec::new(),
            data: self.data.clone(),
        }
    }
}

/// One page of `list_children` results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildrenPage {
    pub items: Vec<PersistedBlock>,
    pub next_cursor: Option<String>,
}

// =============================================================================
// DocumentStore
// =============================================================================

/// Calls the pipeline makes against the target store.
///
/// Any call may fail with [`StoreError::RateLimited`] or
/// [`StoreError::Conflict`]; callers route every call through a
/// [`Retrier`].
pub trait DocumentStore: Send + Sync {
    /// Create a document under `parent` holding `first_chunk` as its top-level blocks.
    fn create(
        &self,
        parent: &ParentRef,
        properties: &Properties,
        first_chunk: &[ContentBlock],
    ) -> impl Future<Output = Result<BlockId, StoreError>> + Send;

    /// Append `chunk` after the existing children of `block_id`, in order.
    /// Returns the IDs of the appended top-level blocks.
    fn append_children(
        &self,
        block_id: &BlockId,
        chunk: &[ContentBlock],
    ) -> impl Future<Output = Result<Vec<BlockId>, StoreError>> + Send;

    /// List one page of the direct children of `block_id`.
    fn list_children(
        &self,
        block_id: &BlockId,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<ChildrenPage, StoreError>> + Send;

    /// Delete (archive) a block and its subtree.
    fn delete_block(&self, block_id: &BlockId)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replace a block's own rich text.
    fn update_block(
        &self,
        block_id: &BlockId,
        rich_text: &[TextRun],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Merge `properties` into a document's properties.
    fn update_properties(
        &self,
        id: &BlockId,
        properties: &Properties,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

impl<S: DocumentStore> DocumentStore for Arc<S> {
    fn create(
        &self,
        parent: &ParentRef,
        properties: &Properties,
        first_chunk: &[ContentBlock],
    ) -> impl Future<Output = Result<BlockId, StoreError>> + Send {
        (**self).create(parent, properties, first_chunk)
    }

    fn append_children(
        &self,
        block_id: &BlockId,
        chunk: &[ContentBlock],
    ) -> impl Future<Output = Result<Vec<BlockId>, StoreError>> + Send {
        (**self).append_children(block_id, chunk)
    }

    fn list_children(
        &self,
        block_id: &BlockId,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<ChildrenPage, StoreError>> + Send {
        (**self).list_children(block_id, cursor)
    }

    fn delete_block(
        &self,
        block_id: &BlockId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).delete_block(block_id)
    }

    fn update_block(
        &self,
        block_id: &BlockId,
        rich_text: &[TextRun],
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).update_block(block_id, rich_text)
    }

    fn update_properties(
        &self,
        id: &BlockId,
        properties: &Properties,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).update_properties(id, properties)
    }
}
