//! Content blocks: the in-memory tree handed to the store.
//!
//! A [`ContentBlock`] mirrors one block of the target store. The tree is
//! owned exclusively by one pipeline run; nothing else mutates it.
//!
//! # Depth
//!
//! Depth is counted from the tree root: top-level blocks sit at depth 1,
//! their children at depth 2, and so on.

mod data;
mod text;

pub use data::{
    BlockData, BookmarkData, CalloutData, CodeData, ImageData, MediaSource, TableData,
    TableRowData,
};
pub use text::{Annotations, Color, RichText, TextRun, plain, plain_text};

use serde::{Deserialize, Serialize};

// =============================================================================
// BlockKind
// =============================================================================

/// Block kinds understood by the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedListItem,
    NumberedListItem,
    ToDo,
    Toggle,
    Quote,
    Callout,
    Code,
    Table,
    TableRow,
    Image,
    Divider,
    Bookmark,
    ColumnList,
    Column,
}

impl BlockKind {
    impl_kind_groups!(
        heading: Heading1 | Heading2 | Heading3,
        list_item: BulletedListItem | NumberedListItem | ToDo,
        nestable: Paragraph | BulletedListItem | NumberedListItem | ToDo | Toggle | Quote
            | Callout | Table | ColumnList | Column,
        text_bearing: Paragraph | Heading1 | Heading2 | Heading3 | BulletedListItem
            | NumberedListItem | ToDo | Toggle | Quote | Callout | Code,
    );

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading1 => "heading_1",
            BlockKind::Heading2 => "heading_2",
            BlockKind::Heading3 => "heading_3",
            BlockKind::BulletedListItem => "bulleted_list_item",
            BlockKind::NumberedListItem => "numbered_list_item",
            BlockKind::ToDo => "to_do",
            BlockKind::Toggle => "toggle",
            BlockKind::Quote => "quote",
            BlockKind::Callout => "callout",
            BlockKind::Code => "code",
            BlockKind::Table => "table",
            BlockKind::TableRow => "table_row",
            BlockKind::Image => "image",
            BlockKind::Divider => "divider",
            BlockKind::Bookmark => "bookmark",
            BlockKind::ColumnList => "column_list",
            BlockKind::Column => "column",
        }
    }

    /// Heading kind for a source level; levels beyond 3 are down-leveled.
    pub fn heading(level: u8) -> Self {
        match level {
            0 | 1 => BlockKind::Heading1,
            2 => BlockKind::Heading2,
            _ => BlockKind::Heading3,
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ContentBlock
// =============================================================================

/// One node of the block tree.
///
/// `kind` is optional only so that malformed producer output can be carried
/// into the deduplicator, which drops and counts such blocks. Everything
/// downstream of dedup sees a kind on every block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default)]
    pub kind: Option<BlockKind>,
    #[serde(default, skip_serializing_if = "RichText::is_empty")]
    pub rich_text: RichText,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "BlockData::is_none")]
    pub data: BlockData,
}

impl ContentBlock {
    /// Create an empty block of the given kind.
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Kind-specific constructors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Paragraph).text(text)
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self::new(BlockKind::heading(level)).text(text)
    }

    pub fn bulleted(text: impl Into<String>) -> Self {
        Self::new(BlockKind::BulletedListItem).text(text)
    }

    pub fn numbered(text: impl Into<String>) -> Self {
        Self::new(BlockKind::NumberedListItem).text(text)
    }

    pub fn toggle(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Toggle).text(text)
    }

    pub fn quote(text: impl Into<String>) -> Self {
        Self::new(BlockKind::Quote).text(text)
    }

    pub fn divider() -> Self {
        Self::new(BlockKind::Divider)
    }

    pub fn callout(text: impl Into<String>, icon: Option<&str>, color: Color) -> Self {
        let mut block = Self::new(BlockKind::Callout).text(text);
        block.data = BlockData::Callout(CalloutData {
            icon: icon.map(str::to_owned),
            color,
        });
        block
    }

    pub fn code(text: impl Into<String>, language: impl Into<String>) -> Self {
        let mut block = Self::new(BlockKind::Code).text(text);
        block.data = BlockData::Code(CodeData {
            language: language.into(),
        });
        block
    }

    pub fn image(source: MediaSource) -> Self {
        let mut block = Self::new(BlockKind::Image);
        block.data = BlockData::Image(ImageData {
            source,
            caption: RichText::new(),
        });
        block
    }

    /// Build a table from rows of plain cell strings. Width is the widest row.
    pub fn table<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let rows: Vec<ContentBlock> = rows.into_iter().map(Self::table_row).collect();
        let width = rows
            .iter()
            .filter_map(|r| r.data.as_table_row())
            .map(|r| r.cells.len())
            .max()
            .unwrap_or(0);
        let mut block = Self::new(BlockKind::Table);
        block.data = BlockData::Table(TableData {
            width,
            has_column_header: false,
            has_row_header: false,
        });
        block.children = rows;
        block
    }

    pub fn table_row<C>(cells: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut block = Self::new(BlockKind::TableRow);
        block.data = BlockData::TableRow(TableRowData {
            cells: cells.into_iter().map(plain).collect(),
        });
        block
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a plain text run.
    pub fn text(mut self, content: impl Into<String>) -> Self {
        self.rich_text.push(TextRun::plain(content));
        self
    }

    /// Append a formatted text run.
    pub fn run(mut self, run: TextRun) -> Self {
        self.rich_text.push(run);
        self
    }

    /// Append a child block.
    pub fn child(mut self, child: ContentBlock) -> Self {
        self.children.push(child);
        self
    }

    /// Append several child blocks.
    pub fn with_children(mut self, children: impl IntoIterator<Item = ContentBlock>) -> Self {
        self.children.extend(children);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Check if the block lacks a kind.
    pub fn is_malformed(&self) -> bool {
        self.kind.is_none()
    }

    /// Check if the block is of the given kind.
    pub fn is(&self, kind: BlockKind) -> bool {
        self.kind == Some(kind)
    }

    /// Whether a marker token can be embedded in this block's own text.
    pub fn can_carry_marker(&self) -> bool {
        self.kind.is_some_and(|k| k.is_text_bearing() && k.is_nestable())
    }

    /// The block's own visible text: rich text, table cells and image captions.
    pub fn plain_text(&self) -> String {
        match &self.data {
            BlockData::TableRow(row) => row
                .cells
                .iter()
                .map(|cell| plain_text(cell))
                .collect::<Vec<_>>()
                .join(" "),
            BlockData::Image(image) => plain_text(&image.caption),
            _ => plain_text(&self.rich_text),
        }
    }

    /// Text of this block and all descendants in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, buf: &mut String) {
        let own = self.plain_text();
        if !own.is_empty() {
            if !buf.is_empty() {
                buf.push('\n');
            }
            buf.push_str(&own);
        }
        for child in &self.children {
            child.collect_text(buf);
        }
    }

    /// Height of the subtree rooted here (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        1 + tree_depth(&self.children)
    }

    /// Number of blocks in the subtree rooted here.
    pub fn block_count(&self) -> usize {
        1 + count_blocks(&self.children)
    }
}

// =============================================================================
// Tree helpers
// =============================================================================

/// Height of a block sequence (0 for an empty sequence).
pub fn tree_depth(blocks: &[ContentBlock]) -> usize {
    blocks.iter().map(ContentBlock::depth).max().unwrap_or(0)
}

/// Total number of blocks in a sequence, descendants included.
pub fn count_blocks(blocks: &[ContentBlock]) -> usize {
    blocks.iter().map(ContentBlock::block_count).sum()
}

/// Flatten a block sequence into newline-separated text, in document order.
pub fn flatten_text(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        block.collect_text(&mut out);
    }
    out
}
