//! Kind-specific block payloads
//!
//! Most kinds need nothing beyond their rich text. Callouts, images, tables,
//! table rows, code and bookmarks carry extra data used both for the write
//! payload and for dedup signatures.

use serde::{Deserialize, Serialize};

use super::text::{Color, RichText};

/// Where an image's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaSource {
    /// A file already uploaded to the store.
    File { id: String },
    /// An external URL the store links to.
    External { url: String },
}

impl MediaSource {
    /// Global identity key: the same image reached through two extraction
    /// paths yields the same key.
    pub fn identity_key(&self) -> String {
        match self {
            MediaSource::File { id } => format!("file:{id}"),
            MediaSource::External { url } => format!("url:{}", url.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalloutData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub source: MediaSource,
    #[serde(default, skip_serializing_if = "RichText::is_empty")]
    pub caption: RichText,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub width: usize,
    #[serde(default)]
    pub has_column_header: bool,
    #[serde(default)]
    pub has_row_header: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRowData {
    pub cells: Vec<RichText>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeData {
    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmarkData {
    pub url: String,
}

// =============================================================================
// BlockData
// =============================================================================

/// Payload attached to a block, by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum BlockData {
    #[default]
    None,
    Callout(CalloutData),
    Image(ImageData),
    Table(TableData),
    TableRow(TableRowData),
    Code(CodeData),
    Bookmark(BookmarkData),
}

impl BlockData {
    // Generates is_xxx / as_xxx / as_xxx_mut for every payload variant.
    impl_data_accessors!(
        Callout => CalloutData,
        Image => ImageData,
        Table => TableData,
        TableRow => TableRowData,
        Code => CodeData,
        Bookmark => BookmarkData,
    );

    /// Check if no payload is attached.
    pub fn is_none(&self) -> bool {
        matches!(self, BlockData::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key_ignores_trailing_slash() {
        let a = MediaSource::External { url: "https://cdn.example.com/a.png/".into() };
        let b = MediaSource::External { url: "https://cdn.example.com/a.png".into() };
        assert_eq!(a.identity_key(), b.identity_key());

        let file = MediaSource::File { id: "f-1".into() };
        assert_eq!(file.identity_key(), "file:f-1");
    }

    #[test]
    fn test_generated_accessors() {
        let mut data = BlockData::TableRow(TableRowData::default());
        assert!(data.is_table_row());
        assert!(!data.is_table());
        assert!(data.as_callout().is_none());

        data.as_table_row_mut().unwrap().cells.push(RichText::new());
        assert_eq!(data.as_table_row().unwrap().cells.len(), 1);
    }
}
