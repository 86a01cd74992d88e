//! Per-kind dedup signatures.

use crate::block::{BlockData, BlockKind, ContentBlock, flatten_text};
use crate::hash::StableHasher;
use crate::marker::token::remove_tokens;

/// How a signature is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signature {
    /// Duplicate only within the proximity window
    Proximity(u64),
    /// Duplicate anywhere in the same children list
    Global(u64),
}

/// Lowercase and collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Normalized text of everything nested under `block`. Two blocks with
/// the same own text but different bodies must not collide.
fn children_text(block: &ContentBlock) -> String {
    if block.children.is_empty() {
        return String::new();
    }
    normalize_text(&remove_tokens(&flatten_text(&block.children)))
}

/// Compute the signature of `block`, or `None` for blocks that are never
/// deduplicated (list items, to-dos, dividers, empty text, ...).
pub fn signature(block: &ContentBlock, text_limit: usize, table_rows: usize) -> Option<Signature> {
    let kind = block.kind?;
    match kind {
        BlockKind::Paragraph
        | BlockKind::Code
        | BlockKind::Heading1
        | BlockKind::Heading2
        | BlockKind::Heading3
        | BlockKind::Quote
        | BlockKind::Toggle => {
            let text = normalize_text(&block.plain_text());
            if text.is_empty() {
                return None;
            }
            let hash = StableHasher::new()
                .update_str(kind.as_str())
                .update_str(truncate(&text, text_limit))
                .update_str(&children_text(block))
                .finish();
            Some(Signature::Proximity(hash))
        }
        BlockKind::Callout => {
            let text = normalize_text(&remove_tokens(&block.plain_text()));
            if text.is_empty() {
                return None;
            }
            let (icon, color) = match block.data.as_callout() {
                Some(data) => (data.icon.as_deref().unwrap_or(""), data.color.as_str()),
                None => ("", "default"),
            };
            let hash = StableHasher::new()
                .update_str(kind.as_str())
                .update_str(truncate(&text, text_limit))
                .update_str(icon)
                .update_str(color)
                .update_str(&children_text(block))
                .finish();
            Some(Signature::Proximity(hash))
        }
        BlockKind::Table => {
            if block.children.is_empty() {
                return None;
            }
            let width = block.data.as_table().map_or(0, |t| t.width);
            let mut hasher = StableHasher::new()
                .update_str(kind.as_str())
                .update_usize(width)
                .update_usize(block.children.len());
            for row in block.children.iter().take(table_rows) {
                hasher = hasher.update_str(&normalize_text(&row.plain_text()));
            }
            Some(Signature::Proximity(hasher.finish()))
        }
        BlockKind::Image => match &block.data {
            BlockData::Image(image) => Some(Signature::Global(
                StableHasher::new()
                    .update_str(kind.as_str())
                    .update_str(&image.source.identity_key())
                    .finish(),
            )),
            _ => None,
        },
        BlockKind::BulletedListItem
        | BlockKind::NumberedListItem
        | BlockKind::ToDo
        | BlockKind::Divider
        | BlockKind::Bookmark
        | BlockKind::ColumnList
        | BlockKind::Column
        | BlockKind::TableRow => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Color, MediaSource};
    use crate::id::MarkerId;
    use crate::marker::token_run;

    const LIMIT: usize = 200;

    fn sig(block: &ContentBlock) -> Option<Signature> {
        signature(block, LIMIT, 5)
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello\n\tWORLD  "), "hello world");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_text_signature_ignores_case_and_spacing() {
        assert_eq!(
            sig(&ContentBlock::paragraph("Restart the  service")),
            sig(&ContentBlock::paragraph("restart the service"))
        );
        assert_ne!(
            sig(&ContentBlock::paragraph("Restart")),
            sig(&ContentBlock::quote("Restart"))
        );
    }

    #[test]
    fn test_children_are_part_of_the_signature() {
        let windows = ContentBlock::toggle("Details").child(ContentBlock::paragraph("Windows steps: run setup.exe"));
        let linux = ContentBlock::toggle("Details").child(ContentBlock::paragraph("Linux steps: run setup.sh"));
        assert_ne!(sig(&windows), sig(&linux));
        assert_eq!(sig(&windows), sig(&windows.clone()));
        assert_ne!(sig(&windows), sig(&ContentBlock::toggle("Details")));
    }

    #[test]
    fn test_truncation_limits_compared_text() {
        let long = "x".repeat(LIMIT);
        let a = ContentBlock::paragraph(format!("{long} tail one"));
        let b = ContentBlock::paragraph(format!("{long} tail two"));
        assert_eq!(sig(&a), sig(&b));
    }

    #[test]
    fn test_never_deduped_kinds() {
        assert_eq!(sig(&ContentBlock::bulleted("same")), None);
        assert_eq!(sig(&ContentBlock::divider()), None);
        assert_eq!(sig(&ContentBlock::paragraph("   ")), None);
        assert_eq!(sig(&ContentBlock::default()), None);
    }

    #[test]
    fn test_callout_signature_strips_markers_and_uses_style() {
        let plain = ContentBlock::callout("Note: back up first", Some("ℹ️"), Color::BlueBackground);
        let marked = plain.clone().run(token_run(MarkerId::from_raw(3)));
        let other_color = ContentBlock::callout("Note: back up first", Some("ℹ️"), Color::RedBackground);
        assert_eq!(sig(&plain), sig(&marked));
        assert_ne!(sig(&plain), sig(&other_color));
    }

    #[test]
    fn test_table_signature_uses_shape_and_rows() {
        let a = ContentBlock::table([["a", "b"], ["c", "d"]]);
        let b = ContentBlock::table([["a", "b"], ["c", "x"]]);
        assert_eq!(sig(&a), sig(&a.clone()));
        assert_ne!(sig(&a), sig(&b));
    }

    #[test]
    fn test_image_signature_is_global() {
        let img = ContentBlock::image(MediaSource::External {
            url: "https://cdn.example.com/x.png".into(),
        });
        assert!(matches!(sig(&img), Some(Signature::Global(_))));
    }
}
