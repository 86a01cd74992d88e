//! Validation metadata written back as document properties.
//!
//! Two rich-text properties are set: `Validation` (status line, errors,
//! order issues, missing spans) and `Stats` (per-kind source → target
//! counts). Rich-text property values are capped at 2000 characters by the
//! store.

use crate::store::{Properties, PropertyValue};

use super::result::ValidationResult;
use super::structure::CountComparison;

/// Property holding the status line and detail.
pub const VALIDATION_PROPERTY: &str = "Validation";
/// Property holding per-kind counts.
pub const STATS_PROPERTY: &str = "Stats";
/// Store limit for one rich-text property value.
pub const PROPERTY_LIMIT: usize = 2000;

const EXCERPT_CHARS: usize = 120;

/// Cut `text` to at most `limit` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Render the `Validation` property.
pub fn validation_text(result: &ValidationResult, max_spans: usize) -> String {
    let mut lines = vec![format!(
        "{}: coverage {:.1}% ({}, {} source tokens){}",
        result.status.as_str(),
        result.coverage.coverage * 100.0,
        result.coverage.method.as_str(),
        result.coverage.source_tokens,
        if result.reprocess { " [reprocess]" } else { "" },
    )];

    if !result.errors.is_empty() {
        lines.push("Errors:".into());
        lines.extend(result.errors.iter().map(|err| format!("- {err}")));
    }
    if !result.warnings.is_empty() {
        lines.push("Warnings:".into());
        lines.extend(result.warnings.iter().map(|warning| format!("- {warning}")));
    }
    if !result.inversions.is_empty() {
        lines.push("Order issues:".into());
        lines.extend(result.inversions.iter().map(|inv| {
            format!(
                "- \"{}\" appears after \"{}\"",
                truncate_chars(&inv.expected_first, EXCERPT_CHARS),
                truncate_chars(&inv.expected_second, EXCERPT_CHARS),
            )
        }));
    }
    let spans = &result.coverage.missing_spans;
    if !spans.is_empty() {
        lines.push("Missing spans:".into());
        lines.extend(spans.iter().take(max_spans).map(|span| {
            format!(
                "- at token {} ({} tokens): \"{}\"",
                span.start,
                span.len,
                truncate_chars(&span.text, EXCERPT_CHARS),
            )
        }));
        if spans.len() > max_spans {
            lines.push(format!("- … and {} more", spans.len() - max_spans));
        }
    }
    truncate_chars(&lines.join("\n"), PROPERTY_LIMIT)
}

/// Render the `Stats` property.
pub fn stats_text(structure: &[CountComparison]) -> String {
    let lines: Vec<String> = structure
        .iter()
        .map(|c| {
            let flag = if c.is_hard_mismatch() { " ✗" } else { "" };
            format!("{}: {} → {}{flag}", c.kind.as_str(), c.source, c.target)
        })
        .collect();
    truncate_chars(&lines.join("\n"), PROPERTY_LIMIT)
}

/// Both metadata properties, ready for `update_properties`.
pub fn metadata_properties(result: &ValidationResult, max_spans: usize) -> Properties {
    let mut props = Properties::new();
    props.insert(
        VALIDATION_PROPERTY.to_owned(),
        PropertyValue::RichText(validation_text(result, max_spans)),
    );
    props.insert(
        STATS_PROPERTY.to_owned(),
        PropertyValue::RichText(stats_text(&result.structure)),
    );
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::validate::coverage::TextSpan;
    use crate::validate::order::Inversion;
    use crate::validate::structure::{CountKind, StructuralCounts, compare};

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 10), "héllo");
        assert_eq!(truncate_chars("héllo", 3), "hé…");
        assert_eq!(truncate_chars(&"é".repeat(3000), PROPERTY_LIMIT).chars().count(), PROPERTY_LIMIT);
    }

    #[test]
    fn test_validation_text_lists_capped_spans() {
        let mut result = ValidationResult::from_error(&ValidationError::Internal("x".into()));
        result.coverage.missing_spans = (0..8)
            .map(|i| TextSpan {
                start: i * 100,
                len: 50,
                text: format!("span {i}"),
            })
            .collect();
        let text = validation_text(&result, 5);
        assert!(text.starts_with("FAILED: coverage 0.0%"));
        assert!(text.contains("span 4"));
        assert!(!text.contains("span 5"));
        assert!(text.contains("and 3 more"));
    }

    #[test]
    fn test_validation_text_sections_one_per_line() {
        let mut result = ValidationResult::from_error(&ValidationError::Internal("x".into()));
        result.warnings.push("2 blocks dropped".into());
        result.inversions.push(Inversion::new("first step", "second step"));
        let text = validation_text(&result, 5);
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].starts_with("FAILED: coverage 0.0% (lcs, 0 source tokens)"));
        assert!(lines[0].ends_with(" [reprocess]"));
        assert_eq!(lines[1], "Errors:");
        assert!(lines[2].starts_with("- "));
        assert_eq!(&lines[3..], [
            "Warnings:",
            "- 2 blocks dropped",
            "Order issues:",
            "- \"first step\" appears after \"second step\"",
        ]);
    }

    #[test]
    fn test_stats_text_marks_hard_mismatches() {
        let source = StructuralCounts::new().with(CountKind::Tables, 2);
        let target = StructuralCounts::new().with(CountKind::Tables, 1);
        let text = stats_text(&compare(&source, &target, 0.2));
        assert!(text.contains("tables: 2 → 1 ✗"));
        assert!(text.contains("headings: 0 → 0\n"));
    }

    #[test]
    fn test_metadata_properties_keys() {
        let result = ValidationResult::from_error(&ValidationError::Internal("x".into()));
        let props = metadata_properties(&result, 5);
        assert!(props.contains_key(VALIDATION_PROPERTY));
        assert!(props.contains_key(STATS_PROPERTY));
    }
}
