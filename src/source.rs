//! Source documents handed to the pipeline.
//!
//! A [`SourceDocument`] bundles the extractor's block tree with what the
//! validator compares against: the canonical source text and per-kind
//! structural counts. Both can be derived from the blocks themselves or,
//! when the raw HTML is at hand, from [`scan_html`], which applies the same
//! exclusion rules as extraction.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::block::{ContentBlock, flatten_text};
use crate::store::{Properties, PropertyValue};
use crate::validate::{CountKind, StructuralCounts};

/// Property receiving the document title.
pub const TITLE_PROPERTY: &str = "Name";

// =============================================================================
// SourceDocument
// =============================================================================

/// One document to convert.
#[derive(Debug, Clone, Default)]
pub struct SourceDocument {
    pub title: String,
    /// Extra properties set at creation
    pub properties: Properties,
    pub blocks: Vec<ContentBlock>,
    pub structural_counts: StructuralCounts,
    /// Source text the document must cover
    pub text: String,
    /// Raw source, captured when validation fails
    pub raw: Option<String>,
    /// Extractor warnings, carried into the run report
    pub warnings: Vec<String>,
    /// `text` and `structural_counts` mirror `blocks` and are recomputed
    /// once the blocks are deduplicated
    pub derived_from_blocks: bool,
}

impl SourceDocument {
    /// Source whose text and counts are taken from `blocks` as given.
    pub fn from_blocks(title: impl Into<String>, blocks: Vec<ContentBlock>) -> Self {
        Self {
            title: title.into(),
            structural_counts: StructuralCounts::from_tree(&blocks),
            text: flatten_text(&blocks),
            blocks,
            derived_from_blocks: true,
            ..Default::default()
        }
    }

    /// Source whose text and counts are scanned from the raw HTML the
    /// blocks were extracted from.
    pub fn from_html(title: impl Into<String>, raw: impl Into<String>, blocks: Vec<ContentBlock>) -> Self {
        let raw = raw.into();
        let scan = scan_html(&raw);
        Self {
            title: title.into(),
            structural_counts: scan.counts,
            text: scan.text,
            blocks,
            raw: Some(raw),
            ..Default::default()
        }
    }

    /// Compare against `text` instead of the text of the blocks.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self.derived_from_blocks = false;
        self
    }

    /// Recompute text and counts from `blocks` if they were derived from
    /// them in the first place.
    pub fn refresh_derived(&mut self, blocks: &[ContentBlock]) {
        if self.derived_from_blocks {
            self.text = flatten_text(blocks);
            self.structural_counts = StructuralCounts::from_tree(blocks);
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Creation properties: the title plus any extra properties.
    pub fn create_properties(&self) -> Properties {
        let mut props = self.properties.clone();
        props
            .entry(TITLE_PROPERTY.to_owned())
            .or_insert_with(|| PropertyValue::Title(self.title.clone()));
        props
    }
}

// =============================================================================
// HTML scanning
// =============================================================================

/// Text and counts scanned from HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlScan {
    pub text: String,
    pub counts: StructuralCounts,
}

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(class|role)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});

const SKIPPED_TAGS: &[&str] = &["nav", "script", "style", "noscript", "template", "head"];
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "ol",
    "p", "pre", "section", "table", "td", "th", "tr", "ul",
];
const CALLOUT_CLASSES: &[&str] = &["note", "warning", "important", "tip", "caution", "callout"];

#[derive(Debug, Default)]
struct Attrs<'a> {
    class: Option<&'a str>,
    role: Option<&'a str>,
}

impl<'a> Attrs<'a> {
    fn parse(body: &'a str) -> Self {
        let mut attrs = Attrs::default();
        for caps in ATTR.captures_iter(body) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str());
            if caps[1].eq_ignore_ascii_case("class") {
                attrs.class = Some(value);
            } else {
                attrs.role = Some(value);
            }
        }
        attrs
    }

    fn classes(&self) -> impl Iterator<Item = &'a str> {
        self.class.unwrap_or("").split_whitespace()
    }

    fn is_navigation(&self) -> bool {
        self.role.is_some_and(|r| r.eq_ignore_ascii_case("navigation"))
            || self.classes().any(|c| c.to_ascii_lowercase().contains("nav"))
    }

    fn is_callout(&self) -> bool {
        self.classes()
            .any(|c| CALLOUT_CLASSES.iter().any(|k| c.eq_ignore_ascii_case(k)))
    }
}

fn count_kind(tag: &str, attrs: &Attrs<'_>) -> Option<CountKind> {
    match tag {
        "li" => Some(CountKind::ListItems),
        "p" => Some(CountKind::Paragraphs),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => Some(CountKind::Headings),
        "table" => Some(CountKind::Tables),
        "img" => Some(CountKind::Images),
        "pre" => Some(CountKind::Code),
        "div" | "section" | "aside" if attrs.is_callout() => Some(CountKind::Callouts),
        _ => None,
    }
}

/// Decode the handful of entities that matter for text comparison.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&end| end <= 10).and_then(|end| {
            let entity = &tail[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Element being skipped, with its same-name nesting depth.
struct Skip {
    tag: String,
    depth: usize,
}

/// Scan HTML for its visible text and structural counts.
///
/// Navigation regions (`<nav>`, `role="navigation"`, any class containing
/// `nav`), scripts, styles and the document head are skipped with all their
/// content.
pub fn scan_html(raw: &str) -> HtmlScan {
    let mut scan = HtmlScan::default();
    let mut skip: Option<Skip> = None;
    let mut rest = raw;

    while !rest.is_empty() {
        let Some(lt) = rest.find('<') else {
            if skip.is_none() {
                scan.text.push_str(&decode_entities(rest));
            }
            break;
        };
        if skip.is_none() {
            scan.text.push_str(&decode_entities(&rest[..lt]));
        }
        rest = &rest[lt..];

        if let Some(comment) = rest.strip_prefix("<!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }
        let Some(gt) = rest.find('>') else {
            break;
        };
        let body = &rest[1..gt];
        rest = &rest[gt + 1..];
        if body.starts_with('!') || body.starts_with('?') {
            continue;
        }

        let closing = body.starts_with('/');
        let body = body.trim_start_matches('/');
        let name_end = body
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(body.len());
        let tag = body[..name_end].to_ascii_lowercase();
        if tag.is_empty() {
            continue;
        }
        let is_void = VOID_TAGS.contains(&tag.as_str()) || body.ends_with('/');

        if let Some(active) = skip.as_mut() {
            if active.tag == tag && !is_void {
                if closing {
                    active.depth -= 1;
                    if active.depth == 0 {
                        skip = None;
                    }
                } else {
                    active.depth += 1;
                }
            }
            continue;
        }

        if BLOCK_TAGS.contains(&tag.as_str()) {
            scan.text.push('\n');
        }
        if closing {
            continue;
        }

        let attrs = Attrs::parse(&body[name_end..]);
        if SKIPPED_TAGS.contains(&tag.as_str()) || attrs.is_navigation() {
            if !is_void {
                skip = Some(Skip { tag, depth: 1 });
            }
            continue;
        }
        if let Some(kind) = count_kind(&tag, &attrs) {
            scan.counts.increment(kind);
        }
    }

    scan.text = scan
        .text
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    scan
}
