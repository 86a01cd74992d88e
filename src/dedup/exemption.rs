//! Boilerplate exemption rules.
//!
//! Procedural documents repeat short section labels ("Before you begin",
//! "Procedure", "Role required") under every step. Such blocks are kept
//! unless they sit directly next to an identical copy.
//!
//! Rules are evaluated in table order; the first match wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::block::{BlockKind, ContentBlock};
use crate::marker::token::remove_tokens;

use super::signature::normalize_text;

static SECTION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(before you begin|about this task|procedure|role required|prerequisites?|results?|what to do next|related (topics|tasks|concepts|links)|examples?|steps|notes?)\s*:?$",
    )
    .expect("valid section label regex")
});

static PREREQUISITE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(prerequisites?|before you begin|role required|requirements?)\s*:?(\s+\S.{0,40})?$")
        .expect("valid prerequisite regex")
});

/// One exemption rule: the kinds it applies to and the match on the block.
#[derive(Debug, Clone, Copy)]
pub struct ExemptionRule {
    pub name: &'static str,
    pub kinds: &'static [BlockKind],
    pub matches: fn(&ContentBlock) -> bool,
}

fn label_text(block: &ContentBlock) -> String {
    normalize_text(&remove_tokens(&block.plain_text()))
}

fn is_section_label(block: &ContentBlock) -> bool {
    SECTION_LABEL.is_match(&label_text(block))
}

/// A callout holding only a prerequisite title (plus at most a short role
/// name), with the detail, if any, in its children.
fn is_prerequisite_callout(block: &ContentBlock) -> bool {
    PREREQUISITE_TITLE.is_match(&label_text(block))
}

/// The built-in rule table.
pub const EXEMPTION_RULES: &[ExemptionRule] = &[
    ExemptionRule {
        name: "section-label",
        kinds: &[
            BlockKind::Paragraph,
            BlockKind::Heading1,
            BlockKind::Heading2,
            BlockKind::Heading3,
        ],
        matches: is_section_label,
    },
    ExemptionRule {
        name: "prerequisite-callout",
        kinds: &[BlockKind::Callout],
        matches: is_prerequisite_callout,
    },
];

/// Name of the first rule in `rules` exempting `block`.
pub fn exemption(rules: &[ExemptionRule], block: &ContentBlock) -> Option<&'static str> {
    let kind = block.kind?;
    rules
        .iter()
        .find(|rule| rule.kinds.contains(&kind) && (rule.matches)(block))
        .map(|rule| rule.name)
}
