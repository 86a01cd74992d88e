//! Marker tokens embedded in block text.
//!
//! A token is `«bw-marker:<16 hex digits>»`. It is appended to the marked
//! block's rich text as its own run, prefixed with a space so that removing
//! it leaves the original runs untouched.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::block::{RichText, TextRun};
use crate::id::MarkerId;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"«bw-marker:([0-9a-f]{16})»").expect("valid token regex"));

const OPEN: &str = "«bw-marker:";
const CLOSE: &str = "»";

/// The literal token text for `id`.
pub fn token_text(id: MarkerId) -> String {
    format!("{OPEN}{}{CLOSE}", id.to_hex())
}

/// The run appended to a marked block.
pub fn token_run(id: MarkerId) -> TextRun {
    TextRun::plain(format!(" {}", token_text(id)))
}

/// Every marker ID referenced in `text`, in order of appearance.
pub fn find_markers(text: &str) -> Vec<MarkerId> {
    TOKEN
        .captures_iter(text)
        .filter_map(|caps| u64::from_str_radix(&caps[1], 16).ok())
        .map(MarkerId::from_raw)
        .collect()
}

/// Check if any token appears in `text`.
pub fn contains_marker(text: &str) -> bool {
    text.contains(OPEN) && TOKEN.is_match(text)
}

/// Check if any run of `runs` carries a token.
pub fn runs_contain_marker(runs: &[TextRun]) -> bool {
    runs.iter().any(|run| contains_marker(&run.content))
}

/// Remove every token from a plain string.
pub fn remove_tokens(text: &str) -> Cow<'_, str> {
    if !text.contains(OPEN) {
        return Cow::Borrowed(text);
    }
    TOKEN.replace_all(text, "")
}

/// `runs` with the token for `id` removed.
///
/// Runs that held nothing but the token (and surrounding whitespace) are
/// dropped; all other runs keep their content and formatting.
pub fn strip_marker(runs: &[TextRun], id: MarkerId) -> RichText {
    let token = token_text(id);
    rewrite_runs(runs, |content| {
        content.contains(&token).then(|| content.replace(&token, ""))
    })
}

/// `runs` with every token removed, or `None` if no run held a token.
pub fn strip_markers(runs: &[TextRun]) -> Option<RichText> {
    if !runs_contain_marker(runs) {
        return None;
    }
    Some(rewrite_runs(runs, |content| match remove_tokens(content) {
        Cow::Owned(stripped) => Some(stripped),
        Cow::Borrowed(_) => None,
    }))
}

fn rewrite_runs(runs: &[TextRun], mut rewrite: impl FnMut(&str) -> Option<String>) -> RichText {
    let mut out = RichText::new();
    for run in runs {
        match rewrite(&run.content) {
            Some(stripped) if stripped.trim().is_empty() => {}
            Some(stripped) => {
                let mut run = run.clone();
                run.content = stripped.trim_end().to_owned();
                out.push(run);
            }
            None => out.push(run.clone()),
        }
    }
    out
}
