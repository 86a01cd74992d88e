//! Text canonicalization and token interning.
//!
//! Both sides of a coverage comparison go through [`canonicalize`] so that
//! typographic differences introduced by the store (smart quotes, dash
//! variants, list bullets) never count as missing content.

use rustc_hash::FxHashMap;
use unicode_normalization::UnicodeNormalization;

fn is_quote(c: char) -> bool {
    matches!(
        c,
        '"' | '\'' | '`' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{201C}'
            | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2039}' | '\u{203A}' | '\u{00AB}'
            | '\u{00BB}'
    )
}

fn is_dash_or_bullet(c: char) -> bool {
    matches!(
        c,
        '-' | '\u{2010}'..='\u{2015}' | '\u{2212}' | '\u{2022}' | '\u{2023}' | '\u{2043}'
            | '\u{00B7}' | '\u{25AA}' | '\u{25CF}' | '\u{25E6}' | '\u{2219}'
    )
}

/// NFKC-normalize, drop quotes, turn dashes and bullets into spaces,
/// collapse whitespace and lowercase.
pub fn canonicalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.nfkc() {
        if is_quote(c) {
            continue;
        }
        if c.is_whitespace() || is_dash_or_bullet(c) {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Maps distinct tokens to dense `u32` IDs shared by both sides of a
/// comparison.
#[derive(Debug, Default)]
pub struct TokenInterner<'a> {
    ids: FxHashMap<&'a str, u32>,
}

impl<'a> TokenInterner<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern every whitespace-separated token of canonical `text`.
    pub fn intern(&mut self, text: &'a str) -> Vec<u32> {
        text.split_whitespace()
            .map(|token| {
                let next = self.ids.len() as u32;
                *self.ids.entry(token).or_insert(next)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_typography() {
        assert_eq!(
            canonicalize("“Don’t”  restart — the\u{00A0}Service • now"),
            "dont restart the service now"
        );
        assert_eq!(canonicalize("ﬁle"), "file");
        assert_eq!(canonicalize("  "), "");
    }

    #[test]
    fn test_interner_shares_ids() {
        let a = canonicalize("the cat and the hat");
        let b = canonicalize("The hat");
        let mut interner = TokenInterner::new();
        let ta = interner.intern(&a);
        let tb = interner.intern(&b);
        assert_eq!(ta, vec![0, 1, 2, 0, 3]);
        assert_eq!(tb, vec![0, 3]);
        assert_eq!(interner.len(), 4);
    }
}
