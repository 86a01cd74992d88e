//! Rich text runs
//!
//! A block's visible text is an ordered sequence of runs, each carrying its
//! own annotations, color and optional link.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// =============================================================================
// Annotations / Color
// =============================================================================

/// Inline formatting flags for a text run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotations {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
}

impl Annotations {
    /// Bold only.
    pub const BOLD: Self = Self {
        bold: true,
        italic: false,
        strikethrough: false,
        underline: false,
        code: false,
    };

    /// Inline code only.
    pub const CODE: Self = Self {
        bold: false,
        italic: false,
        strikethrough: false,
        underline: false,
        code: true,
    };

    /// Check if no formatting is applied.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}

/// Text or block color as understood by the target store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    #[default]
    Default,
    Gray,
    Brown,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
    Red,
    GrayBackground,
    BrownBackground,
    OrangeBackground,
    YellowBackground,
    GreenBackground,
    BlueBackground,
    PurpleBackground,
    PinkBackground,
    RedBackground,
}

impl Color {
    /// Wire name of the color.
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Default => "default",
            Color::Gray => "gray",
            Color::Brown => "brown",
            Color::Orange => "orange",
            Color::Yellow => "yellow",
            Color::Green => "green",
            Color::Blue => "blue",
            Color::Purple => "purple",
            Color::Pink => "pink",
            Color::Red => "red",
            Color::GrayBackground => "gray_background",
            Color::BrownBackground => "brown_background",
            Color::OrangeBackground => "orange_background",
            Color::YellowBackground => "yellow_background",
            Color::GreenBackground => "green_background",
            Color::BlueBackground => "blue_background",
            Color::PurpleBackground => "purple_background",
            Color::PinkBackground => "pink_background",
            Color::RedBackground => "red_background",
        }
    }
}

// =============================================================================
// TextRun
// =============================================================================

/// A single run of text with uniform formatting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    #[serde(default, skip_serializing_if = "Annotations::is_plain")]
    pub annotations: Annotations,
    #[serde(default)]
    pub color: Color,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TextRun {
    /// Create a plain, unformatted run.
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Create a bold run.
    pub fn bold(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            annotations: Annotations::BOLD,
            ..Default::default()
        }
    }

    /// Attach a link target.
    pub fn with_link(mut self, url: impl Into<String>) -> Self {
        self.link = Some(url.into());
        self
    }

    /// Set the run color.
    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Check if the run has no content.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Ordered runs making up a block's text. Most blocks carry one or two runs.
pub type RichText = SmallVec<[TextRun; 2]>;

/// Build rich text holding a single plain run.
pub fn plain(content: impl Into<String>) -> RichText {
    let mut runs = RichText::new();
    runs.push(TextRun::plain(content));
    runs
}

/// Concatenate the content of all runs.
pub fn plain_text(runs: &[TextRun]) -> String {
    let mut out = String::new();
    for run in runs {
        out.push_str(&run.content);
    }
    out
}
