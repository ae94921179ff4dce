//! Text model: styled fragments and paragraphs.
//!
//! A paragraph is an ordered sequence of styled fragments sharing
//! block-level layout properties. Fragment style fields are all optional:
//! `None` always means "inherit from the rendering default", never
//! "explicitly absent".

pub mod paragraph;
pub mod run;

pub use paragraph::ParagraphAssembler;
pub use run::{RunStyleBuilder, StyleContext};

use crate::color::Rgb;

/// Horizontal paragraph alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    /// Parse the `algn` attribute value.
    pub fn from_attr(value: &str) -> Self {
        match value {
            "ctr" => Alignment::Center,
            "r" => Alignment::Right,
            "just" => Alignment::Justify,
            _ => Alignment::Left,
        }
    }
}

/// Vertical baseline shift of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineShift {
    /// Raised and rendered at a reduced size.
    Superscript,
    /// Lowered and rendered at a reduced size.
    Subscript,
}

/// One contiguous span of identically-styled text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyledFragment {
    pub text: String,
    pub font: Option<String>,
    pub size_pt: Option<f64>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strike: Option<bool>,
    pub color: Option<Rgb>,
    pub baseline: Option<BaselineShift>,
    pub letter_spacing_pt: Option<f64>,
}

impl StyledFragment {
    /// A fragment holding only text, every style field inherited.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// An explicit line-break boundary within a paragraph.
    pub fn line_break() -> Self {
        Self::plain("\n")
    }

    /// Check whether this fragment is a line-break boundary.
    pub fn is_line_break(&self) -> bool {
        self.text == "\n"
    }
}

/// One paragraph: fragments plus block-level layout hints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub fragments: Vec<StyledFragment>,
    pub align: Alignment,
    pub indent_level: u32,
    pub has_bullet: bool,
    pub line_spacing_pct: Option<f64>,
    pub space_before_pt: Option<f64>,
    pub space_after_pt: Option<f64>,
}

impl Paragraph {
    /// Concatenated text of all fragments.
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}
