//! Theme part resolution.
//!
//! A theme part carries a twelve-slot named color map and the major/minor
//! font families. Multiple themes may coexist in one document, one per
//! distinct master; each is parsed once into an immutable [`ThemeData`].

use crate::color::Rgb;
use crate::error::Result;
use crate::xml::{self, XmlElement, ns};
use phf::phf_map;
use std::collections::HashMap;

/// The twelve color slots of a color scheme, in schema order.
pub const SCHEME_SLOTS: [&str; 12] = [
    "dk1", "lt1", "dk2", "lt2", "accent1", "accent2", "accent3", "accent4", "accent5", "accent6",
    "hlink", "folHlink",
];

/// Alternate slot names some authoring tools write; each maps onto a
/// canonical slot.
static SLOT_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "tx1" => "dk1",
    "tx2" => "dk2",
    "bg1" => "lt1",
    "bg2" => "lt2",
    "dark1" => "dk1",
    "dark2" => "dk2",
    "light1" => "lt1",
    "light2" => "lt2",
    "hyperlink" => "hlink",
    "followedHyperlink" => "folHlink",
};

/// Typeface name used when a font scheme is absent or incomplete.
pub const DEFAULT_FONT: &str = "Arial";

/// Colors and fonts extracted from one theme part.
///
/// Immutable once loaded. An empty color map means "nothing resolves";
/// callers fall back to their own defaults (black text, white
/// background).
#[derive(Debug, Clone)]
pub struct ThemeData {
    /// Slot name to RGB, canonical slot names as keys.
    color_map: HashMap<String, Rgb>,
    /// Major (heading) Latin typeface.
    major_font: String,
    /// Minor (body) Latin typeface.
    minor_font: String,
}

impl ThemeData {
    /// A theme with no colors and default fonts.
    pub fn empty() -> Self {
        Self {
            color_map: HashMap::new(),
            major_font: DEFAULT_FONT.to_string(),
            minor_font: DEFAULT_FONT.to_string(),
        }
    }

    /// Parse a theme part.
    ///
    /// A missing color scheme, missing font scheme, or any malformed
    /// piece degrades to the corresponding default; this never fails on
    /// content, only on XML that does not parse at all (and callers
    /// downgrade that to [`ThemeData::empty`] with a warning).
    pub fn from_xml(theme_xml: &[u8]) -> Result<Self> {
        let root = xml::parse_document(theme_xml)?;
        Ok(Self::from_tree(&root))
    }

    /// Extract theme data from an already-parsed theme part.
    pub fn from_tree(root: &XmlElement) -> Self {
        let mut theme = Self::empty();

        if let Some(scheme) = root.find_first(ns::DRAWING_NS, "clrScheme") {
            for slot in SCHEME_SLOTS {
                let Some(slot_element) = scheme.child(ns::DRAWING_NS, slot) else {
                    continue;
                };
                if let Some(rgb) = read_slot_color(slot_element) {
                    theme.color_map.insert(slot.to_string(), rgb);
                }
            }
        }

        if let Some(fonts) = root.find_first(ns::DRAWING_NS, "fontScheme") {
            if let Some(face) = latin_typeface(fonts, "majorFont") {
                theme.major_font = face;
            }
            if let Some(face) = latin_typeface(fonts, "minorFont") {
                theme.minor_font = face;
            }
        }

        theme
    }

    /// Look up a slot, following aliases (`tx1` reads `dk1`, `bg2` reads
    /// `lt2`, and so on).
    pub fn scheme_color(&self, slot: &str) -> Option<Rgb> {
        if let Some(rgb) = self.color_map.get(slot) {
            return Some(*rgb);
        }
        let canonical = SLOT_ALIASES.get(slot)?;
        self.color_map.get(*canonical).copied()
    }

    /// Major (heading) font family.
    #[inline]
    pub fn major_font(&self) -> &str {
        &self.major_font
    }

    /// Minor (body) font family.
    #[inline]
    pub fn minor_font(&self) -> &str {
        &self.minor_font
    }

    /// Number of populated canonical slots.
    pub fn color_count(&self) -> usize {
        self.color_map.len()
    }

    /// Check whether the color map resolved nothing.
    pub fn is_empty(&self) -> bool {
        self.color_map.is_empty()
    }

    /// Insert a scheme color under its canonical slot name.
    ///
    /// Mostly useful for building fixtures; document themes come from
    /// [`ThemeData::from_xml`].
    pub fn insert_scheme_color(&mut self, slot: &str, rgb: Rgb) {
        let canonical = SLOT_ALIASES.get(slot).copied().unwrap_or(slot);
        self.color_map.insert(canonical.to_string(), rgb);
    }
}

/// Read the color child of a scheme slot: a literal `srgbClr` or a
/// `sysClr` with its last computed value.
fn read_slot_color(slot_element: &XmlElement) -> Option<Rgb> {
    for child in slot_element.child_elements() {
        match child.local_name() {
            "srgbClr" => {
                if let Some(rgb) = child.attr("val").and_then(Rgb::from_hex) {
                    return Some(rgb);
                }
            },
            "sysClr" => {
                if let Some(rgb) = child.attr("lastClr").and_then(Rgb::from_hex) {
                    return Some(rgb);
                }
            },
            _ => {},
        }
    }
    None
}

fn latin_typeface(fonts: &XmlElement, group: &str) -> Option<String> {
    let face = fonts
        .child(ns::DRAWING_NS, group)?
        .child(ns::DRAWING_NS, "latin")?
        .attr("typeface")?;
    if face.is_empty() {
        None
    } else {
        Some(face.to_string())
    }
}
