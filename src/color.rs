//! Fill color resolution.
//!
//! A fill is either a literal RGB value or a reference into a theme's
//! color map, optionally adjusted by luminance/tint/shade modifiers. The
//! resolver turns either form into one concrete [`Rgb`].
//!
//! The modifier math is a direct per-channel RGB approximation of the
//! container format's HSL-based luminance transform. It is close enough
//! for on-screen rendering; swapping in the exact HSL algorithm would
//! only touch [`apply_modifier`].

use crate::theme::ThemeData;
use crate::xml::{XmlElement, ns};
use smallvec::SmallVec;
use std::fmt;

/// RGB color, one byte per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a six-digit hex string, with or without a `#` prefix.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#');
        if hex.len() != 6 {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::new(r, g, b))
    }

    /// Uppercase six-digit hex string without a prefix.
    pub fn to_hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Perceived brightness in 0..=255, used to pick a readable default
    /// text color against a background.
    pub fn luma(&self) -> u8 {
        (0.299 * self.r as f64 + 0.587 * self.g as f64 + 0.114 * self.b as f64).round() as u8
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.to_hex())
    }
}

/// A percentage-based transform applied to a scheme color.
///
/// Values are percent-mille: 100,000 = 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Scale each channel by the percentage.
    LumMod(u32),
    /// Add the percentage of full scale to each channel.
    LumOff(u32),
    /// Blend each channel toward white; 100% is the identity.
    Tint(u32),
    /// Scale each channel; 100% is the identity.
    Shade(u32),
}

/// Modifier chains are almost always 0-2 entries.
pub type Modifiers = SmallVec<[Modifier; 2]>;

/// A fill color as written in the source, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorReference {
    /// A literal RGB value; resolves to itself.
    Literal(Rgb),
    /// A reference into the theme color map, adjusted by modifiers in
    /// source order.
    Scheme { slot: String, modifiers: Modifiers },
}

impl ColorReference {
    /// Read a color reference from a color element (`srgbClr`,
    /// `schemeClr`, or `sysClr`).
    ///
    /// Returns `None` when the element is not a color or carries no
    /// usable value.
    pub fn from_element(element: &XmlElement) -> Option<Self> {
        if element.namespace() != Some(ns::DRAWING_NS) {
            return None;
        }
        match element.local_name() {
            "srgbClr" => {
                let rgb = Rgb::from_hex(element.attr("val")?)?;
                Some(ColorReference::Literal(rgb))
            },
            "sysClr" => {
                // The last computed value is the only portable part of a
                // system color.
                let rgb = element.attr("lastClr").and_then(Rgb::from_hex)?;
                Some(ColorReference::Literal(rgb))
            },
            "schemeClr" => {
                let slot = element.attr("val")?.to_string();
                let mut modifiers = Modifiers::new();
                for child in element.child_elements() {
                    let Some(pct) = child
                        .attr("val")
                        .and_then(|v| v.parse::<u32>().ok())
                    else {
                        continue;
                    };
                    let modifier = match child.local_name() {
                        "lumMod" => Modifier::LumMod(pct),
                        "lumOff" => Modifier::LumOff(pct),
                        "tint" => Modifier::Tint(pct),
                        "shade" => Modifier::Shade(pct),
                        _ => continue,
                    };
                    modifiers.push(modifier);
                }
                Some(ColorReference::Scheme { slot, modifiers })
            },
            _ => None,
        }
    }

    /// Read the color under a fill wrapper element (e.g. `solidFill`),
    /// taking the first color child.
    pub fn from_fill_element(fill: &XmlElement) -> Option<Self> {
        fill.child_elements().find_map(Self::from_element)
    }

    /// Resolve against a theme's color map.
    ///
    /// A literal passes through untouched. A scheme reference looks up
    /// its slot (aliases included) and applies the modifiers in source
    /// order; an unknown slot yields `None` and the caller substitutes
    /// its own default.
    pub fn resolve(&self, theme: &ThemeData) -> Option<Rgb> {
        match self {
            ColorReference::Literal(rgb) => Some(*rgb),
            ColorReference::Scheme { slot, modifiers } => {
                let base = theme.scheme_color(slot)?;
                Some(apply_modifiers(base, modifiers))
            },
        }
    }
}

/// Apply a modifier chain in source order.
///
/// Channels are carried as `f64` across the whole chain and clamped plus
/// rounded once at the end, not after each step.
pub fn apply_modifiers(base: Rgb, modifiers: &[Modifier]) -> Rgb {
    let mut channels = [base.r as f64, base.g as f64, base.b as f64];
    for modifier in modifiers {
        for channel in &mut channels {
            *channel = apply_modifier(*channel, *modifier);
        }
    }
    Rgb::new(
        clamp_channel(channels[0]),
        clamp_channel(channels[1]),
        clamp_channel(channels[2]),
    )
}

fn apply_modifier(channel: f64, modifier: Modifier) -> f64 {
    match modifier {
        Modifier::LumMod(p) => channel * fraction(p),
        Modifier::LumOff(p) => (channel + 255.0 * fraction(p)).min(255.0),
        Modifier::Tint(p) => channel + (255.0 - channel) * (1.0 - fraction(p)),
        Modifier::Shade(p) => channel * fraction(p),
    }
}

#[inline]
fn fraction(percent_mille: u32) -> f64 {
    percent_mille as f64 / crate::unit::PERCENT_SCALE
}

#[inline]
fn clamp_channel(v: f64) -> u8 {
    v.clamp(0.0, 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::ThemeData;
    use crate::xml::parse_document;
    use proptest::prelude::*;
    use smallvec::smallvec;

    fn theme_with(slot: &str, rgb: Rgb) -> ThemeData {
        let mut theme = ThemeData::empty();
        theme.insert_scheme_color(slot, rgb);
        theme
    }

    #[test]
    fn test_literal_passes_through() {
        let theme = ThemeData::empty();
        let reference = ColorReference::Literal(Rgb::new(0x12, 0x34, 0x56));
        assert_eq!(reference.resolve(&theme), Some(Rgb::new(0x12, 0x34, 0x56)));
    }

    #[test]
    fn test_scheme_without_modifiers_returns_stored_value() {
        let theme = theme_with("accent1", Rgb::from_hex("4472C4").unwrap());
        let reference = ColorReference::Scheme {
            slot: "accent1".to_string(),
            modifiers: Modifiers::new(),
        };
        assert_eq!(reference.resolve(&theme), Rgb::from_hex("4472C4"));
    }

    #[test]
    fn test_unknown_slot_is_none() {
        let theme = ThemeData::empty();
        let reference = ColorReference::Scheme {
            slot: "accent9".to_string(),
            modifiers: Modifiers::new(),
        };
        assert_eq!(reference.resolve(&theme), None);
    }

    #[test]
    fn test_tint_full_is_identity() {
        let base = Rgb::new(40, 80, 120);
        assert_eq!(apply_modifiers(base, &[Modifier::Tint(100_000)]), base);
    }

    #[test]
    fn test_tint_zero_is_white() {
        let base = Rgb::new(40, 80, 120);
        assert_eq!(apply_modifiers(base, &[Modifier::Tint(0)]), Rgb::WHITE);
    }

    #[test]
    fn test_shade_full_is_identity() {
        let base = Rgb::new(40, 80, 120);
        assert_eq!(apply_modifiers(base, &[Modifier::Shade(100_000)]), base);
    }

    #[test]
    fn test_shade_zero_is_black() {
        let base = Rgb::new(40, 80, 120);
        assert_eq!(apply_modifiers(base, &[Modifier::Shade(0)]), Rgb::BLACK);
    }

    #[test]
    fn test_lum_mod_half_on_1f497d() {
        let base = Rgb::from_hex("1F497D").unwrap();
        let result = apply_modifiers(base, &[Modifier::LumMod(50_000)]);
        // 0x1F * 0.5 = 15.5 -> 16, 0x49 * 0.5 = 36.5 -> 37 (round-half-up
        // on exact halves), 0x7D * 0.5 = 62.5 -> 63.
        assert_eq!(result, Rgb::new(16, 37, 63));
    }

    #[test]
    fn test_modifiers_apply_in_source_order() {
        let base = Rgb::new(100, 100, 100);
        // lumMod 50% then lumOff 50%: 100*0.5 + 127.5 = 177.5 -> 178
        let a = apply_modifiers(base, &[Modifier::LumMod(50_000), Modifier::LumOff(50_000)]);
        assert_eq!(a, Rgb::new(178, 178, 178));
        // Reversed: min(100+127.5, 255)*0.5 = 113.75 -> 114
        let b = apply_modifiers(base, &[Modifier::LumOff(50_000), Modifier::LumMod(50_000)]);
        assert_eq!(b, Rgb::new(114, 114, 114));
    }

    #[test]
    fn test_from_element_scheme_with_modifiers() {
        let xml = r#"<a:schemeClr xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" val="accent1"><a:lumMod val="75000"/><a:lumOff val="25000"/></a:schemeClr>"#;
        let element = parse_document(xml.as_bytes()).unwrap();
        let reference = ColorReference::from_element(&element).unwrap();
        assert_eq!(
            reference,
            ColorReference::Scheme {
                slot: "accent1".to_string(),
                modifiers: smallvec![Modifier::LumMod(75_000), Modifier::LumOff(25_000)],
            }
        );
    }

    #[test]
    fn test_from_element_sys_color_uses_last_computed() {
        let xml = r#"<a:sysClr xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" val="windowText" lastClr="000000"/>"#;
        let element = parse_document(xml.as_bytes()).unwrap();
        assert_eq!(
            ColorReference::from_element(&element),
            Some(ColorReference::Literal(Rgb::BLACK))
        );
    }

    proptest! {
        #[test]
        fn prop_hex_round_trip(r: u8, g: u8, b: u8) {
            let rgb = Rgb::new(r, g, b);
            prop_assert_eq!(Rgb::from_hex(&rgb.to_hex()), Some(rgb));
        }

        #[test]
        fn prop_resolved_channels_always_in_range(
            r: u8, g: u8, b: u8,
            pcts in proptest::collection::vec(0u32..=200_000, 0..4)
        ) {
            // Out-of-range percentages must clamp, not wrap or panic.
            let modifiers: Modifiers = pcts
                .iter()
                .enumerate()
                .map(|(i, &p)| match i % 4 {
                    0 => Modifier::LumMod(p),
                    1 => Modifier::LumOff(p),
                    2 => Modifier::Tint(p),
                    _ => Modifier::Shade(p),
                })
                .collect();
            // Resolving must terminate with a concrete value.
            let _ = apply_modifiers(Rgb::new(r, g, b), &modifiers);
        }

        #[test]
        fn prop_shade_never_brightens(r: u8, g: u8, b: u8, p in 0u32..=100_000) {
            let base = Rgb::new(r, g, b);
            let shaded = apply_modifiers(base, &[Modifier::Shade(p)]);
            prop_assert!(shaded.r <= base.r);
            prop_assert!(shaded.g <= base.g);
            prop_assert!(shaded.b <= base.b);
        }
    }
}
