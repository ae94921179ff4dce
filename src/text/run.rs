//! Run style composition.
//!
//! The rendered style of one text run is composed from its own property
//! element, the paragraph's default property element, and the theme.
//! Resolution order per attribute: explicit run value, then paragraph
//! default, then unset (renderer default).

use crate::color::{ColorReference, Rgb};
use crate::theme::ThemeData;
use crate::text::{BaselineShift, StyledFragment};
use crate::unit::centipoints_to_pt;
use crate::xml::{XmlElement, ns};

/// Resolution inputs shared by every run of a presentation: the theme's
/// font names and color map.
///
/// Passed explicitly into style composition so concurrently open
/// documents can never observe each other's substitutions.
#[derive(Debug, Clone, Copy)]
pub struct StyleContext<'a> {
    pub theme: &'a ThemeData,
}

impl<'a> StyleContext<'a> {
    pub fn new(theme: &'a ThemeData) -> Self {
        Self { theme }
    }
}

/// Composes flat fragment styles from run and paragraph property
/// elements.
pub struct RunStyleBuilder<'a> {
    ctx: StyleContext<'a>,
    /// Paragraph-level default run properties (`defRPr`, or the
    /// end-of-paragraph marker when no `defRPr` exists).
    paragraph_default: Option<&'a XmlElement>,
}

impl<'a> RunStyleBuilder<'a> {
    pub fn new(ctx: StyleContext<'a>, paragraph_default: Option<&'a XmlElement>) -> Self {
        Self {
            ctx,
            paragraph_default,
        }
    }

    /// Compose the style of one run into a fragment carrying `text`.
    ///
    /// `run_props` is the run's own property element (`rPr`), absent when
    /// the run carries none.
    pub fn build(&self, run_props: Option<&'a XmlElement>, text: String) -> StyledFragment {
        let mut fragment = StyledFragment::plain(text);

        fragment.size_pt = self
            .attr_chain(run_props, "sz")
            .and_then(|v| v.parse::<i64>().ok())
            .map(centipoints_to_pt);
        fragment.bold = self.attr_chain(run_props, "b").map(parse_bool);
        fragment.italic = self.attr_chain(run_props, "i").map(parse_bool);
        fragment.underline = self
            .attr_chain(run_props, "u")
            .map(|v| v != "none");
        fragment.strike = self
            .attr_chain(run_props, "strike")
            .map(|v| v != "noStrike");
        fragment.letter_spacing_pt = self
            .attr_chain(run_props, "spc")
            .and_then(|v| v.parse::<i64>().ok())
            .map(centipoints_to_pt);
        fragment.baseline = self
            .attr_chain(run_props, "baseline")
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|v| match v {
                v if v > 0 => Some(BaselineShift::Superscript),
                v if v < 0 => Some(BaselineShift::Subscript),
                _ => None,
            });
        fragment.font = self.resolve_font(run_props);
        fragment.color = self.resolve_color(run_props);

        fragment
    }

    /// First definition of an attribute along run -> paragraph default.
    fn attr_chain(&self, run_props: Option<&'a XmlElement>, name: &str) -> Option<&'a str> {
        run_props
            .and_then(|e| e.attr(name))
            .or_else(|| self.paragraph_default.and_then(|e| e.attr(name)))
    }

    /// First `latin` typeface along the chain, substituting the theme's
    /// major/minor font for the reserved placeholder tokens.
    fn resolve_font(&self, run_props: Option<&'a XmlElement>) -> Option<String> {
        let typeface = run_props
            .and_then(latin_typeface)
            .or_else(|| self.paragraph_default.and_then(latin_typeface))?;
        let resolved = match typeface {
            "+mj-lt" => self.ctx.theme.major_font(),
            "+mn-lt" => self.ctx.theme.minor_font(),
            other => other,
        };
        Some(resolved.to_string())
    }

    /// First `solidFill` along the chain (run level preferred), resolved
    /// against the theme. An unresolved scheme slot falls back to black
    /// rather than propagating a missing value.
    fn resolve_color(&self, run_props: Option<&'a XmlElement>) -> Option<Rgb> {
        let fill = run_props
            .and_then(|e| e.child(ns::DRAWING_NS, "solidFill"))
            .or_else(|| {
                self.paragraph_default
                    .and_then(|e| e.child(ns::DRAWING_NS, "solidFill"))
            })?;
        let reference = ColorReference::from_fill_element(fill)?;
        Some(reference.resolve(self.ctx.theme).unwrap_or(Rgb::BLACK))
    }
}

fn latin_typeface(props: &XmlElement) -> Option<&str> {
    props.child(ns::DRAWING_NS, "latin")?.attr("typeface")
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::ThemeData;
    use crate::xml::parse_document;

    const A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

    fn parse(xml: &str) -> XmlElement {
        parse_document(xml.as_bytes()).unwrap()
    }

    fn theme() -> ThemeData {
        let mut theme = ThemeData::empty();
        theme.insert_scheme_color("accent1", Rgb::from_hex("4472C4").unwrap());
        theme
    }

    #[test]
    fn test_explicit_run_value_wins_over_paragraph_default() {
        let theme = theme();
        let default = parse(&format!(r#"<a:defRPr xmlns:a="{A}" sz="1200" b="1"/>"#));
        let rpr = parse(&format!(r#"<a:rPr xmlns:a="{A}" sz="2400"/>"#));
        let builder = RunStyleBuilder::new(StyleContext::new(&theme), Some(&default));
        let fragment = builder.build(Some(&rpr), "x".into());
        assert_eq!(fragment.size_pt, Some(24.0));
        // Bold is not set on the run, so the paragraph default applies.
        assert_eq!(fragment.bold, Some(true));
    }

    #[test]
    fn test_unset_everywhere_stays_unset() {
        let theme = theme();
        let builder = RunStyleBuilder::new(StyleContext::new(&theme), None);
        let fragment = builder.build(None, "x".into());
        assert_eq!(fragment.size_pt, None);
        assert_eq!(fragment.bold, None);
        assert_eq!(fragment.color, None);
        assert_eq!(fragment.font, None);
    }

    #[test]
    fn test_major_font_placeholder_substitution() {
        let theme = ThemeData::from_xml(
            format!(
                r#"<a:theme xmlns:a="{A}"><a:themeElements><a:fontScheme name="f">
                   <a:majorFont><a:latin typeface="Georgia"/></a:majorFont>
                   <a:minorFont><a:latin typeface="Verdana"/></a:minorFont>
                   </a:fontScheme></a:themeElements></a:theme>"#
            )
            .as_bytes(),
        )
        .unwrap();
        let rpr = parse(&format!(r#"<a:rPr xmlns:a="{A}"><a:latin typeface="+mj-lt"/></a:rPr>"#));
        let builder = RunStyleBuilder::new(StyleContext::new(&theme), None);
        let fragment = builder.build(Some(&rpr), "x".into());
        assert_eq!(fragment.font.as_deref(), Some("Georgia"));

        let rpr = parse(&format!(r#"<a:rPr xmlns:a="{A}"><a:latin typeface="+mn-lt"/></a:rPr>"#));
        let fragment = builder.build(Some(&rpr), "x".into());
        assert_eq!(fragment.font.as_deref(), Some("Verdana"));
    }

    #[test]
    fn test_scheme_color_resolves_through_theme() {
        let theme = theme();
        let rpr = parse(&format!(
            r#"<a:rPr xmlns:a="{A}"><a:solidFill><a:schemeClr val="accent1"/></a:solidFill></a:rPr>"#
        ));
        let builder = RunStyleBuilder::new(StyleContext::new(&theme), None);
        let fragment = builder.build(Some(&rpr), "x".into());
        assert_eq!(fragment.color, Rgb::from_hex("4472C4"));
    }

    #[test]
    fn test_unresolved_scheme_slot_falls_back_to_black() {
        let theme = ThemeData::empty();
        let rpr = parse(&format!(
            r#"<a:rPr xmlns:a="{A}"><a:solidFill><a:schemeClr val="accent1"/></a:solidFill></a:rPr>"#
        ));
        let builder = RunStyleBuilder::new(StyleContext::new(&theme), None);
        let fragment = builder.build(Some(&rpr), "x".into());
        assert_eq!(fragment.color, Some(Rgb::BLACK));
    }

    #[test]
    fn test_baseline_sign_selects_script() {
        let theme = theme();
        let builder = RunStyleBuilder::new(StyleContext::new(&theme), None);

        let sup = parse(&format!(r#"<a:rPr xmlns:a="{A}" baseline="30000"/>"#));
        assert_eq!(
            builder.build(Some(&sup), "x".into()).baseline,
            Some(BaselineShift::Superscript)
        );

        let sub = parse(&format!(r#"<a:rPr xmlns:a="{A}" baseline="-25000"/>"#));
        assert_eq!(
            builder.build(Some(&sub), "x".into()).baseline,
            Some(BaselineShift::Subscript)
        );

        let zero = parse(&format!(r#"<a:rPr xmlns:a="{A}" baseline="0"/>"#));
        assert_eq!(builder.build(Some(&zero), "x".into()).baseline, None);
    }

    #[test]
    fn test_underline_none_is_explicit_off() {
        let theme = theme();
        let builder = RunStyleBuilder::new(StyleContext::new(&theme), None);
        let rpr = parse(&format!(r#"<a:rPr xmlns:a="{A}" u="none"/>"#));
        assert_eq!(builder.build(Some(&rpr), "x".into()).underline, Some(false));
        let rpr = parse(&format!(r#"<a:rPr xmlns:a="{A}" u="sng"/>"#));
        assert_eq!(builder.build(Some(&rpr), "x".into()).underline, Some(true));
    }
}
