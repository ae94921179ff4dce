//! Shape model and per-shape parsing.
//!
//! Every shape on a slide carries a position/size transform in EMU plus a
//! fill/line description. The model is a closed tagged union; renderers
//! match on it instead of probing attributes.

pub mod extract;

pub use extract::ShapeExtractor;

use crate::color::{ColorReference, Rgb};
use crate::error::{EngineError, Result};
use crate::text::Paragraph;
use crate::theme::ThemeData;
use crate::xml::{XmlElement, ns};
use phf::phf_map;

/// Position and extent in EMU (914,400 per inch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transform {
    pub x: i64,
    pub y: i64,
    /// Width; never negative.
    pub cx: i64,
    /// Height; never negative.
    pub cy: i64,
}

impl Transform {
    /// Read `xfrm` below a shape-properties element.
    ///
    /// A shape without a parseable transform is malformed; the caller
    /// logs and skips it without aborting the slide.
    pub fn from_shape_properties(sp_pr: &XmlElement) -> Result<Self> {
        let xfrm = sp_pr
            .child(ns::DRAWING_NS, "xfrm")
            .ok_or_else(|| EngineError::ShapeParse("missing xfrm".to_string()))?;
        let off = xfrm
            .child(ns::DRAWING_NS, "off")
            .ok_or_else(|| EngineError::ShapeParse("xfrm without off".to_string()))?;
        let ext = xfrm
            .child(ns::DRAWING_NS, "ext")
            .ok_or_else(|| EngineError::ShapeParse("xfrm without ext".to_string()))?;

        let read = |e: &XmlElement, name: &str| -> Result<i64> {
            e.attr(name)
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| EngineError::ShapeParse(format!("bad xfrm attribute {name}")))
        };

        Ok(Self {
            x: read(off, "x")?,
            y: read(off, "y")?,
            cx: read(ext, "cx")?.max(0),
            cy: read(ext, "cy")?.max(0),
        })
    }
}

/// Fill state of a shape. Exactly one of three states; `Unset` renders
/// as transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fill {
    /// Explicit no-paint (`noFill`).
    None,
    /// Solid color, fully resolved.
    Solid(Rgb),
    /// Nothing specified.
    #[default]
    Unset,
}

impl Fill {
    /// Read the fill of a shape-properties element.
    pub fn from_shape_properties(sp_pr: Option<&XmlElement>, theme: &ThemeData) -> Fill {
        let Some(sp_pr) = sp_pr else {
            return Fill::Unset;
        };
        if sp_pr.child(ns::DRAWING_NS, "noFill").is_some() {
            return Fill::None;
        }
        let Some(solid) = sp_pr.child(ns::DRAWING_NS, "solidFill") else {
            return Fill::Unset;
        };
        match ColorReference::from_fill_element(solid) {
            Some(reference) => Fill::Solid(reference.resolve(theme).unwrap_or(Rgb::BLACK)),
            None => Fill::Unset,
        }
    }

    /// Check whether this fill paints anything.
    pub fn is_visible(&self) -> bool {
        matches!(self, Fill::Solid(_))
    }
}

/// A shape's line (border) description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outline {
    pub color: Rgb,
    pub width_pt: f64,
}

/// Default line width when the `w` attribute is absent, one point.
const DEFAULT_LINE_WIDTH_EMU: i64 = 12_700;

impl Outline {
    /// Read a visible line from a shape-properties element.
    ///
    /// Returns `None` when there is no line element, the line is
    /// explicit no-paint, or its color does not parse.
    pub fn from_shape_properties(sp_pr: Option<&XmlElement>, theme: &ThemeData) -> Option<Outline> {
        let ln = sp_pr?.child(ns::DRAWING_NS, "ln")?;
        if ln.child(ns::DRAWING_NS, "noFill").is_some() {
            return None;
        }
        let solid = ln.child(ns::DRAWING_NS, "solidFill")?;
        let reference = ColorReference::from_fill_element(solid)?;
        let color = reference.resolve(theme).unwrap_or(Rgb::BLACK);
        let width_emu = ln.attr_i64("w").unwrap_or(DEFAULT_LINE_WIDTH_EMU);
        Some(Outline {
            color,
            width_pt: crate::unit::emu_to_pt(width_emu),
        })
    }
}

/// Preset geometry kinds the renderer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresetKind {
    #[default]
    Rectangle,
    RoundedRectangle,
    Ellipse,
    Triangle,
    RightTriangle,
    Diamond,
    Parallelogram,
    Trapezoid,
    Pentagon,
    Hexagon,
    Octagon,
    Star,
    Arrow,
    Line,
}

static PRESET_KINDS: phf::Map<&'static str, PresetKind> = phf_map! {
    "rect" => PresetKind::Rectangle,
    "roundRect" => PresetKind::RoundedRectangle,
    "ellipse" => PresetKind::Ellipse,
    "triangle" => PresetKind::Triangle,
    "rtTriangle" => PresetKind::RightTriangle,
    "diamond" => PresetKind::Diamond,
    "parallelogram" => PresetKind::Parallelogram,
    "trapezoid" => PresetKind::Trapezoid,
    "pentagon" => PresetKind::Pentagon,
    "hexagon" => PresetKind::Hexagon,
    "octagon" => PresetKind::Octagon,
    "star5" => PresetKind::Star,
    "rightArrow" => PresetKind::Arrow,
    "line" => PresetKind::Line,
};

impl PresetKind {
    /// Map a `prstGeom` preset name; anything unrecognized renders as a
    /// rectangle.
    pub fn from_preset_name(name: &str) -> Self {
        PRESET_KINDS.get(name).copied().unwrap_or_default()
    }
}

/// Decoded pixel data of an embedded picture, 8-bit RGBA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixels {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A shape with a text body.
#[derive(Debug, Clone, PartialEq)]
pub struct TextShape {
    pub name: String,
    pub transform: Transform,
    pub paragraphs: Vec<Paragraph>,
    pub fill: Fill,
    pub outline: Option<Outline>,
}

/// An embedded picture.
#[derive(Debug, Clone, PartialEq)]
pub struct PictureShape {
    pub name: String,
    pub transform: Transform,
    /// Archive entry name the picture was embedded from.
    pub media_entry: String,
    /// Decoded pixels; `None` when media decoding is disabled.
    pub pixels: Option<Pixels>,
}

/// A textless preset-geometry shape.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometricShape {
    pub name: String,
    pub transform: Transform,
    pub preset: PresetKind,
    pub fill: Fill,
    pub outline: Option<Outline>,
}

/// A connector with a visible line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorShape {
    pub name: String,
    pub transform: Transform,
    pub line_color: Rgb,
    pub line_width_pt: f64,
}

/// One shape on a slide. Each shape is owned exclusively by its slide.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Text(TextShape),
    Picture(PictureShape),
    Geometric(GeometricShape),
    Connector(ConnectorShape),
}

impl Shape {
    /// The shape's transform, whatever its kind.
    pub fn transform(&self) -> Transform {
        match self {
            Shape::Text(s) => s.transform,
            Shape::Picture(s) => s.transform,
            Shape::Geometric(s) => s.transform,
            Shape::Connector(s) => s.transform,
        }
    }

    /// The shape's name from its non-visual properties, possibly empty.
    pub fn name(&self) -> &str {
        match self {
            Shape::Text(s) => &s.name,
            Shape::Picture(s) => &s.name,
            Shape::Geometric(s) => &s.name,
            Shape::Connector(s) => &s.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    const A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

    #[test]
    fn test_transform_clamps_negative_extent() {
        let xml = format!(
            r#"<a:spPr xmlns:a="{A}"><a:xfrm><a:off x="10" y="20"/><a:ext cx="-5" cy="30"/></a:xfrm></a:spPr>"#
        );
        let sp_pr = parse_document(xml.as_bytes()).unwrap();
        let t = Transform::from_shape_properties(&sp_pr).unwrap();
        assert_eq!(t, Transform { x: 10, y: 20, cx: 0, cy: 30 });
    }

    #[test]
    fn test_transform_missing_is_error() {
        let xml = format!(r#"<a:spPr xmlns:a="{A}"/>"#);
        let sp_pr = parse_document(xml.as_bytes()).unwrap();
        assert!(matches!(
            Transform::from_shape_properties(&sp_pr),
            Err(EngineError::ShapeParse(_))
        ));
    }

    #[test]
    fn test_fill_three_states() {
        let theme = ThemeData::empty();

        let no_fill = parse_document(
            format!(r#"<a:spPr xmlns:a="{A}"><a:noFill/></a:spPr>"#).as_bytes(),
        )
        .unwrap();
        assert_eq!(Fill::from_shape_properties(Some(&no_fill), &theme), Fill::None);

        let solid = parse_document(
            format!(
                r#"<a:spPr xmlns:a="{A}"><a:solidFill><a:srgbClr val="FF0000"/></a:solidFill></a:spPr>"#
            )
            .as_bytes(),
        )
        .unwrap();
        assert_eq!(
            Fill::from_shape_properties(Some(&solid), &theme),
            Fill::Solid(Rgb::new(255, 0, 0))
        );

        let unset = parse_document(format!(r#"<a:spPr xmlns:a="{A}"/>"#).as_bytes()).unwrap();
        assert_eq!(Fill::from_shape_properties(Some(&unset), &theme), Fill::Unset);
        assert_eq!(Fill::from_shape_properties(None, &theme), Fill::Unset);
    }

    #[test]
    fn test_outline_width_conversion() {
        let theme = ThemeData::empty();
        let sp_pr = parse_document(
            format!(
                r#"<a:spPr xmlns:a="{A}"><a:ln w="25400"><a:solidFill><a:srgbClr val="00FF00"/></a:solidFill></a:ln></a:spPr>"#
            )
            .as_bytes(),
        )
        .unwrap();
        let outline = Outline::from_shape_properties(Some(&sp_pr), &theme).unwrap();
        assert_eq!(outline.color, Rgb::new(0, 255, 0));
        assert!((outline.width_pt - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_outline_no_fill_is_invisible() {
        let theme = ThemeData::empty();
        let sp_pr = parse_document(
            format!(r#"<a:spPr xmlns:a="{A}"><a:ln w="12700"><a:noFill/></a:ln></a:spPr>"#)
                .as_bytes(),
        )
        .unwrap();
        assert!(Outline::from_shape_properties(Some(&sp_pr), &theme).is_none());
    }

    #[test]
    fn test_preset_kind_defaults_to_rectangle() {
        assert_eq!(PresetKind::from_preset_name("ellipse"), PresetKind::Ellipse);
        assert_eq!(
            PresetKind::from_preset_name("actionButtonMovie"),
            PresetKind::Rectangle
        );
    }
}
