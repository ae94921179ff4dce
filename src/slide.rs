//! Slide model and background fills.

use crate::color::{ColorReference, Rgb};
use crate::shapes::Shape;
use crate::theme::ThemeData;
use crate::unit::{angle_units_to_degrees, percent_mille_to_fraction};
use crate::xml::{XmlElement, ns};

/// One gradient stop: position along the gradient axis plus its color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    /// Position in 0.0..=1.0.
    pub position: f64,
    pub color: Rgb,
}

/// A linear gradient across two or more resolved stop colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub stops: Vec<GradientStop>,
    /// Rotation in degrees, when the source declared one.
    pub angle_degrees: Option<f64>,
}

/// The effective background of a slide, always concrete after chain
/// resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    Solid(Rgb),
    Gradient(Gradient),
}

impl Default for Background {
    /// The last-resort background when no level of the inheritance chain
    /// defines one.
    fn default() -> Self {
        Background::Solid(Rgb::WHITE)
    }
}

impl Background {
    /// Read the background declared by one part (slide, layout, or
    /// master), resolved against that part's own theme.
    ///
    /// Returns `None` when the part declares no background, which sends
    /// the chain resolver on to the next level.
    pub fn from_part_tree(part_root: &XmlElement, theme: &ThemeData) -> Option<Background> {
        let bg = part_root.find_first(ns::PRESENTATION_NS, "bg")?;

        if let Some(bg_pr) = bg.child(ns::PRESENTATION_NS, "bgPr") {
            if let Some(solid) = bg_pr.child(ns::DRAWING_NS, "solidFill") {
                let reference = ColorReference::from_fill_element(solid)?;
                return Some(Background::Solid(
                    reference.resolve(theme).unwrap_or(Rgb::BLACK),
                ));
            }
            if let Some(grad) = bg_pr.child(ns::DRAWING_NS, "gradFill") {
                return gradient_from_element(grad, theme);
            }
            return None;
        }

        // A background reference picks a theme fill; the color child is
        // the part that survives into rendering.
        let bg_ref = bg.child(ns::PRESENTATION_NS, "bgRef")?;
        let reference = ColorReference::from_fill_element(bg_ref)?;
        Some(Background::Solid(
            reference.resolve(theme).unwrap_or(Rgb::BLACK),
        ))
    }
}

/// Read a gradient fill. One usable stop degrades to a solid; zero
/// leaves the background undefined.
fn gradient_from_element(grad: &XmlElement, theme: &ThemeData) -> Option<Background> {
    let mut stops = Vec::new();
    if let Some(list) = grad.child(ns::DRAWING_NS, "gsLst") {
        for gs in list
            .child_elements()
            .filter(|e| e.is(ns::DRAWING_NS, "gs"))
        {
            let Some(reference) = ColorReference::from_fill_element(gs) else {
                continue;
            };
            let color = reference.resolve(theme).unwrap_or(Rgb::BLACK);
            let position = gs
                .attr_i64("pos")
                .map(percent_mille_to_fraction)
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            stops.push(GradientStop { position, color });
        }
    }

    match stops.len() {
        0 => None,
        1 => Some(Background::Solid(stops[0].color)),
        _ => {
            let angle_degrees = grad
                .child(ns::DRAWING_NS, "lin")
                .and_then(|lin| lin.attr_i64("ang"))
                .map(angle_units_to_degrees);
            Some(Background::Gradient(Gradient {
                stops,
                angle_degrees,
            }))
        },
    }
}

/// One slide of the decoded presentation.
///
/// Owned by the presentation snapshot; created on load, replaced
/// wholesale by editor-driven append/remove/reorder, dropped on document
/// close or slide deletion.
#[derive(Debug, Clone)]
pub struct Slide {
    /// Slide id from the manifest's slide list.
    pub id: u32,
    /// Slide name from its common properties, possibly empty.
    pub name: String,
    /// Archive entry name of the slide part.
    pub part_name: String,
    /// Whether the slide is flagged hidden for the slideshow.
    pub hidden: bool,
    pub background: Background,
    pub shapes: Vec<Shape>,
}

impl Slide {
    /// Concatenated text of all text shapes, paragraphs separated by
    /// newlines.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for shape in &self.shapes {
            if let Shape::Text(text_shape) = shape {
                for paragraph in &text_shape.paragraphs {
                    let text = paragraph.text();
                    if text.is_empty() {
                        continue;
                    }
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&text);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    const NSDECL: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

    fn part(bg: &str) -> XmlElement {
        let xml = format!(r#"<p:sld {NSDECL}><p:cSld>{bg}<p:spTree/></p:cSld></p:sld>"#);
        parse_document(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_solid_background() {
        let theme = ThemeData::empty();
        let root = part(
            r#"<p:bg><p:bgPr><a:solidFill><a:srgbClr val="112233"/></a:solidFill></p:bgPr></p:bg>"#,
        );
        assert_eq!(
            Background::from_part_tree(&root, &theme),
            Some(Background::Solid(Rgb::from_hex("112233").unwrap()))
        );
    }

    #[test]
    fn test_gradient_background() {
        let theme = ThemeData::empty();
        let root = part(
            r#"<p:bg><p:bgPr><a:gradFill><a:gsLst>
                 <a:gs pos="0"><a:srgbClr val="FF0000"/></a:gs>
                 <a:gs pos="100000"><a:srgbClr val="0000FF"/></a:gs>
               </a:gsLst><a:lin ang="5400000"/></a:gradFill></p:bgPr></p:bg>"#,
        );
        let Some(Background::Gradient(gradient)) = Background::from_part_tree(&root, &theme)
        else {
            panic!("expected gradient");
        };
        assert_eq!(gradient.stops.len(), 2);
        assert_eq!(gradient.stops[0].color, Rgb::new(255, 0, 0));
        assert!((gradient.stops[1].position - 1.0).abs() < f64::EPSILON);
        assert_eq!(gradient.angle_degrees, Some(90.0));
    }

    #[test]
    fn test_single_stop_gradient_degrades_to_solid() {
        let theme = ThemeData::empty();
        let root = part(
            r#"<p:bg><p:bgPr><a:gradFill><a:gsLst>
                 <a:gs pos="0"><a:srgbClr val="ABCDEF"/></a:gs>
               </a:gsLst></a:gradFill></p:bgPr></p:bg>"#,
        );
        assert_eq!(
            Background::from_part_tree(&root, &theme),
            Some(Background::Solid(Rgb::from_hex("ABCDEF").unwrap()))
        );
    }

    #[test]
    fn test_background_reference_resolves_against_theme() {
        let mut theme = ThemeData::empty();
        theme.insert_scheme_color("accent1", Rgb::from_hex("4472C4").unwrap());
        let root = part(r#"<p:bg><p:bgRef idx="1001"><a:schemeClr val="accent1"/></p:bgRef></p:bg>"#);
        assert_eq!(
            Background::from_part_tree(&root, &theme),
            Some(Background::Solid(Rgb::from_hex("4472C4").unwrap()))
        );
    }

    #[test]
    fn test_no_background_is_none() {
        let theme = ThemeData::empty();
        let root = part("");
        assert_eq!(Background::from_part_tree(&root, &theme), None);
    }
}
