//! Shape extraction.
//!
//! Extracts every renderable shape from a slide's shape tree in four
//! passes: text shapes, pictures, connectors, then textless geometric
//! shapes. A malformed shape is logged and skipped; it never aborts
//! extraction of the remaining shapes on the slide.

use crate::error::Result;
use crate::opc::Relationships;
use crate::shapes::{
    ConnectorShape, Fill, GeometricShape, Outline, PictureShape, PresetKind, Shape, TextShape,
    Transform,
};
use crate::text::{ParagraphAssembler, StyleContext};
use crate::xml::{XmlElement, ns};
use log::{debug, warn};
use std::collections::HashMap;

/// One extracted shape plus the index of its element among the shape
/// tree's children, used to address the element again when edits are
/// written back.
#[derive(Debug, Clone)]
pub struct ExtractedShape {
    pub shape: Shape,
    pub(crate) node_index: usize,
}

/// Extracts shapes from one slide part.
pub struct ShapeExtractor<'a> {
    ctx: StyleContext<'a>,
    /// The slide's relationships, for resolving embedded media.
    rels: Option<&'a Relationships>,
    /// Media entry bytes, keyed by entry name, prefetched by the load
    /// pipeline.
    media: &'a HashMap<String, Vec<u8>>,
    decode_media: bool,
}

impl<'a> ShapeExtractor<'a> {
    pub fn new(
        ctx: StyleContext<'a>,
        rels: Option<&'a Relationships>,
        media: &'a HashMap<String, Vec<u8>>,
        decode_media: bool,
    ) -> Self {
        Self {
            ctx,
            rels,
            media,
            decode_media,
        }
    }

    /// Extract all shapes of a slide root element.
    pub fn extract(&self, slide_root: &XmlElement) -> Vec<Shape> {
        self.extract_with_slots(slide_root)
            .into_iter()
            .map(|e| e.shape)
            .collect()
    }

    /// Extract shapes along with their shape-tree node indices.
    pub fn extract_with_slots(&self, slide_root: &XmlElement) -> Vec<ExtractedShape> {
        let Some(tree) = slide_root.find_first(ns::PRESENTATION_NS, "spTree") else {
            return Vec::new();
        };
        let children: Vec<&XmlElement> = tree.child_elements().collect();
        let mut shapes = Vec::new();

        // Pass 1: text shapes.
        for (index, sp) in named(&children, "sp") {
            if sp.find_first(ns::PRESENTATION_NS, "txBody").is_none() {
                continue;
            }
            self.push(&mut shapes, index, self.parse_text_shape(sp));
        }
        // Pass 2: pictures.
        for (index, pic) in named(&children, "pic") {
            self.push(&mut shapes, index, self.parse_picture(pic));
        }
        // Pass 3: connectors.
        for (index, cxn) in named(&children, "cxnSp") {
            self.push(&mut shapes, index, self.parse_connector(cxn));
        }
        // Pass 4: textless geometric shapes.
        for (index, sp) in named(&children, "sp") {
            if sp.find_first(ns::PRESENTATION_NS, "txBody").is_some() {
                continue;
            }
            self.push(&mut shapes, index, self.parse_geometric(sp));
        }

        shapes
    }

    fn push(
        &self,
        shapes: &mut Vec<ExtractedShape>,
        node_index: usize,
        parsed: Result<Option<Shape>>,
    ) {
        match parsed {
            Ok(Some(shape)) => shapes.push(ExtractedShape { shape, node_index }),
            Ok(None) => {},
            Err(e) => warn!("skipping malformed shape: {e}"),
        }
    }

    fn parse_text_shape(&self, sp: &XmlElement) -> Result<Option<Shape>> {
        let sp_pr = sp.find_first(ns::PRESENTATION_NS, "spPr");
        let transform = self.require_transform(sp_pr)?;

        let mut paragraphs = Vec::new();
        if let Some(body) = sp.find_first(ns::PRESENTATION_NS, "txBody") {
            let assembler = ParagraphAssembler::new(self.ctx);
            for p in body.child_elements().filter(|e| e.is(ns::DRAWING_NS, "p")) {
                paragraphs.push(assembler.assemble(p));
            }
        }

        Ok(Some(Shape::Text(TextShape {
            name: shape_name(sp),
            transform,
            paragraphs,
            fill: Fill::from_shape_properties(sp_pr, self.ctx.theme),
            outline: Outline::from_shape_properties(sp_pr, self.ctx.theme),
        })))
    }

    fn parse_picture(&self, pic: &XmlElement) -> Result<Option<Shape>> {
        let sp_pr = pic.find_first(ns::PRESENTATION_NS, "spPr");
        let transform = self.require_transform(sp_pr)?;

        let embed_id = pic
            .find_first(ns::DRAWING_NS, "blip")
            .and_then(|blip| blip.attr_local("embed").map(|s| s.to_string()));
        let Some(embed_id) = embed_id else {
            debug!("picture without an embed relationship, skipping");
            return Ok(None);
        };
        let Some(media_entry) = self.rels.and_then(|r| r.target_of(&embed_id)) else {
            debug!("picture relationship {embed_id} does not resolve, skipping");
            return Ok(None);
        };
        let Some(bytes) = self.media.get(&media_entry) else {
            debug!("media entry {media_entry} not found in archive, skipping");
            return Ok(None);
        };

        let pixels = if self.decode_media {
            match decode_pixels(bytes) {
                Some(pixels) => Some(pixels),
                None => {
                    debug!("media entry {media_entry} did not decode, skipping picture");
                    return Ok(None);
                },
            }
        } else {
            None
        };

        Ok(Some(Shape::Picture(PictureShape {
            name: shape_name(pic),
            transform,
            media_entry,
            pixels,
        })))
    }

    fn parse_connector(&self, cxn: &XmlElement) -> Result<Option<Shape>> {
        let sp_pr = cxn.find_first(ns::PRESENTATION_NS, "spPr");
        let transform = self.require_transform(sp_pr)?;

        // Connectors are only retained when their line is visible.
        let Some(outline) = Outline::from_shape_properties(sp_pr, self.ctx.theme) else {
            return Ok(None);
        };

        Ok(Some(Shape::Connector(ConnectorShape {
            name: shape_name(cxn),
            transform,
            line_color: outline.color,
            line_width_pt: outline.width_pt,
        })))
    }

    fn parse_geometric(&self, sp: &XmlElement) -> Result<Option<Shape>> {
        let sp_pr = sp.find_first(ns::PRESENTATION_NS, "spPr");
        let transform = self.require_transform(sp_pr)?;

        let fill = Fill::from_shape_properties(sp_pr, self.ctx.theme);
        let outline = Outline::from_shape_properties(sp_pr, self.ctx.theme);
        // An explicit-no-paint shape is dropped, not rendered as an
        // invisible placeholder.
        if !fill.is_visible() && outline.is_none() {
            return Ok(None);
        }

        let preset = sp_pr
            .and_then(|pr| pr.child(ns::DRAWING_NS, "prstGeom"))
            .and_then(|g| g.attr("prst"))
            .map(PresetKind::from_preset_name)
            .unwrap_or_default();

        Ok(Some(Shape::Geometric(GeometricShape {
            name: shape_name(sp),
            transform,
            preset,
            fill,
            outline,
        })))
    }

    fn require_transform(&self, sp_pr: Option<&XmlElement>) -> Result<Transform> {
        let sp_pr = sp_pr.ok_or_else(|| {
            crate::error::EngineError::ShapeParse("missing shape properties".to_string())
        })?;
        Transform::from_shape_properties(sp_pr)
    }
}

/// Children of the shape tree with the given local name, keeping their
/// child index.
fn named<'a>(
    children: &'a [&'a XmlElement],
    local: &'a str,
) -> impl Iterator<Item = (usize, &'a XmlElement)> {
    children
        .iter()
        .enumerate()
        .filter(move |(_, e)| e.is(ns::PRESENTATION_NS, local))
        .map(|(i, e)| (i, *e))
}

fn shape_name(shape: &XmlElement) -> String {
    shape
        .find_first(ns::PRESENTATION_NS, "cNvPr")
        .and_then(|e| e.attr("name"))
        .unwrap_or_default()
        .to_string()
}

#[cfg(feature = "media")]
fn decode_pixels(bytes: &[u8]) -> Option<crate::shapes::Pixels> {
    let decoded = image::load_from_memory(bytes).ok()?;
    let rgba = decoded.to_rgba8();
    Some(crate::shapes::Pixels {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
    })
}

#[cfg(not(feature = "media"))]
fn decode_pixels(_bytes: &[u8]) -> Option<crate::shapes::Pixels> {
    None
}
