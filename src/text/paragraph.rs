//! Paragraph assembly.
//!
//! Walks one paragraph element's children in strict document order and
//! produces the ordered fragment sequence plus block-level layout hints.
//! Runs, field codes, and explicit line breaks are siblings that must be
//! interleaved exactly as written, never grouped by type.

use crate::text::{Alignment, Paragraph, RunStyleBuilder, StyleContext, StyledFragment};
use crate::unit::centipoints_to_pt;
use crate::xml::{XmlElement, XmlNode, ns};

/// Assembles [`Paragraph`] values from paragraph elements (`a:p`).
pub struct ParagraphAssembler<'a> {
    ctx: StyleContext<'a>,
}

impl<'a> ParagraphAssembler<'a> {
    pub fn new(ctx: StyleContext<'a>) -> Self {
        Self { ctx }
    }

    /// Assemble one paragraph.
    pub fn assemble(&self, p: &XmlElement) -> Paragraph {
        let p_pr = p.child(ns::DRAWING_NS, "pPr");
        // The paragraph default style is defRPr under pPr; the trailing
        // end-of-paragraph marker stands in when defRPr is absent.
        let paragraph_default = p_pr
            .and_then(|pr| pr.child(ns::DRAWING_NS, "defRPr"))
            .or_else(|| p.child(ns::DRAWING_NS, "endParaRPr"));
        let builder = RunStyleBuilder::new(self.ctx, paragraph_default);

        let mut paragraph = Paragraph::default();
        self.read_properties(&mut paragraph, p_pr);

        let mut direct_text = String::new();
        for node in p.nodes() {
            match node {
                XmlNode::Element(child) if child.namespace() == Some(ns::DRAWING_NS) => {
                    match child.local_name() {
                        "r" | "fld" => {
                            let run_props = child.child(ns::DRAWING_NS, "rPr");
                            let text = child
                                .child(ns::DRAWING_NS, "t")
                                .map(|t| t.text())
                                .unwrap_or_default();
                            paragraph.fragments.push(builder.build(run_props, text));
                        },
                        "br" => {
                            paragraph.fragments.push(StyledFragment::line_break());
                        },
                        _ => {},
                    }
                },
                XmlNode::Text(t) => direct_text.push_str(t),
                _ => {},
            }
        }

        // A paragraph with no runs but non-empty direct text still yields
        // one fragment, styled from the paragraph default.
        if paragraph.fragments.is_empty() && !direct_text.trim().is_empty() {
            paragraph.fragments.push(builder.build(None, direct_text));
        }

        paragraph
    }

    fn read_properties(&self, paragraph: &mut Paragraph, p_pr: Option<&XmlElement>) {
        let Some(p_pr) = p_pr else {
            return;
        };

        if let Some(algn) = p_pr.attr("algn") {
            paragraph.align = Alignment::from_attr(algn);
        }
        if let Some(lvl) = p_pr.attr("lvl").and_then(|v| v.parse().ok()) {
            paragraph.indent_level = lvl;
        }
        paragraph.has_bullet = p_pr.child(ns::DRAWING_NS, "buChar").is_some()
            || p_pr.child(ns::DRAWING_NS, "buAutoNum").is_some();

        paragraph.line_spacing_pct = p_pr
            .child(ns::DRAWING_NS, "lnSpc")
            .and_then(|e| e.child(ns::DRAWING_NS, "spcPct"))
            .and_then(|e| e.attr_i64("val"))
            .map(|v| v as f64 / 1000.0);
        paragraph.space_before_pt = spacing_points(p_pr, "spcBef");
        paragraph.space_after_pt = spacing_points(p_pr, "spcAft");
    }
}

fn spacing_points(p_pr: &XmlElement, name: &str) -> Option<f64> {
    p_pr.child(ns::DRAWING_NS, name)?
        .child(ns::DRAWING_NS, "spcPts")?
        .attr_i64("val")
        .map(centipoints_to_pt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::ThemeData;
    use crate::xml::parse_document;

    const A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

    fn assemble(xml: &str) -> Paragraph {
        let theme = ThemeData::empty();
        let element = parse_document(xml.as_bytes()).unwrap();
        ParagraphAssembler::new(StyleContext::new(&theme)).assemble(&element)
    }

    #[test]
    fn test_runs_fields_and_breaks_interleave_in_document_order() {
        let paragraph = assemble(&format!(
            r#"<a:p xmlns:a="{A}">
                 <a:r><a:t>before</a:t></a:r>
                 <a:br/>
                 <a:fld id="{{X}}" type="slidenum"><a:t>3</a:t></a:fld>
                 <a:r><a:t>after</a:t></a:r>
               </a:p>"#
        ));
        let texts: Vec<&str> = paragraph.fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["before", "\n", "3", "after"]);
        assert!(paragraph.fragments[1].is_line_break());
    }

    #[test]
    fn test_paragraph_metadata() {
        let paragraph = assemble(&format!(
            r#"<a:p xmlns:a="{A}">
                 <a:pPr algn="ctr" lvl="2">
                   <a:lnSpc><a:spcPct val="150000"/></a:lnSpc>
                   <a:spcBef><a:spcPts val="600"/></a:spcBef>
                   <a:spcAft><a:spcPts val="1200"/></a:spcAft>
                   <a:buChar char="-"/>
                 </a:pPr>
                 <a:r><a:t>x</a:t></a:r>
               </a:p>"#
        ));
        assert_eq!(paragraph.align, Alignment::Center);
        assert_eq!(paragraph.indent_level, 2);
        assert!(paragraph.has_bullet);
        assert_eq!(paragraph.line_spacing_pct, Some(150.0));
        assert_eq!(paragraph.space_before_pt, Some(6.0));
        assert_eq!(paragraph.space_after_pt, Some(12.0));
    }

    #[test]
    fn test_bullet_suppressed_by_bu_none() {
        let paragraph = assemble(&format!(
            r#"<a:p xmlns:a="{A}"><a:pPr><a:buNone/></a:pPr><a:r><a:t>x</a:t></a:r></a:p>"#
        ));
        assert!(!paragraph.has_bullet);
    }

    #[test]
    fn test_direct_text_without_runs_synthesizes_one_fragment() {
        let paragraph = assemble(&format!(
            r#"<a:p xmlns:a="{A}"><a:pPr><a:defRPr b="1"/></a:pPr>orphan text</a:p>"#
        ));
        assert_eq!(paragraph.fragments.len(), 1);
        assert_eq!(paragraph.fragments[0].text, "orphan text");
        assert_eq!(paragraph.fragments[0].bold, Some(true));
    }

    #[test]
    fn test_empty_paragraph_has_no_fragments() {
        let paragraph = assemble(&format!(r#"<a:p xmlns:a="{A}"/>"#));
        assert!(paragraph.fragments.is_empty());
    }

    #[test]
    fn test_end_para_marker_is_fallback_default_style() {
        let paragraph = assemble(&format!(
            r#"<a:p xmlns:a="{A}">
                 <a:r><a:t>x</a:t></a:r>
                 <a:endParaRPr sz="3200"/>
               </a:p>"#
        ));
        assert_eq!(paragraph.fragments[0].size_pt, Some(32.0));
    }
}
