//! Inheritance chain resolution.
//!
//! A slide's unset properties fall back through its layout, then that
//! layout's master, then the master's theme. Every fallback in the engine
//! (background, theme association) walks the same ordered list of
//! resolution sources; nothing duplicates the chain per attribute.

use crate::opc::Relationships;
use crate::opc::constants::relationship_type;
use crate::slide::Background;
use crate::theme::ThemeData;
use crate::xml::XmlElement;
use std::collections::HashMap;

/// Which level of the chain a source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLevel {
    Slide,
    Layout,
    Master,
    /// A master outside the slide's own chain; last resort.
    FallbackMaster,
}

/// One level of the inheritance chain: a part tree plus the theme that
/// governs color resolution at that level.
#[derive(Clone, Copy)]
pub struct ResolutionSource<'a> {
    pub level: SourceLevel,
    pub part_name: &'a str,
    pub part: &'a XmlElement,
    pub theme: &'a ThemeData,
}

/// Walk sources in order and return the first defined value.
pub fn first_defined<'a, T>(
    sources: &[ResolutionSource<'a>],
    mut probe: impl FnMut(&ResolutionSource<'a>) -> Option<T>,
) -> Option<T> {
    sources.iter().find_map(|source| probe(source))
}

/// Resolves per-slide theme association and background through the
/// slide -> layout -> master -> theme relationship links.
///
/// One document may mix several masters, each with its own theme; the
/// resolver tracks the correct theme per slide rather than applying the
/// first theme globally.
pub struct ChainResolver<'a> {
    /// Parsed part trees, keyed by entry name.
    parts: &'a HashMap<String, XmlElement>,
    /// Per-part relationships, keyed by source entry name.
    rels: &'a HashMap<String, Relationships>,
    /// Theme data keyed by theme part entry name.
    themes: &'a HashMap<String, ThemeData>,
    /// All master part names in the document, discovery order.
    masters: &'a [String],
    /// Stand-in theme when no link resolves.
    fallback_theme: ThemeData,
}

impl<'a> ChainResolver<'a> {
    pub fn new(
        parts: &'a HashMap<String, XmlElement>,
        rels: &'a HashMap<String, Relationships>,
        themes: &'a HashMap<String, ThemeData>,
        masters: &'a [String],
    ) -> Self {
        Self {
            parts,
            rels,
            themes,
            masters,
            fallback_theme: ThemeData::empty(),
        }
    }

    /// The layout a slide part references, if any.
    pub fn layout_of(&self, slide_part: &str) -> Option<String> {
        self.rels
            .get(slide_part)?
            .first_target_of_type(relationship_type::SLIDE_LAYOUT)
    }

    /// The master a layout part references, if any.
    pub fn master_of(&self, layout_part: &str) -> Option<String> {
        self.rels
            .get(layout_part)?
            .first_target_of_type(relationship_type::SLIDE_MASTER)
    }

    /// The theme part a master declares, if any.
    pub fn theme_part_of(&self, master_part: &str) -> Option<String> {
        self.rels
            .get(master_part)?
            .first_target_of_type(relationship_type::THEME)
    }

    /// The theme governing a master's own colors.
    pub fn theme_of_master(&self, master_part: &str) -> &ThemeData {
        self.theme_part_of(master_part)
            .and_then(|name| self.themes.get(&name))
            .unwrap_or(&self.fallback_theme)
    }

    /// The theme that applies to a slide: its layout's master's theme.
    pub fn theme_for_slide(&self, slide_part: &str) -> &ThemeData {
        let theme = self
            .layout_of(slide_part)
            .and_then(|layout| self.master_of(&layout))
            .and_then(|master| self.theme_part_of(&master))
            .and_then(|name| self.themes.get(&name));
        theme.unwrap_or(&self.fallback_theme)
    }

    /// The ordered resolution sources for a slide: the slide itself, its
    /// layout, its layout's master, then every other master in the
    /// document as a last resort.
    pub fn sources_for_slide(&'a self, slide_part: &'a str) -> Vec<ResolutionSource<'a>> {
        let mut sources = Vec::with_capacity(3 + self.masters.len());

        let slide_theme = self.theme_for_slide(slide_part);
        if let Some(part) = self.parts.get(slide_part) {
            sources.push(ResolutionSource {
                level: SourceLevel::Slide,
                part_name: slide_part,
                part,
                theme: slide_theme,
            });
        }

        let layout = self.layout_of(slide_part);
        if let Some(layout_name) = &layout
            && let Some((key, part)) = self.parts.get_key_value(layout_name.as_str())
        {
            sources.push(ResolutionSource {
                level: SourceLevel::Layout,
                part_name: key.as_str(),
                part,
                // A layout resolves with its own master's theme, which is
                // the same theme the slide inherits.
                theme: slide_theme,
            });
        }

        let chain_master = layout.as_deref().and_then(|l| self.master_of(l));
        if let Some(master_name) = &chain_master
            && let Some((key, part)) = self.parts.get_key_value(master_name.as_str())
        {
            sources.push(ResolutionSource {
                level: SourceLevel::Master,
                part_name: key.as_str(),
                part,
                theme: self.theme_of_master(master_name),
            });
        }

        for master_name in self.masters {
            if Some(master_name.as_str()) == chain_master.as_deref() {
                continue;
            }
            if let Some(part) = self.parts.get(master_name) {
                sources.push(ResolutionSource {
                    level: SourceLevel::FallbackMaster,
                    part_name: master_name.as_str(),
                    part,
                    theme: self.theme_of_master(master_name),
                });
            }
        }

        sources
    }

    /// The effective background of a slide, walking the chain and
    /// stopping at the first level that defines one; plain white when
    /// none does.
    pub fn resolve_background(&'a self, slide_part: &'a str) -> Background {
        let sources = self.sources_for_slide(slide_part);
        first_defined(&sources, |source| {
            Background::from_part_tree(source.part, source.theme)
        })
        .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;
    use crate::xml::parse_document;

    const NSDECL: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;

    struct Fixture {
        parts: HashMap<String, XmlElement>,
        rels: HashMap<String, Relationships>,
        themes: HashMap<String, ThemeData>,
        masters: Vec<String>,
    }

    fn part_with_bg(bg: &str) -> XmlElement {
        let xml = format!(r#"<p:root {NSDECL}><p:cSld>{bg}<p:spTree/></p:cSld></p:root>"#);
        parse_document(xml.as_bytes()).unwrap()
    }

    fn solid_bg(hex: &str) -> String {
        format!(
            r#"<p:bg><p:bgPr><a:solidFill><a:srgbClr val="{hex}"/></a:solidFill></p:bgPr></p:bg>"#
        )
    }

    fn link(rels: &mut HashMap<String, Relationships>, from: &str, reltype: &str, to: &str) {
        let entry = rels
            .entry(from.to_string())
            .or_insert_with(|| Relationships::new(from.to_string()));
        // Targets are written relative to the source's directory.
        let relative = format!("/{to}");
        entry.add(reltype, &relative);
    }

    fn fixture() -> Fixture {
        let mut parts = HashMap::new();
        let mut rels = HashMap::new();
        let mut themes = HashMap::new();

        parts.insert("ppt/slides/slide1.xml".to_string(), part_with_bg(""));
        parts.insert("ppt/slideLayouts/slideLayout1.xml".to_string(), part_with_bg(""));
        parts.insert(
            "ppt/slideMasters/slideMaster1.xml".to_string(),
            part_with_bg(&solid_bg("112233")),
        );

        link(
            &mut rels,
            "ppt/slides/slide1.xml",
            relationship_type::SLIDE_LAYOUT,
            "ppt/slideLayouts/slideLayout1.xml",
        );
        link(
            &mut rels,
            "ppt/slideLayouts/slideLayout1.xml",
            relationship_type::SLIDE_MASTER,
            "ppt/slideMasters/slideMaster1.xml",
        );
        link(
            &mut rels,
            "ppt/slideMasters/slideMaster1.xml",
            relationship_type::THEME,
            "ppt/theme/theme1.xml",
        );

        let mut theme1 = ThemeData::empty();
        theme1.insert_scheme_color("accent1", Rgb::from_hex("AA0000").unwrap());
        themes.insert("ppt/theme/theme1.xml".to_string(), theme1);

        Fixture {
            parts,
            rels,
            themes,
            masters: vec!["ppt/slideMasters/slideMaster1.xml".to_string()],
        }
    }

    #[test]
    fn test_background_falls_back_to_master() {
        let f = fixture();
        let resolver = ChainResolver::new(&f.parts, &f.rels, &f.themes, &f.masters);
        assert_eq!(
            resolver.resolve_background("ppt/slides/slide1.xml"),
            Background::Solid(Rgb::from_hex("112233").unwrap())
        );
    }

    #[test]
    fn test_slide_background_wins_over_master() {
        let mut f = fixture();
        f.parts.insert(
            "ppt/slides/slide1.xml".to_string(),
            part_with_bg(&solid_bg("445566")),
        );
        let resolver = ChainResolver::new(&f.parts, &f.rels, &f.themes, &f.masters);
        assert_eq!(
            resolver.resolve_background("ppt/slides/slide1.xml"),
            Background::Solid(Rgb::from_hex("445566").unwrap())
        );
    }

    #[test]
    fn test_no_background_anywhere_is_white() {
        let mut f = fixture();
        f.parts.insert(
            "ppt/slideMasters/slideMaster1.xml".to_string(),
            part_with_bg(""),
        );
        let resolver = ChainResolver::new(&f.parts, &f.rels, &f.themes, &f.masters);
        assert_eq!(
            resolver.resolve_background("ppt/slides/slide1.xml"),
            Background::Solid(Rgb::WHITE)
        );
    }

    #[test]
    fn test_any_master_is_last_resort() {
        let mut f = fixture();
        // The chain master loses its background; a second, unlinked
        // master still provides one.
        f.parts.insert(
            "ppt/slideMasters/slideMaster1.xml".to_string(),
            part_with_bg(""),
        );
        f.parts.insert(
            "ppt/slideMasters/slideMaster2.xml".to_string(),
            part_with_bg(&solid_bg("778899")),
        );
        f.masters.push("ppt/slideMasters/slideMaster2.xml".to_string());
        let resolver = ChainResolver::new(&f.parts, &f.rels, &f.themes, &f.masters);
        assert_eq!(
            resolver.resolve_background("ppt/slides/slide1.xml"),
            Background::Solid(Rgb::from_hex("778899").unwrap())
        );
    }

    #[test]
    fn test_theme_tracks_the_correct_master() {
        let mut f = fixture();

        // Second chain: slide2 -> layout2 -> master2 -> theme2.
        f.parts.insert("ppt/slides/slide2.xml".to_string(), part_with_bg(""));
        f.parts.insert(
            "ppt/slideLayouts/slideLayout2.xml".to_string(),
            part_with_bg(""),
        );
        f.parts.insert(
            "ppt/slideMasters/slideMaster2.xml".to_string(),
            part_with_bg(""),
        );
        link(
            &mut f.rels,
            "ppt/slides/slide2.xml",
            relationship_type::SLIDE_LAYOUT,
            "ppt/slideLayouts/slideLayout2.xml",
        );
        link(
            &mut f.rels,
            "ppt/slideLayouts/slideLayout2.xml",
            relationship_type::SLIDE_MASTER,
            "ppt/slideMasters/slideMaster2.xml",
        );
        link(
            &mut f.rels,
            "ppt/slideMasters/slideMaster2.xml",
            relationship_type::THEME,
            "ppt/theme/theme2.xml",
        );
        let mut theme2 = ThemeData::empty();
        theme2.insert_scheme_color("accent1", Rgb::from_hex("00BB00").unwrap());
        f.themes.insert("ppt/theme/theme2.xml".to_string(), theme2);
        f.masters.push("ppt/slideMasters/slideMaster2.xml".to_string());

        let resolver = ChainResolver::new(&f.parts, &f.rels, &f.themes, &f.masters);
        assert_eq!(
            resolver
                .theme_for_slide("ppt/slides/slide1.xml")
                .scheme_color("accent1"),
            Rgb::from_hex("AA0000")
        );
        assert_eq!(
            resolver
                .theme_for_slide("ppt/slides/slide2.xml")
                .scheme_color("accent1"),
            Rgb::from_hex("00BB00")
        );
    }

    #[test]
    fn test_broken_chain_uses_empty_theme() {
        let f = fixture();
        let resolver = ChainResolver::new(&f.parts, &f.rels, &f.themes, &f.masters);
        let theme = resolver.theme_for_slide("ppt/slides/unknown.xml");
        assert!(theme.is_empty());
    }

    #[test]
    fn test_first_defined_walks_in_order() {
        let f = fixture();
        let resolver = ChainResolver::new(&f.parts, &f.rels, &f.themes, &f.masters);
        let sources = resolver.sources_for_slide("ppt/slides/slide1.xml");
        let levels: Vec<SourceLevel> = sources.iter().map(|s| s.level).collect();
        assert_eq!(
            levels,
            vec![SourceLevel::Slide, SourceLevel::Layout, SourceLevel::Master]
        );
        let hit = first_defined(&sources, |s| {
            (s.level == SourceLevel::Layout).then_some(s.part_name.to_string())
        });
        assert_eq!(hit.as_deref(), Some("ppt/slideLayouts/slideLayout1.xml"));
    }
}
