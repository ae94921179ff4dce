//! Document loading and in-memory editing.
//!
//! One load produces a fresh immutable [`Presentation`] snapshot from the
//! archive capability. Edits mutate the retained part trees and replace
//! the affected snapshot slides wholesale; the serializer regenerates
//! archive entries from the same trees on save.
//!
//! The pipeline is cooperative: every archive read is awaited in
//! sequence, and a cancellation token is re-checked after each await so
//! that switching documents mid-load discards stale results instead of
//! applying them over a newer load (last-load-wins).

use crate::archive::EntryArchive;
use crate::chain::ChainResolver;
use crate::error::{EngineError, Result};
use crate::opc::constants::{PACKAGE_RELS_NAME, relationship_type};
use crate::opc::{Relationships, rels_name_for};
use crate::shapes::ShapeExtractor;
use crate::slide::Slide;
use crate::text::StyleContext;
use crate::theme::ThemeData;
use crate::writer::Serializer;
use crate::xml::{self, XmlElement, XmlNode, ns};
use log::warn;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Options controlling a document load.
///
/// # Examples
///
/// ```rust
/// use pitaya::document::LoadOptions;
///
/// let options = LoadOptions::new().with_decode_media(false);
/// ```
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Whether embedded pictures are decoded into pixel data.
    pub decode_media: bool,
    /// Whether a slide part that fails to parse aborts the load instead
    /// of being skipped with a warning.
    pub strict: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            decode_media: cfg!(feature = "media"),
            strict: false,
        }
    }
}

impl LoadOptions {
    /// Create options with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether embedded pictures are decoded into pixel data.
    #[inline]
    pub fn with_decode_media(mut self, decode: bool) -> Self {
        self.decode_media = decode;
        self
    }

    /// Set whether malformed slide parts abort the load.
    #[inline]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Cancellation token for one load.
///
/// The token goes stale as soon as its session starts a newer load;
/// the stale pipeline stops at its next checkpoint and its results are
/// dropped.
#[derive(Debug, Clone)]
pub struct LoadToken {
    shared: Arc<AtomicU64>,
    generation: u64,
}

impl LoadToken {
    /// A token that never goes stale, for standalone loads.
    pub fn detached() -> Self {
        Self {
            shared: Arc::new(AtomicU64::new(0)),
            generation: 0,
        }
    }

    /// Check whether a newer load has started since this token was
    /// issued.
    pub fn is_stale(&self) -> bool {
        self.shared.load(Ordering::Acquire) != self.generation
    }

    fn checkpoint(&self) -> Result<()> {
        if self.is_stale() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Owns the currently open document and issues load tokens so that only
/// the newest load can install its snapshot.
#[derive(Debug, Default)]
pub struct DocumentSession<A: EntryArchive> {
    generation: Arc<AtomicU64>,
    current: Option<PresentationDocument<A>>,
}

impl<A: EntryArchive> DocumentSession<A> {
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            current: None,
        }
    }

    /// Open a document, replacing the current one.
    ///
    /// Starting a new open invalidates any load still in flight; the
    /// older load finishes with [`EngineError::Cancelled`] instead of
    /// overwriting the newer document.
    pub async fn open(&mut self, archive: A, options: LoadOptions) -> Result<&mut PresentationDocument<A>> {
        let token = self.issue_token();
        let document = PresentationDocument::load_with_token(archive, options, &token).await?;
        token.checkpoint()?;
        Ok(self.current.insert(document))
    }

    /// Close the current document, if any.
    pub fn close(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.current = None;
    }

    /// The currently open document.
    pub fn document(&self) -> Option<&PresentationDocument<A>> {
        self.current.as_ref()
    }

    /// The currently open document, mutable.
    pub fn document_mut(&mut self) -> Option<&mut PresentationDocument<A>> {
        self.current.as_mut()
    }

    fn issue_token(&self) -> LoadToken {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        LoadToken {
            shared: Arc::clone(&self.generation),
            generation,
        }
    }
}

/// The decoded, immutable view of a loaded document.
#[derive(Debug, Clone, Default)]
pub struct Presentation {
    slides: Vec<Slide>,
    slide_width: Option<i64>,
    slide_height: Option<i64>,
}

impl Presentation {
    /// Slides in presentation order.
    #[inline]
    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    /// Slide width in EMU, when the manifest declares a size.
    #[inline]
    pub fn slide_width(&self) -> Option<i64> {
        self.slide_width
    }

    /// Slide height in EMU.
    #[inline]
    pub fn slide_height(&self) -> Option<i64> {
        self.slide_height
    }
}

/// One slide's identity inside the manifest.
#[derive(Debug, Clone)]
struct SlideEntry {
    id: u32,
    r_id: String,
    part_name: String,
}

/// A loaded presentation document: the decoded snapshot plus the part
/// trees edits are written back into.
#[derive(Debug)]
pub struct PresentationDocument<A: EntryArchive> {
    archive: A,
    options: LoadOptions,
    manifest_name: String,
    /// Parsed part trees, keyed by entry name.
    parts: HashMap<String, XmlElement>,
    /// Per-part relationships, keyed by source entry name ("" for the
    /// package level).
    rels: HashMap<String, Relationships>,
    themes: HashMap<String, ThemeData>,
    masters: Vec<String>,
    media: HashMap<String, Vec<u8>>,
    slide_entries: Vec<SlideEntry>,
    /// Per slide, the shape-tree child index of each snapshot shape.
    shape_slots: Vec<Vec<usize>>,
    /// Entries that must not survive a save (deleted slides and their
    /// relationship parts).
    removed_entries: HashSet<String>,
    snapshot: Presentation,
    dirty: bool,
}

impl<A: EntryArchive> PresentationDocument<A> {
    /// Load a document from an archive capability.
    pub async fn load(archive: A, options: LoadOptions) -> Result<Self> {
        Self::load_with_token(archive, options, &LoadToken::detached()).await
    }

    /// Load with a cancellation token; checked after every archive read.
    pub async fn load_with_token(
        archive: A,
        options: LoadOptions,
        token: &LoadToken,
    ) -> Result<Self> {
        let mut parts: HashMap<String, XmlElement> = HashMap::new();
        let mut rels: HashMap<String, Relationships> = HashMap::new();

        // Package relationships locate the manifest; without them nothing
        // renders.
        let pkg_rels_bytes = archive
            .read_entry(PACKAGE_RELS_NAME)
            .await?
            .ok_or_else(|| EngineError::ContainerLoad("package relationships missing".into()))?;
        token.checkpoint()?;
        let pkg_rels = Relationships::from_xml("", &pkg_rels_bytes)
            .map_err(|e| EngineError::ContainerLoad(format!("package relationships: {e}")))?;
        let manifest_name = pkg_rels
            .first_target_of_type(relationship_type::OFFICE_DOCUMENT)
            .ok_or_else(|| EngineError::ContainerLoad("no document manifest relationship".into()))?;

        let manifest_bytes = archive
            .read_entry(&manifest_name)
            .await?
            .ok_or_else(|| EngineError::ContainerLoad(format!("manifest {manifest_name} missing")))?;
        token.checkpoint()?;
        let manifest_tree = xml::parse_document(&manifest_bytes)
            .map_err(|e| EngineError::ContainerLoad(format!("manifest: {e}")))?;

        let (slide_width, slide_height) = slide_size(&manifest_tree);

        let manifest_rels = read_rels(&archive, token, &manifest_name).await?;

        // Slide order comes from the manifest's slide-id list.
        let mut slide_entries = Vec::new();
        for sld_id in manifest_tree.find_all(ns::PRESENTATION_NS, "sldId") {
            let id = sld_id
                .attr("id")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default();
            let Some(r_id) = slide_rid(sld_id) else {
                warn!("slide id {id} has no relationship id, skipping");
                continue;
            };
            let Some(part_name) = manifest_rels.target_of(&r_id) else {
                warn!("slide relationship {r_id} does not resolve, skipping");
                continue;
            };
            slide_entries.push(SlideEntry {
                id,
                r_id,
                part_name,
            });
        }

        rels.insert(String::new(), pkg_rels);
        rels.insert(manifest_name.clone(), manifest_rels);
        parts.insert(manifest_name.clone(), manifest_tree);

        // Slide parts, with their relationships.
        let mut kept_entries = Vec::new();
        for entry in slide_entries {
            let Some(bytes) = archive.read_entry(&entry.part_name).await? else {
                token.checkpoint()?;
                warn!("slide part {} missing from archive, skipping", entry.part_name);
                continue;
            };
            token.checkpoint()?;
            match xml::parse_document(&bytes) {
                Ok(tree) => {
                    parts.insert(entry.part_name.clone(), tree);
                },
                Err(e) if options.strict => {
                    return Err(EngineError::ContainerLoad(format!(
                        "slide part {}: {e}",
                        entry.part_name
                    )));
                },
                Err(e) => {
                    warn!("slide part {} is malformed, skipping: {e}", entry.part_name);
                    continue;
                },
            }
            let slide_rels = read_rels(&archive, token, &entry.part_name).await?;
            rels.insert(entry.part_name.clone(), slide_rels);
            kept_entries.push(entry);
        }
        let slide_entries = kept_entries;

        // Layouts referenced by slides. A failed sibling never aborts the
        // siblings that already parsed.
        let mut layouts = Vec::new();
        for entry in &slide_entries {
            if let Some(layout) = rels
                .get(&entry.part_name)
                .and_then(|r| r.first_target_of_type(relationship_type::SLIDE_LAYOUT))
                && !layouts.contains(&layout)
            {
                layouts.push(layout);
            }
        }
        for layout in &layouts {
            if let Some(tree) = read_part(&archive, token, layout).await? {
                parts.insert(layout.clone(), tree);
                let layout_rels = read_rels(&archive, token, layout).await?;
                rels.insert(layout.clone(), layout_rels);
            }
        }

        // Masters: those behind the layouts plus any the manifest lists.
        let mut masters = Vec::new();
        for layout in &layouts {
            if let Some(master) = rels
                .get(layout)
                .and_then(|r| r.first_target_of_type(relationship_type::SLIDE_MASTER))
                && !masters.contains(&master)
            {
                masters.push(master);
            }
        }
        for master in rels
            .get(&manifest_name)
            .map(|r| r.targets_of_type(relationship_type::SLIDE_MASTER))
            .unwrap_or_default()
        {
            if !masters.contains(&master) {
                masters.push(master);
            }
        }
        for master in &masters {
            if let Some(tree) = read_part(&archive, token, master).await? {
                parts.insert(master.clone(), tree);
                let master_rels = read_rels(&archive, token, master).await?;
                rels.insert(master.clone(), master_rels);
            }
        }

        // One theme per master that declares one. A malformed theme
        // degrades to an empty color map and default fonts.
        let mut themes = HashMap::new();
        for master in &masters {
            let Some(theme_name) = rels
                .get(master)
                .and_then(|r| r.first_target_of_type(relationship_type::THEME))
            else {
                continue;
            };
            if themes.contains_key(&theme_name) {
                continue;
            }
            let bytes = archive.read_entry(&theme_name).await?;
            token.checkpoint()?;
            let theme = match bytes.as_deref().map(xml::parse_document) {
                Some(Ok(tree)) => {
                    let theme = ThemeData::from_tree(&tree);
                    // Keep the theme part for round-tripping.
                    parts.insert(theme_name.clone(), tree);
                    theme
                },
                Some(Err(e)) => {
                    warn!("{}", EngineError::ThemeResolution(format!("{theme_name}: {e}")));
                    ThemeData::empty()
                },
                None => {
                    warn!("{}", EngineError::ThemeResolution(format!("{theme_name} missing")));
                    ThemeData::empty()
                },
            };
            themes.insert(theme_name, theme);
        }

        // Media entries referenced by slide pictures, prefetched so shape
        // extraction stays synchronous.
        let mut media = HashMap::new();
        for entry in &slide_entries {
            let targets = rels
                .get(&entry.part_name)
                .map(|r| r.targets_of_type(relationship_type::IMAGE))
                .unwrap_or_default();
            for target in targets {
                if media.contains_key(&target) {
                    continue;
                }
                match archive.read_entry(&target).await? {
                    Some(bytes) => {
                        media.insert(target, bytes);
                    },
                    None => warn!("media entry {target} missing from archive"),
                }
                token.checkpoint()?;
            }
        }

        let mut document = Self {
            archive,
            options,
            manifest_name,
            parts,
            rels,
            themes,
            masters,
            media,
            slide_entries,
            shape_slots: Vec::new(),
            removed_entries: HashSet::new(),
            snapshot: Presentation {
                slides: Vec::new(),
                slide_width,
                slide_height,
            },
            dirty: false,
        };
        document.rebuild_snapshot();
        Ok(document)
    }

    /// The decoded snapshot.
    #[inline]
    pub fn presentation(&self) -> &Presentation {
        &self.snapshot
    }

    /// Whether there are unsaved changes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Entry name of the document manifest.
    #[inline]
    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    /// Number of slides in the document.
    pub fn slide_count(&self) -> usize {
        self.snapshot.slides.len()
    }

    /// Replace the text of one paragraph, collapsing it to a single run
    /// that keeps the first run's style.
    pub fn set_paragraph_text(
        &mut self,
        slide: usize,
        shape: usize,
        paragraph: usize,
        text: &str,
    ) -> Result<()> {
        let node_index = self.shape_slot(slide, shape)?;
        let part_name = self.slide_entries[slide].part_name.clone();
        let part = self
            .parts
            .get_mut(&part_name)
            .ok_or_else(|| EngineError::Save(format!("slide part {part_name} not loaded")))?;
        let tree = part
            .find_first_mut(ns::PRESENTATION_NS, "spTree")
            .ok_or_else(|| EngineError::Save("slide has no shape tree".into()))?;
        let shape_element = child_element_mut(tree, node_index)
            .ok_or_else(|| EngineError::Save("shape element out of range".into()))?;

        let paragraphs: Vec<usize> = shape_element
            .find_first(ns::PRESENTATION_NS, "txBody")
            .map(|body| {
                body.nodes()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, n)| match n {
                        XmlNode::Element(e) if e.is(ns::DRAWING_NS, "p") => Some(i),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();
        let Some(&p_node) = paragraphs.get(paragraph) else {
            return Err(EngineError::Save(format!("paragraph {paragraph} out of range")));
        };

        let body = shape_element
            .find_first_mut(ns::PRESENTATION_NS, "txBody")
            .ok_or_else(|| EngineError::Save("shape has no text body".into()))?;
        match &mut body.nodes_mut()[p_node] {
            XmlNode::Element(p) => rewrite_paragraph_text(p, text),
            _ => return Err(EngineError::Save("paragraph node is not an element".into())),
        }

        self.dirty = true;
        self.refresh_slide(slide);
        Ok(())
    }

    /// Remove one shape from a slide.
    pub fn remove_shape(&mut self, slide: usize, shape: usize) -> Result<()> {
        let node_index = self.shape_slot(slide, shape)?;
        let part_name = self.slide_entries[slide].part_name.clone();
        let tree = self
            .parts
            .get_mut(&part_name)
            .and_then(|p| p.find_first_mut(ns::PRESENTATION_NS, "spTree"))
            .ok_or_else(|| EngineError::Save("slide has no shape tree".into()))?;
        remove_child_element(tree, node_index)
            .ok_or_else(|| EngineError::Save("shape element out of range".into()))?;

        self.dirty = true;
        self.refresh_slide(slide);
        Ok(())
    }

    /// Move a shape within its slide's shape tree (z-order edit).
    pub fn move_shape(&mut self, slide: usize, from: usize, to: usize) -> Result<()> {
        let from_node = self.shape_slot(slide, from)?;
        let to_node = self.shape_slot(slide, to)?;
        let part_name = self.slide_entries[slide].part_name.clone();
        let tree = self
            .parts
            .get_mut(&part_name)
            .and_then(|p| p.find_first_mut(ns::PRESENTATION_NS, "spTree"))
            .ok_or_else(|| EngineError::Save("slide has no shape tree".into()))?;
        move_child_element(tree, from_node, to_node);

        self.dirty = true;
        self.refresh_slide(slide);
        Ok(())
    }

    /// Append a new text shape to a slide, returning its snapshot index
    /// after re-extraction.
    pub fn add_text_shape(
        &mut self,
        slide: usize,
        transform: crate::shapes::Transform,
        text: &str,
    ) -> Result<()> {
        self.check_slide(slide)?;
        let part_name = self.slide_entries[slide].part_name.clone();
        let xml_text = format!(
            r#"<p:sp xmlns:a="{a}" xmlns:p="{p}"><p:nvSpPr><p:cNvPr id="0" name="TextBox"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr><p:txBody><a:bodyPr/><a:p><a:r><a:t>{t}</a:t></a:r></a:p></p:txBody></p:sp>"#,
            a = ns::DRAWING_NS,
            p = ns::PRESENTATION_NS,
            x = transform.x,
            y = transform.y,
            cx = transform.cx.max(0),
            cy = transform.cy.max(0),
            t = crate::xml::escape_xml(text),
        );
        let element = xml::parse_document(xml_text.as_bytes())?;
        let tree = self
            .parts
            .get_mut(&part_name)
            .and_then(|p| p.find_first_mut(ns::PRESENTATION_NS, "spTree"))
            .ok_or_else(|| EngineError::Save("slide has no shape tree".into()))?;
        tree.push_element(element);

        self.dirty = true;
        self.refresh_slide(slide);
        Ok(())
    }

    /// Append a blank slide, based on the first known layout, returning
    /// its index.
    pub fn add_slide(&mut self) -> Result<usize> {
        let part_name = self.next_slide_part_name();

        let slide_xml = format!(
            r#"<p:sld xmlns:a="{a}" xmlns:p="{p}" xmlns:r="{r}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld></p:sld>"#,
            a = ns::DRAWING_NS,
            p = ns::PRESENTATION_NS,
            r = ns::DOC_RELS_NS,
        );
        let tree = xml::parse_document(slide_xml.as_bytes())?;

        // Wire the new slide to a layout when the document has one.
        let mut slide_rels = Relationships::new(part_name.clone());
        let layout = self
            .slide_entries
            .last()
            .and_then(|e| self.rels.get(&e.part_name))
            .and_then(|r| r.first_target_of_type(relationship_type::SLIDE_LAYOUT))
            .or_else(|| {
                let mut names: Vec<&String> = self
                    .parts
                    .keys()
                    .filter(|n| n.contains("slideLayout"))
                    .collect();
                names.sort();
                names.first().map(|n| n.to_string())
            });
        if let Some(layout) = layout {
            slide_rels.add(
                relationship_type::SLIDE_LAYOUT,
                &format!("/{layout}"),
            );
        }

        // Register the slide in the manifest: a new relationship and a
        // new slide-id entry.
        let relative = part_name
            .strip_prefix("ppt/")
            .map(|rest| rest.to_string())
            .unwrap_or_else(|| format!("/{part_name}"));
        let manifest_rels = self
            .rels
            .entry(self.manifest_name.clone())
            .or_insert_with(|| Relationships::new(self.manifest_name.clone()));
        let r_id = manifest_rels.add(relationship_type::SLIDE, &relative);

        let id = self
            .slide_entries
            .iter()
            .map(|e| e.id)
            .max()
            .unwrap_or(255)
            .max(255)
            + 1;
        let manifest = self
            .parts
            .get_mut(&self.manifest_name)
            .ok_or_else(|| EngineError::Save("manifest part not loaded".into()))?;
        if manifest.find_first(ns::PRESENTATION_NS, "sldIdLst").is_none() {
            let prefix = element_prefix(manifest.name());
            manifest.push_element(XmlElement::new(
                format!("{prefix}sldIdLst"),
                Some(ns::PRESENTATION_NS),
            ));
        }
        let id_list = manifest
            .find_first_mut(ns::PRESENTATION_NS, "sldIdLst")
            .ok_or_else(|| EngineError::Save("manifest slide list unavailable".into()))?;
        let prefix = element_prefix(id_list.name());
        let mut sld_id = XmlElement::new(format!("{prefix}sldId"), Some(ns::PRESENTATION_NS));
        sld_id.set_attr("id", &id.to_string());
        sld_id.set_attr("r:id", &r_id);
        id_list.push_element(sld_id);

        self.parts.insert(part_name.clone(), tree);
        self.rels.insert(part_name.clone(), slide_rels);
        self.removed_entries.remove(&part_name);
        self.removed_entries.remove(&rels_name_for(&part_name));
        self.slide_entries.push(SlideEntry {
            id,
            r_id,
            part_name,
        });
        self.shape_slots.push(Vec::new());

        self.dirty = true;
        self.rebuild_snapshot();
        Ok(self.slide_entries.len() - 1)
    }

    /// Remove a slide from the document.
    pub fn remove_slide(&mut self, slide: usize) -> Result<()> {
        self.check_slide(slide)?;
        let entry = self.slide_entries.remove(slide);

        // Drop the manifest's slide-id element and relationship.
        if let Some(manifest) = self.parts.get_mut(&self.manifest_name)
            && let Some(list) = manifest.find_first_mut(ns::PRESENTATION_NS, "sldIdLst")
        {
            list.nodes_mut().retain(|node| match node {
                XmlNode::Element(e) if e.is(ns::PRESENTATION_NS, "sldId") => {
                    slide_rid(e).as_deref() != Some(entry.r_id.as_str())
                },
                _ => true,
            });
        }
        if let Some(manifest_rels) = self.rels.get_mut(&self.manifest_name) {
            manifest_rels.remove(&entry.r_id);
        }

        self.parts.remove(&entry.part_name);
        self.rels.remove(&entry.part_name);
        self.removed_entries.insert(entry.part_name.clone());
        self.removed_entries.insert(rels_name_for(&entry.part_name));
        self.shape_slots.remove(slide);

        self.dirty = true;
        self.rebuild_snapshot();
        Ok(())
    }

    /// Move a slide to a new position in the presentation order.
    pub fn move_slide(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_slide(from)?;
        self.check_slide(to)?;
        if from == to {
            return Ok(());
        }

        let entry = self.slide_entries.remove(from);
        self.slide_entries.insert(to, entry);
        let slots = self.shape_slots.remove(from);
        self.shape_slots.insert(to, slots);

        // Mirror the order in the manifest's slide-id list.
        let order: Vec<String> = self.slide_entries.iter().map(|e| e.r_id.clone()).collect();
        if let Some(manifest) = self.parts.get_mut(&self.manifest_name)
            && let Some(list) = manifest.find_first_mut(ns::PRESENTATION_NS, "sldIdLst")
        {
            let mut by_rid: HashMap<String, XmlNode> = HashMap::new();
            let mut rest = Vec::new();
            for node in list.nodes_mut().drain(..) {
                let r_id = match &node {
                    XmlNode::Element(e) => slide_rid(e),
                    _ => None,
                };
                match r_id {
                    Some(r_id) => {
                        by_rid.insert(r_id, node);
                    },
                    None => rest.push(node),
                }
            }
            for r_id in &order {
                if let Some(node) = by_rid.remove(r_id) {
                    list.nodes_mut().push(node);
                }
            }
            list.nodes_mut().extend(rest);
        }

        self.dirty = true;
        self.rebuild_snapshot();
        Ok(())
    }

    /// Regenerate every entry of the archive and write the result through
    /// the capability. All serialization happens before the first write;
    /// a failure surfaces as [`EngineError::Save`] and keeps the dirty
    /// flag, so no change is silently lost.
    pub async fn save(&mut self) -> Result<()> {
        let serializer = Serializer::new(
            &self.manifest_name,
            &self.parts,
            &self.rels,
            &self.removed_entries,
        );
        let entries = serializer.regenerate(&self.archive).await?;
        self.archive
            .replace_entries(entries)
            .map_err(|e| EngineError::Save(e.to_string()))?;
        self.dirty = false;
        Ok(())
    }

    /// Serialize all entries without writing them, for hosts that pack
    /// the archive themselves.
    pub async fn regenerate(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let serializer = Serializer::new(
            &self.manifest_name,
            &self.parts,
            &self.rels,
            &self.removed_entries,
        );
        serializer.regenerate(&self.archive).await
    }

    /// The underlying archive capability.
    #[inline]
    pub fn archive(&self) -> &A {
        &self.archive
    }

    fn check_slide(&self, slide: usize) -> Result<()> {
        if slide >= self.slide_entries.len() {
            return Err(EngineError::Save(format!("slide {slide} out of range")));
        }
        Ok(())
    }

    fn shape_slot(&self, slide: usize, shape: usize) -> Result<usize> {
        self.check_slide(slide)?;
        self.shape_slots[slide]
            .get(shape)
            .copied()
            .ok_or_else(|| EngineError::Save(format!("shape {shape} out of range")))
    }

    fn next_slide_part_name(&self) -> String {
        let mut highest = 0u32;
        for name in self.parts.keys().chain(self.removed_entries.iter()) {
            if let Some(rest) = name.strip_prefix("ppt/slides/slide")
                && let Some(number) = rest.strip_suffix(".xml")
                && let Ok(number) = number.parse::<u32>()
            {
                highest = highest.max(number);
            }
        }
        format!("ppt/slides/slide{}.xml", highest + 1)
    }

    /// Re-decode one slide after a tree edit, replacing its snapshot
    /// entry and shape slots.
    fn refresh_slide(&mut self, index: usize) {
        let Some((slide, slots)) = decode_slide(
            &self.parts,
            &self.rels,
            &self.themes,
            &self.masters,
            &self.media,
            self.options.decode_media,
            &self.slide_entries[index],
        ) else {
            return;
        };
        // Replace the whole list so previously handed-out snapshots stay
        // valid.
        let mut slides = self.snapshot.slides.clone();
        slides[index] = slide;
        self.snapshot.slides = slides;
        self.shape_slots[index] = slots;
    }

    /// Decode every slide into a fresh snapshot.
    fn rebuild_snapshot(&mut self) {
        let mut slides = Vec::with_capacity(self.slide_entries.len());
        let mut shape_slots = Vec::with_capacity(self.slide_entries.len());
        for entry in &self.slide_entries {
            // Keep slides, entries, and slots index-aligned even when a
            // part went missing mid-edit.
            let (slide, slots) = decode_slide(
                &self.parts,
                &self.rels,
                &self.themes,
                &self.masters,
                &self.media,
                self.options.decode_media,
                entry,
            )
            .unwrap_or_else(|| (placeholder_slide(entry), Vec::new()));
            slides.push(slide);
            shape_slots.push(slots);
        }
        self.snapshot.slides = slides;
        self.shape_slots = shape_slots;
    }
}

/// Decode one slide part into the model. Free function so document
/// methods can borrow individual fields without aliasing.
fn decode_slide(
    parts: &HashMap<String, XmlElement>,
    rels: &HashMap<String, Relationships>,
    themes: &HashMap<String, ThemeData>,
    masters: &[String],
    media: &HashMap<String, Vec<u8>>,
    decode_media: bool,
    entry: &SlideEntry,
) -> Option<(Slide, Vec<usize>)> {
    let part = parts.get(&entry.part_name)?;
    let resolver = ChainResolver::new(parts, rels, themes, masters);
    let theme = resolver.theme_for_slide(&entry.part_name);
    let background = resolver.resolve_background(&entry.part_name);

    let extractor = ShapeExtractor::new(
        StyleContext::new(theme),
        rels.get(&entry.part_name),
        media,
        decode_media,
    );
    let extracted = extractor.extract_with_slots(part);
    let mut shapes = Vec::with_capacity(extracted.len());
    let mut slots = Vec::with_capacity(extracted.len());
    for item in extracted {
        shapes.push(item.shape);
        slots.push(item.node_index);
    }

    let name = part
        .find_first(ns::PRESENTATION_NS, "cSld")
        .and_then(|c| c.attr("name"))
        .unwrap_or_default()
        .to_string();
    let hidden = part.attr("show") == Some("0");

    Some((
        Slide {
            id: entry.id,
            name,
            part_name: entry.part_name.clone(),
            hidden,
            background,
            shapes,
        },
        slots,
    ))
}

/// The prefixed `r:id` attribute of a slide-id element. The bare `id`
/// attribute shares its local name, so match on the prefixed form.
fn slide_rid(sld_id: &XmlElement) -> Option<String> {
    sld_id
        .attrs()
        .iter()
        .find(|a| a.name.ends_with(":id"))
        .map(|a| a.value.clone())
}

/// Stand-in for a slide whose part disappeared; keeps list alignment.
fn placeholder_slide(entry: &SlideEntry) -> Slide {
    Slide {
        id: entry.id,
        name: String::new(),
        part_name: entry.part_name.clone(),
        hidden: false,
        background: crate::slide::Background::default(),
        shapes: Vec::new(),
    }
}

/// Slide dimensions from the manifest's size element.
fn slide_size(manifest: &XmlElement) -> (Option<i64>, Option<i64>) {
    let Some(size) = manifest.find_first(ns::PRESENTATION_NS, "sldSz") else {
        return (None, None);
    };
    (size.attr_i64("cx"), size.attr_i64("cy"))
}

async fn read_part<A: EntryArchive>(
    archive: &A,
    token: &LoadToken,
    name: &str,
) -> Result<Option<XmlElement>> {
    let bytes = archive.read_entry(name).await?;
    token.checkpoint()?;
    let Some(bytes) = bytes else {
        warn!("part {name} missing from archive");
        return Ok(None);
    };
    match xml::parse_document(&bytes) {
        Ok(tree) => Ok(Some(tree)),
        Err(e) => {
            warn!("part {name} is malformed, skipping: {e}");
            Ok(None)
        },
    }
}

async fn read_rels<A: EntryArchive>(
    archive: &A,
    token: &LoadToken,
    part_name: &str,
) -> Result<Relationships> {
    let rels_name = rels_name_for(part_name);
    let bytes = archive.read_entry(&rels_name).await?;
    token.checkpoint()?;
    match bytes {
        Some(bytes) => match Relationships::from_xml(part_name, &bytes) {
            Ok(rels) => Ok(rels),
            Err(e) => {
                warn!("relationships {rels_name} malformed: {e}");
                Ok(Relationships::new(part_name))
            },
        },
        None => Ok(Relationships::new(part_name)),
    }
}

/// Mutable nth element child (element index, text nodes skipped).
fn child_element_mut(parent: &mut XmlElement, index: usize) -> Option<&mut XmlElement> {
    parent
        .nodes_mut()
        .iter_mut()
        .filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
        .nth(index)
}

/// Remove the nth element child, returning it.
fn remove_child_element(parent: &mut XmlElement, index: usize) -> Option<XmlElement> {
    let position = element_node_position(parent, index)?;
    match parent.nodes_mut().remove(position) {
        XmlNode::Element(e) => Some(e),
        _ => None,
    }
}

/// Move the element child at `from` so it ends up at element index `to`,
/// the same remove-then-insert semantics slide reordering uses.
fn move_child_element(parent: &mut XmlElement, from: usize, to: usize) {
    let Some(from_pos) = element_node_position(parent, from) else {
        return;
    };
    let node = parent.nodes_mut().remove(from_pos);
    match element_node_position(parent, to) {
        Some(insert_at) => parent.nodes_mut().insert(insert_at, node),
        None => parent.nodes_mut().push(node),
    }
}

fn element_node_position(parent: &XmlElement, element_index: usize) -> Option<usize> {
    parent
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, n)| matches!(n, XmlNode::Element(_)))
        .nth(element_index)
        .map(|(i, _)| i)
}

/// Collapse a paragraph to a single run carrying `text`, keeping the
/// paragraph properties and the first run's style.
fn rewrite_paragraph_text(p: &mut XmlElement, text: &str) {
    let prefix = element_prefix(p.name());

    let p_pr = p
        .child(ns::DRAWING_NS, "pPr")
        .cloned();
    let first_run_props = p
        .child(ns::DRAWING_NS, "r")
        .and_then(|r| r.child(ns::DRAWING_NS, "rPr"))
        .cloned();
    let end_marker = p.child(ns::DRAWING_NS, "endParaRPr").cloned();

    let mut run = XmlElement::new(format!("{prefix}r"), Some(ns::DRAWING_NS));
    if let Some(props) = first_run_props {
        run.push_element(props);
    }
    let mut t = XmlElement::new(format!("{prefix}t"), Some(ns::DRAWING_NS));
    t.set_text(text);
    run.push_element(t);

    p.nodes_mut().clear();
    if let Some(p_pr) = p_pr {
        p.push_element(p_pr);
    }
    p.push_element(run);
    if let Some(end_marker) = end_marker {
        p.push_element(end_marker);
    }
}

/// The `prefix:` part of a tag name, colon included; empty for
/// unprefixed names.
fn element_prefix(name: &str) -> String {
    match name.split_once(':') {
        Some((prefix, _)) => format!("{prefix}:"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;

    const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

    fn minimal_archive() -> MemoryArchive {
        let pkg_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{}"><Relationship Id="rId1" Type="{OFFICE_DOCUMENT}" Target="ppt/presentation.xml"/></Relationships>"#,
            ns::PACKAGE_RELS_NS
        );
        let manifest = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation xmlns:p="{}"><p:sldIdLst/><p:sldSz cx="9144000" cy="6858000"/></p:presentation>"#,
            ns::PRESENTATION_NS
        );
        MemoryArchive::new()
            .with_entry("_rels/.rels", pkg_rels)
            .with_entry("ppt/presentation.xml", manifest)
    }

    #[test]
    fn test_detached_token_never_goes_stale() {
        assert!(!LoadToken::detached().is_stale());
    }

    #[test]
    fn test_newer_load_invalidates_older_token() {
        let session: DocumentSession<MemoryArchive> = DocumentSession::new();
        let first = session.issue_token();
        assert!(!first.is_stale());
        let second = session.issue_token();
        assert!(first.is_stale());
        assert!(!second.is_stale());
    }

    #[tokio::test]
    async fn test_stale_load_finishes_cancelled() {
        let session: DocumentSession<MemoryArchive> = DocumentSession::new();
        let token = session.issue_token();
        // A newer load starts before this one finishes its first step.
        let _newer = session.issue_token();
        let result =
            PresentationDocument::load_with_token(minimal_archive(), LoadOptions::new(), &token)
                .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_session_open_installs_document() {
        let mut session = DocumentSession::new();
        session
            .open(minimal_archive(), LoadOptions::new())
            .await
            .unwrap();
        let doc = session.document().unwrap();
        assert_eq!(doc.slide_count(), 0);
        assert_eq!(doc.presentation().slide_width(), Some(9_144_000));

        session.close();
        assert!(session.document().is_none());
    }

    #[tokio::test]
    async fn test_empty_archive_fails_container_load() {
        let result = PresentationDocument::load(MemoryArchive::new(), LoadOptions::new()).await;
        assert!(matches!(result, Err(EngineError::ContainerLoad(_))));
    }
}
