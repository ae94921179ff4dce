//! Archive entry regeneration.
//!
//! The serializer turns the retained part trees and relationship
//! collections back into a complete set of archive entries: every managed
//! XML part, every relationship part, the content-types stream, and a raw
//! copy of everything it does not manage (media and any entry the engine
//! left untouched). All serialization happens before the first byte is
//! written anywhere, so a save either produces the full entry set or
//! fails without touching the prior state.

use crate::archive::EntryArchive;
use crate::error::{EngineError, Result};
use crate::opc::Relationships;
use crate::opc::constants::{CONTENT_TYPES_NAME, content_type as ct};
use crate::opc::rels_name_for;
use crate::xml::{self, XmlElement, escape_xml};
use std::collections::{HashMap, HashSet};

/// Serializes a document's managed state into archive entries.
pub struct Serializer<'a> {
    manifest_name: &'a str,
    parts: &'a HashMap<String, XmlElement>,
    rels: &'a HashMap<String, Relationships>,
    /// Entries that must not survive the save (deleted parts).
    removed: &'a HashSet<String>,
}

impl<'a> Serializer<'a> {
    pub fn new(
        manifest_name: &'a str,
        parts: &'a HashMap<String, XmlElement>,
        rels: &'a HashMap<String, Relationships>,
        removed: &'a HashSet<String>,
    ) -> Self {
        Self {
            manifest_name,
            parts,
            rels,
            removed,
        }
    }

    /// Serialize every managed entry: part trees, relationship parts,
    /// and the content-types stream.
    pub fn serialize_parts(&self, raw_names: &[String]) -> Vec<(String, Vec<u8>)> {
        let mut entries = Vec::with_capacity(self.parts.len() + self.rels.len() + 1);

        let cti = ContentTypesItem::build(self.manifest_name, self.parts, raw_names);
        entries.push((CONTENT_TYPES_NAME.to_string(), cti.to_xml().into_bytes()));

        let mut rel_sources: Vec<&String> = self.rels.keys().collect();
        rel_sources.sort();
        for source in rel_sources {
            let collection = &self.rels[source];
            if collection.is_empty() {
                continue;
            }
            entries.push((
                rels_name_for(source),
                collection.to_xml().into_bytes(),
            ));
        }

        let mut part_names: Vec<&String> = self.parts.keys().collect();
        part_names.sort();
        for name in part_names {
            let tree = &self.parts[name];
            entries.push((name.clone(), xml::serialize_document(tree).into_bytes()));
        }

        entries
    }

    /// Produce the complete new entry set: managed entries plus raw
    /// copies of everything else still present in the archive.
    ///
    /// Failures surface as [`EngineError::Save`]; nothing has been
    /// written at that point.
    pub async fn regenerate<A: EntryArchive>(&self, archive: &A) -> Result<Vec<(String, Vec<u8>)>> {
        let archive_names = archive.entry_names();
        let mut entries = self.serialize_parts(&archive_names);

        let mut managed: HashSet<String> = entries.iter().map(|(name, _)| name.clone()).collect();
        // A relationship part whose collection emptied out is still
        // managed; its stale bytes must not be copied back in.
        for source in self.rels.keys() {
            managed.insert(rels_name_for(source));
        }
        for name in archive_names {
            if managed.contains(&name) || self.removed.contains(&name) {
                continue;
            }
            // Relationship parts of deleted sources must not be copied
            // back in.
            if self.removed.iter().any(|r| rels_name_for(r) == name) {
                continue;
            }
            match archive.read_entry(&name).await {
                Ok(Some(bytes)) => entries.push((name, bytes)),
                Ok(None) => {},
                Err(e) => return Err(EngineError::Save(format!("reading {name}: {e}"))),
            }
        }

        Ok(entries)
    }
}

/// Builder for the content-types stream.
///
/// Extensions with a well-known default map through `Default` elements;
/// every managed XML part gets an explicit `Override`.
struct ContentTypesItem {
    /// Default content types by extension
    defaults: HashMap<String, String>,
    /// Override content types by entry name
    overrides: HashMap<String, String>,
}

impl ContentTypesItem {
    fn build(
        manifest_name: &str,
        parts: &HashMap<String, XmlElement>,
        raw_names: &[String],
    ) -> Self {
        let mut defaults = HashMap::new();
        defaults.insert("rels".to_string(), ct::OPC_RELATIONSHIPS.to_string());
        defaults.insert("xml".to_string(), ct::XML.to_string());

        let mut overrides = HashMap::new();
        for name in parts.keys() {
            if let Some(content_type) = part_content_type(manifest_name, name) {
                overrides.insert(format!("/{name}"), content_type.to_string());
            }
        }

        for name in raw_names {
            let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
            if let Some(content_type) = media_default(&ext) {
                defaults.entry(ext).or_insert_with(|| content_type.to_string());
            }
        }

        Self {
            defaults,
            overrides,
        }
    }

    fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(4096);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        xml.push('\n');

        let mut exts: Vec<_> = self.defaults.keys().collect();
        exts.sort();
        for ext in exts {
            xml.push_str(&format!(
                r#"  <Default Extension="{}" ContentType="{}"/>"#,
                escape_xml(ext),
                escape_xml(&self.defaults[ext])
            ));
            xml.push('\n');
        }

        let mut names: Vec<_> = self.overrides.keys().collect();
        names.sort();
        for name in names {
            xml.push_str(&format!(
                r#"  <Override PartName="{}" ContentType="{}"/>"#,
                escape_xml(name),
                escape_xml(&self.overrides[name])
            ));
            xml.push('\n');
        }

        xml.push_str("</Types>");
        xml
    }
}

/// Content type of a managed XML part, from its role in the container
/// layout.
fn part_content_type(manifest_name: &str, part_name: &str) -> Option<&'static str> {
    if part_name == manifest_name {
        return Some(ct::PML_PRESENTATION_MAIN);
    }
    if part_name.contains("/slides/") {
        return Some(ct::PML_SLIDE);
    }
    if part_name.contains("/slideLayouts/") {
        return Some(ct::PML_SLIDE_LAYOUT);
    }
    if part_name.contains("/slideMasters/") {
        return Some(ct::PML_SLIDE_MASTER);
    }
    if part_name.contains("/theme/") {
        return Some(ct::DML_THEME);
    }
    None
}

fn media_default(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        "emf" => Some("image/x-emf"),
        "wmf" => Some("image/x-wmf"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn parts_with(names: &[&str]) -> HashMap<String, XmlElement> {
        names
            .iter()
            .map(|n| {
                (
                    n.to_string(),
                    parse_document(b"<root xmlns=\"urn:x\"/>").unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_content_types_overrides_and_defaults() {
        let parts = parts_with(&[
            "ppt/presentation.xml",
            "ppt/slides/slide1.xml",
            "ppt/theme/theme1.xml",
        ]);
        let raw = vec!["ppt/media/image1.png".to_string()];
        let cti = ContentTypesItem::build("ppt/presentation.xml", &parts, &raw);
        let xml = cti.to_xml();

        assert!(xml.contains(r#"<Default Extension="png" ContentType="image/png"/>"#));
        assert!(xml.contains(r#"<Default Extension="rels""#));
        assert!(xml.contains(r#"PartName="/ppt/presentation.xml""#));
        assert!(xml.contains(r#"PartName="/ppt/slides/slide1.xml""#));
        assert!(xml.contains("presentationml.slide+xml"));
        assert!(xml.contains("officedocument.theme+xml"));
    }

    #[tokio::test]
    async fn test_regenerate_excludes_removed_entries() {
        use crate::archive::MemoryArchive;

        let parts = parts_with(&["ppt/presentation.xml"]);
        let rels = HashMap::new();
        let mut removed = HashSet::new();
        removed.insert("ppt/slides/slide1.xml".to_string());

        let archive = MemoryArchive::new()
            .with_entry("ppt/presentation.xml", b"<old/>".as_slice())
            .with_entry("ppt/slides/slide1.xml", b"<dead/>".as_slice())
            .with_entry("ppt/slides/_rels/slide1.xml.rels", b"<dead/>".as_slice())
            .with_entry("ppt/media/image1.png", b"\x89PNG".as_slice());

        let serializer = Serializer::new("ppt/presentation.xml", &parts, &rels, &removed);
        let entries = serializer.regenerate(&archive).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();

        assert!(names.contains(&"[Content_Types].xml"));
        assert!(names.contains(&"ppt/presentation.xml"));
        assert!(names.contains(&"ppt/media/image1.png"));
        assert!(!names.contains(&"ppt/slides/slide1.xml"));
        assert!(!names.contains(&"ppt/slides/_rels/slide1.xml.rels"));
    }

    #[tokio::test]
    async fn test_managed_part_replaces_archive_bytes() {
        use crate::archive::MemoryArchive;

        let parts = parts_with(&["ppt/presentation.xml"]);
        let rels = HashMap::new();
        let removed = HashSet::new();
        let archive =
            MemoryArchive::new().with_entry("ppt/presentation.xml", b"<stale/>".as_slice());

        let serializer = Serializer::new("ppt/presentation.xml", &parts, &rels, &removed);
        let entries = serializer.regenerate(&archive).await.unwrap();
        let (_, bytes) = entries
            .iter()
            .find(|(n, _)| n == "ppt/presentation.xml")
            .unwrap();
        let text = std::str::from_utf8(bytes).unwrap();
        assert!(text.contains("<root"));
        assert!(!text.contains("<stale/>"));
    }
}
