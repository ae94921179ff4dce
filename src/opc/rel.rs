//! Relationship parts.
//!
//! Every manifest/slide/layout/master part may carry a sibling `.rels`
//! part mapping relationship ids (`rId1`, `rId2`, ...) to target parts.
//! The collection parses from and regenerates that XML.

use crate::error::Result;
use crate::opc::packname::resolve_target;
use crate::xml::{self, escape_xml, ns};
use std::collections::HashMap;

/// A single relationship from a source part to a target.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1", "rId2")
    r_id: String,
    /// Relationship type URI
    reltype: String,
    /// Target reference as written, relative to the source part
    target_ref: String,
    /// Whether this is an external relationship (target is a URL)
    is_external: bool,
}

impl Relationship {
    /// Create a new relationship.
    pub fn new(r_id: String, reltype: String, target_ref: String, is_external: bool) -> Self {
        Self {
            r_id,
            reltype,
            target_ref,
            is_external,
        }
    }

    /// Get the relationship ID.
    #[inline]
    pub fn r_id(&self) -> &str {
        &self.r_id
    }

    /// Get the relationship type.
    #[inline]
    pub fn reltype(&self) -> &str {
        &self.reltype
    }

    /// Get the target reference as written in the source.
    #[inline]
    pub fn target_ref(&self) -> &str {
        &self.target_ref
    }

    /// Check if this is an external relationship.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.is_external
    }
}

/// Collection of relationships from a single source part.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    /// Source part name the targets resolve against
    source_part: String,
    /// Map of relationship ID to Relationship
    rels: HashMap<String, Relationship>,
}

impl Relationships {
    /// Create an empty collection for the given source part.
    ///
    /// The package level is addressed with an empty source part name.
    pub fn new(source_part: impl Into<String>) -> Self {
        Self {
            source_part: source_part.into(),
            rels: HashMap::new(),
        }
    }

    /// Parse a `.rels` part.
    pub fn from_xml(source_part: impl Into<String>, rels_xml: &[u8]) -> Result<Self> {
        let mut out = Self::new(source_part);
        let root = xml::parse_document(rels_xml)?;
        for element in root.find_all(ns::PACKAGE_RELS_NS, "Relationship") {
            let r_id = element.attr("Id").unwrap_or_default().to_string();
            let reltype = element.attr("Type").unwrap_or_default().to_string();
            let target_ref = element.attr("Target").unwrap_or_default().to_string();
            let is_external = element.attr("TargetMode") == Some("External");
            if r_id.is_empty() {
                continue;
            }
            out.rels
                .insert(r_id.clone(), Relationship::new(r_id, reltype, target_ref, is_external));
        }
        Ok(out)
    }

    /// Get a relationship by its ID.
    #[inline]
    pub fn get(&self, r_id: &str) -> Option<&Relationship> {
        self.rels.get(r_id)
    }

    /// Resolve a relationship ID to the target's absolute entry name.
    ///
    /// Returns `None` for unknown ids and for external targets.
    pub fn target_of(&self, r_id: &str) -> Option<String> {
        let rel = self.rels.get(r_id)?;
        if rel.is_external {
            return None;
        }
        Some(resolve_target(&self.source_part, &rel.target_ref))
    }

    /// First internal relationship of the given type, resolved to an
    /// absolute entry name.
    pub fn first_target_of_type(&self, reltype: &str) -> Option<String> {
        let mut matches: Vec<&Relationship> = self
            .rels
            .values()
            .filter(|rel| rel.reltype == reltype && !rel.is_external)
            .collect();
        // HashMap order is arbitrary; pick the lowest rId deterministically.
        matches.sort_by(|a, b| compare_r_ids(&a.r_id, &b.r_id));
        matches
            .first()
            .map(|rel| resolve_target(&self.source_part, &rel.target_ref))
    }

    /// All internal targets of the given type, resolved, ordered by rId.
    pub fn targets_of_type(&self, reltype: &str) -> Vec<String> {
        let mut matches: Vec<&Relationship> = self
            .rels
            .values()
            .filter(|rel| rel.reltype == reltype && !rel.is_external)
            .collect();
        matches.sort_by(|a, b| compare_r_ids(&a.r_id, &b.r_id));
        matches
            .iter()
            .map(|rel| resolve_target(&self.source_part, &rel.target_ref))
            .collect()
    }

    /// Add a relationship with the next free rId, returning the id.
    pub fn add(&mut self, reltype: &str, target_ref: &str) -> String {
        let r_id = self.next_r_id();
        self.rels.insert(
            r_id.clone(),
            Relationship::new(r_id.clone(), reltype.to_string(), target_ref.to_string(), false),
        );
        r_id
    }

    /// Remove a relationship by its ID.
    pub fn remove(&mut self, r_id: &str) -> Option<Relationship> {
        self.rels.remove(r_id)
    }

    /// Get an iterator over all relationships.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.values()
    }

    /// Get the number of relationships in the collection.
    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    /// Check if the collection is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// Next available rId, filling gaps.
    fn next_r_id(&self) -> String {
        let mut used: Vec<u32> = self
            .rels
            .keys()
            .filter_map(|r_id| r_id.strip_prefix("rId").and_then(|n| n.parse().ok()))
            .collect();
        used.sort_unstable();

        let mut next = 1u32;
        for &num in &used {
            match num.cmp(&next) {
                std::cmp::Ordering::Equal => next += 1,
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {},
            }
        }
        format!("rId{next}")
    }

    /// Serialize to `.rels` XML, relationships ordered by rId.
    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(1024);

        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        xml.push('\n');

        let mut rels: Vec<&Relationship> = self.rels.values().collect();
        rels.sort_by(|a, b| compare_r_ids(&a.r_id, &b.r_id));

        for rel in rels {
            let target_mode = if rel.is_external {
                r#" TargetMode="External""#
            } else {
                ""
            };
            xml.push_str(&format!(
                r#"  <Relationship Id="{}" Type="{}" Target="{}"{}/>"#,
                escape_xml(&rel.r_id),
                escape_xml(&rel.reltype),
                escape_xml(&rel.target_ref),
                target_mode
            ));
            xml.push('\n');
        }

        xml.push_str("</Relationships>");
        xml
    }
}

/// Order `rId2` before `rId10`; non-numeric ids sort after, textually.
fn compare_r_ids(a: &str, b: &str) -> std::cmp::Ordering {
    let num = |s: &str| s.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok());
    match (num(a), num(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
