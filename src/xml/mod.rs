//! Namespace-aware XML element tree.
//!
//! Container parts are parsed once into an owned element tree that keeps
//! attribute order, resolved namespace URIs, and text content. Decode
//! walks the tree with the document-order queries below; encode mutates
//! the same tree and serializes it back, so a no-edit save reproduces
//! semantically equivalent XML.

pub mod ns;

use crate::error::{EngineError, Result};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::collections::HashMap;

/// One attribute as written in the source, value unescaped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttr {
    /// Attribute name including any prefix (e.g. `r:embed`).
    pub name: String,
    /// Unescaped attribute value.
    pub value: String,
}

/// A child of an element: a nested element or a text span.
#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element of the parsed tree.
///
/// The prefixed name is preserved for round-tripping; queries match on
/// the resolved namespace URI plus local name, so documents using
/// unconventional prefixes still resolve.
#[derive(Debug, Clone)]
pub struct XmlElement {
    /// Tag name as written, including prefix (e.g. `a:solidFill`).
    name: String,
    /// Local part of the tag name (e.g. `solidFill`).
    local: String,
    /// Resolved namespace URI, when the prefix was declared.
    namespace: Option<String>,
    /// Attributes in source order. Namespace declarations are kept so
    /// serialization reproduces them.
    attrs: Vec<XmlAttr>,
    children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create a new element with a prefixed name and a resolved namespace.
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        let name = name.into();
        let local = name
            .split_once(':')
            .map(|(_, l)| l.to_string())
            .unwrap_or_else(|| name.clone());
        Self {
            name,
            local,
            namespace: namespace.map(|s| s.to_string()),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Tag name as written in the source, including prefix.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local name without prefix.
    #[inline]
    pub fn local_name(&self) -> &str {
        &self.local
    }

    /// Resolved namespace URI, if the prefix was bound.
    #[inline]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Check whether this element is `{ns}local`.
    #[inline]
    pub fn is(&self, ns: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(ns)
    }

    /// Get an attribute value by its full (prefixed) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Get an attribute value matching on the local part of its name.
    ///
    /// Relationship-id attributes appear as `r:id`/`r:embed` with
    /// whatever prefix the document declared; matching locally sidesteps
    /// the prefix.
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name.rsplit(':').next() == Some(local))
            .map(|a| a.value.as_str())
    }

    /// Parse an attribute as `i64`, by local name.
    pub fn attr_i64(&self, local: &str) -> Option<i64> {
        self.attr_local(local).and_then(|v| v.parse().ok())
    }

    /// Set an attribute, replacing an existing one with the same name.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        if let Some(attr) = self.attrs.iter_mut().find(|a| a.name == name) {
            attr.value = value.to_string();
        } else {
            self.attrs.push(XmlAttr {
                name: name.to_string(),
                value: value.to_string(),
            });
        }
    }

    /// Attributes in source order.
    #[inline]
    pub fn attrs(&self) -> &[XmlAttr] {
        &self.attrs
    }

    /// Child nodes in document order.
    #[inline]
    pub fn nodes(&self) -> &[XmlNode] {
        &self.children
    }

    /// Mutable child nodes.
    #[inline]
    pub fn nodes_mut(&mut self) -> &mut Vec<XmlNode> {
        &mut self.children
    }

    /// Append a child element.
    pub fn push_element(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    /// Child elements in document order, skipping text spans.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child matching `{ns}local`.
    pub fn child(&self, ns: &str, local: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.is(ns, local))
    }

    /// Mutable first direct child matching `{ns}local`.
    pub fn child_mut(&mut self, ns: &str, local: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|n| match n {
            XmlNode::Element(e) if e.is(ns, local) => Some(e),
            _ => None,
        })
    }

    /// First matching element in document order, searching this element
    /// and all descendants.
    pub fn find_first(&self, ns: &str, local: &str) -> Option<&XmlElement> {
        if self.is(ns, local) {
            return Some(self);
        }
        for child in self.child_elements() {
            if let Some(found) = child.find_first(ns, local) {
                return Some(found);
            }
        }
        None
    }

    /// All matching elements in document order, searching this element
    /// and all descendants.
    pub fn find_all(&self, ns: &str, local: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.collect_all(ns, local, &mut out);
        out
    }

    fn collect_all<'a>(&'a self, ns: &str, local: &str, out: &mut Vec<&'a XmlElement>) {
        if self.is(ns, local) {
            out.push(self);
        }
        for child in self.child_elements() {
            child.collect_all(ns, local, out);
        }
    }

    /// Mutable first matching descendant-or-self, document order.
    pub fn find_first_mut(&mut self, ns: &str, local: &str) -> Option<&mut XmlElement> {
        if self.is(ns, local) {
            return Some(self);
        }
        for node in &mut self.children {
            if let XmlNode::Element(e) = node
                && let Some(found) = e.find_first_mut(ns, local)
            {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated direct text content of this element.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Concatenated text of this element and all descendants, document
    /// order.
    pub fn text_recursive(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => out.push_str(&e.text_recursive()),
            }
        }
        out
    }

    /// Replace all child nodes with a single text span.
    pub fn set_text(&mut self, text: &str) {
        self.children.clear();
        self.children.push(XmlNode::Text(text.to_string()));
    }

    /// Serialize this element (and subtree) to an XML string, without a
    /// declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(256);
        self.write_into(&mut out);
        out
    }

    fn write_into(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attrs {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&escape_xml(&attr.value));
            out.push('"');
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(&escape_xml(t)),
                XmlNode::Element(e) => e.write_into(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

/// Parse an XML part into its root element.
///
/// Whitespace-only text between elements is dropped; text inside leaf
/// elements is kept verbatim (leading/trailing spaces in text runs are
/// significant). Namespace prefixes are resolved against the declaration
/// scope in effect at each element.
pub fn parse_document(xml: &[u8]) -> Result<XmlElement> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    // Stack of open elements plus the namespace scope introduced by each.
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut scopes: Vec<HashMap<String, String>> = vec![HashMap::new()];
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let element = open_element(e, &mut scopes)?;
                stack.push(element);
            },
            Ok(Event::Empty(ref e)) => {
                let element = open_element(e, &mut scopes)?;
                scopes.pop();
                attach(&mut stack, &mut root, element)?;
            },
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| EngineError::Xml("unbalanced end tag".to_string()))?;
                scopes.pop();
                attach(&mut stack, &mut root, element)?;
            },
            Ok(Event::Text(ref e)) => {
                if let Some(parent) = stack.last_mut() {
                    let raw = std::str::from_utf8(e.as_ref())
                        .map_err(|e| EngineError::Xml(e.to_string()))?;
                    let text = unescape_xml(raw);
                    if !text.trim().is_empty() {
                        parent.children.push(XmlNode::Text(text));
                    }
                }
            },
            Ok(Event::CData(ref e)) => {
                if let Some(parent) = stack.last_mut() {
                    let text = std::str::from_utf8(e.as_ref())
                        .map_err(|e| EngineError::Xml(e.to_string()))?;
                    parent.children.push(XmlNode::Text(text.to_string()));
                }
            },
            Ok(Event::GeneralRef(ref e)) => {
                // quick-xml emits entity and character references as their
                // own events; route the reference content back through the
                // shared decoder so `&lt;`, `&amp;`, `&#65;` etc. land in the
                // surrounding text.
                if let Some(parent) = stack.last_mut() {
                    let content = std::str::from_utf8(e.as_ref())
                        .map_err(|e| EngineError::Xml(e.to_string()))?;
                    let text = unescape_xml(&format!("&{content};"));
                    parent.children.push(XmlNode::Text(text));
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(EngineError::Xml(e.to_string())),
            _ => {},
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(EngineError::Xml("unterminated element".to_string()));
    }
    root.ok_or_else(|| EngineError::Xml("document has no root element".to_string()))
}

/// Serialize a root element to a complete part, declaration included.
pub fn serialize_document(root: &XmlElement) -> String {
    let mut out = String::with_capacity(1024);
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    root.write_into(&mut out);
    out
}

fn open_element(
    e: &quick_xml::events::BytesStart<'_>,
    scopes: &mut Vec<HashMap<String, String>>,
) -> Result<XmlElement> {
    let name = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| EngineError::Xml(e.to_string()))?
        .to_string();

    let mut attrs = Vec::new();
    let mut frame: Option<HashMap<String, String>> = None;
    for attr in e.attributes().flatten() {
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| EngineError::Xml(e.to_string()))?
            .to_string();
        let raw = std::str::from_utf8(&attr.value).map_err(|e| EngineError::Xml(e.to_string()))?;
        let value = unescape_xml(raw);

        if key == "xmlns" {
            frame
                .get_or_insert_with(HashMap::new)
                .insert(String::new(), value.clone());
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            frame
                .get_or_insert_with(HashMap::new)
                .insert(prefix.to_string(), value.clone());
        }
        attrs.push(XmlAttr { name: key, value });
    }

    // Each element introduces a scope frame, empty or not, so End events
    // can pop unconditionally.
    scopes.push(frame.unwrap_or_default());

    let prefix = name.split_once(':').map(|(p, _)| p).unwrap_or("");
    let namespace = resolve_prefix(scopes, prefix);

    let mut element = XmlElement::new(name, None);
    element.namespace = namespace;
    element.attrs = attrs;
    Ok(element)
}

fn resolve_prefix(scopes: &[HashMap<String, String>], prefix: &str) -> Option<String> {
    scopes
        .iter()
        .rev()
        .find_map(|scope| scope.get(prefix))
        .cloned()
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(EngineError::Xml("multiple root elements".to_string()));
    }
    Ok(())
}

/// Escape XML special characters.
#[inline]
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Unescape the five predefined entities plus decimal/hex character
/// references. Unknown entities are passed through verbatim.
pub fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let Some(end) = rest.find(';') else {
            out.push_str(rest);
            return out;
        };
        let entity = &rest[1..end];
        match entity {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let decoded = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                    .and_then(char::from_u32);
                match decoded {
                    Some(c) => out.push(c),
                    None => out.push_str(&rest[..=end]),
                }
            },
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
