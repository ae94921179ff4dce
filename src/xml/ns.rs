//! Namespace URIs of the presentation container format.

/// DrawingML: shapes, fills, text bodies, themes.
pub const DRAWING_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";

/// PresentationML: manifest, slides, layouts, masters.
pub const PRESENTATION_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";

/// Relationship-id attributes on document parts (`r:id`, `r:embed`).
pub const DOC_RELS_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// `.rels` relationship parts.
pub const PACKAGE_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// `[Content_Types].xml`.
pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
