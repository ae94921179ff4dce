//! Part-name arithmetic.
//!
//! Entry names are slash-separated, never leading-slash (`ppt/slides/
//! slide1.xml`). Relationship targets are written relative to the source
//! part's directory (`../slideLayouts/slideLayout1.xml`) or, rarely,
//! absolute with a leading slash; both resolve to plain entry names here.

/// Name of the relationship part describing `part_name`.
///
/// The package level is addressed with the empty string:
///
/// ```rust
/// use pitaya::opc::rels_name_for;
///
/// assert_eq!(rels_name_for(""), "_rels/.rels");
/// assert_eq!(
///     rels_name_for("ppt/slides/slide1.xml"),
///     "ppt/slides/_rels/slide1.xml.rels"
/// );
/// ```
pub fn rels_name_for(part_name: &str) -> String {
    if part_name.is_empty() {
        return crate::opc::constants::PACKAGE_RELS_NAME.to_string();
    }
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target against its source part.
///
/// ```rust
/// use pitaya::opc::resolve_target;
///
/// assert_eq!(
///     resolve_target("ppt/slides/slide1.xml", "../slideLayouts/slideLayout1.xml"),
///     "ppt/slideLayouts/slideLayout1.xml"
/// );
/// assert_eq!(resolve_target("", "ppt/presentation.xml"), "ppt/presentation.xml");
/// assert_eq!(resolve_target("ppt/presentation.xml", "/ppt/media/image1.png"), "ppt/media/image1.png");
/// ```
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                segments.pop();
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}
