/// Error types for presentation container operations.
use thiserror::Error;

/// Result type for presentation container operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error types for presentation container operations.
///
/// Only `ContainerLoad` and `Save` are surfaced to callers as-is. The
/// per-theme and per-shape kinds are caught at the smallest enclosing
/// unit during a load and downgraded to log warnings, so one malformed
/// part cannot take down the whole document.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The bytes are not a valid archive or the manifest part is missing.
    /// Document-fatal: nothing renders.
    #[error("container load failed: {0}")]
    ContainerLoad(String),

    /// A theme part is malformed. Non-fatal: the theme falls back to an
    /// empty color map and default fonts.
    #[error("theme resolution failed: {0}")]
    ThemeResolution(String),

    /// One shape's geometry or fill is malformed. Non-fatal: the shape is
    /// skipped and extraction of the slide continues.
    #[error("shape parse failed: {0}")]
    ShapeParse(String),

    /// Serialization or archive regeneration failed. The unsaved-changes
    /// state is preserved so no data is silently lost.
    #[error("save failed: {0}")]
    Save(String),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// A newer load superseded this one; its results must be discarded.
    #[error("load cancelled by a newer load")]
    Cancelled,

    /// Archive capability error
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for EngineError {
    fn from(err: quick_xml::Error) -> Self {
        EngineError::Xml(err.to_string())
    }
}
