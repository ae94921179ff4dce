//! Pitaya - decode/encode engine for packaged presentation documents
//!
//! This library turns a packaged presentation document (a zip-like
//! archive of XML parts) into an in-memory model of slides and shapes
//! with fully resolved visual properties, and re-serializes edits back
//! into a valid archive.
//!
//! # Features
//!
//! - **Style inheritance**: the theme -> master -> layout -> slide chain
//!   is walked by one generic fallback resolver
//! - **Color resolution**: scheme references with luminance/tint/shade
//!   modifiers resolve to concrete RGB values
//! - **Text composition**: run and paragraph styles compose with theme
//!   font substitution
//! - **Graceful degradation**: malformed themes and shapes are skipped
//!   with a warning instead of failing the whole document
//!
//! The archive itself stays outside the engine: the host supplies an
//! [`archive::EntryArchive`] capability and the engine only reads and
//! replaces named entries through it.
//!
//! # Example - Loading a presentation
//!
//! ```no_run
//! use pitaya::archive::MemoryArchive;
//! use pitaya::document::{LoadOptions, PresentationDocument};
//!
//! # async fn demo(archive: MemoryArchive) -> pitaya::Result<()> {
//! let doc = PresentationDocument::load(archive, LoadOptions::new()).await?;
//!
//! for slide in doc.presentation().slides() {
//!     println!("slide {}: {} shapes", slide.id, slide.shapes.len());
//!     println!("  background: {:?}", slide.background);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Editing and saving
//!
//! ```no_run
//! use pitaya::archive::MemoryArchive;
//! use pitaya::document::{LoadOptions, PresentationDocument};
//!
//! # async fn demo(archive: MemoryArchive) -> pitaya::Result<()> {
//! let mut doc = PresentationDocument::load(archive, LoadOptions::new()).await?;
//!
//! doc.set_paragraph_text(0, 0, 0, "New title")?;
//! assert!(doc.is_dirty());
//!
//! doc.save().await?;
//! assert!(!doc.is_dirty());
//! # Ok(())
//! # }
//! ```

/// Named-entry archive capability consumed by the engine.
pub mod archive;

/// Inheritance chain resolution (slide -> layout -> master -> theme).
pub mod chain;

/// Fill color references and the modifier math that resolves them.
pub mod color;

/// Document loading, the in-memory model, and edits.
pub mod document;

/// Error taxonomy.
pub mod error;

/// Container plumbing: part names, relationship parts, fixed URIs.
pub mod opc;

/// Shape model and extraction.
pub mod shapes;

/// Slide model and backgrounds.
pub mod slide;

/// Text model: styled fragments, runs, paragraphs.
pub mod text;

/// Theme parts: color schemes and font schemes.
pub mod theme;

/// Unit conversions (EMU, points, percent-mille).
pub mod unit;

/// Archive entry regeneration for save.
pub mod writer;

/// Namespace-aware XML element tree shared by decode and encode.
pub mod xml;

// Re-export commonly used types for convenience
pub use color::{ColorReference, Modifier, Rgb};
pub use document::{DocumentSession, LoadOptions, Presentation, PresentationDocument};
pub use error::{EngineError, Result};
pub use shapes::{Fill, Shape, Transform};
pub use slide::{Background, Slide};
pub use theme::ThemeData;
