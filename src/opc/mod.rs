//! Container plumbing shared by decode and encode.
//!
//! The presentation container is a named-entry archive whose parts are
//! wired together by relationship parts. This module owns the fixed part
//! paths, relationship-type URIs, relationship parsing/generation, and
//! part-name resolution; it knows nothing about slides or shapes.

pub mod constants;
pub mod packname;
pub mod rel;

pub use packname::{rels_name_for, resolve_target};
pub use rel::{Relationship, Relationships};
