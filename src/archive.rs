//! Named-entry archive capability.
//!
//! The engine never opens zip bytes itself. The host application owns the
//! physical archive (and the platform file capability that produced its
//! bytes) and hands the engine an [`EntryArchive`] implementation. The
//! engine only ever reads and replaces named entries through this trait.
//!
//! [`MemoryArchive`] is the bundled implementation for hosts that already
//! hold decompressed entries, and for tests.

use crate::error::{EngineError, Result};
use std::collections::BTreeMap;

/// Capability for reading and replacing named entries of a container
/// archive.
///
/// Reads are async so the host can back them with its own cooperative
/// I/O; the load pipeline awaits entries in sequence and re-checks its
/// cancellation token between awaits.
pub trait EntryArchive {
    /// Read one entry as raw bytes.
    ///
    /// Returns `Ok(None)` when no entry with that name exists. Entry
    /// names never start with a slash (`ppt/slides/slide1.xml`).
    fn read_entry(&self, name: &str) -> impl Future<Output = Result<Option<Vec<u8>>>>;

    /// All entry names currently in the archive, in stable order.
    fn entry_names(&self) -> Vec<String>;

    /// Write or replace a named entry.
    fn write_entry(&mut self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Replace the archive's entire contents with the given entry set,
    /// regenerating the final archive from scratch.
    ///
    /// The default writes each entry in turn without dropping absent
    /// ones; implementations that can rebuild should override so entries
    /// missing from `entries` disappear.
    fn replace_entries(&mut self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        for (name, bytes) in entries {
            self.write_entry(&name, bytes)?;
        }
        Ok(())
    }

    /// Read one entry and decode it as UTF-8 text.
    fn read_entry_text(&self, name: &str) -> impl Future<Output = Result<Option<String>>> {
        async move {
            match self.read_entry(name).await? {
                Some(bytes) => {
                    let text = String::from_utf8(bytes)
                        .map_err(|e| EngineError::Archive(format!("{name}: {e}")))?;
                    Ok(Some(text))
                },
                None => Ok(None),
            }
        }
    }
}

/// In-memory named-entry archive.
///
/// Entries are kept in a sorted map so enumeration order is stable across
/// loads and saves.
///
/// # Examples
///
/// ```rust
/// use pitaya::archive::{EntryArchive, MemoryArchive};
///
/// let mut archive = MemoryArchive::new();
/// archive.write_entry("ppt/presentation.xml", b"<p:presentation/>".to_vec()).unwrap();
/// assert_eq!(archive.entry_names(), vec!["ppt/presentation.xml".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryArchive {
    /// Create a new empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, consuming and returning the archive for chaining.
    pub fn with_entry(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.entries.insert(name.into(), bytes.into());
        self
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether an entry with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl EntryArchive for MemoryArchive {
    async fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(name).cloned())
    }

    fn entry_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn write_entry(&mut self, name: &str, bytes: Vec<u8>) -> Result<()> {
        self.entries.insert(name.to_string(), bytes);
        Ok(())
    }

    fn replace_entries(&mut self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        self.entries = entries.into_iter().collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_missing_entry() {
        let archive = MemoryArchive::new();
        assert!(archive.read_entry("nope.xml").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let mut archive = MemoryArchive::new();
        archive.write_entry("a.xml", b"<a/>".to_vec()).unwrap();
        let bytes = archive.read_entry("a.xml").await.unwrap().unwrap();
        assert_eq!(bytes, b"<a/>");
    }

    #[tokio::test]
    async fn test_read_entry_text_rejects_invalid_utf8() {
        let archive = MemoryArchive::new().with_entry("bad.xml", vec![0xFF, 0xFE, 0x00]);
        assert!(archive.read_entry_text("bad.xml").await.is_err());
    }

    #[test]
    fn test_entry_names_sorted() {
        let archive = MemoryArchive::new()
            .with_entry("b.xml", b"<b/>".as_slice())
            .with_entry("a.xml", b"<a/>".as_slice());
        assert_eq!(archive.entry_names(), vec!["a.xml", "b.xml"]);
    }
}
