//! Input source abstraction for `kb build`.
//!
//! A [`FileSource`] lists the candidate files under its root and fetches
//! their bytes on demand, so the build can skip oversized files before
//! reading or downloading them.
//!
//! # Implementations
//!
//! ```text
//! ┌──────────────────────────────┐
//! │          FileSource          │
//! │  ┌────────────┐ ┌──────────┐ │
//! │  │ Filesystem │ │   Blob   │ │
//! │  │ (walkdir)  │ │ (Azure)  │ │
//! │  └────────────┘ └──────────┘ │
//! └──────────────┬───────────────┘
//!                ▼
//!          run_build() → JSONL
//! ```

use anyhow::Result;

use crate::models::{RawFile, SourceEntry};

/// A place input files come from.
pub trait FileSource {
    /// Human-readable location, e.g. `filesystem:./docs` or `blob:kb/portarias/`.
    fn label(&self) -> String;

    /// Every matching file, in build order.
    fn list(&self) -> Result<Vec<SourceEntry>>;

    /// Fetch the bytes of one listed entry.
    fn fetch(&self, entry: &SourceEntry) -> Result<RawFile>;
}

/// Build order: lowercase file name, then full relative path.
pub fn sort_entries(entries: &mut [SourceEntry]) {
    entries.sort_by(|a, b| {
        a.file_name()
            .to_lowercase()
            .cmp(&b.file_name().to_lowercase())
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> SourceEntry {
        SourceEntry {
            relative_path: path.to_string(),
            size: 0,
        }
    }

    #[test]
    fn sorts_by_lowercase_file_name_then_path() {
        let mut entries = vec![
            entry("z/b.pdf"),
            entry("a/C.txt"),
            entry("y/B.pdf"),
            entry("a/b.pdf"),
        ];
        sort_entries(&mut entries);
        let order: Vec<&str> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(order, vec!["a/b.pdf", "y/B.pdf", "z/b.pdf", "a/C.txt"]);
    }
}
