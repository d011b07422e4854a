use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::InputConfig;
use crate::models::{RawFile, SourceEntry};
use crate::traits::{sort_entries, FileSource};

/// Excluded everywhere: VCS metadata and Office lock files.
pub const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/~$*"];

/// Input files under a local directory.
pub struct FilesystemSource {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl FilesystemSource {
    pub fn new(root: &Path, input: &InputConfig) -> Result<Self> {
        if !root.is_dir() {
            bail!("Input directory does not exist: {}", root.display());
        }
        let (include, exclude) = input_globsets(input)?;
        Ok(Self {
            root: root.to_path_buf(),
            include,
            exclude,
        })
    }
}

impl FileSource for FilesystemSource {
    fn label(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }

    fn list(&self) -> Result<Vec<SourceEntry>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if self.exclude.is_match(&rel_str) || !self.include.is_match(&rel_str) {
                continue;
            }

            let size = entry.metadata()?.len();
            entries.push(SourceEntry {
                relative_path: rel_str,
                size,
            });
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    fn fetch(&self, entry: &SourceEntry) -> Result<RawFile> {
        let path = self.root.join(&entry.relative_path);
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(RawFile {
            relative_path: entry.relative_path.clone(),
            bytes,
        })
    }
}

/// Include and exclude sets for the configured globs, matched case-insensitively.
pub fn input_globsets(input: &InputConfig) -> Result<(GlobSet, GlobSet)> {
    let include = build_globset(&input.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(input.exclude_globs.iter().cloned());
    let exclude = build_globset(&excludes)?;
    Ok((include, exclude))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
