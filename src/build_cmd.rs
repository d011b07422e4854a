//! `kb build`: input files → knowledge-base JSONL.
//!
//! Lists a [`FileSource`] (local directory or blob prefix), extracts the
//! text of every supported file, infers document metadata, chunks the text
//! and writes one [`ChunkRecord`] per chunk. Files that cannot be read or
//! extracted, are too large, or contain no text are skipped with a warning;
//! they never abort the build.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::connector_blob::{BlobClient, BlobSource};
use crate::connector_fs::FilesystemSource;
use crate::extract::{extract_file, Capabilities};
use crate::jsonl::{write_jsonl_file, write_records};
use crate::metadata::{detect_title, extract_metadata};
use crate::models::{ChunkRecord, SourceDocument, SourceEntry};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::record::build_chunk_records;
use crate::traits::FileSource;

const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

/// Command-line inputs of `kb build`.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub input_dir: Option<PathBuf>,
    pub container: Option<String>,
    pub prefix: Option<String>,
    pub output_jsonl: PathBuf,
    /// Blob name the finished JSONL is uploaded to.
    pub upload_jsonl: Option<String>,
    pub dry_run: bool,
}

/// A file left out of the build, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub files_found: usize,
    pub files_processed: usize,
    pub skipped: Vec<SkippedFile>,
    pub records: Vec<ChunkRecord>,
}

/// Turn every file of `source` into chunk records, in listing order.
pub fn build_records(
    source: &dyn FileSource,
    config: &Config,
    progress: &dyn ProgressReporter,
) -> Result<BuildOutcome> {
    let label = source.label();
    progress.report(ProgressEvent::Discovering {
        source: label.clone(),
    });
    let entries = source
        .list()
        .with_context(|| format!("Failed to list {}", label))?;
    info!(source = %label, files = entries.len(), "listed input files");

    let mut outcome = BuildOutcome {
        files_found: entries.len(),
        ..BuildOutcome::default()
    };
    let total = entries.len() as u64;

    for (i, entry) in entries.iter().enumerate() {
        match process_entry(source, entry, config) {
            Ok(records) => {
                debug!(file = %entry.relative_path, chunks = records.len(), "processed");
                outcome.files_processed += 1;
                outcome.records.extend(records);
            }
            Err(reason) => {
                warn!(file = %entry.relative_path, "skipping: {}", reason);
                outcome.skipped.push(SkippedFile {
                    path: entry.relative_path.clone(),
                    reason,
                });
            }
        }
        progress.report(ProgressEvent::Extracting {
            source: label.clone(),
            n: i as u64 + 1,
            total,
        });
    }

    Ok(outcome)
}

/// Records for one file, or the reason it was skipped.
fn process_entry(
    source: &dyn FileSource,
    entry: &SourceEntry,
    config: &Config,
) -> std::result::Result<Vec<ChunkRecord>, String> {
    let limit = config.input.max_extract_bytes;
    if entry.size > limit {
        return Err(format!("file is {} bytes, limit is {}", entry.size, limit));
    }

    let raw = source.fetch(entry).map_err(|e| format!("{:#}", e))?;
    let text = extract_file(&raw, limit).map_err(|e| e.to_string())?;
    if text.trim().is_empty() {
        return Err("no text extracted".to_string());
    }

    let file_name = raw.file_name();
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let title = detect_title(&text, stem);
    let meta = extract_metadata(&text, file_name);

    let doc = SourceDocument {
        path: raw.relative_path.clone(),
        raw_text: text,
        title,
    };
    let chunks = chunk_text(
        &doc.raw_text,
        config.chunking.target_chars,
        config.chunking.overlap,
    );
    Ok(build_chunk_records(&doc, &meta, &chunks, &config.kb))
}

/// Run `kb build`: build, write (unless dry-run), optionally upload, summarize.
pub fn run_build(
    config: &Config,
    opts: &BuildOptions,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let capabilities = Capabilities::current();
    info!(%capabilities, "extractors");

    let source = open_source(config, opts)?;
    let outcome = build_records(source.as_ref(), config, progress)?;
    let label = source.label();

    if opts.dry_run {
        println!("build {} (dry-run)", label);
        println!("  files found: {}", outcome.files_found);
        println!("  files processed: {}", outcome.files_processed);
        println!("  files skipped: {}", outcome.skipped.len());
        println!("  estimated chunks: {}", outcome.records.len());
        println!("ok");
        return Ok(());
    }

    write_jsonl_file(&opts.output_jsonl, &outcome.records)?;
    info!(path = %opts.output_jsonl.display(), chunks = outcome.records.len(), "JSONL written");

    let uploaded = match &opts.upload_jsonl {
        Some(blob_name) => Some(upload_jsonl(config, opts, blob_name, &outcome.records)?),
        None => None,
    };

    println!("build {}", label);
    println!("  files found: {}", outcome.files_found);
    println!("  files processed: {}", outcome.files_processed);
    println!("  files skipped: {}", outcome.skipped.len());
    println!("  chunks written: {}", outcome.records.len());
    println!("  output: {}", opts.output_jsonl.display());
    if let Some(target) = uploaded {
        println!("  uploaded: {}", target);
    }
    println!("ok");
    Ok(())
}

fn open_source(config: &Config, opts: &BuildOptions) -> Result<Box<dyn FileSource>> {
    if let Some(dir) = &opts.input_dir {
        return Ok(Box::new(FilesystemSource::new(dir, &config.input)?));
    }
    let Some(container) = container_for(config, opts) else {
        bail!("Provide --input-dir, or --container (blob.container) to read from blob storage");
    };
    let prefix = opts
        .prefix
        .clone()
        .or_else(|| config.blob.prefix.clone())
        .unwrap_or_default();
    let client = blob_client(config)?;
    Ok(Box::new(BlobSource::new(
        client,
        &container,
        &prefix,
        &config.input,
    )?))
}

fn upload_jsonl(
    config: &Config,
    opts: &BuildOptions,
    blob_name: &str,
    records: &[ChunkRecord],
) -> Result<String> {
    let Some(container) = container_for(config, opts) else {
        bail!("--upload-jsonl needs --container (or blob.container)");
    };
    let mut body = Vec::new();
    write_records(&mut body, records)?;
    blob_client(config)?
        .upload(&container, blob_name, body, JSONL_CONTENT_TYPE)
        .with_context(|| format!("Failed to upload JSONL to {}/{}", container, blob_name))?;
    info!(container = %container, blob = %blob_name, "JSONL uploaded");
    Ok(format!("{}/{}", container, blob_name))
}

fn container_for(config: &Config, opts: &BuildOptions) -> Option<String> {
    opts.container
        .clone()
        .or_else(|| config.blob.container.clone())
        .filter(|c| !c.trim().is_empty())
}

pub fn blob_client(config: &Config) -> Result<BlobClient> {
    let creds = config.storage_credentials()?;
    Ok(BlobClient::new(&creds, config.blob.endpoint.as_deref())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawFile;
    use crate::progress::NoProgress;

    struct MemorySource {
        files: Vec<(String, Vec<u8>)>,
    }

    impl FileSource for MemorySource {
        fn label(&self) -> String {
            "memory".to_string()
        }

        fn list(&self) -> Result<Vec<SourceEntry>> {
            Ok(self
                .files
                .iter()
                .map(|(path, bytes)| SourceEntry {
                    relative_path: path.clone(),
                    size: bytes.len() as u64,
                })
                .collect())
        }

        fn fetch(&self, entry: &SourceEntry) -> Result<RawFile> {
            let (path, bytes) = self
                .files
                .iter()
                .find(|(p, _)| *p == entry.relative_path)
                .context("not found")?;
            Ok(RawFile {
                relative_path: path.clone(),
                bytes: bytes.clone(),
            })
        }
    }

    fn source(files: &[(&str, &str)]) -> MemorySource {
        MemorySource {
            files: files
                .iter()
                .map(|(p, t)| (p.to_string(), t.as_bytes().to_vec()))
                .collect(),
        }
    }

    #[test]
    fn test_builds_records_with_metadata() {
        let src = source(&[(
            "AC_2025_Portaria_45.txt",
            "PORTARIA CGRH nº 45/2025\n\nDispõe sobre a atribuição de classes.\nInscrições de 01/03 a 15/03/2025.",
        )]);
        let outcome = build_records(&src, &Config::default(), &NoProgress).unwrap();

        assert_eq!(outcome.files_processed, 1);
        assert_eq!(outcome.records.len(), 1);
        let rec = &outcome.records[0];
        assert_eq!(rec.id, "AC_2025_Portaria_45.txt#chunk1");
        assert_eq!(rec.doc_title, "PORTARIA CGRH nº 45/2025");
        assert_eq!(rec.conhecimento, "Atribuição de Classes (AC)");
        assert_eq!(rec.ano_letivo, "2025");
        assert_eq!(rec.prazo_inicio.as_deref(), Some("2025-03-01"));
        assert_eq!(rec.prazo_fim.as_deref(), Some("2025-03-15"));
    }

    #[test]
    fn test_title_falls_back_to_stem() {
        let src = source(&[("notas/Orientações gerais.md", "Texto sem cabeçalho normativo.")]);
        let outcome = build_records(&src, &Config::default(), &NoProgress).unwrap();
        assert_eq!(outcome.records[0].doc_title, "Orientações gerais");
        assert_eq!(outcome.records[0].source_file, "notas/Orientações gerais.md");
    }

    #[test]
    fn test_skips_empty_and_oversized_files() {
        let mut config = Config::default();
        config.input.max_extract_bytes = 20;
        let src = source(&[
            ("vazio.txt", "   \n  "),
            ("grande.txt", "este arquivo tem mais de vinte bytes"),
            ("ok.txt", "curto"),
        ]);
        let outcome = build_records(&src, &config, &NoProgress).unwrap();

        assert_eq!(outcome.files_found, 3);
        assert_eq!(outcome.files_processed, 1);
        let skipped: Vec<&str> = outcome.skipped.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(skipped, vec!["vazio.txt", "grande.txt"]);
        assert_eq!(outcome.records[0].text, "curto");
    }

    #[test]
    fn test_unsupported_extension_is_skipped() {
        let src = source(&[("planilha.xlsx", "PK")]);
        let outcome = build_records(&src, &Config::default(), &NoProgress).unwrap();
        assert_eq!(outcome.files_processed, 0);
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[test]
    fn test_chunk_ids_are_sequential() {
        let mut config = Config::default();
        config.chunking.target_chars = 100;
        config.chunking.overlap = 10;
        let text = "palavra ".repeat(60);
        let src = source(&[("longo.txt", text.as_str())]);
        let outcome = build_records(&src, &config, &NoProgress).unwrap();

        assert!(outcome.records.len() > 1);
        for (i, rec) in outcome.records.iter().enumerate() {
            assert_eq!(rec.chunk as usize, i + 1);
            assert_eq!(rec.id, format!("longo.txt#chunk{}", i + 1));
        }
    }
}
