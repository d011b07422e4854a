//! `kb ingest` and `kb index`: JSONL → search index.
//!
//! Coordinates the upsert flow: credentials pre-flight → JSONL load (local
//! file or blob) → index schema create-or-update → embed-and-upsert
//! batches. Any provider or index failure aborts the run; re-running after
//! a fix is safe because document keys are derived from the records.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::build_cmd::blob_client;
use crate::config::Config;
use crate::embedding;
use crate::index::{ensure_index, AzureSearchIndex, SearchIndex};
use crate::jsonl::{self, ReadOutcome};
use crate::pipeline::UpsertPipeline;
use crate::progress::ProgressReporter;

/// Where `kb ingest` reads its records from.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub jsonl_path: Option<PathBuf>,
    pub jsonl_blob: Option<String>,
    pub container: Option<String>,
}

/// Run `kb ingest`.
pub fn run_ingest(
    config: &Config,
    opts: &IngestOptions,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    // Credentials first: nothing is read or sent when one is missing.
    let provider = embedding::create_provider(config)?;
    let index = open_index(config)?;

    let ReadOutcome { records, skipped } = load_records(config, opts)?;
    if skipped > 0 {
        warn!(skipped, "malformed JSONL lines were skipped");
    }
    if records.is_empty() {
        bail!("JSONL has no valid records");
    }

    let dims = config.embedding.dims;
    ensure_index(&index, &config.search, dims)
        .with_context(|| format!("Failed to create or update index '{}'", config.search.index))?;
    info!(index = %config.search.index, dims, "index schema ensured");

    info!(
        records = records.len(),
        batch_size = config.embedding.batch_size,
        model = provider.model_name(),
        "starting upsert"
    );
    let summary = UpsertPipeline::new(
        provider.as_ref(),
        &index,
        &config.kb,
        dims,
        config.embedding.batch_size,
    )
    .with_progress(progress)
    .run(&records)?;

    println!("ingest {}", config.search.index);
    println!("  records: {}", summary.records);
    println!("  skipped lines: {}", skipped);
    println!("  batches: {}", summary.batches);
    println!("  uploaded: {}", summary.uploaded);
    println!("ok");
    Ok(())
}

/// Run `kb index ensure`.
pub fn run_index_ensure(config: &Config) -> Result<()> {
    let index = open_index(config)?;
    let definition = ensure_index(&index, &config.search, config.embedding.dims)
        .with_context(|| format!("Failed to create or update index '{}'", config.search.index))?;

    println!("index ensure {}", definition.name);
    println!("  fields: {}", definition.fields.len());
    println!("  dimensions: {}", config.embedding.dims);
    println!("ok");
    Ok(())
}

/// Run `kb index delete`. An index that does not exist is not an error.
pub fn run_index_delete(config: &Config) -> Result<()> {
    let index = open_index(config)?;
    let name = &config.search.index;
    let deleted = index
        .delete_index(name)
        .with_context(|| format!("Failed to delete index '{}'", name))?;

    println!("index delete {}", name);
    println!("  {}", if deleted { "deleted" } else { "not found" });
    println!("ok");
    Ok(())
}

fn open_index(config: &Config) -> Result<AzureSearchIndex> {
    let endpoint = config.search_endpoint()?;
    let api_key = config.search_api_key()?;
    Ok(AzureSearchIndex::new(
        endpoint,
        &config.search.index,
        &config.search.api_version,
        api_key,
    )?)
}

fn load_records(config: &Config, opts: &IngestOptions) -> Result<ReadOutcome> {
    if let Some(path) = &opts.jsonl_path {
        return jsonl::read_jsonl_file(path);
    }
    let Some(blob_name) = &opts.jsonl_blob else {
        bail!("Provide --jsonl-path, or --jsonl-blob with --container to read from blob storage");
    };
    let Some(container) = opts
        .container
        .clone()
        .or_else(|| config.blob.container.clone())
        .filter(|c| !c.trim().is_empty())
    else {
        bail!("--jsonl-blob needs --container (or blob.container)");
    };

    let bytes = blob_client(config)?
        .download(&container, blob_name)
        .with_context(|| format!("Failed to download {}/{}", container, blob_name))?;
    info!(container = %container, blob = %blob_name, bytes = bytes.len(), "JSONL downloaded");
    Ok(jsonl::parse_jsonl(&String::from_utf8_lossy(&bytes)))
}
