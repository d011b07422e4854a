//! # kb-ingest CLI (`kb`)
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb build` | Extract, chunk and annotate input files into a JSONL file |
//! | `kb ingest` | Embed JSONL records and upsert them into the search index |
//! | `kb index ensure` | Create or update the index schema |
//! | `kb index delete` | Delete the index |
//! | `kb capabilities` | Show which extractors are compiled in |
//!
//! ## Examples
//!
//! ```bash
//! # Build from a local directory
//! kb build --input-dir ./docs --output-jsonl ./out/kb.jsonl
//!
//! # Build from blob storage and upload the result next to the sources
//! kb build --container kb --prefix portarias/ --output-jsonl ./out/kb.jsonl \
//!     --upload-jsonl jsonl/kb.jsonl
//!
//! # Index a JSONL stored in blob storage
//! kb ingest --container kb --jsonl-blob jsonl/kb.jsonl
//! ```
//!
//! Settings come from `--config` (default `./config/kb.toml`, optional) and
//! the environment; a `.env` file in the working directory is loaded first.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kb_ingest::build_cmd::{self, BuildOptions};
use kb_ingest::config::Config;
use kb_ingest::extract::Capabilities;
use kb_ingest::ingest::{self, IngestOptions};
use kb_ingest::progress::ProgressMode;

/// Knowledge-base ingestion CLI.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Turns PDF/DOCX/TXT documents into a searchable knowledge base",
    version,
    long_about = "kb splits documents into overlapping chunks, infers structured metadata \
    (knowledge area, norm type, issuing body, dates, deadlines, legal references), writes them \
    to JSONL, then embeds and upserts them idempotently into an Azure AI Search index."
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./config/kb.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge-base JSONL from input files.
    ///
    /// Reads a local directory (`--input-dir`) or a blob container prefix
    /// (`--container`/`--prefix`). Unreadable, empty or oversized files are
    /// skipped with a warning.
    Build {
        /// Local directory to scan recursively.
        #[arg(long, conflicts_with_all = ["container", "prefix"])]
        input_dir: Option<PathBuf>,

        /// Blob container holding the input files (and the uploaded JSONL).
        #[arg(long)]
        container: Option<String>,

        /// Blob name prefix to list.
        #[arg(long)]
        prefix: Option<String>,

        /// Where to write the JSONL.
        #[arg(long)]
        output_jsonl: PathBuf,

        /// Also upload the JSONL to this blob name in `--container`.
        #[arg(long)]
        upload_jsonl: Option<String>,

        /// Subject label stamped on every record.
        #[arg(long)]
        assunto: Option<String>,

        /// Area-of-interest label stamped on every record.
        #[arg(long)]
        area_interesse: Option<String>,

        /// Target chunk size in characters.
        #[arg(long)]
        target_chars: Option<usize>,

        /// Characters shared by consecutive chunks.
        #[arg(long)]
        overlap: Option<usize>,

        /// Count files and chunks without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Embed JSONL records and upsert them into the search index.
    ///
    /// Creates or updates the index schema first. Stops at the first failed
    /// batch; re-running is safe.
    Ingest {
        /// Local JSONL file.
        #[arg(long, conflicts_with = "jsonl_blob")]
        jsonl_path: Option<PathBuf>,

        /// JSONL blob name inside `--container`.
        #[arg(long)]
        jsonl_blob: Option<String>,

        /// Blob container of `--jsonl-blob`.
        #[arg(long)]
        container: Option<String>,

        /// Texts per embedding request and documents per upload.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Expected embedding dimension.
        #[arg(long)]
        emb_dim: Option<usize>,

        /// Embedding provider: `azure` or `openai`.
        #[arg(long)]
        provider: Option<String>,
    },

    /// Manage the search index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Show which file formats this build can extract.
    Capabilities,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create or update the index schema.
    Ensure {
        /// Vector dimension of `content_vector`.
        #[arg(long)]
        emb_dim: Option<usize>,
    },
    /// Delete the index. Succeeds when it does not exist.
    Delete,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Capabilities = cli.command {
        println!("capabilities");
        println!("  {}", Capabilities::current());
        println!("ok");
        return Ok(());
    }

    let mut cfg = Config::load(cli.config.as_deref())?;
    let progress = cli
        .progress
        .unwrap_or_else(ProgressMode::default_for_tty)
        .reporter();

    match cli.command {
        Commands::Build {
            input_dir,
            container,
            prefix,
            output_jsonl,
            upload_jsonl,
            assunto,
            area_interesse,
            target_chars,
            overlap,
            dry_run,
        } => {
            if let Some(v) = assunto {
                cfg.kb.assunto = v;
            }
            if let Some(v) = area_interesse {
                cfg.kb.area_interesse = v;
            }
            if let Some(v) = target_chars {
                cfg.chunking.target_chars = v;
            }
            if let Some(v) = overlap {
                cfg.chunking.overlap = v;
            }
            cfg.validate()?;

            let opts = BuildOptions {
                input_dir,
                container,
                prefix,
                output_jsonl,
                upload_jsonl,
                dry_run,
            };
            build_cmd::run_build(&cfg, &opts, progress.as_ref())?;
        }
        Commands::Ingest {
            jsonl_path,
            jsonl_blob,
            container,
            batch_size,
            emb_dim,
            provider,
        } => {
            if let Some(v) = batch_size {
                cfg.embedding.batch_size = v;
            }
            if let Some(v) = emb_dim {
                cfg.embedding.dims = v;
            }
            if let Some(v) = provider {
                cfg.embedding.provider = v;
            }
            cfg.validate()?;

            let opts = IngestOptions {
                jsonl_path,
                jsonl_blob,
                container,
            };
            ingest::run_ingest(&cfg, &opts, progress.as_ref())?;
        }
        Commands::Index { action } => match action {
            IndexAction::Ensure { emb_dim } => {
                if let Some(v) = emb_dim {
                    cfg.embedding.dims = v;
                }
                cfg.validate()?;
                ingest::run_index_ensure(&cfg)?;
            }
            IndexAction::Delete => {
                cfg.validate()?;
                ingest::run_index_delete(&cfg)?;
            }
        },
        Commands::Capabilities => unreachable!("handled before config loading"),
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
