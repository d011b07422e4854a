//! # kb-ingest
//!
//! Turns institutional documents (PDF, DOCX, TXT/MD/CSV/LOG) into a
//! searchable knowledge base: deterministic chunking with overlap,
//! rule-based metadata inference, embeddings, and idempotent upserts into a
//! hybrid (lexical + vector + semantic) search index.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌───────┐
//! │  Sources    │──▶│ Extract + Chunk  │──▶│ JSONL │   kb build
//! │  FS / Blob  │   │ + Metadata       │   └───┬───┘
//! └─────────────┘   └──────────────────┘       │
//!                                              ▼
//!                   ┌──────────────────┐   ┌───────────┐
//!                   │ Embed (batches)  │──▶│  Search   │   kb ingest
//!                   │ Azure / OpenAI   │   │  index    │
//!                   └──────────────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb build --input-dir ./docs --output-jsonl ./out/kb.jsonl
//! kb ingest --jsonl-path ./out/kb.jsonl
//! kb index delete               # drop the index to start over
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with environment overrides |
//! | [`error`] | Typed error taxonomy |
//! | [`models`] | Core data types |
//! | [`traits`] | The [`traits::FileSource`] input abstraction |
//! | [`connector_fs`] | Local directory source |
//! | [`connector_blob`] | Azure Blob Storage client and source |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`metadata`] | Heuristic document metadata |
//! | [`chunk`] | Text chunking |
//! | [`record`] | Chunk records and document identity |
//! | [`jsonl`] | Knowledge-base JSONL files |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Search index schema and client |
//! | [`pipeline`] | Embed-and-upsert batches |
//! | [`progress`] | Progress reporting on stderr |
//! | [`build_cmd`] | `kb build` |
//! | [`ingest`] | `kb ingest`, `kb index` |

pub mod build_cmd;
pub mod chunk;
pub mod config;
pub mod connector_blob;
pub mod connector_fs;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod jsonl;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod traits;
